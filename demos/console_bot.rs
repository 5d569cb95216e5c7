//! Runs the class-watch bot against the terminal.
//!
//! Every line typed on stdin is a message from user 1. Lines starting with
//! `#cb ` are sent as a button press carrying the rest of the line, for
//! example `#cb group_lesson|mixed_lesson`.
//!
//! With `VENUE` set, lessons come from the booking API;
//! otherwise a made-up schedule for tomorrow is used, whose lessons open up
//! after a few polls.
//!
//! To run this example:
//! ```sh
//! cargo run --example console_bot --features subscriber
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveTime, Utc};
use classwatch::checker::Poller;
use classwatch::config::Config;
use classwatch::handlers::{build_dispatcher, Services};
use classwatch::lessons::{Activity, HttpLessonSource, Lesson, LessonSource};
use classwatch::store::MemoryStore;
use classwatch::types::{ChatId, OutgoingMessage, Profile, Sender, Update, UpdateSource, UpdateStream};
use classwatch::{logging, BotError, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const CONSOLE_USER: i64 = 1;

/// Reads updates from stdin.
struct ConsoleSource;

#[async_trait]
impl UpdateSource for ConsoleSource {
    async fn updates(&self) -> Result<UpdateStream<'_>> {
        let lines = BufReader::new(tokio::io::stdin()).lines();
        let stream = futures::stream::unfold((lines, 0u64), |(mut lines, id)| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((to_update(id, &line), (lines, id + 1))),
                Ok(None) => None,
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

fn to_update(id: u64, line: &str) -> Update {
    let from = Profile::new(CONSOLE_USER, "console");
    let chat = ChatId(CONSOLE_USER);
    match line.strip_prefix("#cb ") {
        Some(data) => Update::callback(id, from, chat, data.trim()),
        None => Update::message(id, from, chat, line),
    }
}

/// Prints outgoing messages.
struct ConsoleSender;

#[async_trait]
impl Sender for ConsoleSender {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        println!("[chat {}] {}", message.chat, message.text);
        for row in &message.keyboard {
            let buttons: Vec<String> = row
                .iter()
                .map(|button| format!("[{}] #cb {}", button.label, button.data))
                .collect();
            println!("    {}", buttons.join("   "));
        }
        Ok(())
    }
}

/// A fixed schedule for tomorrow. Every lesson is full for the first few
/// lookups.
struct DemoLessons {
    lessons: Vec<Lesson>,
    lookups: AtomicUsize,
}

impl DemoLessons {
    fn tomorrow() -> Result<Self> {
        let day = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| BotError::config_error("no tomorrow"))?;
        let lesson = |id: &str, name: &str, hour: u32, class_type: &str| Lesson {
            id: id.to_string(),
            venue_name: "Demo".to_string(),
            start_timestamp: day
                .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
                .and_utc()
                .timestamp(),
            duration_seconds: 3600,
            activity: Activity {
                id: format!("activity-{id}"),
                name: name.to_string(),
            },
            class_type: class_type.to_string(),
            spots_available: 0,
        };

        Ok(Self {
            lessons: vec![
                lesson("1", "Bodypump", 9, "group_lesson"),
                lesson("2", "Spinning", 18, "mixed_lesson"),
                lesson("3", "Vrij trainen", 12, "free_practise"),
            ],
            lookups: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LessonSource for DemoLessons {
    async fn lessons(&self, from: i64, to: i64) -> Result<Vec<Lesson>> {
        let lookups = self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .lessons
            .iter()
            .filter(|lesson| lesson.start_timestamp >= from && lesson.start_timestamp < to)
            .cloned()
            .map(|mut lesson| {
                if lookups >= 5 {
                    lesson.spots_available = 1;
                }
                lesson
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info")?;

    let (lessons, admin_chat, interval) = match Config::from_env() {
        Ok(config) => {
            info!(
                venues = ?config.venues,
                bot_token = config.bot_token.is_some(),
                "using the booking API"
            );
            let source: Arc<dyn LessonSource> = Arc::new(HttpLessonSource::new(
                config.lessons_base_url,
                config.venues,
                config.lessons_token,
            ));
            (source, config.admin_chat, config.poll_interval)
        }
        Err(e) => {
            warn!(error = %e, "no usable config, using a made-up schedule");
            let source: Arc<dyn LessonSource> = Arc::new(DemoLessons::tomorrow()?);
            (
                source,
                Some(ChatId(CONSOLE_USER)),
                Duration::from_secs(10),
            )
        }
    };

    let services = Services {
        store: Arc::new(MemoryStore::new()),
        lessons,
        admin_chat,
    };
    let sender: Arc<dyn Sender> = Arc::new(ConsoleSender);

    let poller = Poller::new(
        Arc::clone(&services.store),
        Arc::clone(&services.lessons),
        Arc::clone(&sender),
        interval,
    )
    .spawn();

    println!("Type /help to begin.");
    let dispatcher = build_dispatcher(sender, &services)?;
    let mut set = dispatcher.run(Box::new(ConsoleSource)).await?;
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            error!(error = ?e, "receive loop failed");
        }
    }

    // Give in-flight handlers a moment before shutting down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    poller.abort();
    Ok(())
}
