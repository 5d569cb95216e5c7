#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use classwatch::error::{BotError, Result};
use classwatch::lessons::{Activity, Lesson, LessonSource};
use classwatch::types::{ChatId, OutgoingMessage, Profile, Sender, Update};
use tokio::sync::Mutex;

/// Sender that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.text.clone()).collect()
    }

    pub async fn last(&self) -> Option<OutgoingMessage> {
        self.sent.lock().await.last().cloned()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

/// Sender whose every send fails.
pub struct FailingSender;

#[async_trait]
impl Sender for FailingSender {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        Err(BotError::send_error(format!("chat {} unreachable", message.chat)))
    }
}

pub struct StaticLessons {
    pub lessons: Vec<Lesson>,
}

#[async_trait]
impl LessonSource for StaticLessons {
    async fn lessons(&self, from: i64, to: i64) -> Result<Vec<Lesson>> {
        Ok(self
            .lessons
            .iter()
            .filter(|lesson| lesson.start_timestamp >= from && lesson.start_timestamp < to)
            .cloned()
            .collect())
    }
}

pub struct BrokenLessons;

#[async_trait]
impl LessonSource for BrokenLessons {
    async fn lessons(&self, _from: i64, _to: i64) -> Result<Vec<Lesson>> {
        Err(BotError::lessons_error("lessons request returned 503"))
    }
}

pub fn lesson(id: &str, start: i64, class_type: &str, spots: u32) -> Lesson {
    Lesson {
        id: id.to_string(),
        venue_name: "Centrum".to_string(),
        start_timestamp: start,
        duration_seconds: 3600,
        activity: Activity {
            id: format!("activity-{id}"),
            name: format!("Les {id}"),
        },
        class_type: class_type.to_string(),
        spots_available: spots,
    }
}

pub fn profile(id: i64) -> Profile {
    Profile::new(id, format!("user{id}"))
}

/// Chat ids mirror user ids, offset so the two are never confused.
pub fn chat_of(id: i64) -> ChatId {
    ChatId(id + 1000)
}

pub fn text(from: i64, text: &str) -> Update {
    Update::message(next_id(), profile(from), chat_of(from), text)
}

pub fn callback(from: i64, data: &str) -> Update {
    Update::callback(next_id(), profile(from), chat_of(from), data)
}

fn next_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

pub fn accept<V>(value: V) -> Result<classwatch::conversation::StepOutcome<V>> {
    Ok(classwatch::conversation::StepOutcome::Accept(value))
}

pub fn reject<V>() -> Result<classwatch::conversation::StepOutcome<V>> {
    Ok(classwatch::conversation::StepOutcome::Reject)
}

pub fn finish() -> Result<()> {
    Ok(())
}
