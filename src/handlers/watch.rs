use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::error;

use super::{attached_user, format_lesson, Services};
use crate::conversation::{Conversation, ConversationState, Finalizer, Step, StepOutcome};
use crate::error::{BotError, Result};
use crate::lessons::{ClassType, Lesson, LessonSource};
use crate::store::Store;
use crate::times::{day_bounds, parse_date, DATE_EXAMPLE};
use crate::types::{Button, HandleContext, OutgoingMessage};

pub const WATCH_TRIGGER: &str = "noti";

const DATE_STEP: usize = 1;
const LESSONS_STEP: usize = 2;
const CHOICE_STEP: usize = 3;

/// Results of the add-watch conversation, one variant per step.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchValue {
    Prompted,
    Date(NaiveDate),
    Lessons(Vec<Lesson>),
    Choice(usize),
}

impl WatchValue {
    fn kind(&self) -> &'static str {
        match self {
            WatchValue::Prompted => "prompt",
            WatchValue::Date(_) => "date",
            WatchValue::Lessons(_) => "lessons",
            WatchValue::Choice(_) => "choice",
        }
    }
}

fn unexpected(index: usize, expected: &str, found: &WatchValue) -> BotError {
    BotError::conversation_error(format!(
        "expected {expected} at step {index}, found {}",
        found.kind()
    ))
}

fn date_of(state: &ConversationState<WatchValue>) -> Result<NaiveDate> {
    match state.get(DATE_STEP)? {
        WatchValue::Date(date) => Ok(*date),
        other => Err(unexpected(DATE_STEP, "date", other)),
    }
}

fn lessons_of(state: &ConversationState<WatchValue>) -> Result<&[Lesson]> {
    match state.get(LESSONS_STEP)? {
        WatchValue::Lessons(lessons) => Ok(lessons),
        other => Err(unexpected(LESSONS_STEP, "lessons", other)),
    }
}

fn choice_of(state: &ConversationState<WatchValue>) -> Result<usize> {
    match state.get(CHOICE_STEP)? {
        WatchValue::Choice(choice) => Ok(*choice),
        other => Err(unexpected(CHOICE_STEP, "choice", other)),
    }
}

/// `/noti`: asks for a date, a class type and a lesson, then stores a watch
/// on that lesson.
pub fn watch_conversation(services: &Services) -> Result<Conversation<WatchValue>> {
    Conversation::builder("watch")
        .trigger(WATCH_TRIGGER)
        .step(AskDate)
        .step(ReadDate)
        .step(ReadClassType {
            lessons: Arc::clone(&services.lessons),
        })
        .step(ReadChoice)
        .finalizer(SaveWatch {
            store: Arc::clone(&services.store),
        })
        .build()
}

struct AskDate;

#[async_trait]
impl Step<WatchValue> for AskDate {
    async fn run(
        &self,
        ctx: HandleContext,
        _state: ConversationState<WatchValue>,
    ) -> Result<StepOutcome<WatchValue>> {
        ctx.respond("Hier gaan we! Op welke datum wil je sporten? (d-m-jjjj)")
            .await;
        Ok(StepOutcome::Accept(WatchValue::Prompted))
    }
}

struct ReadDate;

#[async_trait]
impl Step<WatchValue> for ReadDate {
    async fn run(
        &self,
        ctx: HandleContext,
        _state: ConversationState<WatchValue>,
    ) -> Result<StepOutcome<WatchValue>> {
        let date = ctx
            .update
            .as_message()
            .and_then(|message| parse_date(&message.text).ok());
        let (Some(date), Some(chat)) = (date, ctx.update.chat()) else {
            ctx.respond(format!(
                "Vul een geldige datum in, bijvoorbeeld {DATE_EXAMPLE}."
            ))
            .await;
            return Ok(StepOutcome::Reject);
        };

        let buttons = ClassType::ALL
            .into_iter()
            .map(|class_type| Button::new(class_type.label(), class_type.callback_data()))
            .collect();
        ctx.send(
            OutgoingMessage::text(chat, "Groepsles of vrije les?").with_keyboard_row(buttons),
        )
        .await;
        Ok(StepOutcome::Accept(WatchValue::Date(date)))
    }
}

struct ReadClassType {
    lessons: Arc<dyn LessonSource>,
}

#[async_trait]
impl Step<WatchValue> for ReadClassType {
    async fn run(
        &self,
        ctx: HandleContext,
        state: ConversationState<WatchValue>,
    ) -> Result<StepOutcome<WatchValue>> {
        let class_type = ctx
            .update
            .as_callback()
            .and_then(|query| ClassType::from_callback_data(&query.data));
        let Some(class_type) = class_type else {
            ctx.respond("Kies aub Groepsles of Vrij.").await;
            return Ok(StepOutcome::Reject);
        };

        let (from, to) = day_bounds(date_of(&state)?);
        let lessons = match self.lessons.lessons(from, to).await {
            Ok(lessons) => lessons,
            Err(e) => {
                error!(error = %e, "failed to fetch lessons");
                ctx.respond("De lessen konden niet worden opgehaald, probeer het opnieuw.")
                    .await;
                return Ok(StepOutcome::Reject);
            }
        };

        // Only full lessons can be watched; the listed numbers index this list.
        let lessons: Vec<Lesson> = lessons
            .into_iter()
            .filter(|lesson| class_type.matches(lesson) && !lesson.has_spots())
            .collect();
        if lessons.is_empty() {
            ctx.respond(format!(
                "Geen volle lessen van het type {class_type} gevonden op die dag, kies een ander type."
            ))
            .await;
            return Ok(StepOutcome::Reject);
        }

        let listing: String = lessons
            .iter()
            .enumerate()
            .map(|(number, lesson)| format_lesson(lesson, number))
            .collect();
        ctx.respond(format!(
            "Welk lesnummer wil je in de gaten houden? Hier zijn ze allemaal:{listing}"
        ))
        .await;
        Ok(StepOutcome::Accept(WatchValue::Lessons(lessons)))
    }
}

struct ReadChoice;

#[async_trait]
impl Step<WatchValue> for ReadChoice {
    async fn run(
        &self,
        ctx: HandleContext,
        state: ConversationState<WatchValue>,
    ) -> Result<StepOutcome<WatchValue>> {
        let number = ctx
            .update
            .as_message()
            .and_then(|message| message.text.trim().parse::<usize>().ok());
        let Some(number) = number else {
            ctx.respond("Ongeldig nummer, probeer opnieuw.").await;
            return Ok(StepOutcome::Reject);
        };

        if number >= lessons_of(&state)?.len() {
            ctx.respond("Geen les met dat nummer gevonden, probeer opnieuw.")
                .await;
            return Ok(StepOutcome::Reject);
        }
        Ok(StepOutcome::Accept(WatchValue::Choice(number)))
    }
}

struct SaveWatch {
    store: Arc<dyn Store>,
}

#[async_trait]
impl Finalizer<WatchValue> for SaveWatch {
    async fn finalize(&self, ctx: HandleContext, state: ConversationState<WatchValue>) -> Result<()> {
        let number = choice_of(&state)?;
        let lesson = lessons_of(&state)?
            .get(number)
            .ok_or_else(|| BotError::conversation_error(format!("no lesson {number}")))?;

        if lesson.start_timestamp < Utc::now().timestamp() {
            ctx.respond("Je kunt alleen lessen in de toekomst toevoegen, probeer opnieuw.")
                .await;
            return Ok(());
        }

        let user = attached_user(&ctx)?;
        if let Err(e) = self.store.create_watch(user, lesson).await {
            ctx.respond("Er ging iets fout bij het toevoegen van de notificatie.")
                .await;
            return Err(e);
        }

        ctx.respond(format!(
            "Notificatie aangezet voor les:{}",
            format_lesson(lesson, number)
        ))
        .await;
        Ok(())
    }
}
