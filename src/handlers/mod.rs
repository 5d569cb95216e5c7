//! Command handlers and the add-watch conversation of the class-watch bot.

mod watch;

use std::sync::Arc;

use tracing::error;

use crate::command::CommandHandler;
use crate::dispatcher::Dispatcher;
use crate::error::{BotError, Result};
use crate::lessons::{Lesson, LessonSource};
use crate::middleware::{EnsureUser, LogUpdate};
use crate::store::{Store, User, Watch};
use crate::times::{format_timestamp, DATE_LAYOUT, FULL_LAYOUT, TIME_LAYOUT};
use crate::types::{ChatId, HandleContext, Sender};

pub use watch::{watch_conversation, WatchValue, WATCH_TRIGGER};

pub const HELP_TEXT: &str = "Te gebruiken commando's:
- /noti: voeg een notificatie toe voor een volle les
- /notifications: bekijk je notificaties
- /remove {nummer}: verwijder de notificatie met dat nummer
- /clear: verwijder al je notificaties";

/// Collaborators shared by the handlers.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub lessons: Arc<dyn LessonSource>,
    pub admin_chat: Option<ChatId>,
}

/// Dispatcher with the bot's middleware, commands and the add-watch
/// conversation. Commands come first so `/help` keeps working in the middle of
/// a conversation.
pub fn build_dispatcher(sender: Arc<dyn Sender>, services: &Services) -> Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new(sender);
    dispatcher.add_middleware(Box::new(EnsureUser::new(Arc::clone(&services.store))));
    dispatcher.add_middleware(Box::new(LogUpdate));

    dispatcher.add_handler(Box::new(help_command()));
    dispatcher.add_handler(Box::new(list_command(services.clone())));
    dispatcher.add_handler(Box::new(remove_command(services.clone())));
    dispatcher.add_handler(Box::new(clear_command(services.clone())));
    dispatcher.add_handler(Box::new(watch_conversation(services)?));
    Ok(dispatcher)
}

pub fn help_command() -> CommandHandler {
    CommandHandler::new(["help", "start"], send_help)
}

async fn send_help(ctx: HandleContext, _args: Vec<String>) -> Result<()> {
    ctx.respond(HELP_TEXT).await;
    Ok(())
}

pub fn list_command(services: Services) -> CommandHandler {
    CommandHandler::new(
        ["notificaties", "notifications"],
        move |ctx: HandleContext, _args: Vec<String>| {
            let services = services.clone();
            async move { list_watches(&services, &ctx).await }
        },
    )
}

pub fn remove_command(services: Services) -> CommandHandler {
    CommandHandler::new(
        ["verwijder", "remove"],
        move |ctx: HandleContext, args: Vec<String>| {
            let services = services.clone();
            async move { remove_watch(&services, &ctx, &args).await }
        },
    )
}

pub fn clear_command(services: Services) -> CommandHandler {
    CommandHandler::new(["clear"], move |ctx: HandleContext, _args: Vec<String>| {
        let services = services.clone();
        async move { clear_watches(&services, &ctx).await }
    })
}

async fn list_watches(services: &Services, ctx: &HandleContext) -> Result<()> {
    let user = attached_user(ctx)?;
    let admin = user.is_admin(services.admin_chat);

    let watches = if admin {
        services.store.all_watches().await
    } else {
        services.store.watches_for_user(user.id).await
    };
    let watches = match watches {
        Ok(watches) => watches,
        Err(e) => {
            error!(error = %e, user = %user.id, "failed to list watches");
            ctx.respond("Er ging iets fout, probeer het opnieuw.").await;
            return Ok(());
        }
    };

    if watches.is_empty() {
        ctx.respond("Geen notificaties gevonden.").await;
        return Ok(());
    }

    let text: String = watches
        .iter()
        .map(|watch| format_watch(watch, admin))
        .collect();
    ctx.respond(text).await;
    Ok(())
}

async fn clear_watches(services: &Services, ctx: &HandleContext) -> Result<()> {
    let user = attached_user(ctx)?;
    if let Err(e) = services.store.clear_watches(user.id).await {
        ctx.respond("Er ging iets fout bij het verwijderen, probeer het opnieuw.")
            .await;
        return Err(e);
    }
    ctx.respond("Notificaties verwijderd.").await;
    Ok(())
}

async fn remove_watch(services: &Services, ctx: &HandleContext, args: &[String]) -> Result<()> {
    let user = attached_user(ctx)?;

    let [arg] = args else {
        ctx.respond("Stuur het nummer van de notificatie mee, bijvoorbeeld: /remove 1")
            .await;
        return Ok(());
    };
    let Ok(id) = arg.parse::<u64>() else {
        ctx.respond("Dat is geen geldig nummer.").await;
        return Ok(());
    };

    let watch = match services.store.find_watch(id).await {
        Ok(Some(watch)) => watch,
        Ok(None) => {
            ctx.respond("Er bestaat geen notificatie met dat nummer.").await;
            return Ok(());
        }
        Err(e) => {
            ctx.respond("Er ging iets fout bij het ophalen van de notificatie, probeer het opnieuw.")
                .await;
            return Err(e);
        }
    };

    if watch.owner.id != user.id && !user.is_admin(services.admin_chat) {
        ctx.respond("Deze notificatie is van iemand anders, je kunt hem niet verwijderen.")
            .await;
        return Ok(());
    }

    if let Err(e) = services.store.delete_watch(id).await {
        ctx.respond("Er ging iets fout bij het verwijderen, probeer het opnieuw.")
            .await;
        return Err(e);
    }
    ctx.respond("Notificatie verwijderd.").await;
    Ok(())
}

fn attached_user(ctx: &HandleContext) -> Result<&User> {
    ctx.user
        .as_ref()
        .ok_or_else(|| BotError::handler_error(format!("no user attached to update {}", ctx.update.id)))
}

pub fn format_lesson(lesson: &Lesson, number: usize) -> String {
    format!(
        "\nNummer: {}\nActiviteit: {}\nStart: {}\nEind: {}\n",
        number,
        lesson.activity.name,
        format_timestamp(lesson.start_timestamp, TIME_LAYOUT),
        format_timestamp(lesson.end_timestamp(), TIME_LAYOUT),
    )
}

pub fn format_watch(watch: &Watch, with_owner: bool) -> String {
    let mut text = String::new();
    if with_owner {
        text.push_str(&format!("\nNaam: {}", watch.owner.name));
    }
    text.push_str(&format!(
        "\nNummer: {}\nActiviteit: {}\nDatum: {}\nStart: {}\nEind: {}\nGemaakt: {}\n",
        watch.id,
        watch.lesson.activity.name,
        format_timestamp(watch.lesson.start_timestamp, DATE_LAYOUT),
        format_timestamp(watch.lesson.start_timestamp, TIME_LAYOUT),
        format_timestamp(watch.lesson.end_timestamp(), TIME_LAYOUT),
        format_timestamp(watch.created_at.timestamp(), FULL_LAYOUT),
    ));
    text
}
