//! Middleware used by the class-watch bot.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::dispatcher::{Middleware, MiddlewareMode};
use crate::error::{BotError, Result};
use crate::store::{Store, User};
use crate::types::HandleContext;

/// Attaches the sender's user record to the context, creating it on first
/// contact.
pub struct EnsureUser {
    store: Arc<dyn Store>,
}

impl EnsureUser {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Middleware for EnsureUser {
    fn name(&self) -> &str {
        "ensure_user"
    }

    fn mode(&self) -> MiddlewareMode {
        MiddlewareMode::Sync
    }

    async fn process(&self, ctx: &mut HandleContext) -> Result<()> {
        let (Some(profile), Some(chat)) = (ctx.update.profile(), ctx.update.chat()) else {
            return Ok(());
        };

        let user = self
            .store
            .find_or_create_user(User::from_profile(profile, chat))
            .await
            .map_err(|e| {
                BotError::middleware_error_with_source(
                    format!("Failed to load user {}", profile.id),
                    e,
                )
            })?;
        ctx.user = Some(user);
        Ok(())
    }
}

/// Logs every incoming message.
pub struct LogUpdate;

#[async_trait]
impl Middleware for LogUpdate {
    fn name(&self) -> &str {
        "log_update"
    }

    fn mode(&self) -> MiddlewareMode {
        MiddlewareMode::Async
    }

    async fn process(&self, ctx: &mut HandleContext) -> Result<()> {
        if let Some(message) = ctx.update.as_message() {
            info!(
                from = %message.from.first_name,
                originator = %message.from.id,
                text = %message.text,
                "message received"
            );
        } else if let Some(query) = ctx.update.as_callback() {
            info!(
                from = %query.from.first_name,
                originator = %query.from.id,
                data = %query.data,
                "callback received"
            );
        }
        Ok(())
    }
}
