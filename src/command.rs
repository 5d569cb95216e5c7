use std::future::Future;

use async_trait::async_trait;

use crate::dispatcher::Handler;
use crate::error::Result;
use crate::types::HandleContext;

/// Callback bound to a [`CommandHandler`]. Implemented for async closures
/// taking the context and the command arguments.
#[async_trait]
pub trait CommandCallback: Send + Sync {
    async fn call(&self, ctx: HandleContext, args: Vec<String>) -> Result<()>;
}

#[async_trait]
impl<F, Fut> CommandCallback for F
where
    F: Fn(HandleContext, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: HandleContext, args: Vec<String>) -> Result<()> {
        (self)(ctx, args).await
    }
}

/// Handles `/name arg1 arg2 ...` messages for a fixed set of names.
pub struct CommandHandler {
    name: String,
    commands: Vec<String>,
    callback: Box<dyn CommandCallback>,
}

impl CommandHandler {
    /// The first command doubles as the handler's name in logs.
    pub fn new<I, S>(commands: I, callback: impl CommandCallback + 'static) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
        let name = commands
            .first()
            .map(|command| format!("/{command}"))
            .unwrap_or_else(|| "command".to_string());
        Self {
            name,
            commands,
            callback: Box::new(callback),
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

#[async_trait]
impl Handler for CommandHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_match(&self, ctx: &HandleContext) -> bool {
        match ctx.update.command() {
            Some(command) => self.commands.iter().any(|c| c == command),
            None => false,
        }
    }

    async fn handle(&self, ctx: HandleContext) -> Result<()> {
        let args = ctx
            .update
            .as_message()
            .map(|message| parse_args(&message.text))
            .unwrap_or_default();
        self.callback.call(ctx, args).await
    }
}

/// Whitespace separated words after the command token.
pub fn parse_args(text: &str) -> Vec<String> {
    text.split_whitespace().skip(1).map(str::to_string).collect()
}
