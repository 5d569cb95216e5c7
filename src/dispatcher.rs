use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::{BotError, Result};
use crate::metrics::METRICS;
use crate::types::{HandleContext, Sender, Update, UpdateSource};

/// When a middleware runs relative to handler matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareMode {
    /// Runs to completion, in registration order, before any handler is
    /// matched. May enrich the context.
    Sync,
    /// Spawned as a detached task on a copy of the context. Has no ordering
    /// relative to the handler, and its changes to the context are never seen
    /// by it.
    Async,
}

/// Hook run against every supported update.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> MiddlewareMode;

    async fn process(&self, ctx: &mut HandleContext) -> Result<()>;
}

/// Something that can claim an update and handle it.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this handler claims the update. Called at most once per update,
    /// and implementations may record the claim (a conversation registers its
    /// instance here).
    fn is_match(&self, ctx: &HandleContext) -> bool;

    async fn handle(&self, ctx: HandleContext) -> Result<()>;
}

/// Routes updates through middleware to the first matching handler.
///
/// Every update is handled on its own task and handlers run on tasks of their
/// own, so there is no bound on in-flight work. The receive loop never waits
/// on either.
pub struct Dispatcher {
    /// Where handlers send their replies.
    sender: Arc<dyn Sender>,

    /// Middleware awaited before matching, in registration order.
    sync_middleware: Vec<Arc<dyn Middleware>>,

    /// Middleware spawned alongside the handler.
    async_middleware: Vec<Arc<dyn Middleware>>,

    /// Handlers in match priority order.
    handlers: Vec<Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self {
            sender,
            sync_middleware: vec![],
            async_middleware: vec![],
            handlers: vec![],
        }
    }

    /// Adds a middleware. Sync and async middleware keep their relative
    /// registration order within their own group.
    pub fn add_middleware(&mut self, middleware: Box<dyn Middleware>) {
        let middleware: Arc<dyn Middleware> = Arc::from(middleware);
        match middleware.mode() {
            MiddlewareMode::Sync => self.sync_middleware.push(middleware),
            MiddlewareMode::Async => self.async_middleware.push(middleware),
        }
    }

    /// Adds a handler. Earlier handlers win when several would match.
    pub fn add_handler(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(Arc::from(handler));
    }

    pub fn add_shared_handler(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Runs middleware for one update and spawns the first matching handler.
    ///
    /// Returns the handler task, or `None` when the update was dropped or no
    /// handler claimed it. Updates without a message or callback never reach
    /// middleware.
    pub async fn dispatch(&self, update: Update) -> Option<JoinHandle<()>> {
        if !update.is_supported() {
            METRICS.inc_updates_dropped();
            debug!(update = update.id, "dropping update without message or callback");
            return None;
        }

        let mut ctx = HandleContext::new(update, Arc::clone(&self.sender));

        for middleware in &self.sync_middleware {
            if let Err(e) = middleware.process(&mut ctx).await {
                METRICS.inc_middleware_errors(middleware.name());
                error!(
                    error = %e,
                    middleware = middleware.name(),
                    "middleware error"
                );
            }
        }

        for middleware in &self.async_middleware {
            let middleware = Arc::clone(middleware);
            let mut detached = ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = middleware.process(&mut detached).await {
                    METRICS.inc_middleware_errors(middleware.name());
                    error!(
                        error = %e,
                        middleware = middleware.name(),
                        "middleware error"
                    );
                }
            });
        }

        let Some(handler) = self.handlers.iter().find(|handler| handler.is_match(&ctx)) else {
            debug!(update = ctx.update.id, "no handler matched");
            return None;
        };

        METRICS.inc_updates_dispatched(handler.name());
        Some(tokio::spawn(run_handler(Arc::clone(handler), ctx)))
    }

    /// Starts consuming `source`. The returned set holds the receive loop; each
    /// update is dispatched on a task of its own.
    pub async fn run(self, source: Box<dyn UpdateSource>) -> Result<JoinSet<()>> {
        if self.handlers.is_empty() {
            warn!("dispatcher started without handlers, every update will be ignored");
        }

        let dispatcher = Arc::new(self);
        let mut set = JoinSet::new();

        set.spawn(async move {
            info!("starting update source... ");
            let mut updates = match source.updates().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(
                        error = %BotError::source_error_with_source("Failed to get update stream", e),
                        "source error"
                    );
                    return;
                }
            };

            while let Some(update) = updates.next().await {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.dispatch(update).await;
                });
            }

            info!("update stream ended");
        });

        Ok(set)
    }
}

async fn run_handler(handler: Arc<dyn Handler>, ctx: HandleContext) {
    let update = ctx.update.id;
    let start = Instant::now();

    match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            METRICS.record_error("handler", e.kind());
            error!(error = %e, handler = handler.name(), update, "handler error");
        }
        Err(_) => {
            METRICS.record_error("handler", "panic");
            error!(handler = handler.name(), update, "handler panicked");
        }
    }

    METRICS.record_handler_duration(handler.name(), start.elapsed().as_secs_f64());
}
