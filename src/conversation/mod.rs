//! Multi-step conversations, one instance per originator.
//!
//! A [`Conversation`] is a [`Handler`] defined by start triggers, an ordered
//! list of [`Step`]s and a [`Finalizer`]. A trigger command from an originator
//! without an instance registers one; from then on every update from that
//! originator is claimed by the conversation until the last step accepts and
//! the finalizer has run.
//!
//! Updates from one originator are serialized by the instance lock, so two
//! quick messages never run the same step twice. Arrival order at the lock is
//! not guaranteed. Instances that are never finished stay registered.

mod registry;
mod state;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::dispatcher::Handler;
use crate::error::{BotError, Result};
use crate::metrics::METRICS;
use crate::types::{HandleContext, OriginatorId};

pub use registry::{Instance, InstanceRegistry, MemoryRegistry};
pub use state::{ConversationState, StepOutcome};

/// One stage of a conversation.
#[async_trait]
pub trait Step<V>: Send + Sync {
    async fn run(&self, ctx: HandleContext, state: ConversationState<V>) -> Result<StepOutcome<V>>;
}

#[async_trait]
impl<V, F, Fut> Step<V> for F
where
    V: Send + Sync + 'static,
    F: Fn(HandleContext, ConversationState<V>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome<V>>> + Send + 'static,
{
    async fn run(&self, ctx: HandleContext, state: ConversationState<V>) -> Result<StepOutcome<V>> {
        (self)(ctx, state).await
    }
}

/// Runs once the last step accepted, with every step's result.
///
/// Errors are reported to the caller, but the conversation is over either way;
/// telling the user is up to the finalizer.
#[async_trait]
pub trait Finalizer<V>: Send + Sync {
    async fn finalize(&self, ctx: HandleContext, state: ConversationState<V>) -> Result<()>;
}

#[async_trait]
impl<V, F, Fut> Finalizer<V> for F
where
    V: Send + Sync + 'static,
    F: Fn(HandleContext, ConversationState<V>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn finalize(&self, ctx: HandleContext, state: ConversationState<V>) -> Result<()> {
        (self)(ctx, state).await
    }
}

/// Collects the parts of a [`Conversation`]. Created by
/// [`Conversation::builder`].
pub struct ConversationBuilder<V> {
    name: String,
    triggers: Vec<String>,
    steps: Vec<Box<dyn Step<V>>>,
    finalizer: Option<Box<dyn Finalizer<V>>>,
    registry: Option<Arc<dyn InstanceRegistry<V>>>,
}

impl<V> ConversationBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Starts an empty definition. `name` labels logs and metrics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: vec![],
            steps: vec![],
            finalizer: None,
            registry: None,
        }
    }

    /// Command name (without slash) that starts the conversation.
    pub fn trigger(mut self, command: impl Into<String>) -> Self {
        self.triggers.push(command.into());
        self
    }

    /// Appends a step. Steps run in the order they are added, one per
    /// accepted update.
    pub fn step(mut self, step: impl Step<V> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Sets what runs after the last step accepts. Replaces any earlier one.
    pub fn finalizer(mut self, finalizer: impl Finalizer<V> + 'static) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Registry to keep instances in. Defaults to a fresh [`MemoryRegistry`].
    pub fn registry(mut self, registry: Arc<dyn InstanceRegistry<V>>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fails with a config error when triggers, steps or the finalizer are
    /// missing.
    pub fn build(self) -> Result<Conversation<V>> {
        if self.triggers.is_empty() {
            return Err(BotError::config_error(format!(
                "conversation {} has no start trigger",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(BotError::config_error(format!(
                "conversation {} has no steps",
                self.name
            )));
        }
        let Some(finalizer) = self.finalizer else {
            return Err(BotError::config_error(format!(
                "conversation {} has no finalizer",
                self.name
            )));
        };

        Ok(Conversation {
            name: self.name,
            triggers: self.triggers,
            steps: self.steps,
            finalizer,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(MemoryRegistry::new())),
        })
    }
}

/// A multi-step dialogue, usable as a [`Handler`].
pub struct Conversation<V> {
    name: String,
    triggers: Vec<String>,
    steps: Vec<Box<dyn Step<V>>>,
    finalizer: Box<dyn Finalizer<V>>,
    registry: Arc<dyn InstanceRegistry<V>>,
}

impl<V> Conversation<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Shorthand for [`ConversationBuilder::new`].
    pub fn builder(name: impl Into<String>) -> ConversationBuilder<V> {
        ConversationBuilder::new(name)
    }

    /// Where this conversation keeps its instances.
    pub fn registry(&self) -> &Arc<dyn InstanceRegistry<V>> {
        &self.registry
    }

    /// Number of steps before the finalizer runs.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Whether `originator` has an instance in progress.
    pub fn is_active(&self, originator: OriginatorId) -> bool {
        self.registry.get(originator).is_some()
    }

    fn report_active(&self) {
        METRICS.set_conversations_active(&self.name, self.registry.len() as i64);
    }
}

#[async_trait]
impl<V> Handler for Conversation<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    /// Claims every update from an originator with an instance in progress.
    /// A trigger command from anyone else starts a new instance as part of
    /// the match.
    fn is_match(&self, ctx: &HandleContext) -> bool {
        let Some(originator) = ctx.update.originator() else {
            return false;
        };
        if self.registry.get(originator).is_some() {
            return true;
        }

        let Some(command) = ctx.update.command() else {
            return false;
        };
        if !self.triggers.iter().any(|trigger| trigger == command) {
            return false;
        }

        let (_, created) = self.registry.get_or_insert(originator);
        if created {
            info!(conversation = %self.name, originator = %originator, "conversation started");
            self.report_active();
        }
        true
    }

    async fn handle(&self, ctx: HandleContext) -> Result<()> {
        let Some(originator) = ctx.update.originator() else {
            return Ok(());
        };
        let Some(instance) = self.registry.get(originator) else {
            METRICS.record_error("conversation", "missing_instance");
            warn!(conversation = %self.name, originator = %originator, "no conversation instance for matched update");
            return Ok(());
        };

        let mut state = instance.lock().await;
        if state.finished {
            METRICS.record_error("conversation", "missing_instance");
            warn!(conversation = %self.name, originator = %originator, "conversation finished while update was waiting");
            return Ok(());
        }

        let index = state.results.len();
        let Some(step) = self.steps.get(index) else {
            return Err(BotError::conversation_error(format!(
                "conversation {} has no step {index}",
                self.name
            )));
        };

        let snapshot = ConversationState::new(state.results.clone());
        let outcome = match AssertUnwindSafe(step.run(ctx.clone(), snapshot))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                METRICS.inc_conversation_step(&self.name, "error");
                return Err(BotError::conversation_error(format!(
                    "step {index} of {} panicked",
                    self.name
                )));
            }
        };

        let value = match outcome {
            Ok(StepOutcome::Accept(value)) => value,
            Ok(StepOutcome::Reject) => {
                METRICS.inc_conversation_step(&self.name, "reject");
                debug!(conversation = %self.name, originator = %originator, step = index, "step rejected input");
                return Ok(());
            }
            Err(e) => {
                METRICS.inc_conversation_step(&self.name, "error");
                return Err(BotError::conversation_error_with_source(
                    format!("step {index} of {} failed", self.name),
                    e,
                ));
            }
        };

        METRICS.inc_conversation_step(&self.name, "accept");
        state.results.push(value);
        debug!(conversation = %self.name, originator = %originator, step = index, "step accepted");

        if state.results.len() < self.steps.len() {
            return Ok(());
        }

        state.finished = true;
        let results = ConversationState::new(std::mem::take(&mut state.results));
        let finalized = AssertUnwindSafe(self.finalizer.finalize(ctx, results))
            .catch_unwind()
            .await;

        self.registry.remove(originator, &instance);
        self.report_active();
        drop(state);

        match finalized {
            Ok(Ok(())) => {
                info!(
                    conversation = %self.name,
                    originator = %originator,
                    elapsed_ms = instance.age().as_millis() as u64,
                    "conversation finished"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(BotError::conversation_error_with_source(
                format!("finalizer of {} failed", self.name),
                e,
            )),
            Err(_) => Err(BotError::conversation_error(format!(
                "finalizer of {} panicked",
                self.name
            ))),
        }
    }
}
