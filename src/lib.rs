#![warn(unused_crate_dependencies)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! A chat bot that lets users watch fully-booked fitness classes and tells
//! them when a spot frees up.
//!
//! # Architecture
//!
//! - [`UpdateSource`](types::UpdateSource) produces inbound updates and
//!   [`Sender`](types::Sender) delivers replies.
//! - The [`Dispatcher`](dispatcher::Dispatcher) runs
//!   [`Middleware`](dispatcher::Middleware) on every update and hands it to the
//!   first matching [`Handler`](dispatcher::Handler).
//! - [`CommandHandler`](command::CommandHandler) serves one-shot commands and
//!   [`Conversation`](conversation::Conversation) drives multi-step dialogues,
//!   one instance per user.
//! - The [`Poller`](checker::Poller) compares stored watches with live lesson
//!   availability on an interval.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use classwatch::conversation::{Conversation, ConversationState, StepOutcome};
//! use classwatch::types::{HandleContext, Sender, UpdateSource};
//! use classwatch::{Dispatcher, Result};
//!
//! # async fn ask(ctx: HandleContext, _: ConversationState<String>) -> Result<StepOutcome<String>> { Ok(StepOutcome::Accept(String::new())) }
//! # async fn read(ctx: HandleContext, _: ConversationState<String>) -> Result<StepOutcome<String>> { Ok(StepOutcome::Accept(String::new())) }
//! # async fn done(ctx: HandleContext, _: ConversationState<String>) -> Result<()> { Ok(()) }
//! # async fn run(sender: Arc<dyn Sender>, source: Box<dyn UpdateSource>) -> Result<()> {
//! let greeting = Conversation::builder("greeting")
//!     .trigger("hello")
//!     .step(ask)
//!     .step(read)
//!     .finalizer(done)
//!     .build()?;
//!
//! let mut dispatcher = Dispatcher::new(sender);
//! dispatcher.add_handler(Box::new(greeting));
//!
//! let mut set = dispatcher.run(source).await?;
//! while set.join_next().await.is_some() {}
//! # Ok(())
//! # }
//! ```

/// Availability polling
pub mod checker;

/// One-shot command handlers
pub mod command;

/// Environment configuration
pub mod config;

/// Per-user multi-step conversations
pub mod conversation;

/// Update routing through middleware to handlers
pub mod dispatcher;

/// Error types and handling
pub mod error;

/// The bot's commands and add-watch conversation
pub mod handlers;

/// Booking API types and client
pub mod lessons;

/// Log subscriber setup
#[cfg(feature = "subscriber")]
pub mod logging;

/// Prometheus metrics for monitoring
pub mod metrics;

/// The bot's middleware
pub mod middleware;

/// User and watch persistence
pub mod store;

/// Date parsing and formatting
pub mod times;

/// Core traits and types
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::{BotError, Result};
