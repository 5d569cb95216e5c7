use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::Stream;
use tracing::error;

use crate::error::Result;
use crate::store::User;

/// Stable identity of the person sending updates. Conversation instances are
/// keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginatorId(pub i64);

impl fmt::Display for OriginatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination a reply is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: OriginatorId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl Profile {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id: OriginatorId(id),
            first_name: first_name.into(),
            last_name: None,
            username: None,
        }
    }

    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: Profile,
    pub chat: ChatId,
    pub text: String,
}

impl Message {
    /// The command name when the text is a bot command, without the leading
    /// slash or an `@botname` suffix.
    pub fn command(&self) -> Option<&str> {
        let token = self.text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    pub fn is_command(&self) -> bool {
        self.command().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Profile,
    pub chat: ChatId,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePayload {
    Message(Message),
    CallbackQuery(CallbackQuery),
    /// Anything else the platform delivers (edits, joins, polls). Dropped by
    /// the dispatcher.
    Unsupported,
}

/// Inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub id: u64,
    pub payload: UpdatePayload,
}

impl Update {
    pub fn message(id: u64, from: Profile, chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            id,
            payload: UpdatePayload::Message(Message {
                from,
                chat,
                text: text.into(),
            }),
        }
    }

    pub fn callback(id: u64, from: Profile, chat: ChatId, data: impl Into<String>) -> Self {
        Self {
            id,
            payload: UpdatePayload::CallbackQuery(CallbackQuery {
                id: id.to_string(),
                from,
                chat,
                data: data.into(),
            }),
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match &self.payload {
            UpdatePayload::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&CallbackQuery> {
        match &self.payload {
            UpdatePayload::CallbackQuery(query) => Some(query),
            _ => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self.payload, UpdatePayload::Unsupported)
    }

    pub fn profile(&self) -> Option<&Profile> {
        match &self.payload {
            UpdatePayload::Message(message) => Some(&message.from),
            UpdatePayload::CallbackQuery(query) => Some(&query.from),
            UpdatePayload::Unsupported => None,
        }
    }

    /// Message sender or callback sender.
    pub fn originator(&self) -> Option<OriginatorId> {
        self.profile().map(|profile| profile.id)
    }

    pub fn chat(&self) -> Option<ChatId> {
        match &self.payload {
            UpdatePayload::Message(message) => Some(message.chat),
            UpdatePayload::CallbackQuery(query) => Some(query.chat),
            UpdatePayload::Unsupported => None,
        }
    }

    /// Command name of a message update.
    pub fn command(&self) -> Option<&str> {
        self.as_message().and_then(Message::command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat: ChatId,
    pub text: String,
    /// Inline keyboard rows; pressing a button produces a callback update
    /// carrying the button's data.
    pub keyboard: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn text(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat,
            text: text.into(),
            keyboard: vec![],
        }
    }

    pub fn with_keyboard_row(mut self, row: Vec<Button>) -> Self {
        self.keyboard.push(row);
        self
    }
}

/// A stream of updates, as returned by an [`UpdateSource`].
pub type UpdateStream<'a> = Pin<Box<dyn Stream<Item = Update> + Send + 'a>>;

/// Produces the inbound update stream. The stream is expected to run until the
/// process shuts down.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn updates(&self) -> Result<UpdateStream<'_>>;
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<()>;
}

/// Per-update state handed to middleware and handlers.
#[derive(Clone)]
pub struct HandleContext {
    pub update: Update,
    pub sender: Arc<dyn Sender>,
    /// Filled in by synchronous middleware.
    pub user: Option<User>,
}

impl HandleContext {
    pub fn new(update: Update, sender: Arc<dyn Sender>) -> Self {
        Self {
            update,
            sender,
            user: None,
        }
    }

    /// Sends `text` to the chat the update came from. Failures are logged and
    /// otherwise ignored.
    pub async fn respond(&self, text: impl Into<String>) {
        let Some(chat) = self.update.chat() else {
            return;
        };
        self.send(OutgoingMessage::text(chat, text)).await;
    }

    pub async fn send(&self, message: OutgoingMessage) {
        let chat = message.chat;
        if let Err(e) = self.sender.send(message).await {
            error!(error = %e, chat = %chat, "failed to send reply");
        }
    }
}

impl fmt::Debug for HandleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleContext")
            .field("update", &self.update)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> Message {
        Message {
            from: Profile::new(1, "Ada"),
            chat: ChatId(1),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(message("/noti").command(), Some("noti"));
        assert_eq!(message("/remove 4").command(), Some("remove"));
        assert_eq!(message("/help@classwatch_bot").command(), Some("help"));
        assert_eq!(message("noti").command(), None);
        assert_eq!(message("/").command(), None);
        assert_eq!(message("").command(), None);
    }

    #[test]
    fn test_originator_of_each_payload() {
        let profile = Profile::new(7, "Ada");
        let update = Update::message(1, profile.clone(), ChatId(70), "hi");
        assert_eq!(update.originator(), Some(OriginatorId(7)));
        assert_eq!(update.chat(), Some(ChatId(70)));

        let update = Update::callback(2, profile, ChatId(70), "free_practise");
        assert_eq!(update.originator(), Some(OriginatorId(7)));
        assert!(update.command().is_none());

        let update = Update {
            id: 3,
            payload: UpdatePayload::Unsupported,
        };
        assert!(update.originator().is_none());
        assert!(!update.is_supported());
    }

    #[test]
    fn test_full_name() {
        let mut profile = Profile::new(1, "Ada");
        assert_eq!(profile.full_name(), "Ada");
        profile.last_name = Some("Lovelace".into());
        assert_eq!(profile.full_name(), "Ada Lovelace");
    }
}
