use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Middleware error: {message}")]
    MiddlewareError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Handler error: {message}")]
    HandlerError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Conversation error: {message}")]
    ConversationError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Send error: {message}")]
    SendError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Update source error: {message}")]
    SourceError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Store error: {message}")]
    StoreError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Lessons error: {message}")]
    LessonsError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error("Config error: {message}")]
    ConfigError {
        message: String,
        source: Option<BoxedSource>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    pub fn middleware_error(message: impl Into<String>) -> Self {
        Self::MiddlewareError {
            message: message.into(),
            source: None,
        }
    }

    pub fn middleware_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::MiddlewareError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn handler_error(message: impl Into<String>) -> Self {
        Self::HandlerError {
            message: message.into(),
            source: None,
        }
    }

    pub fn handler_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::HandlerError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn conversation_error(message: impl Into<String>) -> Self {
        Self::ConversationError {
            message: message.into(),
            source: None,
        }
    }

    pub fn conversation_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::ConversationError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn send_error(message: impl Into<String>) -> Self {
        Self::SendError {
            message: message.into(),
            source: None,
        }
    }

    pub fn send_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::SendError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn source_error(message: impl Into<String>) -> Self {
        Self::SourceError {
            message: message.into(),
            source: None,
        }
    }

    pub fn source_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::SourceError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn store_error(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::StoreError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn lessons_error(message: impl Into<String>) -> Self {
        Self::LessonsError {
            message: message.into(),
            source: None,
        }
    }

    pub fn lessons_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::LessonsError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_error_with_source(
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Short label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MiddlewareError { .. } => "middleware",
            Self::HandlerError { .. } => "handler",
            Self::ConversationError { .. } => "conversation",
            Self::SendError { .. } => "send",
            Self::SourceError { .. } => "source",
            Self::StoreError { .. } => "store",
            Self::LessonsError { .. } => "lessons",
            Self::ConfigError { .. } => "config",
            Self::Other(_) => "other",
        }
    }
}
