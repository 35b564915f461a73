use std::fmt;

/// Connection state of the link to the vehicle receiver.
///
/// The `Display` form is what the status display shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport handle. Carries the transport's error code when the
    /// state was entered because a connect attempt failed.
    Disconnected(Option<String>),
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected(None) => f.write_str("Disconnected"),
            Self::Disconnected(Some(code)) => write!(f, "Disconnected: {}", code),
            Self::Connecting => f.write_str("Connecting..."),
            Self::Connected => f.write_str("Connected"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionState(ConnectionState),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Error,
}
