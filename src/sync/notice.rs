use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A user-visible message raised by a sync cache or the waitlist flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => write!(f, "{}", self.message),
            NoticeLevel::Success => write!(f, "✓ {}", self.message),
            NoticeLevel::Error => write!(f, "Error: {}", self.message),
        }
    }
}

/// Sending half of the notice channel. Cloned into every cache.
#[derive(Debug, Clone)]
pub struct NoticeSink {
    sender: Option<mpsc::UnboundedSender<Notice>>,
}

impl NoticeSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that only logs.
    pub fn discard() -> Self {
        Self { sender: None }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(NoticeLevel::Error, message);
    }

    fn emit(&self, level: NoticeLevel, message: String) {
        if let Some(sender) = &self.sender {
            // Receiver gone means nobody is listening anymore
            let _ = sender.send(Notice { level, message });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (sink, mut receiver) = NoticeSink::channel();
        sink.success("Saved");
        sink.error("Failed");

        assert_eq!(receiver.try_recv().unwrap().level, NoticeLevel::Success);
        let error = receiver.try_recv().unwrap();
        assert_eq!(error.to_string(), "Error: Failed");
    }

    #[test]
    fn test_discard_does_not_panic() {
        NoticeSink::discard().error("ignored");
    }
}
