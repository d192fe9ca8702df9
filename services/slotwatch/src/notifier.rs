//! Notifier trait for announcing found dates

use async_trait::async_trait;

/// A notification to be sent
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
}

/// Trait for sending notifications
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Get the notifier type name (e.g. "telegram")
    fn type_name(&self) -> &str;

    /// Send a notification
    async fn notify(&self, notification: &Notification) -> crate::Result<()>;
}
