use async_trait::async_trait;
use skintrack_core::notify::error::NotifyError;
use skintrack_core::notify::port::Notifier;
use tracing::info;

/// # Summary
/// A notifier that writes alerts to the tracing log. Always enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        info!(subject, content, "Notification");
        Ok(())
    }
}
