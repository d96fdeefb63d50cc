use std::sync::Arc;
use tokio::sync::watch;

use crate::persistence::FlatStore;

/// Flat-store key read by the next boot to show why the system restarted.
pub const BOOT_MESSAGE_KEY: &str = "ryos:nextBootMessage";

pub const RESTORE_BOOT_MESSAGE: &str = "Restoring System...";
pub const RESET_BOOT_MESSAGE: &str = "Resetting System...";
pub const FORMAT_BOOT_MESSAGE: &str = "Formatting File System...";

/// Downstream hook that performs a full restart once storage has landed.
pub trait RestartTrigger: Send + Sync {
    fn request_restart(&self, message: &str);
}

/// Stores the boot message, then signals the server to shut down. The
/// process supervisor brings it back up on fresh storage handles.
pub struct ShutdownRestart {
    flat: Arc<dyn FlatStore>,
    shutdown: watch::Sender<bool>,
}

impl ShutdownRestart {
    pub fn new(flat: Arc<dyn FlatStore>, shutdown: watch::Sender<bool>) -> Self {
        Self { flat, shutdown }
    }
}

impl RestartTrigger for ShutdownRestart {
    fn request_restart(&self, message: &str) {
        if let Err(e) = self.flat.set(BOOT_MESSAGE_KEY, message) {
            tracing::warn!(error = %e, "Failed to store boot message");
        }
        tracing::info!(message, "Restart requested");
        let _ = self.shutdown.send(true);
    }
}

/// Take the pending boot message, if any.
pub fn take_boot_message(flat: &dyn FlatStore) -> Option<String> {
    let message = flat.get(BOOT_MESSAGE_KEY).ok().flatten()?;
    if let Err(e) = flat.remove(BOOT_MESSAGE_KEY) {
        tracing::warn!(error = %e, "Failed to clear boot message");
    }
    Some(message)
}
