use std::sync::{Arc, Mutex};

use super::{Notification, Notifier};

/// Keeps every dispatched notification for later inspection.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, oldest first.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// How many notifications of the given kind were dispatched.
    pub fn count(&self, kind: &str) -> usize {
        self.sent().iter().filter(|n| n.kind() == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}
