use std::sync::Arc;

use log::info;

/// Fire-and-forget sink for user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("[Notify] {}", message);
    }
}

/// Forwards every message to each inner notifier.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, message: &str) {
        for sink in &self.sinks {
            sink.notify(message);
        }
    }
}
