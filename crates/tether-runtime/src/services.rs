//! Notification services scripts reach through `$notify`, `$log`, `$error`
//! and `console`
//!
//! Services run while the isolate lock is held and must not call back into
//! the runtime.

use parking_lot::Mutex;

pub trait HostServices: Send + Sync {
    fn notify(&self, text: &str);
    fn log(&self, text: &str);
    fn error(&self, text: &str);
}

/// Forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingServices;

impl HostServices for TracingServices {
    fn notify(&self, text: &str) {
        tracing::info!(target: "tether::notify", "{}", text);
    }

    fn log(&self, text: &str) {
        tracing::info!(target: "tether::script", "{}", text);
    }

    fn error(&self, text: &str) {
        tracing::error!(target: "tether::script", "{}", text);
    }
}

/// Which service a message went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Notify,
    Log,
    Error,
}

/// Keeps every message in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingServices {
    messages: Mutex<Vec<(Channel, String)>>,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Channel, String)> {
        self.messages.lock().clone()
    }

    /// Messages sent to one channel
    pub fn channel(&self, channel: Channel) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    fn push(&self, channel: Channel, text: &str) {
        self.messages.lock().push((channel, text.to_string()));
    }
}

impl HostServices for RecordingServices {
    fn notify(&self, text: &str) {
        self.push(Channel::Notify, text);
    }

    fn log(&self, text: &str) {
        self.push(Channel::Log, text);
    }

    fn error(&self, text: &str) {
        self.push(Channel::Error, text);
    }
}
