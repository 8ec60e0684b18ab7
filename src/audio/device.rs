//! Output device configuration tracking
//!
//! The playback device's sample rate and channel count are process-wide
//! facts. [`DeviceConfigHub`] holds the latest snapshot and fans change
//! notifications out to subscribed sessions, which subscribe on start and
//! unsubscribe on stop.

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};

/// Sample rate and channel count the audio sink expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelExpectation {
    pub sample_rate: u32,
    pub channels: u16,
}

impl ChannelExpectation {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels as usize
    }
}

impl Default for ChannelExpectation {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS)
    }
}

impl std::fmt::Display for ChannelExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz / {} ch", self.sample_rate, self.channels)
    }
}

/// Identifies one subscription on a [`DeviceConfigHub`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ConfigListener = Arc<dyn Fn(ChannelExpectation) + Send + Sync>;

/// Process-wide output device configuration
pub struct DeviceConfigHub {
    current: AtomicCell<ChannelExpectation>,
    listeners: Mutex<Vec<(SubscriptionId, ConfigListener)>>,
    next_id: AtomicU64,
}

impl DeviceConfigHub {
    pub fn new(initial: ChannelExpectation) -> Self {
        Self {
            current: AtomicCell::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The shared hub for this process
    pub fn global() -> Arc<DeviceConfigHub> {
        static GLOBAL: OnceLock<Arc<DeviceConfigHub>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(DeviceConfigHub::new(ChannelExpectation::default())))
            .clone()
    }

    /// Latest known configuration
    pub fn current(&self) -> ChannelExpectation {
        self.current.load()
    }

    /// Register `listener` for configuration changes
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(ChannelExpectation) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Publish a new configuration; listeners run only if it changed
    pub fn notify_changed(&self, config: ChannelExpectation) -> bool {
        let previous = self.current.swap(config);
        if previous == config {
            return false;
        }

        tracing::info!("Output device configuration changed: {} -> {}", previous, config);

        // Call outside the lock so listeners may (un)subscribe
        let listeners: Vec<ConfigListener> =
            self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(config);
        }
        true
    }
}

impl Default for DeviceConfigHub {
    fn default() -> Self {
        Self::new(ChannelExpectation::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_reaches_subscribers() {
        let hub = DeviceConfigHub::default();
        let seen = Arc::new(AtomicCell::new(ChannelExpectation::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        let calls_clone = calls.clone();
        let id = hub.subscribe(move |config| {
            seen_clone.store(config);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let surround = ChannelExpectation::new(44100, 6);
        assert!(hub.notify_changed(surround));
        assert_eq!(seen.load(), surround);
        assert_eq!(hub.current(), surround);

        // Same value again is not a change
        assert!(!hub.notify_changed(surround));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.notify_changed(ChannelExpectation::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_global_is_shared() {
        let a = DeviceConfigHub::global();
        let b = DeviceConfigHub::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
