//! Telemetry publishing.
//!
//! The consumer loop reports the current target geometry through a shared
//! key/value store. Every write overwrites the previous value under the same
//! key. Nothing is ever cleared: a cycle without a detection leaves the last
//! published value in place, so readers see the last known position.
//!
//! Store write failures are the store's concern; `set_string` has no error
//! path and implementations log instead.

mod memory;
mod mqtt;

pub use memory::InMemoryTelemetryStore;
pub use mqtt::{MqttSettings, MqttTelemetryStore};

use std::sync::Arc;

use crate::geometry::BoundingBox;

/// Process-wide string key/value store.
pub trait TelemetryStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    fn set_string(&self, key: &str, value: &str);
}

impl<T: TelemetryStore + ?Sized> TelemetryStore for Arc<T> {
    fn set_string(&self, key: &str, value: &str) {
        (**self).set_string(key, value)
    }
}

impl<T: TelemetryStore + ?Sized> TelemetryStore for Box<T> {
    fn set_string(&self, key: &str, value: &str) {
        (**self).set_string(key, value)
    }
}

/// Writes bounding boxes under one fixed key.
pub struct TelemetryPublisher<T> {
    store: T,
    key: String,
}

impl<T: TelemetryStore> TelemetryPublisher<T> {
    pub fn new(store: T, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Overwrite the key with the rectangle's canonical text form.
    pub fn publish(&self, rect: &BoundingBox) {
        self.store.set_string(&self.key, &rect.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_overwrites_fixed_key() {
        let store = InMemoryTelemetryStore::new();
        let publisher = TelemetryPublisher::new(store.clone(), "BallPosition");

        publisher.publish(&BoundingBox::new(1, 2, 3, 4));
        publisher.publish(&BoundingBox::new(10, 20, 40, 60));

        assert_eq!(store.get_string("BallPosition").as_deref(), Some("{10, 20, 40x60}"));
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.len(), 1);
    }
}
