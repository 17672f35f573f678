// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process fan-out of measurement events.
//!
//! The bus dispatches synchronously: `publish` invokes every subscriber on
//! the calling task, in subscription order, before returning. Subscribers
//! that panic are isolated and logged so a misbehaving consumer cannot
//! starve the others.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use chrono::Utc;
//! use drover_core::bus::{InMemoryMeasurementEventBus, MeasurementEventBus};
//! use drover_core::types::{DeviceId, MeasurementDefinition, MeasurementEvent,
//!     MeasurementSample, SampleValue};
//!
//! let bus = InMemoryMeasurementEventBus::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! let handle = bus.subscribe_fn(move |event| {
//!     sink.lock().unwrap().push(event.device_id().clone());
//! });
//!
//! let def = MeasurementDefinition::coil("c0", 0).unwrap();
//! bus.publish(&MeasurementEvent::new(
//!     DeviceId::new("plc-001"),
//!     Utc::now(),
//!     vec![MeasurementSample::new(def, SampleValue::Bool(true))],
//! ));
//!
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! drop(handle); // unsubscribes
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::types::MeasurementEvent;

// =============================================================================
// Subscriber Types
// =============================================================================

/// A subscriber callback invoked for every published event.
pub type EventConsumer = Box<dyn Fn(&MeasurementEvent) + Send + Sync>;

type SubscriberList = RwLock<Vec<(u64, Arc<dyn Fn(&MeasurementEvent) + Send + Sync>)>>;

// =============================================================================
// MeasurementEventBus Trait
// =============================================================================

/// Fan-out of [`MeasurementEvent`]s to registered subscribers.
pub trait MeasurementEventBus: Send + Sync {
    /// Publishes an event to every current subscriber, synchronously and in
    /// subscription order.
    fn publish(&self, event: &MeasurementEvent);

    /// Registers a subscriber. Dropping (or [`close`](Subscription::close)-ing)
    /// the returned handle removes it.
    fn subscribe(&self, consumer: EventConsumer) -> Subscription;
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle for an active subscription.
///
/// The subscription stays active for the lifetime of the handle; dropping it
/// removes the subscriber from the bus.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    /// Explicitly ends the subscription.
    ///
    /// Equivalent to dropping the handle.
    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

// =============================================================================
// InMemoryMeasurementEventBus
// =============================================================================

/// Thread-safe in-memory implementation of [`MeasurementEventBus`].
///
/// Publishing takes a snapshot of the subscriber list, so subscribing or
/// unsubscribing while a publish is in progress is safe; the in-progress
/// publish keeps delivering to the snapshot it started with.
pub struct InMemoryMeasurementEventBus {
    subscribers: Arc<SubscriberList>,
    next_id: AtomicU64,
}

impl InMemoryMeasurementEventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a closure subscriber without the boxing ceremony.
    pub fn subscribe_fn<F>(&self, consumer: F) -> Subscription
    where
        F: Fn(&MeasurementEvent) + Send + Sync + 'static,
    {
        self.subscribe(Box::new(consumer))
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for InMemoryMeasurementEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementEventBus for InMemoryMeasurementEventBus {
    fn publish(&self, event: &MeasurementEvent) {
        let snapshot: Vec<_> = self.subscribers.read().clone();

        for (id, consumer) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| consumer(event)));
            if outcome.is_err() {
                tracing::warn!(
                    subscriber = id,
                    device_id = %event.device_id(),
                    "Measurement subscriber panicked; continuing fan-out"
                );
            }
        }
    }

    fn subscribe(&self, consumer: EventConsumer) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::from(consumer)));

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }
}

impl std::fmt::Debug for InMemoryMeasurementEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMeasurementEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceId, MeasurementDefinition, MeasurementSample, SampleValue};
    use chrono::Utc;
    use std::sync::Mutex;

    fn sample_event(device: &str) -> MeasurementEvent {
        let def = MeasurementDefinition::holding_register("hr", 0).unwrap();
        MeasurementEvent::new(
            DeviceId::new(device),
            Utc::now(),
            vec![MeasurementSample::new(def, SampleValue::Word(1))],
        )
    }

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = InMemoryMeasurementEventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let _a = bus.subscribe_fn(move |_| o.lock().unwrap().push("first"));
        let o = order.clone();
        let _b = bus.subscribe_fn(move |_| o.lock().unwrap().push("second"));

        bus.publish(&sample_event("plc-001"));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = InMemoryMeasurementEventBus::new();
        let count = Arc::new(Mutex::new(0usize));

        let c = count.clone();
        let handle = bus.subscribe_fn(move |_| *c.lock().unwrap() += 1);
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(&sample_event("plc-001"));
        handle.close();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(&sample_event("plc-001"));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = InMemoryMeasurementEventBus::new();
        let delivered = Arc::new(Mutex::new(0usize));

        let _bad = bus.subscribe_fn(|_| panic!("subscriber bug"));
        let d = delivered.clone();
        let _good = bus.subscribe_fn(move |_| *d.lock().unwrap() += 1);

        bus.publish(&sample_event("plc-001"));
        assert_eq!(*delivered.lock().unwrap(), 1);
    }

    #[test]
    fn test_subscribe_during_publish_is_safe() {
        let bus = Arc::new(InMemoryMeasurementEventBus::new());
        let late = Arc::new(Mutex::new(Vec::new()));

        // Subscriber that registers another subscriber mid-publish. The new
        // subscriber only sees events published after this one completes.
        let bus_clone = bus.clone();
        let late_clone = late.clone();
        let handles = Arc::new(Mutex::new(Vec::new()));
        let h = handles.clone();
        let _a = bus.subscribe_fn(move |_| {
            let l = late_clone.clone();
            let handle = bus_clone.subscribe_fn(move |e| {
                l.lock().unwrap().push(e.device_id().clone());
            });
            h.lock().unwrap().push(handle);
        });

        bus.publish(&sample_event("first"));
        assert!(late.lock().unwrap().is_empty());

        bus.publish(&sample_event("second"));
        assert!(!late.lock().unwrap().is_empty());
    }
}
