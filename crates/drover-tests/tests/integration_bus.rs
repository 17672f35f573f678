// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for event fan-out as the scheduler drives it: multiple
//! devices, subscriber isolation, and subscription lifecycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use drover_core::bus::InMemoryMeasurementEventBus;
use drover_core::metrics::MetricsHub;
use drover_core::types::DeviceId;
use drover_poll::config::DevicePollingConfig;
use drover_poll::scheduler::PollingScheduler;

use drover_tests::common::{holding, init_tracing, mock_manager, wait_for};

fn config(device: &str) -> DevicePollingConfig {
    let (manager, state) = mock_manager();
    state.set_holding_register(0, 7);
    DevicePollingConfig::builder(device, manager)
        .poll_interval(Duration::from_millis(20))
        .measurement(holding("hr", 0))
        .build()
        .unwrap()
}

#[tokio::test]
async fn multiple_devices_fan_out_to_all_subscribers() {
    init_tracing();
    let bus = Arc::new(InMemoryMeasurementEventBus::new());

    let seen_a = Arc::new(Mutex::new(Vec::<DeviceId>::new()));
    let seen_b = Arc::new(Mutex::new(Vec::<DeviceId>::new()));

    let sink = seen_a.clone();
    let _first = bus.subscribe_fn(move |e| sink.lock().push(e.device_id().clone()));
    let sink = seen_b.clone();
    let _second = bus.subscribe_fn(move |e| sink.lock().push(e.device_id().clone()));

    let scheduler = PollingScheduler::new(bus);
    scheduler.register_device(config("plc-001")).await.unwrap();
    scheduler.register_device(config("plc-002")).await.unwrap();

    let both = wait_for(Duration::from_secs(2), || {
        let seen = seen_a.lock();
        seen.iter().any(|d| d.as_str() == "plc-001")
            && seen.iter().any(|d| d.as_str() == "plc-002")
    })
    .await;
    assert!(both, "subscriber did not see both devices");

    scheduler.close().await;

    // Both subscribers received the same stream.
    assert_eq!(seen_a.lock().len(), seen_b.lock().len());
}

#[tokio::test]
async fn panicking_subscriber_does_not_starve_the_rest() {
    init_tracing();
    let bus = Arc::new(InMemoryMeasurementEventBus::new());

    let _bad = bus.subscribe_fn(|_| panic!("broken consumer"));
    let delivered = Arc::new(Mutex::new(0usize));
    let sink = delivered.clone();
    let _good = bus.subscribe_fn(move |_| *sink.lock() += 1);

    let scheduler = PollingScheduler::new(bus);
    scheduler.register_device(config("plc-001")).await.unwrap();

    let received = wait_for(Duration::from_secs(2), || *delivered.lock() >= 2).await;
    assert!(received, "good subscriber starved by panicking one");

    scheduler.close().await;
}

#[tokio::test]
async fn closed_subscription_stops_receiving() {
    init_tracing();
    let bus = Arc::new(InMemoryMeasurementEventBus::new());

    let delivered = Arc::new(Mutex::new(0usize));
    let sink = delivered.clone();
    let subscription = bus.subscribe_fn(move |_| *sink.lock() += 1);

    let scheduler = PollingScheduler::new(bus.clone());
    scheduler.register_device(config("plc-001")).await.unwrap();

    assert!(wait_for(Duration::from_secs(2), || *delivered.lock() >= 1).await);

    subscription.close();
    assert_eq!(bus.subscriber_count(), 0);
    let count = *delivered.lock();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*delivered.lock(), count);

    scheduler.close().await;
}

#[tokio::test]
async fn poll_duration_histogram_records_successful_cycles() {
    init_tracing();
    let bus = Arc::new(InMemoryMeasurementEventBus::new());
    let hub = Arc::new(MetricsHub::new());
    let scheduler = PollingScheduler::with_metrics(bus, hub.clone());

    scheduler.register_device(config("plc-001")).await.unwrap();

    let histogram = hub.poll_duration("plc-001");
    let sampled = wait_for(Duration::from_secs(2), || histogram.get_sample_count() >= 1).await;
    assert!(sampled, "duration histogram never recorded");

    let rendered = hub.render();
    assert!(rendered.contains("modbus_poll_duration_seconds"));

    scheduler.close().await;
}
