//! Socket-level sender-to-receiver scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{sleep, timeout};

use bsread::{
    Address, Bsread, ChannelConfig, ChannelType, Driver, DriverOptions, InactiveBehavior,
    ReceiverConfig, ReceiverKind, SenderConfig, SenderKind, Timestamp, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn push_config() -> SenderConfig {
    SenderConfig {
        address: Address::parse("tcp://*:0"),
        kind: SenderKind::Push,
        ..SenderConfig::default()
    }
}

/// Let the TCP handshake finish so the first send has a peer.
async fn settle() {
    sleep(Duration::from_millis(300)).await;
}

fn pull_config(endpoint: &str) -> ReceiverConfig {
    let mut config = ReceiverConfig::new(endpoint);
    config.kind = ReceiverKind::Pull;
    config.receive_timeout = Duration::from_millis(50);
    config.idle_timeout = Duration::from_secs(5);
    config.inactive_timeout = Duration::from_secs(10);
    config.inactive_behavior = InactiveBehavior::KeepRunning;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn modulo_channel_over_many_pulses() {
    init_tracing();
    let bsread = Bsread::new();
    let mut sender = bsread.sender(push_config()).await.unwrap();
    sender
        .add_channel(
            ChannelConfig::scalar("beam_energy", ChannelType::Float64).with_cadence(10, 0),
            |pulse: u64| (Value::Float64(pulse as f64), Timestamp::new(pulse, 0).unwrap()),
        )
        .unwrap();

    let mut receiver = bsread.receiver(pull_config(sender.endpoint())).unwrap();
    let header_firings = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&header_firings);
    receiver.handlers().on_data_header(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });
    receiver.connect().await.unwrap();
    settle().await;

    let feeder = tokio::spawn(async move {
        for pulse in 0..220 {
            let sent =
                sender.send_pulse(pulse, Timestamp::new(pulse, 0).unwrap()).await.unwrap();
            assert_eq!(sent, pulse % 10 == 0, "pulse {pulse}");
        }
        sender
    });

    for i in 0..22u64 {
        let message =
            timeout(Duration::from_secs(5), receiver.receive()).await.unwrap().unwrap().unwrap();
        assert_eq!(message.pulse_id(), i * 10);
        assert_eq!(message.main_header.global_timestamp, Timestamp::new(i * 10, 0).unwrap());

        let energy = message.value("beam_energy").unwrap();
        assert_eq!(energy.value.extract::<f64>().unwrap(), (i * 10) as f64);

        // The schema never changes, so the header handler fired on the
        // first receive only
        assert_eq!(header_firings.load(Ordering::SeqCst), 1);
    }

    receiver.close().await;
    feeder.await.unwrap().close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_resets_the_header_cache() {
    init_tracing();
    let bsread = Bsread::new();
    let mut sender = bsread.sender(push_config()).await.unwrap();
    sender
        .add_channel(ChannelConfig::scalar("v", ChannelType::Float64), |pulse: u64| {
            (Value::Float64(pulse as f64), Timestamp::new(pulse, 0).unwrap())
        })
        .unwrap();

    let mut config = pull_config(sender.endpoint());
    config.receive_timeout = Duration::from_millis(20);
    config.idle_timeout = Duration::from_millis(50);
    config.inactive_timeout = Duration::from_millis(150);
    config.inactive_behavior = InactiveBehavior::Reconnect;
    let mut receiver = bsread.receiver(config).unwrap();

    let header_firings = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&header_firings);
    receiver.handlers().on_data_header(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });
    receiver.connect().await.unwrap();
    settle().await;

    sender.send_pulse(0, Timestamp::new(0, 0).unwrap()).await.unwrap();
    let before = receiver.receive().await.unwrap().unwrap();
    assert_eq!(header_firings.load(Ordering::SeqCst), 1);

    // Block in receive() across a forced inactivity gap; the loop
    // reconnects internally and then picks up new traffic
    let receiving = tokio::spawn(async move {
        let first = receiver.receive().await.unwrap();
        let second = receiver.receive().await.unwrap();
        (receiver, first, second)
    });
    sleep(Duration::from_millis(400)).await;
    sender.send_pulse(1, Timestamp::new(1, 0).unwrap()).await.unwrap();
    sender.send_pulse(2, Timestamp::new(2, 0).unwrap()).await.unwrap();

    let (mut receiver, after_gap, next) =
        timeout(Duration::from_secs(5), receiving).await.unwrap().unwrap();
    let after_gap = after_gap.unwrap();
    let next = next.unwrap();

    // The sender's schema never changed, but the reconnect dropped the
    // cache: the header is re-reported and reparsed into a new instance
    assert_eq!(header_firings.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&before.data_header, &after_gap.data_header));
    assert!(Arc::ptr_eq(&after_gap.data_header, &next.data_header));
    assert_eq!(before.data_header, after_gap.data_header);

    receiver.close().await;
    sender.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn windowed_pipeline_exposes_past_and_future() {
    init_tracing();
    let bsread = Bsread::new();
    let mut sender = bsread.sender(push_config()).await.unwrap();
    sender
        .add_channel(ChannelConfig::scalar("v", ChannelType::Float64), |pulse: u64| {
            (Value::Float64(pulse as f64), Timestamp::new(pulse, 0).unwrap())
        })
        .unwrap();

    let mut receiver = bsread.receiver(pull_config(sender.endpoint())).unwrap();
    receiver.connect().await.unwrap();
    settle().await;

    let mut handle = Driver::spawn(
        receiver,
        DriverOptions { past: 1, future: 1, ..DriverOptions::default() },
    );
    let mut reader = handle.shards.pop().unwrap();

    for pulse in 0..5 {
        sender.send_pulse(pulse, Timestamp::new(pulse, 0).unwrap()).await.unwrap();
    }

    // First section waits for a full one-element past window
    for current in 1..=3u64 {
        let section = timeout(Duration::from_secs(5), reader.next()).await.unwrap().unwrap();
        assert_eq!(section.current.pulse_id(), current);
        assert_eq!(section.past.len(), 1);
        assert_eq!(section.past[0].pulse_id(), current - 1);
        assert_eq!(section.future.len(), 1);
        assert_eq!(section.future[0].pulse_id(), current + 1);
    }

    handle.shutdown().await;
    assert!(timeout(Duration::from_secs(1), reader.next()).await.unwrap().is_none());
    sender.close().await;
}
