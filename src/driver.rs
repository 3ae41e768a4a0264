//! Driver spawns the receive loop task and feeds windowed streams.
//!
//! One task owns the [`Receiver`] and publishes every decoded [`Message`]
//! into `split` windowed stream shards, round-robin. Each shard preserves
//! its own ordering invariant; consumers of different shards run in
//! parallel. The first observation of each distinct data header is
//! forwarded once over a cross-shard watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::receiver::{Receiver, ReceiverHandle};
use crate::stream::{StreamReader, WindowedStream};
use crate::types::{DataHeader, Message};

/// Window and sharding parameters for the driver's streams.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Lookback window size of every shard.
    pub past: usize,
    /// Lookahead window size of every shard.
    pub future: usize,
    /// Optional per-shard backpressure limit for `publish`.
    pub backpressure: Option<usize>,
    /// Number of round-robin-fed stream shards.
    pub split: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self { past: 0, future: 0, backpressure: None, split: 1 }
    }
}

/// Running driver: stream shard readers plus shutdown control.
pub struct DriverHandle {
    /// One reader per shard, in feed order.
    pub shards: Vec<StreamReader<Message>>,
    /// Forwards each distinct data header once, across all shards.
    pub headers: watch::Receiver<Option<Arc<DataHeader>>>,
    cancel: CancellationToken,
    receiver_handle: ReceiverHandle,
    task: JoinHandle<()>,
    shutdown_wait: Duration,
}

impl DriverHandle {
    /// Signal the receive loop to stop and wait for it, bounded.
    ///
    /// The loop normally self-cleans within one receive timeout; if the
    /// deadline of `max(1s, 1.5 x receive_timeout)` elapses the task is
    /// aborted, trading a possible unclean socket for bounded shutdown
    /// latency.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.receiver_handle.close();
        match tokio::time::timeout(self.shutdown_wait, &mut self.task).await {
            Ok(_) => info!("Driver shut down"),
            Err(_) => {
                warn!(
                    waited = ?self.shutdown_wait,
                    "Receive loop missed the shutdown deadline, aborting"
                );
                self.task.abort();
            }
        }
    }
}

/// Driver spawns and manages the receive loop task.
pub struct Driver;

impl Driver {
    /// Spawn the receive loop for a connected receiver.
    pub fn spawn(receiver: Receiver, options: DriverOptions) -> DriverHandle {
        let split = options.split.max(1);
        let mut streams = Vec::with_capacity(split);
        let mut shards = Vec::with_capacity(split);
        for _ in 0..split {
            let stream: WindowedStream<Message> =
                WindowedStream::new(options.past, options.future, options.backpressure);
            shards.push(stream.reader());
            streams.push(stream);
        }

        let (header_tx, header_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let receiver_handle = receiver.handle();
        let receive_timeout = receiver.config().receive_timeout;
        let shutdown_wait = Duration::from_secs(1).max(receive_timeout.mul_f64(1.5));

        let cancel_loop = cancel.clone();
        let task = tokio::spawn(async move {
            Self::receive_loop(receiver, streams, header_tx, cancel_loop).await;
        });

        DriverHandle { shards, headers: header_rx, cancel, receiver_handle, task, shutdown_wait }
    }

    async fn receive_loop(
        mut receiver: Receiver,
        streams: Vec<WindowedStream<Message>>,
        header_tx: watch::Sender<Option<Arc<DataHeader>>>,
        cancel: CancellationToken,
    ) {
        info!(shards = streams.len(), "Receive loop started");
        let mut pulses = 0u64;
        let mut shard = 0usize;
        let mut last_header: Option<Arc<DataHeader>> = None;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Receive loop cancelled");
                    break;
                }
                result = receiver.receive() => result,
            };

            match result {
                Ok(Some(message)) => {
                    pulses += 1;

                    // One cross-shard notification per distinct header
                    let changed = !last_header
                        .as_ref()
                        .is_some_and(|h| Arc::ptr_eq(h, &message.data_header));
                    if changed {
                        debug!(hash = %message.main_header.hash, "Data header changed");
                        last_header = Some(Arc::clone(&message.data_header));
                        let _ = header_tx.send(last_header.clone());
                    }

                    let target = &streams[shard];
                    shard = (shard + 1) % streams.len();
                    if target.publish(message).await.is_err() {
                        debug!("Stream closed, shutting down receive loop");
                        break;
                    }
                }
                Ok(None) => {
                    info!(pulses, "Receiver stopped");
                    break;
                }
                Err(e) => {
                    // Per-message decode failures leave the connection live
                    warn!(error = %e, "Skipping undecodable message");
                }
            }
        }

        receiver.close().await;
        for stream in &streams {
            stream.close();
        }
        let _ = header_tx.send(None);
        info!(pulses, "Receive loop ended");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::context::Context;
    use crate::receiver::{InactiveBehavior, ReceiverConfig};
    use crate::sender::{Sender, SenderConfig};
    use crate::transport::{Address, ReceiverKind, SenderKind};
    use crate::types::{ChannelConfig, ChannelType, Timestamp, Value};

    async fn connected_pair(ctx: &Context) -> (Sender, Receiver) {
        let mut sender = Sender::connect(
            ctx,
            SenderConfig {
                address: Address::parse("tcp://*:0"),
                kind: SenderKind::Push,
                ..SenderConfig::default()
            },
        )
        .await
        .unwrap();
        sender
            .add_channel(ChannelConfig::scalar("v", ChannelType::Float64), |p: u64| {
                (Value::Float64(p as f64), Timestamp::new(p, 0).unwrap())
            })
            .unwrap();

        let mut config = ReceiverConfig::new(sender.endpoint());
        config.kind = ReceiverKind::Pull;
        config.receive_timeout = Duration::from_millis(50);
        config.idle_timeout = Duration::from_secs(1);
        config.inactive_timeout = Duration::from_secs(2);
        config.inactive_behavior = InactiveBehavior::KeepRunning;
        let mut receiver = Receiver::new(ctx, config).unwrap();
        receiver.connect().await.unwrap();
        // Let the TCP handshake finish so the first send has a peer
        sleep(Duration::from_millis(300)).await;
        (sender, receiver)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shards_are_fed_round_robin() {
        let ctx = Context::new();
        let (mut sender, receiver) = connected_pair(&ctx).await;

        let mut handle =
            Driver::spawn(receiver, DriverOptions { split: 2, ..DriverOptions::default() });
        for pulse in 0..4 {
            sender.send_pulse(pulse, Timestamp::new(pulse, 0).unwrap()).await.unwrap();
        }

        let mut second = handle.shards.pop().unwrap();
        let mut first = handle.shards.pop().unwrap();
        let deadline = Duration::from_secs(2);
        for expected in [0u64, 2] {
            let section = timeout(deadline, first.next()).await.unwrap().unwrap();
            assert_eq!(section.current.pulse_id(), expected);
        }
        for expected in [1u64, 3] {
            let section = timeout(deadline, second.next()).await.unwrap().unwrap();
            assert_eq!(section.current.pulse_id(), expected);
        }

        assert!(handle.headers.borrow().is_some());
        handle.shutdown().await;
        sender.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn header_watch_fires_once_per_distinct_header() {
        let ctx = Context::new();
        let (mut sender, receiver) = connected_pair(&ctx).await;

        let mut handle = Driver::spawn(receiver, DriverOptions::default());
        let mut reader = handle.shards.pop().unwrap();

        for pulse in 0..3 {
            sender.send_pulse(pulse, Timestamp::new(pulse, 0).unwrap()).await.unwrap();
        }
        for _ in 0..3 {
            timeout(Duration::from_secs(2), reader.next()).await.unwrap().unwrap();
        }

        // Three pulses under one schema: exactly one watch update
        assert!(handle.headers.has_changed().unwrap());
        let first = handle.headers.borrow_and_update().clone().unwrap();
        assert!(!handle.headers.has_changed().unwrap());

        sender
            .add_channel(ChannelConfig::scalar("w", ChannelType::Int32), |p: u64| {
                (Value::Int32(p as i32), Timestamp::new(p, 0).unwrap())
            })
            .unwrap();
        sender.send_pulse(3, Timestamp::new(3, 0).unwrap()).await.unwrap();
        timeout(Duration::from_secs(2), reader.next()).await.unwrap().unwrap();

        assert!(handle.headers.has_changed().unwrap());
        let second = handle.headers.borrow_and_update().clone().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        handle.shutdown().await;
        sender.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_is_bounded_and_ends_the_streams() {
        let ctx = Context::new();
        let (sender, receiver) = connected_pair(&ctx).await;

        let mut handle = Driver::spawn(receiver, DriverOptions::default());
        let mut reader = handle.shards.pop().unwrap();

        let started = std::time::Instant::now();
        handle.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));

        // Closed streams signal end-of-stream to their readers
        assert!(timeout(Duration::from_millis(500), reader.next()).await.unwrap().is_none());
        sender.close().await;
    }

    #[tokio::test]
    async fn shutdown_aborts_a_loop_that_misses_the_deadline() {
        let ctx = Context::new();
        let mut config = ReceiverConfig::new("localhost");
        config.kind = ReceiverKind::Pull;
        let receiver = Receiver::new(&ctx, config).unwrap();

        // A task that ignores cancellation entirely
        let task = tokio::spawn(std::future::pending::<()>());
        let (_header_tx, headers) = tokio::sync::watch::channel(None);
        let handle = DriverHandle {
            shards: Vec::new(),
            headers,
            cancel: CancellationToken::new(),
            receiver_handle: receiver.handle(),
            task,
            shutdown_wait: Duration::from_millis(100),
        };

        let started = std::time::Instant::now();
        timeout(Duration::from_secs(1), handle.shutdown()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
