#![forbid(unsafe_code)]
//! Periodic PING emission with PONG reconciliation and bounded dead-peer
//! detection, run as a single cooperative task bound to one connection.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

/// `{ ping_interval, pong_timeout, max_missed }`, with MASH's defaults of
/// 30s / 5s / 3. The guaranteed detection bound is
/// `ping_interval * max_missed + pong_timeout` (95s by default).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeepaliveConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub max_missed: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        KeepaliveConfig {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(5),
            max_missed: 3,
        }
    }
}

impl KeepaliveConfig {
    /// The worst-case time between a peer going silent and the timeout
    /// callback firing.
    pub fn detection_bound(&self) -> Duration {
        self.ping_interval * self.max_missed + self.pong_timeout
    }
}

/// Per-connection keepalive bookkeeping, kept private to the running task
/// but exposed for tests and observability snapshots.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepaliveRecord {
    pub next_seq: u32,
    pub outstanding: Option<Outstanding>,
    pub missed: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outstanding {
    pub seq: u32,
    pub sent_at: Instant,
}

/// Callbacks the keepalive task drives. `send_ping` failures don't
/// terminate the task immediately — the next tick's timeout check does —
/// matching the contract that a keepalive send is best-effort.
pub trait KeepaliveObserver: Send + 'static {
    /// Emit a CONTROL PING with the given sequence number.
    fn send_ping(&mut self, seq: u32) -> impl std::future::Future<Output = ()> + Send;

    /// `max_missed` consecutive PONGs were not received in time. Terminal:
    /// the task stops after this call returns.
    fn on_timeout(&mut self);

    /// A matching PONG arrived; `latency` is time since the PING was sent.
    fn on_pong(&mut self, _seq: u32, _latency: Duration) {}
}

/// Handle used to deliver inbound PONG sequence numbers to a running
/// keepalive task. Non-matching or late PONGs are dropped silently by the
/// task itself; delivery here never blocks.
#[derive(Clone)]
pub struct PongHandle {
    tx: mpsc::Sender<u32>,
}

impl PongHandle {
    /// Hand a PONG's sequence number to the keepalive task. If the
    /// one-slot channel is momentarily full, the PONG is dropped — the next
    /// tick's timeout check will self-correct.
    pub fn deliver(&self, seq: u32) {
        let _ = self.tx.try_send(seq);
    }
}

/// A handle to stop a running keepalive task.
pub struct KeepaliveHandle {
    cancel: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
}

impl KeepaliveHandle {
    /// Signal the keepalive task to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let _ = self.join.await;
    }
}

/// Spawn the keepalive task. Returns a [`PongHandle`] for feeding in inbound
/// PONGs and a [`KeepaliveHandle`] for stopping it.
pub fn spawn<O: KeepaliveObserver>(config: KeepaliveConfig, mut observer: O) -> (PongHandle, KeepaliveHandle) {
    let (pong_tx, mut pong_rx) = mpsc::channel::<u32>(1);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        let mut record = KeepaliveRecord::default();
        let mut interval = tokio::time::interval(config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the first real
        // PING goes out after one full `ping_interval`, matching the
        // "allocate, send, then wait" framing of the algorithm below by
        // sending an initial PING up front instead.
        interval.tick().await;

        let seq = record.next_seq;
        record.next_seq = record.next_seq.wrapping_add(1);
        observer.send_ping(seq).await;
        record.outstanding = Some(Outstanding { seq, sent_at: Instant::now() });

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    return;
                }
                Some(seq) = pong_rx.recv() => {
                    if let Some(outstanding) = record.outstanding {
                        if outstanding.seq == seq {
                            let latency = outstanding.sent_at.elapsed();
                            record.outstanding = None;
                            record.missed = 0;
                            observer.on_pong(seq, latency);
                        }
                        // Non-matching PONGs (stale replies to an earlier
                        // PING) are dropped silently.
                    }
                }
                _ = interval.tick() => {
                    if let Some(outstanding) = record.outstanding {
                        if outstanding.sent_at.elapsed() >= config.pong_timeout {
                            record.missed += 1;
                            record.outstanding = None;
                            tracing::debug!(seq = outstanding.seq, missed = record.missed, max_missed = config.max_missed, "PONG not received in time");
                            if record.missed >= config.max_missed {
                                tracing::warn!(missed = record.missed, "peer missed too many PONGs, declaring dead");
                                observer.on_timeout();
                                return;
                            }
                        }
                    }
                    let seq = record.next_seq;
                    record.next_seq = record.next_seq.wrapping_add(1);
                    tracing::trace!(seq, "sending PING");
                    observer.send_ping(seq).await;
                    record.outstanding = Some(Outstanding { seq, sent_at: Instant::now() });
                }
            }
        }
    });

    (PongHandle { tx: pong_tx }, KeepaliveHandle { cancel: Some(cancel_tx), join })
}
