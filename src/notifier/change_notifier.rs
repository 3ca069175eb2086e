use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

use super::EventSink;
use crate::metrics::CHANGE_EVENTS_METRIC;
use crate::ChangeEvent;

/// How long an out-of-order event may wait for its predecessor before the
/// dispatch loop gives up on the gap and flushes in version order.
const REORDER_FLUSH_INTERVAL: Duration = Duration::from_millis(25);

/// Upper bound on buffered out-of-order events per device before an eager
/// flush, so a lost predecessor cannot pin memory.
const MAX_BUFFERED_PER_DEVICE: usize = 32;

/// Sharded, per-device-ordered change publisher.
///
/// `publish` never blocks the reconciler: shard channels are bounded and an
/// overflow drops the event (subscribers recover through resync, the same
/// path that covers a slow connection).
#[derive(Clone)]
pub struct ChangeNotifier {
    shards: Arc<Vec<mpsc::Sender<ChangeEvent>>>,
}

impl ChangeNotifier {
    /// Spawns one dispatch loop per shard, all draining into `sink`.
    pub fn spawn(
        shard_count: usize,
        shard_buffer: usize,
        sink: Arc<dyn EventSink>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let mut shards = Vec::with_capacity(shard_count);
        for shard_id in 0..shard_count {
            let (tx, rx) = mpsc::channel(shard_buffer);
            tokio::spawn(dispatch_loop(
                shard_id,
                rx,
                sink.clone(),
                shutdown_signal.clone(),
            ));
            shards.push(tx);
        }
        Self {
            shards: Arc::new(shards),
        }
    }

    /// Fire-and-forget publish. Same device always maps to the same shard.
    pub fn publish(
        &self,
        event: ChangeEvent,
    ) {
        let shard = shard_of(&event.device_id, self.shards.len());
        match self.shards[shard].try_send(event) {
            Ok(()) => {
                CHANGE_EVENTS_METRIC.with_label_values(&["published"]).inc();
            }
            Err(TrySendError::Full(event)) => {
                warn!(
                    "notifier shard {} full, dropping event v{} for {}",
                    shard, event.version, event.device_id
                );
                CHANGE_EVENTS_METRIC
                    .with_label_values(&["dropped_overflow"])
                    .inc();
            }
            Err(TrySendError::Closed(event)) => {
                warn!(
                    "notifier shard {} closed, dropping event v{} for {}",
                    shard, event.version, event.device_id
                );
                CHANGE_EVENTS_METRIC
                    .with_label_values(&["dropped_closed"])
                    .inc();
            }
        }
    }
}

fn shard_of(
    device_id: &str,
    shard_count: usize,
) -> usize {
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as usize
}

/// Per-device delivery bookkeeping inside one shard.
#[derive(Default)]
struct DeviceSequence {
    last_delivered: u64,
    buffered: BTreeMap<u64, ChangeEvent>,
}

async fn dispatch_loop(
    shard_id: usize,
    mut rx: mpsc::Receiver<ChangeEvent>,
    sink: Arc<dyn EventSink>,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let mut sequences: HashMap<String, DeviceSequence> = HashMap::new();
    let mut flush_tick = tokio::time::interval(REORDER_FLUSH_INTERVAL);
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => handle_event(event, &mut sequences, sink.as_ref()),
                None => break,
            },
            _ = flush_tick.tick() => flush_stalled(&mut sequences, sink.as_ref()),
            _ = shutdown_signal.changed() => break,
        }
    }
    debug!("notifier dispatch loop {} stopped", shard_id);
}

fn handle_event(
    event: ChangeEvent,
    sequences: &mut HashMap<String, DeviceSequence>,
    sink: &dyn EventSink,
) {
    let seq = sequences.entry(event.device_id.clone()).or_default();

    if seq.last_delivered > 0 && event.version <= seq.last_delivered {
        // A racing writer published behind an already-delivered version
        CHANGE_EVENTS_METRIC.with_label_values(&["stale"]).inc();
        return;
    }

    let in_order = seq.last_delivered == 0 || event.version == seq.last_delivered + 1;
    if in_order {
        seq.last_delivered = event.version;
        sink.deliver(&event);

        // Drain any buffered successors that are now consecutive
        while let Some(entry) = seq.buffered.first_entry() {
            if *entry.key() != seq.last_delivered + 1 {
                break;
            }
            let next = entry.remove();
            seq.last_delivered = next.version;
            sink.deliver(&next);
        }
        return;
    }

    // Gap: hold the event for its predecessor, bounded
    seq.buffered.insert(event.version, event);
    if seq.buffered.len() > MAX_BUFFERED_PER_DEVICE {
        flush_device(seq, sink);
    }
}

/// Delivers everything still buffered, in version order, accepting gaps.
/// Runs on the flush tick: a predecessor that never arrived means its
/// publisher failed between the conditional write and the publish.
fn flush_stalled(
    sequences: &mut HashMap<String, DeviceSequence>,
    sink: &dyn EventSink,
) {
    for seq in sequences.values_mut() {
        if !seq.buffered.is_empty() {
            flush_device(seq, sink);
        }
    }
}

fn flush_device(
    seq: &mut DeviceSequence,
    sink: &dyn EventSink,
) {
    let buffered = std::mem::take(&mut seq.buffered);
    for (version, event) in buffered {
        CHANGE_EVENTS_METRIC
            .with_label_values(&["gap_flushed"])
            .inc();
        seq.last_delivered = version;
        sink.deliver(&event);
    }
}
