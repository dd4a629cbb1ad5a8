//! Paced, edit-in-place delivery of streamed agent output.
//!
//! Fragments appended for a channel accumulate in an [`OutputBuffer`]. A
//! single scheduler task runs flush cycles, each starting no sooner than
//! `min_flush_interval` after the cycle was requested, so the whole process
//! respects one send/edit spacing. A cycle flushes every pending channel
//! once, sequentially.
//!
//! A flush sends the buffer as a new message, or edits the live message in
//! place. Once a buffer grows past `max_message_len` UTF-16 code units, the
//! longest prefix that fits is published as a final message and the
//! remainder starts a fresh buffer on the next cycle.
//!
//! Channel keys double as chat ids.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use {
    switchboard_channels::ChatTransport,
    switchboard_common::{ChannelKey, MessageId},
    switchboard_config::OutputConfig,
    tokio::{
        sync::{Notify, watch},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, warn},
};

/// Output accumulated for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    pub accumulated: String,
    /// What the live message currently shows.
    pub last_flushed: String,
    pub live_message_id: Option<MessageId>,
    failures: u32,
}

impl OutputBuffer {
    fn is_clean(&self) -> bool {
        self.accumulated == self.last_flushed
    }
}

#[derive(Default)]
struct State {
    buffers: HashMap<ChannelKey, OutputBuffer>,
    pending: BTreeSet<ChannelKey>,
}

struct Shared {
    transport: Arc<dyn ChatTransport>,
    config: OutputConfig,
    state: Mutex<State>,
    wake: Notify,
    /// Bumped after every flush attempt.
    flushed: watch::Sender<u64>,
    cancel: CancellationToken,
}

/// What one flush publishes.
struct Publish {
    text: String,
    live_message_id: Option<MessageId>,
    finalize: bool,
}

pub struct OutputAggregator {
    shared: Arc<Shared>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl OutputAggregator {
    /// Create the aggregator and start its scheduler task.
    pub fn start(transport: Arc<dyn ChatTransport>, config: OutputConfig) -> Self {
        let (flushed, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            transport,
            config,
            state: Mutex::new(State::default()),
            wake: Notify::new(),
            flushed,
            cancel: CancellationToken::new(),
        });
        let scheduler = tokio::spawn(Arc::clone(&shared).run_scheduler());
        Self {
            shared,
            scheduler: Mutex::new(Some(scheduler)),
        }
    }

    /// Append a fragment to `key`'s buffer and request a flush.
    pub fn append(&self, key: &ChannelKey, text: &str) {
        if text.is_empty() {
            return;
        }
        {
            let mut state = self.shared.lock();
            state
                .buffers
                .entry(key.clone())
                .or_default()
                .accumulated
                .push_str(text);
            state.pending.insert(key.clone());
        }
        self.shared.wake.notify_one();
    }

    /// Wait until `key` has nothing left to flush, then drop its buffer so
    /// the next output starts a new message.
    pub async fn finish(&self, key: &ChannelKey) {
        let mut flushed = self.shared.flushed.subscribe();
        loop {
            {
                let mut state = self.shared.lock();
                if !state.pending.contains(key) || self.shared.cancel.is_cancelled() {
                    state.buffers.remove(key);
                    return;
                }
            }
            tokio::select! {
                () = self.shared.cancel.cancelled() => {},
                changed = flushed.changed() => if changed.is_err() {
                    return;
                },
            }
        }
    }

    /// Wait until no channel has anything left to flush.
    pub async fn settle(&self) {
        let mut flushed = self.shared.flushed.subscribe();
        while !self.shared.lock().pending.is_empty() && !self.shared.cancel.is_cancelled() {
            tokio::select! {
                () = self.shared.cancel.cancelled() => return,
                changed = flushed.changed() => if changed.is_err() {
                    return;
                },
            }
        }
    }

    pub fn is_pending(&self, key: &ChannelKey) -> bool {
        self.shared.lock().pending.contains(key)
    }

    pub fn buffer(&self, key: &ChannelKey) -> Option<OutputBuffer> {
        self.shared.lock().buffers.get(key).cloned()
    }

    /// Stop the scheduler. A flush already in flight completes first.
    pub async fn stop(&self) {
        self.shared.cancel.cancel();
        let handle = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "flush scheduler panicked");
        }
    }
}

impl Drop for OutputAggregator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_scheduler(self: Arc<Self>) {
        let spacing = self.config.min_flush_interval();
        loop {
            loop {
                let notified = self.wake.notified();
                if !self.lock().pending.is_empty() {
                    break;
                }
                tokio::select! {
                    () = self.cancel.cancelled() => return,
                    () = notified => {},
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(spacing) => {},
            }

            let keys: Vec<ChannelKey> = self.lock().pending.iter().cloned().collect();
            debug!(channels = keys.len(), "flush cycle");
            for key in keys {
                self.flush(&key).await;
                self.flushed.send_modify(|generation| *generation = generation.wrapping_add(1));
            }
        }
    }

    async fn flush(&self, key: &ChannelKey) {
        let Some(publish) = self.prepare(key) else {
            return;
        };

        let chat_id = key.as_str();
        let result = match publish.live_message_id {
            None => self
                .transport
                .send(chat_id, &publish.text)
                .await
                .map(Some),
            Some(message_id) => match self.transport.edit(chat_id, message_id, &publish.text).await
            {
                Err(e) if e.is_not_modified() => Ok(None),
                other => other.map(|()| None),
            },
        };

        let mut state = self.lock();
        let State { buffers, pending } = &mut *state;
        let Some(buffer) = buffers.get_mut(key) else {
            pending.remove(key);
            return;
        };
        match result {
            Ok(sent_id) => {
                buffer.failures = 0;
                if publish.finalize {
                    // fragments appended while the request was in flight
                    // follow the published prefix
                    if buffer.accumulated.starts_with(&publish.text) {
                        buffer.accumulated.drain(..publish.text.len());
                    }
                    buffer.last_flushed.clear();
                    buffer.live_message_id = None;
                    debug!(
                        channel = %key,
                        remaining = buffer.accumulated.len(),
                        "message finalized at length ceiling"
                    );
                } else {
                    if let Some(id) = sent_id {
                        buffer.live_message_id = Some(id);
                    }
                    buffer.last_flushed = publish.text;
                }
                if buffer.is_clean() {
                    pending.remove(key);
                }
            },
            Err(e) => {
                buffer.failures += 1;
                warn!(
                    channel = %key,
                    failures = buffer.failures,
                    error = %e,
                    "flush failed, will retry next cycle"
                );
                if buffer.failures >= self.config.max_flush_failures {
                    error!(
                        channel = %key,
                        discarded = buffer.accumulated.len(),
                        "giving up on undeliverable output"
                    );
                    buffers.remove(key);
                    pending.remove(key);
                }
            },
        }
    }

    /// Decide what to publish for `key`, clearing it from the pending set if
    /// there is nothing to do.
    fn prepare(&self, key: &ChannelKey) -> Option<Publish> {
        let mut state = self.lock();
        let Some(buffer) = state.buffers.get(key) else {
            state.pending.remove(key);
            return None;
        };
        if buffer.is_clean() {
            state.pending.remove(key);
            return None;
        }
        let ceiling = self.config.max_message_len;
        match split_index(&buffer.accumulated, ceiling) {
            None => Some(Publish {
                text: buffer.accumulated.clone(),
                live_message_id: buffer.live_message_id,
                finalize: false,
            }),
            Some(index) => Some(Publish {
                text: buffer.accumulated[..index].to_string(),
                live_message_id: buffer.live_message_id,
                finalize: true,
            }),
        }
    }
}

/// Byte index just past the longest prefix of `text` that fits in
/// `max_units` UTF-16 code units, if `text` is longer than that.
///
/// The platform measures message length in UTF-16 units, so a character
/// outside the basic plane counts twice. A split never falls inside a
/// character, and the prefix always holds at least one.
fn split_index(text: &str, max_units: usize) -> Option<usize> {
    let mut units = 0;
    for (index, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return Some(if index == 0 { ch.len_utf8() } else { index });
        }
    }
    None
}
