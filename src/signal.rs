use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::{ChordreelError, ChordreelResult};
use crate::pitch::PitchCode;

/// One raw decoded on/off event from the MIDI decoder. `time` is absolute
/// seconds, non-decreasing across the stream per channel.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Signal {
    /// `true` for a press, `false` for a release.
    pub state: bool,
    pub note: PitchCode,
    pub channel: u8,
    pub time: f64,
}

/// One note's sounding interval, derived by pairing a press with its release.
/// Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PressEvent {
    pub note: PitchCode,
    pub channel: u8,
    pub time: f64,
    pub duration: f64,
}

/// Pairer configuration, passed in explicitly rather than read from globals.
#[derive(Clone, Debug)]
pub struct PairerConfig {
    /// Channels to keep. `None` keeps everything.
    pub channels: Option<Vec<u8>>,
    /// If the earliest press starts before this many seconds, all events are
    /// shifted uniformly so the earliest starts exactly here (lead-in room
    /// for any pre-roll).
    pub min_start_delay: Option<f64>,
}

impl Default for PairerConfig {
    fn default() -> Self {
        Self {
            channels: None,
            min_start_delay: Some(2.0),
        }
    }
}

/// Result of one pairing run.
#[derive(Clone, Debug)]
pub struct PairOutput {
    /// Events in press order (non-decreasing start time).
    pub events: Vec<PressEvent>,
    /// Presses with no matching release before stream end. Surfaced instead
    /// of silently dropping the tail of the stream.
    pub truncated: Vec<Signal>,
}

/// Converts a raw on/off signal stream into discrete press events.
#[derive(Clone, Debug, Default)]
pub struct Pairer {
    cfg: PairerConfig,
}

impl Pairer {
    pub fn new(cfg: PairerConfig) -> Self {
        Self { cfg }
    }

    /// Pair presses with releases in FIFO order per `(note, channel)`:
    /// the earliest unmatched press pairs with the earliest release.
    ///
    /// Signals on channels outside the allow-list are discarded before
    /// pairing. Releases with no prior press are rejected as malformed.
    /// After pairing, channels are renumbered densely (0..n, ascending by
    /// original channel id) and the initial-delay shift is applied.
    pub fn pair(&self, signals: &[Signal]) -> ChordreelResult<PairOutput> {
        let mut slots: Vec<Option<PressEvent>> = Vec::new();
        let mut pending: HashMap<(PitchCode, u8), VecDeque<(usize, f64)>> = HashMap::new();
        let mut truncated = Vec::new();

        for sig in signals {
            if let Some(allowed) = &self.cfg.channels
                && !allowed.contains(&sig.channel)
            {
                continue;
            }
            let key = (sig.note, sig.channel);
            if sig.state {
                pending.entry(key).or_default().push_back((slots.len(), sig.time));
                slots.push(None);
            } else {
                let (slot, press_time) = pending
                    .get_mut(&key)
                    .and_then(VecDeque::pop_front)
                    .ok_or_else(|| {
                        ChordreelError::malformed(format!(
                            "release of {} on channel {} at t={} has no matching press",
                            sig.note, sig.channel, sig.time
                        ))
                    })?;
                if sig.time < press_time {
                    return Err(ChordreelError::malformed(format!(
                        "release of {} on channel {} at t={} precedes its press at t={}",
                        sig.note, sig.channel, sig.time, press_time
                    )));
                }
                slots[slot] = Some(PressEvent {
                    note: sig.note,
                    channel: sig.channel,
                    time: press_time,
                    duration: sig.time - press_time,
                });
            }
        }

        // Unmatched presses keep their slot as None; report them in stream
        // order rather than hash order.
        let mut unmatched: Vec<(usize, (PitchCode, u8), f64)> = Vec::new();
        for (key, queue) in &pending {
            for &(slot, time) in queue {
                unmatched.push((slot, *key, time));
            }
        }
        unmatched.sort_by_key(|(slot, _, _)| *slot);
        for (_, (note, channel), time) in unmatched {
            tracing::warn!(%note, channel, time, "press has no release before stream end");
            truncated.push(Signal {
                state: true,
                note,
                channel,
                time,
            });
        }

        let mut events: Vec<PressEvent> = slots.into_iter().flatten().collect();
        compress_channels(&mut events);
        self.apply_start_delay(&mut events);

        Ok(PairOutput { events, truncated })
    }

    fn apply_start_delay(&self, events: &mut [PressEvent]) {
        let Some(min_delay) = self.cfg.min_start_delay else {
            return;
        };
        let Some(first) = events.first() else { return };
        if first.time >= min_delay {
            return;
        }
        let shift = min_delay - first.time;
        tracing::debug!(shift, "shifting all press events for lead-in room");
        for event in events {
            event.time += shift;
        }
    }
}

/// Renumber channels densely: the set of channels that actually carry events
/// maps to `0..n` in ascending order of original channel id.
fn compress_channels(events: &mut [PressEvent]) {
    let used: BTreeSet<u8> = events.iter().map(|e| e.channel).collect();
    let remap: HashMap<u8, u8> = used
        .into_iter()
        .enumerate()
        .map(|(idx, ch)| (ch, idx as u8))
        .collect();
    for event in events {
        event.channel = remap[&event.channel];
    }
}
