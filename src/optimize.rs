use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::ChordreelError;
use crate::pitch::PitchCode;
use crate::signal::PressEvent;

/// What a timeline entry plays: a single pitch clip, or a pre-composited
/// chord block referenced as `X<id>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoteRef {
    Pitch(PitchCode),
    Block(u32),
}

impl fmt::Display for NoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteRef::Pitch(p) => p.fmt(f),
            NoteRef::Block(id) => write!(f, "X{id}"),
        }
    }
}

impl FromStr for NoteRef {
    type Err = ChordreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix('X') {
            let id = id.parse::<u32>().map_err(|_| {
                ChordreelError::malformed(format!("bad block reference '{s}'"))
            })?;
            return Ok(NoteRef::Block(id));
        }
        Ok(NoteRef::Pitch(s.parse()?))
    }
}

impl serde::Serialize for NoteRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for NoteRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One renderable slot on the timeline, at an absolute start time.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimelineEntry {
    pub note: NoteRef,
    pub time: f64,
    pub duration: f64,
}

/// A deduplicated chord: pitches sounding together with identical timing.
/// `notes` is canonical (ascending by MIDI value, no duplicates); two blocks
/// with equal canonical note lists are the same block.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub notes: Vec<PitchCode>,
    pub index: u32,
    pub pack: String,
}

/// Output of the optimizer: the rewritten timeline plus its block set.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizedScore {
    pub used_pitches: BTreeSet<PitchCode>,
    pub timeline: Vec<TimelineEntry>,
    pub blocks: Vec<Block>,
}

/// Merge simultaneous presses into chord blocks and rewrite the timeline to
/// reference them.
///
/// Single forward pass: only **consecutive** events sharing an identical
/// `(time, duration)` pair form a chord group. A group of one stays a literal
/// entry. Larger groups are canonicalized and looked up in a dedup table, so
/// a chord seen earlier reuses its block id; new blocks get sequential ids in
/// first-seen order, which keeps re-runs byte-identical.
pub fn optimize(events: &[PressEvent], pack: &str) -> OptimizedScore {
    let mut used_pitches = BTreeSet::new();
    let mut timeline = Vec::new();
    let mut blocks = Vec::new();
    let mut seen: HashMap<Vec<PitchCode>, u32> = HashMap::new();

    let mut i = 0;
    while i < events.len() {
        let mut j = i + 1;
        while j < events.len()
            && events[j].time == events[i].time
            && events[j].duration == events[i].duration
        {
            j += 1;
        }

        let group = &events[i..j];
        for event in group {
            used_pitches.insert(event.note);
        }

        let note = if group.len() == 1 {
            NoteRef::Pitch(group[0].note)
        } else {
            let mut notes: Vec<PitchCode> = group.iter().map(|e| e.note).collect();
            notes.sort();
            notes.dedup();
            let next_id = seen.len() as u32;
            let id = *seen.entry(notes.clone()).or_insert(next_id);
            if id == next_id {
                blocks.push(Block {
                    notes,
                    index: id,
                    pack: pack.to_string(),
                });
            }
            NoteRef::Block(id)
        };

        timeline.push(TimelineEntry {
            note,
            time: group[0].time,
            duration: group[0].duration,
        });
        i = j;
    }

    tracing::debug!(
        entries = timeline.len(),
        blocks = blocks.len(),
        "optimized script"
    );
    OptimizedScore {
        used_pitches,
        timeline,
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(note: &str, time: f64, duration: f64) -> PressEvent {
        PressEvent {
            note: note.parse().unwrap(),
            channel: 0,
            time,
            duration,
        }
    }

    #[test]
    fn chord_plus_lone_note() {
        // Two simultaneous presses then a lone one: one block, one literal.
        let score = optimize(
            &[
                press("A4", 0.0, 1.0),
                press("C4", 0.0, 1.0),
                press("A4", 1.5, 0.5),
            ],
            "TestPack",
        );
        assert_eq!(score.timeline.len(), 2);
        assert_eq!(score.timeline[0].note, NoteRef::Block(0));
        assert_eq!(score.timeline[0].time, 0.0);
        assert_eq!(score.timeline[1].note.to_string(), "A4");
        assert_eq!(score.blocks.len(), 1);
        // Canonical member order is ascending MIDI value; the class list is
        // A-rooted, so A4 sorts below C4.
        let names: Vec<String> = score.blocks[0].notes.iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["A4", "C4"]);
        assert_eq!(score.blocks[0].pack, "TestPack");
    }

    #[test]
    fn equal_chords_reuse_the_block_id() {
        let score = optimize(
            &[
                press("C4", 0.0, 1.0),
                press("E4", 0.0, 1.0),
                press("G4", 2.0, 0.5),
                // Same chord spelled in the other order later on.
                press("E4", 4.0, 1.0),
                press("C4", 4.0, 1.0),
            ],
            "p",
        );
        assert_eq!(score.blocks.len(), 1);
        assert_eq!(score.timeline[0].note, NoteRef::Block(0));
        assert_eq!(score.timeline[2].note, NoteRef::Block(0));
    }

    #[test]
    fn distinct_chords_get_sequential_ids() {
        let score = optimize(
            &[
                press("C4", 0.0, 1.0),
                press("E4", 0.0, 1.0),
                press("D4", 1.0, 1.0),
                press("F4", 1.0, 1.0),
            ],
            "p",
        );
        assert_eq!(score.blocks.len(), 2);
        assert_eq!(score.blocks[0].index, 0);
        assert_eq!(score.blocks[1].index, 1);
        assert_eq!(score.timeline[1].note, NoteRef::Block(1));
    }

    #[test]
    fn grouping_is_adjacent_only() {
        // Same (time, duration) but separated by an interleaved entry:
        // the pass must not merge across it.
        let score = optimize(
            &[
                press("C4", 0.0, 1.0),
                press("D4", 0.5, 0.25),
                press("E4", 0.0, 1.0),
            ],
            "p",
        );
        assert_eq!(score.blocks.len(), 0);
        assert_eq!(score.timeline.len(), 3);
    }

    #[test]
    fn same_time_different_duration_does_not_merge() {
        let score = optimize(&[press("C4", 0.0, 1.0), press("E4", 0.0, 2.0)], "p");
        assert_eq!(score.blocks.len(), 0);
        assert_eq!(score.timeline.len(), 2);
    }

    #[test]
    fn duplicate_pitch_in_a_chord_is_dropped() {
        let score = optimize(
            &[
                press("C4", 0.0, 1.0),
                press("C4", 0.0, 1.0),
                press("E4", 0.0, 1.0),
            ],
            "p",
        );
        assert_eq!(score.blocks[0].notes.len(), 2);
    }

    #[test]
    fn rerun_is_deterministic() {
        let events = vec![
            press("C4", 0.0, 1.0),
            press("E4", 0.0, 1.0),
            press("G4", 1.0, 1.0),
            press("B4", 1.0, 1.0),
            press("C4", 2.0, 1.0),
            press("E4", 2.0, 1.0),
        ];
        assert_eq!(optimize(&events, "p"), optimize(&events, "p"));
    }

    #[test]
    fn already_optimal_input_passes_through() {
        let events = vec![press("C4", 0.0, 1.0), press("D4", 1.0, 1.0)];
        let score = optimize(&events, "p");
        assert!(score.blocks.is_empty());
        assert_eq!(score.timeline[0].time, 0.0);
        assert_eq!(score.timeline[1].note.to_string(), "D4");
    }

    #[test]
    fn used_pitches_include_block_members() {
        let score = optimize(
            &[
                press("C4", 0.0, 1.0),
                press("E4", 0.0, 1.0),
                press("G4", 1.0, 0.5),
            ],
            "p",
        );
        let names: Vec<String> = score.used_pitches.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, ["C4", "E4", "G4"]);
    }

    #[test]
    fn note_ref_text_round_trip() {
        let block: NoteRef = "X12".parse().unwrap();
        assert_eq!(block, NoteRef::Block(12));
        assert_eq!(block.to_string(), "X12");
        let pitch: NoteRef = "C#4".parse().unwrap();
        assert_eq!(pitch.to_string(), "C#4");
        assert!("Xabc".parse::<NoteRef>().is_err());
    }
}
