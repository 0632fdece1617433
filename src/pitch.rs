use std::fmt;
use std::str::FromStr;

use crate::error::{ChordreelError, ChordreelResult};

/// Pitch-class spellings in clip-label order. The packs label their clips
/// starting at A, so the class index is A-rooted rather than C-rooted.
pub const NOTE_LIST: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// A note name plus octave (`"C#4"`), totally ordered by its MIDI-style
/// integer value `octave * 12 + class index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PitchCode {
    /// Index into [`NOTE_LIST`].
    pub class: u8,
    pub octave: i32,
}

impl PitchCode {
    pub fn new(class: u8, octave: i32) -> ChordreelResult<Self> {
        if class >= 12 {
            return Err(ChordreelError::malformed(format!(
                "pitch class index {class} out of range 0..12"
            )));
        }
        Ok(Self { class, octave })
    }

    /// MIDI-style integer value used for ordering and transposition.
    pub fn midi_value(self) -> i32 {
        self.octave * 12 + i32::from(self.class)
    }

    pub fn from_midi(value: i32) -> Self {
        Self {
            class: value.rem_euclid(12) as u8,
            octave: value.div_euclid(12),
        }
    }

    /// Uniform semitone shift. `shift` may be negative.
    pub fn transposed(self, shift: i32) -> Self {
        Self::from_midi(self.midi_value() + shift)
    }
}

impl PartialOrd for PitchCode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PitchCode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.midi_value().cmp(&other.midi_value())
    }
}

impl fmt::Display for PitchCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_LIST[usize::from(self.class)], self.octave)
    }
}

impl FromStr for PitchCode {
    type Err = ChordreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(|| ChordreelError::malformed(format!("pitch code '{s}' has no octave")))?;
        let (name, octave) = s.split_at(split);
        let class = NOTE_LIST
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| ChordreelError::malformed(format!("unknown pitch class in '{s}'")))?;
        let octave = octave
            .parse::<i32>()
            .map_err(|_| ChordreelError::malformed(format!("bad octave in pitch code '{s}'")))?;
        Ok(Self {
            class: class as u8,
            octave,
        })
    }
}

impl serde::Serialize for PitchCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PitchCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
