use std::collections::BTreeSet;

use crate::error::{ChordreelError, ChordreelResult};
use crate::pitch::PitchCode;
use crate::signal::PressEvent;

/// How the pitch coverage check was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Every used pitch is available in the pack; events are unchanged.
    Covered,
    /// Events were shifted uniformly by this many semitones.
    Transposed { shift: i32 },
}

/// Validate the script's pitch coverage against the pack and transpose if
/// needed.
///
/// If every used pitch exists in `available`, the events are left untouched.
/// Otherwise a uniform semitone shift inside the feasible window
/// `[pack_min - script_min, pack_max - script_max]` is chosen (or validated,
/// when `requested` is given) and applied. A shift is acceptable only if it
/// is non-zero, inside the window, and makes every used pitch available.
pub fn resolve_range(
    events: &mut [PressEvent],
    available: &[PitchCode],
    requested: Option<i32>,
) -> ChordreelResult<RangeOutcome> {
    let used: BTreeSet<PitchCode> = events.iter().map(|e| e.note).collect();
    if used.is_empty() {
        return Err(ChordreelError::malformed(
            "cannot check pitch range of an empty script",
        ));
    }
    let pack: BTreeSet<PitchCode> = available.iter().copied().collect();
    if pack.is_empty() {
        return Err(ChordreelError::malformed(
            "asset pack contains no pitch clips",
        ));
    }

    let missing: Vec<PitchCode> = used.difference(&pack).copied().collect();
    if missing.is_empty() {
        return Ok(RangeOutcome::Covered);
    }

    let (Some(&script_min), Some(&script_max)) = (used.first(), used.last()) else {
        return Err(ChordreelError::malformed("empty script range"));
    };
    let (Some(&pack_min), Some(&pack_max)) = (pack.first(), pack.last()) else {
        return Err(ChordreelError::malformed("empty pack range"));
    };

    let script_span = script_max.midi_value() - script_min.midi_value();
    let pack_span = pack_max.midi_value() - pack_min.midi_value();
    if script_span > pack_span {
        return Err(ChordreelError::OutOfRange {
            script_min: script_min.to_string(),
            script_max: script_max.to_string(),
            pack_min: pack_min.to_string(),
            pack_max: pack_max.to_string(),
            missing: join_pitches(&missing),
        });
    }

    let min_shift = pack_min.midi_value() - script_min.midi_value();
    let max_shift = pack_max.midi_value() - script_max.midi_value();

    let covers = |shift: i32| used.iter().all(|p| pack.contains(&p.transposed(shift)));

    let shift = match requested {
        Some(shift) => {
            if shift < min_shift || shift > max_shift {
                return Err(ChordreelError::UnresolvableRange {
                    min_shift,
                    max_shift,
                    reason: format!("requested shift {shift} is outside the window"),
                });
            }
            if shift == 0 {
                return Err(ChordreelError::UnresolvableRange {
                    min_shift,
                    max_shift,
                    reason: format!("shift 0 leaves notes missing: {}", join_pitches(&missing)),
                });
            }
            if !covers(shift) {
                return Err(ChordreelError::UnresolvableRange {
                    min_shift,
                    max_shift,
                    reason: format!("requested shift {shift} leaves notes unavailable"),
                });
            }
            shift
        }
        None => candidate_shifts(min_shift, max_shift)
            .into_iter()
            .find(|&s| covers(s))
            .ok_or_else(|| ChordreelError::UnresolvableRange {
                min_shift,
                max_shift,
                reason: format!(
                    "no shift in the window covers missing notes: {}",
                    join_pitches(&missing)
                ),
            })?,
    };

    tracing::info!(
        shift,
        %script_min,
        %script_max,
        "transposing script into pack range"
    );
    for event in events {
        event.note = event.note.transposed(shift);
    }
    Ok(RangeOutcome::Transposed { shift })
}

/// Non-zero shifts inside the window, smallest magnitude first (ties prefer
/// shifting up).
fn candidate_shifts(min_shift: i32, max_shift: i32) -> Vec<i32> {
    let mut shifts: Vec<i32> = (min_shift..=max_shift).filter(|&s| s != 0).collect();
    shifts.sort_by_key(|&s| (s.abs(), s < 0));
    shifts
}

fn join_pitches(pitches: &[PitchCode]) -> String {
    pitches
        .iter()
        .map(PitchCode::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
