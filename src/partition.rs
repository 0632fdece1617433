use crate::error::{ChordreelError, ChordreelResult};
use crate::optimize::TimelineEntry;

/// Timelines shorter than this always render as a single batch; slicing
/// overhead only pays off past it.
const SINGLE_BATCH_THRESHOLD: usize = 100;

/// A contiguous slice of the optimized timeline, sized for one parallel
/// render unit. Entries keep their absolute start times.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub id: u32,
    pub entries: Vec<TimelineEntry>,
}

/// Placement of one batch's rendered segment (`Y<id>`) in the final
/// composition, at the batch's first entry's absolute start time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinalEntry {
    pub segment: u32,
    pub time: f64,
}

/// Split the optimized timeline into ordered, non-overlapping batches.
///
/// Fewer than 100 entries go into a single batch. Otherwise the batch size is
/// `max(1, N / max_batches)` (integer division) and the timeline is sliced
/// into consecutive chunks of that size; a shorter trailing chunk is still
/// emitted as its own batch, so nothing is dropped. One [`FinalEntry`] is
/// produced per batch.
///
/// The partition is re-checked before returning: concatenating the batches in
/// id order must reproduce the input exactly, and a mismatch is a fatal
/// internal-consistency error.
pub fn partition(
    timeline: &[TimelineEntry],
    max_batches: u32,
) -> ChordreelResult<(Vec<Batch>, Vec<FinalEntry>)> {
    if max_batches == 0 {
        return Err(ChordreelError::malformed("max_batches must be at least 1"));
    }

    let batch_size = if timeline.len() < SINGLE_BATCH_THRESHOLD {
        timeline.len().max(1)
    } else {
        (timeline.len() / max_batches as usize).max(1)
    };

    let mut batches = Vec::new();
    let mut finals = Vec::new();
    for (id, chunk) in timeline.chunks(batch_size).enumerate() {
        let id = id as u32;
        finals.push(FinalEntry {
            segment: id,
            time: chunk[0].time,
        });
        batches.push(Batch {
            id,
            entries: chunk.to_vec(),
        });
    }

    verify_partition(timeline, &batches)?;
    tracing::debug!(
        entries = timeline.len(),
        batches = batches.len(),
        batch_size,
        "partitioned timeline"
    );
    Ok((batches, finals))
}

/// Concatenating all batches in id order must reproduce the input timeline
/// exactly, with no gaps, overlaps, or reordering.
fn verify_partition(timeline: &[TimelineEntry], batches: &[Batch]) -> ChordreelResult<()> {
    for (expected, batch) in batches.iter().enumerate() {
        if batch.id != expected as u32 {
            return Err(ChordreelError::partition(format!(
                "batch ids out of order: found {} at position {expected}",
                batch.id
            )));
        }
    }
    let total: usize = batches.iter().map(|b| b.entries.len()).sum();
    if total != timeline.len() {
        return Err(ChordreelError::partition(format!(
            "batches cover {total} entries, timeline has {}",
            timeline.len()
        )));
    }
    let mut offset = 0;
    for batch in batches {
        let slice = &timeline[offset..offset + batch.entries.len()];
        if batch.entries != slice {
            return Err(ChordreelError::partition(format!(
                "batch {} does not match timeline entries {offset}..{}",
                batch.id,
                offset + batch.entries.len()
            )));
        }
        offset += batch.entries.len();
    }
    Ok(())
}
