use std::fs;
use std::path::Path;

use anyhow::Context as _;

use crate::error::{ChordreelError, ChordreelResult};
use crate::optimize::{Block, TimelineEntry};
use crate::partition::{Batch, FinalEntry};

/// File names of the persisted work manifest, stable across runs so a
/// pipeline can be resumed or debugged from disk.
pub const OPTIMIZED_SCRIPT_FILE: &str = "optimized-script.json";
pub const BLOCKS_FILE: &str = "blocks.json";
pub const BATCHES_FILE: &str = "batches.json";
pub const FINAL_SCRIPT_FILE: &str = "final-script.json";

/// Artifact name for a rendered chord block.
pub fn block_artifact(id: u32) -> String {
    format!("X{id}.mp4")
}

/// Artifact name for a rendered batch segment.
pub fn segment_artifact(id: u32) -> String {
    format!("Y{id}.mp4")
}

/// One timeline entry tagged with the batch it belongs to, as persisted in
/// the batches manifest.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct BatchedEntry {
    #[serde(flatten)]
    entry: TimelineEntry,
    index: u32,
}

/// One line of the final script: `{"note": "Y<i>", "time": ...}`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct FinalRecord {
    note: String,
    time: f64,
}

/// The pipeline's complete work manifest: everything the coordinator and the
/// render engine read, produced once by the optimizer and partitioner.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    pub script: Vec<TimelineEntry>,
    pub blocks: Vec<Block>,
    pub batches: Vec<Batch>,
    pub finals: Vec<FinalEntry>,
}

impl Manifest {
    /// Persist all four manifest files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> ChordreelResult<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create scripts directory '{}'", dir.display()))?;

        write_json(&dir.join(OPTIMIZED_SCRIPT_FILE), &self.script)?;
        write_json(&dir.join(BLOCKS_FILE), &self.blocks)?;

        let batches: Vec<Vec<BatchedEntry>> = self
            .batches
            .iter()
            .map(|batch| {
                batch
                    .entries
                    .iter()
                    .map(|&entry| BatchedEntry {
                        entry,
                        index: batch.id,
                    })
                    .collect()
            })
            .collect();
        write_json(&dir.join(BATCHES_FILE), &batches)?;

        let finals: Vec<FinalRecord> = self
            .finals
            .iter()
            .map(|f| FinalRecord {
                note: format!("Y{}", f.segment),
                time: f.time,
            })
            .collect();
        write_json(&dir.join(FINAL_SCRIPT_FILE), &finals)?;

        tracing::info!(dir = %dir.display(), "wrote work manifest");
        Ok(())
    }

    /// Load a previously saved manifest from `dir`.
    pub fn load(dir: &Path) -> ChordreelResult<Self> {
        let script: Vec<TimelineEntry> = read_json(&dir.join(OPTIMIZED_SCRIPT_FILE))?;
        let blocks: Vec<Block> = read_json(&dir.join(BLOCKS_FILE))?;
        let raw_batches: Vec<Vec<BatchedEntry>> = read_json(&dir.join(BATCHES_FILE))?;
        let raw_finals: Vec<FinalRecord> = read_json(&dir.join(FINAL_SCRIPT_FILE))?;

        let mut batches = Vec::with_capacity(raw_batches.len());
        for (position, raw) in raw_batches.into_iter().enumerate() {
            let id = position as u32;
            if raw.is_empty() {
                return Err(ChordreelError::malformed(format!(
                    "batch {id} in manifest is empty"
                )));
            }
            if let Some(bad) = raw.iter().find(|e| e.index != id) {
                return Err(ChordreelError::malformed(format!(
                    "batch {id} contains an entry tagged for batch {}",
                    bad.index
                )));
            }
            batches.push(Batch {
                id,
                entries: raw.into_iter().map(|e| e.entry).collect(),
            });
        }

        let mut finals = Vec::with_capacity(raw_finals.len());
        for record in raw_finals {
            let segment = record
                .note
                .strip_prefix('Y')
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| {
                    ChordreelError::malformed(format!(
                        "final script entry '{}' is not a segment reference",
                        record.note
                    ))
                })?;
            finals.push(FinalEntry {
                segment,
                time: record.time,
            });
        }

        Ok(Self {
            script,
            blocks,
            batches,
            finals,
        })
    }

    /// Cheap structural checks before the pipeline starts: every referenced
    /// block id must exist exactly once in the block set, batch/final ids
    /// must line up, and the batches must still concatenate back into the
    /// optimized script (a hand-edited manifest can break that without
    /// failing any per-entry check).
    pub fn validate(&self) -> ChordreelResult<()> {
        for (position, block) in self.blocks.iter().enumerate() {
            if block.index != position as u32 {
                return Err(ChordreelError::malformed(format!(
                    "block ids are not sequential: found {} at position {position}",
                    block.index
                )));
            }
        }
        for entry in self.batches.iter().flat_map(|b| &b.entries) {
            if let crate::optimize::NoteRef::Block(id) = entry.note
                && id as usize >= self.blocks.len()
            {
                return Err(ChordreelError::malformed(format!(
                    "timeline references unknown block X{id}"
                )));
            }
        }
        if self.finals.len() != self.batches.len() {
            return Err(ChordreelError::malformed(format!(
                "{} final entries for {} batches",
                self.finals.len(),
                self.batches.len()
            )));
        }
        for (final_entry, batch) in self.finals.iter().zip(&self.batches) {
            if final_entry.segment != batch.id {
                return Err(ChordreelError::malformed(format!(
                    "final entry Y{} does not match batch {}",
                    final_entry.segment, batch.id
                )));
            }
        }
        let flattened: Vec<TimelineEntry> = self
            .batches
            .iter()
            .flat_map(|b| b.entries.iter().copied())
            .collect();
        if flattened != self.script {
            return Err(ChordreelError::partition(
                "batches do not concatenate back into the optimized script",
            ));
        }
        Ok(())
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ChordreelResult<()> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| ChordreelError::serde(format!("encode '{}': {e}", path.display())))?;
    fs::write(path, body).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ChordreelResult<T> {
    let body =
        fs::read(path).with_context(|| format!("read manifest '{}'", path.display()))?;
    serde_json::from_slice(&body)
        .map_err(|e| ChordreelError::serde(format!("decode '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_deterministic() {
        assert_eq!(block_artifact(0), "X0.mp4");
        assert_eq!(block_artifact(17), "X17.mp4");
        assert_eq!(segment_artifact(3), "Y3.mp4");
    }

    #[test]
    fn validate_rejects_batches_that_disagree_with_the_script() {
        let entry = |time: f64| TimelineEntry {
            note: "C4".parse().unwrap(),
            time,
            duration: 1.0,
        };
        let good = Manifest {
            script: vec![entry(0.0), entry(1.0)],
            blocks: Vec::new(),
            batches: vec![Batch {
                id: 0,
                entries: vec![entry(0.0), entry(1.0)],
            }],
            finals: vec![FinalEntry {
                segment: 0,
                time: 0.0,
            }],
        };
        good.validate().unwrap();

        // Same batch shape, but an entry no longer matches the script.
        let mut tampered = good.clone();
        tampered.batches[0].entries[1] = entry(9.0);
        let err = tampered.validate().unwrap_err();
        assert!(matches!(err, ChordreelError::PartitionInvariant(_)));

        // A dropped entry is caught too.
        let mut truncated = good;
        truncated.batches[0].entries.pop();
        assert!(truncated.validate().is_err());
    }

    #[test]
    fn batched_entry_flattens_the_timeline_fields() {
        let entry = BatchedEntry {
            entry: TimelineEntry {
                note: "X2".parse().unwrap(),
                time: 1.5,
                duration: 0.5,
            },
            index: 4,
        };
        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"note": "X2", "time": 1.5, "duration": 0.5, "index": 4})
        );
    }
}
