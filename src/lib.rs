//! Chordreel compiles a decoded musical performance into renderable video
//! work and drives its rendering.
//!
//! The input is a stream of note press/release signals (from an external
//! MIDI decoder); the output is one composed video assembled from
//! per-pitch source clips.
//!
//! # Pipeline overview
//!
//! 1. **Pair**: `Signal` stream -> `PressEvent`s ([`Pairer`])
//! 2. **Range-check**: transpose into the pack's pitch range if needed
//!    ([`resolve_range`])
//! 3. **Optimize**: merge simultaneous presses into deduplicated chord
//!    blocks ([`optimize`])
//! 4. **Partition**: slice the timeline into bounded render batches
//!    ([`partition`])
//! 5. **Render**: three barrier-separated stages, each fanned out over a
//!    bounded worker pool ([`PipelineCoordinator`])
//!
//! Steps 1-4 are pure and deterministic: the same input always produces the
//! same manifest, block ids included, so manifests persisted by
//! [`Manifest::save`] are reproducible and the pipeline can be re-driven
//! from disk. External IO lives behind two narrow seams, [`AssetCatalog`]
//! (which pitch clips exist) and [`RenderEngine`] (how a unit becomes a
//! video file).
#![forbid(unsafe_code)]

pub mod catalog;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod optimize;
pub mod partition;
pub mod pipeline;
pub mod pitch;
pub mod range;
pub mod signal;

pub use catalog::{AssetCatalog, DirCatalog};
pub use engine::{
    BlockLayer, FfmpegEngine, RenderEngine, RenderUnit, SegmentPart, layer_opacity,
};
pub use error::{ChordreelError, ChordreelResult};
pub use manifest::{Manifest, block_artifact, segment_artifact};
pub use optimize::{Block, NoteRef, OptimizedScore, TimelineEntry, optimize};
pub use partition::{Batch, FinalEntry, partition};
pub use pipeline::{PipelineConfig, PipelineCoordinator, PipelineState};
pub use pitch::{NOTE_LIST, PitchCode};
pub use range::{RangeOutcome, resolve_range};
pub use signal::{PairOutput, Pairer, PairerConfig, PressEvent, Signal};

use std::path::Path;

/// Compile a signal stream all the way to a persisted work manifest.
///
/// Convenience wrapper over steps 1-4; returns the manifest it saved plus
/// any pairing truncation warnings.
pub fn compile_to_manifest(
    signals: &[Signal],
    pairer_cfg: PairerConfig,
    catalog: &dyn AssetCatalog,
    requested_shift: Option<i32>,
    max_batches: u32,
    scripts_dir: &Path,
) -> ChordreelResult<(Manifest, Vec<Signal>)> {
    let pairer = Pairer::new(pairer_cfg);
    let PairOutput {
        mut events,
        truncated,
    } = pairer.pair(signals)?;
    if events.is_empty() {
        return Err(ChordreelError::malformed(
            "signal stream produced no press events",
        ));
    }

    let available = catalog.available_pitches()?;
    resolve_range(&mut events, &available, requested_shift)?;

    let score = optimize(&events, catalog.pack_id());
    let (batches, finals) = partition(&score.timeline, max_batches)?;

    let manifest = Manifest {
        script: score.timeline,
        blocks: score.blocks,
        batches,
        finals,
    };
    manifest.save(scripts_dir)?;
    Ok((manifest, truncated))
}
