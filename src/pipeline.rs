use std::path::PathBuf;

use rayon::prelude::*;

use crate::catalog::AssetCatalog;
use crate::engine::{BlockLayer, RenderEngine, RenderUnit, SegmentPart, layer_opacity};
use crate::error::{ChordreelError, ChordreelResult};
use crate::manifest::{Manifest, block_artifact, segment_artifact};
use crate::optimize::NoteRef;

/// Where the three-stage pipeline currently is. `Failed` is terminal and
/// reachable from every non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    BlocksRendering,
    SegmentsRendering,
    FinalRendering,
    Done,
    Failed,
}

/// Coordinator configuration, passed in explicitly.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Worker pool width for the block stage.
    pub block_concurrency: usize,
    /// Worker pool width for the segment stage. Defaults to a quarter of the
    /// block pool (segments are much heavier units), minimum one.
    pub segment_concurrency: Option<usize>,
    /// Directory for intermediate `X*`/`Y*` artifacts.
    pub work_dir: PathBuf,
    /// Path of the final composed output.
    pub out_path: PathBuf,
}

impl PipelineConfig {
    pub fn new(work_dir: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            block_concurrency: 10,
            segment_concurrency: None,
            work_dir: work_dir.into(),
            out_path: out_path.into(),
        }
    }

    fn segment_concurrency(&self) -> usize {
        self.segment_concurrency
            .unwrap_or(self.block_concurrency / 4)
            .max(1)
    }
}

/// Drives the three sequential, internally-parallel render stages against a
/// [`RenderEngine`]: blocks, then batch segments, then the final assembly.
///
/// Stage transitions are barriers: a stage starts only after every unit of
/// the previous stage succeeded, because its units read files the previous
/// stage wrote. Any unit failure fails the stage and the pipeline; in-flight
/// units finish, not-yet-started units are dropped, and the coordinator lands
/// in [`PipelineState::Failed`].
pub struct PipelineCoordinator {
    cfg: PipelineConfig,
    state: PipelineState,
}

impl PipelineCoordinator {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            cfg,
            state: PipelineState::Pending,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the whole pipeline to completion. The manifest is read-only work
    /// input; all mutable state is per-unit and private to its worker.
    pub fn run(
        &mut self,
        manifest: &Manifest,
        catalog: &dyn AssetCatalog,
        engine: &dyn RenderEngine,
    ) -> ChordreelResult<()> {
        let result = self.run_stages(manifest, catalog, engine);
        if result.is_err() {
            self.state = PipelineState::Failed;
        }
        result
    }

    fn run_stages(
        &mut self,
        manifest: &Manifest,
        catalog: &dyn AssetCatalog,
        engine: &dyn RenderEngine,
    ) -> ChordreelResult<()> {
        manifest.validate()?;
        if manifest.batches.is_empty() {
            return Err(ChordreelError::malformed(
                "manifest has no batches to render",
            ));
        }
        std::fs::create_dir_all(&self.cfg.work_dir).map_err(|e| {
            ChordreelError::render(
                "work-dir",
                format!("create '{}': {e}", self.cfg.work_dir.display()),
            )
        })?;

        self.state = PipelineState::BlocksRendering;
        let block_units = self.block_units(manifest, catalog);
        tracing::info!(
            units = block_units.len(),
            workers = self.cfg.block_concurrency,
            "stage 1: rendering blocks"
        );
        run_stage(engine, &block_units, self.cfg.block_concurrency)?;

        self.state = PipelineState::SegmentsRendering;
        let segment_units = self.segment_units(manifest, catalog);
        tracing::info!(
            units = segment_units.len(),
            workers = self.cfg.segment_concurrency(),
            "stage 2: rendering segments"
        );
        run_stage(engine, &segment_units, self.cfg.segment_concurrency())?;

        self.state = PipelineState::FinalRendering;
        tracing::info!(out = %self.cfg.out_path.display(), "stage 3: rendering final");
        let final_unit = self.final_unit(manifest);
        check_inputs(&final_unit)?;
        engine.render(&final_unit, &self.cfg.out_path)?;

        self.state = PipelineState::Done;
        Ok(())
    }

    fn block_units(
        &self,
        manifest: &Manifest,
        catalog: &dyn AssetCatalog,
    ) -> Vec<(RenderUnit, PathBuf)> {
        manifest
            .blocks
            .iter()
            .map(|block| {
                let total = block.notes.len();
                let layers = block
                    .notes
                    .iter()
                    .enumerate()
                    .map(|(position, &note)| BlockLayer {
                        clip: catalog.clip_path(note),
                        opacity: layer_opacity(position, total),
                    })
                    .collect();
                (
                    RenderUnit::Block {
                        id: block.index,
                        layers,
                    },
                    self.cfg.work_dir.join(block_artifact(block.index)),
                )
            })
            .collect()
    }

    fn segment_units(
        &self,
        manifest: &Manifest,
        catalog: &dyn AssetCatalog,
    ) -> Vec<(RenderUnit, PathBuf)> {
        manifest
            .batches
            .iter()
            .map(|batch| {
                let base_time = batch.entries.first().map_or(0.0, |e| e.time);
                let parts = batch
                    .entries
                    .iter()
                    .map(|entry| {
                        let clip = match entry.note {
                            NoteRef::Pitch(pitch) => catalog.clip_path(pitch),
                            NoteRef::Block(id) => self.cfg.work_dir.join(block_artifact(id)),
                        };
                        SegmentPart {
                            clip,
                            start_offset: entry.time - base_time,
                        }
                    })
                    .collect();
                (
                    RenderUnit::Segment {
                        id: batch.id,
                        parts,
                    },
                    self.cfg.work_dir.join(segment_artifact(batch.id)),
                )
            })
            .collect()
    }

    fn final_unit(&self, manifest: &Manifest) -> RenderUnit {
        let parts = manifest
            .finals
            .iter()
            .map(|entry| SegmentPart {
                clip: self.cfg.work_dir.join(segment_artifact(entry.segment)),
                start_offset: entry.time,
            })
            .collect();
        RenderUnit::Final { parts }
    }
}

/// Render every unit of one stage on a bounded pool and join at the barrier.
/// The first failure stops new units from being dispatched; units already
/// running finish before the error is surfaced.
fn run_stage(
    engine: &dyn RenderEngine,
    units: &[(RenderUnit, PathBuf)],
    concurrency: usize,
) -> ChordreelResult<()> {
    let pool = build_worker_pool(concurrency)?;
    pool.install(|| {
        units.par_iter().try_for_each(|(unit, out_path)| {
            check_inputs(unit)?;
            tracing::debug!(unit = %unit.label(), out = %out_path.display(), "rendering unit");
            engine.render(unit, out_path)
        })
    })
}

/// Units share no mutable state, so the only pre-dispatch synchronization
/// needed is confirming the declared inputs exist.
fn check_inputs(unit: &RenderUnit) -> ChordreelResult<()> {
    for input in unit.inputs() {
        if !input.exists() {
            return Err(ChordreelError::render(
                unit.label(),
                format!("input clip '{}' does not exist", input.display()),
            ));
        }
    }
    Ok(())
}

fn build_worker_pool(threads: usize) -> ChordreelResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| ChordreelError::render("pool", format!("failed to build worker pool: {e}")))
}
