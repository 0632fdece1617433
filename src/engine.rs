use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{ChordreelError, ChordreelResult};

/// One clip layered into a block composite.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockLayer {
    pub clip: PathBuf,
    /// 0..=1; later layers get proportionally lower opacity so every pitch
    /// stays visible in the composite.
    pub opacity: f64,
}

/// One clip placed into a segment or final composite at a start offset.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentPart {
    pub clip: PathBuf,
    pub start_offset: f64,
}

/// A self-contained render work unit. Each unit reads only its declared input
/// clips and writes only its own output path, so units never contend.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderUnit {
    Block { id: u32, layers: Vec<BlockLayer> },
    Segment { id: u32, parts: Vec<SegmentPart> },
    Final { parts: Vec<SegmentPart> },
}

impl RenderUnit {
    /// Stable label used in artifact names and error context.
    pub fn label(&self) -> String {
        match self {
            RenderUnit::Block { id, .. } => format!("X{id}"),
            RenderUnit::Segment { id, .. } => format!("Y{id}"),
            RenderUnit::Final { .. } => "final".to_string(),
        }
    }

    /// The input clips this unit reads, in composite order.
    pub fn inputs(&self) -> Vec<&Path> {
        match self {
            RenderUnit::Block { layers, .. } => layers.iter().map(|l| l.clip.as_path()).collect(),
            RenderUnit::Segment { parts, .. } | RenderUnit::Final { parts } => {
                parts.iter().map(|p| p.clip.as_path()).collect()
            }
        }
    }
}

/// Opacity for layer `position` of `total` in a block composite:
/// the first layer is fully opaque, the last gets `1/total`. Positions past
/// the end clamp to that minimum instead of underflowing.
pub fn layer_opacity(position: usize, total: usize) -> f64 {
    let total = total.max(1);
    total.saturating_sub(position).max(1) as f64 / total as f64
}

/// The one seam to the external compositor. Implementations must be safe to
/// call from multiple pool workers at once.
pub trait RenderEngine: Sync {
    fn render(&self, unit: &RenderUnit, out_path: &Path) -> ChordreelResult<()>;
}

fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Renders units by spawning the system `ffmpeg` binary with a deterministic
/// argument vector, one process per unit.
#[derive(Clone, Debug)]
pub struct FfmpegEngine {
    pub width: u32,
    pub height: u32,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl FfmpegEngine {
    /// Fails early if `ffmpeg` is not on PATH, rather than at the first unit.
    pub fn new(width: u32, height: u32) -> ChordreelResult<Self> {
        if !is_ffmpeg_on_path() {
            return Err(ChordreelError::render(
                "ffmpeg",
                "ffmpeg is required for rendering, but was not found on PATH",
            ));
        }
        Ok(Self { width, height })
    }

    /// The full argument vector for one unit. Pure, so tests can check the
    /// command without spawning anything.
    pub fn build_args(&self, unit: &RenderUnit, out_path: &Path) -> Vec<String> {
        let mut args = vec!["-y".into(), "-loglevel".into(), "error".into()];
        for input in unit.inputs() {
            args.push("-i".into());
            args.push(input.display().to_string());
        }
        args.push("-filter_complex".into());
        args.push(self.filter_graph(unit));
        args.extend(
            [
                "-map",
                "[out]",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]
            .map(String::from),
        );
        args.push(out_path.display().to_string());
        args
    }

    fn filter_graph(&self, unit: &RenderUnit) -> String {
        let mut chains = Vec::new();
        let labels: Vec<String> = match unit {
            RenderUnit::Block { layers, .. } => layers
                .iter()
                .enumerate()
                .map(|(i, layer)| {
                    chains.push(format!(
                        "[{i}:v]scale={w}:{h},format=yuva420p,colorchannelmixer=aa={op}[l{i}]",
                        w = self.width,
                        h = self.height,
                        op = layer.opacity,
                    ));
                    format!("l{i}")
                })
                .collect(),
            RenderUnit::Segment { parts, .. } | RenderUnit::Final { parts } => parts
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    chains.push(format!(
                        "[{i}:v]scale={w}:{h},setpts=PTS-STARTPTS+{off}/TB[l{i}]",
                        w = self.width,
                        h = self.height,
                        off = part.start_offset,
                    ));
                    format!("l{i}")
                })
                .collect(),
        };

        // Fold the labeled streams into one composite, first stream at the
        // bottom of the stack.
        match labels.len() {
            0 => "color=c=black[out]".to_string(),
            1 => {
                chains.push(format!("[{}]null[out]", labels[0]));
                chains.join(";")
            }
            n => {
                let mut acc = labels[0].clone();
                for (i, label) in labels.iter().enumerate().skip(1) {
                    let target = if i == n - 1 {
                        "out".to_string()
                    } else {
                        format!("m{i}")
                    };
                    chains.push(format!("[{acc}][{label}]overlay=eof_action=pass[{target}]"));
                    acc = target;
                }
                chains.join(";")
            }
        }
    }
}

impl RenderEngine for FfmpegEngine {
    fn render(&self, unit: &RenderUnit, out_path: &Path) -> ChordreelResult<()> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChordreelError::render(
                    unit.label(),
                    format!("create output directory '{}': {e}", parent.display()),
                )
            })?;
        }

        let args = self.build_args(unit, out_path);
        tracing::debug!(unit = %unit.label(), ?args, "spawning ffmpeg");
        let output = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ChordreelError::render(unit.label(), format!("spawn ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChordreelError::render(
                unit.label(),
                format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_falls_off_proportionally() {
        assert_eq!(layer_opacity(0, 2), 1.0);
        assert_eq!(layer_opacity(1, 2), 0.5);
        assert_eq!(layer_opacity(0, 4), 1.0);
        assert_eq!(layer_opacity(3, 4), 0.25);
    }

    #[test]
    fn opacity_clamps_out_of_range_positions() {
        assert_eq!(layer_opacity(4, 4), 0.25);
        assert_eq!(layer_opacity(100, 4), 0.25);
        assert_eq!(layer_opacity(0, 0), 1.0);
    }

    #[test]
    fn block_args_layer_with_opacity() {
        let engine = FfmpegEngine {
            width: 1920,
            height: 1080,
        };
        let unit = RenderUnit::Block {
            id: 0,
            layers: vec![
                BlockLayer {
                    clip: "/pack/C4.mp4".into(),
                    opacity: 1.0,
                },
                BlockLayer {
                    clip: "/pack/A4.mp4".into(),
                    opacity: 0.5,
                },
            ],
        };
        let args = engine.build_args(&unit, Path::new("/work/X0.mp4"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert_eq!(
            graph,
            "[0:v]scale=1920:1080,format=yuva420p,colorchannelmixer=aa=1[l0];\
             [1:v]scale=1920:1080,format=yuva420p,colorchannelmixer=aa=0.5[l1];\
             [l0][l1]overlay=eof_action=pass[out]"
        );
        assert_eq!(args.last().unwrap(), "/work/X0.mp4");
    }

    #[test]
    fn segment_args_offset_each_part() {
        let engine = FfmpegEngine {
            width: 640,
            height: 360,
        };
        let unit = RenderUnit::Segment {
            id: 3,
            parts: vec![
                SegmentPart {
                    clip: "/pack/C4.mp4".into(),
                    start_offset: 0.0,
                },
                SegmentPart {
                    clip: "/work/X1.mp4".into(),
                    start_offset: 2.5,
                },
            ],
        };
        let args = engine.build_args(&unit, Path::new("/work/Y3.mp4"));
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("setpts=PTS-STARTPTS+0/TB[l0]"));
        assert!(graph.contains("setpts=PTS-STARTPTS+2.5/TB[l1]"));
        assert!(graph.ends_with("[out]"));
    }

    #[test]
    fn single_part_unit_still_maps_an_out_label() {
        let engine = FfmpegEngine::default();
        let unit = RenderUnit::Final {
            parts: vec![SegmentPart {
                clip: "/work/Y0.mp4".into(),
                start_offset: 0.0,
            }],
        };
        let args = engine.build_args(&unit, Path::new("/out/movie.mp4"));
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.ends_with("null[out]"));
    }

    #[test]
    fn args_are_deterministic() {
        let engine = FfmpegEngine::default();
        let unit = RenderUnit::Block {
            id: 7,
            layers: vec![BlockLayer {
                clip: "/pack/C4.mp4".into(),
                opacity: 1.0,
            }],
        };
        let a = engine.build_args(&unit, Path::new("/work/X7.mp4"));
        let b = engine.build_args(&unit, Path::new("/work/X7.mp4"));
        assert_eq!(a, b);
    }

    #[test]
    fn labels_follow_artifact_naming() {
        let block = RenderUnit::Block {
            id: 2,
            layers: vec![],
        };
        let segment = RenderUnit::Segment {
            id: 5,
            parts: vec![],
        };
        assert_eq!(block.label(), "X2");
        assert_eq!(segment.label(), "Y5");
        assert_eq!(RenderUnit::Final { parts: vec![] }.label(), "final");
    }
}
