use std::path::PathBuf;

use anyhow::Context as _;

use crate::error::ChordreelResult;
use crate::pitch::PitchCode;

/// The set of pre-recorded per-pitch clips available for one instrument
/// voice. Kept narrow so tests can substitute an in-memory pack.
pub trait AssetCatalog: Sync {
    /// Identifier recorded in block manifests (typically the pack dir name).
    fn pack_id(&self) -> &str;

    /// Pitches with a source clip, ascending by MIDI value.
    fn available_pitches(&self) -> ChordreelResult<Vec<PitchCode>>;

    /// Path of the source clip for `pitch`. Existence is implied by
    /// [`available_pitches`](Self::available_pitches).
    fn clip_path(&self, pitch: PitchCode) -> PathBuf;
}

/// A pack directory of `<pitch>.mp4` clips, e.g. `packs/PianoTestPack/C4.mp4`.
#[derive(Clone, Debug)]
pub struct DirCatalog {
    root: PathBuf,
    pack_id: String,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let pack_id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { root, pack_id }
    }
}

impl AssetCatalog for DirCatalog {
    fn pack_id(&self) -> &str {
        &self.pack_id
    }

    fn available_pitches(&self) -> ChordreelResult<Vec<PitchCode>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("list pack directory '{}'", self.root.display()))?;

        let mut pitches = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("read pack entry in '{}'", self.root.display()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "mp4") {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) else {
                continue;
            };
            // Non-pitch files in the pack (covers, readmes) are just skipped.
            if let Ok(pitch) = stem.parse::<PitchCode>() {
                pitches.push(pitch);
            }
        }
        pitches.sort();
        Ok(pitches)
    }

    fn clip_path(&self, pitch: PitchCode) -> PathBuf {
        self.root.join(format!("{pitch}.mp4"))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn scratch_pack(name: &str, files: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chordreel-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            std::fs::write(dir.join(file), b"").unwrap();
        }
        dir
    }

    #[test]
    fn scans_and_sorts_pitch_clips() {
        let dir = scratch_pack("scan", &["C4.mp4", "A0.mp4", "G#3.mp4", "cover.png", "notes.txt"]);
        let catalog = DirCatalog::new(&dir);
        let names: Vec<String> = catalog
            .available_pitches()
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(names, ["A0", "G#3", "C4"]);
    }

    #[test]
    fn pack_id_is_the_directory_name() {
        let dir = scratch_pack("packid", &[]);
        let catalog = DirCatalog::new(&dir);
        assert!(catalog.pack_id().starts_with("chordreel-packid"));
    }

    #[test]
    fn clip_path_joins_pitch_file() {
        let catalog = DirCatalog::new("/packs/Piano");
        let pitch: PitchCode = "C#4".parse().unwrap();
        assert_eq!(
            catalog.clip_path(pitch),
            Path::new("/packs/Piano/C#4.mp4")
        );
    }

    #[test]
    fn missing_directory_errors() {
        let catalog = DirCatalog::new("/definitely/not/here");
        assert!(catalog.available_pitches().is_err());
    }
}
