/// Convenience result type used across chordreel.
pub type ChordreelResult<T> = Result<T, ChordreelError>;

/// Top-level error taxonomy used by the compiler and pipeline APIs.
///
/// Every variant carries enough context (ids, ranges, paths) to reproduce the
/// failing step in isolation.
#[derive(thiserror::Error, Debug)]
pub enum ChordreelError {
    /// Input signals or manifests violate the expected shape.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The script's pitch span exceeds the pack's span; no transposition fits.
    #[error(
        "song range {script_min}..={script_max} cannot fit pack range {pack_min}..={pack_max} (missing: {missing})"
    )]
    OutOfRange {
        script_min: String,
        script_max: String,
        pack_min: String,
        pack_max: String,
        missing: String,
    },

    /// A transposition window exists but no acceptable shift covers the song.
    #[error("no transposition in {min_shift}..={max_shift} covers the song: {reason}")]
    UnresolvableRange {
        min_shift: i32,
        max_shift: i32,
        reason: String,
    },

    /// Batch concatenation failed to reproduce the input timeline. Internal
    /// consistency bug, never user-recoverable.
    #[error("partition invariant violated: {0}")]
    PartitionInvariant(String),

    /// A render unit failed; fatal to its stage and the whole pipeline.
    #[error("render unit '{unit}' failed: {reason}")]
    Render { unit: String, reason: String },

    /// Errors when serializing or deserializing manifests.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChordreelError {
    /// Build a [`ChordreelError::MalformedInput`] value.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Build a [`ChordreelError::PartitionInvariant`] value.
    pub fn partition(msg: impl Into<String>) -> Self {
        Self::PartitionInvariant(msg.into())
    }

    /// Build a [`ChordreelError::Render`] value.
    pub fn render(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`ChordreelError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
