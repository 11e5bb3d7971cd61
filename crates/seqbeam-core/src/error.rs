use thiserror::Error;

/// Errors produced while configuring or running a beam search.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BeamError {
    #[error("beam width must be at least 1")]
    ZeroWidth,
    #[error("max length must be at least 1")]
    ZeroMaxLength,
    #[error("max completed ({max_completed}) must not be smaller than beam width ({width})")]
    MaxCompletedBelowWidth { max_completed: usize, width: usize },
    #[error("no hypothesis left to finalize")]
    EmptyBeam,
    #[error("unknown word: {0:?}")]
    UnknownWord(String),
    #[error(transparent)]
    Scorer(anyhow::Error),
}

impl BeamError {
    /// If this error rejects a configuration before any search runs.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ZeroWidth | Self::ZeroMaxLength | Self::MaxCompletedBelowWidth { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BeamError>;
