/// Result alias used across the crate.
pub type ExportResult<T> = Result<T, ExportError>;

/// Terminal failure of an export invocation, or an invalid input to one of its stages.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    /// The source has no usable video track (missing, unreadable, or audio-only).
    #[error("asset invalid: {0}")]
    AssetInvalid(String),

    /// Track or time-range insertion failed while building the composition.
    #[error("composition failed: {0}")]
    CompositionFailed(String),

    /// The render finished in a non-success state.
    #[error("render failed: {}", .0.as_deref().unwrap_or("unknown error"))]
    RenderFailed(Option<String>),

    /// The export was cancelled before the render completed.
    #[error("export cancelled")]
    Cancelled,

    /// Another export is already in flight for this session.
    #[error("an export is already in flight")]
    Busy,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    pub fn asset_invalid(msg: impl Into<String>) -> Self {
        Self::AssetInvalid(msg.into())
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::CompositionFailed(msg.into())
    }

    pub fn render(diagnostic: impl Into<String>) -> Self {
        Self::RenderFailed(Some(diagnostic.into()))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Return `true` for the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
