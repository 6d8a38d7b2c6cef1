use thiserror::Error;

/// Outcomes of display operations that callers surface to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("the presentation surface could not be opened; allow pop-ups for this site")]
    PopupBlocked,
    #[error("the presentation surface is not open; open the display first")]
    NotOpen,
    #[error("failed to send content to the presentation surface: {0}")]
    TransportFailure(String),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface is closed")]
    Closed,
    #[error("surface state is no longer accessible")]
    Poisoned,
    #[error("failed to encode display frame: {0}")]
    Encode(#[from] serde_json::Error),
}
