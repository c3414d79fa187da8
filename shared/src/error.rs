/// Errors surfaced by config loading and replay persistence.
///
/// The per-tick core never returns these; it substitutes safe defaults instead.
#[derive(Debug, thiserror::Error)]
pub enum LocomotionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] ron::error::SpannedError),

    #[error("Replay encoding error: {0}")]
    Replay(#[from] bincode::Error),

    #[error("Unsupported replay version {found} (expected {expected})")]
    UnsupportedReplayVersion { found: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, LocomotionError>;
