use thiserror::Error;

/// Errors surfaced by the agent's infrastructure.
///
/// A template that simply is not on screen is *not* an error: waits and
/// clicks report that through their step outcome and the flow engine's
/// retry policy. This enum covers the conditions that short-circuit an
/// operation regardless of retries.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A zone descriptor resolved to an empty rectangle for the current
    /// client area.
    #[error("zone resolves to an empty rectangle: {0}")]
    BadZone(String),

    /// The game window disappeared or could not be captured.
    #[error("game window is gone: {0}")]
    WindowGone(String),

    /// The serial input driver failed to accept a command.
    #[error("input driver I/O error: {0}")]
    DriverIo(String),

    /// No flow, zone table or template is registered under the requested key.
    #[error("nothing registered under '{0}'")]
    LoaderMissing(String),

    /// A template reference could not be resolved to an image on disk.
    #[error("template not found: {0}")]
    TemplateMissing(String),

    /// Account restart gave up after exhausting its attempt budget.
    #[error("account restart failed after {attempts} attempts")]
    RestartExhausted { attempts: u32 },

    /// Anything the underlying platform reports that has no better home.
    #[error("platform error: {0}")]
    Platform(String),
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::DriverIo(e.to_string())
    }
}
