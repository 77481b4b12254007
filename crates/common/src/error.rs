use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The candle window is shorter than the active lookbacks need.
    /// Not fatal: the caller waits for more candles.
    #[error("Insufficient candle data: need {required}, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid strategy configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown leverage tier: {0}")]
    UnknownTier(String),

    /// The one-time partial close was rejected by the execution layer.
    /// Stop-loss protection stays on the full remaining quantity.
    #[error("Partial close of {quantity} on {symbol} failed: {reason}")]
    PartialCloseExecution {
        symbol: String,
        quantity: f64,
        reason: String,
    },

    #[error("Unknown position: {0}")]
    UnknownPosition(String),

    #[error("Position already open for {0}")]
    DuplicatePosition(String),

    #[error("Lock poisoned: {0}")]
    Poisoned(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Exchange(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the caller is expected to recover from by waiting or retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientData { .. } | Error::PartialCloseExecution { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
