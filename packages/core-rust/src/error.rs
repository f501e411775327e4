/// Configuration errors detected before any mutation is applied.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {strategy} strategy options: {reason}")]
    InvalidOptions {
        strategy: &'static str,
        reason: String,
    },
    #[error("malformed strategy configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no async runtime available to drive strategy timers")]
    NoRuntime,
}

/// Errors encoding or decoding a [`MutationBatch`](crate::wire::MutationBatch).
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode mutation batch: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode mutation batch: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
