/// Failure talking to the remote configuration endpoint. Always non-fatal: callers fall back to the last
/// locally known value.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote configuration endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("remote configuration endpoint returned status {0}")]
    Status(u16),
    #[error("remote configuration record is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("durable store rejected write to {key}: {reason}")]
    WriteRejected { key: String, reason: String },
}
