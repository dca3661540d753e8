use bitcoin::Txid;

/// Errors reported by coins views.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The view does not implement the operation.
    #[error("{0} is not supported by this view")]
    Unsupported(&'static str),

    /// A record could not be encoded for storage.
    #[error("Failed to encode coins of {0}: {1}")]
    Encode(Txid, bitcoin::io::Error),

    /// The underlying store failed.
    #[error("Backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}
