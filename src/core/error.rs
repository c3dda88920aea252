//! Failure taxonomy for thumbnail fetches.
//!
//! Every variant collapses to "no image" at the `ImageFetchCache` boundary.
//! The kinds stay distinct internally for logs and `CacheStats`.

/// Why a fetch produced no image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Identifier did not parse as an absolute URL
    MalformedIdentifier(String),
    /// Network or filesystem transfer failed (includes non-2xx status)
    TransferFailed(String),
    /// Bytes arrived but are not a decodable image
    DecodeFailed(String),
    /// Fetch was cancelled before it finished
    Cancelled,
}

impl FetchError {
    /// Short stable name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::MalformedIdentifier(_) => "malformed",
            FetchError::TransferFailed(_) => "transfer",
            FetchError::DecodeFailed(_) => "decode",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::MalformedIdentifier(e) => write!(f, "Malformed identifier: {}", e),
            FetchError::TransferFailed(e) => write!(f, "Transfer failed: {}", e),
            FetchError::DecodeFailed(e) => write!(f, "Decode failed: {}", e),
            FetchError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}
