use thiserror::Error;

/// Error kinds the core distinguishes. HTTP mapping lives in
/// `services/node`'s `http::response` module, which keeps the frozen error
/// envelope shape out of this crate.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("signature verification failed")]
    Signature,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("peer belongs to a different dimension")]
    WrongDimension,

    #[error("remote timeline is not writable through the local post path")]
    RemoteNotSupported,

    #[error("transient error: {0}")]
    Transient(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
