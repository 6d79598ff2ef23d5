use thiserror::Error;

/// Errors raised at the notification bus boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("notification has no type")]
    MissingType,

    #[error("malformed notification: {0}")]
    Malformed(String),
}

/// Failure reported by a bus handler. Logged by the bus, never propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("store call failed: {0}")]
    Store(String),

    #[error("handler failed: {0}")]
    Failed(String),
}
