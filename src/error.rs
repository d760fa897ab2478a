//! Errors surfaced by the network front ends

use crate::metrics::StoreError;
use std::io::Error as IoError;

#[derive(Debug)]
pub enum ServerError {
    /// Socket bind, accept, read or write failure
    Io(IoError),
    /// The store stopped accepting mutations
    Store(StoreError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
            ServerError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Io(e) => Some(e),
            ServerError::Store(e) => Some(e),
        }
    }
}

impl From<IoError> for ServerError {
    fn from(e: IoError) -> Self {
        ServerError::Io(e)
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        ServerError::Store(e)
    }
}
