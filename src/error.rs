use thiserror::Error;

use crate::connector::ConnectionState;

/// Failures reported by the underlying wireless stack.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("no bluetooth adapter available")]
    NoAdapter,

    #[error("{0}")]
    Stack(String),
}

impl From<btleplug::Error> for RadioError {
    fn from(e: btleplug::Error) -> Self {
        RadioError::Stack(e.to_string())
    }
}

/// Why a connection attempt ended in `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionCause {
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("printer service not found after connect")]
    ServiceNotFound,

    #[error("no characteristics found for the printer service")]
    NoCharacteristics,

    #[error("attempt superseded")]
    Superseded,

    #[error("radio event stream closed")]
    RadioUnavailable,

    #[error(transparent)]
    Radio(#[from] RadioError),
}

/// A connection attempt reached `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("connection failed while {stage:?}: {cause}")]
pub struct ConnectionError {
    pub stage: ConnectionState,
    pub cause: ConnectionCause,
}

impl ConnectionError {
    pub fn new(stage: ConnectionState, cause: impl Into<ConnectionCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, ConnectionCause::Timeout(_))
    }
}

/// Malformed job input, rejected before any byte is produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} data is required")]
    MissingData(&'static str),

    #[error("Invalid barcode type: {0}")]
    UnknownBarcodeType(String),

    #[error("Invalid alignment: {0}")]
    UnknownAlignment(String),

    #[error("QR size {size} out of range {min}..={max}")]
    SizeOutOfRange { size: u32, min: u8, max: u8 },

    #[error("{kind} data is {len} bytes, at most {max} allowed")]
    DataTooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },
}

/// Errors surfaced to callers of the print session.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("Not connected to a characteristic")]
    NotConnected,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("printer write failed: {0}")]
    Write(#[source] RadioError),
}
