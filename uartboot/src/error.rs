//! Error types for uartboot.
//!
//! These are library-level failures (I/O, transport, flash access).
//! Wire-level error codes answered to the host are a separate, plain
//! enumeration: [`crate::protocol::AckCode`].

use std::io;
use thiserror::Error;

use crate::flash::FlashError;

/// Result type for uartboot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for uartboot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, backing file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Flash driver failure.
    #[error(transparent)]
    Flash(#[from] FlashError),

    /// Outbound transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}
