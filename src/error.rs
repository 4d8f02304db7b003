//! Crate-wide error type.
//!
//! Mirrors the four error kinds of the original driver: a transport I/O
//! failure, a configuration problem discovered before any I/O runs, a
//! protocol-level mismatch (program-enable not acknowledged, TPI framing
//! errors, bad TPIIR, SDO/SDI strap mismatch), and a failure reported by the
//! higher-level shell (e.g. `write_page`).

use thiserror::Error;

/// Crate-local result alias; every fallible operation in this crate uses it.
pub type Result<T> = std::result::Result<T, Ft245rError>;

#[derive(Debug, Error)]
pub enum Ft245rError {
    /// The FTDI transport's read/write/bitmode call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Port string couldn't be parsed, or a required pin/opcode is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A protocol-level invariant was violated (program-enable retries
    /// exhausted, TPI framing/parity error, bad TPIIR, SDO/SDI strap
    /// mismatch not overridden).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The higher-level shell's callback (e.g. `write_page`, default byte
    /// read/write) returned failure.
    #[error("shell error: {0}")]
    Shell(String),
}

impl Ft245rError {
    pub fn transport(msg: impl Into<String>) -> Self { Ft245rError::Transport(msg.into()) }

    pub fn configuration(msg: impl Into<String>) -> Self { Ft245rError::Configuration(msg.into()) }

    pub fn protocol(msg: impl Into<String>) -> Self { Ft245rError::Protocol(msg.into()) }

    pub fn shell(msg: impl Into<String>) -> Self { Ft245rError::Shell(msg.into()) }
}
