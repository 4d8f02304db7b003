//! FT245R/FT232R synchronous bit-bang AVR ISP/TPI programmer core.
//!
//! This crate drives an AVR microcontroller's ISP and TPI programming
//! protocols by bit-banging an FTDI FT232R/FT245R chip's 8 GPIO pins in
//! *synchronous bit-bang mode*: every byte the host writes drives the pins
//! and is simultaneously echoed back one byte-time later as the sampled
//! input state. Everything above pin-level synthesis — the AVR part
//! database, command-line parsing, the host-side memory image, USB
//! enumeration — is supplied by the caller through the [`transport`] and
//! [`part`] traits; see [`Programmer`] for the operation table this crate
//! exposes in return.

pub mod config;
pub mod error;
pub mod io;
pub mod part;
pub mod pins;
pub mod programmer;
pub mod queue;
pub mod spi;
pub mod transport;
pub mod tpi;
pub mod txrx;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::Config;
pub use error::{Ft245rError, Result};
pub use part::{Memory, MemoryKind, PartDescriptor};
pub use programmer::Programmer;
pub use transport::{BitMode, FtdiTransport};
