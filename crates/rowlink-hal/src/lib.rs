//! `rowlink-hal` – the platform boundary.
//!
//! Everything below the protocol session lives behind the traits in this
//! crate, so the session and the device manager never touch USB directly.
//!
//! # Modules
//!
//! - [`bus`] – [`ErgBus`] device enumeration and the [`DeviceDescriptor`]
//!   identity rules.
//! - [`transport`] – [`ErgTransport`], raw frame read/write on one open device.
//! - [`codec`] – [`FrameCodec`], pure encode/decode between command lists and
//!   raw frames.
//! - [`sim`] – in-process simulated bus, ergs and loopback codec for running
//!   the full stack without hardware.

pub mod bus;
pub mod codec;
pub mod sim;
pub mod transport;

pub use bus::{BusError, C2_VENDOR_ID, DeviceDescriptor, ErgBus};
pub use codec::{CodecError, FrameCodec};
pub use sim::{LoopbackCodec, SimBus, SimErg};
pub use transport::{ErgTransport, TransportError};
