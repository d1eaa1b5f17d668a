//! evmag Data Model
//!
//! Defines the data contracts shared by every stage of the magnification run:
//! - **Stream:** Geometry, frame rate and color mode of a video stream
//! - **Frame:** Decoded 8-bit frames and the floating-point frame-sequence tensor
//! - **Params:** Filter band, amplification factor and user-facing settings
//!
//! Frame sequences are always laid out as `[time, row, column, channel]`;
//! single-channel sequences carry a channel axis of length 1.

pub mod frame;
pub mod params;
pub mod stream;

pub use frame::*;
pub use params::*;
pub use stream::*;
