//! evmag Processing Core
//!
//! The numerical heart of Eulerian video magnification:
//! - **Butterworth design:** Digital bandpass, as second-order sections, from a band in Hz
//! - **Temporal filter:** Zero-phase (forward-backward) filtering of every pixel trace
//! - **Amplifier:** `original + factor * filtered`, saturated to the 8-bit range
//! - **Colorspace:** RGB and grayscale conversion between 8-bit frames and tensors
//!
//! This crate is pure computation. It never touches files or subprocesses.
//! All inputs are data; all outputs are data.

pub mod amplify;
pub mod butterworth;
pub mod colorspace;
pub mod magnifier;
pub mod temporal;

pub use amplify::{Amplifier, SaturationStats};
pub use butterworth::{Biquad, ButterworthBandpass, SecondOrderSections};
pub use colorspace::{colorspace_for, Colorspace};
pub use magnifier::{MagnifiedSequence, Magnifier};
pub use temporal::TemporalFilter;
