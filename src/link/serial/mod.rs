//! Serial medium driver: preamble-framed binary protocol (spec §4.6).

pub mod driver;

pub use driver::SerialDriver;
