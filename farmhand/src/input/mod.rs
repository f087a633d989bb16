//! Input channel: serial protocol framing and keyboard layout mapping.

pub mod layout;
pub mod serial;

pub use serial::SerialInput;
