//! Vision backend: window capture and template matching.

pub mod capture;
pub mod matcher;

pub use capture::XcapWindow;
pub use matcher::match_template;
