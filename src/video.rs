//! Frame sources.

pub mod sequence;
pub mod webcam;
