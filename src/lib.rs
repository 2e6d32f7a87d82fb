//! Remote photoplethysmography (rPPG).
//!
//! rPPG estimates the blood volume pulse from the tiny color changes it causes in facial skin, as
//! seen by an ordinary camera. Each video frame passes through three stages:
//!
//! 1. An [`RoiDetector`] finds the facial skin pixels ([`roi`]).
//! 2. A [`Processor`] turns them into a single signal value ([`processor`]).
//! 3. An [`HrCalculator`] estimates the heart rate from the signal history ([`hr`]).
//!
//! [`Rppg`] ties the stages together.
//!
//! # Environment Variables
//!
//! * `RPPG_WEBCAM_NAME`: Selects the device used by [`Webcam`]s opened without an explicit device
//!   name. If unset, the first device that supports JPEG capture is used.
//! * `RPPG_SELFIE_MODEL`: Path of the ONNX selfie segmentation model the `rppg` binary uses for
//!   ROI detection. If unset, it uses a fixed rectangle in the center of the frame.
//! * `RPPG_PROCESSOR`: Processor used by the `rppg` binary, in [`ProcessorConfig`] syntax.
//! * `RUST_LOG`: Overrides the log filter set by [`init_logger!`].
//!
//! [`RoiDetector`]: roi::RoiDetector
//! [`Processor`]: processor::Processor
//! [`HrCalculator`]: hr::HrCalculator
//! [`Rppg`]: rppg::Rppg
//! [`Webcam`]: video::webcam::Webcam
//! [`ProcessorConfig`]: processor::ProcessorConfig

use log::LevelFilter;

pub mod containers;
pub mod filter;
pub mod hr;
pub mod image;
pub mod live;
pub mod mask;
pub mod nn;
pub mod num;
pub mod processor;
pub mod resolution;
pub mod roi;
pub mod rppg;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this library log at *debug* level, tract at *warn* level. `RUST_LOG`
/// takes precedence.
///
/// If a global logger is already registered, this macro does nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
