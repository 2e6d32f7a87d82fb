use std::env;

use anyhow::Context;
use rppg::{
    hr::PeakBasedHrCalculator,
    live,
    processor::{ChromProcessor, Processor, ProcessorConfig},
    roi::{RectDetector, RoiDetector, SelfieDetector},
    rppg::Rppg,
    timer::FpsCounter,
    video::webcam::{ParamPreference, Webcam, WebcamOptions},
};

const ENV_SELFIE_MODEL: &str = "RPPG_SELFIE_MODEL";
const ENV_PROCESSOR: &str = "RPPG_PROCESSOR";

const DESIRED_FPS: u32 = 30;

fn main() -> anyhow::Result<()> {
    rppg::init_logger!();

    let roi_detector: Box<dyn RoiDetector> = match env::var_os(ENV_SELFIE_MODEL) {
        Some(path) => Box::new(
            SelfieDetector::load(&path)
                .with_context(|| format!("failed to load {ENV_SELFIE_MODEL}"))?,
        ),
        None => {
            log::info!("`{ENV_SELFIE_MODEL}` not set, using a fixed face rectangle");
            Box::new(RectDetector::default())
        }
    };
    let processor: Box<dyn Processor> = match env::var(ENV_PROCESSOR) {
        Ok(config) => config
            .parse::<ProcessorConfig>()
            .and_then(|config| config.build())
            .with_context(|| format!("invalid `{ENV_PROCESSOR}`"))?,
        Err(_) => Box::new(ChromProcessor::default()),
    };
    log::info!("using processor {processor}");

    let mut webcam = Webcam::open(
        WebcamOptions::default()
            .fps(DESIRED_FPS)
            .prefer(ParamPreference::Framerate),
    )?;
    let fps = webcam.fps();

    let rppg = Rppg::new(
        roi_detector,
        processor,
        PeakBasedHrCalculator::for_fps(fps),
    );
    let mut last_bpm = f32::NAN;
    let mut worker = live::spawn_processor(rppg, move |result| {
        // the estimate only changes once per update interval
        let bpm = result.hr_bpm(fps);
        if !bpm.is_nan() && bpm != last_bpm {
            log::info!("heart rate: {bpm:.1} bpm");
        }
        last_bpm = bpm;
    })?;

    let mut fps_counter = FpsCounter::new("webcam");
    loop {
        worker.send(webcam.read()?);
        fps_counter.tick_with(webcam.timers());
    }
}
