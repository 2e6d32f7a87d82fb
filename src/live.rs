//! Live processing on a background thread.

use std::io;

use pawawwewism::Worker;

use crate::{containers::RppgResult, image::Image, rppg::Rppg, timer::FpsCounter};

/// Moves `rppg` onto a worker thread.
///
/// Frames sent to the returned [`Worker`] are processed in order and each result is passed to
/// `sink`. Frames that fail to process are logged and skipped.
pub fn spawn_processor<S>(mut rppg: Rppg, mut sink: S) -> io::Result<Worker<Image>>
where
    S: FnMut(RppgResult) + Send + 'static,
{
    let mut fps = FpsCounter::new("rppg");
    Worker::builder().name("rppg").spawn(move |frame: Image| {
        match rppg.process_frame(&frame) {
            Ok(result) => sink(result),
            Err(e) => log::warn!("skipping frame: {e:#}"),
        }
        fps.tick_with(rppg.timers());
    })
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;
    use crate::{
        hr::PeakBasedHrCalculator, image::Pixel, processor::GreenProcessor,
        resolution::Resolution, roi::RectDetector,
    };

    #[test]
    fn results_reach_sink() {
        let rppg = Rppg::new(
            RectDetector::default(),
            GreenProcessor::new(),
            PeakBasedHrCalculator::new(10, 1, 1),
        );
        let (tx, rx) = mpsc::channel();
        let mut worker = spawn_processor(rppg, move |result| {
            tx.send(result.value).ok();
        })
        .unwrap();

        for g in [10, 20, 30] {
            worker.send(Image::from_fn(Resolution::new(10, 10), |_, _| {
                Pixel::from_rgb8(0, g, 0)
            }));
        }

        let values = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(10)).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(values, [10.0, 20.0, 30.0]);
    }
}
