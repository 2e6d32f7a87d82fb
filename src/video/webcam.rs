//! V4L2 webcam capture.
//!
//! Only `VIDEO_CAPTURE` devices that deliver JPEG or Motion JPEG frames are supported. Most USB
//! webcams do.

use std::env;

use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{image::Image, num::TotalF32, resolution::Resolution, timer::Timer};

/// Environment variable that selects the webcam by its device name.
pub const ENV_WEBCAM_NAME: &str = "RPPG_WEBCAM_NAME";

/// Which parameter to keep when the webcam cannot satisfy both the requested resolution and
/// frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPreference {
    /// Keep the resolution and lower the frame rate.
    #[default]
    Resolution,
    /// Keep the frame rate and lower the resolution.
    ///
    /// This is usually what rPPG wants, since the pulse signal is sampled once per frame.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Options for opening a [`Webcam`].
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Only opens the webcam with the given device name.
    ///
    /// Takes precedence over the `RPPG_WEBCAM_NAME` environment variable.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the minimum desired resolution.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the minimum desired frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects which parameter is kept if the camera cannot deliver both.
    ///
    /// If the camera can deliver both, the other parameter is maximized.
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        1.0 / self.frame_interval.as_f32()
    }
}

/// A V4L2 webcam delivering decoded [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    resolution: Resolution,
    fps: f32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first webcam matching `options`.
    ///
    /// This blocks while the device initializes, which can take several hundred milliseconds.
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let name = options
            .name
            .clone()
            .or_else(|| env::var(ENV_WEBCAM_NAME).ok());
        if let Some(name) = &name {
            log::debug!("looking for webcam '{name}'");
        }

        for dev in linuxvideo::list()? {
            let dev = match dev {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            match Self::open_device(dev, name.as_deref(), options.frame) {
                Ok(Some(webcam)) => return Ok(webcam),
                Ok(None) => {}
                Err(e) => log::debug!("skipping device: {e:#}"),
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_device(
        dev: Device,
        name: Option<&str>,
        prefs: FramePrefs,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if name.map_or(false, |name| caps.card() != name) {
            return Ok(None);
        }

        let flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            flags,
        );
        if !flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixel_format, formats) = list_formats(&dev)?;
        let format = negotiate_format(&formats, prefs)
            .with_context(|| format!("no suitable format on {}", caps.card()))?;

        let capture = dev.video_capture(PixFormat::new(
            format.resolution.width(),
            format.resolution.height(),
            pixel_format,
        ))?;
        let actual = capture.format();
        let resolution = Resolution::new(actual.width(), actual.height());
        let interval = capture.set_frame_interval(format.frame_interval)?;
        let fps = 1.0 / interval.as_f32();

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            fps,
        );

        Ok(Some(Self {
            stream: capture.into_stream(2)?,
            resolution,
            fps,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Returns the frame rate the device was configured with.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Blocks until the next frame is available and returns it.
    ///
    /// Frames that fail to decode are logged and replaced by a blank image, so that the frame
    /// timing the heart rate estimation relies on is preserved.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let (width, height) = (self.resolution.width(), self.resolution.height());
        let t_decode = &self.t_decode;
        let image = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = t_decode
                .time(|| Image::decode_jpeg(&buf))
                .unwrap_or_else(|e| {
                    // USB transfers occasionally corrupt MJPEG frames.
                    log::error!("webcam decode error: {e}");
                    Image::new(width, height)
                });
            Ok(image)
        })?;
        Ok(image)
    }

    /// Returns profiling timers for frame capture and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

impl Iterator for Webcam {
    type Item = anyhow::Result<Image>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.read())
    }
}

fn list_formats(dev: &Device) -> anyhow::Result<(Pixelformat, Vec<FrameFormat>)> {
    let mut pixel_format = None;
    for format in dev.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if matches!(format.pixelformat(), Pixelformat::JPEG | Pixelformat::MJPG) {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("device does not support JPEG capture");
    };

    let sizes = match dev.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => sizes,
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported")
        }
    };

    let mut formats = Vec::new();
    for size in sizes {
        let intervals = match dev.frame_intervals(pixel_format, size.width(), size.height())? {
            FrameIntervals::Discrete(intervals) => intervals,
            FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                bail!("stepwise or continuous frame rates are not supported")
            }
        };
        for interval in intervals {
            formats.push(FrameFormat {
                resolution: Resolution::new(size.width(), size.height()),
                frame_interval: *interval.fract(),
            });
        }
    }
    Ok((pixel_format, formats))
}

/// Picks the best format, relaxing the preferences one at a time until one matches.
fn negotiate_format(formats: &[FrameFormat], mut prefs: FramePrefs) -> Option<FrameFormat> {
    loop {
        if let Some(format) = best_format(formats, prefs) {
            return Some(format);
        }
        log::debug!("no format matches {prefs:?}");

        let dropped = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !dropped {
            return None;
        }
    }
}

fn best_format(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs
                .fps
                .map_or(true, |fps| fmt.fps().round() >= fps as f32)
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            eligible.sort_by_key(|fmt| (fmt.resolution.num_pixels(), TotalF32(fmt.fps())))
        }
        ParamPreference::Framerate => {
            eligible.sort_by_key(|fmt| (TotalF32(fmt.fps()), fmt.resolution.num_pixels()))
        }
    }
    eligible.pop()
}
