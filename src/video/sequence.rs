//! Offline frame sequences stored as image files.

use std::{
    fs,
    path::{Path, PathBuf},
    vec,
};

use anyhow::{ensure, Context};

use crate::image::{self, Image};

/// Frame rate assumed for sequences that don't specify one.
pub const DEFAULT_FPS: f32 = 30.0;

/// A video stored as a directory of JPEG or PNG files, one per frame.
///
/// Frames are ordered by file name, so names should be zero-padded (`frame_0001.png`, ...). Files
/// with other extensions are ignored.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    fps: f32,
}

impl ImageSequence {
    /// Lists the frames in `dir`.
    ///
    /// Returns an error if the directory cannot be read or contains no frames.
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("failed to read '{}'", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && image::is_supported_path(&path) {
                paths.push(path);
            }
        }
        ensure!(!paths.is_empty(), "no frames found in '{}'", dir.display());
        paths.sort();

        log::debug!("found {} frames in '{}'", paths.len(), dir.display());
        Ok(Self {
            paths,
            fps: DEFAULT_FPS,
        })
    }

    /// Sets the frame rate the sequence was recorded at.
    ///
    /// # Panics
    ///
    /// Panics if `fps` is not a positive number.
    pub fn with_fps(mut self, fps: f32) -> Self {
        assert!(fps > 0.0, "invalid frame rate {fps}");
        self.fps = fps;
        self
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Returns the frame file paths in playback order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl IntoIterator for ImageSequence {
    type Item = anyhow::Result<Image>;
    type IntoIter = Frames;

    fn into_iter(self) -> Self::IntoIter {
        Frames {
            paths: self.paths.into_iter(),
        }
    }
}

/// Iterator loading the frames of an [`ImageSequence`] one at a time.
pub struct Frames {
    paths: vec::IntoIter<PathBuf>,
}

impl Iterator for Frames {
    type Item = anyhow::Result<Image>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(Image::load(&path).with_context(|| format!("failed to load '{}'", path.display())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for Frames {}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;
    use crate::{image::Pixel, resolution::Resolution};

    fn temp_dir() -> PathBuf {
        let dir = env::temp_dir().join(format!("rppg-sequence-{}", fastrand::u64(..)));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_in_name_order() {
        let dir = temp_dir();
        let res = Resolution::new(3, 2);
        for (name, value) in [("f02.png", 20), ("f10.png", 100), ("f01.png", 10)] {
            Image::from_fn(res, |_, _| Pixel::from_rgb8(value, value, value))
                .save(dir.join(name))
                .unwrap();
        }
        fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let seq = ImageSequence::open(&dir).unwrap().with_fps(25.0);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.fps(), 25.0);
        let greens = seq
            .into_iter()
            .map(|frame| frame.unwrap().get(0, 0).g())
            .collect::<Vec<_>>();
        assert_eq!(greens, [10, 20, 100]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_dir() {
        let dir = temp_dir();
        let err = ImageSequence::open(&dir).unwrap_err();
        assert!(err.to_string().contains("no frames"), "{err}");
        fs::remove_dir_all(&dir).ok();

        assert!(ImageSequence::open(dir.join("missing")).is_err());
    }
}
