//! Frame presentation and key polling.

#[cfg(feature = "opencv")]
mod window;

#[cfg(feature = "opencv")]
pub use window::WindowViewer;

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::frame::Frame;

/// Presents annotated frames and reports key presses.
pub trait Viewer {
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Non-blocking poll for at most one pending key press.
    fn poll_key(&mut self) -> Result<Option<char>>;

    /// Tears the viewer down. Called exactly once when the loop ends.
    fn close(&mut self) {}
}

impl<V: Viewer + ?Sized> Viewer for Box<V> {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        (**self).show(frame)
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        (**self).poll_key()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Viewer for machines without a display. Never reports a key, so the loop
/// ends on Ctrl-C, a frame limit or an error.
#[derive(Debug, Default)]
pub struct HeadlessViewer {
    snapshot: Option<PathBuf>,
    last: Option<RgbImage>,
    shown: u64,
}

impl HeadlessViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the last presented frame to `path` on close.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }

    fn write_snapshot(&self) -> Result<()> {
        match &self.snapshot {
            Some(path) => write_snapshot(path, self.last.as_ref()),
            None => Ok(()),
        }
    }
}

fn write_snapshot(path: &Path, last: Option<&RgbImage>) -> Result<()> {
    let Some(image) = last else {
        return Ok(());
    };
    image
        .save(path)
        .with_context(|| format!("write snapshot {}", path.display()))?;
    log::info!("snapshot written to {}", path.display());
    Ok(())
}

/// Wraps another viewer and writes the last frame it showed to a file on
/// close.
pub struct SnapshotViewer<V> {
    inner: V,
    path: PathBuf,
    last: Option<RgbImage>,
}

impl<V: Viewer> SnapshotViewer<V> {
    pub fn new(inner: V, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            last: None,
        }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }
}

impl<V: Viewer> Viewer for SnapshotViewer<V> {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.inner.show(frame)?;
        self.last = Some(frame.image().clone());
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        self.inner.poll_key()
    }

    fn close(&mut self) {
        self.inner.close();
        if let Err(err) = write_snapshot(&self.path, self.last.as_ref()) {
            log::error!("{:#}", err);
        }
    }
}

impl Viewer for HeadlessViewer {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.shown += 1;
        log::debug!(
            "frame {} presented ({}x{})",
            frame.sequence,
            frame.width(),
            frame.height()
        );
        if self.snapshot.is_some() {
            self.last = Some(frame.image().clone());
        }
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        Ok(None)
    }

    fn close(&mut self) {
        if let Err(err) = self.write_snapshot() {
            log::error!("{:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_viewer_counts_frames_and_reports_no_keys() -> Result<()> {
        let mut viewer = HeadlessViewer::new();
        let frame = Frame::from_image(RgbImage::new(4, 4), 1);
        viewer.show(&frame)?;
        viewer.show(&frame)?;
        assert_eq!(viewer.frames_shown(), 2);
        assert_eq!(viewer.poll_key()?, None);
        viewer.close();
        Ok(())
    }

    #[test]
    fn snapshot_holds_last_presented_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("last.png");
        let mut viewer = HeadlessViewer::with_snapshot(&path);

        viewer.show(&Frame::from_image(RgbImage::new(4, 4), 1))?;
        viewer.show(&Frame::from_image(
            RgbImage::from_pixel(6, 2, image::Rgb([9, 9, 9])),
            2,
        ))?;
        viewer.close();

        let saved = image::open(&path)?.into_rgb8();
        assert_eq!(saved.dimensions(), (6, 2));
        assert_eq!(saved.get_pixel(0, 0).0, [9, 9, 9]);
        Ok(())
    }

    #[test]
    fn snapshot_wrapper_saves_frames_from_any_viewer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("window.png");
        let mut viewer = SnapshotViewer::new(HeadlessViewer::new(), &path);

        viewer.show(&Frame::from_image(
            RgbImage::from_pixel(3, 5, image::Rgb([1, 2, 3])),
            1,
        ))?;
        assert_eq!(viewer.poll_key()?, None);
        viewer.close();

        assert_eq!(viewer.inner().frames_shown(), 1);
        let saved = image::open(&path)?.into_rgb8();
        assert_eq!(saved.dimensions(), (3, 5));
        assert_eq!(saved.get_pixel(2, 4).0, [1, 2, 3]);
        Ok(())
    }

    #[test]
    fn snapshot_is_skipped_when_nothing_was_shown() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("never.png");
        let mut viewer = HeadlessViewer::with_snapshot(&path);
        viewer.close();
        assert!(!path.exists());
        Ok(())
    }
}
