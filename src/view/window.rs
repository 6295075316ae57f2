//! Desktop window backed by OpenCV highgui.

use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat, Scalar},
    highgui,
    prelude::*,
};

use super::Viewer;
use crate::frame::Frame;

pub struct WindowViewer {
    title: String,
    open: bool,
}

impl WindowViewer {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("create window {:?}", title))?;
        Ok(Self {
            title: title.to_string(),
            open: true,
        })
    }
}

impl Viewer for WindowViewer {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let mut mat = Mat::new_rows_cols_with_default(
            frame.height() as i32,
            frame.width() as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )
        .context("allocate display buffer")?;
        let bgr = mat.data_bytes_mut().context("access display buffer")?;
        for (dst, src) in bgr.chunks_exact_mut(3).zip(frame.pixels().chunks_exact(3)) {
            dst.copy_from_slice(&[src[2], src[1], src[0]]);
        }
        highgui::imshow(&self.title, &mat).context("show frame")?;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        let key = highgui::wait_key(1).context("poll keyboard")?;
        if key < 0 {
            return Ok(None);
        }
        Ok(Some(char::from((key & 0xFF) as u8)))
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(err) = highgui::destroy_all_windows() {
            log::warn!("failed to close window {:?}: {}", self.title, err);
        }
    }
}
