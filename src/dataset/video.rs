use anyhow::bail;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, CAP_ANY};

use super::FrameSource;

/// Owns the capture handle; it is released when the source is dropped.
pub struct VideoSource {
    capture: VideoCapture,
    name: String,
}

impl VideoSource {
    pub fn open_file(path: &str) -> anyhow::Result<Self> {
        let capture = VideoCapture::from_file(path, CAP_ANY)?;
        Self::checked(capture, path.to_string())
    }

    pub fn open_device(index: i32) -> anyhow::Result<Self> {
        let capture = VideoCapture::new(index, CAP_ANY)?;
        Self::checked(capture, format!("camera {index}"))
    }

    fn checked(capture: VideoCapture, name: String) -> anyhow::Result<Self> {
        if !capture.is_opened()? {
            bail!("cannot read the given input, {}", name);
        }
        Ok(Self { capture, name })
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            log::warn!("failed to release {}: {}", self.name, e);
        } else {
            log::debug!("released {}", self.name);
        }
    }
}
