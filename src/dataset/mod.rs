//! 帧来源
//!
//! 视频文件、摄像头编号，或 EuRoC 格式的图像序列目录
//! EuRoC Dataset  https://paperswithcode.com/dataset/euroc-mav
mod euroc;
mod video;

pub use euroc::EuRoCSequence;
pub use video::VideoSource;

use std::path::Path;

use opencv::core::Mat;

pub trait FrameSource {
    /// 按解码顺序读取下一帧，流结束返回 `None`
    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>>;
}

/// Opens `input` as an image sequence directory, a camera index or a video
/// file, in that order. Fails if the source cannot be read at all.
pub fn open(input: &str) -> anyhow::Result<Box<dyn FrameSource>> {
    let path = Path::new(input);
    if path.is_dir() {
        log::info!("image sequence: {}", path.display());
        return Ok(Box::new(EuRoCSequence::new(path)?));
    }
    if let Ok(index) = input.parse::<i32>() {
        log::info!("camera device: {}", index);
        return Ok(Box::new(VideoSource::open_device(index)?));
    }
    log::info!("video file: {}", input);
    Ok(Box::new(VideoSource::open_file(input)?))
}
