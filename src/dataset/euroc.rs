use std::path::{Path, PathBuf};

use anyhow::Context;
use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;

use super::FrameSource;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// 图像序列：`data.csv`（时间戳, 文件名）加 `data/` 目录，
/// 或者只有图片的目录（按文件名排序）
#[derive(Debug, Default)]
pub struct EuRoCSequence {
    pub cam0s: Vec<(i64, PathBuf)>,
    cursor: usize,
}

impl EuRoCSequence {
    const EUROC_CAM0_PATH: &'static str = "mav0/cam0/";

    pub fn read_cam(path: &Path) -> anyhow::Result<Vec<(i64, PathBuf)>> {
        let csv_path = path.join("data.csv");
        let data_path = path.join("data");
        let mut reader = csv::Reader::from_path(&csv_path)
            .with_context(|| format!("reading {}", csv_path.display()))?;
        reader
            .records()
            .map(|record| {
                let record = record?;
                let timestamp = record[0].trim().parse::<i64>()?;
                let name = record[1].trim();
                Ok((timestamp, data_path.join(name)))
            })
            .collect()
    }

    pub fn read_dir(path: &Path) -> anyhow::Result<Vec<(i64, PathBuf)>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i as i64, p))
            .collect())
    }

    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let euroc = path.join(Self::EUROC_CAM0_PATH);
        let cam0s = if euroc.join("data.csv").is_file() {
            Self::read_cam(&euroc)?
        } else if path.join("data.csv").is_file() {
            Self::read_cam(path)?
        } else {
            Self::read_dir(path)?
        };
        if cam0s.is_empty() {
            anyhow::bail!("no images in {}", path.display());
        }
        log::info!("{} images", cam0s.len());
        Ok(Self { cam0s, cursor: 0 })
    }
}

impl FrameSource for EuRoCSequence {
    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>> {
        while let Some((timestamp, path)) = self.cam0s.get(self.cursor) {
            self.cursor += 1;
            let img = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
            if img.empty() {
                log::warn!("skip unreadable image {} (t={})", path.display(), timestamp);
                continue;
            }
            return Ok(Some(img));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vector, CV_8UC3};

    fn write_image(path: &Path) {
        let img = Mat::new_rows_cols_with_default(8, 8, CV_8UC3, Scalar::all(90.0)).unwrap();
        imgcodecs::imwrite(&path.to_string_lossy(), &img, &Vector::<i32>::new()).unwrap();
    }

    #[test]
    fn test_read_cam() {
        let root = std::env::temp_dir().join("chessboard_ar_euroc_test");
        let data = root.join("data");
        std::fs::create_dir_all(&data).unwrap();
        write_image(&data.join("100.png"));
        write_image(&data.join("200.png"));
        std::fs::write(
            root.join("data.csv"),
            "#timestamp [ns],filename\n100,100.png\n150,missing.png\n200,200.png\n",
        )
        .unwrap();

        let mut sequence = EuRoCSequence::new(&root).unwrap();
        assert_eq!(sequence.cam0s.len(), 3);
        assert_eq!(sequence.cam0s[2].0, 200);

        let mut frames = 0;
        while let Some(frame) = sequence.next_frame().unwrap() {
            assert_eq!(frame.rows(), 8);
            frames += 1;
        }
        assert_eq!(frames, 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_read_dir() {
        let root = std::env::temp_dir().join("chessboard_ar_image_dir_test");
        std::fs::create_dir_all(&root).unwrap();
        write_image(&root.join("b.png"));
        write_image(&root.join("a.png"));
        std::fs::write(root.join("notes.txt"), "not an image").unwrap();

        let sequence = EuRoCSequence::new(&root).unwrap();
        assert_eq!(sequence.cam0s.len(), 2);
        assert!(sequence.cam0s[0].1.ends_with("a.png"));
        let _ = std::fs::remove_dir_all(&root);
    }
}
