//! 棋盘角点检测
//!
//! Thin wrapper over `cv::findChessboardCorners`. The returned corners are
//! put in the row-major order of [`BoardGeometry::object_points`]: rows run
//! left to right as seen from the front of the board, and the first corner
//! is the one next to the dark outer square.

use nalgebra::Point2;
use opencv::core::{Mat, Point2f, Size, TermCriteria, Vector};
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::prelude::*;
use thiserror::Error;

use crate::config::DetectionConfig;
use crate::geometry::BoardGeometry;
use crate::global_cast;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("chessboard not found")]
    NotFound,
    #[error("expected {expected} corners, detector returned {actual}")]
    Incomplete { expected: usize, actual: usize },
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

pub trait CornerDetector {
    fn detect(
        &mut self,
        image: &Mat,
        board: &BoardGeometry,
    ) -> Result<Vec<Point2<f64>>, DetectionError>;
}

#[derive(Debug, Default)]
pub struct ChessboardDetector {
    config: DetectionConfig,
    gray: Mat,
}

impl ChessboardDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn flags(&self) -> i32 {
        let mut flags = 0;
        if self.config.adaptive_threshold {
            flags |= opencv::calib3d::CALIB_CB_ADAPTIVE_THRESH;
        }
        if self.config.normalize_image {
            flags |= opencv::calib3d::CALIB_CB_NORMALIZE_IMAGE;
        }
        if self.config.fast_check {
            flags |= opencv::calib3d::CALIB_CB_FAST_CHECK;
        }
        flags
    }

    fn to_gray(&mut self, image: &Mat) -> opencv::Result<()> {
        if image.channels() == 1 {
            image.copy_to(&mut self.gray)
        } else {
            opencv::imgproc::cvt_color(image, &mut self.gray, COLOR_BGR2GRAY, 0)
        }
    }

    fn refine(&self, corners: &mut Vector<Point2f>) -> opencv::Result<()> {
        let criteria = TermCriteria::new(
            opencv::core::TermCriteria_EPS + opencv::core::TermCriteria_COUNT,
            30,
            0.01,
        )?;
        opencv::imgproc::corner_sub_pix(
            &self.gray,
            corners,
            Size::new(11, 11),
            Size::new(-1, -1),
            criteria,
        )
    }

    /// 灰度值，越界返回 None
    fn intensity(&self, p: &Point2<f64>) -> Option<f64> {
        let (x, y) = (p.x.round() as i32, p.y.round() as i32);
        if x < 0 || y < 0 || x >= self.gray.cols() || y >= self.gray.rows() {
            return None;
        }
        self.gray.at_2d::<u8>(y, x).ok().map(|v| *v as f64)
    }
}

/// Reorders a detected `columns x rows` grid in place.
///
/// Mirrored grids (rows running right to left on screen) get each row
/// reversed. The grid is then turned by 180 degrees when the square beyond
/// the last corner is darker than the one beyond the first.
pub fn canonical_order(
    corners: &mut [Point2<f64>],
    columns: usize,
    rows: usize,
    intensity: impl Fn(&Point2<f64>) -> Option<f64>,
) {
    if columns < 2 || rows < 2 || corners.len() != columns * rows {
        return;
    }
    let u = corners[1] - corners[0];
    let v = corners[columns] - corners[0];
    if u.x * v.y - u.y * v.x < 0.0 {
        corners.chunks_mut(columns).for_each(|row| row.reverse());
    }

    let n = corners.len();
    let first = corners[0] - (corners[1] - corners[0]) * 0.5 - (corners[columns] - corners[0]) * 0.5;
    let last = corners[n - 1]
        + (corners[n - 1] - corners[n - 2]) * 0.5
        + (corners[n - 1] - corners[n - 1 - columns]) * 0.5;
    if let (Some(a), Some(b)) = (intensity(&first), intensity(&last)) {
        if a > b {
            corners.reverse();
        }
    }
}

impl CornerDetector for ChessboardDetector {
    fn detect(
        &mut self,
        image: &Mat,
        board: &BoardGeometry,
    ) -> Result<Vec<Point2<f64>>, DetectionError> {
        let pattern = Size::new(board.columns() as i32, board.rows() as i32);
        let mut corners = Vector::<Point2f>::new();
        let found =
            opencv::calib3d::find_chessboard_corners(image, pattern, &mut corners, self.flags())?;
        if !found {
            return Err(DetectionError::NotFound);
        }
        if corners.len() != board.corner_count() {
            return Err(DetectionError::Incomplete {
                expected: board.corner_count(),
                actual: corners.len(),
            });
        }
        self.to_gray(image)?;
        if self.config.subpixel {
            self.refine(&mut corners)?;
        }
        let mut points = global_cast::from_cv_points(&corners);
        canonical_order(&mut points, board.columns(), board.rows(), |p| {
            self.intensity(p)
        });
        Ok(points)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use opencv::core::{Rect, Scalar, CV_8UC3};

    pub(crate) const SQUARE: i32 = 40;
    pub(crate) const MARGIN: i32 = 60;

    /// 正对相机的合成棋盘，外圈留白，左上角是黑格
    pub(crate) fn synthetic_board(columns: i32, rows: i32) -> Mat {
        let width = 2 * MARGIN + (columns + 1) * SQUARE;
        let height = 2 * MARGIN + (rows + 1) * SQUARE;
        let mut img =
            Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(255.0)).unwrap();
        for j in 0..=rows {
            for i in 0..=columns {
                if (i + j) % 2 == 0 {
                    let rect = Rect::new(MARGIN + i * SQUARE, MARGIN + j * SQUARE, SQUARE, SQUARE);
                    opencv::imgproc::rectangle(
                        &mut img,
                        rect,
                        Scalar::all(0.0),
                        opencv::imgproc::FILLED,
                        opencv::imgproc::LINE_8,
                        0,
                    )
                    .unwrap();
                }
            }
        }
        img
    }

    #[test]
    fn test_flags() {
        let all = ChessboardDetector::new(DetectionConfig::default());
        assert_eq!(
            all.flags(),
            opencv::calib3d::CALIB_CB_ADAPTIVE_THRESH
                | opencv::calib3d::CALIB_CB_NORMALIZE_IMAGE
                | opencv::calib3d::CALIB_CB_FAST_CHECK
        );
        let none = ChessboardDetector::new(DetectionConfig {
            adaptive_threshold: false,
            normalize_image: false,
            fast_check: false,
            subpixel: false,
        });
        assert_eq!(none.flags(), 0);
    }

    #[test]
    fn test_detect_synthetic_board() {
        let board = BoardGeometry::new(10, 7, 0.025).unwrap();
        let img = synthetic_board(10, 7);
        let mut detector = ChessboardDetector::new(DetectionConfig {
            subpixel: true,
            ..Default::default()
        });
        let corners = detector.detect(&img, &board).unwrap();
        assert_eq!(corners.len(), 70);

        // 与 object_points 逐个对应
        for (k, c) in corners.iter().enumerate() {
            let expected = grid_corner(k);
            assert!((c - expected).norm() < 1.5, "corner {k}: {c:?} != {expected:?}");
        }
    }

    #[test]
    fn test_detect_upside_down_board() {
        let board = BoardGeometry::new(10, 7, 0.025).unwrap();
        let img = synthetic_board(10, 7);
        let mut rotated = Mat::default();
        opencv::core::rotate(&img, &mut rotated, opencv::core::ROTATE_180).unwrap();
        let (w, h) = (rotated.cols() as f64, rotated.rows() as f64);

        let mut detector = ChessboardDetector::new(DetectionConfig {
            subpixel: true,
            ..Default::default()
        });
        let corners = detector.detect(&rotated, &board).unwrap();
        assert_eq!(corners.len(), 70);

        // 原点跟着黑格走到右下角
        for (k, c) in corners.iter().enumerate() {
            let p = grid_corner(k);
            let expected = Point2::new(w - 1.0 - p.x, h - 1.0 - p.y);
            assert!((c - expected).norm() < 1.5, "corner {k}: {c:?} != {expected:?}");
        }
    }

    #[test]
    fn test_canonical_order() {
        let ideal: Vec<_> = (0..6).map(grid_corner_3x2).collect();
        // 左上外侧是暗的
        let intensity = |p: &Point2<f64>| -> Option<f64> {
            Some(if p.x < 100.0 && p.y < 100.0 { 0.0 } else { 255.0 })
        };

        let mut turned: Vec<_> = ideal.iter().rev().copied().collect();
        canonical_order(&mut turned, 3, 2, intensity);
        assert_eq!(turned, ideal);

        let mut mirrored: Vec<_> = ideal.chunks(3).flat_map(|r| r.iter().rev().copied()).collect();
        canonical_order(&mut mirrored, 3, 2, intensity);
        assert_eq!(mirrored, ideal);

        let mut flipped: Vec<_> = ideal.chunks(3).rev().flatten().copied().collect();
        canonical_order(&mut flipped, 3, 2, intensity);
        assert_eq!(flipped, ideal);

        // 采样不到灰度时只修正镜像
        let mut unknown = ideal.clone();
        canonical_order(&mut unknown, 3, 2, |_| None);
        assert_eq!(unknown, ideal);
    }

    fn grid_corner_3x2(k: usize) -> Point2<f64> {
        let (c, r) = ((k % 3) as f64, (k / 3) as f64);
        Point2::new(99.5 + 40.0 * c, 99.5 + 40.0 * r)
    }

    /// 第 k 个角点在 synthetic_board(10, 7) 中的位置
    fn grid_corner(k: usize) -> Point2<f64> {
        let (c, r) = ((k % 10) as i32, (k / 10) as i32);
        Point2::new(
            (MARGIN + (c + 1) * SQUARE) as f64 - 0.5,
            (MARGIN + (r + 1) * SQUARE) as f64 - 0.5,
        )
    }

    #[test]
    fn test_blank_image() {
        let board = BoardGeometry::new(10, 7, 0.025).unwrap();
        let img = Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(128.0)).unwrap();
        let mut detector = ChessboardDetector::new(DetectionConfig::default());
        assert!(matches!(
            detector.detect(&img, &board),
            Err(DetectionError::NotFound)
        ));
    }
}
