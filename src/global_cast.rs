//! 全局类型转换
//!
//! nalgebra 与 opencv 类型之间的转换

use nalgebra::{Matrix3, Point2, Vector3};
use opencv::core::{Point, Point2f, Vector};
use std::fmt::Display;

/// Pixel position for drawing, rounded to the nearest integer.
#[inline]
pub fn to_cv_point(p: &Point2<f64>) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// 检测器输出 -> nalgebra 点
pub fn from_cv_points(pts: &Vector<Point2f>) -> Vec<Point2<f64>> {
    pts.iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Matrix3d(pub Matrix3<f64>);

/// 实现 Display trait 用于打印
impl Display for Matrix3d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Vector3d(pub Vector3<f64>);

impl Display for Vector3d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.3} {:.3} {:.3}]", self.0.x, self.0.y, self.0.z)
    }
}
