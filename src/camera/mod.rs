mod pinhole_camera;
pub use pinhole_camera::{PinholeCamera, PinholeParameters};

use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("intrinsic matrix has a non-finite entry")]
    NonFinite,
    #[error("focal lengths must be positive, got fx={fx} fy={fy}")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("intrinsic matrix must have zero skew, got {0}")]
    NonZeroSkew(f64),
    #[error("intrinsic matrix entry (1, 0) must be zero, got {0}")]
    NotUpperTriangular(f64),
    #[error("intrinsic matrix last row must be [0, 0, 1], got {0:?}")]
    InvalidLastRow([f64; 3]),
    #[error("camera file {path}: {reason}")]
    File { path: String, reason: String },
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// 相机的trait
///
/// 投影与反投影必须使用标定时相同的畸变模型（OpenCV 五参数模型）。
pub trait CameraTrait {
    /// 像素坐标 -> 归一化平面（z = 1），去畸变
    fn lift_projective(&self, p: &Point2<f64>) -> Vector3<f64>;
    /// 相机坐标系下的点 -> 像素坐标，加畸变
    fn space_to_plane(&self, p: &Vector3<f64>) -> Point2<f64>;
    /// 归一化坐标的畸变偏移量
    fn distortion(&self, p_u: &Vector2<f64>) -> Vector2<f64>;
    fn intrinsic_matrix(&self) -> Matrix3<f64>;
    /// `[k1, k2, p1, p2, k3]`
    fn distortion_coefficients(&self) -> [f64; 5];
}

/// 相机参数的trait
pub trait CameraParametersTrait: Sized {
    const CAMERA_TYPE: &'static str;
    fn read_from_yaml(path: &str) -> Result<Self, CameraError>;
    fn write_to_yaml(&self, path: &str) -> Result<(), CameraError>;
}
