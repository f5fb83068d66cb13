use nalgebra::{Matrix3, Point3, Vector3};

use crate::utility::Utility;

/// 棋盘相对于相机的位姿，只对一帧有效
///
/// `rvec` 是 Rodrigues 旋转向量，`tvec` 是平移。X_cam = R · X_board + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
    /// RMS reprojection error in pixels, zero for hand-built poses.
    pub reprojection_rmse: f64,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self {
            rvec,
            tvec,
            reprojection_rmse: 0.0,
        }
    }

    pub fn from_rotation(r: &Matrix3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(Utility::rotation_vector(r), tvec)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        Utility::rodrigues(&self.rvec)
    }

    /// Camera center in board coordinates: p = -Rᵗ · t
    pub fn camera_position(&self) -> Vector3<f64> {
        -(self.rotation_matrix().transpose() * self.tvec)
    }

    /// 棋盘坐标 -> 相机坐标
    pub fn transform(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation_matrix() * p.coords + self.tvec
    }

    /// Number of points with non-positive depth.
    pub fn points_behind(&self, points: &[Point3<f64>]) -> usize {
        points.iter().filter(|p| self.transform(p).z <= 0.0).count()
    }

    pub fn is_orthonormal(&self, tol: f64) -> bool {
        Utility::is_rotation(&self.rotation_matrix(), tol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn camera_position_identity_rotation() {
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 5.0));
        assert_relative_eq!(pose.camera_position(), Vector3::new(0.0, 0.0, -5.0));
    }

    #[test]
    fn camera_position_maps_to_camera_origin() {
        let pose = Pose::new(Vector3::new(0.4, -0.1, 0.2), Vector3::new(-0.1, 0.05, 0.8));
        let p = pose.camera_position();
        // 相机中心变换到相机坐标系应为原点
        let origin = pose.transform(&Point3::from(p));
        assert_relative_eq!(origin, Vector3::zeros(), epsilon = 1e-12);
        assert!(pose.is_orthonormal(1e-9));
    }

    #[test]
    fn points_behind_camera() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.5),
            Point3::new(0.0, 0.0, 1.5),
        ];
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(pose.points_behind(&points), 0);

        // 绕 y 轴转 180 度，z 取反
        let turned = Pose::new(Vector3::new(0.0, std::f64::consts::PI, 0.0), pose.tvec);
        assert_eq!(turned.points_behind(&points), 1);
        assert!(turned.transform(&points[2]).z < 0.0);
    }
}
