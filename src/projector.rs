//! 三维点投影到图像
//!
//! Board coordinates go through the pose, the pinhole divide, the five
//! coefficient distortion polynomial and the intrinsics, in that order. This
//! is the same model `cv::projectPoints` uses, so the overlay lines up with
//! the calibration that produced the coefficients.

use nalgebra::{Point2, Point3};

use crate::camera::CameraTrait;
use crate::pose_estimator::Pose;

pub fn project_points(
    points: &[Point3<f64>],
    pose: &Pose,
    camera: &impl CameraTrait,
) -> Vec<Point2<f64>> {
    let r = pose.rotation_matrix();
    points
        .iter()
        .map(|p| camera.space_to_plane(&(r * p.coords + pose.tvec)))
        .collect()
}

/// Root mean square pixel distance between `image` and the projection of `object`.
pub fn reprojection_rmse(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    pose: &Pose,
    camera: &impl CameraTrait,
) -> f64 {
    if object.is_empty() {
        return 0.0;
    }
    let sum: f64 = project_points(object, pose, camera)
        .iter()
        .zip(image.iter())
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    (sum / object.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::config::{DEFAULT_DIST_COEFFS, DEFAULT_K};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use opencv::core::{Mat, Point2d, Point3d, Vector};

    #[test]
    fn test_principal_point() {
        let camera = PinholeCamera::from_matrix(&DEFAULT_K, &[0.0; 5]).unwrap();
        let pose = Pose::new(Vector3::zeros(), Vector3::zeros());
        let uv = project_points(&[Point3::new(0.0, 0.0, 1.0)], &pose, &camera);
        assert_relative_eq!(uv[0].x, 680.331146, epsilon = 1e-9);
        assert_relative_eq!(uv[0].y, 359.772924, epsilon = 1e-9);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let camera = PinholeCamera::from_matrix(&DEFAULT_K, &DEFAULT_DIST_COEFFS).unwrap();
        let pose = Pose::new(Vector3::new(0.1, 0.2, -0.1), Vector3::new(0.0, 0.0, 0.5));
        let pts = [Point3::new(0.05, 0.025, 0.0), Point3::new(0.1, 0.0, -0.025)];
        assert_eq!(
            project_points(&pts, &pose, &camera),
            project_points(&pts, &pose, &camera)
        );
    }

    /// 与 cv::projectPoints 结果一致
    #[test]
    fn test_matches_opencv_project_points() {
        let camera = PinholeCamera::from_matrix(&DEFAULT_K, &DEFAULT_DIST_COEFFS).unwrap();
        let pose = Pose::new(Vector3::new(0.25, -0.35, 0.1), Vector3::new(-0.12, -0.04, 0.6));
        let points: Vec<Point3<f64>> = (0..7)
            .flat_map(|r| (0..10).map(move |c| Point3::new(c as f64 * 0.025, r as f64 * 0.025, -0.01 * (c % 2) as f64)))
            .collect();
        let ours = project_points(&points, &pose, &camera);

        let object: Vector<Point3d> = points.iter().map(|p| Point3d::new(p.x, p.y, p.z)).collect();
        let column = |v: &Vector3<f64>| Mat::from_slice_2d(&[[v.x], [v.y], [v.z]]).unwrap();
        let rvec = column(&pose.rvec);
        let tvec = column(&pose.tvec);
        let k = camera.intrinsic_matrix();
        let k = Mat::from_slice_2d(&[
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ])
        .unwrap();
        let d = Mat::from_slice_2d(&[DEFAULT_DIST_COEFFS]).unwrap();
        let mut theirs = Vector::<Point2d>::new();
        let mut jacobian = Mat::default();
        opencv::calib3d::project_points(&object, &rvec, &tvec, &k, &d, &mut theirs, &mut jacobian, 0.0)
            .unwrap();

        assert_eq!(theirs.len(), ours.len());
        for (a, b) in ours.iter().zip(theirs.iter()) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rmse_zero_for_exact_points() {
        let camera = PinholeCamera::from_matrix(&DEFAULT_K, &DEFAULT_DIST_COEFFS).unwrap();
        let pose = Pose::new(Vector3::new(0.0, 0.1, 0.0), Vector3::new(0.0, 0.0, 0.4));
        let object = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.05, 0.05, 0.0)];
        let mut image = project_points(&object, &pose, &camera);
        assert_relative_eq!(reprojection_rmse(&object, &image, &pose, &camera), 0.0);

        image[0].x += 3.0;
        image[1].y -= 4.0;
        let expected = ((9.0 + 16.0) / 2.0_f64).sqrt();
        assert_relative_eq!(reprojection_rmse(&object, &image, &pose, &camera), expected, epsilon = 1e-9);
    }
}
