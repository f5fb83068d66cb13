//! 估计器
//! 通过棋盘角点估计相机位姿 (PnP)
//!
//! The target is planar, so the solver seeds from a plane homography in
//! normalized coordinates and then polishes (rvec, t) with
//! Levenberg-Marquardt on the pixel reprojection error. Every call is
//! independent; nothing is carried over between frames.

mod homography;
mod planar;
mod pose;
mod refine;

pub use pose::Pose;

use nalgebra::{Point2, Point3};
use thiserror::Error;

use crate::camera::CameraTrait;
use crate::config::{MAX_PNP_ITERATIONS, ROTATION_TOLERANCE};
use crate::projector;

const MIN_CORRESPONDENCES: usize = 4;
/// 最小/最大主方向方差之比低于此值视为共线
const COLLINEAR_RATIO: f64 = 1e-10;
const PLANAR_EPS: f64 = 1e-9;

/// Reasons a frame has no usable pose.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoseError {
    #[error("{object} object points but {image} image points")]
    MismatchedLengths { object: usize, image: usize },
    #[error("PnP needs at least {required} correspondences, got {actual}")]
    InsufficientPoints { required: usize, actual: usize },
    #[error("object points are not on the z = 0 plane")]
    NonPlanarTarget,
    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
    #[error("svd failed")]
    SvdFailed,
    #[error("pose is not finite")]
    NonFinite,
    #[error("rotation is not orthonormal")]
    InvalidRotation,
    #[error("{0} object points are behind the camera")]
    BehindCamera(usize),
    #[error("reprojection error {rmse:.3}px exceeds {max:.3}px")]
    ReprojectionTooLarge { rmse: f64, max: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct EstimatorParams {
    pub max_iterations: usize,
    /// Poses whose RMS reprojection error (pixels) is above this are rejected.
    pub max_reprojection_error: Option<f64>,
    pub rotation_tolerance: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            max_iterations: MAX_PNP_ITERATIONS,
            max_reprojection_error: None,
            rotation_tolerance: ROTATION_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoseEstimator {
    pub params: EstimatorParams,
}

/// 二维点集的离散程度：协方差矩阵最小特征值与最大特征值之比
fn spread_ratio(points: impl Iterator<Item = (f64, f64)> + Clone) -> f64 {
    let n = points.clone().count() as f64;
    let (sx, sy) = points.clone().fold((0.0, 0.0), |(a, b), (x, y)| (a + x, b + y));
    let (mx, my) = (sx / n, sy / n);
    let (mut cxx, mut cxy, mut cyy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let (dx, dy) = (x - mx, y - my);
        cxx += dx * dx;
        cxy += dx * dy;
        cyy += dy * dy;
    }
    let half_trace = 0.5 * (cxx + cyy);
    let det = cxx * cyy - cxy * cxy;
    let disc = (half_trace * half_trace - det).max(0.0).sqrt();
    let largest = half_trace + disc;
    let smallest = (half_trace - disc).max(0.0);
    if !(largest.is_finite() && largest > 0.0) {
        return 0.0;
    }
    smallest / largest
}

impl PoseEstimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self { params }
    }

    fn validate(object: &[Point3<f64>], image: &[Point2<f64>]) -> Result<(), PoseError> {
        if object.len() != image.len() {
            return Err(PoseError::MismatchedLengths {
                object: object.len(),
                image: image.len(),
            });
        }
        if object.len() < MIN_CORRESPONDENCES {
            return Err(PoseError::InsufficientPoints {
                required: MIN_CORRESPONDENCES,
                actual: object.len(),
            });
        }
        let finite = object.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
            && image.iter().all(|p| p.x.is_finite() && p.y.is_finite());
        if !finite {
            return Err(PoseError::NonFinite);
        }

        let extent = object
            .iter()
            .map(|p| p.x.abs().max(p.y.abs()))
            .fold(0.0_f64, f64::max);
        if object.iter().any(|p| p.z.abs() > PLANAR_EPS * (1.0 + extent)) {
            return Err(PoseError::NonPlanarTarget);
        }
        if spread_ratio(object.iter().map(|p| (p.x, p.y))) < COLLINEAR_RATIO {
            return Err(PoseError::Degenerate("object points are collinear"));
        }
        if spread_ratio(image.iter().map(|p| (p.x, p.y))) < COLLINEAR_RATIO {
            return Err(PoseError::Degenerate("image points are collinear"));
        }
        Ok(())
    }

    /// Solve PnP for a planar target.
    ///
    /// `object` and `image` must have the same length and order.
    pub fn solve(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        camera: &impl CameraTrait,
    ) -> Result<Pose, PoseError> {
        Self::validate(object, image)?;

        // 去畸变到归一化平面后求单应
        let normalized: Vec<Point2<f64>> = image
            .iter()
            .map(|p| {
                let ray = camera.lift_projective(p);
                Point2::new(ray.x / ray.z, ray.y / ray.z)
            })
            .collect();
        let board: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let h = homography::dlt_homography(&board, &normalized)?;
        let initial = planar::pose_from_homography(&h)?;

        let (mut pose, report) =
            refine::refine_pose(object, image, camera, &initial, self.params.max_iterations);
        log::trace!(
            "pnp refine: {} iterations, cost {:.3e} -> {:.3e}",
            report.iterations,
            report.initial_cost,
            report.final_cost
        );

        if pose.rvec.iter().chain(pose.tvec.iter()).any(|v| !v.is_finite()) {
            return Err(PoseError::NonFinite);
        }
        if !pose.is_orthonormal(self.params.rotation_tolerance) {
            return Err(PoseError::InvalidRotation);
        }
        let behind = pose.points_behind(object);
        if behind > 0 {
            return Err(PoseError::BehindCamera(behind));
        }

        pose.reprojection_rmse = projector::reprojection_rmse(object, image, &pose, camera);
        if let Some(max) = self.params.max_reprojection_error {
            if pose.reprojection_rmse > max {
                return Err(PoseError::ReprojectionTooLarge {
                    rmse: pose.reprojection_rmse,
                    max,
                });
            }
        }
        Ok(pose)
    }
}
