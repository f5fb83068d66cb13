//! Levenberg-Marquardt 位姿优化
//!
//! 参数为 (rvec, t) 六维，残差为像素重投影误差，雅可比使用中心差分。

use nalgebra::{DVector, MatrixXx6, Point2, Point3, Vector3, Vector6};

use super::Pose;
use crate::camera::CameraTrait;
use crate::projector;

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e12;
const STEP_EPS: f64 = 1e-12;
const DIFF_STEP: f64 = 1e-7;

#[derive(Debug, Clone, Copy)]
pub struct RefineReport {
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
}

fn to_pose(x: &Vector6<f64>) -> Pose {
    Pose::new(
        Vector3::new(x[0], x[1], x[2]),
        Vector3::new(x[3], x[4], x[5]),
    )
}

fn residuals(
    x: &Vector6<f64>,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &impl CameraTrait,
) -> DVector<f64> {
    let projected = projector::project_points(object, &to_pose(x), camera);
    DVector::from_iterator(
        2 * image.len(),
        projected
            .iter()
            .zip(image.iter())
            .flat_map(|(p, q)| [p.x - q.x, p.y - q.y]),
    )
}

fn jacobian(
    x: &Vector6<f64>,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &impl CameraTrait,
) -> MatrixXx6<f64> {
    let mut j = MatrixXx6::<f64>::zeros(2 * image.len());
    for k in 0..6 {
        let h = DIFF_STEP * x[k].abs().max(1.0);
        let mut plus = *x;
        let mut minus = *x;
        plus[k] += h;
        minus[k] -= h;
        let col = (residuals(&plus, object, image, camera) - residuals(&minus, object, image, camera))
            / (2.0 * h);
        j.set_column(k, &col);
    }
    j
}

/// Minimize the squared pixel reprojection error starting from `initial`.
pub fn refine_pose(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &impl CameraTrait,
    initial: &Pose,
    max_iterations: usize,
) -> (Pose, RefineReport) {
    let mut x = Vector6::new(
        initial.rvec.x,
        initial.rvec.y,
        initial.rvec.z,
        initial.tvec.x,
        initial.tvec.y,
        initial.tvec.z,
    );
    let mut r = residuals(&x, object, image, camera);
    let mut cost = r.norm_squared();
    let initial_cost = cost;
    let mut lambda = INITIAL_DAMPING;
    let mut iterations = 0;

    while iterations < max_iterations && cost.is_finite() {
        iterations += 1;
        let j = jacobian(&x, object, image, camera);
        let jtj = j.tr_mul(&j);
        let g: Vector6<f64> = j.tr_mul(&r);

        let mut accepted = None;
        while lambda < MAX_DAMPING {
            let mut a = jtj;
            for i in 0..6 {
                a[(i, i)] += lambda * jtj[(i, i)].max(f64::EPSILON);
            }
            let Some(chol) = a.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let delta = -chol.solve(&g);
            let x_new = x + delta;
            let r_new = residuals(&x_new, object, image, camera);
            let cost_new = r_new.norm_squared();
            if cost_new.is_finite() && cost_new <= cost {
                lambda = (lambda * 0.1).max(1e-15);
                accepted = Some((x_new, r_new, cost_new, delta));
                break;
            }
            lambda *= 10.0;
        }

        let Some((x_new, r_new, cost_new, delta)) = accepted else {
            break;
        };
        let decrease = cost - cost_new;
        x = x_new;
        r = r_new;
        cost = cost_new;
        if delta.norm() <= STEP_EPS * (x.norm() + STEP_EPS) || decrease <= 1e-16 * cost.max(1e-30) {
            break;
        }
    }

    let report = RefineReport {
        iterations,
        initial_cost,
        final_cost: cost,
    };
    (to_pose(&x), report)
}
