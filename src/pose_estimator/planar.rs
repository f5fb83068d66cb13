use nalgebra::{Matrix3, Vector3};

use super::{Pose, PoseError};

/// 平面单应分解：H ~ [r1 r2 t]
///
/// `h` maps board-plane coordinates `(X, Y, 1)` to normalized image
/// coordinates, i.e. the intrinsics and distortion are already removed.
/// The sign of the scale is chosen so the board origin lies in front of
/// the camera.
pub fn pose_from_homography(h: &Matrix3<f64>) -> Result<Pose, PoseError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm = (h1.norm() + h2.norm()) * 0.5;
    if !(norm.is_finite() && norm > f64::EPSILON) {
        return Err(PoseError::Degenerate("homography has no in-plane scale"));
    }
    let mut lambda = 1.0 / norm;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    // 投影到 SO(3)
    let svd = r.svd(true, true);
    let u = svd.u.ok_or(PoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PoseError::SvdFailed)?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<f64> = h3 * lambda;
    Ok(Pose::from_rotation(&r_orth, t))
}
