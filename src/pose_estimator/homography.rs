use nalgebra::{DMatrix, Matrix3, Point2};

use super::PoseError;

/// Hartley 归一化：平移到质心，平均距离缩放为 sqrt(2)。
/// 返回归一化后的点、变换 T 以及 T 的逆。
fn normalize_points(pts: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>, Matrix3<f64>)> {
    let n = pts.len() as f64;
    let mx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let my = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !(mean_dist.is_finite() && mean_dist > 1e-12) {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0);
    let t_inv = Matrix3::new(1.0 / s, 0.0, mx, 0.0, 1.0 / s, my, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| Point2::new(s * (p.x - mx), s * (p.y - my)))
        .collect();
    Some((out, t, t_inv))
}

/// Estimate H such that image ~ H · world using the normalized DLT.
pub fn dlt_homography(world: &[Point2<f64>], image: &[Point2<f64>]) -> Result<Matrix3<f64>, PoseError> {
    let n = world.len();
    if n < 4 || image.len() != n {
        return Err(PoseError::InsufficientPoints {
            required: 4,
            actual: n.min(image.len()),
        });
    }
    let (world_n, t_world, _) =
        normalize_points(world).ok_or(PoseError::Degenerate("board points coincide"))?;
    let (image_n, _, t_image_inv) =
        normalize_points(image).ok_or(PoseError::Degenerate("image points coincide"))?;

    // 至少 9 行，保证 SVD 给出完整的 V
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
    for (i, (pw, pi)) in world_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // A h = 0：取最小奇异值对应的右奇异向量
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(PoseError::SvdFailed)?;
    let h = v_t.row(svd.singular_values.imin());

    let h_norm = Matrix3::from_fn(|r, c| h[3 * r + c]);
    let h_mat = t_image_inv * h_norm * t_world;
    if h_mat.iter().any(|v| !v.is_finite()) {
        return Err(PoseError::NonFinite);
    }
    Ok(h_mat)
}
