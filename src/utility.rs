use nalgebra::{Matrix3, Vector3};

pub struct Utility {}

impl Utility {
    /// 反对称矩阵 [v]x
    #[inline]
    pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
    }

    /// Rodrigues: rotation vector -> rotation matrix.
    ///
    /// R = cos(θ) I + (1 - cos(θ)) k kᵗ + sin(θ) [k]x, with θ = |rvec| and k = rvec / θ.
    pub fn rodrigues(rvec: &Vector3<f64>) -> Matrix3<f64> {
        let theta = rvec.norm();
        if theta < f64::EPSILON {
            // 一阶近似
            return Matrix3::identity() + Self::skew_symmetric(rvec);
        }
        let k = rvec / theta;
        let (s, c) = theta.sin_cos();
        Matrix3::identity() * c + (k * k.transpose()) * (1.0 - c) + Self::skew_symmetric(&k) * s
    }

    /// 旋转矩阵 -> 旋转向量
    pub fn rotation_vector(r: &Matrix3<f64>) -> Vector3<f64> {
        nalgebra::Rotation3::from_matrix(r).scaled_axis()
    }

    /// 检查 RᵗR = I 且 det(R) = +1
    pub fn is_rotation(r: &Matrix3<f64>, tol: f64) -> bool {
        let orthogonal = (r.transpose() * r - Matrix3::identity()).abs().max() <= tol;
        orthogonal && (r.determinant() - 1.0).abs() <= tol
    }
}
