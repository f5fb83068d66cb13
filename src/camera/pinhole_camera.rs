use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use opencv::core::{FileNode, FileNodeTraitConst, FileStorageTrait, FileStorageTraitConst};

use super::{CameraError, CameraParametersTrait, CameraTrait};

/// 迭代去畸变的最大次数
const UNDISTORT_ITERATIONS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-14;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinholeParameters {
    pub camera_name: String,
    // size
    pub image_width: i32,
    pub image_height: i32,
    // intrinsic
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    // distortion
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl PinholeParameters {
    /// `k` is the row-major 3x3 intrinsic matrix, `dist` is `[k1, k2, p1, p2, k3]`.
    pub fn from_matrix(k: &[f64; 9], dist: &[f64; 5]) -> Result<Self, CameraError> {
        if k.iter().chain(dist.iter()).any(|v| !v.is_finite()) {
            return Err(CameraError::NonFinite);
        }
        if k[1].abs() > f64::EPSILON {
            return Err(CameraError::NonZeroSkew(k[1]));
        }
        if k[3].abs() > f64::EPSILON {
            return Err(CameraError::NotUpperTriangular(k[3]));
        }
        if k[6..] != [0.0, 0.0, 1.0] {
            return Err(CameraError::InvalidLastRow([k[6], k[7], k[8]]));
        }
        Ok(Self {
            fx: k[0],
            fy: k[4],
            cx: k[2],
            cy: k[5],
            k1: dist[0],
            k2: dist[1],
            p1: dist[2],
            p2: dist[3],
            k3: dist[4],
            ..Default::default()
        })
    }

    fn validate(&self) -> Result<(), CameraError> {
        let values = [
            self.fx, self.fy, self.cx, self.cy, self.k1, self.k2, self.p1, self.p2, self.k3,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFinite);
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(CameraError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        Ok(())
    }
}

fn missing(path: &str, key: &str) -> CameraError {
    CameraError::File {
        path: path.to_string(),
        reason: format!("missing `{key}`"),
    }
}

fn read_f64(node: &FileNode, key: &str, path: &str) -> Result<f64, CameraError> {
    let child = node.get(key)?;
    if child.is_none()? {
        return Err(missing(path, key));
    }
    Ok(child.to_f64()?)
}

impl CameraParametersTrait for PinholeParameters {
    const CAMERA_TYPE: &'static str = "PINHOLE";

    fn read_from_yaml(path: &str) -> Result<Self, CameraError> {
        let fs = opencv::core::FileStorage::new(
            path,
            opencv::core::FileStorage_Mode::READ as i32,
            "utf-8",
        )?;
        if !fs.is_opened()? {
            return Err(CameraError::File {
                path: path.to_string(),
                reason: "cannot open".to_string(),
            });
        }
        let root = fs.root(0)?;

        let model_type = root.get("model_type")?;
        if !model_type.is_none()? {
            let model_type = model_type.to_string()?;
            if model_type != Self::CAMERA_TYPE {
                return Err(CameraError::File {
                    path: path.to_string(),
                    reason: format!("model type is {model_type}, expected {}", Self::CAMERA_TYPE),
                });
            }
        }
        // image
        let camera_name = root.get("camera_name")?;
        let camera_name = if camera_name.is_none()? {
            String::new()
        } else {
            camera_name.to_string()?
        };
        let image_width = root.get("image_width")?.to_i32()?;
        let image_height = root.get("image_height")?.to_i32()?;
        // distortion，k3 可以省略
        let distortion_parameters = root.get("distortion_parameters")?;
        if distortion_parameters.is_none()? {
            return Err(missing(path, "distortion_parameters"));
        }
        let k1 = read_f64(&distortion_parameters, "k1", path)?;
        let k2 = read_f64(&distortion_parameters, "k2", path)?;
        let p1 = read_f64(&distortion_parameters, "p1", path)?;
        let p2 = read_f64(&distortion_parameters, "p2", path)?;
        let k3 = distortion_parameters.get("k3")?.to_f64()?;
        // intrinsic
        let projection_parameters = root.get("projection_parameters")?;
        if projection_parameters.is_none()? {
            return Err(missing(path, "projection_parameters"));
        }
        let fx = read_f64(&projection_parameters, "fx", path)?;
        let fy = read_f64(&projection_parameters, "fy", path)?;
        let cx = read_f64(&projection_parameters, "cx", path)?;
        let cy = read_f64(&projection_parameters, "cy", path)?;

        Ok(Self {
            camera_name,
            image_width,
            image_height,
            fx,
            fy,
            cx,
            cy,
            k1,
            k2,
            p1,
            p2,
            k3,
        })
    }

    fn write_to_yaml(&self, path: &str) -> Result<(), CameraError> {
        let mut fs = opencv::core::FileStorage::new(
            path,
            opencv::core::FileStorage_Mode::WRITE as i32,
            "utf-8",
        )?;

        fs.write_str("model_type", Self::CAMERA_TYPE)?;
        fs.write_str("camera_name", &self.camera_name)?;
        fs.write_i32("image_width", self.image_width)?;
        fs.write_i32("image_height", self.image_height)?;
        // distortion
        fs.start_write_struct("distortion_parameters", opencv::core::FileNode_MAP, "")?;
        fs.write_f64("k1", self.k1)?;
        fs.write_f64("k2", self.k2)?;
        fs.write_f64("p1", self.p1)?;
        fs.write_f64("p2", self.p2)?;
        fs.write_f64("k3", self.k3)?;
        fs.end_write_struct()?;

        // intrinsic
        fs.start_write_struct("projection_parameters", opencv::core::FileNode_MAP, "")?;
        fs.write_f64("fx", self.fx)?;
        fs.write_f64("fy", self.fy)?;
        fs.write_f64("cx", self.cx)?;
        fs.write_f64("cy", self.cy)?;
        fs.end_write_struct()?;
        fs.release()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PinholeCamera {
    pub parameters: PinholeParameters,
    pub has_distortion: bool,
    pub inv_k11: f64,
    pub inv_k13: f64,
    pub inv_k22: f64,
    pub inv_k23: f64,
}

impl PinholeCamera {
    pub fn new(camera_file: &str) -> Result<Self, CameraError> {
        Self::from_parameters(PinholeParameters::read_from_yaml(camera_file)?)
    }

    pub fn from_matrix(k: &[f64; 9], dist: &[f64; 5]) -> Result<Self, CameraError> {
        Self::from_parameters(PinholeParameters::from_matrix(k, dist)?)
    }

    pub fn from_parameters(parameters: PinholeParameters) -> Result<Self, CameraError> {
        parameters.validate()?;
        let p = &parameters;
        let has_distortion = [p.k1, p.k2, p.p1, p.p2, p.k3].iter().any(|v| *v != 0.0);
        Ok(Self {
            has_distortion,
            inv_k11: 1.0 / p.fx,
            inv_k13: -p.cx / p.fx,
            inv_k22: 1.0 / p.fy,
            inv_k23: -p.cy / p.fy,
            parameters,
        })
    }
}

impl CameraTrait for PinholeCamera {
    fn lift_projective(&self, p: &Point2<f64>) -> Vector3<f64> {
        let mx_d = self.inv_k11 * p.x + self.inv_k13;
        let my_d = self.inv_k22 * p.y + self.inv_k23;
        if !self.has_distortion {
            return Vector3::new(mx_d, my_d, 1.0);
        }

        // 固定点迭代，与 OpenCV undistortPoints 相同
        let k = &self.parameters;
        let (mut x, mut y) = (mx_d, my_d);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let icdist = 1.0 / (1.0 + ((k.k3 * r2 + k.k2) * r2 + k.k1) * r2);
            if !icdist.is_finite() || icdist < 0.0 {
                x = mx_d;
                y = my_d;
                break;
            }
            let delta_x = 2.0 * k.p1 * x * y + k.p2 * (r2 + 2.0 * x * x);
            let delta_y = k.p1 * (r2 + 2.0 * y * y) + 2.0 * k.p2 * x * y;
            let nx = (mx_d - delta_x) * icdist;
            let ny = (my_d - delta_y) * icdist;
            let step = (nx - x).abs() + (ny - y).abs();
            x = nx;
            y = ny;
            if step < UNDISTORT_EPS {
                break;
            }
        }
        Vector3::new(x, y, 1.0)
    }

    fn space_to_plane(&self, p: &Vector3<f64>) -> Point2<f64> {
        // z == 0 按 OpenCV 处理为 1
        let inv_z = if p.z != 0.0 { 1.0 / p.z } else { 1.0 };
        let p_u = Vector2::new(p.x * inv_z, p.y * inv_z);
        let p_d = if self.has_distortion {
            p_u + self.distortion(&p_u)
        } else {
            p_u
        };
        let k = &self.parameters;
        Point2::new(k.fx * p_d.x + k.cx, k.fy * p_d.y + k.cy)
    }

    fn distortion(&self, p_u: &Vector2<f64>) -> Vector2<f64> {
        let k = &self.parameters;
        let mx2_u = p_u.x * p_u.x;
        let my2_u = p_u.y * p_u.y;
        let mxy_u = p_u.x * p_u.y;
        let rho2_u = mx2_u + my2_u;
        let rad_dist_u = ((k.k3 * rho2_u + k.k2) * rho2_u + k.k1) * rho2_u;
        Vector2::new(
            p_u.x * rad_dist_u + 2.0 * k.p1 * mxy_u + k.p2 * (rho2_u + 2.0 * mx2_u),
            p_u.y * rad_dist_u + k.p1 * (rho2_u + 2.0 * my2_u) + 2.0 * k.p2 * mxy_u,
        )
    }

    fn intrinsic_matrix(&self) -> Matrix3<f64> {
        let k = &self.parameters;
        Matrix3::new(k.fx, 0.0, k.cx, 0.0, k.fy, k.cy, 0.0, 0.0, 1.0)
    }

    fn distortion_coefficients(&self) -> [f64; 5] {
        let k = &self.parameters;
        [k.k1, k.k2, k.p1, k.p2, k.k3]
    }
}
