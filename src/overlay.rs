//! 增强现实叠加：线框和相机位置
//!
//! Every shape becomes `3k` segments for `k` footprint vertices: the lower
//! loop, the upper loop and one vertical edge per vertex.

use nalgebra::{Point2, Vector3};
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc::{FONT_HERSHEY_DUPLEX, LINE_8};

use crate::camera::CameraTrait;
use crate::geometry::{Bgr, OverlayShape};
use crate::global_cast::{self, Vector3d};
use crate::pose_estimator::Pose;
use crate::projector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Point2<f64>,
    pub to: Point2<f64>,
}

/// Closed polylines `lower` and `upper` plus the edges between matching
/// vertices. Both slices must have the same length.
pub fn shape_segments(lower: &[Point2<f64>], upper: &[Point2<f64>]) -> Vec<Segment> {
    let k = lower.len().min(upper.len());
    let mut segments = Vec::with_capacity(3 * k);
    for polyline in [lower, upper] {
        for i in 0..k {
            segments.push(Segment {
                from: polyline[i],
                to: polyline[(i + 1) % k],
            });
        }
    }
    for i in 0..k {
        segments.push(Segment {
            from: lower[i],
            to: upper[i],
        });
    }
    segments
}

pub fn format_position(position: &Vector3<f64>) -> String {
    format!("XYZ: {}", Vector3d(*position))
}

#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    pub thickness: i32,
    pub text_origin: Point,
    pub text_scale: f64,
    pub text_color: Bgr,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            thickness: 2,
            text_origin: Point::new(10, 25),
            text_scale: 0.6,
            text_color: Bgr::GREEN,
        }
    }
}

fn scalar(color: Bgr) -> Scalar {
    Scalar::new(color.0 as f64, color.1 as f64, color.2 as f64, 0.0)
}

impl OverlayRenderer {
    /// Projects every shape with `pose` and draws it, then writes the camera
    /// position in board coordinates at the top left corner.
    pub fn render(
        &self,
        frame: &mut Mat,
        shapes: &[OverlayShape],
        pose: &Pose,
        camera: &impl CameraTrait,
    ) -> opencv::Result<()> {
        for shape in shapes {
            self.draw_shape(frame, shape, pose, camera)?;
        }
        let text = format_position(&pose.camera_position());
        opencv::imgproc::put_text(
            frame,
            &text,
            self.text_origin,
            FONT_HERSHEY_DUPLEX,
            self.text_scale,
            scalar(self.text_color),
            1,
            LINE_8,
            false,
        )
    }

    fn draw_shape(
        &self,
        frame: &mut Mat,
        shape: &OverlayShape,
        pose: &Pose,
        camera: &impl CameraTrait,
    ) -> opencv::Result<()> {
        let lower = projector::project_points(&shape.lower, pose, camera);
        let upper = projector::project_points(&shape.upper, pose, camera);
        let color = scalar(shape.color);
        for segment in shape_segments(&lower, &upper) {
            opencv::imgproc::line(
                frame,
                global_cast::to_cv_point(&segment.from),
                global_cast::to_cv_point(&segment.to),
                color,
                self.thickness,
                LINE_8,
                0,
            )?;
        }
        log::trace!("{}: {} vertices", shape.name, shape.vertex_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::config::{DEFAULT_K, default_shapes, BOARD_CELLSIZE};
    use opencv::core::{Vec3b, VecN, CV_8UC3};
    use opencv::prelude::*;

    fn camera() -> PinholeCamera {
        PinholeCamera::from_matrix(&DEFAULT_K, &[0.0; 5]).unwrap()
    }

    fn looking_at_board() -> Pose {
        // 相机在棋盘中心上方 0.4 米，正对棋盘
        Pose::new(
            Vector3::zeros(),
            Vector3::new(-0.125, -0.0875, 0.4),
        )
    }

    fn projected_vertices(
        shape: &OverlayShape,
        pose: &Pose,
        camera: &impl CameraTrait,
    ) -> Vec<Point2<f64>> {
        let points: Vec<_> = shape.lower.iter().chain(shape.upper.iter()).copied().collect();
        projector::project_points(&points, pose, camera)
    }

    #[test]
    fn test_shape_segments() {
        let lower = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
        ];
        let upper: Vec<_> = lower.iter().map(|p| p + nalgebra::Vector2::new(0.0, -5.0)).collect();
        let segments = shape_segments(&lower, &upper);
        assert_eq!(segments.len(), 9);
        // 闭合
        assert_eq!(segments[2].from, lower[2]);
        assert_eq!(segments[2].to, lower[0]);
        assert_eq!(segments[5].to, upper[0]);
        assert_eq!(segments[8].from, lower[2]);
        assert_eq!(segments[8].to, upper[2]);
    }

    #[test]
    fn test_format_position() {
        let text = format_position(&Vector3::new(0.1, -0.25, -0.5));
        assert_eq!(text, "XYZ: [0.100 -0.250 -0.500]");
    }

    #[test]
    fn test_render() {
        let camera = camera();
        let pose = looking_at_board();
        let shapes: Vec<_> = default_shapes()
            .iter()
            .map(|s| s.build(BOARD_CELLSIZE).unwrap())
            .collect();
        let mut frame =
            Mat::new_rows_cols_with_default(720, 1280, CV_8UC3, Scalar::all(0.0)).unwrap();
        OverlayRenderer::default()
            .render(&mut frame, &shapes, &pose, &camera)
            .unwrap();

        // 每个形状的底面顶点都被画上了对应颜色
        for shape in shapes.iter() {
            let vertices = projected_vertices(shape, &pose, &camera);
            assert_eq!(vertices.len(), 2 * shape.vertex_count());
            let p = global_cast::to_cv_point(&vertices[0]);
            let px = frame.at_2d::<Vec3b>(p.y, p.x).unwrap();
            assert!(px[0] > 0 || px[1] > 0 || px[2] > 0, "{} not drawn", shape.name);
        }

        // 左上角有文字
        let mut text_pixels = 0;
        for y in 10..30 {
            for x in 10..150 {
                let px = frame.at_2d::<Vec3b>(y, x).unwrap();
                if px[1] > 0 {
                    text_pixels += 1;
                }
            }
        }
        assert!(text_pixels > 0);
    }

    #[test]
    fn test_render_uses_solid_colors() {
        let camera = camera();
        let pose = looking_at_board();
        let shapes: Vec<_> = default_shapes()
            .iter()
            .map(|s| s.build(BOARD_CELLSIZE).unwrap())
            .collect();
        let mut frame =
            Mat::new_rows_cols_with_default(720, 1280, CV_8UC3, Scalar::all(0.0)).unwrap();
        OverlayRenderer::default()
            .render(&mut frame, &shapes, &pose, &camera)
            .unwrap();

        // 不做抗锯齿，像素只可能是背景或调色板里的颜色
        let palette: Vec<Vec3b> = [Bgr(0, 0, 0), Bgr::BLUE, Bgr::RED, Bgr::GRAY, Bgr::GREEN]
            .iter()
            .map(|c| VecN([c.0, c.1, c.2]))
            .collect();
        let pixels = frame.data_typed::<Vec3b>().unwrap();
        assert!(pixels.iter().any(|px| *px != palette[0]));
        assert!(pixels.iter().all(|px| palette.contains(px)));
    }

    #[test]
    fn test_render_off_screen() {
        // 形状投影到图像外时只是被裁剪
        let camera = camera();
        let pose = Pose::new(Vector3::zeros(), Vector3::new(5.0, 5.0, 0.4));
        let shapes: Vec<_> = default_shapes()
            .iter()
            .map(|s| s.build(BOARD_CELLSIZE).unwrap())
            .collect();
        let mut frame =
            Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(0.0)).unwrap();
        assert!(OverlayRenderer::default()
            .render(&mut frame, &shapes, &pose, &camera)
            .is_ok());
    }
}
