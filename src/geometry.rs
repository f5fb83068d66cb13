//! 标定板与 AR 叠加物体的几何描述
//!
//! 所有坐标都在棋盘坐标系下：x 沿列方向，y 沿行方向，z 指向棋盘背面，
//! 所以“向上”拉伸的物体 z 为负。

use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("board pattern must have at least one column and one row, got {columns}x{rows}")]
    EmptyPattern { columns: usize, rows: usize },
    #[error("cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),
    #[error("overlay shape `{0}` has an empty footprint")]
    EmptyShape(String),
    #[error("overlay shape `{name}` has {lower} lower and {upper} upper vertices")]
    MismatchedPolylines {
        name: String,
        lower: usize,
        upper: usize,
    },
}

/// 棋盘：内角点的列数、行数以及格子边长（米）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardGeometry {
    columns: usize,
    rows: usize,
    cell_size: f64,
}

impl BoardGeometry {
    pub fn new(columns: usize, rows: usize, cell_size: f64) -> Result<Self, GeometryError> {
        if columns == 0 || rows == 0 {
            return Err(GeometryError::EmptyPattern { columns, rows });
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(GeometryError::InvalidCellSize(cell_size));
        }
        Ok(Self {
            columns,
            rows,
            cell_size,
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// 内角点个数
    pub fn corner_count(&self) -> usize {
        self.columns * self.rows
    }

    /// 棋盘角点的三维坐标，按行优先排列。
    ///
    /// The order has to match the corner order reported by the detector
    /// (row by row, left to right), otherwise PnP pairs the wrong points.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|r| (0..self.columns).map(move |c| (c, r)))
            .map(|(c, r)| {
                Point3::new(
                    c as f64 * self.cell_size,
                    r as f64 * self.cell_size,
                    0.0,
                )
            })
            .collect()
    }
}

/// BGR color, in the channel order OpenCV draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bgr(pub u8, pub u8, pub u8);

impl Bgr {
    pub const BLUE: Bgr = Bgr(139, 0, 0);
    pub const RED: Bgr = Bgr(0, 0, 255);
    pub const GRAY: Bgr = Bgr(192, 192, 192);
    pub const GREEN: Bgr = Bgr(0, 255, 0);
}

/// 拉伸体：底面折线（z = 0）和顶面折线，按下标一一对应
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayShape {
    pub name: String,
    pub lower: Vec<Point3<f64>>,
    pub upper: Vec<Point3<f64>>,
    pub color: Bgr,
}

impl OverlayShape {
    pub fn new(
        name: &str,
        lower: Vec<Point3<f64>>,
        upper: Vec<Point3<f64>>,
        color: Bgr,
    ) -> Result<Self, GeometryError> {
        if lower.is_empty() {
            return Err(GeometryError::EmptyShape(name.to_string()));
        }
        if lower.len() != upper.len() {
            return Err(GeometryError::MismatchedPolylines {
                name: name.to_string(),
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            lower,
            upper,
            color,
        })
    }

    /// Builds a prism from a footprint given in board cells. The upper face
    /// sits `height` cells above the board, i.e. at `z = -height * cell_size`.
    pub fn extruded(
        name: &str,
        footprint: &[[f64; 2]],
        cell_size: f64,
        height: f64,
        color: Bgr,
    ) -> Result<Self, GeometryError> {
        let at = |z: f64| -> Vec<Point3<f64>> {
            footprint
                .iter()
                .map(|[x, y]| Point3::new(x * cell_size, y * cell_size, z))
                .collect()
        };
        Self::new(name, at(0.0), at(-height * cell_size), color)
    }

    pub fn vertex_count(&self) -> usize {
        self.lower.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major() {
        let board = BoardGeometry::new(3, 2, 0.5).unwrap();
        let pts = board.object_points();
        assert_eq!(pts.len(), board.corner_count());
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Point3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[2], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 0.5, 0.0));
        assert_eq!(pts[5], Point3::new(1.0, 0.5, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn invalid_board_is_rejected() {
        assert_eq!(
            BoardGeometry::new(0, 7, 0.025),
            Err(GeometryError::EmptyPattern {
                columns: 0,
                rows: 7
            })
        );
        assert!(matches!(
            BoardGeometry::new(10, 7, 0.0),
            Err(GeometryError::InvalidCellSize(_))
        ));
        assert!(matches!(
            BoardGeometry::new(10, 7, f64::NAN),
            Err(GeometryError::InvalidCellSize(_))
        ));
    }

    #[test]
    fn extruded_shape_lifts_upper_face() {
        let shape =
            OverlayShape::extruded("box", &[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0]], 0.025, 1.0, Bgr::RED)
                .unwrap();
        assert_eq!(shape.vertex_count(), 3);
        assert_eq!(shape.lower[1], Point3::new(0.05, 0.0, 0.0));
        assert_eq!(shape.upper[1], Point3::new(0.05, 0.0, -0.025));
    }

    #[test]
    fn mismatched_shape_is_rejected() {
        let err = OverlayShape::new(
            "bad",
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![Point3::origin()],
            Bgr::GRAY,
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::MismatchedPolylines { .. }));
        assert!(OverlayShape::extruded("empty", &[], 1.0, 1.0, Bgr::GRAY).is_err());
    }
}
