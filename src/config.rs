use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::camera::{CameraError, PinholeCamera};
use crate::geometry::{Bgr, BoardGeometry, GeometryError, OverlayShape};
use crate::pose_estimator::EstimatorParams;

pub const DEFAULT_INPUT: &str = "chess.mp4";
pub const WINDOW_NAME: &str = "Pose Estimation (Chessboard)";

/// 相机内参，行优先
pub const DEFAULT_K: [f64; 9] = [
    1.21244393e+03,
    0.0,
    6.80331146e+02,
    0.0,
    1.19699883e+03,
    3.59772924e+02,
    0.0,
    0.0,
    1.0,
];
/// k1, k2, p1, p2, k3
pub const DEFAULT_DIST_COEFFS: [f64; 5] =
    [0.33872153, -2.02265297, -0.00551924, 0.01612134, 5.17598023];

/// 棋盘内角点 列 x 行
pub const BOARD_COLUMNS: usize = 10;
pub const BOARD_ROWS: usize = 7;
/// 格子边长，米
pub const BOARD_CELLSIZE: f64 = 0.025;

/// 每帧等待按键的时间（毫秒）
pub const POLL_TIMEOUT_MS: i32 = 10;

pub const MAX_PNP_ITERATIONS: usize = 30;
pub const ROTATION_TOLERANCE: f64 = 1e-9;
/// 重投影误差上限（像素）
pub const MAX_REPROJECTION_ERROR: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub columns: usize,
    pub rows: usize,
    pub cell_size: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            columns: BOARD_COLUMNS,
            rows: BOARD_ROWS,
            cell_size: BOARD_CELLSIZE,
        }
    }
}

/// findChessboardCorners 的参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub adaptive_threshold: bool,
    pub normalize_image: bool,
    pub fast_check: bool,
    /// Run cornerSubPix on the detected corners.
    pub subpixel: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            adaptive_threshold: true,
            normalize_image: true,
            fast_check: true,
            subpixel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeConfig {
    pub name: String,
    /// Blue, green, red.
    pub bgr: [u8; 3],
    /// Footprint vertices in board cells.
    pub footprint: Vec<[f64; 2]>,
    /// Extrusion height in board cells.
    #[serde(default = "default_shape_height")]
    pub height: f64,
}

fn default_shape_height() -> f64 {
    1.0
}

impl ShapeConfig {
    fn new(name: &str, color: Bgr, footprint: &[[f64; 2]]) -> Self {
        Self {
            name: name.to_string(),
            bgr: [color.0, color.1, color.2],
            footprint: footprint.to_vec(),
            height: default_shape_height(),
        }
    }

    pub fn build(&self, cell_size: f64) -> Result<OverlayShape, GeometryError> {
        let [b, g, r] = self.bgr;
        OverlayShape::extruded(&self.name, &self.footprint, cell_size, self.height, Bgr(b, g, r))
    }
}

pub fn default_shapes() -> Vec<ShapeConfig> {
    vec![
        ShapeConfig::new(
            "box1",
            Bgr::BLUE,
            &[[3.0, 3.0], [0.0, 3.0], [0.0, 5.0], [1.0, 5.0], [1.0, 6.0], [3.0, 6.0]],
        ),
        ShapeConfig::new(
            "box2",
            Bgr::RED,
            &[
                [3.0, 3.0],
                [3.0, 0.0],
                [7.0, 0.0],
                [7.0, 3.0],
                [6.0, 3.0],
                [5.0, 2.0],
                [4.0, 3.0],
            ],
        ),
        ShapeConfig::new(
            "box3",
            Bgr::GRAY,
            &[
                [7.0, 3.0],
                [10.0, 3.0],
                [10.0, 4.0],
                [9.0, 4.0],
                [9.0, 5.0],
                [10.0, 5.0],
                [10.0, 6.0],
                [7.0, 6.0],
            ],
        ),
    ]
}

/// 运行配置，全部在启动时确定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Video file, camera index, or image sequence directory.
    pub input: String,
    pub camera_matrix: [f64; 9],
    pub dist_coeffs: [f64; 5],
    /// OpenCV YAML camera file; overrides `camera_matrix` and `dist_coeffs`.
    pub camera_file: Option<PathBuf>,
    pub board: BoardConfig,
    pub detection: DetectionConfig,
    pub shapes: Vec<ShapeConfig>,
    pub max_reprojection_error: Option<f64>,
    pub poll_timeout_ms: i32,
    pub window_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT.to_string(),
            camera_matrix: DEFAULT_K,
            dist_coeffs: DEFAULT_DIST_COEFFS,
            camera_file: None,
            board: BoardConfig::default(),
            detection: DetectionConfig::default(),
            shapes: default_shapes(),
            max_reprojection_error: Some(MAX_REPROJECTION_ERROR),
            poll_timeout_ms: POLL_TIMEOUT_MS,
            window_name: WINDOW_NAME.to_string(),
        }
    }
}

impl AppConfig {
    /// A relative `camera_file` is taken relative to the config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: Self = serde_json::from_reader(reader)?;
        let dir = path.parent().unwrap_or(Path::new(""));
        config.camera_file = config
            .camera_file
            .take()
            .map(|file| if file.is_relative() { dir.join(file) } else { file });
        Ok(config)
    }

    pub fn board(&self) -> Result<BoardGeometry, GeometryError> {
        BoardGeometry::new(self.board.columns, self.board.rows, self.board.cell_size)
    }

    pub fn overlay_shapes(&self) -> Result<Vec<OverlayShape>, GeometryError> {
        let board = self.board()?;
        self.shapes
            .iter()
            .map(|s| s.build(board.cell_size()))
            .collect()
    }

    pub fn camera(&self) -> Result<PinholeCamera, CameraError> {
        match &self.camera_file {
            Some(path) => PinholeCamera::new(&path.to_string_lossy()),
            None => PinholeCamera::from_matrix(&self.camera_matrix, &self.dist_coeffs),
        }
    }

    pub fn estimator_params(&self) -> EstimatorParams {
        EstimatorParams {
            max_reprojection_error: self.max_reprojection_error,
            ..Default::default()
        }
    }
}
