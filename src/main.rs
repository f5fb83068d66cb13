/// opencv
/// https://docs.rs/opencv/latest/opencv/all.html
///
/// nalgebra
/// https://docs.rs/nalgebra/latest/nalgebra/
///
// chessboard-ar --input chess.mp4 --camera configs/camera.yaml
extern crate opencv;

mod camera;
mod config;
mod control;
mod dataset;
mod detector;
mod display;
mod frame_loop;
mod geometry;
mod global_cast;
mod overlay;
mod pose_estimator;
mod projector;
mod utility;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::camera::{CameraParametersTrait, CameraTrait};
use crate::config::AppConfig;
use crate::control::{HighguiKeys, Unattended};
use crate::detector::ChessboardDetector;
use crate::display::{HighguiWindow, NullSink};
use crate::frame_loop::FrameProcessor;
use crate::global_cast::Matrix3d;
use crate::pose_estimator::PoseEstimator;

/// Estimate the camera pose from a chessboard and draw a wireframe overlay.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Video file, camera index or image sequence directory
    #[arg(short, long)]
    input: Option<String>,

    /// OpenCV YAML camera calibration
    #[arg(long)]
    camera: Option<PathBuf>,

    /// Save the resolved camera calibration as OpenCV YAML
    #[arg(long)]
    write_camera: Option<PathBuf>,

    /// Process without a window or keyboard control
    #[arg(long)]
    headless: bool,

    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::builder()
        .filter_level(cli.log_level)
        .format_timestamp_nanos()
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(input) = cli.input {
        config.input = input;
    }
    if let Some(camera) = cli.camera {
        config.camera_file = Some(camera);
    }

    let board = config.board()?;
    let shapes = config.overlay_shapes()?;
    let camera = config.camera()?;
    log::info!("input: {}", config.input);
    log::info!(
        "board: {}x{} corners, cell {} m, {} shapes",
        board.columns(),
        board.rows(),
        board.cell_size(),
        shapes.len()
    );
    let parameters = &camera.parameters;
    if parameters.image_width > 0 && parameters.image_height > 0 {
        log::info!(
            "camera {}: calibrated at {}x{}",
            parameters.camera_name,
            parameters.image_width,
            parameters.image_height
        );
    }
    log::info!("K: {}", Matrix3d(camera.intrinsic_matrix()));
    log::info!("dist: {:?}", camera.distortion_coefficients());
    if let Some(path) = &cli.write_camera {
        parameters.write_to_yaml(&path.to_string_lossy())?;
        log::info!("camera written to {}", path.display());
    }

    let mut source = dataset::open(&config.input)?;
    let estimator = PoseEstimator::new(config.estimator_params());
    let detector = ChessboardDetector::new(config.detection);
    let mut processor = FrameProcessor::new(detector, estimator, camera, board, shapes);

    let summary = if cli.headless {
        frame_loop::run(
            &mut processor,
            source.as_mut(),
            &mut NullSink,
            &mut Unattended,
            config.poll_timeout_ms,
        )?
    } else {
        let mut window = HighguiWindow::new(&config.window_name)?;
        frame_loop::run(
            &mut processor,
            source.as_mut(),
            &mut window,
            &mut HighguiKeys,
            config.poll_timeout_ms,
        )?
    };
    log::info!("{} frames, {} with a pose", summary.frames, summary.posed);
    Ok(())
}
