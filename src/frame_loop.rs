//! 主循环：读帧、检测、估计、绘制、显示、轮询按键
//!
//! Detection and pose failures only cost the overlay for that frame. Errors
//! from the source, the sink or the signal source end the run.

use nalgebra::Point3;
use opencv::core::Mat;
use thiserror::Error;

use crate::camera::CameraTrait;
use crate::control::{LoopState, SignalSource};
use crate::dataset::FrameSource;
use crate::detector::{CornerDetector, DetectionError};
use crate::display::FrameSink;
use crate::geometry::{BoardGeometry, OverlayShape};
use crate::overlay::OverlayRenderer;
use crate::pose_estimator::{Pose, PoseEstimator, PoseError};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Pose(#[from] PoseError),
    #[error("render failed: {0}")]
    Render(#[from] opencv::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub posed: usize,
}

pub struct FrameProcessor<D: CornerDetector, C: CameraTrait> {
    detector: D,
    estimator: PoseEstimator,
    camera: C,
    board: BoardGeometry,
    object_points: Vec<Point3<f64>>,
    shapes: Vec<OverlayShape>,
    renderer: OverlayRenderer,
}

impl<D: CornerDetector, C: CameraTrait> FrameProcessor<D, C> {
    pub fn new(
        detector: D,
        estimator: PoseEstimator,
        camera: C,
        board: BoardGeometry,
        shapes: Vec<OverlayShape>,
    ) -> Self {
        let object_points = board.object_points();
        Self {
            detector,
            estimator,
            camera,
            board,
            object_points,
            shapes,
            renderer: OverlayRenderer::default(),
        }
    }

    pub fn estimate(&mut self, frame: &Mat) -> Result<Pose, FrameError> {
        let corners = self.detector.detect(frame, &self.board)?;
        let pose = self
            .estimator
            .solve(&self.object_points, &corners, &self.camera)?;
        Ok(pose)
    }

    /// Draws the overlay into `frame` when a pose is found; otherwise the
    /// frame is left untouched.
    pub fn process(&mut self, frame: &mut Mat) -> Result<Pose, FrameError> {
        let pose = self.estimate(frame)?;
        self.renderer
            .render(frame, &self.shapes, &pose, &self.camera)?;
        Ok(pose)
    }
}

pub fn run<D: CornerDetector, C: CameraTrait>(
    processor: &mut FrameProcessor<D, C>,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    signals: &mut dyn SignalSource,
    poll_timeout_ms: i32,
) -> anyhow::Result<RunSummary> {
    let mut state = LoopState::Running;
    let mut summary = RunSummary::default();
    while state != LoopState::Terminated {
        if state == LoopState::Running {
            let Some(mut frame) = source.next_frame()? else {
                log::info!("end of stream");
                break;
            };
            summary.frames += 1;
            match processor.process(&mut frame) {
                Ok(pose) => {
                    summary.posed += 1;
                    log::debug!(
                        "frame {}: rmse {:.3}px, t = {:?}",
                        summary.frames,
                        pose.reprojection_rmse,
                        pose.tvec.as_slice()
                    );
                }
                Err(e) => log::debug!("frame {}: {}", summary.frames, e),
            }
            sink.show(&frame)?;
        }
        let signal = signals.poll(state.poll_timeout(poll_timeout_ms))?;
        let next = state.on_signal(signal);
        if next != state {
            log::info!("{:?} -> {:?}", state, next);
        }
        state = next;
    }
    Ok(summary)
}
