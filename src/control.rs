//! 运行状态与按键控制

use opencv::highgui;

const KEY_ESC: i32 = 27;
const KEY_SPACE: i32 = 32;
const KEY_Q: i32 = 'q' as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Poll timed out.
    None,
    PauseToggle,
    Quit,
    Other,
}

impl ControlSignal {
    /// `key` as returned by `highgui::wait_key`.
    pub fn from_key(key: i32) -> Self {
        if key < 0 {
            return Self::None;
        }
        match key & 0xFF {
            KEY_SPACE => Self::PauseToggle,
            KEY_ESC | KEY_Q => Self::Quit,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Running,
    Paused,
    Terminated,
}

impl LoopState {
    pub fn on_signal(self, signal: ControlSignal) -> Self {
        match (self, signal) {
            (Self::Terminated, _) | (_, ControlSignal::Quit) => Self::Terminated,
            (Self::Running, ControlSignal::PauseToggle) => Self::Paused,
            (Self::Running, _) => Self::Running,
            (Self::Paused, ControlSignal::None) => Self::Paused,
            (Self::Paused, _) => Self::Running,
        }
    }

    /// Poll timeout for this state; `0` blocks until a key arrives.
    pub fn poll_timeout(self, running_timeout_ms: i32) -> i32 {
        match self {
            Self::Paused => 0,
            _ => running_timeout_ms.max(1),
        }
    }
}

pub trait SignalSource {
    fn poll(&mut self, timeout_ms: i32) -> anyhow::Result<ControlSignal>;
}

/// 键盘，需要至少一个 highgui 窗口
#[derive(Debug, Default)]
pub struct HighguiKeys;

impl SignalSource for HighguiKeys {
    fn poll(&mut self, timeout_ms: i32) -> anyhow::Result<ControlSignal> {
        let key = highgui::wait_key(timeout_ms)?;
        Ok(ControlSignal::from_key(key))
    }
}

/// Headless runs: never pauses, never quits.
#[derive(Debug, Default)]
pub struct Unattended;

impl SignalSource for Unattended {
    fn poll(&mut self, _timeout_ms: i32) -> anyhow::Result<ControlSignal> {
        Ok(ControlSignal::None)
    }
}
