use opencv::core::Mat;
use opencv::highgui;

pub trait FrameSink {
    fn show(&mut self, frame: &Mat) -> anyhow::Result<()>;
}

/// 显示窗口，drop 时销毁
pub struct HighguiWindow {
    name: String,
}

impl HighguiWindow {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl FrameSink for HighguiWindow {
    fn show(&mut self, frame: &Mat) -> anyhow::Result<()> {
        highgui::imshow(&self.name, frame)?;
        Ok(())
    }
}

impl Drop for HighguiWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.name) {
            log::warn!("failed to destroy window {}: {}", self.name, e);
        }
    }
}

/// Discards every frame.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _frame: &Mat) -> anyhow::Result<()> {
        Ok(())
    }
}
