use std::path::PathBuf;

/// Requests accepted by the presenter from other tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCommand {
    /// Show these local images next, in order, ahead of the rotation.
    Enqueue(Vec<PathBuf>),
}

/// Decoded, oriented and scaled RGBA8 bitmap ready for the window.
#[derive(Debug, Clone)]
pub struct PreparedImageCpu {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Drawable size of the slideshow window in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub width: u32,
    pub height: u32,
}

/// Messages delivered to the viewer on the winit event loop.
#[derive(Debug)]
pub enum ViewerEvent {
    Show(PreparedImageCpu),
    Pending(usize),
    Cancelled,
}
