//! Monitor-aware fullscreen placement.
//!
//! Fullscreen here means "cover the monitor that holds the window's top-left
//! corner", so the slideshow stays on the screen the user dragged it to.

/// Rectangle in desktop coordinates (physical pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: the right and bottom edges belong to the neighbour.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let left = i64::from(self.x);
        let top = i64::from(self.y);
        let right = left + i64::from(self.width);
        let bottom = top + i64::from(self.height);
        left <= x && x < right && top <= y && y < bottom
    }
}

/// First monitor (in enumeration order) containing the point.
pub fn monitor_containing(monitors: &[Rect], x: i32, y: i32) -> Option<Rect> {
    monitors.iter().copied().find(|m| m.contains(x, y))
}

/// What the window should do after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Cover this monitor and stay above other windows.
    Fullscreen(Rect),
    /// Return to these windowed bounds.
    Windowed(Rect),
    /// The window sits on no known monitor (e.g. mid-move); nothing changes.
    NoMonitor,
}

#[derive(Debug, Default)]
pub struct FullscreenToggle {
    windowed: Option<Rect>,
}

impl FullscreenToggle {
    pub fn is_fullscreen(&self) -> bool {
        self.windowed.is_some()
    }

    pub fn toggle(&mut self, window: Rect, monitors: &[Rect]) -> Placement {
        if let Some(saved) = self.windowed.take() {
            return Placement::Windowed(saved);
        }
        match monitor_containing(monitors, window.x, window.y) {
            Some(monitor) => {
                self.windowed = Some(window);
                Placement::Fullscreen(monitor)
            }
            None => Placement::NoMonitor,
        }
    }
}
