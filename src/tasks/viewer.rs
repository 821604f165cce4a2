use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use softbuffer::{Context as SoftContext, Surface};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId, WindowLevel};

use crate::config::WindowOptions;
use crate::events::{PreparedImageCpu, ViewerEvent, WindowBounds};
use crate::platform::monitors::{FullscreenToggle, Placement, Rect};
use crate::tasks::presenter::DisplaySurface;

const BACKGROUND: u32 = 0x0000_0000;
const MARKER_COLOR: u32 = 0x00ff_ffff;
const MARKER_SIZE: u32 = 12;
const MARKER_GAP: u32 = 6;
const MARKER_MARGIN: u32 = 16;

/// Presenter-side end of the window: thread-safe and cheap to clone.
#[derive(Clone)]
pub struct ViewerHandle {
    proxy: EventLoopProxy<ViewerEvent>,
    bounds: watch::Receiver<WindowBounds>,
}

impl ViewerHandle {
    /// Ask the event loop to close the window and return from `Viewer::run`.
    pub fn request_close(&self) {
        self.send(ViewerEvent::Cancelled);
    }

    fn send(&self, event: ViewerEvent) {
        if self.proxy.send_event(event).is_err() {
            debug!("viewer event loop already closed");
        }
    }
}

impl DisplaySurface for ViewerHandle {
    fn bounds(&self) -> WindowBounds {
        *self.bounds.borrow()
    }

    fn present(&mut self, image: PreparedImageCpu) {
        self.send(ViewerEvent::Show(image));
    }

    fn show_pending(&mut self, pending: usize) {
        self.send(ViewerEvent::Pending(pending));
    }
}

/// The slideshow window. Must be created and run on the main thread.
pub struct Viewer {
    event_loop: EventLoop<ViewerEvent>,
    bounds_tx: watch::Sender<WindowBounds>,
    handle: ViewerHandle,
}

impl Viewer {
    pub fn new(options: &WindowOptions) -> Result<Self> {
        let event_loop = EventLoop::<ViewerEvent>::with_user_event()
            .build()
            .context("failed to create event loop")?;
        let (bounds_tx, bounds_rx) = watch::channel(WindowBounds {
            width: options.width,
            height: options.height,
        });
        let handle = ViewerHandle {
            proxy: event_loop.create_proxy(),
            bounds: bounds_rx,
        };
        Ok(Self {
            event_loop,
            bounds_tx,
            handle,
        })
    }

    pub fn handle(&self) -> ViewerHandle {
        self.handle.clone()
    }

    /// Blocks until the window closes or a `ViewerEvent::Cancelled` arrives.
    /// Closing the window cancels `cancel`.
    pub fn run(self, options: &WindowOptions, cancel: CancellationToken) -> Result<()> {
        let mut app = ViewerApp::new(options.clone(), self.bounds_tx, cancel);
        self.event_loop.run_app(&mut app)?;
        match app.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type WindowHandle = Arc<Window>;

struct ViewerApp {
    options: WindowOptions,
    bounds_tx: watch::Sender<WindowBounds>,
    cancel: CancellationToken,
    window: Option<WindowHandle>,
    context: Option<SoftContext<WindowHandle>>,
    surface: Option<Surface<WindowHandle, WindowHandle>>,
    current: Option<PreparedImageCpu>,
    pending: usize,
    fullscreen: FullscreenToggle,
    needs_redraw: bool,
    fatal: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(
        options: WindowOptions,
        bounds_tx: watch::Sender<WindowBounds>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            options,
            bounds_tx,
            cancel,
            window: None,
            context: None,
            surface: None,
            current: None,
            pending: 0,
            fullscreen: FullscreenToggle::default(),
            needs_redraw: true,
            fatal: None,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }

        let attrs = Window::default_attributes()
            .with_title(self.options.title.clone())
            .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
        let window = WindowHandle::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        let context = SoftContext::new(window.clone())
            .map_err(|e| anyhow!("failed to create softbuffer context: {e}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|e| anyhow!("failed to create softbuffer surface: {e}"))?;

        self.context = Some(context);
        self.surface = Some(surface);
        let size = window.inner_size();
        self.window = Some(window);
        self.handle_resize(size);
        info!(width = size.width, height = size.height, "viewer window created");

        if self.options.start_fullscreen {
            self.toggle_fullscreen();
        }
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        // Minimized windows report 0x0; keep the last real bounds for scaling.
        let Some(bounds) = usable_bounds(size) else {
            debug!(width = size.width, height = size.height, "ignoring degenerate window size");
            return;
        };
        if let Some(surface) = self.surface.as_mut()
            && let (Some(width), Some(height)) =
                (NonZeroU32::new(bounds.width), NonZeroU32::new(bounds.height))
            && let Err(err) = surface.resize(width, height)
        {
            warn!(error = %err, "failed to resize surface");
        }
        self.bounds_tx.send_replace(bounds);
        self.needs_redraw = true;
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        if matches!(
            event.logical_key,
            Key::Named(NamedKey::F11) | Key::Named(NamedKey::Escape)
        ) {
            self.toggle_fullscreen();
        }
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let position = window.outer_position().unwrap_or_else(|err| {
            debug!(error = %err, "window position unavailable; assuming origin");
            PhysicalPosition::new(0, 0)
        });
        let size = window.inner_size();
        let current = Rect::new(position.x, position.y, size.width, size.height);
        let monitors: Vec<Rect> = window
            .available_monitors()
            .map(|m| {
                let p = m.position();
                let s = m.size();
                Rect::new(p.x, p.y, s.width, s.height)
            })
            .collect();

        match self.fullscreen.toggle(current, &monitors) {
            Placement::Fullscreen(monitor) => {
                info!(?monitor, "entering fullscreen");
                window.set_decorations(false);
                window.set_outer_position(PhysicalPosition::new(monitor.x, monitor.y));
                let _ = window.request_inner_size(PhysicalSize::new(monitor.width, monitor.height));
                window.set_window_level(WindowLevel::AlwaysOnTop);
                window.focus_window();
            }
            Placement::Windowed(saved) => {
                info!(?saved, "leaving fullscreen");
                window.set_window_level(WindowLevel::Normal);
                window.set_decorations(true);
                window.set_outer_position(PhysicalPosition::new(saved.x, saved.y));
                let _ = window.request_inner_size(PhysicalSize::new(saved.width, saved.height));
            }
            Placement::NoMonitor => {
                warn!(x = current.x, y = current.y, "no monitor found; staying windowed");
            }
        }
        self.needs_redraw = true;
    }

    fn render(&mut self) {
        let (Some(window), Some(surface)) = (self.window.as_ref(), self.surface.as_mut()) else {
            return;
        };
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        match surface.buffer_mut() {
            Ok(mut buffer) => {
                compose_frame(&mut buffer, width, height, self.current.as_ref(), self.pending);
                if let Err(err) = buffer.present() {
                    warn!(error = %err, "failed to present frame");
                }
            }
            Err(err) => warn!(error = %err, "failed to acquire frame buffer"),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!(error = %err, "viewer failed");
        self.fatal = Some(err);
        self.cancel.cancel();
        event_loop.exit();
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.ensure_window(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Show(image) => {
                debug!(path = %image.path.display(), "frame received");
                self.current = Some(image);
                self.needs_redraw = true;
            }
            ViewerEvent::Pending(pending) => {
                if pending != self.pending {
                    self.pending = pending;
                    self.needs_redraw = true;
                }
            }
            ViewerEvent::Cancelled => {
                info!("cancel received; closing viewer");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("window closed");
                self.cancel.cancel();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::RedrawRequested => self.render(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.needs_redraw {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
            self.needs_redraw = false;
        }
    }
}

/// Bounds worth publishing to the presenter, or `None` while the window has
/// no drawable area.
pub fn usable_bounds(size: PhysicalSize<u32>) -> Option<WindowBounds> {
    (size.width > 0 && size.height > 0).then_some(WindowBounds {
        width: size.width,
        height: size.height,
    })
}

/// Paint one frame: black background, the image centred (clipped if the
/// window shrank since it was scaled), and one square per pending image
/// along the bottom-left edge.
pub fn compose_frame(
    buffer: &mut [u32],
    width: u32,
    height: u32,
    image: Option<&PreparedImageCpu>,
    pending: usize,
) {
    buffer.fill(BACKGROUND);
    let stride = width as usize;
    if buffer.len() < stride * height as usize {
        return;
    }

    if let Some(img) = image {
        let off_x = width.saturating_sub(img.width) / 2;
        let off_y = height.saturating_sub(img.height) / 2;
        let skip_x = img.width.saturating_sub(width) / 2;
        let skip_y = img.height.saturating_sub(height) / 2;
        let cols = img.width.min(width) as usize;
        let rows = img.height.min(height);

        for row in 0..rows {
            let src_row = (row + skip_y) as usize * img.width as usize;
            let dst_row = (row + off_y) as usize * stride;
            for col in 0..cols {
                let src = (src_row + col + skip_x as usize) * 4;
                let Some(px) = img.pixels.get(src..src + 4) else {
                    return;
                };
                buffer[dst_row + off_x as usize + col] =
                    (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]);
            }
        }
    }

    if pending == 0 || height < MARKER_SIZE + MARKER_MARGIN {
        return;
    }
    let top = height - MARKER_MARGIN - MARKER_SIZE;
    let mut left = MARKER_MARGIN;
    for _ in 0..pending {
        if left + MARKER_SIZE > width {
            break;
        }
        for y in top..top + MARKER_SIZE {
            let start = y as usize * stride + left as usize;
            buffer[start..start + MARKER_SIZE as usize].fill(MARKER_COLOR);
        }
        left += MARKER_SIZE + MARKER_GAP;
    }
}
