use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use image::RgbaImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::task;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Configuration;
use crate::events::{PreparedImageCpu, PresenterCommand, WindowBounds};
use crate::scan;
use crate::tasks::loader;

/// Where the presenter sends its output.
pub trait DisplaySurface {
    /// Current drawable size of the window.
    fn bounds(&self) -> WindowBounds;
    /// Replace the displayed bitmap.
    fn present(&mut self, image: PreparedImageCpu);
    /// Number of priority images still waiting, drawn as a row of markers.
    fn show_pending(&mut self, pending: usize);
}

/// FIFO of paths to show before the rotation resumes.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    entries: VecDeque<PathBuf>,
}

impl PriorityQueue {
    pub fn extend<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.entries.extend(paths);
    }

    pub fn pop(&mut self) -> Option<PathBuf> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Priority,
    Rotation,
}

/// A resolved, decoded image that has not been scaled yet.
#[derive(Debug)]
pub struct Selected {
    pub path: PathBuf,
    pub image: RgbaImage,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Shown(PathBuf),
    /// Queue and rotation were both empty (or nothing could be decoded).
    NoImageAvailable,
}

#[derive(Debug, Clone)]
pub struct PresenterOptions {
    pub library: PathBuf,
    pub slide_interval: Duration,
    pub retry_interval: Duration,
    pub seed: Option<u64>,
}

impl From<&Configuration> for PresenterOptions {
    fn from(cfg: &Configuration) -> Self {
        Self {
            library: cfg.local_dir.clone(),
            slide_interval: cfg.slide_interval,
            retry_interval: cfg.effective_retry_interval(),
            seed: cfg.shuffle_seed,
        }
    }
}

/// Rotation state plus the priority queue.
///
/// Rules:
/// - Priority images are shown first, in arrival order.
/// - Otherwise the cursor walks a shuffled snapshot of the local mirror.
/// - Unreadable rotation entries are evicted on the spot and the walk retries
///   at the same position.
/// - When the cursor wraps, the next visit to position 0 rescans and reshuffles.
pub struct Presenter {
    library: PathBuf,
    slide_interval: Duration,
    retry_interval: Duration,
    queue: PriorityQueue,
    inventory: Vec<PathBuf>,
    cursor: usize,
    restart_pending: bool,
    rng: StdRng,
}

impl Presenter {
    pub fn new(options: PresenterOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            library: options.library,
            slide_interval: options.slide_interval,
            retry_interval: options.retry_interval.min(options.slide_interval),
            queue: PriorityQueue::default(),
            inventory: Vec::new(),
            cursor: 0,
            restart_pending: false,
            rng,
        }
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn inventory(&self) -> &[PathBuf] {
        &self.inventory
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Queue paths for immediate display.
    ///
    /// When the queue was idle the rotation is reshuffled, so it resumes in a
    /// fresh order once the new arrivals have been shown.
    pub fn external_enqueue<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let was_empty = self.queue.is_empty();
        let before = self.queue.len();
        self.queue.extend(paths);
        info!(
            added = self.queue.len() - before,
            pending = self.queue.len(),
            "priority images queued"
        );
        if was_empty {
            debug!(photos = self.inventory.len(), "reshuffling rotation");
            self.inventory.shuffle(&mut self.rng);
        }
    }

    /// Resolve and decode the next image, or `None` when nothing is available.
    pub fn select_next(&mut self) -> Option<Selected> {
        if let Some(path) = self.queue.pop() {
            info!(
                path = %path.display(),
                remaining = self.queue.len(),
                "showing priority image"
            );
            return match loader::decode_rgba8_apply_exif(&path) {
                Ok(image) => Some(Selected {
                    path,
                    image,
                    origin: Origin::Priority,
                }),
                Err(err) => {
                    warn!(error = %err, "dropping unreadable priority image");
                    None
                }
            };
        }
        self.next_from_rotation()
    }

    fn next_from_rotation(&mut self) -> Option<Selected> {
        if self.inventory.is_empty() {
            self.rebuild_inventory();
        }

        loop {
            if self.inventory.is_empty() {
                debug!("no images in rotation");
                return None;
            }
            if self.cursor == 0 && self.restart_pending {
                info!("restarting rotation");
                self.rebuild_inventory();
                continue;
            }

            let path = self.inventory[self.cursor].clone();
            match loader::decode_rgba8_apply_exif(&path) {
                Ok(image) => {
                    debug!(
                        index = self.cursor,
                        total = self.inventory.len(),
                        path = %path.display(),
                        "showing rotation image"
                    );
                    self.advance();
                    return Some(Selected {
                        path,
                        image,
                        origin: Origin::Rotation,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "evicting unreadable image from rotation");
                    self.inventory.remove(self.cursor);
                    if self.cursor >= self.inventory.len() {
                        self.cursor = 0;
                    }
                }
            }
        }
    }

    fn advance(&mut self) {
        self.cursor += 1;
        if self.cursor >= self.inventory.len() {
            self.cursor = 0;
            self.restart_pending = true;
        }
    }

    fn rebuild_inventory(&mut self) {
        let mut found = match scan::scan_library(&self.library) {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "failed to scan local mirror");
                Vec::new()
            }
        };
        found.shuffle(&mut self.rng);
        self.inventory = found;
        self.cursor = 0;
        self.restart_pending = false;
        debug!(photos = self.inventory.len(), "rotation rebuilt");
    }

    /// One selection + render step.
    pub fn tick<S: DisplaySurface + ?Sized>(&mut self, surface: &mut S) -> TickOutcome {
        let outcome = match self.select_next() {
            Some(Selected { path, image, .. }) => {
                match loader::scale_to_fit(&path, image, surface.bounds()) {
                    Ok(prepared) => {
                        surface.present(prepared);
                        TickOutcome::Shown(path)
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to prepare image for display");
                        TickOutcome::NoImageAvailable
                    }
                }
            }
            None => TickOutcome::NoImageAvailable,
        };
        surface.show_pending(self.queue.len());
        outcome
    }

    /// Delay until the next tick given this tick's outcome.
    pub fn delay_after(&self, outcome: &TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Shown(_) => self.slide_interval,
            TickOutcome::NoImageAvailable => self.retry_interval,
        }
    }
}

/// Surface without a window: remembers what would have been shown.
#[derive(Debug)]
pub struct HeadlessSurface {
    bounds: WindowBounds,
    pub shown: Vec<PathBuf>,
    pub pending: usize,
}

impl HeadlessSurface {
    pub fn new(bounds: WindowBounds) -> Self {
        Self {
            bounds,
            shown: Vec::new(),
            pending: 0,
        }
    }
}

impl DisplaySurface for HeadlessSurface {
    fn bounds(&self) -> WindowBounds {
        self.bounds
    }

    fn present(&mut self, image: PreparedImageCpu) {
        self.shown.push(image.path);
    }

    fn show_pending(&mut self, pending: usize) {
        self.pending = pending;
    }
}

/// Drives the slideshow until cancelled.
///
/// Each tick computes its own follow-up deadline; commands are applied as
/// they arrive and never delay the cadence. Decoding and scaling run under
/// `block_in_place`, so this must be driven by a multi-threaded runtime.
#[instrument(skip_all, fields(library = %presenter.library().display()))]
pub async fn run<S: DisplaySurface>(
    mut presenter: Presenter,
    mut commands: Receiver<PresenterCommand>,
    mut surface: S,
    cancel: CancellationToken,
    startup_delay: Duration,
) -> Result<()> {
    let mut next_tick = Instant::now() + startup_delay;

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting presenter task");
                break;
            }

            Some(command) = commands.recv() => match command {
                PresenterCommand::Enqueue(paths) => {
                    presenter.external_enqueue(paths);
                    surface.show_pending(presenter.pending());
                }
            },

            _ = sleep_until(next_tick) => {
                let outcome = task::block_in_place(|| presenter.tick(&mut surface));
                let delay = presenter.delay_after(&outcome);
                match &outcome {
                    TickOutcome::Shown(path) => debug!(
                        path = %path.display(),
                        next_in = %humantime::format_duration(delay),
                        "tick"
                    ),
                    TickOutcome::NoImageAvailable => debug!(
                        pending = presenter.pending(),
                        next_in = %humantime::format_duration(delay),
                        "tick: no image available"
                    ),
                }
                next_tick = Instant::now() + delay;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(8, 6, image::Rgb([120, 60, 30]))
            .save(&path)
            .unwrap();
        path
    }

    fn presenter_for(dir: &Path) -> Presenter {
        Presenter::new(PresenterOptions {
            library: dir.to_path_buf(),
            slide_interval: Duration::from_secs(30),
            retry_interval: Duration::from_secs(1),
            seed: Some(7),
        })
    }

    #[test]
    fn priority_queue_is_fifo() {
        let mut queue = PriorityQueue::default();
        queue.extend([PathBuf::from("a"), PathBuf::from("b")]);
        queue.extend([PathBuf::from("c")]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(PathBuf::from("a")));
        assert_eq!(queue.pop(), Some(PathBuf::from("b")));
        assert_eq!(queue.pop(), Some(PathBuf::from("c")));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn retry_interval_never_exceeds_slide_interval() {
        let presenter = Presenter::new(PresenterOptions {
            library: PathBuf::from("/nonexistent"),
            slide_interval: Duration::from_millis(500),
            retry_interval: Duration::from_secs(1),
            seed: Some(1),
        });
        assert_eq!(
            presenter.delay_after(&TickOutcome::NoImageAvailable),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn cursor_stays_in_bounds_across_laps() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
            write_jpeg(tmp.path(), name);
        }
        let mut presenter = presenter_for(tmp.path());
        let mut seen = Vec::new();
        for _ in 0..12 {
            let selected = presenter.select_next().expect("image available");
            assert_eq!(selected.origin, Origin::Rotation);
            assert!(presenter.cursor() < presenter.inventory().len());
            seen.push(selected.path);
        }
        // Every lap shows every image exactly once.
        for lap in seen.chunks(4) {
            let mut lap = lap.to_vec();
            lap.sort();
            lap.dedup();
            assert_eq!(lap.len(), 4);
        }
    }

    #[test]
    fn missing_rotation_file_is_evicted_and_walk_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write_jpeg(tmp.path(), "a.jpg");
        let b = write_jpeg(tmp.path(), "b.jpg");
        let mut presenter = presenter_for(tmp.path());

        // Prime the rotation, then delete whichever file comes next.
        presenter.select_next().unwrap();
        let next = presenter.inventory()[presenter.cursor()].clone();
        fs::remove_file(&next).unwrap();

        let shown = presenter.select_next().unwrap().path;
        assert_ne!(shown, next);
        assert!(shown == a || shown == b);
        assert_eq!(presenter.inventory().len(), 1);
    }

    #[test]
    fn enqueue_on_idle_queue_reshuffles_rotation() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..16 {
            write_jpeg(tmp.path(), &format!("{i:02}.jpg"));
        }
        let mut presenter = presenter_for(tmp.path());
        presenter.select_next().unwrap();
        let before = presenter.inventory().to_vec();

        presenter.external_enqueue([tmp.path().join("00.jpg")]);
        let after = presenter.inventory().to_vec();
        assert_ne!(before, after, "rotation should be reshuffled");

        let mut sorted_before = before.clone();
        let mut sorted_after = after.clone();
        sorted_before.sort();
        sorted_after.sort();
        assert_eq!(sorted_before, sorted_after);

        // A second enqueue while items are pending leaves the order alone.
        presenter.external_enqueue([tmp.path().join("01.jpg")]);
        assert_eq!(presenter.inventory(), after.as_slice());
    }

    #[test]
    fn unreadable_priority_image_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut presenter = presenter_for(tmp.path());
        presenter.external_enqueue([tmp.path().join("never-arrived.jpg")]);

        let mut surface = HeadlessSurface::new(WindowBounds {
            width: 80,
            height: 60,
        });
        assert_eq!(presenter.tick(&mut surface), TickOutcome::NoImageAvailable);
        assert_eq!(presenter.pending(), 0);
        assert_eq!(surface.pending, 0);
        assert!(surface.shown.is_empty());
    }

    #[test]
    fn pending_indicator_refreshes_when_nothing_is_shown() {
        let tmp = tempfile::tempdir().unwrap();
        let mut presenter = presenter_for(tmp.path());
        presenter.external_enqueue([
            tmp.path().join("lost-1.jpg"),
            tmp.path().join("lost-2.jpg"),
            tmp.path().join("lost-3.jpg"),
        ]);

        let mut surface = HeadlessSurface::new(WindowBounds {
            width: 80,
            height: 60,
        });
        surface.pending = usize::MAX;
        for expected in [2, 1, 0] {
            assert_eq!(presenter.tick(&mut surface), TickOutcome::NoImageAvailable);
            assert_eq!(surface.pending, expected);
        }
        assert!(surface.shown.is_empty());
    }

    #[test]
    fn tick_reports_pending_depth() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write_jpeg(tmp.path(), "a.jpg");
        let b = write_jpeg(tmp.path(), "b.jpg");
        let c = write_jpeg(tmp.path(), "c.jpg");
        let mut presenter = presenter_for(tmp.path());
        presenter.external_enqueue([a.clone(), b, c]);

        let mut surface = HeadlessSurface::new(WindowBounds {
            width: 80,
            height: 60,
        });
        assert_eq!(presenter.tick(&mut surface), TickOutcome::Shown(a.clone()));
        assert_eq!(surface.pending, 2);
        assert_eq!(surface.shown, vec![a]);
        assert_eq!(
            presenter.delay_after(&TickOutcome::Shown(PathBuf::new())),
            Duration::from_secs(30)
        );
    }
}
