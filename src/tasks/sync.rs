use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::RemoteCommandError;
use crate::events::PresenterCommand;
use crate::platform::device::{PARTIAL_SUFFIX, RemoteDevice, remote_path};
use crate::scan;

/// What one poll did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Local paths of files transferred this cycle, in listing order.
    pub fetched: Vec<PathBuf>,
    /// New names that were already present in the local mirror.
    pub already_local: Vec<String>,
    /// New names whose transfer failed; they are retried next poll.
    pub failed: Vec<String>,
    /// New names skipped because they are not mirrored images.
    pub ignored: usize,
}

/// Mirrors new images from one remote directory into the local mirror.
pub struct SyncAgent<D> {
    device: D,
    remote_dir: String,
    local_dir: PathBuf,
    seen: HashSet<String>,
    notify: Option<Sender<PresenterCommand>>,
}

impl<D: RemoteDevice> SyncAgent<D> {
    pub fn new(device: D, remote_dir: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            remote_dir: remote_dir.into(),
            local_dir: local_dir.into(),
            seen: HashSet::new(),
            notify: None,
        }
    }

    /// Send every successfully fetched path to the presenter.
    pub fn with_notifier(mut self, notify: Sender<PresenterCommand>) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    /// List the remote directory once and fetch whatever is new.
    ///
    /// The seen set is replaced by the current listing, minus names whose
    /// transfer failed. A failed listing leaves it untouched.
    pub async fn poll(&mut self) -> Result<SyncReport, RemoteCommandError> {
        let mut current = self.device.list_dir(&self.remote_dir).await?;
        current.sort();
        current.dedup();

        let mut report = SyncReport::default();
        for name in current.iter().filter(|name| !self.seen.contains(*name)) {
            if !is_mirrorable(name) {
                debug!(name = %name, "ignoring remote entry");
                report.ignored += 1;
                continue;
            }

            let local = self.local_dir.join(name);
            if local.exists() {
                debug!(path = %local.display(), "already mirrored");
                report.already_local.push(name.clone());
                continue;
            }

            let remote = remote_path(&self.remote_dir, name);
            match self.device.fetch(&remote, &local).await {
                Ok(()) => {
                    info!(path = %local.display(), "fetched new image");
                    self.notify_presenter(&local).await;
                    report.fetched.push(local);
                }
                Err(err) => {
                    warn!(name = %name, error = %err, "fetch failed; will retry next poll");
                    report.failed.push(name.clone());
                }
            }
        }

        self.seen = {
            let failed: HashSet<&str> = report.failed.iter().map(String::as_str).collect();
            current
                .into_iter()
                .filter(|name| !failed.contains(name.as_str()))
                .collect()
        };

        Ok(report)
    }

    async fn notify_presenter(&self, path: &Path) {
        let Some(tx) = &self.notify else {
            return;
        };
        if tx
            .send(PresenterCommand::Enqueue(vec![path.to_path_buf()]))
            .await
            .is_err()
        {
            debug!(path = %path.display(), "presenter gone; not queueing");
        }
    }

    /// Delete `*.part` leftovers from an interrupted earlier run.
    pub fn remove_stale_partials(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in WalkDir::new(&self.local_dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            let is_partial = entry.file_type().is_file()
                && entry.path().extension().and_then(OsStr::to_str) == Some(PARTIAL_SUFFIX);
            if !is_partial {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "removed stale partial download");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// Plain image file name that is safe to join onto the mirror directory.
fn is_mirrorable(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".." && scan::is_image_name(name)
}

#[instrument(
    skip_all,
    fields(remote = %agent.remote_dir, local = %agent.local_dir.display())
)]
pub async fn run<D: RemoteDevice>(
    mut agent: SyncAgent<D>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    match agent.remove_stale_partials() {
        Ok(0) => {}
        Ok(n) => info!(removed = n, "cleaned up partial downloads"),
        Err(err) => warn!(error = %err, "failed to clean up partial downloads"),
    }

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting sync task");
                break;
            }

            result = agent.poll() => match result {
                Ok(report) if report.fetched.is_empty() && report.failed.is_empty() => {
                    debug!(seen = agent.seen.len(), "no new images on device");
                }
                Ok(report) => info!(
                    fetched = report.fetched.len(),
                    failed = report.failed.len(),
                    already_local = report.already_local.len(),
                    "sync cycle complete"
                ),
                Err(err) => warn!(error = %err, "remote listing failed"),
            }
        }

        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting sync task");
                break;
            }
            _ = sleep(interval) => {}
        }
    }
    Ok(())
}
