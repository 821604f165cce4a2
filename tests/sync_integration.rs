use device_mirror_slideshow::error::{FetchError, RemoteCommandError};
use device_mirror_slideshow::events::PresenterCommand;
use device_mirror_slideshow::platform::device::RemoteDevice;
use device_mirror_slideshow::tasks::sync::{self, SyncAgent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const REMOTE_DIR: &str = "/sdcard/DCIM";

#[derive(Default)]
struct StubState {
    listing: Vec<String>,
    listing_fails: bool,
    failing_fetches: HashSet<String>,
    fetched: Vec<String>,
}

#[derive(Clone, Default)]
struct StubDevice {
    state: Arc<Mutex<StubState>>,
}

impl StubDevice {
    fn set_listing(&self, names: &[&str]) {
        self.state.lock().unwrap().listing = names.iter().map(|s| s.to_string()).collect();
    }

    fn set_listing_fails(&self, fails: bool) {
        self.state.lock().unwrap().listing_fails = fails;
    }

    fn fail_fetch(&self, name: &str, fail: bool) {
        let remote = format!("{REMOTE_DIR}/{name}");
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_fetches.insert(remote);
        } else {
            state.failing_fetches.remove(&remote);
        }
    }

    fn take_fetched(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().unwrap().fetched)
    }
}

impl RemoteDevice for StubDevice {
    async fn list_dir(&self, dir: &str) -> Result<Vec<String>, RemoteCommandError> {
        assert_eq!(dir, REMOTE_DIR);
        let state = self.state.lock().unwrap();
        if state.listing_fails {
            return Err(RemoteCommandError::Failed {
                command: "adb shell ls".to_string(),
                status: "exit code 1".to_string(),
                stderr: "device offline".to_string(),
            });
        }
        Ok(state.listing.clone())
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<(), FetchError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(remote_path.to_string());
        if state.failing_fetches.contains(remote_path) {
            return Err(FetchError::Remote {
                remote: remote_path.to_string(),
                source: RemoteCommandError::Failed {
                    command: "adb pull".to_string(),
                    status: "exit code 1".to_string(),
                    stderr: "transfer interrupted".to_string(),
                },
            });
        }
        std::fs::write(local_path, b"jpeg").map_err(|source| FetchError::Io {
            path: local_path.to_path_buf(),
            source,
        })
    }
}

fn agent(device: &StubDevice, local: &Path) -> SyncAgent<StubDevice> {
    SyncAgent::new(device.clone(), REMOTE_DIR, local)
}

fn remote(name: &str) -> String {
    format!("{REMOTE_DIR}/{name}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetches_only_new_remote_images() {
    let tmp = tempfile::tempdir().unwrap();
    let device = StubDevice::default();
    let mut agent = agent(&device, tmp.path());

    device.set_listing(&["a.jpg", "b.JPEG", "notes.txt"]);
    let report = agent.poll().await.unwrap();
    assert_eq!(
        report.fetched,
        vec![tmp.path().join("a.jpg"), tmp.path().join("b.JPEG")]
    );
    assert_eq!(report.ignored, 1);
    assert_eq!(device.take_fetched(), vec![remote("a.jpg"), remote("b.JPEG")]);

    // Second listing: one old, one new.
    device.set_listing(&["a.jpg", "b.JPEG", "c.jpg"]);
    let report = agent.poll().await.unwrap();
    assert_eq!(report.fetched, vec![tmp.path().join("c.jpg")]);
    assert_eq!(device.take_fetched(), vec![remote("c.jpg")]);

    // Nothing new.
    let report = agent.poll().await.unwrap();
    assert!(report.fetched.is_empty());
    assert!(device.take_fetched().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_jpeg_names_are_never_fetched() {
    let tmp = tempfile::tempdir().unwrap();
    let device = StubDevice::default();
    let mut agent = agent(&device, tmp.path());

    device.set_listing(&["x.jpg", "y.png"]);
    agent.poll().await.unwrap();
    agent.poll().await.unwrap();
    assert_eq!(device.take_fetched(), vec![remote("x.jpg")]);
    assert!(tmp.path().join("x.jpg").exists());
    assert!(!tmp.path().join("y.png").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn existing_local_file_is_seen_but_not_fetched() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.jpg"), b"already here").unwrap();
    let device = StubDevice::default();
    let mut agent = agent(&device, tmp.path());

    device.set_listing(&["a.jpg"]);
    let report = agent.poll().await.unwrap();
    assert!(report.fetched.is_empty());
    assert_eq!(report.already_local, vec!["a.jpg".to_string()]);
    assert!(agent.seen().contains("a.jpg"));
    assert!(device.take_fetched().is_empty());
    assert_eq!(
        std::fs::read(tmp.path().join("a.jpg")).unwrap(),
        b"already here"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_is_retried_on_next_poll() {
    let tmp = tempfile::tempdir().unwrap();
    let device = StubDevice::default();
    let mut agent = agent(&device, tmp.path());

    device.set_listing(&["a.jpg", "b.jpg"]);
    device.fail_fetch("b.jpg", true);
    let report = agent.poll().await.unwrap();
    assert_eq!(report.fetched, vec![tmp.path().join("a.jpg")]);
    assert_eq!(report.failed, vec!["b.jpg".to_string()]);
    assert!(!agent.seen().contains("b.jpg"));
    device.take_fetched();

    device.fail_fetch("b.jpg", false);
    let report = agent.poll().await.unwrap();
    assert_eq!(report.fetched, vec![tmp.path().join("b.jpg")]);
    assert_eq!(device.take_fetched(), vec![remote("b.jpg")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_listing_keeps_previous_seen_set() {
    let tmp = tempfile::tempdir().unwrap();
    let device = StubDevice::default();
    let mut agent = agent(&device, tmp.path());

    device.set_listing(&["a.jpg"]);
    agent.poll().await.unwrap();

    device.set_listing_fails(true);
    let err = agent.poll().await.unwrap_err();
    assert!(matches!(err, RemoteCommandError::Failed { .. }));
    assert!(agent.seen().contains("a.jpg"));

    device.set_listing_fails(false);
    let report = agent.poll().await.unwrap();
    assert!(report.fetched.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn seen_set_is_replaced_not_merged() {
    let tmp = tempfile::tempdir().unwrap();
    let device = StubDevice::default();
    let mut agent = agent(&device, tmp.path());

    device.set_listing(&["a.jpg", "b.jpg"]);
    agent.poll().await.unwrap();

    device.set_listing(&["b.jpg"]);
    agent.poll().await.unwrap();
    let seen: Vec<&String> = agent.seen().iter().collect();
    assert_eq!(seen, vec!["b.jpg"]);

    // "a.jpg" reappears after the local copy was removed: it is fetched again.
    std::fs::remove_file(tmp.path().join("a.jpg")).unwrap();
    device.take_fetched();
    device.set_listing(&["a.jpg", "b.jpg"]);
    let report = agent.poll().await.unwrap();
    assert_eq!(report.fetched, vec![tmp.path().join("a.jpg")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetched_files_are_sent_to_the_presenter_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let device = StubDevice::default();
    let (tx, mut rx) = mpsc::channel::<PresenterCommand>(8);
    let mut agent = agent(&device, tmp.path()).with_notifier(tx);

    device.set_listing(&["b.jpg", "a.jpg", "c.png"]);
    agent.poll().await.unwrap();

    let mut queued: Vec<PathBuf> = Vec::new();
    while let Ok(PresenterCommand::Enqueue(paths)) = rx.try_recv() {
        queued.extend(paths);
    }
    assert_eq!(
        queued,
        vec![tmp.path().join("a.jpg"), tmp.path().join("b.jpg")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_loop_polls_until_cancelled() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("stale.jpg.part"), b"half").unwrap();
    let device = StubDevice::default();
    device.set_listing(&["a.jpg"]);
    let (tx, mut rx) = mpsc::channel::<PresenterCommand>(8);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(sync::run(
        agent(&device, tmp.path()).with_notifier(tx),
        Duration::from_millis(20),
        cancel.clone(),
    ));

    let PresenterCommand::Enqueue(first) =
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for first fetch")
            .expect("sync channel closed");
    assert_eq!(first, vec![tmp.path().join("a.jpg")]);
    assert!(!tmp.path().join("stale.jpg.part").exists());

    // A file that appears later is picked up by a subsequent poll.
    device.set_listing(&["a.jpg", "b.jpg"]);
    let PresenterCommand::Enqueue(second) =
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for second fetch")
            .expect("sync channel closed");
    assert_eq!(second, vec![tmp.path().join("b.jpg")]);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("sync task did not stop")
        .unwrap()
        .unwrap();
}
