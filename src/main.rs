use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use device_mirror_slideshow::config::Configuration;
use device_mirror_slideshow::events::{PresenterCommand, WindowBounds};
use device_mirror_slideshow::platform::device::AdbDevice;
use device_mirror_slideshow::scan;
use device_mirror_slideshow::tasks::presenter::{
    self, HeadlessSurface, Presenter, PresenterOptions, TickOutcome,
};
use device_mirror_slideshow::tasks::shutdown;
use device_mirror_slideshow::tasks::sync::{self, SyncAgent};
use device_mirror_slideshow::tasks::viewer::Viewer;

#[derive(Debug, Parser)]
#[command(
    name = "mirror-slideshow",
    version,
    about = "Mirror a device's photo folder and show it as a slideshow"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Local images to show first, before anything else
    #[arg(long = "show", value_name = "FILE", num_args = 1..)]
    show: Vec<PathBuf>,
    /// Run a single sync cycle, print the fetched files and exit
    #[arg(long = "sync-once", conflicts_with = "rotation_dry_run")]
    sync_once: bool,
    /// Print the next N rotation picks without opening a window
    #[arg(long = "rotation-dry-run", value_name = "ITERATIONS")]
    rotation_dry_run: Option<usize>,
    /// Do not poll the device; only show what is already mirrored
    #[arg(long = "no-sync")]
    no_sync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        show,
        sync_once,
        rotation_dry_run,
        no_sync,
    } = Args::parse();

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    scan::ensure_library_dir(&cfg.local_dir)?;

    if sync_once {
        return run_sync_once(&cfg).await;
    }

    if let Some(iterations) = rotation_dry_run {
        run_rotation_dry_run(&cfg, iterations);
        return Ok(());
    }

    let (presenter_tx, presenter_rx) = mpsc::channel::<PresenterCommand>(64); // Sync/CLI -> Presenter
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    if !show.is_empty() {
        presenter_tx
            .send(PresenterCommand::Enqueue(show))
            .await
            .context("failed to queue --show images")?;
    }

    let viewer = Viewer::new(&cfg.window).context("failed to initialise display")?;
    let mut tasks = JoinSet::new();

    // SyncAgent
    if no_sync {
        tracing::info!("device sync disabled");
    } else {
        tasks.spawn({
            let agent = SyncAgent::new(
                AdbDevice::new(&cfg.device),
                cfg.remote_dir.clone(),
                cfg.local_dir.clone(),
            )
            .with_notifier(presenter_tx.clone());
            let interval = cfg.poll_interval;
            let cancel = cancel.clone();
            async move {
                sync::run(agent, interval, cancel)
                    .await
                    .context("sync task failed")
            }
        });
    }
    drop(presenter_tx);

    // Presenter
    tasks.spawn({
        let presenter = Presenter::new(PresenterOptions::from(&cfg));
        let surface = viewer.handle();
        let cancel = cancel.clone();
        let startup_delay = cfg.startup_delay;
        async move {
            presenter::run(presenter, presenter_rx, surface, cancel, startup_delay)
                .await
                .context("presenter task failed")
        }
    });

    // Closes the window once anything else cancels
    tasks.spawn({
        let handle = viewer.handle();
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            handle.request_close();
            Ok(())
        }
    });

    // Run the windowed viewer on the main thread (blocking) after spawning other tasks
    // This call returns when the window closes or cancellation occurs
    let viewer_result = viewer.run(&cfg.window, cancel.clone()).context("viewer failed");
    if let Err(e) = &viewer_result {
        tracing::error!("{e:?}");
    }
    // Ensure other tasks are asked to stop
    cancel.cancel();

    // Drain JoinSet, then fail the process if the display did
    shutdown::drain_then(tasks, viewer_result).await
}

async fn run_sync_once(cfg: &Configuration) -> Result<()> {
    let mut agent = SyncAgent::new(
        AdbDevice::new(&cfg.device),
        cfg.remote_dir.clone(),
        cfg.local_dir.clone(),
    );
    agent.remove_stale_partials()?;
    let report = agent
        .poll()
        .await
        .with_context(|| format!("failed to list {}", cfg.remote_dir))?;

    println!(
        "# sync once\n# remote: {}\n# local: {}\n# fetched: {}  already local: {}  failed: {}  ignored: {}\n",
        cfg.remote_dir,
        cfg.local_dir.display(),
        report.fetched.len(),
        report.already_local.len(),
        report.failed.len(),
        report.ignored
    );
    for path in &report.fetched {
        println!("{}", path.display());
    }
    for name in &report.failed {
        println!("FAILED {name}");
    }
    Ok(())
}

fn run_rotation_dry_run(cfg: &Configuration, iterations: usize) {
    let mut presenter = Presenter::new(PresenterOptions::from(cfg));
    let mut surface = HeadlessSurface::new(WindowBounds {
        width: cfg.window.width,
        height: cfg.window.height,
    });

    println!(
        "# rotation dry run\n# library: {}\n# iterations: {}\n# seed: {}\n",
        cfg.local_dir.display(),
        iterations,
        cfg.shuffle_seed
            .map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    for i in 0..iterations {
        match presenter.tick(&mut surface) {
            TickOutcome::Shown(path) => println!("{:>4}: {}", i + 1, path.display()),
            TickOutcome::NoImageAvailable => {
                println!(
                    "(no images available under {})",
                    cfg.local_dir.display()
                );
                break;
            }
        }
    }
}
