use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    /// Directory on the device to mirror.
    pub remote_dir: String,
    /// Local mirror directory; created at startup when missing.
    pub local_dir: PathBuf,
    /// Delay between two remote listings.
    #[serde(
        default = "Configuration::default_poll_interval",
        with = "humantime_serde"
    )]
    pub poll_interval: Duration,
    /// Time each image stays on screen.
    #[serde(
        default = "Configuration::default_slide_interval",
        with = "humantime_serde"
    )]
    pub slide_interval: Duration,
    /// Delay before the next tick when nothing could be shown.
    #[serde(
        default = "Configuration::default_retry_interval",
        with = "humantime_serde"
    )]
    pub retry_interval: Duration,
    /// Delay before the first tick so the window can settle.
    #[serde(
        default = "Configuration::default_startup_delay",
        with = "humantime_serde"
    )]
    pub startup_delay: Duration,
    /// Optional deterministic seed for rotation shuffles.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
    #[serde(default)]
    pub device: DeviceOptions,
    #[serde(default)]
    pub window: WindowOptions,
}

impl Configuration {
    const fn default_poll_interval() -> Duration {
        Duration::from_secs(2)
    }

    const fn default_slide_interval() -> Duration {
        Duration::from_secs(30)
    }

    const fn default_retry_interval() -> Duration {
        Duration::from_secs(1)
    }

    const fn default_startup_delay() -> Duration {
        Duration::from_secs(1)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.remote_dir.trim().is_empty(),
            "remote-dir must not be blank"
        );
        ensure!(
            !self.local_dir.as_os_str().is_empty(),
            "local-dir must not be empty"
        );
        ensure!(
            !self.poll_interval.is_zero(),
            "poll-interval must be greater than zero"
        );
        ensure!(
            !self.slide_interval.is_zero(),
            "slide-interval must be greater than zero"
        );
        ensure!(
            !self.retry_interval.is_zero(),
            "retry-interval must be greater than zero"
        );
        self.device.validate()?;
        self.window.validate()?;
        Ok(self)
    }

    /// Retry delay actually used by the presenter; never longer than a normal slide.
    pub fn effective_retry_interval(&self) -> Duration {
        self.retry_interval.min(self.slide_interval)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceOptions {
    /// Device bridge binary (`adb`).
    pub program: String,
    /// Arguments placed before every command, e.g. `["-H", "host"]`.
    pub extra_args: Vec<String>,
    /// Target a specific device when several are attached.
    pub serial: Option<String>,
    /// Upper bound for one listing or transfer command.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl DeviceOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.program.trim().is_empty(),
            "device.program must not be blank"
        );
        ensure!(
            !self.command_timeout.is_zero(),
            "device.command-timeout must be greater than zero"
        );
        Ok(())
    }
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            program: "adb".to_string(),
            extra_args: Vec::new(),
            serial: None,
            command_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WindowOptions {
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Enter fullscreen on the window's monitor as soon as it is mapped.
    pub start_fullscreen: bool,
}

impl WindowOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            "window.width and window.height must be greater than zero"
        );
        Ok(())
    }
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Device Mirror Slideshow".to_string(),
            start_fullscreen: false,
        }
    }
}
