use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A device command (listing or transfer) could not be completed.
///
/// Always transient: the sync loop logs it and tries again on the next poll.
#[derive(Debug, Error)]
pub enum RemoteCommandError {
    /// The command binary could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but reported failure.
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The command did not finish within the configured timeout.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

/// Pulling a single file from the device failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to pull {remote}: {source}")]
    Remote {
        remote: String,
        #[source]
        source: RemoteCommandError,
    },

    #[error("failed to move fetched file into {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A local image could not be turned into a displayable bitmap.
///
/// Permanent for the file within the current rotation lap.
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to scale {}: {reason}", .path.display())]
    Resize { path: PathBuf, reason: String },
}
