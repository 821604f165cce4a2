use anyhow::Result;
use tokio::task::JoinSet;
use tracing::error;

/// Wait for every background task, logging their failures, then hand back the
/// foreground outcome. Background errors are logged only; a failed viewer
/// still makes the process exit non-zero.
pub async fn drain_then(mut tasks: JoinSet<Result<()>>, foreground: Result<()>) -> Result<()> {
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("task error: {e:?}"),
            Err(e) => error!("join error: {e}"),
        }
    }
    foreground
}
