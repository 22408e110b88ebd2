use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Spawns a drawing task under a stable name. With `tokio_unstable` the name
/// is attached to the task itself; otherwise the future runs inside a
/// `task` span carrying it.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let task_name = name.into();
    #[cfg(tokio_unstable)]
    {
        tokio::task::Builder::new().name(&task_name).spawn(future)
    }
    #[cfg(not(tokio_unstable))]
    {
        use tracing::Instrument;
        let span = tracing::info_span!("task", %task_name);
        tokio::spawn(future.instrument(span))
    }
}

/// Sleeps until `deadline`, or forever when there is none. Meant as a
/// `select!` arm for an optional timer.
pub async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
