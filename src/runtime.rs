use std::future::Future;
use std::io;
use std::time::Duration;

/// How long shutdown waits for blocking work (a hung mount lookup) before
/// abandoning it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Run `future` to completion on a fresh runtime, then shut the runtime down
/// without waiting more than `grace` for leftover blocking tasks.
pub fn block_on<F: Future>(future: F, grace: Duration) -> io::Result<F::Output> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("camsync")
        .build()?;

    let output = rt.block_on(future);
    rt.shutdown_timeout(grace);
    Ok(output)
}
