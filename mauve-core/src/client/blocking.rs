//! Running async transport work from the synchronous [`TransportExecutor`] entry point.
//!
//! [`TransportExecutor`]: super::TransportExecutor
use std::cell::Cell;
use std::future::Future;
use tokio::runtime::{Handle, RuntimeFlavor};

thread_local! {
    static ON_BLOCKING_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Returned by [`block_on`] when the calling thread drives a single-threaded runtime.
///
/// Blocking such a thread would stall the runtime that has to make progress on the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "Client::execute cannot block inside a single-threaded async runtime; use Client::execute_async instead"
)]
pub struct BlockingInAsyncContext;

/// Runs `future` to completion on `runtime` from synchronous code.
///
/// * Outside of any runtime, and on the blocking workers used by
///   [`Client::execute_async`](super::Client::execute_async), the future runs directly.
/// * Inside a multi-threaded runtime, the current thread is handed over to blocking work
///   first with [`tokio::task::block_in_place`].
/// * Inside a single-threaded runtime nothing runs and [`BlockingInAsyncContext`] is returned.
pub fn block_on<F: Future>(
    runtime: &Handle,
    future: F,
) -> Result<F::Output, BlockingInAsyncContext> {
    match Handle::try_current() {
        Err(_) => Ok(runtime.block_on(future)),
        Ok(_) if ON_BLOCKING_WORKER.with(Cell::get) => Ok(runtime.block_on(future)),
        Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| runtime.block_on(future)))
        }
        Ok(_) => Err(BlockingInAsyncContext),
    }
}

/// Marks the current thread as a blocking worker while `f` runs.
pub(super) fn on_blocking_worker<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            ON_BLOCKING_WORKER.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(ON_BLOCKING_WORKER.with(|flag| flag.replace(true)));
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_outside_of_a_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        assert_eq!(block_on(runtime.handle(), async { 7 }), Ok(7));
    }

    #[tokio::test]
    async fn test_refuses_to_block_a_current_thread_runtime() {
        let handle = Handle::current();

        assert_eq!(
            block_on(&handle, async { 7 }),
            Err(BlockingInAsyncContext)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hands_over_a_multi_thread_worker() {
        let handle = Handle::current();

        assert_eq!(block_on(&handle, async { 7 }), Ok(7));
    }

    #[tokio::test]
    async fn test_blocking_worker_of_a_current_thread_runtime() {
        let handle = Handle::current();

        let result = tokio::task::spawn_blocking(move || {
            on_blocking_worker(|| block_on(&handle, async { 7 }))
        })
        .await
        .unwrap();

        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_worker_mark_is_restored() {
        on_blocking_worker(|| assert!(ON_BLOCKING_WORKER.with(Cell::get)));

        assert!(!ON_BLOCKING_WORKER.with(Cell::get));
    }
}
