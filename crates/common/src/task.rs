use futures::channel::oneshot;
use std::future::Future;

/// The worker thread went away before producing a value (it panicked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("background task was canceled before completing")]
pub struct Canceled;

/// Run blocking work on a short-lived worker thread and await its result.
///
/// The returned future is executor-agnostic, so several of them can be joined
/// on a single-threaded executor (e.g. `pollster`) and still make progress
/// concurrently.
pub fn unblock<T, F>(work: F) -> impl Future<Output = Result<T, Canceled>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        // Receiver gone means nobody cares about the result.
        let _ = tx.send(work());
    });
    async move { rx.await.map_err(|_| Canceled) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_worker_value() {
        let v = pollster::block_on(unblock(|| 21 * 2)).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn joins_many() {
        let futs = (0..6).map(|i| unblock(move || i * 10));
        let out = pollster::block_on(futures::future::join_all(futs));
        let values: Vec<i32> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn panicking_worker_is_canceled() {
        let r = pollster::block_on(unblock(|| -> i32 { panic!("boom") }));
        assert_eq!(r, Err(Canceled));
    }
}
