use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{TaskClass, spawn};

/// Runs the most recently scheduled future once a quiescence window elapses.
///
/// Scheduling again before the window closes cancels the earlier future, so a
/// burst of events collapses into a single run.
#[derive(Debug)]
pub struct Debouncer {
	class: TaskClass,
	pending: Mutex<Option<CancellationToken>>,
}

impl Debouncer {
	/// Creates a debouncer spawning its delayed work under `class`.
	pub fn new(class: TaskClass) -> Self {
		Self {
			class,
			pending: Mutex::new(None),
		}
	}

	/// Schedules `fut` to run after `window`, replacing any pending future.
	pub fn schedule<F>(&self, window: Duration, fut: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let cancel = CancellationToken::new();
		if let Some(previous) = self.pending.lock().replace(cancel.clone()) {
			previous.cancel();
		}

		spawn(self.class, async move {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					tracing::trace!("worker.debounce.cancelled");
				}
				_ = tokio::time::sleep(window) => fut.await,
			}
		});
	}

	/// Drops the pending future, if any.
	pub fn cancel(&self) {
		if let Some(previous) = self.pending.lock().take() {
			previous.cancel();
		}
	}
}

impl Drop for Debouncer {
	fn drop(&mut self) {
		self.cancel();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[tokio::test(start_paused = true)]
	async fn burst_collapses_into_one_run() {
		let debouncer = Debouncer::new(TaskClass::Background);
		let runs = Arc::new(AtomicUsize::new(0));
		let last = Arc::new(AtomicUsize::new(0));

		for i in 1..=5 {
			let runs = Arc::clone(&runs);
			let last = Arc::clone(&last);
			debouncer.schedule(Duration::from_millis(100), async move {
				runs.fetch_add(1, Ordering::SeqCst);
				last.store(i, Ordering::SeqCst);
			});
			tokio::time::advance(Duration::from_millis(30)).await;
		}

		tokio::time::sleep(Duration::from_millis(200)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 1);
		assert_eq!(last.load(Ordering::SeqCst), 5);
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_drops_pending_run() {
		let debouncer = Debouncer::new(TaskClass::Background);
		let runs = Arc::new(AtomicUsize::new(0));
		let r = Arc::clone(&runs);
		debouncer.schedule(Duration::from_millis(50), async move {
			r.fetch_add(1, Ordering::SeqCst);
		});
		debouncer.cancel();
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_the_debouncer_drops_pending_run() {
		let debouncer = Debouncer::new(TaskClass::Background);
		let runs = Arc::new(AtomicUsize::new(0));
		let r = Arc::clone(&runs);
		debouncer.schedule(Duration::from_millis(50), async move {
			r.fetch_add(1, Ordering::SeqCst);
		});
		drop(debouncer);
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 0);
	}
}
