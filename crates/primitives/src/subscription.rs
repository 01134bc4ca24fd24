use std::fmt;

/// Releases a registration exactly once, either explicitly or on drop.
///
/// Returned by every operation that attaches something to a longer-lived owner:
/// widget listeners, analysis-engine declaration files, completion providers.
#[must_use = "dropping a Subscription releases it immediately"]
pub struct Subscription {
	release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
	/// Creates a subscription that runs `release` when disposed.
	pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
		Self {
			release: Some(Box::new(release)),
		}
	}

	/// Creates a subscription with nothing to release.
	pub fn noop() -> Self {
		Self { release: None }
	}

	/// Runs the release closure if it has not run yet.
	pub fn dispose(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}

	/// Returns true once the release closure has run (or there was none).
	pub fn is_disposed(&self) -> bool {
		self.release.is_none()
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("disposed", &self.is_disposed()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn dispose_runs_once() {
		let count = Arc::new(AtomicUsize::new(0));
		let c = Arc::clone(&count);
		let mut sub = Subscription::new(move || {
			c.fetch_add(1, Ordering::SeqCst);
		});
		sub.dispose();
		sub.dispose();
		drop(sub);
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn drop_releases() {
		let count = Arc::new(AtomicUsize::new(0));
		let c = Arc::clone(&count);
		{
			let _sub = Subscription::new(move || {
				c.fetch_add(1, Ordering::SeqCst);
			});
		}
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
