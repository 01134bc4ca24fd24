use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic sequence clock for discarding superseded async results.
///
/// Every trigger advances the clock and captures the returned value. When the
/// trigger's async work resumes it compares the captured value against
/// [`Self::current`]; a mismatch means a newer trigger owns the visible state.
/// Clones share the same counter.
#[derive(Debug, Default, Clone)]
pub struct SequenceClock {
	current: Arc<AtomicU64>,
}

impl SequenceClock {
	/// Creates a clock at sequence 0. The first [`Self::advance`] returns 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Issues the next sequence token.
	pub fn advance(&self) -> u64 {
		self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	/// Returns the most recently issued token.
	pub fn current(&self) -> u64 {
		self.current.load(Ordering::Acquire)
	}

	/// Returns true when `sequence` is still the most recently issued token.
	pub fn is_current(&self, sequence: u64) -> bool {
		self.current() == sequence
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn advance_is_monotonic_and_shared() {
		let clock = SequenceClock::new();
		let shared = clock.clone();
		assert_eq!(clock.current(), 0);
		let a = clock.advance();
		let b = shared.advance();
		assert!(b > a);
		assert!(!clock.is_current(a));
		assert!(clock.is_current(b));
	}
}
