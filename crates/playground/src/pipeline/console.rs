use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use playpen_sandbox::ConsoleEntry;

/// Bounded console history shared between the pipeline driver and readers.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
	entries: Arc<Mutex<VecDeque<ConsoleEntry>>>,
	limit: usize,
}

impl ConsoleBuffer {
	/// Creates a buffer keeping at most `limit` entries (at least one).
	pub fn new(limit: usize) -> Self {
		Self {
			entries: Arc::new(Mutex::new(VecDeque::new())),
			limit: limit.max(1),
		}
	}

	/// Appends, dropping the oldest entry when full.
	pub fn push(&self, entry: ConsoleEntry) {
		let mut entries = self.entries.lock();
		if entries.len() == self.limit {
			entries.pop_front();
		}
		entries.push_back(entry);
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	pub fn entries(&self) -> Vec<ConsoleEntry> {
		self.entries.lock().iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use playpen_sandbox::ConsoleLevel;
	use serde_json::json;

	use super::*;

	#[test]
	fn oldest_entries_fall_off() {
		let buffer = ConsoleBuffer::new(2);
		for n in 0..3 {
			buffer.push(ConsoleEntry::new(ConsoleLevel::Log, vec![json!(n)]));
		}
		let texts: Vec<_> = buffer.entries().iter().map(ConsoleEntry::text).collect();
		assert_eq!(texts, vec!["1", "2"]);
		buffer.clear();
		assert!(buffer.is_empty());
	}
}
