use std::collections::HashSet;

use playpen_primitives::Problem;

use crate::Summary;

/// Independent problem producers, in tie-breaking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Producer {
	/// Live analysis engine diagnostics, updated on every keystroke.
	LiveAnalysis,
	/// Error-severity diagnostics reported by the compile step.
	CompileErrors,
	/// Warning-severity diagnostics reported by the compile step.
	CompileWarnings,
	/// Uncaught errors and rejections from the sandbox.
	Runtime,
}

impl Producer {
	/// All producers in tie-breaking order.
	pub const ALL: [Self; 4] = [Self::LiveAnalysis, Self::CompileErrors, Self::CompileWarnings, Self::Runtime];

	const fn index(self) -> usize {
		match self {
			Self::LiveAnalysis => 0,
			Self::CompileErrors => 1,
			Self::CompileWarnings => 2,
			Self::Runtime => 3,
		}
	}

	/// Lower-case name for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::LiveAnalysis => "live_analysis",
			Self::CompileErrors => "compile_errors",
			Self::CompileWarnings => "compile_warnings",
			Self::Runtime => "runtime",
		}
	}
}

/// Merges producer snapshots into one ordered, de-duplicated list.
///
/// Sorted by severity rank, then line, then column. Ties keep producer order
/// (see [`Producer::ALL`]) and then the producer's own order. Exact duplicates
/// keep their first occurrence.
pub fn merge<'a, I>(lists: I) -> Vec<Problem>
where
	I: IntoIterator<Item = (Producer, &'a [Problem])>,
{
	let mut lists: Vec<_> = lists.into_iter().collect();
	lists.sort_by_key(|(producer, _)| *producer);

	let mut seen = HashSet::new();
	let mut merged: Vec<&Problem> = lists
		.iter()
		.flat_map(|(_, problems)| problems.iter())
		.filter(|problem| seen.insert(*problem))
		.collect();
	merged.sort_by_key(|p| (p.severity.rank(), p.line, p.column));
	merged.into_iter().cloned().collect()
}

/// The four producer slots, each independently replaceable.
#[derive(Debug, Clone, Default)]
pub struct ProblemSlots {
	slots: [Vec<Problem>; 4],
}

impl ProblemSlots {
	/// Creates empty slots.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the snapshot of one producer.
	pub fn set(&mut self, producer: Producer, problems: Vec<Problem>) {
		self.slots[producer.index()] = problems;
	}

	/// Appends to the snapshot of one producer.
	pub fn push(&mut self, producer: Producer, problem: Problem) {
		self.slots[producer.index()].push(problem);
	}

	/// Empties one producer's snapshot.
	pub fn clear(&mut self, producer: Producer) {
		self.slots[producer.index()].clear();
	}

	/// Returns one producer's snapshot.
	pub fn get(&self, producer: Producer) -> &[Problem] {
		&self.slots[producer.index()]
	}

	/// Merges all slots, see [`merge`].
	pub fn merged(&self) -> Vec<Problem> {
		merge(Producer::ALL.into_iter().map(|producer| (producer, self.get(producer))))
	}

	/// Counts problems per severity across all slots, after de-duplication.
	pub fn summary(&self) -> Summary {
		Summary::of(&self.merged())
	}
}

#[cfg(test)]
mod tests {
	use playpen_primitives::{ProblemSource, Severity};
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	use super::*;

	fn problem(severity: Severity, line: u32) -> Problem {
		Problem::new(ProblemSource::Compiler, severity, format!("{severity} at {line}")).at(line, 1)
	}

	#[test]
	fn errors_sort_before_warnings() {
		let input = vec![problem(Severity::Error, 5), problem(Severity::Warning, 1), problem(Severity::Error, 1)];
		let merged = merge([(Producer::CompileErrors, input.as_slice())]);
		let keys: Vec<_> = merged.iter().map(|p| (p.severity, p.line)).collect();
		assert_eq!(keys, vec![(Severity::Error, 1), (Severity::Error, 5), (Severity::Warning, 1)]);
	}

	#[test]
	fn ties_keep_producer_order() {
		let live = vec![Problem::error(ProblemSource::Analysis, "live").at(2, 4)];
		let runtime = vec![Problem::error(ProblemSource::Runtime, "runtime").at(2, 4)];
		// Producers given out of order still merge in canonical order.
		let merged = merge([(Producer::Runtime, runtime.as_slice()), (Producer::LiveAnalysis, live.as_slice())]);
		assert_eq!(merged[0].message, "live");
		assert_eq!(merged[1].message, "runtime");
	}

	#[test]
	fn exact_duplicates_collapse() {
		let dup = Problem::error(ProblemSource::Runtime, "x is not defined").at(1, 1);
		let mut slots = ProblemSlots::new();
		slots.push(Producer::Runtime, dup.clone());
		slots.push(Producer::Runtime, dup.clone());
		slots.push(Producer::Runtime, dup.clone().at(2, 1));
		assert_eq!(slots.merged().len(), 2);
		assert_eq!(slots.summary().errors, 2);
	}

	#[test]
	fn slots_are_independently_replaceable() {
		let mut slots = ProblemSlots::new();
		slots.set(Producer::LiveAnalysis, vec![problem(Severity::Hint, 1)]);
		slots.set(Producer::CompileWarnings, vec![problem(Severity::Warning, 3)]);
		slots.clear(Producer::LiveAnalysis);
		assert!(slots.get(Producer::LiveAnalysis).is_empty());
		assert_eq!(slots.merged().len(), 1);
	}

	fn arb_problem() -> impl Strategy<Value = Problem> {
		(0u8..4, 0u32..20, 0u32..20, "[a-z]{1,4}").prop_map(|(sev, line, column, message)| {
			let severity = [Severity::Error, Severity::Warning, Severity::Info, Severity::Hint][sev as usize];
			Problem::new(ProblemSource::Compiler, severity, message).at(line, column)
		})
	}

	proptest! {
		#[test]
		fn merge_output_is_sorted_and_complete(
			live in prop::collection::vec(arb_problem(), 0..12),
			runtime in prop::collection::vec(arb_problem(), 0..12),
		) {
			let merged = merge([(Producer::LiveAnalysis, live.as_slice()), (Producer::Runtime, runtime.as_slice())]);
			for pair in merged.windows(2) {
				let a = (pair[0].severity.rank(), pair[0].line, pair[0].column);
				let b = (pair[1].severity.rank(), pair[1].line, pair[1].column);
				prop_assert!(a <= b);
			}
			let unique: HashSet<_> = live.iter().chain(runtime.iter()).collect();
			prop_assert_eq!(merged.len(), unique.len());
		}
	}
}
