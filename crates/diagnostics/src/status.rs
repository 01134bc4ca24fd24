use playpen_primitives::{Problem, Severity};

/// Problem counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
	pub errors: usize,
	pub warnings: usize,
	pub infos: usize,
	pub hints: usize,
}

impl Summary {
	/// Counts `problems` by severity.
	pub fn of(problems: &[Problem]) -> Self {
		problems.iter().fold(Self::default(), |mut acc, problem| {
			match problem.severity {
				Severity::Error => acc.errors += 1,
				Severity::Warning => acc.warnings += 1,
				Severity::Info => acc.infos += 1,
				Severity::Hint => acc.hints += 1,
			}
			acc
		})
	}

	/// Total number of problems.
	pub fn total(&self) -> usize {
		self.errors + self.warnings + self.infos + self.hints
	}
}

/// Tri-state status derived from a merged problem list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
	/// At least one error.
	HasErrors,
	/// Warnings but no errors.
	HasWarnings,
	/// Neither errors nor warnings.
	Clean,
}

impl StatusKind {
	/// Derives the status from counts. Infos and hints never affect it.
	pub fn derive(summary: &Summary) -> Self {
		if summary.errors > 0 {
			Self::HasErrors
		} else if summary.warnings > 0 {
			Self::HasWarnings
		} else {
			Self::Clean
		}
	}
}

#[cfg(test)]
mod tests {
	use playpen_primitives::ProblemSource;

	use super::*;

	#[test]
	fn derive_prefers_errors() {
		let problems = vec![
			Problem::warning(ProblemSource::Compiler, "w"),
			Problem::error(ProblemSource::Runtime, "e"),
			Problem::new(ProblemSource::Analysis, Severity::Hint, "h"),
		];
		let summary = Summary::of(&problems);
		assert_eq!(summary, Summary { errors: 1, warnings: 1, infos: 0, hints: 1 });
		assert_eq!(StatusKind::derive(&summary), StatusKind::HasErrors);
	}

	#[test]
	fn hints_alone_are_clean() {
		let problems = vec![Problem::new(ProblemSource::Analysis, Severity::Info, "i")];
		assert_eq!(StatusKind::derive(&Summary::of(&problems)), StatusKind::Clean);
		assert_eq!(StatusKind::derive(&Summary::of(&[Problem::warning(ProblemSource::Compiler, "w")])), StatusKind::HasWarnings);
	}
}
