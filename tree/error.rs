use std::fmt;

/// An incompatible option combination, detected before any tree construction begins.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
	/// The recursive construction order visits children immediately, so hill climbing cannot reorder anything.
	OriginalWithHillClimbing,
	/// The recursive construction order only supports percentage budgets.
	OriginalWithValueBudget,
	/// The recursive construction order always preserves the consolidated structure in the base trees.
	OriginalWithFreePruning,
	/// With the recursive construction order, the consolidated tree and the base trees must share the same pruning setting.
	OriginalWithMismatchedPruneFlags,
	/// With the recursive construction order, the consolidated tree and the base trees must share the same collapse setting.
	OriginalWithMismatchedCollapseFlags,
	/// A percentage budget must be between 0 and 100.
	InvalidPercentage(f32),
	/// Training requires at least one sample.
	NoSamples,
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ConfigError::OriginalWithHillClimbing => write!(
				f,
				"the hill climbing search discipline cannot be combined with the original priority criterion"
			),
			ConfigError::OriginalWithValueBudget => write!(
				f,
				"the original priority criterion requires a percentage budget, not an explicit value"
			),
			ConfigError::OriginalWithFreePruning => write!(
				f,
				"free pruning of the base trees cannot be combined with the original priority criterion"
			),
			ConfigError::OriginalWithMismatchedPruneFlags => write!(
				f,
				"with the original priority criterion, prune_consolidated_tree and prune_base_trees must have the same value"
			),
			ConfigError::OriginalWithMismatchedCollapseFlags => write!(
				f,
				"with the original priority criterion, collapse_consolidated_tree and collapse_base_trees must have the same value"
			),
			ConfigError::InvalidPercentage(percent) => {
				write!(f, "consolidation percentage {} is not in 0..=100", percent)
			}
			ConfigError::NoSamples => write!(f, "training requires at least one sample"),
		}
	}
}

impl std::error::Error for ConfigError {}

/// A request for a named measure this classifier does not provide.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasureError {
	pub name: String,
}

impl fmt::Display for MeasureError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "measure {} is not supported", self.name)
	}
}

impl std::error::Error for MeasureError {}
