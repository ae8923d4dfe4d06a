/*!
Split evaluation. The [`SplitEvaluator`](trait.SplitEvaluator.html) trait is the seam between tree construction and the split selection criterion: construction only ever asks "given this data, is there a split worth making?". [`GainRatioEvaluator`](struct.GainRatioEvaluator.html) answers with a C4.5 style gain ratio criterion, and in consolidated mode combines the per-sample answers into a single decision by voting.
*/

use num_traits::ToPrimitive;
use pctbagging_dataset::{Column, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A split test at a branch node. Continuous splits have two branches (<= threshold, > threshold); discrete splits have one branch per enum option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Split {
	pub column_index: usize,
	pub kind: SplitKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitKind {
	Continuous { threshold: f32 },
	Discrete { n_options: usize },
}

impl Split {
	pub fn n_branches(&self) -> usize {
		match &self.kind {
			SplitKind::Continuous { .. } => 2,
			SplitKind::Discrete { n_options } => *n_options,
		}
	}

	/// Whether two splits make the same decision: same column, and for continuous splits the same threshold within floating tolerance.
	pub fn agrees_with(&self, other: &Split) -> bool {
		if self.column_index != other.column_index {
			return false;
		}
		match (&self.kind, &other.kind) {
			(
				SplitKind::Continuous { threshold: left },
				SplitKind::Continuous { threshold: right },
			) => (left - right).abs() < 1e-6,
			(
				SplitKind::Discrete { n_options: left },
				SplitKind::Discrete { n_options: right },
			) => left == right,
			_ => false,
		}
	}
}

/// A proposed split together with the evidence for it.
#[derive(Clone, Debug)]
pub struct CandidateSplit {
	pub split: Split,
	pub gain_ratio: f64,
	/// The training weight routed to each branch, missing values included.
	pub branch_weights: Vec<f64>,
}

/// The seam between tree construction and split selection. Both operations are pure, so construction is free to invoke them repeatedly for lookahead scoring.
pub trait SplitEvaluator {
	/// Propose a split for the given data, or `None` if the node should be a leaf.
	fn evaluate(&self, data: &Dataset) -> Option<CandidateSplit>;
	/// Propose a single consolidated split for the given data by combining evidence from every sample, or `None` if the node should be a leaf.
	fn evaluate_consolidated(&self, data: &Dataset, samples: &[Dataset]) -> Option<CandidateSplit>;
}

/// A C4.5 style gain ratio criterion. Candidate thresholds for number columns sit at midpoints between consecutive distinct values; a split is usable if at least two branches receive `min_instances` weight.
#[derive(Clone, Debug)]
pub struct GainRatioEvaluator {
	pub min_instances: usize,
}

impl GainRatioEvaluator {
	pub fn new(min_instances: usize) -> Self {
		Self { min_instances }
	}
}

impl SplitEvaluator for GainRatioEvaluator {
	fn evaluate(&self, data: &Dataset) -> Option<CandidateSplit> {
		let total_weight = data.total_weight();
		let min_weight = self.min_instances.to_f64().unwrap();
		if total_weight < 2.0 * min_weight {
			return None;
		}
		let mut best: Option<CandidateSplit> = None;
		for column_index in 0..data.n_columns() {
			let candidate = match &data.columns[column_index] {
				Column::Number(_) => {
					self.evaluate_number_column(data, column_index, total_weight)
				}
				Column::Enum(_) => self.evaluate_enum_column(data, column_index, total_weight),
			};
			if let Some(candidate) = candidate {
				let replace = match &best {
					Some(best) => candidate.gain_ratio > best.gain_ratio,
					None => true,
				};
				if replace {
					best = Some(candidate);
				}
			}
		}
		best
	}

	fn evaluate_consolidated(&self, data: &Dataset, samples: &[Dataset]) -> Option<CandidateSplit> {
		// Each sample votes with its own best split. A leaf proposal is a vote too, but a split wins a tie against the leaf.
		let proposals: Vec<Option<CandidateSplit>> =
			samples.iter().map(|sample| self.evaluate(sample)).collect();
		let mut n_leaf_votes = 0;
		let mut votes: BTreeMap<usize, Vec<CandidateSplit>> = BTreeMap::new();
		for proposal in proposals {
			match proposal {
				Some(candidate) => votes
					.entry(candidate.split.column_index)
					.or_insert_with(Vec::new)
					.push(candidate),
				None => n_leaf_votes += 1,
			}
		}
		// The lowest column index wins vote ties.
		let mut winner: Option<(usize, Vec<CandidateSplit>)> = None;
		for (column_index, supporters) in votes {
			let replace = match &winner {
				Some((_, best)) => supporters.len() > best.len(),
				None => true,
			};
			if replace {
				winner = Some((column_index, supporters));
			}
		}
		let (column_index, supporters) = winner?;
		if n_leaf_votes > supporters.len() {
			return None;
		}
		let gain_ratio = supporters.iter().map(|c| c.gain_ratio).sum::<f64>()
			/ supporters.len().to_f64().unwrap();
		let kind = match &data.columns[column_index] {
			Column::Number(_) => {
				let threshold = supporters
					.iter()
					.filter_map(|c| match &c.split.kind {
						SplitKind::Continuous { threshold } => Some(*threshold),
						_ => None,
					})
					.sum::<f32>() / supporters.len().to_f32().unwrap();
				SplitKind::Continuous { threshold }
			}
			Column::Enum(column) => SplitKind::Discrete {
				n_options: column.options.len(),
			},
		};
		let split = Split { column_index, kind };
		let branch_weights = compute_branch_weights(data, &split);
		Some(CandidateSplit {
			split,
			gain_ratio,
			branch_weights,
		})
	}
}

impl GainRatioEvaluator {
	fn evaluate_number_column(
		&self,
		data: &Dataset,
		column_index: usize,
		total_weight: f64,
	) -> Option<CandidateSplit> {
		let column = match &data.columns[column_index] {
			Column::Number(column) => column,
			_ => unreachable!(),
		};
		let n_classes = data.n_classes();
		let min_weight = self.min_instances.to_f64().unwrap();
		// Collect the known values with their labels, sorted ascending.
		let mut rows: Vec<(f32, usize, f64)> = Vec::with_capacity(data.n_examples());
		for (row, value) in column.data.iter().enumerate() {
			if value.is_nan() {
				continue;
			}
			if let Some(label) = data.target.data[row] {
				rows.push((*value, label.get() - 1, data.weights[row].to_f64().unwrap()));
			}
		}
		if rows.len() < 2 {
			return None;
		}
		rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
		let known_weight: f64 = rows.iter().map(|(_, _, weight)| weight).sum();
		let mut known_distribution = vec![0.0; n_classes];
		for (_, label, weight) in rows.iter() {
			known_distribution[*label] += weight;
		}
		let base_entropy = entropy(&known_distribution);
		let mut left_distribution = vec![0.0; n_classes];
		let mut left_weight = 0.0;
		let mut best: Option<(f64, f32, f64, f64)> = None;
		for index in 0..rows.len() - 1 {
			let (value, label, weight) = rows[index];
			left_distribution[label] += weight;
			left_weight += weight;
			let next_value = rows[index + 1].0;
			if value >= next_value {
				continue;
			}
			let right_weight = known_weight - left_weight;
			if left_weight < min_weight || right_weight < min_weight {
				continue;
			}
			let right_distribution: Vec<f64> = known_distribution
				.iter()
				.zip(left_distribution.iter())
				.map(|(total, left)| total - left)
				.collect();
			let info = (left_weight * entropy(&left_distribution)
				+ right_weight * entropy(&right_distribution))
				/ known_weight;
			// Unknown values discount the gain, as in C4.5.
			let gain = (known_weight / total_weight) * (base_entropy - info);
			if gain <= 1e-10 {
				continue;
			}
			let split_info = entropy(&[left_weight, right_weight]);
			if split_info <= 0.0 {
				continue;
			}
			let gain_ratio = gain / split_info;
			let threshold = (value + next_value) / 2.0;
			let replace = match &best {
				Some((best_ratio, ..)) => gain_ratio > *best_ratio,
				None => true,
			};
			if replace {
				best = Some((gain_ratio, threshold, left_weight, right_weight));
			}
		}
		best.map(|(gain_ratio, threshold, ..)| {
			let split = Split {
				column_index,
				kind: SplitKind::Continuous { threshold },
			};
			let branch_weights = compute_branch_weights(data, &split);
			CandidateSplit {
				split,
				gain_ratio,
				branch_weights,
			}
		})
	}

	fn evaluate_enum_column(
		&self,
		data: &Dataset,
		column_index: usize,
		total_weight: f64,
	) -> Option<CandidateSplit> {
		let column = match &data.columns[column_index] {
			Column::Enum(column) => column,
			_ => unreachable!(),
		};
		let n_options = column.options.len();
		let n_classes = data.n_classes();
		let min_weight = self.min_instances.to_f64().unwrap();
		let mut branch_distributions = vec![vec![0.0; n_classes]; n_options];
		let mut branch_weights = vec![0.0; n_options];
		let mut known_distribution = vec![0.0; n_classes];
		let mut known_weight = 0.0;
		for (row, value) in column.data.iter().enumerate() {
			let option = match value {
				Some(option) => option.get() - 1,
				None => continue,
			};
			if let Some(label) = data.target.data[row] {
				let weight = data.weights[row].to_f64().unwrap();
				branch_distributions[option][label.get() - 1] += weight;
				branch_weights[option] += weight;
				known_distribution[label.get() - 1] += weight;
				known_weight += weight;
			}
		}
		let n_usable_branches = branch_weights
			.iter()
			.filter(|weight| **weight >= min_weight)
			.count();
		if n_usable_branches < 2 || known_weight <= 0.0 {
			return None;
		}
		let info = branch_distributions
			.iter()
			.zip(branch_weights.iter())
			.map(|(distribution, weight)| weight * entropy(distribution))
			.sum::<f64>() / known_weight;
		let gain = (known_weight / total_weight) * (entropy(&known_distribution) - info);
		if gain <= 1e-10 {
			return None;
		}
		let split_info = entropy(&branch_weights);
		if split_info <= 0.0 {
			return None;
		}
		let split = Split {
			column_index,
			kind: SplitKind::Discrete { n_options },
		};
		let branch_weights = compute_branch_weights(data, &split);
		Some(CandidateSplit {
			split,
			gain_ratio: gain / split_info,
			branch_weights,
		})
	}
}

/// The entropy of a weight distribution, in nats.
fn entropy(distribution: &[f64]) -> f64 {
	let total: f64 = distribution.iter().sum();
	if total <= 0.0 {
		return 0.0;
	}
	distribution
		.iter()
		.filter(|weight| **weight > 0.0)
		.map(|weight| {
			let p = weight / total;
			-p * p.ln()
		})
		.sum()
}

/// The training weight each branch of `split` receives from `data`. Rows with a missing value at the split column are routed to the branch that got the most known weight.
pub(crate) fn compute_branch_weights(data: &Dataset, split: &Split) -> Vec<f64> {
	let mut weights = vec![0.0; split.n_branches()];
	let mut missing_weight = 0.0;
	for row in 0..data.n_examples() {
		let weight = data.weights[row].to_f64().unwrap();
		match known_branch(data, row, split) {
			Some(branch) => weights[branch] += weight,
			None => missing_weight += weight,
		}
	}
	if missing_weight > 0.0 {
		let largest = largest_index(&weights);
		weights[largest] += missing_weight;
	}
	weights
}

/// Partition `data` into one dataset per branch of `split`. `branch_weights` decides where rows with missing split values go, so that partitioning agrees with prediction-time routing.
pub(crate) fn partition(data: &Dataset, split: &Split, branch_weights: &[f64]) -> Vec<Dataset> {
	let largest = largest_index(branch_weights);
	let mut rows: Vec<Vec<usize>> = vec![Vec::new(); split.n_branches()];
	for row in 0..data.n_examples() {
		let branch = known_branch(data, row, split).unwrap_or(largest);
		rows[branch].push(row);
	}
	rows.iter().map(|rows| data.select_rows(rows)).collect()
}

fn known_branch(data: &Dataset, row: usize, split: &Split) -> Option<usize> {
	match &data.columns[split.column_index] {
		Column::Number(column) => match &split.kind {
			SplitKind::Continuous { threshold } => {
				let value = column.data[row];
				if value.is_nan() {
					None
				} else if value <= *threshold {
					Some(0)
				} else {
					Some(1)
				}
			}
			_ => None,
		},
		Column::Enum(column) => column.data[row].map(|option| option.get() - 1),
	}
}

fn largest_index(weights: &[f64]) -> usize {
	let mut max_index = 0;
	let mut max_weight = std::f64::MIN;
	for (index, weight) in weights.iter().enumerate() {
		if *weight > max_weight {
			max_index = index;
			max_weight = *weight;
		}
	}
	max_index
}

#[cfg(test)]
mod test {
	use super::*;
	use pctbagging_dataset::{EnumColumn, NumberColumn};
	use std::num::NonZeroUsize;

	fn enum_value(index: usize) -> Option<NonZeroUsize> {
		NonZeroUsize::new(index)
	}

	fn number_dataset(values: Vec<f32>, labels: Vec<usize>) -> Dataset {
		let columns = vec![Column::Number(NumberColumn {
			name: "x".to_owned(),
			data: values,
		})];
		let target = EnumColumn {
			name: "class".to_owned(),
			options: vec!["a".to_owned(), "b".to_owned()],
			data: labels.into_iter().map(enum_value).collect(),
		};
		Dataset::new(columns, target)
	}

	#[test]
	fn test_perfect_number_split() {
		let data = number_dataset(vec![0.0, 0.0, 1.0, 1.0], vec![1, 1, 2, 2]);
		let evaluator = GainRatioEvaluator::new(2);
		let candidate = evaluator.evaluate(&data).unwrap();
		assert_eq!(candidate.split.column_index, 0);
		assert_eq!(
			candidate.split.kind,
			SplitKind::Continuous { threshold: 0.5 }
		);
		assert!((candidate.gain_ratio - 1.0).abs() < 1e-12);
		assert_eq!(candidate.branch_weights, vec![2.0, 2.0]);
	}

	#[test]
	fn test_pure_node_is_a_leaf() {
		let data = number_dataset(vec![0.0, 0.5, 1.0, 2.0], vec![1, 1, 1, 1]);
		let evaluator = GainRatioEvaluator::new(2);
		assert!(evaluator.evaluate(&data).is_none());
	}

	#[test]
	fn test_too_few_instances_is_a_leaf() {
		let data = number_dataset(vec![0.0, 1.0, 2.0], vec![1, 2, 1]);
		let evaluator = GainRatioEvaluator::new(2);
		assert!(evaluator.evaluate(&data).is_none());
	}

	#[test]
	fn test_enum_split() {
		let columns = vec![Column::Enum(EnumColumn {
			name: "color".to_owned(),
			options: vec!["red".to_owned(), "green".to_owned()],
			data: vec![enum_value(1), enum_value(1), enum_value(2), enum_value(2)],
		})];
		let target = EnumColumn {
			name: "class".to_owned(),
			options: vec!["a".to_owned(), "b".to_owned()],
			data: vec![enum_value(1), enum_value(1), enum_value(2), enum_value(2)],
		};
		let data = Dataset::new(columns, target);
		let evaluator = GainRatioEvaluator::new(2);
		let candidate = evaluator.evaluate(&data).unwrap();
		assert_eq!(candidate.split.kind, SplitKind::Discrete { n_options: 2 });
		assert_eq!(candidate.branch_weights, vec![2.0, 2.0]);
	}

	#[test]
	fn test_consolidated_vote_averages_thresholds() {
		let left = number_dataset(vec![0.0, 0.0, 1.0, 1.0], vec![1, 1, 2, 2]);
		let right = number_dataset(vec![0.0, 0.0, 2.0, 2.0], vec![1, 1, 2, 2]);
		let data = number_dataset(vec![0.0, 0.0, 1.0, 2.0], vec![1, 1, 2, 2]);
		let evaluator = GainRatioEvaluator::new(2);
		let candidate = evaluator
			.evaluate_consolidated(&data, &[left, right])
			.unwrap();
		// The samples propose thresholds 0.5 and 1.0, so the consolidated threshold is their mean.
		assert_eq!(
			candidate.split.kind,
			SplitKind::Continuous { threshold: 0.75 }
		);
	}

	#[test]
	fn test_consolidated_split_wins_tie_against_leaf() {
		let splittable = number_dataset(vec![0.0, 0.0, 1.0, 1.0], vec![1, 1, 2, 2]);
		let pure = number_dataset(vec![0.0, 0.5, 1.0, 2.0], vec![1, 1, 1, 1]);
		let data = number_dataset(vec![0.0, 0.0, 1.0, 1.0], vec![1, 1, 2, 2]);
		let evaluator = GainRatioEvaluator::new(2);
		let candidate = evaluator.evaluate_consolidated(&data, &[splittable, pure]);
		assert!(candidate.is_some());
	}

	#[test]
	fn test_consolidated_leaf_majority_wins() {
		let splittable = number_dataset(vec![0.0, 0.0, 1.0, 1.0], vec![1, 1, 2, 2]);
		let pure_a = number_dataset(vec![0.0, 0.5, 1.0, 2.0], vec![1, 1, 1, 1]);
		let pure_b = number_dataset(vec![0.0, 0.5, 1.0, 2.0], vec![2, 2, 2, 2]);
		let data = number_dataset(vec![0.0, 0.0, 1.0, 1.0], vec![1, 1, 2, 2]);
		let evaluator = GainRatioEvaluator::new(2);
		let candidate = evaluator.evaluate_consolidated(&data, &[splittable, pure_a, pure_b]);
		assert!(candidate.is_none());
	}

	#[test]
	fn test_partition_routes_missing_to_largest_branch() {
		let data = number_dataset(
			vec![0.0, 0.0, 1.0, 1.0, 1.0, std::f32::NAN],
			vec![1, 1, 2, 2, 2, 1],
		);
		let split = Split {
			column_index: 0,
			kind: SplitKind::Continuous { threshold: 0.5 },
		};
		let branch_weights = compute_branch_weights(&data, &split);
		assert_eq!(branch_weights, vec![2.0, 4.0]);
		let parts = partition(&data, &split, &branch_weights);
		assert_eq!(parts[0].n_examples(), 2);
		assert_eq!(parts[1].n_examples(), 4);
	}
}
