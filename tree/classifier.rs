/*!
The classifier ties the training phases together: resolve the budget, run the partial consolidated build, simplify the consolidated tree, complete the base trees as a bagging ensemble, and analyze structure preservation. Prediction averages the base trees' leaf distributions.
*/

use crate::bagging::complete_base_tree;
use crate::evaluate::GainRatioEvaluator;
use crate::prune::{collapse_tree, prune_tree, PruneOptions};
use crate::structure::{analyze, StructurePreservationStat};
use crate::train::{build_partial_forest, resolve_budget, sync_consolidated_marks};
use crate::{ConfigError, ConsolidationBudget, LeafNode, Node, SplitKind, TrainOptions, Tree};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use pctbagging_dataset::{Column, Dataset, Value};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A trained partially consolidated ensemble. The consolidated tree is the explainable single-tree view; the base trees are what actually vote at prediction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartiallyConsolidatedClassifier {
	pub consolidated_tree: Tree,
	pub base_trees: Vec<Tree>,
	/// The class names, in target option order.
	pub classes: Vec<String>,
	/// The training schema with zero examples, kept for column and option names.
	pub schema: Dataset,
	pub options: TrainOptions,
	/// `None` if the consolidated tree is a single leaf.
	pub structure_preservation: Option<StructurePreservationStat>,
	pub train_times: TrainTimes,
}

/// Wall clock seconds spent in each training phase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainTimes {
	/// Time spent growing the unrestricted consolidated tree to resolve a percentage budget. Zero for explicit value budgets.
	pub whole_consolidated: f64,
	/// Time spent on the partial consolidated build, including consolidated tree simplification.
	pub partial_consolidated: f64,
	/// Time spent completing, collapsing, and pruning the base trees.
	pub bagging: f64,
}

/// Progress reports sent to the `update_progress` callback as each training phase finishes.
#[derive(Clone, Debug)]
pub enum TrainProgress {
	WholeConsolidated { elapsed: Duration },
	PartialConsolidated { elapsed: Duration },
	Bagging { elapsed: Duration },
	StructureAnalysis { elapsed: Duration },
}

impl PartiallyConsolidatedClassifier {
	/// Train on `data`, consolidating splits across `samples`. The samples share `data`'s schema; see `pctbagging_dataset::generate_samples` for producing them by bootstrap.
	pub fn train(
		data: &Dataset,
		samples: &[Dataset],
		options: TrainOptions,
		update_progress: &mut dyn FnMut(TrainProgress),
	) -> Result<Self, ConfigError> {
		options.validate(samples.len())?;
		let evaluator = GainRatioEvaluator::new(options.min_instances);

		let start = Instant::now();
		let budget = resolve_budget(data, samples, &evaluator, &options);
		let whole_elapsed = match options.budget {
			ConsolidationBudget::Percentage(_) => start.elapsed(),
			ConsolidationBudget::Value(_) => Duration::from_secs(0),
		};
		update_progress(TrainProgress::WholeConsolidated {
			elapsed: whole_elapsed,
		});

		let start = Instant::now();
		let mut forest = build_partial_forest(data, samples, &evaluator, &options, budget);
		if options.collapse_consolidated_tree {
			collapse_tree(&mut forest.consolidated, false);
		}
		if options.prune_consolidated_tree {
			prune_tree(
				&mut forest.consolidated,
				&PruneOptions {
					confidence_factor: options.confidence_factor,
					respect_consolidated_marks: false,
					allow_raising: false,
				},
			);
		}
		// Simplifying the consolidated tree may have dropped structure the base trees still carry, so the protection marks are stale until re-synced.
		for base_tree in forest.base_trees.iter_mut() {
			sync_consolidated_marks(&forest.consolidated, base_tree);
		}
		let partial_elapsed = start.elapsed();
		update_progress(TrainProgress::PartialConsolidated {
			elapsed: partial_elapsed,
		});

		let start = Instant::now();
		for base_tree in forest.base_trees.iter_mut() {
			complete_base_tree(base_tree, &evaluator, &options);
		}
		let bagging_elapsed = start.elapsed();
		update_progress(TrainProgress::Bagging {
			elapsed: bagging_elapsed,
		});

		let start = Instant::now();
		let structure_preservation = analyze(
			&mut forest.consolidated,
			&forest.base_trees,
			options.preserve_structure,
		);
		update_progress(TrainProgress::StructureAnalysis {
			elapsed: start.elapsed(),
		});

		if !options.keep_data {
			forest.consolidated.cleanup();
			for base_tree in forest.base_trees.iter_mut() {
				base_tree.cleanup();
			}
		}

		Ok(Self {
			consolidated_tree: forest.consolidated,
			base_trees: forest.base_trees,
			classes: data.class_names().to_vec(),
			schema: data.empty_like(),
			options,
			structure_preservation,
			train_times: TrainTimes {
				whole_consolidated: whole_elapsed.as_secs_f64(),
				partial_consolidated: partial_elapsed.as_secs_f64(),
				bagging: bagging_elapsed.as_secs_f64(),
			},
		})
	}

	pub fn n_samples(&self) -> usize {
		self.base_trees.len()
	}

	/// The class probabilities for one example: each base tree's leaf distribution is summed and the total normalized. If every base tree abstains, the whole ensemble abstains with the zero vector.
	pub fn predict_row(&self, row: &[Value]) -> Vec<f32> {
		let mut sums = vec![0.0f64; self.classes.len()];
		for tree in self.base_trees.iter() {
			let distribution = tree.predict_distribution(row, self.options.use_laplace);
			for (sum, value) in sums.iter_mut().zip(distribution.iter()) {
				*sum += value;
			}
		}
		let total: f64 = sums.iter().sum();
		if total == 0.0 {
			return vec![0.0; self.classes.len()];
		}
		sums.iter()
			.map(|sum| (sum / total).to_f32().unwrap())
			.collect()
	}

	/// Write the class probabilities for a batch of examples into `probabilities`, one row per example.
	pub fn predict(&self, features: ArrayView2<Value>, mut probabilities: ArrayViewMut2<f32>) {
		for (features, mut probabilities) in izip!(
			features.axis_iter(Axis(0)),
			probabilities.axis_iter_mut(Axis(0)),
		) {
			let row: Vec<Value> = features.iter().copied().collect();
			let prediction = self.predict_row(&row);
			for (probability, value) in probabilities.iter_mut().zip(prediction.into_iter()) {
				*probability = value;
			}
		}
	}

	/// The 0-based index of the most probable class. The first class wins ties.
	pub fn predict_class(&self, row: &[Value]) -> usize {
		let probabilities = self.predict_row(row);
		let mut max_index = 0;
		let mut max_probability = std::f32::MIN;
		for (index, probability) in probabilities.iter().enumerate() {
			if *probability > max_probability {
				max_index = index;
				max_probability = *probability;
			}
		}
		max_index
	}

	/// Render the consolidated tree as indented text, one branch per line. With free pruning, each split also reports the percentage of base trees preserving it.
	pub fn dump(&self) -> String {
		let mut out = String::new();
		match &self.consolidated_tree.nodes[0] {
			Node::Leaf(leaf) => {
				out.push_str(&self.leaf_label(leaf));
				out.push('\n');
			}
			Node::Branch(_) => self.dump_subtree(0, 0, &mut out),
		}
		out
	}

	fn dump_subtree(&self, node_index: usize, depth: usize, out: &mut String) {
		let branch = match &self.consolidated_tree.nodes[node_index] {
			Node::Branch(branch) => branch,
			Node::Leaf(_) => return,
		};
		for (branch_index, child_index) in branch.child_indexes.iter().enumerate() {
			for _ in 0..depth {
				out.push_str("|   ");
			}
			out.push_str(&self.branch_label(node_index, branch_index));
			out.push_str(&format!(" [{}]", branch.order));
			if !self.options.preserve_structure {
				let percent = 100.0 * branch.n_preserving_base_trees.to_f64().unwrap()
					/ self.base_trees.len().to_f64().unwrap();
				out.push_str(&format!(" [Str: {:.2}%]", percent));
			}
			match &self.consolidated_tree.nodes[*child_index] {
				Node::Leaf(leaf) => {
					out.push_str(": ");
					out.push_str(&self.leaf_label(leaf));
					out.push('\n');
				}
				Node::Branch(_) => {
					out.push('\n');
					self.dump_subtree(*child_index, depth + 1, out);
				}
			}
		}
	}

	fn branch_label(&self, node_index: usize, branch_index: usize) -> String {
		let branch = self.consolidated_tree.nodes[node_index].as_branch().unwrap();
		let column = &self.schema.columns[branch.split.column_index];
		match &branch.split.kind {
			SplitKind::Continuous { threshold } => {
				if branch_index == 0 {
					format!("{} <= {}", column.name(), threshold)
				} else {
					format!("{} > {}", column.name(), threshold)
				}
			}
			SplitKind::Discrete { .. } => match column {
				Column::Enum(column) => {
					format!("{} = {}", column.name, column.options[branch_index])
				}
				Column::Number(column) => format!("{} = {}", column.name, branch_index),
			},
		}
	}

	fn leaf_label(&self, leaf: &LeafNode) -> String {
		let mut max_index = 0;
		let mut max_weight = std::f64::MIN;
		for (index, weight) in leaf.distribution.iter().enumerate() {
			if *weight > max_weight {
				max_index = index;
				max_weight = *weight;
			}
		}
		let total: f64 = leaf.distribution.iter().sum();
		format!("[{}] {} ({:.2})", leaf.order, self.classes[max_index], total)
	}
}
