/*!
This crate trains partially consolidated decision tree ensembles. A consolidated tree chooses every split by pooling evidence across a vector of resampled training sets, while one "base" tree per sample mirrors the consolidated structure. Beyond a configurable consolidation budget the lock-step construction stops and each base tree is completed independently from its own sample, as in ordinary bagging. The result interpolates between a single consolidated tree (budget = 100%) and a plain bagging ensemble (budget = 0).

Construction is iterative: a frontier of pending tree positions is expanded one node at a time, in an order chosen by a priority criterion, so the budget always spends itself on the most promising positions first.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod bagging;
mod classifier;
mod error;
mod evaluate;
mod frontier;
mod measures;
mod prune;
mod structure;
mod train;

pub use self::classifier::{PartiallyConsolidatedClassifier, TrainProgress, TrainTimes};
pub use self::error::{ConfigError, MeasureError};
pub use self::evaluate::{CandidateSplit, GainRatioEvaluator, Split, SplitEvaluator, SplitKind};
pub use self::structure::StructurePreservationStat;

use pctbagging_dataset::{Dataset, Value};
use serde::{Deserialize, Serialize};

/// These are the options passed to `PartiallyConsolidatedClassifier::train`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainOptions {
	/// The order in which pending tree positions are expanded.
	pub priority_criterion: PriorityCriterion,
	/// How scored positions are merged into the pending worklist. Only meaningful for the node-by-node criteria.
	pub search_discipline: SearchDiscipline,
	/// When consolidation stops and independent bagging growth begins.
	pub budget: ConsolidationBudget,
	/// Whether to collapse the consolidated tree after the partial build.
	pub collapse_consolidated_tree: bool,
	/// Whether to prune the consolidated tree after the partial build.
	pub prune_consolidated_tree: bool,
	/// Whether to collapse each base tree after it is completed.
	pub collapse_base_trees: bool,
	/// Whether to prune each base tree after it is completed.
	pub prune_base_trees: bool,
	/// If true, base tree pruning never removes a node that is part of the surviving consolidated structure. If false, base trees prune freely and may structurally diverge from the consolidated tree.
	pub preserve_structure: bool,
	/// The confidence factor used by pessimistic error pruning.
	pub confidence_factor: f32,
	/// A split is only usable if at least two of its branches receive this much weight.
	pub min_instances: usize,
	/// If true, leaf class probabilities are Laplace smoothed.
	pub use_laplace: bool,
	/// If true, the training data handles held by the base trees' leaves are kept after training instead of being dropped.
	pub keep_data: bool,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			priority_criterion: PriorityCriterion::Size,
			search_discipline: SearchDiscipline::HillClimbing,
			budget: ConsolidationBudget::Percentage(20.0),
			collapse_consolidated_tree: true,
			prune_consolidated_tree: true,
			collapse_base_trees: true,
			prune_base_trees: true,
			preserve_structure: true,
			confidence_factor: 0.25,
			min_instances: 2,
			use_laplace: false,
			keep_data: false,
		}
	}
}

/// The priority criterion decides which pending tree position is expanded next.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PriorityCriterion {
	/// Depth-first, left-to-right, mirroring the recursive construction order. Requires a percentage budget, best-first search, and structure preservation.
	Original,
	/// Breadth-first. The budget is a level count rather than a node count.
	LevelByLevel,
	/// Depth-first, left-to-right.
	Preorder,
	/// Children are expanded largest first, by the weight their branch received under the consolidated split.
	Size,
	/// Children are expanded best first, by the gain ratio of a candidate split recomputed on the child's data.
	GainRatio {
		scope: GainRatioScope,
		/// If true, the gain ratio is multiplied by the branch weight.
		weight_by_size: bool,
	},
}

/// Where the gain ratio ordering key is computed from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GainRatioScope {
	/// Score children with a candidate split on the child's slice of the whole training data.
	WholeData,
	/// Score children with a consolidated candidate split across the child's slices of all samples.
	SetOfSamples,
}

/// How scored children are merged into the pending worklist.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SearchDiscipline {
	/// All pending positions compete globally: a child may be expanded before its siblings' descendants anywhere in the tree.
	BestFirst,
	/// A node's children are ordered only among themselves and placed ahead of everything else pending, biasing toward finishing the current branch first.
	HillClimbing,
}

/// When consolidation stops. A percentage is resolved against the fully grown consolidated tree's inner node count (or level count, for the level-by-level criterion), which requires an unrestricted build pass first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConsolidationBudget {
	Value(usize),
	Percentage(f32),
}

impl TrainOptions {
	/// Check the option combination before any tree is built. Incompatible combinations are reported here and never coerced.
	pub fn validate(&self, n_samples: usize) -> Result<(), ConfigError> {
		if n_samples == 0 {
			return Err(ConfigError::NoSamples);
		}
		if let ConsolidationBudget::Percentage(percent) = self.budget {
			if !(0.0..=100.0).contains(&percent) {
				return Err(ConfigError::InvalidPercentage(percent));
			}
		}
		if self.priority_criterion == PriorityCriterion::Original {
			if self.search_discipline == SearchDiscipline::HillClimbing {
				return Err(ConfigError::OriginalWithHillClimbing);
			}
			if let ConsolidationBudget::Value(_) = self.budget {
				return Err(ConfigError::OriginalWithValueBudget);
			}
			if !self.preserve_structure {
				return Err(ConfigError::OriginalWithFreePruning);
			}
			if self.prune_consolidated_tree != self.prune_base_trees {
				return Err(ConfigError::OriginalWithMismatchedPruneFlags);
			}
			if self.collapse_consolidated_tree != self.collapse_base_trees {
				return Err(ConfigError::OriginalWithMismatchedCollapseFlags);
			}
		}
		Ok(())
	}
}

/// Trees are stored as a `Vec` of `Node`s. Each branch holds the indexes of its children in the same `Vec`. The root is always at index 0.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A `BranchNode` is an internal node: it routes examples to one of its children according to its split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BranchNode {
	/// The test that routes examples to a child.
	pub split: Split,
	/// One child per branch of the split, in branch order.
	pub child_indexes: Vec<usize>,
	/// The training weight each branch received.
	pub branch_weights: Vec<f64>,
	/// The weighted class distribution of the training examples that reached this node.
	pub distribution: Vec<f64>,
	/// The sequence number assigned when this position was expanded.
	pub order: usize,
	/// True if no weighted training examples reached this node.
	pub is_empty: bool,
	/// True if this node is part of the surviving consolidated structure.
	pub consolidated: bool,
	/// How many base trees still agree with this split after independent pruning. Filled in by the structure preservation analysis.
	pub n_preserving_base_trees: usize,
}

/// The leaves hold the class distribution to output for examples that reach them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeafNode {
	/// The weighted class distribution of the training examples that reached this leaf.
	pub distribution: Vec<f64>,
	/// The sequence number assigned when this position was processed.
	pub order: usize,
	/// True if no weighted training examples reached this leaf. Empty leaves abstain from prediction.
	pub is_empty: bool,
	/// True if this leaf is part of the surviving consolidated structure.
	pub consolidated: bool,
	/// The training data that reached this leaf. Present while a base tree still has growing to do, or when training was asked to keep data.
	#[serde(skip)]
	pub training_data: Option<Dataset>,
}

impl Node {
	pub fn as_branch(&self) -> Option<&BranchNode> {
		match self {
			Node::Branch(branch) => Some(branch),
			_ => None,
		}
	}
	pub fn as_branch_mut(&mut self) -> Option<&mut BranchNode> {
		match self {
			Node::Branch(branch) => Some(branch),
			_ => None,
		}
	}
	pub fn as_leaf(&self) -> Option<&LeafNode> {
		match self {
			Node::Leaf(leaf) => Some(leaf),
			_ => None,
		}
	}
	pub fn is_leaf(&self) -> bool {
		matches!(self, Node::Leaf(_))
	}
}

impl BranchNode {
	/// The index of the branch that received the most training weight. The first branch wins ties.
	pub fn largest_branch(&self) -> usize {
		let mut max_index = 0;
		let mut max_weight = std::f64::MIN;
		for (index, weight) in self.branch_weights.iter().enumerate() {
			if *weight > max_weight {
				max_index = index;
				max_weight = *weight;
			}
		}
		max_index
	}

	/// The branch an example with the given feature value is routed to. Missing values go to the largest branch.
	pub fn route(&self, value: Value) -> usize {
		match &self.split.kind {
			SplitKind::Continuous { threshold } => match value.as_number() {
				Some(number) if !number.is_nan() => {
					if number <= *threshold {
						0
					} else {
						1
					}
				}
				_ => self.largest_branch(),
			},
			SplitKind::Discrete { n_options } => match value.as_enum() {
				Some(Some(option)) if option.get() <= *n_options => option.get() - 1,
				_ => self.largest_branch(),
			},
		}
	}
}

impl Default for LeafNode {
	fn default() -> Self {
		Self {
			distribution: Vec::new(),
			order: 0,
			is_empty: false,
			consolidated: false,
			training_data: None,
		}
	}
}

impl Tree {
	/// A tree consisting of a single placeholder leaf.
	pub(crate) fn placeholder() -> Self {
		Self {
			nodes: vec![Node::Leaf(LeafNode::default())],
		}
	}

	/// Compute the class distribution for one example by walking the tree to a leaf. An empty leaf abstains with the zero vector. With `use_laplace`, leaf probabilities are Laplace smoothed.
	pub fn predict_distribution(&self, row: &[Value], use_laplace: bool) -> Vec<f64> {
		let mut node_index = 0;
		loop {
			match &self.nodes[node_index] {
				Node::Branch(branch) => {
					let value = row[branch.split.column_index];
					node_index = branch.child_indexes[branch.route(value)];
				}
				Node::Leaf(leaf) => {
					let total: f64 = leaf.distribution.iter().sum();
					let n_classes = leaf.distribution.len();
					if use_laplace && total > 0.0 {
						return leaf
							.distribution
							.iter()
							.map(|weight| (weight + 1.0) / (total + n_classes as f64))
							.collect();
					}
					if total == 0.0 {
						return vec![0.0; n_classes];
					}
					return leaf.distribution.iter().map(|weight| weight / total).collect();
				}
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		let mut count = 0;
		self.visit(0, 0, &mut |node, _| {
			if node.is_leaf() {
				count += 1;
			}
		});
		count
	}

	pub fn n_inner_nodes(&self) -> usize {
		let mut count = 0;
		self.visit(0, 0, &mut |node, _| {
			if !node.is_leaf() {
				count += 1;
			}
		});
		count
	}

	/// The number of levels below the root, so a single leaf has zero levels.
	pub fn n_levels(&self) -> usize {
		let mut max_depth = 0;
		self.visit(0, 0, &mut |_, depth| {
			max_depth = max_depth.max(depth);
		});
		max_depth
	}

	/// The mean depth of the leaves: how many tests it takes, on average, to explain a prediction.
	pub fn explanation_length(&self) -> f64 {
		let mut depth_sum = 0.0;
		let mut n_leaves = 0.0;
		self.visit(0, 0, &mut |node, depth| {
			if node.is_leaf() {
				depth_sum += depth as f64;
				n_leaves += 1.0;
			}
		});
		if n_leaves == 0.0 {
			return 0.0;
		}
		depth_sum / n_leaves
	}

	/// Like `explanation_length`, but each leaf's depth is weighted by the training weight that reached it.
	pub fn weighted_explanation_length(&self) -> f64 {
		let mut weighted_depth_sum = 0.0;
		let mut weight_sum = 0.0;
		self.visit(0, 0, &mut |node, depth| {
			if let Node::Leaf(leaf) = node {
				let weight: f64 = leaf.distribution.iter().sum();
				weighted_depth_sum += weight * depth as f64;
				weight_sum += weight;
			}
		});
		if weight_sum == 0.0 {
			return 0.0;
		}
		weighted_depth_sum / weight_sum
	}

	/// Visit every node reachable from the root, preorder, with its depth. Nodes orphaned by pruning are not visited.
	pub(crate) fn visit(&self, node_index: usize, depth: usize, f: &mut impl FnMut(&Node, usize)) {
		let node = &self.nodes[node_index];
		f(node, depth);
		if let Node::Branch(branch) = node {
			for child_index in branch.child_indexes.iter() {
				self.visit(*child_index, depth + 1, f);
			}
		}
	}

	/// Rebuild the node vector so that it contains exactly the nodes reachable from the root, in preorder. Pruning leaves orphaned entries behind; this drops them.
	pub(crate) fn compact(&mut self) {
		fn copy_subtree(old: &Tree, old_index: usize, new_nodes: &mut Vec<Node>) -> usize {
			let new_index = new_nodes.len();
			new_nodes.push(old.nodes[old_index].clone());
			if let Node::Branch(branch) = &old.nodes[old_index] {
				let child_indexes: Vec<usize> = branch
					.child_indexes
					.iter()
					.map(|child_index| copy_subtree(old, *child_index, new_nodes))
					.collect();
				new_nodes[new_index].as_branch_mut().unwrap().child_indexes = child_indexes;
			}
			new_index
		}
		let mut new_nodes = Vec::with_capacity(self.nodes.len());
		copy_subtree(self, 0, &mut new_nodes);
		self.nodes = new_nodes;
	}

	/// Drop every training data handle in the tree.
	pub(crate) fn cleanup(&mut self) {
		for node in self.nodes.iter_mut() {
			if let Node::Leaf(leaf) = node {
				leaf.training_data = None;
			}
		}
	}
}
