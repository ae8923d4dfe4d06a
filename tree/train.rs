/*!
The partial consolidated build. A single worklist of pending positions drives the construction of the consolidated tree and all base trees at once: expanding a position writes the consolidated split into every tree and partitions every dataset, so the ensemble stays structurally synchronized. When the consolidation budget runs out, the remaining positions become leaves that keep their slice of the sample data, ready to be completed independently.
*/

use crate::evaluate::{compute_branch_weights, partition, CandidateSplit, SplitEvaluator};
use crate::frontier::{Frontier, FrontierEntry};
use crate::prune::{collapse_tree, prune_tree, PruneOptions};
use crate::{
	BranchNode, ConsolidationBudget, GainRatioScope, LeafNode, Node, PriorityCriterion,
	SearchDiscipline, TrainOptions, Tree,
};
use num_traits::ToPrimitive;
use pctbagging_dataset::Dataset;

/// The output of the partial build: the consolidated tree and one structurally synchronized base tree per sample.
pub(crate) struct PartialForest {
	pub consolidated: Tree,
	pub base_trees: Vec<Tree>,
}

/// Resolve the configured budget to a node count (or level count, for the level-by-level criterion). A percentage budget requires knowing how large the fully consolidated tree would be, so it costs an unrestricted build pass.
pub(crate) fn resolve_budget<E: SplitEvaluator>(
	data: &Dataset,
	samples: &[Dataset],
	evaluator: &E,
	options: &TrainOptions,
) -> usize {
	let percent = match options.budget {
		ConsolidationBudget::Value(value) => return value,
		ConsolidationBudget::Percentage(percent) => percent,
	};
	let mut forest = build_partial_forest(data, samples, evaluator, options, std::usize::MAX);
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
	let count = match options.priority_criterion {
		PriorityCriterion::LevelByLevel => forest.consolidated.n_levels(),
		_ => forest.consolidated.n_inner_nodes(),
	};
	(count.to_f32().unwrap() * percent / 100.0 + 0.5).to_usize().unwrap()
}

/// Grow the consolidated tree and the base trees in lock step until the frontier is exhausted or the budget is spent. Positions left over when the budget runs out become leaves holding their sample data, so the bagging phase can finish them.
pub(crate) fn build_partial_forest<E: SplitEvaluator>(
	data: &Dataset,
	samples: &[Dataset],
	evaluator: &E,
	options: &TrainOptions,
	budget: usize,
) -> PartialForest {
	let n_samples = samples.len();
	let mut consolidated = Tree::placeholder();
	let mut base_trees = vec![Tree::placeholder(); n_samples];
	let mut frontier = Frontier::new();
	frontier.push_back(FrontierEntry {
		data: data.clone(),
		samples: samples.to_vec(),
		node_index: 0,
		base_node_indexes: vec![0; n_samples],
		order_value: None,
		depth: 0,
	});
	let mut order = 0;
	let mut n_inner_nodes = 0;
	while let Some(entry) = frontier.pop() {
		let within_budget = match options.priority_criterion {
			PriorityCriterion::LevelByLevel => entry.depth < budget,
			_ => n_inner_nodes < budget,
		};
		let candidate = if within_budget {
			evaluator.evaluate_consolidated(&entry.data, &entry.samples)
		} else {
			None
		};
		match candidate {
			Some(candidate) => {
				let children = expand(
					&mut consolidated,
					&mut base_trees,
					&entry,
					&candidate,
					order,
				);
				n_inner_nodes += 1;
				enqueue_children(&mut frontier, children, &candidate, evaluator, options);
			}
			None => {
				// A pending position only stays growable if the budget cut it off; a position the consolidated vote declared a leaf is final for every tree.
				set_leaves(&mut consolidated, &mut base_trees, entry, order, !within_budget);
			}
		}
		order += 1;
	}
	PartialForest {
		consolidated,
		base_trees,
	}
}

/// Write the consolidated split into the consolidated tree and every base tree, and return one pending child position per branch.
fn expand(
	consolidated: &mut Tree,
	base_trees: &mut [Tree],
	entry: &FrontierEntry,
	candidate: &CandidateSplit,
	order: usize,
) -> Vec<FrontierEntry> {
	let n_branches = candidate.split.n_branches();
	let conso_is_empty = entry.data.total_weight() == 0.0;
	let data_parts = partition(&entry.data, &candidate.split, &candidate.branch_weights);
	let child_indexes = push_placeholders(consolidated, n_branches);
	consolidated.nodes[entry.node_index] = Node::Branch(BranchNode {
		split: candidate.split.clone(),
		child_indexes: child_indexes.clone(),
		branch_weights: candidate.branch_weights.clone(),
		distribution: entry.data.class_distribution(),
		order,
		is_empty: conso_is_empty,
		consolidated: true,
		n_preserving_base_trees: 0,
	});
	let mut children: Vec<FrontierEntry> = data_parts
		.into_iter()
		.enumerate()
		.map(|(branch, data)| FrontierEntry {
			data,
			samples: Vec::with_capacity(base_trees.len()),
			node_index: child_indexes[branch],
			base_node_indexes: Vec::with_capacity(base_trees.len()),
			order_value: None,
			depth: entry.depth + 1,
		})
		.collect();
	for (sample_index, sample) in entry.samples.iter().enumerate() {
		let branch_weights = compute_branch_weights(sample, &candidate.split);
		let sample_parts = partition(sample, &candidate.split, &branch_weights);
		let base_tree = &mut base_trees[sample_index];
		let base_child_indexes = push_placeholders(base_tree, n_branches);
		base_tree.nodes[entry.base_node_indexes[sample_index]] = Node::Branch(BranchNode {
			split: candidate.split.clone(),
			child_indexes: base_child_indexes.clone(),
			branch_weights,
			distribution: sample.class_distribution(),
			order,
			is_empty: conso_is_empty || sample.total_weight() == 0.0,
			consolidated: true,
			n_preserving_base_trees: 0,
		});
		for (branch, sample_part) in sample_parts.into_iter().enumerate() {
			children[branch].samples.push(sample_part);
			children[branch]
				.base_node_indexes
				.push(base_child_indexes[branch]);
		}
	}
	children
}

fn push_placeholders(tree: &mut Tree, n: usize) -> Vec<usize> {
	(0..n)
		.map(|_| {
			let index = tree.nodes.len();
			tree.nodes.push(Node::Leaf(LeafNode::default()));
			index
		})
		.collect()
}

/// Score the new child positions per the priority criterion and merge them into the frontier per the search discipline.
fn enqueue_children<E: SplitEvaluator>(
	frontier: &mut Frontier,
	children: Vec<FrontierEntry>,
	candidate: &CandidateSplit,
	evaluator: &E,
	options: &TrainOptions,
) {
	match options.priority_criterion {
		PriorityCriterion::LevelByLevel => {
			for child in children {
				frontier.push_back(child);
			}
		}
		PriorityCriterion::Original | PriorityCriterion::Preorder => {
			frontier.prepend_block(children);
		}
		PriorityCriterion::Size => {
			let scored = children
				.into_iter()
				.enumerate()
				.map(|(branch, mut child)| {
					child.order_value = Some(candidate.branch_weights[branch]);
					child
				})
				.collect();
			merge_scored(frontier, scored, options.search_discipline);
		}
		PriorityCriterion::GainRatio {
			scope,
			weight_by_size,
		} => {
			let scored = children
				.into_iter()
				.enumerate()
				.map(|(branch, mut child)| {
					let lookahead = match scope {
						GainRatioScope::WholeData => evaluator.evaluate(&child.data),
						GainRatioScope::SetOfSamples => {
							evaluator.evaluate_consolidated(&child.data, &child.samples)
						}
					};
					// Non-splittable children still need to appear in the ordering, behind every real gain ratio.
					let gain_ratio = lookahead
						.map(|c| c.gain_ratio)
						.unwrap_or(std::f64::MIN_POSITIVE);
					child.order_value = Some(if weight_by_size {
						gain_ratio * candidate.branch_weights[branch]
					} else {
						gain_ratio
					});
					child
				})
				.collect();
			merge_scored(frontier, scored, options.search_discipline);
		}
	}
}

fn merge_scored(
	frontier: &mut Frontier,
	children: Vec<FrontierEntry>,
	discipline: SearchDiscipline,
) {
	match discipline {
		SearchDiscipline::BestFirst => {
			for child in children {
				frontier.insert_by_value(child);
			}
		}
		SearchDiscipline::HillClimbing => {
			frontier.prepend_ordered_block(children);
		}
	}
}

/// Turn a pending position into a leaf in every tree. A `pending` leaf keeps each sample's data so the bagging phase can keep growing that base tree.
fn set_leaves(
	consolidated: &mut Tree,
	base_trees: &mut [Tree],
	entry: FrontierEntry,
	order: usize,
	pending: bool,
) {
	let conso_is_empty = entry.data.total_weight() == 0.0;
	consolidated.nodes[entry.node_index] = Node::Leaf(LeafNode {
		distribution: entry.data.class_distribution(),
		order,
		is_empty: conso_is_empty,
		consolidated: true,
		training_data: None,
	});
	for (sample_index, sample) in entry.samples.into_iter().enumerate() {
		let is_empty = conso_is_empty || sample.total_weight() == 0.0;
		let distribution = sample.class_distribution();
		let training_data = if pending { Some(sample) } else { None };
		base_trees[sample_index].nodes[entry.base_node_indexes[sample_index]] =
			Node::Leaf(LeafNode {
				distribution,
				order,
				is_empty,
				consolidated: true,
				training_data,
			});
	}
}

/// Recompute the consolidated marks of a base tree against the consolidated tree's surviving structure. After the consolidated tree is collapsed or pruned, positions it dropped are no longer protected in the base trees.
pub(crate) fn sync_consolidated_marks(consolidated: &Tree, base_tree: &mut Tree) {
	for node in base_tree.nodes.iter_mut() {
		match node {
			Node::Branch(branch) => branch.consolidated = false,
			Node::Leaf(leaf) => leaf.consolidated = false,
		}
	}
	sync_node(consolidated, 0, base_tree, 0);
}

fn sync_node(consolidated: &Tree, conso_index: usize, base_tree: &mut Tree, base_index: usize) {
	let conso_branch = match consolidated.nodes[conso_index].as_branch() {
		Some(branch) => branch,
		None => {
			// The consolidated structure ends here. A base branch at this position is free growth now, not protected structure.
			if base_tree.nodes[base_index].is_leaf() {
				set_mark(base_tree, base_index);
			}
			return;
		}
	};
	let agrees = base_tree.nodes[base_index]
		.as_branch()
		.map_or(false, |base_branch| {
			base_branch.split.agrees_with(&conso_branch.split)
		});
	if !agrees {
		return;
	}
	set_mark(base_tree, base_index);
	let conso_children = conso_branch.child_indexes.clone();
	let base_children = base_tree.nodes[base_index]
		.as_branch()
		.unwrap()
		.child_indexes
		.clone();
	for (conso_child, base_child) in conso_children.iter().zip(base_children.iter()) {
		sync_node(consolidated, *conso_child, base_tree, *base_child);
	}
}

fn set_mark(tree: &mut Tree, node_index: usize) {
	match &mut tree.nodes[node_index] {
		Node::Branch(branch) => branch.consolidated = true,
		Node::Leaf(leaf) => leaf.consolidated = true,
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::GainRatioEvaluator;
	use pctbagging_dataset::{Column, EnumColumn, NumberColumn};
	use std::num::NonZeroUsize;

	fn enum_value(index: usize) -> Option<NonZeroUsize> {
		NonZeroUsize::new(index)
	}

	// Three classes: x separates c from {a, b}, then y separates a from b. The fully consolidated tree has two inner nodes.
	fn test_data() -> Dataset {
		let x = vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 8.0];
		let y = vec![0.0, 1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 8.0, 0.0, 1.0, 2.0, 3.0];
		let labels = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
		let columns = vec![
			Column::Number(NumberColumn {
				name: "x".to_owned(),
				data: x,
			}),
			Column::Number(NumberColumn {
				name: "y".to_owned(),
				data: y,
			}),
		];
		let target = EnumColumn {
			name: "class".to_owned(),
			options: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
			data: labels.into_iter().map(enum_value).collect(),
		};
		Dataset::new(columns, target)
	}

	fn build(budget: usize, options: &TrainOptions) -> PartialForest {
		let data = test_data();
		let samples = vec![data.clone(), data.clone(), data.clone()];
		let evaluator = GainRatioEvaluator::new(2);
		build_partial_forest(&data, &samples, &evaluator, options, budget)
	}

	fn n_pending_leaves(tree: &Tree) -> usize {
		tree.nodes
			.iter()
			.filter(|node| {
				node.as_leaf()
					.map_or(false, |leaf| leaf.training_data.is_some())
			})
			.count()
	}

	#[test]
	fn test_zero_budget_is_plain_bagging() {
		let forest = build(0, &TrainOptions::default());
		assert_eq!(forest.consolidated.nodes.len(), 1);
		assert!(forest.consolidated.nodes[0].is_leaf());
		for base_tree in forest.base_trees.iter() {
			assert_eq!(n_pending_leaves(base_tree), 1);
		}
	}

	#[test]
	fn test_unlimited_budget_leaves_nothing_pending() {
		let forest = build(std::usize::MAX, &TrainOptions::default());
		assert_eq!(forest.consolidated.n_inner_nodes(), 2);
		for base_tree in forest.base_trees.iter() {
			assert_eq!(n_pending_leaves(base_tree), 0);
			assert_eq!(base_tree.n_inner_nodes(), 2);
		}
	}

	#[test]
	fn test_node_budget_limits_inner_nodes() {
		let forest = build(1, &TrainOptions::default());
		assert_eq!(forest.consolidated.n_inner_nodes(), 1);
		// The budget cut the build off, so the unexpanded positions stay growable.
		for base_tree in forest.base_trees.iter() {
			assert!(n_pending_leaves(base_tree) > 0);
		}
	}

	#[test]
	fn test_level_budget_limits_depth() {
		let options = TrainOptions {
			priority_criterion: PriorityCriterion::LevelByLevel,
			..TrainOptions::default()
		};
		let forest = build(1, &options);
		assert_eq!(forest.consolidated.n_levels(), 1);
	}

	#[test]
	fn test_base_trees_mirror_consolidated_structure() {
		let forest = build(std::usize::MAX, &TrainOptions::default());
		let conso_root = forest.consolidated.nodes[0].as_branch().unwrap();
		for base_tree in forest.base_trees.iter() {
			let base_root = base_tree.nodes[0].as_branch().unwrap();
			assert!(base_root.split.agrees_with(&conso_root.split));
			assert!(base_root.consolidated);
		}
	}

	#[test]
	fn test_root_gets_order_zero() {
		let forest = build(std::usize::MAX, &TrainOptions::default());
		assert_eq!(forest.consolidated.nodes[0].as_branch().unwrap().order, 0);
	}

	#[test]
	fn test_single_sample_base_tree_matches_consolidated() {
		let data = test_data();
		let samples = vec![data.clone()];
		let evaluator = GainRatioEvaluator::new(2);
		for budget in &[0, 1, std::usize::MAX] {
			let forest =
				build_partial_forest(&data, &samples, &evaluator, &TrainOptions::default(), *budget);
			assert_eq!(
				forest.consolidated.n_inner_nodes(),
				forest.base_trees[0].n_inner_nodes()
			);
			assert_eq!(forest.consolidated.n_leaves(), forest.base_trees[0].n_leaves());
		}
	}

	#[test]
	fn test_search_disciplines_expand_the_same_positions() {
		// With the budget fully consumed at the leaves, the two disciplines differ only in expansion order.
		let best_first = build(
			std::usize::MAX,
			&TrainOptions {
				search_discipline: SearchDiscipline::BestFirst,
				..TrainOptions::default()
			},
		);
		let hill_climbing = build(
			std::usize::MAX,
			&TrainOptions {
				search_discipline: SearchDiscipline::HillClimbing,
				..TrainOptions::default()
			},
		);
		assert_eq!(
			best_first.consolidated.n_inner_nodes(),
			hill_climbing.consolidated.n_inner_nodes()
		);
		assert_eq!(
			best_first.consolidated.n_leaves(),
			hill_climbing.consolidated.n_leaves()
		);
	}

	#[test]
	fn test_resolve_budget_full_percentage() {
		let data = test_data();
		let samples = vec![data.clone(), data.clone(), data.clone()];
		let evaluator = GainRatioEvaluator::new(2);
		let options = TrainOptions {
			budget: ConsolidationBudget::Percentage(100.0),
			collapse_consolidated_tree: false,
			prune_consolidated_tree: false,
			..TrainOptions::default()
		};
		assert_eq!(resolve_budget(&data, &samples, &evaluator, &options), 2);
		let options = TrainOptions {
			budget: ConsolidationBudget::Percentage(50.0),
			collapse_consolidated_tree: false,
			prune_consolidated_tree: false,
			..TrainOptions::default()
		};
		assert_eq!(resolve_budget(&data, &samples, &evaluator, &options), 1);
		let options = TrainOptions {
			budget: ConsolidationBudget::Value(7),
			..TrainOptions::default()
		};
		assert_eq!(resolve_budget(&data, &samples, &evaluator, &options), 7);
	}

	#[test]
	fn test_sync_consolidated_marks_clears_dropped_structure() {
		let mut forest = build(std::usize::MAX, &TrainOptions::default());
		// Shrink the consolidated tree to its root leaf, as an aggressive prune would.
		let distribution = test_data().class_distribution();
		forest.consolidated = Tree {
			nodes: vec![Node::Leaf(LeafNode {
				distribution,
				..LeafNode::default()
			})],
		};
		for base_tree in forest.base_trees.iter_mut() {
			sync_consolidated_marks(&forest.consolidated, base_tree);
			assert!(!base_tree.nodes[0].as_branch().unwrap().consolidated);
		}
	}
}
