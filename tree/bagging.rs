/*!
The bagging phase. After the partial consolidated build, every base tree still has leaves holding a slice of its sample. Completion grows an ordinary tree from each of those slices, then collapses and prunes the base tree, protecting the surviving consolidated structure when structure preservation is on.
*/

use crate::evaluate::{partition, SplitEvaluator};
use crate::prune::{collapse_tree, prune_tree, PruneOptions};
use crate::{BranchNode, LeafNode, Node, TrainOptions, Tree};
use pctbagging_dataset::Dataset;

/// Finish one base tree: grow every pending leaf from its data, then simplify.
pub(crate) fn complete_base_tree<E: SplitEvaluator>(
	tree: &mut Tree,
	evaluator: &E,
	options: &TrainOptions,
) {
	let pending: Vec<(usize, Dataset)> = tree
		.nodes
		.iter_mut()
		.enumerate()
		.filter_map(|(node_index, node)| match node {
			Node::Leaf(leaf) => leaf.training_data.take().map(|data| (node_index, data)),
			Node::Branch(_) => None,
		})
		.collect();
	for (node_index, data) in pending {
		grow(tree, node_index, data, evaluator, options);
	}
	if options.collapse_base_trees {
		collapse_tree(tree, options.preserve_structure);
	}
	if options.prune_base_trees {
		prune_tree(
			tree,
			&PruneOptions {
				confidence_factor: options.confidence_factor,
				respect_consolidated_marks: options.preserve_structure,
				allow_raising: !options.preserve_structure,
			},
		);
	}
	tree.compact();
}

/// Grow a subtree at a leaf position, recursively, using the leaf's own data only. Nodes added here are free growth: they carry no consolidated mark.
fn grow<E: SplitEvaluator>(
	tree: &mut Tree,
	node_index: usize,
	data: Dataset,
	evaluator: &E,
	options: &TrainOptions,
) {
	let (order, is_empty) = match &tree.nodes[node_index] {
		Node::Leaf(leaf) => (leaf.order, leaf.is_empty),
		Node::Branch(_) => return,
	};
	let candidate = match evaluator.evaluate(&data) {
		Some(candidate) => candidate,
		None => {
			if options.keep_data {
				if let Node::Leaf(leaf) = &mut tree.nodes[node_index] {
					leaf.training_data = Some(data);
				}
			}
			return;
		}
	};
	let parts = partition(&data, &candidate.split, &candidate.branch_weights);
	let child_indexes: Vec<usize> = parts
		.iter()
		.map(|part| {
			let child_index = tree.nodes.len();
			tree.nodes.push(Node::Leaf(LeafNode {
				distribution: part.class_distribution(),
				order: 0,
				is_empty: is_empty || part.total_weight() == 0.0,
				consolidated: false,
				training_data: None,
			}));
			child_index
		})
		.collect();
	tree.nodes[node_index] = Node::Branch(BranchNode {
		split: candidate.split,
		child_indexes: child_indexes.clone(),
		branch_weights: candidate.branch_weights,
		distribution: data.class_distribution(),
		order,
		is_empty,
		consolidated: false,
		n_preserving_base_trees: 0,
	});
	for (child_index, part) in child_indexes.into_iter().zip(parts.into_iter()) {
		if part.total_weight() > 0.0 {
			grow(tree, child_index, part, evaluator, options);
		}
	}
}
