/*!
Structure preservation analysis. After the base trees are pruned, each consolidated branch node is scored by how many base trees still make the same decision at the corresponding position. With structure preservation on the answer is trivially every tree; with free pruning the analysis walks each base tree alongside the consolidated tree and tolerates local divergence by re-aligning down the consolidated split's largest branch, since a raised base subtree corresponds to a deeper consolidated position.
*/

use crate::{Node, Tree};
use num_traits::ToPrimitive;
use pctbagging_metrics::{AggregateStats, StreamingMetric};
use serde::{Deserialize, Serialize};

/// A summary of the per-node preservation percentages over the consolidated tree's branch nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructurePreservationStat {
	pub mean: f64,
	pub min: f64,
	pub max: f64,
	pub median: f64,
	pub std_dev: f64,
}

/// Count, for every consolidated branch node, the base trees that preserve its split, and summarize the percentages. Returns `None` if the consolidated tree is a single leaf. Safe to run repeatedly: the counters are reset first.
pub(crate) fn analyze(
	consolidated: &mut Tree,
	base_trees: &[Tree],
	preserve_structure: bool,
) -> Option<StructurePreservationStat> {
	let n_samples = base_trees.len();
	for node in consolidated.nodes.iter_mut() {
		if let Node::Branch(branch) = node {
			branch.n_preserving_base_trees = 0;
		}
	}
	if consolidated.nodes[0].is_leaf() {
		return None;
	}
	if preserve_structure {
		// Pruning was not allowed to touch the consolidated structure, so every base tree preserves every node.
		for node in consolidated.nodes.iter_mut() {
			if let Node::Branch(branch) = node {
				branch.n_preserving_base_trees = n_samples;
			}
		}
		return Some(StructurePreservationStat {
			mean: 100.0,
			min: 100.0,
			max: 100.0,
			median: 100.0,
			std_dev: 0.0,
		});
	}
	for base_tree in base_trees.iter() {
		count_preserving(consolidated, 0, base_tree, 0);
	}
	let mut stats = AggregateStats::new();
	let n_samples = n_samples.to_f64().unwrap();
	let mut percentages = Vec::new();
	collect_percentages(consolidated, 0, n_samples, &mut percentages);
	for percentage in percentages {
		stats.update(percentage);
	}
	stats.finalize().map(|output| StructurePreservationStat {
		mean: output.mean,
		min: output.min,
		max: output.max,
		median: output.median,
		std_dev: output.std_dev,
	})
}

fn count_preserving(
	consolidated: &mut Tree,
	conso_index: usize,
	base_tree: &Tree,
	base_index: usize,
) {
	let (conso_split, conso_children, largest) =
		match consolidated.nodes[conso_index].as_branch() {
			Some(branch) => (
				branch.split.clone(),
				branch.child_indexes.clone(),
				branch.largest_branch(),
			),
			None => return,
		};
	let base_branch = match base_tree.nodes[base_index].as_branch() {
		Some(branch) => branch,
		None => return,
	};
	if base_branch.split.agrees_with(&conso_split) {
		consolidated.nodes[conso_index]
			.as_branch_mut()
			.unwrap()
			.n_preserving_base_trees += 1;
		for (conso_child, base_child) in conso_children
			.iter()
			.zip(base_branch.child_indexes.iter())
		{
			count_preserving(consolidated, *conso_child, base_tree, *base_child);
		}
	} else {
		// The base tree made a different decision here, which raising does by lifting a branch's subtree over this position. The surviving structure then corresponds to the consolidated split's largest branch, so retry there against the same base node.
		let conso_child = conso_children[largest];
		count_preserving(consolidated, conso_child, base_tree, base_index);
	}
}

fn collect_percentages(tree: &Tree, node_index: usize, n_samples: f64, out: &mut Vec<f64>) {
	if let Node::Branch(branch) = &tree.nodes[node_index] {
		out.push(100.0 * branch.n_preserving_base_trees.to_f64().unwrap() / n_samples);
		for child_index in branch.child_indexes.iter() {
			collect_percentages(tree, *child_index, n_samples, out);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{BranchNode, LeafNode, Split, SplitKind};

	fn branch(column_index: usize, threshold: f32, child_indexes: Vec<usize>) -> Node {
		Node::Branch(BranchNode {
			split: Split {
				column_index,
				kind: SplitKind::Continuous { threshold },
			},
			child_indexes,
			branch_weights: vec![4.0, 2.0],
			distribution: vec![3.0, 3.0],
			order: 0,
			is_empty: false,
			consolidated: true,
			n_preserving_base_trees: 0,
		})
	}

	fn leaf() -> Node {
		Node::Leaf(LeafNode {
			distribution: vec![3.0, 0.0],
			..LeafNode::default()
		})
	}

	fn consolidated_tree() -> Tree {
		Tree {
			nodes: vec![branch(0, 0.5, vec![1, 2]), leaf(), leaf()],
		}
	}

	#[test]
	fn test_preserving_base_tree_counts() {
		let mut consolidated = consolidated_tree();
		let same = consolidated_tree();
		let different = Tree {
			nodes: vec![branch(1, 9.0, vec![1, 2]), leaf(), leaf()],
		};
		let stat = analyze(&mut consolidated, &[same, different], false).unwrap();
		let root = consolidated.nodes[0].as_branch().unwrap();
		assert_eq!(root.n_preserving_base_trees, 1);
		assert_eq!(stat.mean, 50.0);
		assert_eq!(stat.min, 50.0);
		assert_eq!(stat.max, 50.0);
	}

	#[test]
	fn test_fallback_credits_splits_surviving_a_raise() {
		// Raising replaced the base tree with the subtree under the consolidated root's largest branch, so the deeper consolidated split must still get credit while the root does not.
		let mut consolidated = Tree {
			nodes: vec![
				branch(0, 0.5, vec![1, 2]),
				branch(1, 9.0, vec![3, 4]),
				leaf(),
				leaf(),
				leaf(),
			],
		};
		let base_tree = Tree {
			nodes: vec![branch(1, 9.0, vec![1, 2]), leaf(), leaf()],
		};
		let stat = analyze(&mut consolidated, &[base_tree], false).unwrap();
		assert_eq!(
			consolidated.nodes[0]
				.as_branch()
				.unwrap()
				.n_preserving_base_trees,
			0
		);
		assert_eq!(
			consolidated.nodes[1]
				.as_branch()
				.unwrap()
				.n_preserving_base_trees,
			1
		);
		assert_eq!(stat.mean, 50.0);
		assert_eq!(stat.min, 0.0);
		assert_eq!(stat.max, 100.0);
	}

	#[test]
	fn test_preserve_structure_reports_full_preservation() {
		let mut consolidated = consolidated_tree();
		let base_trees = vec![consolidated_tree(), consolidated_tree(), consolidated_tree()];
		let stat = analyze(&mut consolidated, &base_trees, true).unwrap();
		assert_eq!(stat.mean, 100.0);
		assert_eq!(stat.std_dev, 0.0);
		assert_eq!(
			consolidated.nodes[0]
				.as_branch()
				.unwrap()
				.n_preserving_base_trees,
			3
		);
	}

	#[test]
	fn test_leaf_consolidated_tree_has_no_stat() {
		let mut consolidated = Tree {
			nodes: vec![leaf()],
		};
		assert!(analyze(&mut consolidated, &[consolidated_tree()], false).is_none());
	}

	#[test]
	fn test_analyze_is_idempotent() {
		let mut consolidated = consolidated_tree();
		let base_trees = vec![consolidated_tree(), consolidated_tree()];
		let first = analyze(&mut consolidated, &base_trees, false).unwrap();
		let second = analyze(&mut consolidated, &base_trees, false).unwrap();
		assert_eq!(first, second);
		assert_eq!(
			consolidated.nodes[0]
				.as_branch()
				.unwrap()
				.n_preserving_base_trees,
			2
		);
	}
}
