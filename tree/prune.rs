/*!
Post-construction simplification. Collapsing replaces a subtree with a leaf when the subtree does not beat the leaf on training error. Pruning replaces a subtree with a leaf (or raises its largest branch) when the leaf's pessimistic error estimate is no worse than the subtree's, following the C4.5 confidence interval scheme.
*/

use crate::{BranchNode, LeafNode, Node, Tree};

#[derive(Clone, Debug)]
pub struct PruneOptions {
	pub confidence_factor: f32,
	/// If true, nodes marked as part of the surviving consolidated structure are never removed.
	pub respect_consolidated_marks: bool,
	/// If true, a subtree may be replaced with its largest branch when that branch alone estimates no worse.
	pub allow_raising: bool,
}

/// Replace subtrees whose training error is no better than a leaf's. Runs top down: a collapsed node's descendants are never visited.
pub fn collapse_tree(tree: &mut Tree, respect_consolidated_marks: bool) {
	collapse_node(tree, 0, respect_consolidated_marks);
	tree.compact();
}

fn collapse_node(tree: &mut Tree, node_index: usize, respect_marks: bool) {
	let branch = match &tree.nodes[node_index] {
		Node::Branch(branch) => branch.clone(),
		Node::Leaf(_) => return,
	};
	let leaf_errors = training_errors(&branch.distribution);
	let mut subtree_errors = 0.0;
	tree.visit(node_index, 0, &mut |node, _| {
		if let Node::Leaf(leaf) = node {
			subtree_errors += training_errors(&leaf.distribution);
		}
	});
	let protected = respect_marks && branch.consolidated;
	if subtree_errors >= leaf_errors - 1e-3 && !protected {
		tree.nodes[node_index] = Node::Leaf(leaf_from_branch(&branch));
		return;
	}
	for child_index in branch.child_indexes {
		collapse_node(tree, child_index, respect_marks);
	}
}

/// C4.5 pessimistic error pruning, bottom up.
pub fn prune_tree(tree: &mut Tree, options: &PruneOptions) {
	prune_node(tree, 0, options);
	tree.compact();
}

fn prune_node(tree: &mut Tree, node_index: usize, options: &PruneOptions) {
	let child_indexes = match &tree.nodes[node_index] {
		Node::Branch(branch) => branch.child_indexes.clone(),
		Node::Leaf(_) => return,
	};
	for child_index in child_indexes {
		prune_node(tree, child_index, options);
	}
	let branch = match &tree.nodes[node_index] {
		Node::Branch(branch) => branch.clone(),
		Node::Leaf(_) => return,
	};
	if options.respect_consolidated_marks && branch.consolidated {
		return;
	}
	let cf = options.confidence_factor;
	let leaf_errors = estimated_errors(&branch.distribution, cf);
	let tree_errors = estimated_subtree_errors(tree, node_index, cf);
	if leaf_errors <= tree_errors + 0.1 {
		tree.nodes[node_index] = Node::Leaf(leaf_from_branch(&branch));
		return;
	}
	if options.allow_raising {
		let largest_child_index = branch.child_indexes[branch.largest_branch()];
		let branch_errors =
			estimated_raised_errors(tree, largest_child_index, &branch.distribution, cf);
		if branch_errors <= tree_errors + 0.1 {
			tree.nodes[node_index] = tree.nodes[largest_child_index].clone();
		}
	}
}

/// The estimated errors if the largest branch's subtree had to classify the parent's whole distribution, as raising would make it. The weight held by the other branches is redistributed over the raised subtree's leaves in proportion to their size, so raising over an informative sibling inflates the leaves' minority weight and prices itself out.
fn estimated_raised_errors(
	tree: &Tree,
	node_index: usize,
	parent_distribution: &[f64],
	confidence_factor: f32,
) -> f64 {
	let branch_distribution = node_distribution(&tree.nodes[node_index]).to_vec();
	let branch_total: f64 = branch_distribution.iter().sum();
	if branch_total <= 0.0 {
		return estimated_errors(parent_distribution, confidence_factor);
	}
	let leftover: Vec<f64> = parent_distribution
		.iter()
		.zip(branch_distribution.iter())
		.map(|(parent, branch)| (parent - branch).max(0.0))
		.collect();
	let mut errors = 0.0;
	tree.visit(node_index, 0, &mut |node, _| {
		if let Node::Leaf(leaf) = node {
			let share: f64 = leaf.distribution.iter().sum::<f64>() / branch_total;
			let redistributed: Vec<f64> = leaf
				.distribution
				.iter()
				.zip(leftover.iter())
				.map(|(weight, leftover)| weight + leftover * share)
				.collect();
			errors += estimated_errors(&redistributed, confidence_factor);
		}
	});
	errors
}

fn node_distribution(node: &Node) -> &[f64] {
	match node {
		Node::Branch(branch) => &branch.distribution,
		Node::Leaf(leaf) => &leaf.distribution,
	}
}

fn estimated_subtree_errors(tree: &Tree, node_index: usize, confidence_factor: f32) -> f64 {
	let mut errors = 0.0;
	tree.visit(node_index, 0, &mut |node, _| {
		if let Node::Leaf(leaf) = node {
			errors += estimated_errors(&leaf.distribution, confidence_factor);
		}
	});
	errors
}

fn leaf_from_branch(branch: &BranchNode) -> LeafNode {
	LeafNode {
		distribution: branch.distribution.clone(),
		order: branch.order,
		is_empty: branch.is_empty,
		consolidated: branch.consolidated,
		training_data: None,
	}
}

/// The weight of training examples a majority-class leaf with this distribution would misclassify.
fn training_errors(distribution: &[f64]) -> f64 {
	let total: f64 = distribution.iter().sum();
	let max = distribution.iter().cloned().fold(0.0, f64::max);
	total - max
}

/// The pessimistic error estimate for a leaf: observed errors plus the upper confidence bound correction.
fn estimated_errors(distribution: &[f64], confidence_factor: f32) -> f64 {
	let total: f64 = distribution.iter().sum();
	let incorrect = training_errors(distribution);
	incorrect + add_errs(total, incorrect, confidence_factor)
}

/// The correction added to `e` observed errors out of `n` so that the true error rate is below the corrected rate with confidence `1 - cf`. This is the C4.5 upper bound of the binomial confidence interval, with the small-count special cases.
fn add_errs(n: f64, e: f64, cf: f32) -> f64 {
	let cf = cf as f64;
	if n <= 0.0 {
		return 0.0;
	}
	if e < 1.0 {
		let base = n * (1.0 - cf.powf(1.0 / n));
		if e == 0.0 {
			return base;
		}
		return base + e * (add_errs(n, 1.0, cf as f32) - base);
	}
	if e + 0.5 >= n {
		return (n - e).max(0.0);
	}
	let z = normal_inverse(1.0 - cf);
	let f = (e + 0.5) / n;
	let r = (f + z * z / (2.0 * n)
		+ z * (f / n - f * f / n + z * z / (4.0 * n * n)).sqrt())
		/ (1.0 + z * z / n);
	r * n - e
}

/// The inverse of the standard normal cumulative distribution function, by Acklam's rational approximation. Accurate to about 1e-9 over (0, 1), which is far more than the pruning bound needs.
fn normal_inverse(p: f64) -> f64 {
	const A: [f64; 6] = [
		-3.969683028665376e+01,
		2.209460984245205e+02,
		-2.759285104469687e+02,
		1.383577518672690e+02,
		-3.066479806614716e+01,
		2.506628277459239e+00,
	];
	const B: [f64; 5] = [
		-5.447609879822406e+01,
		1.615858368580409e+02,
		-1.556989798598866e+02,
		6.680131188771972e+01,
		-1.328068155288572e+01,
	];
	const C: [f64; 6] = [
		-7.784894002430293e-03,
		-3.223964580411365e-01,
		-2.400758277161838e+00,
		-2.549732539343734e+00,
		4.374664141464968e+00,
		2.938163982698783e+00,
	];
	const D: [f64; 4] = [
		7.784695709041462e-03,
		3.224671290700398e-01,
		2.445134137142996e+00,
		3.754408661907416e+00,
	];
	const P_LOW: f64 = 0.02425;
	if p <= 0.0 {
		return std::f64::NEG_INFINITY;
	}
	if p >= 1.0 {
		return std::f64::INFINITY;
	}
	if p < P_LOW {
		let q = (-2.0 * p.ln()).sqrt();
		(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
			/ ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
	} else if p <= 1.0 - P_LOW {
		let q = p - 0.5;
		let r = q * q;
		(((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
			/ (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
	} else {
		let q = (-2.0 * (1.0 - p).ln()).sqrt();
		-(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
			/ ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
	}
}
