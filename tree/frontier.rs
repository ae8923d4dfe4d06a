/*!
The frontier is the worklist of pending tree positions. Construction always expands the entry at the front; the priority criterion decides where new entries are placed.
*/

use pctbagging_dataset::Dataset;
use std::collections::VecDeque;

/// A pending position, present in the consolidated tree and in every base tree at once.
pub struct FrontierEntry {
	/// The slice of the whole training data that reaches this position.
	pub data: Dataset,
	/// The slice of each sample that reaches this position, in sample order.
	pub samples: Vec<Dataset>,
	/// The position's node index in the consolidated tree.
	pub node_index: usize,
	/// The position's node index in each base tree, in sample order.
	pub base_node_indexes: Vec<usize>,
	/// The ordering key assigned by the priority criterion, `None` for the order-insensitive criteria.
	pub order_value: Option<f64>,
	pub depth: usize,
}

/// The worklist. Entries come off the front; the push methods implement the placement policies the priority criteria need.
pub struct Frontier {
	entries: VecDeque<FrontierEntry>,
}

impl Frontier {
	pub fn new() -> Self {
		Self {
			entries: VecDeque::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn pop(&mut self) -> Option<FrontierEntry> {
		self.entries.pop_front()
	}

	/// Append to the back. Used by the level-by-level criterion, which wants breadth-first order.
	pub fn push_back(&mut self, entry: FrontierEntry) {
		self.entries.push_back(entry);
	}

	/// Place a block of entries at the front, keeping the block's internal order. Used by the preorder criteria, which want depth-first left-to-right order.
	pub fn prepend_block(&mut self, entries: Vec<FrontierEntry>) {
		for entry in entries.into_iter().rev() {
			self.entries.push_front(entry);
		}
	}

	/// Insert into the descending ordered worklist: before the first entry with a strictly smaller key, so equal keys keep their existing order. Used by best-first search.
	pub fn insert_by_value(&mut self, entry: FrontierEntry) {
		let key = order_key(&entry);
		let position = self
			.entries
			.iter()
			.position(|existing| order_key(existing) < key)
			.unwrap_or_else(|| self.entries.len());
		self.entries.insert(position, entry);
	}

	/// Order a block of entries among themselves and place the block at the front. Used by hill climbing: a node's children compete only with each other and are expanded before anything else pending.
	pub fn prepend_ordered_block(&mut self, entries: Vec<FrontierEntry>) {
		let mut block: Vec<FrontierEntry> = Vec::with_capacity(entries.len());
		for entry in entries {
			let key = order_key(&entry);
			let position = block
				.iter()
				.position(|existing| order_key(existing) < key)
				.unwrap_or_else(|| block.len());
			block.insert(position, entry);
		}
		self.prepend_block(block);
	}
}

fn order_key(entry: &FrontierEntry) -> f64 {
	entry.order_value.unwrap_or(std::f64::MAX)
}
