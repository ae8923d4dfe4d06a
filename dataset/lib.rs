/*!
This crate provides the dataset model used to train partially consolidated tree ensembles: weighted instances stored column-major, where each feature column is either a number column or an enum column, and the target is always an enum column. It implements only what tree construction needs, so there is no generic loading or I/O here.
*/

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

pub mod sample;

pub use self::sample::*;

/// A `Dataset` is an ordered sequence of weighted, labeled examples. Feature values are stored column-major. Datasets are never mutated once handed to a tree builder: splitting copies rows out with [`select_rows`](Dataset::select_rows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
	/// The feature columns. Every column has the same length.
	pub columns: Vec<Column>,
	/// The class column. `options` holds the class names.
	pub target: EnumColumn,
	/// The weight of each example.
	pub weights: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
	Number(NumberColumn),
	Enum(EnumColumn),
}

/// A column of `f32` values. `NaN` marks a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f32>,
}

/// A column of enum values. The value at index i is a 1-based index into `options`, or `None` if the value is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

/// A single cell value, used as prediction input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
	Number(f32),
	Enum(Option<NonZeroUsize>),
}

impl Value {
	pub fn as_number(&self) -> Option<f32> {
		match self {
			Value::Number(value) => Some(*value),
			_ => None,
		}
	}
	pub fn as_enum(&self) -> Option<Option<NonZeroUsize>> {
		match self {
			Value::Enum(value) => Some(*value),
			_ => None,
		}
	}
}

impl Column {
	pub fn name(&self) -> &str {
		match self {
			Column::Number(column) => &column.name,
			Column::Enum(column) => &column.name,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Column::Number(column) => column.data.len(),
			Column::Enum(column) => column.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Dataset {
	/// Create a dataset with every example weighted 1.0.
	pub fn new(columns: Vec<Column>, target: EnumColumn) -> Self {
		let weights = vec![1.0; target.data.len()];
		Self {
			columns,
			target,
			weights,
		}
	}

	pub fn n_examples(&self) -> usize {
		self.target.data.len()
	}

	pub fn n_columns(&self) -> usize {
		self.columns.len()
	}

	pub fn n_classes(&self) -> usize {
		self.target.options.len()
	}

	pub fn class_names(&self) -> &[String] {
		&self.target.options
	}

	/// The sum of the example weights.
	pub fn total_weight(&self) -> f64 {
		self.weights
			.iter()
			.map(|weight| weight.to_f64().unwrap())
			.sum()
	}

	/// The weighted class distribution. Examples with a missing class value contribute nothing.
	pub fn class_distribution(&self) -> Vec<f64> {
		let mut distribution = vec![0.0; self.n_classes()];
		for (label, weight) in self.target.data.iter().zip(self.weights.iter()) {
			if let Some(label) = label {
				distribution[label.get() - 1] += weight.to_f64().unwrap();
			}
		}
		distribution
	}

	/// The 0-based index of the class with the largest weight. The first class wins ties.
	pub fn majority_class(&self) -> usize {
		let distribution = self.class_distribution();
		let mut max_index = 0;
		let mut max_weight = std::f64::MIN;
		for (index, weight) in distribution.iter().enumerate() {
			if *weight > max_weight {
				max_index = index;
				max_weight = *weight;
			}
		}
		max_index
	}

	/// The value of the cell at (`row`, `column`).
	pub fn value(&self, row: usize, column: usize) -> Value {
		match &self.columns[column] {
			Column::Number(column) => Value::Number(column.data[row]),
			Column::Enum(column) => Value::Enum(column.data[row]),
		}
	}

	/// The feature values of one example, in column order.
	pub fn row(&self, row: usize) -> Vec<Value> {
		(0..self.n_columns())
			.map(|column| self.value(row, column))
			.collect()
	}

	/// Copy the given rows out into a new dataset with the same schema.
	pub fn select_rows(&self, rows: &[usize]) -> Dataset {
		let columns = self
			.columns
			.iter()
			.map(|column| match column {
				Column::Number(column) => Column::Number(NumberColumn {
					name: column.name.clone(),
					data: rows.iter().map(|row| column.data[*row]).collect(),
				}),
				Column::Enum(column) => Column::Enum(EnumColumn {
					name: column.name.clone(),
					options: column.options.clone(),
					data: rows.iter().map(|row| column.data[*row]).collect(),
				}),
			})
			.collect();
		let target = EnumColumn {
			name: self.target.name.clone(),
			options: self.target.options.clone(),
			data: rows.iter().map(|row| self.target.data[*row]).collect(),
		};
		let weights = rows.iter().map(|row| self.weights[*row]).collect();
		Dataset {
			columns,
			target,
			weights,
		}
	}

	/// A dataset with the same schema and zero examples.
	pub fn empty_like(&self) -> Dataset {
		self.select_rows(&[])
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn enum_value(index: usize) -> Option<NonZeroUsize> {
		NonZeroUsize::new(index)
	}

	fn test_dataset() -> Dataset {
		let columns = vec![
			Column::Number(NumberColumn {
				name: "x".to_owned(),
				data: vec![0.0, 0.1, 0.9, 1.0],
			}),
			Column::Enum(EnumColumn {
				name: "color".to_owned(),
				options: vec!["red".to_owned(), "green".to_owned()],
				data: vec![enum_value(1), enum_value(2), enum_value(1), None],
			}),
		];
		let target = EnumColumn {
			name: "class".to_owned(),
			options: vec!["a".to_owned(), "b".to_owned()],
			data: vec![enum_value(1), enum_value(1), enum_value(2), enum_value(2)],
		};
		Dataset::new(columns, target)
	}

	#[test]
	fn test_class_distribution_is_weighted() {
		let mut dataset = test_dataset();
		dataset.weights = vec![1.0, 2.0, 1.0, 0.5];
		assert_eq!(dataset.class_distribution(), vec![3.0, 1.5]);
		assert_eq!(dataset.majority_class(), 0);
		assert_eq!(dataset.total_weight(), 4.5);
	}

	#[test]
	fn test_select_rows() {
		let dataset = test_dataset();
		let subset = dataset.select_rows(&[2, 3]);
		assert_eq!(subset.n_examples(), 2);
		assert_eq!(subset.value(0, 0), Value::Number(0.9));
		assert_eq!(subset.value(1, 1), Value::Enum(None));
		assert_eq!(subset.class_distribution(), vec![0.0, 2.0]);
	}

	#[test]
	fn test_majority_class_first_wins_ties() {
		let dataset = test_dataset();
		assert_eq!(dataset.class_distribution(), vec![2.0, 2.0]);
		assert_eq!(dataset.majority_class(), 0);
	}
}
