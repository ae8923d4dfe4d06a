/*!
Deterministic generation of the resampled training sets ("samples") that drive consolidation. Every sample is drawn from the training dataset with a seeded generator, so the same seed always produces the same sample vector.
*/

use crate::Dataset;
use num_traits::ToPrimitive;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Options controlling how the sample vector is generated.
#[derive(Debug, Clone)]
pub struct SampleOptions {
	/// The number of samples to generate. This is also the number of base trees the classifier will train.
	pub n_samples: usize,
	/// The size of each sample as a fraction of the training set size.
	pub sample_size_fraction: f32,
	/// If true, samples are bootstrap draws (with replacement). If false, each sample is a subset without replacement.
	pub with_replacement: bool,
	/// The seed for the random generator.
	pub seed: u64,
}

impl Default for SampleOptions {
	fn default() -> Self {
		Self {
			n_samples: 10,
			sample_size_fraction: 1.0,
			with_replacement: true,
			seed: 1,
		}
	}
}

/// Generate `options.n_samples` resampled variants of `dataset`.
pub fn generate_samples(dataset: &Dataset, options: &SampleOptions) -> Vec<Dataset> {
	let n_examples = dataset.n_examples();
	let sample_size = (n_examples.to_f32().unwrap() * options.sample_size_fraction)
		.round()
		.to_usize()
		.unwrap();
	let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
	(0..options.n_samples)
		.map(|_| {
			let rows: Vec<usize> = if options.with_replacement {
				(0..sample_size)
					.map(|_| rng.gen_range(0, n_examples))
					.collect()
			} else {
				let mut rows: Vec<usize> = (0..n_examples).collect();
				rows.shuffle(&mut rng);
				rows.truncate(sample_size.min(n_examples));
				rows
			};
			dataset.select_rows(&rows)
		})
		.collect()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{Column, EnumColumn, NumberColumn};
	use std::num::NonZeroUsize;

	fn test_dataset() -> Dataset {
		let columns = vec![Column::Number(NumberColumn {
			name: "x".to_owned(),
			data: (0..20).map(|i| i as f32).collect(),
		})];
		let target = EnumColumn {
			name: "class".to_owned(),
			options: vec!["a".to_owned(), "b".to_owned()],
			data: (0..20).map(|i| NonZeroUsize::new(i % 2 + 1)).collect(),
		};
		Dataset::new(columns, target)
	}

	#[test]
	fn test_sample_sizes() {
		let dataset = test_dataset();
		let options = SampleOptions {
			n_samples: 3,
			sample_size_fraction: 0.5,
			with_replacement: true,
			seed: 7,
		};
		let samples = generate_samples(&dataset, &options);
		assert_eq!(samples.len(), 3);
		for sample in samples.iter() {
			assert_eq!(sample.n_examples(), 10);
			assert_eq!(sample.n_classes(), 2);
		}
	}

	#[test]
	fn test_same_seed_same_samples() {
		let dataset = test_dataset();
		let options = SampleOptions::default();
		let left = generate_samples(&dataset, &options);
		let right = generate_samples(&dataset, &options);
		assert_eq!(left, right);
	}

	#[test]
	fn test_without_replacement_has_no_duplicates() {
		let dataset = test_dataset();
		let options = SampleOptions {
			n_samples: 1,
			sample_size_fraction: 1.0,
			with_replacement: false,
			seed: 3,
		};
		let samples = generate_samples(&dataset, &options);
		let mut values: Vec<f32> = match &samples[0].columns[0] {
			Column::Number(column) => column.data.clone(),
			_ => unreachable!(),
		};
		values.sort_by(|a, b| a.partial_cmp(b).unwrap());
		values.dedup();
		assert_eq!(values.len(), 20);
	}
}
