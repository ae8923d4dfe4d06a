use super::StreamingMetric;
use num_traits::ToPrimitive;

/// `AggregateStats` collects a set of values and summarizes them with their mean, minimum, maximum, sum, median, and standard deviation. It is used to aggregate per-node structure preservation percentages and per-tree complexity measures across an ensemble.
#[derive(Debug, Default)]
pub struct AggregateStats {
	values: Vec<f64>,
}

/// The output of [`AggregateStats`](struct.AggregateStats.html).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStatsOutput {
	pub n: usize,
	pub mean: f64,
	pub min: f64,
	pub max: f64,
	pub sum: f64,
	pub median: f64,
	/// The square root of the population variance.
	pub std_dev: f64,
}

impl AggregateStats {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_> for AggregateStats {
	type Input = f64;
	type Output = Option<AggregateStatsOutput>;

	fn update(&mut self, input: Self::Input) {
		self.values.push(input);
	}

	fn merge(&mut self, mut other: Self) {
		self.values.append(&mut other.values);
	}

	fn finalize(self) -> Self::Output {
		let n = self.values.len();
		if n == 0 {
			return None;
		}
		let n_f64 = n.to_f64().unwrap();
		let sum: f64 = self.values.iter().sum();
		let mean = sum / n_f64;
		let mut min = std::f64::INFINITY;
		let mut max = std::f64::NEG_INFINITY;
		for value in self.values.iter() {
			min = min.min(*value);
			max = max.max(*value);
		}
		let variance = self
			.values
			.iter()
			.map(|value| (value - mean) * (value - mean))
			.sum::<f64>()
			/ n_f64;
		let mut sorted = self.values;
		sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
		let median = if n % 2 == 1 {
			sorted[n / 2]
		} else {
			(sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
		};
		Some(AggregateStatsOutput {
			n,
			mean,
			min,
			max,
			sum,
			median,
			std_dev: variance.sqrt(),
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::StreamingMetric;

	#[test]
	fn test_aggregate_stats() {
		let mut stats = AggregateStats::new();
		for value in &[4.0, 1.0, 3.0, 2.0] {
			stats.update(*value);
		}
		let output = stats.finalize().unwrap();
		assert_eq!(output.n, 4);
		assert_eq!(output.mean, 2.5);
		assert_eq!(output.min, 1.0);
		assert_eq!(output.max, 4.0);
		assert_eq!(output.sum, 10.0);
		assert_eq!(output.median, 2.5);
		assert!((output.std_dev - 1.118_033_988_749_895).abs() < 1e-12);
	}

	#[test]
	fn test_aggregate_stats_odd_median() {
		let mut stats = AggregateStats::new();
		for value in &[5.0, 1.0, 3.0] {
			stats.update(*value);
		}
		assert_eq!(stats.finalize().unwrap().median, 3.0);
	}

	#[test]
	fn test_aggregate_stats_merge() {
		let mut left = AggregateStats::new();
		left.update(1.0);
		let mut right = AggregateStats::new();
		right.update(3.0);
		left.merge(right);
		let output = left.finalize().unwrap();
		assert_eq!(output.mean, 2.0);
		assert_eq!(output.n, 2);
	}

	#[test]
	fn test_aggregate_stats_empty() {
		assert!(AggregateStats::new().finalize().is_none());
	}

	#[test]
	fn test_aggregate_stats_constant_values_have_zero_deviation() {
		let mut stats = AggregateStats::new();
		for _ in 0..5 {
			stats.update(100.0);
		}
		let output = stats.finalize().unwrap();
		assert_eq!(output.mean, 100.0);
		assert_eq!(output.std_dev, 0.0);
	}
}
