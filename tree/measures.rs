/*!
Named measures. Downstream evaluation harnesses look up statistics about a trained classifier by name, so every measure is addressable through a single string-keyed entry point. Names are matched case-insensitively.
*/

use crate::error::MeasureError;
use crate::{PartiallyConsolidatedClassifier, Tree};
use num_traits::ToPrimitive;
use pctbagging_metrics::{AggregateStats, AggregateStatsOutput, StreamingMetric};

const STATS: [&str; 6] = ["Avg", "Min", "Max", "Sum", "Mdn", "Dev"];
const TREE_METRICS: [&str; 4] = [
	"NumLeaves",
	"NumInnerNodes",
	"ExplanationLength",
	"WeightedExplanationLength",
];

impl PartiallyConsolidatedClassifier {
	/// Every measure name `measure` accepts.
	pub fn enumerate_measures(&self) -> Vec<String> {
		let mut measures = vec![
			"measureElapsedTimeTrainingWholeCT".to_owned(),
			"measureElapsedTimeTrainingPartialCT".to_owned(),
			"measureElapsedTimeTrainingAssocBagging".to_owned(),
		];
		for stat in STATS.iter().filter(|stat| **stat != "Sum") {
			measures.push(format!("measure{}PercBaseTreesPreservingStructure", stat));
		}
		for stat in STATS.iter() {
			for metric in TREE_METRICS.iter() {
				measures.push(format!("measure{}{}", stat, metric));
			}
		}
		measures
	}

	/// Look up a measure by name, case-insensitively. The preservation measures are `NaN` when no preservation statistic exists, which happens when the consolidated tree is a single leaf.
	pub fn measure(&self, name: &str) -> Result<f64, MeasureError> {
		let key = name.to_lowercase();
		match key.as_str() {
			"measureelapsedtimetrainingwholect" => {
				return Ok(self.train_times.whole_consolidated)
			}
			"measureelapsedtimetrainingpartialct" => {
				return Ok(self.train_times.partial_consolidated)
			}
			"measureelapsedtimetrainingassocbagging" => return Ok(self.train_times.bagging),
			_ => {}
		}
		let unknown = || MeasureError {
			name: name.to_owned(),
		};
		if !key.starts_with("measure") {
			return Err(unknown());
		}
		let rest = &key["measure".len()..];
		if rest.len() < 3 || !rest.is_char_boundary(3) {
			return Err(unknown());
		}
		let stat = &rest[..3];
		let metric = &rest[3..];
		if metric == "percbasetreespreservingstructure" {
			let output = match &self.structure_preservation {
				Some(stat) => stat,
				None => return Ok(std::f64::NAN),
			};
			return match stat {
				"avg" => Ok(output.mean),
				"min" => Ok(output.min),
				"max" => Ok(output.max),
				"mdn" => Ok(output.median),
				"dev" => Ok(output.std_dev),
				_ => Err(unknown()),
			};
		}
		let per_tree: fn(&Tree) -> f64 = match metric {
			"numleaves" => |tree| tree.n_leaves().to_f64().unwrap(),
			"numinnernodes" => |tree| tree.n_inner_nodes().to_f64().unwrap(),
			"explanationlength" => Tree::explanation_length,
			"weightedexplanationlength" => Tree::weighted_explanation_length,
			_ => return Err(unknown()),
		};
		let output = match self.base_tree_stats(per_tree) {
			Some(output) => output,
			None => return Ok(std::f64::NAN),
		};
		match stat {
			"avg" => Ok(output.mean),
			"min" => Ok(output.min),
			"max" => Ok(output.max),
			"sum" => Ok(output.sum),
			"mdn" => Ok(output.median),
			"dev" => Ok(output.std_dev),
			_ => Err(unknown()),
		}
	}

	fn base_tree_stats(&self, per_tree: fn(&Tree) -> f64) -> Option<AggregateStatsOutput> {
		let mut stats = AggregateStats::new();
		for tree in self.base_trees.iter() {
			stats.update(per_tree(tree));
		}
		stats.finalize()
	}
}
