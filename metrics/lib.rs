/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait and the [`AggregateStats`](struct.AggregateStats.html) collector used to summarize per-tree and per-node statistics across an ensemble.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod aggregate;

pub use self::aggregate::{AggregateStats, AggregateStatsOutput};

/**
The `StreamingMetric` trait defines a common interface to metrics that can be computed in a streaming manner, where the input is available in chunks.

After being initialized, a value of type `T` implementing the `StreamingMetric` trait can have `update()` called on it with values of the associated type `Input`. Multiple values of `T` can be merged together by calling `merge()`. When finished aggregating, call `finalize()` to produce the associated type `Output`.

The seemingly unused generic lifetime `'a` exists here to allow `Input`s and `Output`s to borrow from their enclosing scope.
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	fn update(&mut self, input: Self::Input);
	fn merge(&mut self, other: Self);
	fn finalize(self) -> Self::Output;
}
