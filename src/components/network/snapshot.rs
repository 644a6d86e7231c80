//! Per-epoch training telemetry as produced by the trainer.
//!
//! Every field decodes leniently: anything absent or malformed becomes `None`
//! rather than failing the whole snapshot, so display code can show "unknown".

use std::collections::BTreeMap;

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::error::VizError;

/// Arbitrarily nested numeric payload. JSON arrays and objects keyed by
/// decimal indices are both addressable with [`Tensor::at`]. A `null` leaf
/// (what `NaN` serializes to) stays in place as `Missing`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Tensor {
	Scalar(f64),
	List(Vec<Tensor>),
	Keyed(BTreeMap<String, Tensor>),
	Missing,
}

impl Tensor {
	pub fn at(&self, index: usize) -> Option<&Tensor> {
		match self {
			Tensor::Scalar(_) | Tensor::Missing => None,
			Tensor::List(items) => items.get(index),
			Tensor::Keyed(map) => map.get(&index.to_string()),
		}
	}

	pub fn scalar(&self) -> Option<f64> {
		match self {
			Tensor::Scalar(v) if v.is_finite() => Some(*v),
			_ => None,
		}
	}

	/// All finite scalars, depth first.
	pub fn leaves(&self) -> Vec<f64> {
		let mut out = Vec::new();
		self.collect_leaves(&mut out);
		out
	}

	fn collect_leaves(&self, out: &mut Vec<f64>) {
		match self {
			Tensor::Scalar(v) if v.is_finite() => out.push(*v),
			Tensor::Scalar(_) | Tensor::Missing => {}
			Tensor::List(items) => items.iter().for_each(|t| t.collect_leaves(out)),
			Tensor::Keyed(map) => map.values().for_each(|t| t.collect_leaves(out)),
		}
	}

	/// Scalar as-is, anything deeper reduced to the arithmetic mean of its leaves.
	pub fn mean(&self) -> Option<f64> {
		mean(&self.leaves())
	}

	/// Whether this holds nested values rather than being a leaf.
	pub fn is_nested(&self) -> bool {
		matches!(self, Tensor::List(_) | Tensor::Keyed(_))
	}

	/// Values for one neuron out of a batch-major `[row][neuron]` tensor, or the
	/// single entry of a flat `[neuron]` vector.
	pub fn column(&self, index: usize) -> Vec<f64> {
		match self {
			Tensor::List(rows) if rows.iter().any(Tensor::is_nested) => rows
				.iter()
				.filter_map(|row| row.at(index).and_then(Tensor::scalar))
				.collect(),
			_ => self.at(index).and_then(Tensor::scalar).into_iter().collect(),
		}
	}
}

impl From<f64> for Tensor {
	fn from(v: f64) -> Self {
		Tensor::Scalar(v)
	}
}

impl<T: Into<Tensor>> From<Vec<T>> for Tensor {
	fn from(items: Vec<T>) -> Self {
		Tensor::List(items.into_iter().map(Into::into).collect())
	}
}

pub fn mean(values: &[f64]) -> Option<f64> {
	if values.is_empty() {
		None
	} else {
		Some(values.iter().sum::<f64>() / values.len() as f64)
	}
}

fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let value = Value::deserialize(de)?;
	Ok(serde_json::from_value(value).ok())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ForwardData {
	/// Batch rows of input values.
	#[serde(default, deserialize_with = "lenient")]
	pub input: Option<Tensor>,
	/// Batch-major activations of the first hidden layer.
	#[serde(default, deserialize_with = "lenient")]
	pub hidden_activation: Option<Tensor>,
	/// Batch-major network output.
	#[serde(default, deserialize_with = "lenient")]
	pub output: Option<Tensor>,
	/// Per-layer activations keyed by layer index, for deeper networks.
	#[serde(default, deserialize_with = "lenient")]
	pub activations: Option<Tensor>,
	/// Per-layer weighted sums keyed by layer index.
	#[serde(default, deserialize_with = "lenient")]
	pub pre_activations: Option<Tensor>,
	/// Seconds.
	#[serde(default, deserialize_with = "lenient")]
	pub forward_time: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BackwardData {
	/// `[neuron][source]` gradient rows of the first hidden layer.
	#[serde(default, deserialize_with = "lenient")]
	pub hidden_grad: Option<Tensor>,
	#[serde(default, deserialize_with = "lenient")]
	pub output_grad: Option<Tensor>,
	/// Per-layer gradients keyed by layer index, for deeper networks.
	#[serde(default, deserialize_with = "lenient")]
	pub gradients: Option<Tensor>,
	/// Seconds.
	#[serde(default, deserialize_with = "lenient")]
	pub backward_time: Option<f64>,
}

/// Weight tensors are indexed `[target][source]`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WeightsBiases {
	#[serde(default, deserialize_with = "lenient")]
	pub input_weights: Option<Tensor>,
	/// Keyed by source layer index.
	#[serde(default, deserialize_with = "lenient")]
	pub hidden_weights: Option<Tensor>,
	#[serde(default, deserialize_with = "lenient")]
	pub output_weights: Option<Tensor>,
	/// Flat for a single hidden layer, otherwise keyed by layer index.
	#[serde(default, deserialize_with = "lenient")]
	pub hidden_biases: Option<Tensor>,
	#[serde(default, deserialize_with = "lenient")]
	pub output_biases: Option<Tensor>,
	/// Per-layer biases keyed by layer index.
	#[serde(default, deserialize_with = "lenient")]
	pub biases: Option<Tensor>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Snapshot {
	#[serde(default, deserialize_with = "lenient")]
	pub epoch: Option<u64>,
	#[serde(default, deserialize_with = "lenient")]
	pub loss: Option<f64>,
	#[serde(default, deserialize_with = "lenient")]
	pub forward_data: Option<ForwardData>,
	#[serde(default, deserialize_with = "lenient")]
	pub backward_data: Option<BackwardData>,
	#[serde(default, deserialize_with = "lenient")]
	pub weights_biases_data: Option<WeightsBiases>,
}

impl Snapshot {
	pub fn forward_time(&self) -> Option<f64> {
		self.forward_data.as_ref()?.forward_time
	}

	pub fn backward_time(&self) -> Option<f64> {
		self.backward_data.as_ref()?.backward_time
	}

	pub fn inputs(&self) -> Option<&Tensor> {
		self.forward_data.as_ref()?.input.as_ref()
	}
}

/// One snapshot or an ordered run of them.
#[derive(Clone, Debug, Default)]
pub struct Epochs(pub Vec<Snapshot>);

impl From<Snapshot> for Epochs {
	fn from(snapshot: Snapshot) -> Self {
		Epochs(vec![snapshot])
	}
}

impl From<Vec<Snapshot>> for Epochs {
	fn from(snapshots: Vec<Snapshot>) -> Self {
		Epochs(snapshots)
	}
}

/// Decodes a JSON epoch payload. A bare object is treated as a one-epoch run;
/// array entries that are not snapshot objects are skipped.
pub fn parse_epochs(json: &str) -> Result<Epochs, VizError> {
	let value: Value = serde_json::from_str(json)?;
	let items = match value {
		Value::Array(items) => items,
		other => vec![other],
	};
	let snapshots = items
		.into_iter()
		.enumerate()
		.filter_map(|(i, item)| match serde_json::from_value::<Snapshot>(item) {
			Ok(s) => Some(s),
			Err(e) => {
				warn!("Skipping epoch payload {i}: {e}");
				None
			}
		})
		.collect();
	Ok(Epochs(snapshots))
}
