//! Resolves what a single neuron or link displays from a snapshot.
//!
//! Resolution never fails: an absent tensor or out-of-range index yields
//! `None`, which display code renders as `N/A` (distinct from a computed zero).

use super::snapshot::{Snapshot, Tensor, WeightsBiases, mean};
use super::types::NodeId;

/// Display attributes of one neuron for one snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeReading {
	/// Mean of the incoming weight row.
	pub weight: Option<f64>,
	pub bias: Option<f64>,
	pub pre_activation: Option<f64>,
	pub activation: Option<f64>,
	pub gradient: Option<f64>,
	/// Unreduced gradient values behind `gradient`.
	pub gradient_samples: Vec<f64>,
}

/// Tensor feeding the edges that leave `source_layer`.
///
/// Edges out of layer 0 prefer `input_weights`, edges into the last layer
/// prefer `output_weights`, everything else reads `hidden_weights[source_layer]`.
pub fn incoming_weights(
	weights: &WeightsBiases,
	source_layer: usize,
	layer_count: usize,
) -> Option<&Tensor> {
	if source_layer == 0 {
		if let Some(t) = &weights.input_weights {
			return Some(t);
		}
	}
	if source_layer + 2 == layer_count {
		if let Some(t) = &weights.output_weights {
			return Some(t);
		}
	}
	weights.hidden_weights.as_ref()?.at(source_layer)
}

/// Weight of the edge `source -> (source.layer + 1, target_index)`.
pub fn link_weight(
	weights: Option<&WeightsBiases>,
	source: NodeId,
	target_index: usize,
	layer_count: usize,
) -> Option<f64> {
	incoming_weights(weights?, source.layer, layer_count)?
		.at(target_index)?
		.at(source.index)?
		.scalar()
}

/// Picks the tensor for `layer`: the per-layer keyed form first, then the
/// two-layer producer keys.
fn per_layer<'a>(
	keyed: Option<&'a Tensor>,
	first_hidden: Option<&'a Tensor>,
	output: Option<&'a Tensor>,
	layer: usize,
	is_last: bool,
) -> Option<&'a Tensor> {
	keyed.and_then(|t| t.at(layer)).or(if is_last {
		output
	} else if layer == 1 {
		first_hidden
	} else {
		None
	})
}

fn bias(weights: &WeightsBiases, id: NodeId, is_last: bool) -> Option<f64> {
	let from_keyed = weights
		.biases
		.as_ref()
		.and_then(|t| t.at(id.layer))
		.and_then(|t| t.at(id.index));
	let from_producer = if is_last {
		weights.output_biases.as_ref().and_then(|t| t.at(id.index))
	} else {
		weights.hidden_biases.as_ref().and_then(|t| match t.at(id.layer) {
			Some(nested @ (Tensor::List(_) | Tensor::Keyed(_))) => nested.at(id.index),
			_ if id.layer == 1 => t.at(id.index),
			_ => None,
		})
	};
	from_keyed.or(from_producer)?.scalar()
}

/// Display data for neuron `id`. Pure: the snapshot is only read.
pub fn resolve(id: NodeId, snapshot: Option<&Snapshot>, layer_sizes: &[usize]) -> NodeReading {
	let Some(snapshot) = snapshot else {
		return NodeReading::default();
	};
	if id.layer == 0 {
		return NodeReading {
			activation: snapshot.inputs().and_then(|t| mean(&t.column(id.index))),
			..Default::default()
		};
	}

	let layer_count = layer_sizes.len();
	let is_last = id.layer + 1 == layer_count;
	let forward = snapshot.forward_data.as_ref();
	let backward = snapshot.backward_data.as_ref();

	let activation = per_layer(
		forward.and_then(|f| f.activations.as_ref()),
		forward.and_then(|f| f.hidden_activation.as_ref()),
		forward.and_then(|f| f.output.as_ref()),
		id.layer,
		is_last,
	)
	.and_then(|t| mean(&t.column(id.index)));

	let pre_activation = forward
		.and_then(|f| f.pre_activations.as_ref())
		.and_then(|t| t.at(id.layer))
		.and_then(|t| mean(&t.column(id.index)));

	let gradient_samples = per_layer(
		backward.and_then(|b| b.gradients.as_ref()),
		backward.and_then(|b| b.hidden_grad.as_ref()),
		backward.and_then(|b| b.output_grad.as_ref()),
		id.layer,
		is_last,
	)
	.and_then(|t| t.at(id.index))
	.map(Tensor::leaves)
	.unwrap_or_default();

	let weights = snapshot.weights_biases_data.as_ref();
	NodeReading {
		weight: weights
			.and_then(|w| incoming_weights(w, id.layer - 1, layer_count))
			.and_then(|t| t.at(id.index))
			.and_then(Tensor::mean),
		bias: weights.and_then(|w| bias(w, id, is_last)),
		pre_activation,
		activation,
		gradient: mean(&gradient_samples),
		gradient_samples,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use serde_json::json;

	fn snapshot(value: serde_json::Value) -> Snapshot {
		serde_json::from_value(value).unwrap()
	}

	fn weights(value: serde_json::Value) -> WeightsBiases {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn hidden_activation_is_read_at_neuron_index() {
		let s = snapshot(json!({ "forward_data": { "hidden_activation": [[0.2, 0.5]] } }));
		let sizes = [3, 2, 1];

		let r = resolve(NodeId::new(1, 1), Some(&s), &sizes);
		assert_relative_eq!(r.activation.unwrap(), 0.5);

		let r = resolve(NodeId::new(1, 2), Some(&s), &sizes);
		assert_eq!(r.activation, None);
	}

	#[test]
	fn null_sibling_only_blanks_itself() {
		let s = snapshot(json!({ "forward_data": { "hidden_activation": [[0.2, null]] } }));
		let sizes = [1, 2, 1];
		assert_relative_eq!(resolve(NodeId::new(1, 0), Some(&s), &sizes).activation.unwrap(), 0.2);
		assert_eq!(resolve(NodeId::new(1, 1), Some(&s), &sizes).activation, None);
	}

	#[test]
	fn batched_activation_reduces_to_mean() {
		let s = snapshot(json!({ "forward_data": { "output": [[1.0], [3.0]] } }));
		let r = resolve(NodeId::new(2, 0), Some(&s), &[2, 2, 1]);
		assert_relative_eq!(r.activation.unwrap(), 2.0);
	}

	#[test]
	fn input_nodes_report_inputs_only() {
		let s = snapshot(json!({
			"forward_data": { "input": [[0.25, 0.75]] },
			"weights_biases_data": { "input_weights": [[1.0, 2.0]] },
			"backward_data": { "hidden_grad": [[0.1, 0.1]] },
		}));
		let r = resolve(NodeId::new(0, 1), Some(&s), &[2, 1]);
		assert_relative_eq!(r.activation.unwrap(), 0.75);
		assert_eq!(r.weight, None);
		assert_eq!(r.bias, None);
		assert_eq!(r.gradient, None);
	}

	#[test]
	fn gradient_row_keeps_unreduced_samples() {
		let s = snapshot(json!({ "backward_data": { "hidden_grad": [[0.0, 0.0], [0.2, 0.4]] } }));
		let r = resolve(NodeId::new(1, 1), Some(&s), &[2, 2, 1]);
		assert_relative_eq!(r.gradient.unwrap(), 0.3);
		assert_eq!(r.gradient_samples, vec![0.2, 0.4]);
	}

	#[test]
	fn weight_and_bias_come_from_producer_keys() {
		let s = snapshot(json!({
			"weights_biases_data": {
				"input_weights": [[0.1, 0.3], [0.5, 0.7]],
				"hidden_biases": [0.01, 0.02],
				"output_weights": [[1.0, 2.0]],
				"output_biases": [0.5],
			}
		}));
		let sizes = [2, 2, 1];
		let hidden = resolve(NodeId::new(1, 1), Some(&s), &sizes);
		assert_relative_eq!(hidden.weight.unwrap(), 0.6);
		assert_relative_eq!(hidden.bias.unwrap(), 0.02);

		let output = resolve(NodeId::new(2, 0), Some(&s), &sizes);
		assert_relative_eq!(output.weight.unwrap(), 1.5);
		assert_relative_eq!(output.bias.unwrap(), 0.5);
		assert_eq!(output.pre_activation, None);
	}

	#[test]
	fn deep_networks_read_keyed_layers() {
		let s = snapshot(json!({
			"forward_data": {
				"activations": { "2": [[0.9, 0.8, 0.7]] },
				"pre_activations": { "2": [[-0.1, 0.0, 0.1]] },
			},
			"backward_data": { "gradients": { "2": [0.4, 0.5, 0.6] } },
			"weights_biases_data": { "biases": { "2": [1.0, 2.0, 3.0] } },
		}));
		let r = resolve(NodeId::new(2, 2), Some(&s), &[2, 3, 3, 1]);
		assert_relative_eq!(r.activation.unwrap(), 0.7);
		assert_relative_eq!(r.pre_activation.unwrap(), 0.1);
		assert_relative_eq!(r.gradient.unwrap(), 0.6);
		assert_relative_eq!(r.bias.unwrap(), 3.0);
		assert_eq!(r.weight, None);
	}

	#[test]
	fn missing_snapshot_is_all_unknown() {
		assert_eq!(resolve(NodeId::new(1, 0), None, &[1, 1]), NodeReading::default());
	}

	#[test]
	fn link_weights_index_target_then_source() {
		let w = weights(json!({
			"input_weights": [[0.0, 0.1, 0.2], [1.0, 1.1, 1.2], [2.0, 2.1, 2.2], [3.0, 3.1, 3.2]],
			"output_weights": [[10.0, 10.1, 10.2, 10.3], [11.0, 11.1, 11.2, 11.3]],
		}));
		let sizes = [3, 4, 2];
		for s in 0..3 {
			for t in 0..4 {
				let got = link_weight(Some(&w), NodeId::new(0, s), t, sizes.len()).unwrap();
				assert_relative_eq!(got, t as f64 + s as f64 / 10.0);
			}
		}
		for s in 0..4 {
			for t in 0..2 {
				let got = link_weight(Some(&w), NodeId::new(1, s), t, sizes.len()).unwrap();
				assert_relative_eq!(got, 10.0 + t as f64 + s as f64 / 10.0);
			}
		}
		assert_eq!(link_weight(Some(&w), NodeId::new(0, 0), 4, sizes.len()), None);
	}

	#[test]
	fn unsupplied_layers_resolve_unknown() {
		let w = weights(json!({
			"input_weights": [[0.5]],
			"output_weights": [[0.5]],
		}));
		assert_eq!(link_weight(Some(&w), NodeId::new(1, 0), 0, 4), None);
		assert_eq!(link_weight(None, NodeId::new(0, 0), 0, 4), None);

		let w = weights(json!({ "hidden_weights": { "1": [[0.25]] } }));
		assert_relative_eq!(link_weight(Some(&w), NodeId::new(1, 0), 0, 4).unwrap(), 0.25);
	}
}
