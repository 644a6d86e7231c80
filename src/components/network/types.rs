use std::fmt;

/// Stable identity of a neuron: the only join key across snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
	pub layer: usize,
	pub index: usize,
}

impl NodeId {
	pub const fn new(layer: usize, index: usize) -> Self {
		Self { layer, index }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
	Input,
	/// Hidden layer, carrying its layer index.
	Hidden(usize),
	Output,
}

impl Role {
	pub fn for_layer(layer: usize, layer_count: usize) -> Self {
		if layer == 0 {
			Role::Input
		} else if layer + 1 == layer_count {
			Role::Output
		} else {
			Role::Hidden(layer)
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Role::Input => f.write_str("Input"),
			Role::Hidden(k) => write!(f, "Hidden Layer {k}"),
			Role::Output => f.write_str("Output"),
		}
	}
}

/// Display form of a resolved value: four decimals, or `N/A` when unknown.
pub fn fmt_reading(value: Option<f64>) -> String {
	match value {
		Some(v) if v.is_finite() => format!("{v:.4}"),
		_ => "N/A".into(),
	}
}

/// Which way a light token travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
	Forward,
	Backward,
}
