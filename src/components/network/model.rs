//! Authoritative node and link collection for one drawn network.

use log::{info, warn};

use super::adapter::{self, NodeReading};
use super::error::VizError;
use super::layout::layout;
use super::scale::ColorScale;
use super::snapshot::{Snapshot, WeightsBiases};
use super::types::{NodeId, Role};

/// Bounded per-epoch gradient magnitudes, oldest dropped first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
	data: Vec<f64>,
	capacity: usize,
}

impl History {
	pub fn new(capacity: usize) -> Self {
		Self {
			data: Vec::with_capacity(capacity.min(256)),
			capacity,
		}
	}

	pub fn push(&mut self, value: f64) {
		if self.capacity == 0 {
			return;
		}
		if self.data.len() >= self.capacity {
			self.data.remove(0);
		}
		self.data.push(value);
	}

	pub fn data(&self) -> &[f64] {
		&self.data
	}
}

#[derive(Clone, Debug)]
pub struct Node {
	pub id: NodeId,
	pub role: Role,
	pub x: f64,
	pub y: f64,
	pub reading: NodeReading,
	pub history: History,
	pub salient: bool,
}

/// Dense edge between adjacent layers. Endpoints are node identities.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
	pub source: NodeId,
	pub target: NodeId,
	pub weight: Option<f64>,
}

pub struct GraphModel {
	layer_sizes: Vec<usize>,
	nodes: Vec<Node>,
	links: Vec<Link>,
	generation: u64,
	history_len: usize,
}

impl GraphModel {
	pub fn new(history_len: usize) -> Self {
		Self {
			layer_sizes: Vec::new(),
			nodes: Vec::new(),
			links: Vec::new(),
			generation: 0,
			history_len,
		}
	}

	/// Replaces every node and link with a fresh graph for `layer_sizes`.
	///
	/// Link weights come from `weights`, falling back to the snapshot's own
	/// tensors. Bumps the generation, invalidating outside references.
	pub fn rebuild(
		&mut self,
		layer_sizes: &[usize],
		width: f64,
		height: f64,
		weights: Option<&WeightsBiases>,
		snapshot: Option<&Snapshot>,
	) -> Result<(), VizError> {
		if layer_sizes.len() < 2 {
			return Err(VizError::InvalidLayerSizes {
				len: layer_sizes.len(),
			});
		}
		for (layer, _) in layer_sizes.iter().enumerate().filter(|(_, n)| **n == 0) {
			warn!("Layer {layer} has no neurons; it is drawn empty and left unconnected");
		}

		self.clear();
		self.generation += 1;
		self.layer_sizes = layer_sizes.to_vec();

		let layer_count = layer_sizes.len();
		self.nodes = layout(layer_sizes, width, height)
			.into_iter()
			.map(|p| Node {
				id: p.id,
				role: Role::for_layer(p.id.layer, layer_count),
				x: p.x,
				y: p.y,
				reading: NodeReading::default(),
				history: History::new(self.history_len),
				salient: false,
			})
			.collect();

		for layer in 0..layer_count - 1 {
			for s in 0..layer_sizes[layer] {
				for t in 0..layer_sizes[layer + 1] {
					self.links.push(Link {
						source: NodeId::new(layer, s),
						target: NodeId::new(layer + 1, t),
						weight: None,
					});
				}
			}
		}

		if let Some(snapshot) = snapshot {
			self.apply_readings(snapshot);
		}
		self.resolve_weights(weights.or(snapshot.and_then(|s| s.weights_biases_data.as_ref())));

		info!(
			"Built network {:?}: {} nodes, {} links",
			self.layer_sizes,
			self.nodes.len(),
			self.links.len()
		);
		Ok(())
	}

	/// Re-resolves display data and link weights in place. Identity, position
	/// and topology are untouched.
	pub fn refresh(&mut self, snapshot: &Snapshot) {
		self.apply_readings(snapshot);
		self.resolve_weights(snapshot.weights_biases_data.as_ref());
	}

	fn apply_readings(&mut self, snapshot: &Snapshot) {
		for node in &mut self.nodes {
			node.reading = adapter::resolve(node.id, Some(snapshot), &self.layer_sizes);
			if let Some(g) = node.reading.gradient {
				node.history.push(g.abs());
			}
		}
	}

	fn resolve_weights(&mut self, weights: Option<&WeightsBiases>) {
		let layer_count = self.layer_sizes.len();
		for link in &mut self.links {
			link.weight = adapter::link_weight(weights, link.source, link.target.index, layer_count);
		}
	}

	/// Flags nodes whose activation exceeds the scale's threshold.
	pub fn mark_salient(&mut self, scale: &ColorScale) {
		for node in &mut self.nodes {
			node.salient = node.role != Role::Input
				&& node.reading.activation.is_some_and(|a| scale.is_salient(a));
		}
	}

	/// Activations that drive the color scale; input nodes are excluded.
	pub fn scaled_activations(&self) -> impl Iterator<Item = f64> + '_ {
		self.nodes
			.iter()
			.filter(|n| n.role != Role::Input)
			.filter_map(|n| n.reading.activation)
	}

	/// Recomputes coordinates for a new canvas size, keeping node data.
	pub fn relayout(&mut self, width: f64, height: f64) {
		for p in layout(&self.layer_sizes, width, height) {
			if let Some(node) = self.find_node_mut(p.id) {
				node.x = p.x;
				node.y = p.y;
			}
		}
	}

	/// Drops all nodes and links; a no-op on an empty model.
	pub fn clear(&mut self) {
		if self.nodes.is_empty() && self.links.is_empty() && self.layer_sizes.is_empty() {
			return;
		}
		self.nodes.clear();
		self.links.clear();
		self.layer_sizes.clear();
		self.generation += 1;
	}

	pub fn find_node(&self, id: NodeId) -> Option<&Node> {
		let i = self.nodes.binary_search_by_key(&id, |n| n.id).ok()?;
		Some(&self.nodes[i])
	}

	fn find_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		let i = self.nodes.binary_search_by_key(&id, |n| n.id).ok()?;
		Some(&mut self.nodes[i])
	}

	pub fn links_touching(&self, id: NodeId) -> impl Iterator<Item = &Link> {
		self.links
			.iter()
			.filter(move |l| l.source == id || l.target == id)
	}

	/// Moves a node. Only geometry changes; returns false for unknown ids.
	pub fn move_node(&mut self, id: NodeId, x: f64, y: f64) -> bool {
		match self.find_node_mut(id) {
			Some(node) => {
				node.x = x;
				node.y = y;
				true
			}
			None => false,
		}
	}

	pub fn layer_nodes(&self, layer: usize) -> impl Iterator<Item = &Node> {
		self.nodes.iter().filter(move |n| n.id.layer == layer)
	}

	pub fn position(&self, id: NodeId) -> Option<(f64, f64)> {
		self.find_node(id).map(|n| (n.x, n.y))
	}

	/// Topmost node within `radius` of the point.
	pub fn node_at(&self, x: f64, y: f64, radius: f64) -> Option<NodeId> {
		self.nodes
			.iter()
			.rev()
			.find(|n| (n.x - x).hypot(n.y - y) <= radius)
			.map(|n| n.id)
	}

	/// Index of the link closest to the point, if within `tolerance`.
	pub fn link_at(&self, x: f64, y: f64, tolerance: f64) -> Option<usize> {
		self.links
			.iter()
			.enumerate()
			.filter_map(|(i, l)| {
				let (x1, y1) = self.position(l.source)?;
				let (x2, y2) = self.position(l.target)?;
				Some((i, segment_distance(x, y, x1, y1, x2, y2)))
			})
			.filter(|(_, d)| *d <= tolerance)
			.min_by(|a, b| a.1.total_cmp(&b.1))
			.map(|(i, _)| i)
	}

	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub fn links(&self) -> &[Link] {
		&self.links
	}

	pub fn layer_sizes(&self) -> &[usize] {
		&self.layer_sizes
	}

	pub fn layer_count(&self) -> usize {
		self.layer_sizes.len()
	}

	/// Incremented whenever the node set is replaced or dropped.
	pub fn generation(&self) -> u64 {
		self.generation
	}
}

fn segment_distance(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
	let (dx, dy) = (x2 - x1, y2 - y1);
	let len2 = dx * dx + dy * dy;
	if len2 < 1e-12 {
		return (px - x1).hypot(py - y1);
	}
	let t = (((px - x1) * dx + (py - y1) * dy) / len2).clamp(0.0, 1.0);
	(px - (x1 + t * dx)).hypot(py - (y1 + t * dy))
}
