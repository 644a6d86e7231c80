use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, error, info, warn};

use super::config::VizConfig;
use super::model::GraphModel;
use super::popup::{LinkHover, PopupController, Visibility};
use super::scale::ColorScale;
use super::scheduler::{LossSink, Scheduler};
use super::snapshot::{Epochs, Snapshot, WeightsBiases};
use super::types::NodeId;

/// How long a node rings after a token lands on it.
const PULSE_MS: f64 = 400.0;

#[derive(Clone, Debug, Default)]
pub struct DragState {
	pub node: Option<NodeId>,
	/// Pointer offset from the node center at grab time.
	pub grab_dx: f64,
	pub grab_dy: f64,
}

/// One visualization: graph model, interaction, animation and color scale.
pub struct NetworkState {
	pub config: VizConfig,
	pub model: GraphModel,
	pub popup: PopupController,
	pub link_hover: LinkHover,
	pub scheduler: Scheduler,
	pub scale: ColorScale,
	pub drag: DragState,
	pub width: f64,
	pub height: f64,
	/// Timestamp of the latest frame, milliseconds.
	pub now: f64,
	last_frame: Option<f64>,
	hover_node: Option<NodeId>,
	over_popup: bool,
	/// Latest token arrival per node.
	pulses: BTreeMap<NodeId, f64>,
}

impl NetworkState {
	pub fn new(config: VizConfig, width: f64, height: f64) -> Self {
		Self {
			model: GraphModel::new(config.history_len),
			popup: PopupController::new(config.popup_grace_ms),
			link_hover: LinkHover::default(),
			scheduler: Scheduler::new(config.visibility_multiplier),
			scale: ColorScale::default(),
			drag: DragState::default(),
			config,
			width,
			height,
			now: 0.0,
			last_frame: None,
			hover_node: None,
			over_popup: false,
			pulses: BTreeMap::new(),
		}
	}

	/// Rebuilds the whole graph for a (possibly new) network shape.
	pub fn draw_neural_network(
		&mut self,
		layer_sizes: &[usize],
		weights: Option<&WeightsBiases>,
		snapshot: Option<&Snapshot>,
	) {
		info!("Drawing neural network with layers {layer_sizes:?}");
		self.reset_interaction();
		if let Err(e) = self
			.model
			.rebuild(layer_sizes, self.width, self.height, weights, snapshot)
		{
			error!("Cannot draw network: {e}");
			self.model.clear();
			self.scale = ColorScale::default();
			return;
		}
		self.rescale(self.config.percentile);
	}

	/// Refreshes node data in place, rebuilding only if the shape changed.
	pub fn update_nodes_with_data(
		&mut self,
		snapshot: &Snapshot,
		layer_sizes: &[usize],
		percentile: Option<f64>,
	) {
		if layer_sizes != self.model.layer_sizes() {
			warn!(
				"Layer shape changed from {:?} to {layer_sizes:?}; rebuilding",
				self.model.layer_sizes()
			);
			self.draw_neural_network(layer_sizes, None, Some(snapshot));
			return;
		}
		self.model.refresh(snapshot);
		self.rescale(percentile.unwrap_or(self.config.percentile));
		self.popup.sync(&self.model);
	}

	fn rescale(&mut self, percentile: f64) {
		self.scale = ColorScale::from_activations(self.model.scaled_activations(), percentile);
		self.model.mark_salient(&self.scale);
	}

	/// Queues epochs for animation. `input_neurons` defaults to the input
	/// layer's size.
	pub fn animate_data_flow(&mut self, epochs: impl Into<Epochs>, input_neurons: Option<usize>) {
		let epochs = epochs.into();
		let input_neurons = input_neurons
			.or_else(|| self.model.layer_sizes().first().copied())
			.unwrap_or(0);
		info!("Queueing {} epochs for animation", epochs.0.len());
		if !self.scheduler.is_idle() {
			debug!("{} epochs already waiting", self.scheduler.pending());
		}
		self.scheduler.enqueue(epochs, input_neurons);
	}

	/// Drops the graph and everything derived from it.
	pub fn clear_network(&mut self) {
		self.model.clear();
		self.scheduler.clear();
		self.scale = ColorScale::default();
		self.reset_interaction();
		info!("Network cleared");
	}

	fn reset_interaction(&mut self) {
		self.popup.reset();
		self.link_hover.set(None);
		self.drag = DragState::default();
		self.hover_node = None;
		self.over_popup = false;
		self.pulses.clear();
	}

	/// Advances one frame to `now` (milliseconds).
	pub fn tick(&mut self, now: f64, stop: bool, sink: &mut impl LossSink) {
		let dt = self.last_frame.map_or(0.0, |last| (now - last).max(0.0) / 1000.0);
		self.last_frame = Some(now);
		self.now = now;
		self.popup.tick(now, dt);
		for arrival in self.scheduler.tick(now, &self.model, stop, sink) {
			self.pulses.insert(arrival.to, arrival.at_ms);
		}
		self.pulses.retain(|_, at| now - *at < PULSE_MS);
	}

	/// Strength of a node's arrival pulse at the current frame, from 1 (just
	/// hit) down to 0.
	pub fn pulse(&self, id: NodeId) -> f64 {
		self.pulses
			.get(&id)
			.map_or(0.0, |at| (1.0 - (self.now - at) / PULSE_MS).clamp(0.0, 1.0))
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		self.width = width;
		self.height = height;
		self.model.relayout(width, height);
	}

	/// Popup panel bounds as `(x, y, w, h)`.
	pub fn popup_rect(&self) -> (f64, f64, f64, f64) {
		let (ax, ay) = self.popup.anchor();
		let (ox, oy) = self.config.popup_offset;
		(
			ax + ox,
			ay + oy,
			self.config.popup_width,
			self.config.popup_height,
		)
	}

	fn in_popup(&self, x: f64, y: f64) -> bool {
		if self.popup.visibility() == Visibility::Hidden {
			return false;
		}
		let (px, py, w, h) = self.popup_rect();
		x >= px && x <= px + w && y >= py && y <= py + h
	}

	pub fn pointer_move(&mut self, x: f64, y: f64) {
		if let Some(id) = self.drag.node {
			self.model
				.move_node(id, x - self.drag.grab_dx, y - self.drag.grab_dy);
			self.popup.drag_to((x, y));
			let over_popup = self.in_popup(x, y);
			if over_popup && !self.over_popup {
				self.popup.enter_popup();
			} else if !over_popup && self.over_popup {
				self.popup.leave_popup();
			}
			self.over_popup = over_popup;
			return;
		}

		let node = self
			.model
			.node_at(x, y, self.config.node_radius + self.config.hit_slop);
		let over_popup = self.in_popup(x, y);

		// Enters before leaves, so crossing from node to popup (or back)
		// never sees both flags clear.
		if node != self.hover_node {
			if let Some(n) = node.and_then(|id| self.model.find_node(id)) {
				self.popup.enter_node(n, (x, y));
			}
		}
		if over_popup && !self.over_popup {
			self.popup.enter_popup();
		}
		if node != self.hover_node && self.hover_node.is_some() && node.is_none() {
			self.popup.leave_node(self.now);
		}
		if !over_popup && self.over_popup {
			self.popup.leave_popup();
		}
		self.hover_node = node;
		self.over_popup = over_popup;

		let link = if node.is_none() && !over_popup {
			self.model.link_at(x, y, self.config.link_hit_tolerance)
		} else {
			None
		};
		self.link_hover.set(link);
	}

	/// Starts dragging the node under the pointer. Returns whether one was hit.
	pub fn pointer_down(&mut self, x: f64, y: f64) -> bool {
		let hit = self
			.model
			.node_at(x, y, self.config.node_radius + self.config.hit_slop)
			.and_then(|id| self.model.find_node(id));
		let Some(node) = hit else {
			return false;
		};
		self.drag = DragState {
			node: Some(node.id),
			grab_dx: x - node.x,
			grab_dy: y - node.y,
		};
		self.popup.begin_drag(node, (x, y));
		self.link_hover.set(None);
		true
	}

	pub fn pointer_up(&mut self) {
		if self.drag.node.take().is_some() {
			self.popup.end_drag(&self.model);
		}
	}

	pub fn pointer_leave(&mut self) {
		self.pointer_up();
		if self.hover_node.take().is_some() {
			self.popup.leave_node(self.now);
		}
		if std::mem::take(&mut self.over_popup) {
			self.popup.leave_popup();
		}
		self.link_hover.set(None);
	}
}

/// Shared handle to one [`NetworkState`], held by the host page and the
/// canvas component alike.
#[derive(Clone)]
pub struct NetworkViz(Rc<RefCell<NetworkState>>);

impl NetworkViz {
	pub fn new(config: VizConfig) -> Self {
		Self(Rc::new(RefCell::new(NetworkState::new(config, 0.0, 0.0))))
	}

	/// Runs `f` on the state, or logs and skips if it is already borrowed.
	pub fn with<R>(&self, f: impl FnOnce(&mut NetworkState) -> R) -> Option<R> {
		match self.0.try_borrow_mut() {
			Ok(mut state) => Some(f(&mut state)),
			Err(_) => {
				error!("Network state is busy; call skipped");
				None
			}
		}
	}

	pub fn draw_neural_network(
		&self,
		layer_sizes: &[usize],
		weights: Option<&WeightsBiases>,
		snapshot: Option<&Snapshot>,
	) {
		self.with(|s| s.draw_neural_network(layer_sizes, weights, snapshot));
	}

	pub fn update_nodes_with_data(
		&self,
		snapshot: &Snapshot,
		layer_sizes: &[usize],
		percentile: Option<f64>,
	) {
		self.with(|s| s.update_nodes_with_data(snapshot, layer_sizes, percentile));
	}

	pub fn animate_data_flow(&self, epochs: impl Into<Epochs>, input_neurons: Option<usize>) {
		self.with(|s| s.animate_data_flow(epochs, input_neurons));
	}

	pub fn clear_network(&self) {
		self.with(NetworkState::clear_network);
	}
}
