//! Hover, drag, popup and link-tooltip state.
//!
//! Everything here is a projection of the graph model plus the identity of
//! what the pointer is on; it can be dropped and rebuilt at any time.

use super::model::{GraphModel, Node};
use super::types::{NodeId, fmt_reading};

/// Hover highlight approach speeds, per second.
const FADE_IN: f64 = 1.8 * 4.0;
const FADE_OUT: f64 = 1.26 * 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
	Hidden,
	Visible,
}

/// What the node popup shows.
#[derive(Clone, Debug, PartialEq)]
pub struct PopupContent {
	pub title: String,
	pub weight: Option<f64>,
	pub bias: Option<f64>,
	pub pre_activation: Option<f64>,
	pub activation: Option<f64>,
	pub gradient: Option<f64>,
	/// Gradient magnitudes, oldest first.
	pub history: Vec<f64>,
}

impl PopupContent {
	pub fn for_node(node: &Node) -> Self {
		let r = &node.reading;
		Self {
			title: format!("{} Node {}", node.role, node.id.index),
			weight: r.weight,
			bias: r.bias,
			pre_activation: r.pre_activation,
			activation: r.activation,
			gradient: r.gradient,
			history: node.history.data().to_vec(),
		}
	}

	/// Shown while dragging: the node moved but has no new data.
	pub fn placeholder(node: &Node) -> Self {
		Self {
			title: format!("{} Node {}", node.role, node.id.index),
			weight: None,
			bias: None,
			pre_activation: None,
			activation: None,
			gradient: None,
			history: Vec::new(),
		}
	}

	pub fn lines(&self) -> [String; 5] {
		[
			format!("Weight: {}", fmt_reading(self.weight)),
			format!("Bias: {}", fmt_reading(self.bias)),
			format!("Weighted Sum: {}", fmt_reading(self.pre_activation)),
			format!("Activation: {}", fmt_reading(self.activation)),
			format!("Gradient: {}", fmt_reading(self.gradient)),
		]
	}
}

/// Single shared node popup with a debounced hide.
#[derive(Clone, Debug)]
pub struct PopupController {
	grace_ms: f64,
	over_node: bool,
	over_popup: bool,
	hovered: Option<NodeId>,
	dragging: Option<NodeId>,
	visibility: Visibility,
	anchor: (f64, f64),
	content: Option<PopupContent>,
	hide_at: Option<f64>,
	/// Eased 0..1 hover glow.
	pub highlight_t: f64,
	/// Node still glowing while the highlight fades out.
	pub fading: Option<NodeId>,
}

impl PopupController {
	pub fn new(grace_ms: f64) -> Self {
		Self {
			grace_ms,
			over_node: false,
			over_popup: false,
			hovered: None,
			dragging: None,
			visibility: Visibility::Hidden,
			anchor: (0.0, 0.0),
			content: None,
			hide_at: None,
			highlight_t: 0.0,
			fading: None,
		}
	}

	pub fn enter_node(&mut self, node: &Node, anchor: (f64, f64)) {
		self.over_node = true;
		self.hide_at = None;
		self.hovered = Some(node.id);
		self.fading = Some(node.id);
		self.anchor = anchor;
		self.content = Some(PopupContent::for_node(node));
		self.visibility = Visibility::Visible;
	}

	/// Arms the deferred hide unless the pointer is already on the popup.
	pub fn leave_node(&mut self, now: f64) {
		self.over_node = false;
		if !self.over_popup && self.visibility == Visibility::Visible {
			self.hide_at = Some(now + self.grace_ms);
		}
	}

	pub fn enter_popup(&mut self) {
		self.over_popup = true;
		self.hide_at = None;
	}

	pub fn leave_popup(&mut self) {
		self.over_popup = false;
		if !self.over_node && self.dragging.is_none() {
			self.hide();
		}
	}

	pub fn begin_drag(&mut self, node: &Node, pointer: (f64, f64)) {
		self.dragging = Some(node.id);
		self.hovered = Some(node.id);
		self.hide_at = None;
		self.anchor = pointer;
		self.content = Some(PopupContent::placeholder(node));
		self.visibility = Visibility::Visible;
	}

	pub fn drag_to(&mut self, pointer: (f64, f64)) {
		if self.dragging.is_some() {
			self.anchor = pointer;
		}
	}

	/// Hides the popup unless the pointer is on it, in which case the
	/// placeholder gives way to the node's current readings.
	pub fn end_drag(&mut self, model: &GraphModel) {
		let Some(id) = self.dragging.take() else {
			return;
		};
		match model.find_node(id) {
			Some(node) if self.over_popup => self.content = Some(PopupContent::for_node(node)),
			_ => self.hide(),
		}
	}

	pub fn dragging(&self) -> Option<NodeId> {
		self.dragging
	}

	/// Re-renders open popup content from the current model so it never goes
	/// stale while data streams in.
	pub fn sync(&mut self, model: &GraphModel) {
		if self.visibility == Visibility::Hidden || self.dragging.is_some() {
			return;
		}
		match self.hovered.and_then(|id| model.find_node(id)) {
			Some(node) => self.content = Some(PopupContent::for_node(node)),
			None => self.hide(),
		}
	}

	/// Fires a due deferred hide and advances the hover fade.
	pub fn tick(&mut self, now: f64, dt: f64) {
		if self.hide_at.is_some_and(|at| now >= at) {
			self.hide();
		}

		if self.hovered.is_some() && self.visibility == Visibility::Visible {
			self.highlight_t += (1.0 - self.highlight_t) * (FADE_IN * dt).min(1.0);
		} else {
			self.highlight_t += (0.0 - self.highlight_t) * (FADE_OUT * dt).min(1.0);
			if self.highlight_t < 0.01 {
				self.highlight_t = 0.0;
				self.fading = None;
			}
		}
	}

	fn hide(&mut self) {
		self.visibility = Visibility::Hidden;
		self.hovered = None;
		self.content = None;
		self.hide_at = None;
	}

	/// Forgets everything; used when the node set is replaced.
	pub fn reset(&mut self) {
		*self = Self::new(self.grace_ms);
	}

	pub fn visibility(&self) -> Visibility {
		self.visibility
	}

	pub fn hovered(&self) -> Option<NodeId> {
		self.hovered
	}

	pub fn content(&self) -> Option<&PopupContent> {
		self.content.as_ref()
	}

	pub fn anchor(&self) -> (f64, f64) {
		self.anchor
	}
}

/// Highlighted link plus its weight label.
#[derive(Clone, Debug, Default)]
pub struct LinkHover {
	link: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tooltip {
	pub x: f64,
	pub y: f64,
	pub text: String,
}

impl LinkHover {
	pub fn set(&mut self, link: Option<usize>) {
		self.link = link;
	}

	pub fn link(&self) -> Option<usize> {
		self.link
	}

	/// Label centered just above the hovered link's midpoint.
	pub fn tooltip(&self, model: &GraphModel) -> Option<Tooltip> {
		let link = model.links().get(self.link?)?;
		let (x1, y1) = model.position(link.source)?;
		let (x2, y2) = model.position(link.target)?;
		Some(Tooltip {
			x: (x1 + x2) / 2.0,
			y: (y1 + y2) / 2.0 - 10.0,
			text: format!("Weight: {}", fmt_reading(link.weight)),
		})
	}
}
