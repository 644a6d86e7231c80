/// Tunables for one network visualization.
#[derive(Clone, Debug, PartialEq)]
pub struct VizConfig {
	pub node_radius: f64,
	/// Extra pixels around a node that still count as a hit.
	pub hit_slop: f64,
	/// Max pointer distance from a link segment for link hover.
	pub link_hit_tolerance: f64,
	/// Delay before a popup hides after the pointer leaves its node.
	pub popup_grace_ms: f64,
	/// Scales reported pass timings so sub-millisecond transits stay visible.
	pub visibility_multiplier: f64,
	/// Percentile (0..=100) above which a node counts as salient.
	pub percentile: f64,
	/// Per-node gradient history kept for the sparkline.
	pub history_len: usize,
	pub token_radius: f64,
	pub popup_width: f64,
	pub popup_height: f64,
	/// Popup offset from the pointer anchor.
	pub popup_offset: (f64, f64),
}

impl Default for VizConfig {
	fn default() -> Self {
		Self {
			node_radius: 20.0,
			hit_slop: 4.0,
			link_hit_tolerance: 5.0,
			popup_grace_ms: 100.0,
			visibility_multiplier: 50.0,
			percentile: 75.0,
			history_len: 64,
			token_radius: 8.0,
			popup_width: 240.0,
			popup_height: 250.0,
			popup_offset: (-60.0, -50.0),
		}
	}
}
