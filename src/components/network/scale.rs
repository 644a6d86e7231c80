//! Activation color scale and salience threshold, rebuilt from every snapshot.

/// Viridis control points, evenly spaced over [0, 1].
const VIRIDIS: &[[u8; 3]] = &[
	[0x44, 0x01, 0x54],
	[0x48, 0x28, 0x78],
	[0x3e, 0x4a, 0x89],
	[0x31, 0x68, 0x8e],
	[0x26, 0x82, 0x8e],
	[0x1f, 0x9e, 0x89],
	[0x35, 0xb7, 0x79],
	[0x6d, 0xcd, 0x59],
	[0xb4, 0xde, 0x2c],
	[0xfd, 0xe7, 0x25],
];

/// Continuous viridis interpolation of `t` in [0, 1] as a CSS color.
pub fn viridis(t: f64) -> String {
	let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
	let pos = t * (VIRIDIS.len() - 1) as f64;
	let i = (pos.floor() as usize).min(VIRIDIS.len() - 2);
	let f = pos - i as f64;
	let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
	let ch = |k: usize| (a[k] as f64 + (b[k] as f64 - a[k] as f64) * f).round() as u8;
	format!("rgb({}, {}, {})", ch(0), ch(1), ch(2))
}

/// Linear-interpolated quantile of sorted `values`, `p` in [0, 1].
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
	match sorted {
		[] => None,
		[only] => Some(*only),
		_ => {
			let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
			let lo = h.floor() as usize;
			let hi = (lo + 1).min(sorted.len() - 1);
			Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (h - lo as f64))
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorScale {
	pub min: f64,
	pub max: f64,
	/// Activations strictly above this are salient.
	pub threshold: f64,
}

impl Default for ColorScale {
	fn default() -> Self {
		Self {
			min: 0.0,
			max: 1.0,
			threshold: 0.5,
		}
	}
}

impl ColorScale {
	/// Builds the scale over the given activations; `percentile` is in 0..=100.
	pub fn from_activations(values: impl IntoIterator<Item = f64>, percentile: f64) -> Self {
		let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
		sorted.sort_by(f64::total_cmp);
		let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
			return Self::default();
		};
		Self {
			min,
			max,
			threshold: quantile(&sorted, percentile / 100.0).unwrap_or(0.5),
		}
	}

	pub fn color(&self, value: f64) -> String {
		let span = self.max - self.min;
		if span.abs() < 1e-12 {
			return viridis(0.5);
		}
		viridis((value - self.min) / span)
	}

	pub fn is_salient(&self, value: f64) -> bool {
		value > self.threshold
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn threshold_interpolates_between_samples() {
		let scale = ColorScale::from_activations([0.9, 0.1, 0.5], 75.0);
		assert_relative_eq!(scale.min, 0.1);
		assert_relative_eq!(scale.max, 0.9);
		assert_relative_eq!(scale.threshold, 0.7);
		assert!(scale.is_salient(0.9));
		assert!(!scale.is_salient(0.5));
	}

	#[test]
	fn empty_set_falls_back_to_unit_domain() {
		let scale = ColorScale::from_activations(std::iter::empty(), 75.0);
		assert_eq!(scale, ColorScale::default());
		assert_relative_eq!(scale.threshold, 0.5);
	}

	#[test]
	fn single_value_is_its_own_threshold() {
		let scale = ColorScale::from_activations([0.3], 90.0);
		assert_relative_eq!(scale.threshold, 0.3);
		assert_eq!(scale.color(0.3), viridis(0.5));
	}

	#[test]
	fn scale_endpoints_hit_palette_ends() {
		let scale = ColorScale::from_activations([-2.0, 2.0], 50.0);
		assert_eq!(scale.color(-2.0), "rgb(68, 1, 84)");
		assert_eq!(scale.color(2.0), "rgb(253, 231, 37)");
		assert_eq!(scale.color(99.0), "rgb(253, 231, 37)");
	}
}
