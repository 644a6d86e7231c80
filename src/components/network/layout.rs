use super::types::NodeId;

/// Screen position of one neuron, before any data is attached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
	pub id: NodeId,
	pub x: f64,
	pub y: f64,
}

/// Lays layers out as evenly spaced columns, each column centered vertically.
///
/// Neuron index order is top-to-bottom order. Zero-sized layers keep their
/// column slot but produce no placements.
pub fn layout(layer_sizes: &[usize], width: f64, height: f64) -> Vec<Placement> {
	let spacing = width / (layer_sizes.len() + 1) as f64;
	let mut placements = Vec::with_capacity(layer_sizes.iter().sum());

	for (layer, &size) in layer_sizes.iter().enumerate() {
		let x = spacing * (layer + 1) as f64;
		let v_spacing = height / (size + 1) as f64;
		placements.extend((0..size).map(|index| Placement {
			id: NodeId::new(layer, index),
			x,
			y: v_spacing * (index + 1) as f64,
		}));
	}
	placements
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn places_every_neuron_inside_the_canvas() {
		let sizes = [3, 5, 1, 4];
		let (w, h) = (800.0, 600.0);
		let placed = layout(&sizes, w, h);

		assert_eq!(placed.len(), sizes.iter().sum::<usize>());
		for p in &placed {
			assert!((0.0..=w).contains(&p.x), "{p:?}");
			assert!((0.0..=h).contains(&p.y), "{p:?}");
		}
	}

	#[test]
	fn columns_strictly_increase_left_to_right() {
		let placed = layout(&[2, 3, 2], 400.0, 300.0);
		for pair in placed.windows(2) {
			let (a, b) = (pair[0], pair[1]);
			if b.id.layer > a.id.layer {
				assert!(b.x > a.x);
			} else {
				assert_relative_eq!(a.x, b.x);
				assert!(b.y > a.y);
			}
		}
	}

	#[test]
	fn uses_even_spacing() {
		let placed = layout(&[1, 3], 300.0, 400.0);
		assert_relative_eq!(placed[0].x, 100.0);
		assert_relative_eq!(placed[0].y, 200.0);
		assert_relative_eq!(placed[1].x, 200.0);
		assert_relative_eq!(placed[1].y, 100.0);
		assert_relative_eq!(placed[3].y, 300.0);
	}

	#[test]
	fn zero_sized_layer_draws_nothing() {
		let placed = layout(&[2, 0, 2], 400.0, 300.0);
		assert_eq!(placed.len(), 4);
		assert!(placed.iter().all(|p| p.id.layer != 1));
		assert_relative_eq!(placed[2].x, 300.0);
	}
}
