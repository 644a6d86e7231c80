//! Small in-page trainer standing in for a remote training backend.
//!
//! One hidden ReLU layer, linear output, MSE loss and plain SGD on a
//! deterministic stream of `y = sum(x) + noise` samples. Each step emits one
//! JSON snapshot in the same shape a training server would send.

use serde_json::{Value, json};

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

pub struct DemoTrainer {
	w1: Vec<Vec<f64>>,
	b1: Vec<f64>,
	w2: Vec<f64>,
	b2: f64,
	learning_rate: f64,
	batch_size: usize,
	epoch: u64,
	seed: usize,
}

impl DemoTrainer {
	pub fn new(inputs: usize, hidden: usize, batch_size: usize, learning_rate: f64) -> Self {
		let mut trainer = Self {
			w1: Vec::new(),
			b1: vec![0.0; hidden],
			w2: Vec::new(),
			b2: 0.0,
			learning_rate,
			batch_size,
			epoch: 0,
			seed: 7,
		};
		let w1: Vec<Vec<f64>> = (0..hidden)
			.map(|_| (0..inputs).map(|_| trainer.next() - 0.5).collect())
			.collect();
		let w2: Vec<f64> = (0..hidden).map(|_| trainer.next() - 0.5).collect();
		trainer.w1 = w1;
		trainer.w2 = w2;
		trainer
	}

	fn next(&mut self) -> f64 {
		self.seed = (self.seed * 31 + 17) % 233280;
		rand_simple(self.seed)
	}

	pub fn layer_sizes(&self) -> Vec<usize> {
		vec![self.w1.first().map_or(0, Vec::len), self.b1.len(), 1]
	}

	/// Trains on one batch and returns that step's snapshot.
	pub fn step(&mut self) -> Value {
		let inputs = self.layer_sizes()[0];
		let xs: Vec<Vec<f64>> = (0..self.batch_size)
			.map(|_| (0..inputs).map(|_| self.next()).collect())
			.collect();
		let ys: Vec<f64> = xs
			.iter()
			.map(|x| x.iter().sum::<f64>() + (self.next() - 0.5) * 0.1)
			.collect();

		let pre: Vec<Vec<f64>> = xs
			.iter()
			.map(|x| {
				self.w1
					.iter()
					.zip(&self.b1)
					.map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
					.collect()
			})
			.collect();
		let hidden: Vec<Vec<f64>> = pre
			.iter()
			.map(|row| row.iter().map(|v| v.max(0.0)).collect())
			.collect();
		let out: Vec<f64> = hidden
			.iter()
			.map(|h| h.iter().zip(&self.w2).map(|(a, w)| a * w).sum::<f64>() + self.b2)
			.collect();

		let n = self.batch_size as f64;
		let loss = out.iter().zip(&ys).map(|(o, y)| (o - y).powi(2)).sum::<f64>() / n;

		let mut dw1 = vec![vec![0.0; inputs]; self.b1.len()];
		let mut db1 = vec![0.0; self.b1.len()];
		let mut dw2 = vec![0.0; self.w2.len()];
		let mut db2 = 0.0;
		for b in 0..self.batch_size {
			let d_out = 2.0 * (out[b] - ys[b]) / n;
			db2 += d_out;
			for j in 0..self.w2.len() {
				dw2[j] += d_out * hidden[b][j];
				let d_hidden = if pre[b][j] > 0.0 { d_out * self.w2[j] } else { 0.0 };
				db1[j] += d_hidden;
				for i in 0..inputs {
					dw1[j][i] += d_hidden * xs[b][i];
				}
			}
		}

		self.epoch += 1;
		let snapshot = json!({
			"epoch": self.epoch,
			"loss": loss,
			"forward_data": {
				"input": xs,
				"hidden_activation": hidden,
				"output": out.iter().map(|o| vec![*o]).collect::<Vec<_>>(),
				"pre_activations": {
					"1": pre,
					"2": out.iter().map(|o| vec![*o]).collect::<Vec<_>>(),
				},
				"forward_time": 0.004 + self.next() * 0.002,
			},
			"backward_data": {
				"hidden_grad": dw1.iter().map(|r| r.iter().map(|g| g.abs()).collect::<Vec<_>>()).collect::<Vec<_>>(),
				"output_grad": [dw2.iter().map(|g| g.abs()).collect::<Vec<_>>()],
				"backward_time": 0.006 + self.next() * 0.002,
			},
			"weights_biases_data": {
				"input_weights": self.w1,
				"hidden_biases": self.b1,
				"output_weights": [self.w2],
				"output_biases": [self.b2],
			},
		});

		let lr = self.learning_rate;
		for (row, grads) in self.w1.iter_mut().zip(&dw1) {
			row.iter_mut().zip(grads).for_each(|(w, g)| *w -= lr * g);
		}
		self.b1.iter_mut().zip(&db1).for_each(|(b, g)| *b -= lr * g);
		self.w2.iter_mut().zip(&dw2).for_each(|(w, g)| *w -= lr * g);
		self.b2 -= lr * db2;

		snapshot
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::network::parse_epochs;

	#[test]
	fn snapshots_parse_with_expected_shapes() {
		let mut trainer = DemoTrainer::new(3, 4, 2, 0.05);
		assert_eq!(trainer.layer_sizes(), vec![3, 4, 1]);

		let epochs = parse_epochs(&trainer.step().to_string()).unwrap();
		let s = &epochs.0[0];
		assert_eq!(s.epoch, Some(1));
		assert!(s.loss.is_some_and(|l| l >= 0.0));
		assert!(s.forward_time().is_some_and(|t| t > 0.0));
		let weights = s.weights_biases_data.as_ref().unwrap();
		assert!(weights.input_weights.as_ref().unwrap().at(3).is_some());
		assert!(weights.output_weights.as_ref().unwrap().at(0).unwrap().at(3).is_some());
	}

	#[test]
	fn loss_goes_down() {
		let mut trainer = DemoTrainer::new(2, 6, 8, 0.05);
		let loss = |v: &Value| v["loss"].as_f64().unwrap();
		let first: f64 = (0..10).map(|_| loss(&trainer.step())).sum();
		for _ in 0..400 {
			trainer.step();
		}
		let last: f64 = (0..10).map(|_| loss(&trainer.step())).sum();
		assert!(last < first, "{last} >= {first}");
	}
}
