//! Frame-driven two-phase animation of queued epochs.
//!
//! Each epoch runs a forward phase (tokens seeded at input neurons, chaining
//! layer by layer to the output) followed by a backward phase (one single hop
//! per adjacent layer pair, output side to input side). Tokens carry absolute
//! start times, so late frames delay drawing but never change when a transit
//! completes.

use std::collections::{BTreeSet, VecDeque};

use log::{debug, info, warn};

use super::model::GraphModel;
use super::snapshot::{Epochs, Snapshot, Tensor};
use super::types::{Direction, NodeId};

/// Receives `(epoch, loss)` once per animated epoch.
pub trait LossSink {
	fn update_loss_chart(&mut self, epoch: u64, loss: f64);
}

impl<F: FnMut(u64, f64)> LossSink for F {
	fn update_loss_chart(&mut self, epoch: u64, loss: f64) {
		self(epoch, loss)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnPolicy {
	/// Fan out into the next layer on arrival until the last layer.
	Chain,
	Terminal,
}

/// A light travelling along one link.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
	pub from: NodeId,
	pub to: NodeId,
	pub direction: Direction,
	pub policy: SpawnPolicy,
	pub start_ms: f64,
	pub duration_ms: f64,
	generation: u64,
}

impl Token {
	pub fn end_ms(&self) -> f64 {
		self.start_ms + self.duration_ms
	}

	pub fn progress(&self, now: f64) -> f64 {
		if self.duration_ms <= 0.0 {
			return 1.0;
		}
		((now - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
	}
}

/// A token that reached its target during a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Arrival {
	pub from: NodeId,
	pub to: NodeId,
	pub direction: Direction,
	pub at_ms: f64,
	/// Tokens spawned into the following layer because of this arrival.
	pub follow_on: usize,
}

struct Pending {
	snapshot: Snapshot,
	input_neurons: usize,
}

enum Phase {
	Forward { backward_at: f64 },
	Backward { ends_at: f64 },
}

struct ActiveEpoch {
	epoch: u64,
	loss: Option<f64>,
	backward_hop_ms: f64,
	phase: Phase,
}

pub struct Scheduler {
	multiplier: f64,
	queue: VecDeque<Pending>,
	active: Option<ActiveEpoch>,
	tokens: Vec<Token>,
	resume_at: Option<f64>,
	started: u64,
}

impl Scheduler {
	pub fn new(visibility_multiplier: f64) -> Self {
		Self {
			multiplier: visibility_multiplier,
			queue: VecDeque::new(),
			active: None,
			tokens: Vec::new(),
			resume_at: None,
			started: 0,
		}
	}

	/// Queues epochs in order. At most `input_neurons` values of each input
	/// row seed forward tokens; the rest are dropped.
	pub fn enqueue(&mut self, epochs: Epochs, input_neurons: usize) {
		self.queue.extend(epochs.0.into_iter().map(|snapshot| Pending {
			snapshot,
			input_neurons,
		}));
	}

	/// Advances epochs and tokens to `now` (milliseconds).
	///
	/// `stop` is honoured only between epochs: it abandons the queue but lets
	/// the epoch in flight finish.
	pub fn tick(
		&mut self,
		now: f64,
		model: &GraphModel,
		stop: bool,
		sink: &mut impl LossSink,
	) -> Vec<Arrival> {
		let generation = model.generation();
		self.tokens.retain(|t| t.generation == generation);

		loop {
			match self.active.take() {
				None => {
					if self.queue.is_empty() {
						self.resume_at = None;
						break;
					}
					if stop {
						info!("Training stopped; dropping {} queued epochs", self.queue.len());
						self.queue.clear();
						self.resume_at = None;
						break;
					}
					let start = self.resume_at.take().unwrap_or(now);
					if let Some(pending) = self.queue.pop_front() {
						self.active = Some(self.start_epoch(pending, start, model));
					}
				}
				Some(mut active) => match active.phase {
					Phase::Forward { backward_at } if now >= backward_at => {
						self.spawn_backward(backward_at, active.backward_hop_ms, model);
						match active.loss {
							Some(loss) => sink.update_loss_chart(active.epoch, loss),
							None => warn!("Epoch {} carries no loss; chart not updated", active.epoch),
						}
						active.phase = Phase::Backward {
							ends_at: backward_at + active.backward_hop_ms,
						};
						self.active = Some(active);
					}
					Phase::Backward { ends_at } if now >= ends_at => {
						debug!("Epoch {} animation finished", active.epoch);
						self.resume_at = Some(ends_at);
					}
					_ => {
						self.active = Some(active);
						break;
					}
				},
			}
		}

		self.drain(now, model)
	}

	fn start_epoch(&mut self, pending: Pending, start: f64, model: &GraphModel) -> ActiveEpoch {
		self.started += 1;
		let snapshot = pending.snapshot;
		let epoch = snapshot.epoch.unwrap_or(self.started);
		let forward_hop = self.hop_ms(snapshot.forward_time());
		let backward_hop = self.hop_ms(snapshot.backward_time());
		let hops = model.layer_count().saturating_sub(1) as f64;

		let seeded = self.spawn_forward(&snapshot, pending.input_neurons, start, forward_hop, model);
		debug!(
			"Epoch {epoch}: {seeded} forward tokens, {forward_hop}ms/hop forward, {backward_hop}ms backward"
		);

		ActiveEpoch {
			epoch,
			loss: snapshot.loss,
			backward_hop_ms: backward_hop,
			phase: Phase::Forward {
				backward_at: start + forward_hop * hops,
			},
		}
	}

	fn hop_ms(&self, seconds: Option<f64>) -> f64 {
		let seconds = seconds.filter(|s| s.is_finite() && *s > 0.0).unwrap_or(0.0);
		seconds * 1000.0 * self.multiplier
	}

	fn spawn_forward(
		&mut self,
		snapshot: &Snapshot,
		input_neurons: usize,
		start: f64,
		duration: f64,
		model: &GraphModel,
	) -> usize {
		let Some(inputs) = snapshot.inputs() else {
			return 0;
		};
		let rows: Vec<&Tensor> = match inputs {
			Tensor::List(items) if !items.iter().any(Tensor::is_nested) => {
				vec![inputs]
			}
			Tensor::List(items) => items.iter().collect(),
			_ => Vec::new(),
		};

		let mut spawned = 0;
		for row in rows {
			let Tensor::List(values) = row else {
				continue;
			};
			if values.len() > input_neurons {
				warn!(
					"Input row has {} values for {input_neurons} input neurons; extra values skipped",
					values.len()
				);
			}
			for index in 0..values.len().min(input_neurons) {
				let seed = NodeId::new(0, index);
				if model.find_node(seed).is_none() {
					continue;
				}
				spawned += self.fan_out(seed, Direction::Forward, SpawnPolicy::Chain, start, duration, model);
			}
		}
		spawned
	}

	fn spawn_backward(&mut self, start: f64, duration: f64, model: &GraphModel) {
		for layer in (1..model.layer_count()).rev() {
			let sources: Vec<NodeId> = model.layer_nodes(layer).map(|n| n.id).collect();
			for from in sources {
				self.fan_out(from, Direction::Backward, SpawnPolicy::Terminal, start, duration, model);
			}
		}
	}

	/// One token from `from` to every node of the adjacent layer.
	fn fan_out(
		&mut self,
		from: NodeId,
		direction: Direction,
		policy: SpawnPolicy,
		start_ms: f64,
		duration_ms: f64,
		model: &GraphModel,
	) -> usize {
		let target_layer = match direction {
			Direction::Forward => from.layer + 1,
			Direction::Backward => match from.layer.checked_sub(1) {
				Some(l) => l,
				None => return 0,
			},
		};
		let generation = model.generation();
		let before = self.tokens.len();
		self.tokens.extend(model.layer_nodes(target_layer).map(|n| Token {
			from,
			to: n.id,
			direction,
			policy,
			start_ms,
			duration_ms,
			generation,
		}));
		self.tokens.len() - before
	}

	/// Retires every token due by `now`, chaining forward tokens onward.
	///
	/// Chain tokens reaching the same node at the same instant merge into one
	/// follow-on fan-out, so live tokens stay bounded by the links of a layer
	/// pair instead of growing with the product of layer sizes.
	fn drain(&mut self, now: f64, model: &GraphModel) -> Vec<Arrival> {
		let mut arrivals = Vec::new();
		let mut relayed: BTreeSet<(NodeId, u64)> = BTreeSet::new();
		loop {
			let (done, live): (Vec<Token>, Vec<Token>) =
				self.tokens.drain(..).partition(|t| t.end_ms() <= now);
			self.tokens = live;
			if done.is_empty() {
				break;
			}
			for token in done {
				let follow_on = match token.policy {
					SpawnPolicy::Chain
						if token.to.layer + 1 < model.layer_count()
							&& relayed.insert((token.to, token.end_ms().to_bits())) =>
					{
						self.fan_out(
							token.to,
							Direction::Forward,
							SpawnPolicy::Chain,
							token.end_ms(),
							token.duration_ms,
							model,
						)
					}
					_ => 0,
				};
				arrivals.push(Arrival {
					from: token.from,
					to: token.to,
					direction: token.direction,
					at_ms: token.end_ms(),
					follow_on,
				});
			}
		}
		arrivals
	}

	/// Current token positions, interpolated between the endpoints' present
	/// coordinates.
	pub fn token_positions<'a>(
		&'a self,
		model: &'a GraphModel,
		now: f64,
	) -> impl Iterator<Item = (f64, f64, Direction)> + 'a {
		self.tokens
			.iter()
			.filter(move |t| t.generation == model.generation() && t.start_ms <= now)
			.filter_map(move |t| {
				let (x1, y1) = model.position(t.from)?;
				let (x2, y2) = model.position(t.to)?;
				let p = t.progress(now);
				Some((x1 + (x2 - x1) * p, y1 + (y2 - y1) * p, t.direction))
			})
	}

	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	pub fn pending(&self) -> usize {
		self.queue.len()
	}

	pub fn is_idle(&self) -> bool {
		self.active.is_none() && self.queue.is_empty() && self.tokens.is_empty()
	}

	/// Drops queued epochs, the epoch in flight, and all tokens.
	pub fn clear(&mut self) {
		self.queue.clear();
		self.active = None;
		self.tokens.clear();
		self.resume_at = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use serde_json::json;

	#[derive(Default)]
	struct Chart(Vec<(u64, f64)>);

	impl LossSink for Chart {
		fn update_loss_chart(&mut self, epoch: u64, loss: f64) {
			self.0.push((epoch, loss));
		}
	}

	fn model(sizes: &[usize]) -> GraphModel {
		let mut model = GraphModel::new(8);
		model.rebuild(sizes, 800.0, 600.0, None, None).unwrap();
		model
	}

	fn epoch(n: u64, input: serde_json::Value) -> Snapshot {
		serde_json::from_value(json!({
			"epoch": n,
			"loss": 1.0 / n as f64,
			"forward_data": { "input": input, "forward_time": 0.01 },
			"backward_data": { "backward_time": 0.01 },
		}))
		.unwrap()
	}

	#[test]
	fn forward_tokens_chain_until_last_layer() {
		let model = model(&[3, 4, 2]);
		let mut sched = Scheduler::new(50.0);
		let mut chart = Chart::default();
		sched.enqueue(epoch(1, json!([[1.0, 2.0, 3.0]])).into(), 3);

		assert!(sched.tick(0.0, &model, false, &mut chart).is_empty());
		assert_eq!(sched.tokens().len(), 3 * 4);
		assert_relative_eq!(sched.tokens()[0].duration_ms, 500.0);

		let hop1 = sched.tick(500.0, &model, false, &mut chart);
		assert_eq!(hop1.len(), 12);
		assert!(hop1.iter().all(|a| a.to.layer == 1));
		// Three arrivals per hidden node, one relay each.
		assert_eq!(hop1.iter().filter(|a| a.follow_on == 2).count(), 4);
		assert_eq!(sched.tokens().len(), 4 * 2);

		assert!(sched.tick(999.0, &model, false, &mut chart).is_empty());
		assert!(chart.0.is_empty());

		let hop2 = sched.tick(1000.0, &model, false, &mut chart);
		assert_eq!(hop2.len(), 8);
		assert!(
			hop2.iter()
				.all(|a| a.direction == Direction::Forward && a.to.layer == 2 && a.follow_on == 0)
		);
		assert_eq!(chart.0, vec![(1, 1.0)]);
		assert!(sched.tokens().iter().all(|t| t.direction == Direction::Backward));
	}

	#[test]
	fn batched_forward_pass_stays_bounded() {
		let model = model(&[3, 8, 8, 1]);
		let mut sched = Scheduler::new(50.0);
		let rows = json!([[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]);
		sched.enqueue(epoch(1, rows).into(), 3);

		sched.tick(0.0, &model, false, &mut Chart::default());
		assert_eq!(sched.tokens().len(), 4 * 3 * 8);
		let hop1 = sched.tick(500.0, &model, false, &mut Chart::default());
		assert_eq!(hop1.len(), 96);
		assert_eq!(sched.tokens().len(), 8 * 8);
		sched.tick(1000.0, &model, false, &mut Chart::default());
		assert_eq!(sched.tokens().len(), 8);
	}

	#[test]
	fn backward_phase_is_single_hop_per_layer_pair() {
		let model = model(&[3, 4, 2]);
		let mut sched = Scheduler::new(50.0);
		let mut chart = Chart::default();
		sched.enqueue(epoch(1, json!([])).into(), 3);

		sched.tick(0.0, &model, false, &mut chart);
		assert!(sched.tokens().is_empty());
		sched.tick(1000.0, &model, false, &mut chart);
		assert_eq!(sched.tokens().len(), 2 * 4 + 4 * 3);
		assert!(sched.tokens().iter().all(|t| t.policy == SpawnPolicy::Terminal));

		let arrivals = sched.tick(1500.0, &model, false, &mut chart);
		assert_eq!(arrivals.len(), 20);
		assert!(arrivals.iter().all(|a| a.follow_on == 0 && a.to.layer + 1 == a.from.layer));
		assert!(sched.is_idle());
	}

	#[test]
	fn extra_input_values_are_truncated() {
		let model = model(&[3, 2]);
		let mut sched = Scheduler::new(50.0);
		sched.enqueue(epoch(1, json!([[1.0, 2.0, 3.0, 4.0, 5.0], [1.0]])).into(), 3);
		sched.tick(0.0, &model, false, &mut Chart::default());
		assert_eq!(sched.tokens().len(), (3 + 1) * 2);
		assert!(sched.tokens().iter().all(|t| t.from.index < 3));
	}

	#[test]
	fn flat_input_counts_as_one_row() {
		let model = model(&[2, 2]);
		let mut sched = Scheduler::new(50.0);
		sched.enqueue(epoch(1, json!([0.5, 0.25])).into(), 2);
		sched.tick(0.0, &model, false, &mut Chart::default());
		assert_eq!(sched.tokens().len(), 4);
	}

	#[test]
	fn stop_abandons_remaining_epochs() {
		let model = model(&[3, 4, 2]);
		let mut sched = Scheduler::new(50.0);
		let mut chart = Chart::default();
		let run: Vec<Snapshot> = (1..=3).map(|n| epoch(n, json!([[1.0]]))).collect();
		sched.enqueue(run.into(), 3);

		sched.tick(0.0, &model, false, &mut chart);
		sched.tick(1000.0, &model, false, &mut chart);
		assert_eq!(chart.0.len(), 1);

		sched.tick(1600.0, &model, true, &mut chart);
		sched.tick(10_000.0, &model, false, &mut chart);
		assert_eq!(chart.0, vec![(1, 1.0)]);
		assert_eq!(sched.pending(), 0);
	}

	#[test]
	fn epochs_run_back_to_back_in_order() {
		let model = model(&[3, 4, 2]);
		let mut sched = Scheduler::new(50.0);
		let mut chart = Chart::default();
		let run: Vec<Snapshot> = (1..=3).map(|n| epoch(n, json!([[1.0]]))).collect();
		sched.enqueue(run.into(), 3);

		sched.tick(0.0, &model, false, &mut chart);
		sched.tick(2499.0, &model, false, &mut chart);
		assert_eq!(chart.0.len(), 1);
		sched.tick(2500.0, &model, false, &mut chart);
		assert_eq!(chart.0.len(), 2);

		// A starved frame catches up without skipping anything.
		sched.tick(60_000.0, &model, false, &mut chart);
		let order: Vec<u64> = chart.0.iter().map(|(e, _)| *e).collect();
		assert_eq!(order, vec![1, 2, 3]);
		assert!(sched.is_idle());
	}

	#[test]
	fn missing_epoch_number_uses_run_order() {
		let model = model(&[1, 1]);
		let mut sched = Scheduler::new(50.0);
		let mut chart = Chart::default();
		let s: Snapshot = serde_json::from_value(json!({ "loss": 0.25 })).unwrap();
		sched.enqueue(Epochs(vec![s.clone(), s]), 1);
		sched.tick(0.0, &model, false, &mut chart);
		assert_eq!(chart.0, vec![(1, 0.25), (2, 0.25)]);
	}

	#[test]
	fn rebuild_discards_in_flight_tokens() {
		let mut model = model(&[2, 2, 2]);
		let mut sched = Scheduler::new(50.0);
		sched.enqueue(epoch(1, json!([[1.0, 1.0]])).into(), 2);
		sched.tick(0.0, &model, false, &mut Chart::default());
		assert!(!sched.tokens().is_empty());

		model.rebuild(&[2, 2, 2], 800.0, 600.0, None, None).unwrap();
		let arrivals = sched.tick(500.0, &model, false, &mut Chart::default());
		assert!(arrivals.is_empty());
		assert!(sched.tokens().is_empty());
	}

	#[test]
	fn tokens_follow_current_node_positions() {
		let mut model = model(&[1, 1]);
		let mut sched = Scheduler::new(50.0);
		sched.enqueue(epoch(1, json!([[1.0]])).into(), 1);
		sched.tick(0.0, &model, false, &mut Chart::default());

		model.move_node(NodeId::new(0, 0), 0.0, 0.0);
		model.move_node(NodeId::new(1, 0), 100.0, 200.0);
		let (x, y, dir) = sched.token_positions(&model, 250.0).next().unwrap();
		assert_relative_eq!(x, 50.0);
		assert_relative_eq!(y, 100.0);
		assert_eq!(dir, Direction::Forward);
	}

	#[test]
	fn closures_work_as_sinks() {
		let model = model(&[1, 1]);
		let mut sched = Scheduler::new(50.0);
		let mut last = None;
		sched.enqueue(epoch(4, json!([])).into(), 1);
		sched.tick(0.0, &model, false, &mut |e: u64, l: f64| last = Some((e, l)));
		assert_eq!(last, None);
		sched.tick(500.0, &model, false, &mut |e: u64, l: f64| last = Some((e, l)));
		assert_eq!(last, Some((4, 0.25)));
	}
}
