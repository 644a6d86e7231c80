use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use leptos::prelude::*;
use log::{error, info};
use web_sys::MouseEvent;

use super::trainer::DemoTrainer;
use crate::components::network::{NetworkCanvas, NetworkViz, VizConfig, parse_epochs};

const LOSS_POINTS: usize = 200;
const CHART_WIDTH: f64 = 300.0;
const CHART_HEIGHT: f64 = 100.0;

/// SVG polyline points for the loss history, scaled to the chart box.
fn loss_points(losses: &[(u64, f64)]) -> String {
	let max = losses.iter().map(|(_, l)| *l).fold(f64::MIN_POSITIVE, f64::max);
	let step = CHART_WIDTH / losses.len().saturating_sub(1).max(1) as f64;
	losses
		.iter()
		.enumerate()
		.map(|(i, (_, l))| {
			format!("{:.1},{:.1}", i as f64 * step, CHART_HEIGHT - l / max * CHART_HEIGHT)
		})
		.collect::<Vec<_>>()
		.join(" ")
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let viz = NetworkViz::new(VizConfig::default());
	let trainer = Rc::new(RefCell::new(DemoTrainer::new(3, 4, 4, 0.05)));
	let layer_sizes = trainer.borrow().layer_sizes();
	viz.draw_neural_network(&layer_sizes, None, None);

	let (stopped, set_stopped) = signal(false);
	let (losses, set_losses) = signal(Vec::<(u64, f64)>::new());

	let on_loss = Callback::new(move |(epoch, loss): (u64, f64)| {
		set_losses.update(|v| {
			v.push((epoch, loss));
			if v.len() > LOSS_POINTS {
				v.remove(0);
			}
		});
	});

	// Stands in for the training server's snapshot stream.
	let viz_feed = viz.clone();
	let feed = move || {
		if stopped.get_untracked() {
			return;
		}
		let payload = trainer.borrow_mut().step().to_string();
		match parse_epochs(&payload) {
			Ok(epochs) => {
				if let Some(latest) = epochs.0.last() {
					viz_feed.update_nodes_with_data(latest, &layer_sizes, None);
				}
				viz_feed.animate_data_flow(epochs, None);
			}
			Err(e) => error!("Dropped training snapshot: {e}"),
		}
	};
	match set_interval_with_handle(feed, Duration::from_millis(1500)) {
		Ok(handle) => on_cleanup(move || handle.clear()),
		Err(e) => error!("Training feed not started: {e:?}"),
	}

	// The boundary's children must be `Send`; the handle itself is not.
	let viz = StoredValue::new_local(viz);
	let on_clear = move |_: MouseEvent| {
		info!("Clearing network view");
		viz.with_value(NetworkViz::clear_network);
		set_losses.set(Vec::new());
	};

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<NetworkCanvas viz=viz.get_value() stop=stopped on_loss=on_loss fullscreen=true />
				<div class="graph-overlay">
					<h1>"Neural Network Training"</h1>
					<p class="subtitle">
						"Hover a neuron for its readings. Drag a neuron to move it."
					</p>
					<button on:click=move |_| set_stopped.update(|s| *s = !*s)>
						{move || if stopped.get() { "Resume" } else { "Stop" }}
					</button>
					<button on:click=on_clear>"Clear"</button>
					<p class="loss-label">
						{move || {
							losses
								.with(|v| {
									v.last().map(|(e, l)| format!("Epoch {e}: loss {l:.4}"))
								})
								.unwrap_or_default()
						}}
					</p>
					<svg class="loss-chart" width="300" height="100">
						<polyline
							points=move || losses.with(|v| loss_points(v))
							fill="none"
							stroke="rgb(255, 99, 132)"
							stroke-width="2"
						/>
					</svg>
				</div>
			</div>
		</ErrorBoundary>
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loss_points_span_the_chart() {
		let points = loss_points(&[(1, 2.0), (2, 1.0), (3, 0.0)]);
		assert_eq!(points, "0.0,0.0 150.0,50.0 300.0,100.0");
	}

	#[test]
	fn stored_canvas_handle_is_send() {
		fn assert_send<T: Send + Sync>() {}
		assert_send::<StoredValue<NetworkViz, leptos::reactive::owner::LocalStorage>>();
	}

	#[test]
	fn single_loss_sits_at_the_left_edge() {
		assert_eq!(loss_points(&[(1, 0.5)]), "0.0,0.0");
		assert_eq!(loss_points(&[]), "");
	}
}
