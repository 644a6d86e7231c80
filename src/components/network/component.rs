use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use log::error;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, Window};

use super::error::VizError;
use super::render;
use super::state::NetworkViz;

type FrameLoop = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

fn window_size(window: &Window) -> Result<(f64, f64), VizError> {
	let w = window.inner_width().ok().and_then(|v| v.as_f64());
	let h = window.inner_height().ok().and_then(|v| v.as_f64());
	w.zip(h).ok_or(VizError::NoWindow)
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, VizError> {
	canvas
		.get_context("2d")
		.ok()
		.flatten()
		.and_then(|ctx| ctx.dyn_into().ok())
		.ok_or(VizError::ContextUnavailable)
}

fn pointer(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<(f64, f64)> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some((
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	))
}

/// Canvas view of a [`NetworkViz`], driven by `requestAnimationFrame`.
///
/// `stop` is read once per frame and handed to the scheduler; `on_loss`
/// receives `(epoch, loss)` for each animated epoch.
#[component]
pub fn NetworkCanvas(
	viz: NetworkViz,
	#[prop(into)] stop: Signal<bool>,
	#[prop(optional)] on_loss: Option<Callback<(u64, f64)>>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let animate: FrameLoop = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let (viz_init, animate_init, resize_cb_init) = (viz.clone(), animate.clone(), resize_cb.clone());

	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			error!("{}", VizError::NoWindow);
			return;
		};

		let size = if fullscreen {
			window_size(&window)
		} else {
			Ok((
				width.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_width() as f64)
						.unwrap_or(800.0)
				}),
				height.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_height() as f64)
						.unwrap_or(600.0)
				}),
			))
		};
		let ctx = match size.and_then(|s| context_2d(&canvas).map(|ctx| (s, ctx))) {
			Ok(((w, h), ctx)) => {
				canvas.set_width(w as u32);
				canvas.set_height(h as u32);
				viz_init.with(|s| s.resize(w, h));
				ctx
			}
			Err(e) => {
				error!("Network canvas not started: {e}");
				return;
			}
		};

		if fullscreen {
			let (viz_resize, canvas_resize) = (viz_init.clone(), canvas.clone());
			*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
				let Some(win) = web_sys::window() else {
					return;
				};
				match window_size(&win) {
					Ok((nw, nh)) => {
						canvas_resize.set_width(nw as u32);
						canvas_resize.set_height(nh as u32);
						viz_resize.with(|s| s.resize(nw, nh));
					}
					Err(e) => error!("Resize skipped: {e}"),
				}
			}));
			if let Some(ref cb) = *resize_cb_init.borrow() {
				let _ =
					window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let (viz_anim, animate_inner) = (viz_init.clone(), animate_init.clone());
		*animate_init.borrow_mut() = Some(Closure::new(move |now: f64| {
			let stop_requested = stop.get_untracked();
			let mut losses = Vec::new();
			viz_anim.with(|s| {
				s.tick(now, stop_requested, &mut |e: u64, l: f64| losses.push((e, l)));
				render::render(s, &ctx);
			});
			// The sink runs after the state borrow is released.
			if let Some(sink) = on_loss {
				for loss in losses {
					sink.run(loss);
				}
			}
			if let (Some(win), Some(cb)) = (web_sys::window(), animate_inner.borrow().as_ref()) {
				let _ = win.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let viz_md = viz.clone();
	let on_mousedown = move |ev: MouseEvent| {
		if let Some((x, y)) = pointer(canvas_ref, &ev) {
			viz_md.with(|s| s.pointer_down(x, y));
		}
	};

	let viz_mm = viz.clone();
	let on_mousemove = move |ev: MouseEvent| {
		if let Some((x, y)) = pointer(canvas_ref, &ev) {
			viz_mm.with(|s| s.pointer_move(x, y));
		}
	};

	let viz_mu = viz.clone();
	let on_mouseup = move |_: MouseEvent| {
		viz_mu.with(|s| s.pointer_up());
	};

	let viz_ml = viz;
	let on_mouseleave = move |_: MouseEvent| {
		viz_ml.with(|s| s.pointer_leave());
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="network-canvas"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			style="display: block; cursor: pointer;"
		/>
	}
}
