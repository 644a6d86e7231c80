use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::model::Node;
use super::popup::{PopupContent, Visibility};
use super::state::NetworkState;
use super::types::{Direction, Role};

const BACKGROUND: &str = "#0b0b14";
const LINK: &str = "rgba(255, 0, 85, 1)";
const NODE_FILL: &str = "rgba(255, 255, 255, 0.1)";

fn ease_out_cubic(t: f64) -> f64 {
	1.0 - (1.0 - t).powi(3)
}

fn role_stroke(role: Role) -> &'static str {
	match role {
		Role::Input => "rgba(57, 255, 20, 1)",
		Role::Hidden(_) => "rgba(255, 255, 51, 1)",
		Role::Output => "rgba(255, 7, 58, 1)",
	}
}

pub fn render(state: &NetworkState, ctx: &CanvasRenderingContext2d) {
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, state.width, state.height);
	draw_layer_labels(state, ctx);
	draw_links(state, ctx);
	draw_tokens(state, ctx);
	draw_nodes(state, ctx);
	draw_tooltip(state, ctx);
	if state.popup.visibility() == Visibility::Visible {
		if let Some(content) = state.popup.content() {
			draw_popup(state, content, ctx);
		}
	}
}

fn draw_layer_labels(state: &NetworkState, ctx: &CanvasRenderingContext2d) {
	ctx.set_fill_style_str("rgba(255, 255, 255, 0.6)");
	ctx.set_font("14px sans-serif");
	ctx.set_text_align("center");
	for layer in 0..state.model.layer_count() {
		if let Some(node) = state.model.layer_nodes(layer).next() {
			let _ = ctx.fill_text(&node.role.to_string(), node.x, 24.0);
		}
	}
	ctx.set_text_align("start");
}

fn draw_links(state: &NetworkState, ctx: &CanvasRenderingContext2d) {
	let hovered = state.link_hover.link();
	for (i, link) in state.model.links().iter().enumerate() {
		let (Some((x1, y1)), Some((x2, y2))) = (
			state.model.position(link.source),
			state.model.position(link.target),
		) else {
			continue;
		};

		let is_hovered = hovered == Some(i);
		ctx.set_stroke_style_str(LINK);
		ctx.set_line_width(if is_hovered { 4.0 } else { 2.0 });
		if is_hovered {
			ctx.set_shadow_color(LINK);
			ctx.set_shadow_blur(10.0);
		}
		if link.weight.is_none() {
			let _ = ctx.set_line_dash(&js_sys::Array::of2(
				&JsValue::from_f64(6.0),
				&JsValue::from_f64(4.0),
			));
		}

		ctx.begin_path();
		ctx.move_to(x1, y1);
		ctx.line_to(x2, y2);
		ctx.stroke();

		let _ = ctx.set_line_dash(&js_sys::Array::new());
		ctx.set_shadow_blur(0.0);
	}

	// Links of a dragged node follow the pointer on top of the rest.
	let Some(id) = state.drag.node else {
		return;
	};
	ctx.set_stroke_style_str("rgba(0, 255, 255, 0.8)");
	ctx.set_line_width(2.0);
	for link in state.model.links_touching(id) {
		if let (Some((x1, y1)), Some((x2, y2))) = (
			state.model.position(link.source),
			state.model.position(link.target),
		) {
			ctx.begin_path();
			ctx.move_to(x1, y1);
			ctx.line_to(x2, y2);
			ctx.stroke();
		}
	}
}

fn draw_tokens(state: &NetworkState, ctx: &CanvasRenderingContext2d) {
	if state.scheduler.tokens().is_empty() {
		return;
	}
	let r = state.config.token_radius;
	for (x, y, direction) in state.scheduler.token_positions(&state.model, state.now) {
		ctx.begin_path();
		let _ = ctx.arc(x, y, r, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(match direction {
			Direction::Forward => "rgba(255, 255, 255, 0.9)",
			Direction::Backward => "rgba(0, 255, 255, 0.9)",
		});
		ctx.set_stroke_style_str("rgba(200, 200, 200, 0.7)");
		ctx.set_line_width(r * 0.75);
		ctx.fill();
		ctx.stroke();
	}
}

fn node_fill(state: &NetworkState, node: &Node) -> String {
	match (node.role, node.reading.activation) {
		(Role::Input, _) | (_, None) => NODE_FILL.into(),
		(_, Some(a)) => state.scale.color(a),
	}
}

fn draw_nodes(state: &NetworkState, ctx: &CanvasRenderingContext2d) {
	let t = ease_out_cubic(state.popup.highlight_t);
	let radius = state.config.node_radius;

	for node in state.model.nodes() {
		let (x, y) = (node.x, node.y);
		let is_hovered = state.popup.fading == Some(node.id) && t > 0.01;

		if node.salient || is_hovered {
			let glow = if is_hovered {
				radius * (1.6 + 0.8 * t)
			} else {
				radius * 1.6
			};
			let alpha = if is_hovered { 0.2 + 0.25 * t } else { 0.2 };
			if let Ok(gradient) = ctx.create_radial_gradient(x, y, radius * 0.5, x, y, glow) {
				let _ = gradient.add_color_stop(0.0, &format!("rgba(0, 180, 255, {alpha})"));
				let _ = gradient.add_color_stop(1.0, "rgba(0, 180, 255, 0)");
				ctx.begin_path();
				let _ = ctx.arc(x, y, glow, 0.0, 2.0 * PI);
				#[allow(deprecated)]
				ctx.set_fill_style(&gradient);
				ctx.fill();
			}
		}

		let r = if is_hovered {
			radius * (1.0 + 0.15 * t)
		} else {
			radius
		};
		ctx.begin_path();
		let _ = ctx.arc(x, y, r, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(&node_fill(state, node));
		ctx.fill();
		ctx.set_stroke_style_str(role_stroke(node.role));
		ctx.set_line_width(if state.popup.hovered() == Some(node.id) { 5.0 } else { 4.0 });
		ctx.stroke();

		let pulse = state.pulse(node.id);
		if pulse > 0.0 {
			ctx.begin_path();
			let _ = ctx.arc(x, y, r + radius * 0.6 * (1.0 - pulse), 0.0, 2.0 * PI);
			ctx.set_stroke_style_str(&format!("rgba(255, 255, 255, {pulse})"));
			ctx.set_line_width(2.0);
			ctx.stroke();
		}
	}
}

fn draw_tooltip(state: &NetworkState, ctx: &CanvasRenderingContext2d) {
	let Some(tip) = state.link_hover.tooltip(&state.model) else {
		return;
	};
	ctx.set_fill_style_str("white");
	ctx.set_font("14px sans-serif");
	ctx.set_text_align("center");
	let _ = ctx.fill_text(&tip.text, tip.x, tip.y);
	ctx.set_text_align("start");
}

fn draw_popup(state: &NetworkState, content: &PopupContent, ctx: &CanvasRenderingContext2d) {
	let (px, py, w, h) = state.popup_rect();

	ctx.set_fill_style_str("rgba(15, 15, 15, 0.92)");
	ctx.fill_rect(px, py, w, h);
	// Brighter frame while a drag holds the popup open.
	ctx.set_stroke_style_str(if state.popup.dragging().is_some() {
		"rgba(255, 255, 255, 1)"
	} else {
		"rgba(0, 255, 255, 1)"
	});
	ctx.set_line_width(2.0);
	ctx.set_shadow_color("rgba(0, 100, 255, 1)");
	ctx.set_shadow_blur(15.0);
	ctx.stroke_rect(px, py, w, h);
	ctx.set_shadow_blur(0.0);

	ctx.set_fill_style_str("rgba(255, 99, 132, 1)");
	ctx.set_font("bold 18px sans-serif");
	let _ = ctx.fill_text(&content.title, px + 15.0, py + 30.0);

	ctx.set_fill_style_str("#ffffff");
	ctx.set_font("14px sans-serif");
	for (i, line) in content.lines().iter().enumerate() {
		let _ = ctx.fill_text(line, px + 15.0, py + 60.0 + i as f64 * 30.0);
	}

	draw_sparkline(&content.history, px + 10.0, py + h - 10.0, w - 20.0, 35.0, ctx);
}

/// Plots `values` left to right inside the box whose bottom-left is `(x, y)`.
fn draw_sparkline(
	values: &[f64],
	x: f64,
	y: f64,
	width: f64,
	height: f64,
	ctx: &CanvasRenderingContext2d,
) {
	if values.is_empty() {
		return;
	}
	let max = values.iter().copied().fold(f64::MIN_POSITIVE, f64::max);
	let step = if values.len() > 1 {
		width / (values.len() - 1) as f64
	} else {
		0.0
	};

	ctx.set_stroke_style_str("rgba(0, 255, 255, 1)");
	ctx.set_line_width(2.0);
	ctx.begin_path();
	for (i, v) in values.iter().enumerate() {
		let (vx, vy) = (x + i as f64 * step, y - (v / max) * height);
		if i == 0 {
			ctx.move_to(vx, vy);
		} else {
			ctx.line_to(vx, vy);
		}
	}
	ctx.stroke();
}
