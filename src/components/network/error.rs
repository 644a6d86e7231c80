use thiserror::Error;

/// Failures that abort a visualization operation.
///
/// Missing or malformed snapshot data is never an error; it resolves to
/// "unknown" instead.
#[derive(Error, Debug)]
pub enum VizError {
	#[error("a network needs at least two layers, got {len}")]
	InvalidLayerSizes { len: usize },
	#[error("no browser window available")]
	NoWindow,
	#[error("2d canvas context unavailable")]
	ContextUnavailable,
	#[error("snapshot payload is not valid JSON: {0}")]
	Snapshot(#[from] serde_json::Error),
}
