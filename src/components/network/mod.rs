mod adapter;
mod component;
mod config;
mod error;
mod layout;
mod model;
mod popup;
mod render;
mod scale;
mod scheduler;
mod snapshot;
mod state;
mod types;

pub use component::NetworkCanvas;
pub use config::VizConfig;
pub use snapshot::{Epochs, Snapshot, WeightsBiases, parse_epochs};
pub use state::NetworkViz;
