//! Short-horizon travel-time prediction for a route.
//!
//! Offline, [`sequences`] turns raw trip records into sliding-window training
//! data. Online, [`pipeline::predict`] fits a history of observed durations to
//! the model window, scales it, runs the model and degrades to the history
//! mean whenever the model is missing or fails. [`synth`] builds a stand-in
//! history from a single routing-engine estimate.

pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod sequences;
pub mod server;
pub mod synth;
pub mod types;

pub use pipeline::{normalize_window, predict, Artifacts};
pub use scaler::{MinMaxScaler, Scaler};
pub use types::{History, Prediction, PredictionSource};
