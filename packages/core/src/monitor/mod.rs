//! Monitoring Pipeline Core
//!
//! Turns raw readings into conditions (evaluator), conditions into report
//! text (render), and defines the single capability every reading source
//! implements.

pub mod error;
pub mod evaluator;
pub mod feed_adapter;
pub mod probe_adapter;
pub mod render;
pub mod source;
pub mod types;


pub use error::{ProviderError, ThresholdError};
pub use evaluator::{Evaluator, Thresholds};
pub use feed_adapter::FeedGroupSource;
pub use probe_adapter::{ProbeBank, TemperatureProbe};
pub use render::render;
pub use source::{ProviderResult, ReadingSource};
pub use types::*;
