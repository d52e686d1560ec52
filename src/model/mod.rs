pub mod horizon;
pub mod prediction;
pub mod price;
pub mod role;

pub use horizon::{parse_horizon, Horizon};
pub use prediction::{BandPrediction, BandSource, EnsembleWeights, PredictionResult};
pub use price::{PriceBar, PriceSeries};
pub use role::Role;

/// Shortest history the decomposer or any trained predictor accepts.
pub const MIN_MODEL_HISTORY: usize = 60;
