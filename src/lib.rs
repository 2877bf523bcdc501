pub mod baum_welch;
pub mod config;
pub mod decoder;
pub mod emission;
pub mod error;
pub mod forward;
pub mod forward_backward;
pub mod gmm;
pub mod model;
pub mod persistence;
pub mod training_set;
pub mod transition;
mod utils;

pub use config::{HmmConfig, StopCriterion, TransitionMode};
pub use decoder::DecodeResults;
pub use emission::{EmissionModel, Observation};
pub use error::HmmError;
pub use gmm::GaussianMixture;
pub use model::{Hmm, TrainingSummary};
pub use persistence::HmmDocument;
pub use training_set::{Phrase, TrainingSet};
pub use transition::TransitionModel;
