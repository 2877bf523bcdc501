use thiserror::Error;

/// Errors that can occur when configuring, training, decoding or loading HMM models.
#[derive(Debug, Error)]
pub enum HmmError {
    #[error("Invalid number of states: {0} (must be > 0)")]
    InvalidStateCount(usize),

    #[error("Invalid number of mixture components: {0} (must be > 0)")]
    InvalidMixtureCount(usize),

    #[error("Invalid transition mode '{0}': choose 'ergodic' or 'left-right'")]
    InvalidTransitionMode(String),

    #[error("Input dimension {input} must be smaller than the total dimension {total}")]
    InvalidInputDimension { input: usize, total: usize },

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Covariance offset must be finite and non-negative (got {0})")]
    InvalidCovarianceOffset(f64),

    #[error("Exit probabilities must have one entry per state: expected {expected}, got {actual}")]
    InvalidExitProbabilities { expected: usize, actual: usize },

    #[error("Model is not hierarchical: exit probabilities are unavailable")]
    NotHierarchical,

    #[error("Model is not bimodal: use the unimodal observation probability")]
    NotBimodal,

    #[error("Covariance of mixture component {component} is not invertible")]
    SingularCovariance { component: usize },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("State index {index} out of range (model has {n_states} states)")]
    StateIndexOutOfRange { index: usize, n_states: usize },

    #[error("Phrase index {index} out of range (training set holds {len} phrases)")]
    PhraseIndexOutOfRange { index: usize, len: usize },

    #[error("Mixture component {index} out of range (state has {n_components} components)")]
    ComponentIndexOutOfRange { index: usize, n_components: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Model file not found: {0}")]
    ModelFileNotFound(String),

    #[error("Invalid model format in field '{field}': {reason}")]
    InvalidModelFormat { field: &'static str, reason: String },

    #[error("Trying to read a {found} model into a {expected} model")]
    HierarchyMismatch {
        expected: &'static str,
        found: &'static str,
    },
}
