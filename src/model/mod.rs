//! Trust model capability
//!
//! The fitted regression pipeline is opaque to the rest of the service: a
//! `FeatureVector` goes in, one 0-100 score comes out. It is loaded once at
//! startup and shared read-only across requests.

pub mod artifact;
pub mod loader;

use crate::features::FeatureVector;

pub use artifact::PipelineModel;
pub use loader::{LoadedModel, ModelLoader, ModelStatus};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    NotFound(String),

    #[error("failed to read model artifact '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid JSON: {0}")]
    Parse(String),

    #[error("model artifact is incompatible: {0}")]
    Incompatible(String),

    #[error("compatibility patch failed: {0}")]
    PatchFailed(String),

    #[error("model artifact is malformed: {0}")]
    Invalid(String),

    #[error("smoke test failed: {0}")]
    SmokeTest(String),

    #[error("model produced a non-finite prediction ({0})")]
    NonFinite(f64),
}

/// Scoring capability injected into the predictor.
pub trait TrustModel: Send + Sync {
    /// Short description for status output
    fn describe(&self) -> String;

    /// Raw model output on the 0-100 scale (not yet clamped)
    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError>;
}
