use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ModelError, PipelineModel, TrustModel};
use crate::config::ModelConfig;
use crate::features::FeatureVector;

/// Startup-only lifecycle of the model handle.
///
/// Unloaded -> Loading -> Loaded | UnloadedPermanent. There is no retry: a
/// missing or broken artifact keeps the process on the fallback scorer until
/// restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    UnloadedPermanent,
}

impl LoadState {
    fn can_transition_to(self, next: LoadState) -> bool {
        matches!(
            (self, next),
            (LoadState::Unloaded, LoadState::Loading)
                | (LoadState::Loading, LoadState::Loaded)
                | (LoadState::Loading, LoadState::UnloadedPermanent)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub state: LoadState,
    pub path: String,
    pub description: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub smoke_test_prediction: Option<f64>,
    pub failure: Option<String>,
}

/// Result of the startup load: the capability (if any) plus its status
pub struct LoadedModel {
    pub model: Option<Arc<dyn TrustModel>>,
    pub status: ModelStatus,
}

impl LoadedModel {
    /// Fallback-only handle
    pub fn unavailable(path: &str, reason: &str) -> Self {
        Self {
            model: None,
            status: ModelStatus {
                state: LoadState::UnloadedPermanent,
                path: path.to_string(),
                description: None,
                loaded_at: None,
                smoke_test_prediction: None,
                failure: Some(reason.to_string()),
            },
        }
    }

    /// Wrap an already-built capability
    pub fn from_model(model: Arc<dyn TrustModel>, path: &str) -> Self {
        Self {
            status: ModelStatus {
                state: LoadState::Loaded,
                path: path.to_string(),
                description: Some(model.describe()),
                loaded_at: Some(Utc::now()),
                smoke_test_prediction: None,
                failure: None,
            },
            model: Some(model),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

pub struct ModelLoader {
    config: ModelConfig,
    state: LoadState,
}

impl ModelLoader {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            config: config.clone(),
            state: LoadState::Unloaded,
        }
    }

    fn transition(&mut self, next: LoadState) {
        if !self.state.can_transition_to(next) {
            warn!("Ignoring invalid model state transition {:?} -> {:?}", self.state, next);
            return;
        }
        debug!("Model state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the load once. Never fails: errors end in `UnloadedPermanent`.
    pub fn load(mut self) -> LoadedModel {
        self.transition(LoadState::Loading);
        info!("📦 Loading trust model from {}", self.config.path);

        match self.try_load() {
            Ok((model, smoke)) => {
                self.transition(LoadState::Loaded);
                let mut loaded = LoadedModel::from_model(model, &self.config.path);
                loaded.status.smoke_test_prediction = smoke;
                info!("✅ Model ready: {}", loaded.status.description.as_deref().unwrap_or("unknown"));
                loaded
            }
            Err(e) => {
                self.transition(LoadState::UnloadedPermanent);
                warn!("⚠️ Model unavailable ({}), using fallback scoring for this process", e);
                LoadedModel::unavailable(&self.config.path, &e.to_string())
            }
        }
    }

    fn try_load(&self) -> Result<(Arc<dyn TrustModel>, Option<f64>), ModelError> {
        let path = Path::new(&self.config.path);
        if !path.exists() {
            return Err(ModelError::NotFound(self.config.path.clone()));
        }

        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: self.config.path.clone(),
            source,
        })?;
        let model = PipelineModel::from_json(&text, &self.config.path)?;

        let smoke = if self.config.smoke_test {
            Some(smoke_test(&model)?)
        } else {
            None
        };

        let model: Arc<dyn TrustModel> = Arc::new(model);
        Ok((model, smoke))
    }
}

/// Score the reference profile; any error or non-finite output fails the load
pub fn smoke_test(model: &dyn TrustModel) -> Result<f64, ModelError> {
    let prediction = model
        .predict(&FeatureVector::reference_profile())
        .map_err(|e| ModelError::SmokeTest(e.to_string()))?;
    if !prediction.is_finite() {
        return Err(ModelError::SmokeTest(format!("prediction {} is not finite", prediction)));
    }
    info!("🧪 Test prediction: {:.2}", prediction);
    Ok(prediction)
}
