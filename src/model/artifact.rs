use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{ModelError, TrustModel};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

pub const CURRENT_FORMAT_VERSION: u64 = 2;
/// Older exporter: schema stored under `columns`, no preprocessor block
pub const LEGACY_FORMAT_VERSION: u64 = 1;

/// Serialized regression pipeline: optional scaler followed by a regressor
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u64,
    pub feature_names: Vec<String>,
    pub preprocessor: Preprocessor,
    pub regressor: Regressor,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preprocessor {
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
    Passthrough,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    RandomForest { trees: Vec<Tree> },
    Linear { coefficients: Vec<f64>, intercept: f64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

/// Split nodes send `x[feature] <= threshold` left, everything else right
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    Leaf { value: f64 },
}

impl ModelArtifact {
    /// Parse, patch legacy layouts, and validate against the feature schema
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let mut value: Value = serde_json::from_str(text).map_err(|e| ModelError::Parse(e.to_string()))?;

        let version = value
            .get("format_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| ModelError::Incompatible("missing format_version".to_string()))?;

        let patched = match version {
            CURRENT_FORMAT_VERSION => false,
            LEGACY_FORMAT_VERSION => {
                warn!("Legacy model format v{} detected, applying compatibility patch", version);
                patch_legacy(&mut value)?;
                true
            }
            other => {
                return Err(ModelError::Incompatible(format!(
                    "unsupported format_version {} (expected {})",
                    other, CURRENT_FORMAT_VERSION
                )))
            }
        };

        let artifact: ModelArtifact = serde_json::from_value(value).map_err(|e| {
            if patched {
                ModelError::PatchFailed(e.to_string())
            } else {
                ModelError::Incompatible(e.to_string())
            }
        })?;

        artifact.validate()?;
        if patched {
            info!("Model loaded with compatibility patch");
        }
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ModelError::Incompatible(format!(
                "feature schema mismatch: expected {:?}, found {:?}",
                FEATURE_NAMES, self.feature_names
            )));
        }

        if let Preprocessor::StandardScaler { mean, scale } = &self.preprocessor {
            check_vector("scaler mean", mean)?;
            check_vector("scaler scale", scale)?;
        }

        match &self.regressor {
            Regressor::Linear { coefficients, intercept } => {
                check_vector("coefficients", coefficients)?;
                if !intercept.is_finite() {
                    return Err(ModelError::Invalid("intercept is not finite".to_string()));
                }
            }
            Regressor::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(ModelError::Invalid("random forest has no trees".to_string()));
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate().map_err(|e| ModelError::Invalid(format!("tree {}: {}", i, e)))?;
                }
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> String {
        match &self.regressor {
            Regressor::RandomForest { trees } => format!("random_forest({} trees)", trees.len()),
            Regressor::Linear { .. } => "linear".to_string(),
        }
    }

    fn transform(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        match &self.preprocessor {
            Preprocessor::Passthrough => *row,
            Preprocessor::StandardScaler { mean, scale } => {
                let mut out = *row;
                for (i, x) in out.iter_mut().enumerate() {
                    let m = mean.get(i).copied().unwrap_or(0.0);
                    let s = match scale.get(i).copied() {
                        Some(s) if s != 0.0 => s,
                        _ => 1.0,
                    };
                    *x = (*x - m) / s;
                }
                out
            }
        }
    }

    pub fn predict_row(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let x = self.transform(row);
        match &self.regressor {
            Regressor::Linear { coefficients, intercept } => {
                intercept + coefficients.iter().zip(x.iter()).map(|(c, v)| c * v).sum::<f64>()
            }
            Regressor::RandomForest { trees } => {
                let total: f64 = trees.iter().map(|t| t.predict(&x)).sum();
                total / trees.len() as f64
            }
        }
    }
}

impl Tree {
    /// Children must point strictly forward, so traversal always terminates
    fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("no nodes".to_string());
        }
        let len = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split { feature, threshold, left, right } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(format!("node {} splits on unknown feature {}", idx, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", idx));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= len {
                            return Err(format!("node {} has invalid child {}", idx, child));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {} is not finite", idx));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let v = x.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => return f64::NAN,
            }
        }
    }
}

fn check_vector(name: &str, values: &[f64]) -> Result<(), ModelError> {
    if values.len() != FEATURE_COUNT {
        return Err(ModelError::Incompatible(format!(
            "{} has {} entries, expected {}",
            name,
            values.len(),
            FEATURE_COUNT
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Invalid(format!("{} contains non-finite values", name)));
    }
    Ok(())
}

/// Rewrite a v1 document in place into the current layout
fn patch_legacy(value: &mut Value) -> Result<(), ModelError> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| ModelError::PatchFailed("artifact is not a JSON object".to_string()))?;

    if !object.contains_key("feature_names") {
        let columns = object
            .remove("columns")
            .ok_or_else(|| ModelError::PatchFailed("neither feature_names nor columns present".to_string()))?;
        object.insert("feature_names".to_string(), columns);
    }
    if !object.contains_key("preprocessor") {
        object.insert("preprocessor".to_string(), serde_json::json!({ "kind": "passthrough" }));
    }
    object.insert("format_version".to_string(), Value::from(CURRENT_FORMAT_VERSION));
    Ok(())
}

/// A validated artifact behind the `TrustModel` capability
pub struct PipelineModel {
    artifact: ModelArtifact,
    source: String,
}

impl PipelineModel {
    pub fn from_json(text: &str, source: &str) -> Result<Self, ModelError> {
        Ok(Self {
            artifact: ModelArtifact::from_json(text)?,
            source: source.to_string(),
        })
    }
}

impl TrustModel for PipelineModel {
    fn describe(&self) -> String {
        format!(
            "{} (format v{}) from {}",
            self.artifact.kind(),
            self.artifact.format_version,
            self.source
        )
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let prediction = self.artifact.predict_row(&features.to_row());
        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(ModelError::NonFinite(prediction))
        }
    }
}
