//! Prediction Orchestrator
//!
//! Chooses the model path or the fallback path per record, projects the score
//! onto the 1-5 scale and keeps per-process counters. Model problems never
//! reach the caller: they degrade to the fallback scorer.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::JournalConfig;
use crate::fallback::fallback_score;
use crate::features::{derive_features, UserActivityRecord};
use crate::journal::Journal;
use crate::model::{LoadedModel, ModelError, ModelStatus, TrustModel};
use crate::scale::{round2, to_likert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    MlModel,
    Fallback,
}

/// Why the model path was not used
#[derive(Debug)]
pub enum DegradeReason {
    ModelUnavailable,
    ModelFailed(ModelError),
    ModelPanicked(String),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::ModelUnavailable => write!(f, "model not loaded"),
            DegradeReason::ModelFailed(e) => write!(f, "model prediction failed: {}", e),
            DegradeReason::ModelPanicked(msg) => write!(f, "model panicked: {}", msg),
        }
    }
}

/// Outcome of the model-invocation boundary
#[derive(Debug)]
pub enum ScoreOutcome {
    /// Model score, already clamped to [0, 100]
    Model(f64),
    Degraded(DegradeReason),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub trust_rating: f64,
    pub trust_score: f64,
    pub method: Method,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPrediction {
    pub user_id: Option<Value>,
    pub trust_rating: f64,
    pub method: Method,
}

#[derive(Default)]
struct PredictionCounters {
    total: AtomicU64,
    ml_model: AtomicU64,
    fallback: AtomicU64,
    model_failures: AtomicU64,
    batches: AtomicU64,
    batch_records: AtomicU64,
}

pub struct Predictor {
    model: Option<Arc<dyn TrustModel>>,
    status: ModelStatus,
    journal: Journal,
    counters: PredictionCounters,
}

impl Predictor {
    pub fn new(loaded: LoadedModel, journal_config: &JournalConfig) -> Self {
        Self {
            model: loaded.model,
            status: loaded.status,
            journal: Journal::new(journal_config),
            counters: PredictionCounters::default(),
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Run the model path only
    pub fn score_with_model(&self, record: &UserActivityRecord) -> ScoreOutcome {
        let Some(model) = &self.model else {
            return ScoreOutcome::Degraded(DegradeReason::ModelUnavailable);
        };

        // The model is shared read-only, so nothing is left half-updated if it unwinds
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let features = derive_features(record);
            model.predict(&features)
        }));

        match result {
            Ok(Ok(score)) if score.is_finite() => ScoreOutcome::Model(score.clamp(0.0, 100.0)),
            Ok(Ok(score)) => ScoreOutcome::Degraded(DegradeReason::ModelFailed(ModelError::NonFinite(score))),
            Ok(Err(e)) => ScoreOutcome::Degraded(DegradeReason::ModelFailed(e)),
            Err(payload) => ScoreOutcome::Degraded(DegradeReason::ModelPanicked(panic_message(&*payload))),
        }
    }

    pub fn predict(&self, record: &UserActivityRecord) -> Prediction {
        let start = Instant::now();

        let (score, method) = match self.score_with_model(record) {
            ScoreOutcome::Model(score) => (score, Method::MlModel),
            ScoreOutcome::Degraded(reason) => {
                match &reason {
                    DegradeReason::ModelFailed(_) | DegradeReason::ModelPanicked(_) => {
                        self.counters.model_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("⚠️ {}, using fallback", reason);
                    }
                    DegradeReason::ModelUnavailable => debug!("{}, using fallback", reason),
                }
                (fallback_score(record), Method::Fallback)
            }
        };

        let rating = to_likert(score);
        let prediction = Prediction {
            trust_rating: round2(rating),
            trust_score: round2(score),
            method,
        };

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        match method {
            Method::MlModel => self.counters.ml_model.fetch_add(1, Ordering::Relaxed),
            Method::Fallback => self.counters.fallback.fetch_add(1, Ordering::Relaxed),
        };
        self.journal.record(
            record.user_id.as_ref(),
            method,
            prediction.trust_score,
            prediction.trust_rating,
            start.elapsed(),
        );

        prediction
    }

    /// Score records independently, preserving order
    pub fn predict_batch(&self, records: &[UserActivityRecord]) -> Vec<BatchPrediction> {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters.batch_records.fetch_add(records.len() as u64, Ordering::Relaxed);

        records
            .iter()
            .map(|record| {
                let prediction = self.predict(record);
                BatchPrediction {
                    user_id: record.user_id.clone(),
                    trust_rating: prediction.trust_rating,
                    method: prediction.method,
                }
            })
            .collect()
    }

    pub fn get_stats(&self) -> Value {
        let c = &self.counters;
        serde_json::json!({
            "model": self.status,
            "predictions": {
                "total": c.total.load(Ordering::Relaxed),
                "ml_model": c.ml_model.load(Ordering::Relaxed),
                "fallback": c.fallback.load(Ordering::Relaxed),
                "model_failures": c.model_failures.load(Ordering::Relaxed),
                "batches": c.batches.load(Ordering::Relaxed),
                "batch_records": c.batch_records.load(Ordering::Relaxed),
            },
            "journal": self.journal.get_stats(),
        })
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use serde_json::json;

    pub(crate) struct FixedModel(pub f64);

    impl TrustModel for FixedModel {
        fn describe(&self) -> String {
            format!("fixed({})", self.0)
        }

        fn predict(&self, _: &FeatureVector) -> Result<f64, ModelError> {
            Ok(self.0)
        }
    }

    pub(crate) struct FailingModel;

    impl TrustModel for FailingModel {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        fn predict(&self, _: &FeatureVector) -> Result<f64, ModelError> {
            Err(ModelError::Invalid("column transformer missing attribute".to_string()))
        }
    }

    /// Panics only for users with no transactions
    pub(crate) struct PanicOnIdleModel;

    impl TrustModel for PanicOnIdleModel {
        fn describe(&self) -> String {
            "panic-on-idle".to_string()
        }

        fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
            if features.transaction_count == 0.0 {
                panic!("boom");
            }
            Ok(80.0)
        }
    }

    /// Fails only for users with no transactions
    struct PickyModel;

    impl TrustModel for PickyModel {
        fn describe(&self) -> String {
            "picky".to_string()
        }

        fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
            if features.transaction_count == 0.0 {
                Err(ModelError::NonFinite(f64::NAN))
            } else {
                Ok(90.0)
            }
        }
    }

    fn journal_config() -> JournalConfig {
        JournalConfig { enabled: true, max_entries: 100 }
    }

    pub(crate) fn predictor_with(model: Option<Arc<dyn TrustModel>>) -> Predictor {
        let loaded = match model {
            Some(m) => LoadedModel::from_model(m, "memory"),
            None => LoadedModel::unavailable("memory", "not configured"),
        };
        Predictor::new(loaded, &journal_config())
    }

    fn sample_record() -> UserActivityRecord {
        UserActivityRecord::from_value(json!({
            "portfolioCount": 5,
            "averageRatings": 4.0,
            "transactionCount": 10,
            "completedTransactions": 9,
            "reviewCount": 5,
            "starCount": 20,
            "positiveReviews": 4,
            "neutralReviews": 1,
            "negativeReviews": 0,
            "bioLength": 100,
            "bioWordCount": 20
        }))
    }

    #[test]
    fn test_no_model_uses_fallback() {
        let predictor = predictor_with(None);
        let p = predictor.predict(&sample_record());
        assert_eq!(p.method, Method::Fallback);
        assert_eq!(p.trust_score, 72.0);
        assert_eq!(p.trust_rating, 3.88);
    }

    #[test]
    fn test_fallback_half_rounds_to_even() {
        let predictor = predictor_with(None);
        let p = predictor.predict(&UserActivityRecord::from_value(json!({
            "transactionCount": 8,
            "completedTransactions": 1
        })));
        assert_eq!(p.trust_score, 20.62);
        assert_eq!(p.trust_rating, 1.82);
    }

    #[test]
    fn test_model_path() {
        let predictor = predictor_with(Some(Arc::new(FixedModel(50.0))));
        let p = predictor.predict(&sample_record());
        assert_eq!(p.method, Method::MlModel);
        assert_eq!(p.trust_score, 50.0);
        assert_eq!(p.trust_rating, 3.0);
    }

    #[test]
    fn test_model_output_clamped() {
        let high = predictor_with(Some(Arc::new(FixedModel(140.0))));
        let p = high.predict(&sample_record());
        assert_eq!(p.trust_score, 100.0);
        assert_eq!(p.trust_rating, 5.0);

        let low = predictor_with(Some(Arc::new(FixedModel(-3.0))));
        let p = low.predict(&sample_record());
        assert_eq!(p.trust_score, 0.0);
        assert_eq!(p.trust_rating, 1.0);
    }

    #[test]
    fn test_model_failure_degrades() {
        let predictor = predictor_with(Some(Arc::new(FailingModel)));
        assert!(matches!(
            predictor.score_with_model(&sample_record()),
            ScoreOutcome::Degraded(DegradeReason::ModelFailed(_))
        ));
        let p = predictor.predict(&sample_record());
        assert_eq!(p.method, Method::Fallback);
        assert_eq!(p.trust_score, 72.0);
        assert_eq!(predictor.get_stats()["predictions"]["model_failures"], 1);
    }

    #[test]
    fn test_model_panic_degrades() {
        let predictor = predictor_with(Some(Arc::new(PanicOnIdleModel)));
        let idle = UserActivityRecord::from_value(json!({ "userId": "idle" }));
        match predictor.score_with_model(&idle) {
            ScoreOutcome::Degraded(DegradeReason::ModelPanicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected panic degrade, got {:?}", other),
        }

        let p = predictor.predict(&idle);
        assert_eq!(p.method, Method::Fallback);
        assert_eq!(predictor.get_stats()["predictions"]["model_failures"], 1);

        let results = predictor.predict_batch(&[
            UserActivityRecord::from_value(json!({ "userId": 1, "transactionCount": 4 })),
            idle,
            UserActivityRecord::from_value(json!({ "userId": 3, "transactionCount": 2 })),
        ]);
        let methods: Vec<Method> = results.iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![Method::MlModel, Method::Fallback, Method::MlModel]);
    }

    #[test]
    fn test_non_finite_model_output_degrades() {
        let predictor = predictor_with(Some(Arc::new(FixedModel(f64::NAN))));
        let p = predictor.predict(&sample_record());
        assert_eq!(p.method, Method::Fallback);
    }

    #[test]
    fn test_batch_order_and_isolation() {
        let predictor = predictor_with(Some(Arc::new(PickyModel)));
        let records = vec![
            UserActivityRecord::from_value(json!({ "userId": "a", "transactionCount": 3 })),
            UserActivityRecord::from_value(json!({ "userId": "b" })),
            UserActivityRecord::from_value(json!({ "userId": 7, "transactionCount": 1, "extra": [1, 2] })),
            UserActivityRecord::from_value(json!("not an object")),
        ];
        let results = predictor.predict_batch(&records);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].user_id, Some(json!("a")));
        assert_eq!(results[0].method, Method::MlModel);
        assert_eq!(results[1].user_id, Some(json!("b")));
        assert_eq!(results[1].method, Method::Fallback);
        assert_eq!(results[2].user_id, Some(json!(7)));
        assert_eq!(results[2].method, Method::MlModel);
        assert_eq!(results[3].user_id, None);
        assert_eq!(results[3].method, Method::Fallback);

        let stats = predictor.get_stats();
        assert_eq!(stats["predictions"]["batches"], 1);
        assert_eq!(stats["predictions"]["batch_records"], 4);
        assert_eq!(stats["predictions"]["ml_model"], 2);
        assert_eq!(stats["predictions"]["fallback"], 2);
    }

    #[test]
    fn test_predictions_are_journaled() {
        let predictor = predictor_with(None);
        predictor.predict(&UserActivityRecord::from_value(json!({ "userId": 42 })));
        let entries = predictor.journal().search(None, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, Some(json!(42)));
        assert_eq!(entries[0].method, Method::Fallback);
    }

    #[test]
    fn test_method_wire_names() {
        assert_eq!(serde_json::to_value(Method::MlModel).unwrap(), json!("ml_model"));
        assert_eq!(serde_json::to_value(Method::Fallback).unwrap(), json!("fallback"));
        let p = BatchPrediction { user_id: None, trust_rating: 1.0, method: Method::Fallback };
        assert_eq!(
            serde_json::to_value(p).unwrap(),
            json!({ "userId": null, "trustRating": 1.0, "method": "fallback" })
        );
    }
}
