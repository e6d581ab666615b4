//! Rule-based trust scorer, used whenever the model is missing or fails.
//!
//! Five bounded, weighted terms are summed, a negative-review penalty is
//! subtracted and the result is clamped to [0, 100]:
//!
//!   rating      = (avg - 1) / 4 * 30                 0..30
//!   activity    = min(transactions / 20, 1) * 25      0..25
//!   completion  = completed / transactions * 25       0..25
//!   review      = positive / reviews * 15 (7.5 when no reviews)   0..15
//!   portfolio   = min(portfolio / 10, 1) * 5          0..5
//!   penalty     = negative / reviews * 20 (only when both > 0)

use tracing::{debug, warn};

use crate::features::{safe_div, ActivityStats, UserActivityRecord};

/// Returned when the formula itself cannot produce a finite score
pub const NEUTRAL_SCORE: f64 = 50.0;

const RATING_WEIGHT: f64 = 30.0;
const ACTIVITY_WEIGHT: f64 = 25.0;
const ACTIVITY_SATURATION: f64 = 20.0;
const COMPLETION_WEIGHT: f64 = 25.0;
const REVIEW_WEIGHT: f64 = 15.0;
const NO_REVIEW_SCORE: f64 = 7.5;
const PORTFOLIO_WEIGHT: f64 = 5.0;
const PORTFOLIO_SATURATION: f64 = 10.0;
const NEGATIVE_PENALTY_WEIGHT: f64 = 20.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FallbackError {
    #[error("non-finite {0} term")]
    NonFinite(&'static str),
}

/// Per-term contributions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackBreakdown {
    pub rating: f64,
    pub activity: f64,
    pub completion: f64,
    pub review: f64,
    pub portfolio: f64,
    pub penalty: f64,
}

impl FallbackBreakdown {
    pub fn compute(s: &ActivityStats) -> Self {
        let rating = ((s.average_ratings - 1.0) / 4.0 * RATING_WEIGHT).clamp(0.0, RATING_WEIGHT);
        let activity = ((s.transaction_count / ACTIVITY_SATURATION).min(1.0) * ACTIVITY_WEIGHT)
            .clamp(0.0, ACTIVITY_WEIGHT);
        let completion = (safe_div(s.completed_transactions, s.transaction_count) * COMPLETION_WEIGHT)
            .clamp(0.0, COMPLETION_WEIGHT);
        let review = if s.review_count > 0.0 {
            (safe_div(s.positive_reviews, s.review_count) * REVIEW_WEIGHT).clamp(0.0, REVIEW_WEIGHT)
        } else {
            NO_REVIEW_SCORE
        };
        let portfolio = ((s.portfolio_count / PORTFOLIO_SATURATION).min(1.0) * PORTFOLIO_WEIGHT)
            .clamp(0.0, PORTFOLIO_WEIGHT);
        let penalty = if s.review_count > 0.0 && s.negative_reviews > 0.0 {
            s.negative_reviews / s.review_count * NEGATIVE_PENALTY_WEIGHT
        } else {
            0.0
        };

        Self { rating, activity, completion, review, portfolio, penalty }
    }

    pub fn total(&self) -> Result<f64, FallbackError> {
        let terms = [
            ("rating", self.rating),
            ("activity", self.activity),
            ("completion", self.completion),
            ("review", self.review),
            ("portfolio", self.portfolio),
            ("penalty", self.penalty),
        ];
        if let Some((name, _)) = terms.iter().find(|(_, v)| !v.is_finite()) {
            return Err(FallbackError::NonFinite(*name));
        }

        let sum = self.rating + self.activity + self.completion + self.review + self.portfolio;
        Ok((sum - self.penalty).clamp(0.0, 100.0))
    }
}

/// Score a raw record without any model. Never fails: an internal error
/// yields `NEUTRAL_SCORE`.
pub fn fallback_score(record: &UserActivityRecord) -> f64 {
    let breakdown = FallbackBreakdown::compute(&record.stats());
    debug!(?breakdown, "Fallback breakdown");
    match breakdown.total() {
        Ok(score) => score,
        Err(e) => {
            warn!("Fallback scoring failed ({}), using neutral score", e);
            NEUTRAL_SCORE
        }
    }
}
