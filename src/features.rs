//! Feature Deriver
//!
//! Raw marketplace activity (`UserActivityRecord`) goes in, the fixed 16-column
//! row the regression pipeline was fit against (`FeatureVector`) comes out.
//! Nothing here rejects input: missing or malformed fields fall back to their
//! defaults, counts are clamped, and inconsistent totals are repaired.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const FEATURE_COUNT: usize = 16;

/// Column order of the fitted pipeline. Reordering breaks every stored model.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "PortfolioCount",
    "AverageRatings",
    "TransactionCount",
    "CompletedTransactions",
    "ReviewCount",
    "StarCount",
    "PositiveReviews",
    "NeutralReviews",
    "NegativeReviews",
    "CompletionRate",
    "CancellationRate",
    "BioLength",
    "BioWordCount",
    "PositiveReviewRatio",
    "ReviewCoverage",
    "EngagementIndex",
];

pub const DEFAULT_AVERAGE_RATING: f64 = 1.0;
pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// One user's activity as posted by the marketplace.
///
/// Every numeric field is optional and accepts a number or a numeric string;
/// anything else is treated as absent. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityRecord {
    /// Opaque passthrough, echoed in batch responses
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub portfolio_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub average_ratings: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub transaction_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub completed_transactions: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub review_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub star_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub positive_reviews: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub neutral_reviews: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub negative_reviews: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub bio_length: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub bio_word_count: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

impl UserActivityRecord {
    /// Build a record from an arbitrary JSON value. Non-objects become an
    /// all-default record.
    pub fn from_value(value: Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Raw values with defaults filled in, no clamping or repair
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            portfolio_count: self.portfolio_count.unwrap_or(0.0),
            average_ratings: self.average_ratings.unwrap_or(DEFAULT_AVERAGE_RATING),
            transaction_count: self.transaction_count.unwrap_or(0.0),
            completed_transactions: self.completed_transactions.unwrap_or(0.0),
            review_count: self.review_count.unwrap_or(0.0),
            star_count: self.star_count.unwrap_or(0.0),
            positive_reviews: self.positive_reviews.unwrap_or(0.0),
            neutral_reviews: self.neutral_reviews.unwrap_or(0.0),
            negative_reviews: self.negative_reviews.unwrap_or(0.0),
            bio_length: self.bio_length.unwrap_or(0.0),
            bio_word_count: self.bio_word_count.unwrap_or(0.0),
        }
    }
}

/// Defaulted raw values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityStats {
    pub portfolio_count: f64,
    pub average_ratings: f64,
    pub transaction_count: f64,
    pub completed_transactions: f64,
    pub review_count: f64,
    pub star_count: f64,
    pub positive_reviews: f64,
    pub neutral_reviews: f64,
    pub negative_reviews: f64,
    pub bio_length: f64,
    pub bio_word_count: f64,
}

impl ActivityStats {
    /// Clamp counts to >= 0, ratings to [1, 5], then repair totals so that
    /// completed <= transactions and sentiment counts <= reviews.
    pub fn sanitized(&self) -> Self {
        let completed_transactions = self.completed_transactions.max(0.0);
        let positive_reviews = self.positive_reviews.max(0.0);
        let neutral_reviews = self.neutral_reviews.max(0.0);
        let negative_reviews = self.negative_reviews.max(0.0);

        let sentiment_total = saturating_sum(&[positive_reviews, neutral_reviews, negative_reviews]);

        Self {
            portfolio_count: self.portfolio_count.max(0.0),
            average_ratings: self.average_ratings.clamp(MIN_RATING, MAX_RATING),
            transaction_count: self.transaction_count.max(0.0).max(completed_transactions),
            completed_transactions,
            review_count: self.review_count.max(0.0).max(sentiment_total),
            star_count: self.star_count.max(0.0),
            positive_reviews,
            neutral_reviews,
            negative_reviews,
            bio_length: self.bio_length.max(0.0),
            bio_word_count: self.bio_word_count.max(0.0),
        }
    }
}

/// The model's input row. Field order matches `FEATURE_NAMES`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureVector {
    pub portfolio_count: f64,
    pub average_ratings: f64,
    pub transaction_count: f64,
    pub completed_transactions: f64,
    pub review_count: f64,
    pub star_count: f64,
    pub positive_reviews: f64,
    pub neutral_reviews: f64,
    pub negative_reviews: f64,
    pub completion_rate: f64,
    pub cancellation_rate: f64,
    pub bio_length: f64,
    pub bio_word_count: f64,
    pub positive_review_ratio: f64,
    pub review_coverage: f64,
    pub engagement_index: f64,
}

impl FeatureVector {
    /// Values in schema order
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.portfolio_count,
            self.average_ratings,
            self.transaction_count,
            self.completed_transactions,
            self.review_count,
            self.star_count,
            self.positive_reviews,
            self.neutral_reviews,
            self.negative_reviews,
            self.completion_rate,
            self.cancellation_rate,
            self.bio_length,
            self.bio_word_count,
            self.positive_review_ratio,
            self.review_coverage,
            self.engagement_index,
        ]
    }

    /// Reference profile scored once after a model is loaded
    pub fn reference_profile() -> Self {
        Self {
            portfolio_count: 5.0,
            average_ratings: 4.0,
            transaction_count: 10.0,
            completed_transactions: 9.0,
            review_count: 5.0,
            star_count: 20.0,
            positive_reviews: 4.0,
            neutral_reviews: 1.0,
            negative_reviews: 0.0,
            completion_rate: 90.0,
            cancellation_rate: 10.0,
            bio_length: 100.0,
            bio_word_count: 20.0,
            positive_review_ratio: 0.8,
            review_coverage: 0.5,
            engagement_index: 150.0,
        }
    }
}

/// Division that yields 0.0 for a zero denominator (or an undefined quotient)
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let quotient = numerator / denominator;
    if quotient.is_nan() { 0.0 } else { quotient }
}

/// Sum that saturates at f64::MAX instead of overflowing to infinity
fn saturating_sum(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    if sum.is_finite() { sum } else { f64::MAX }
}

pub fn derive_features(record: &UserActivityRecord) -> FeatureVector {
    let s = record.stats().sanitized();

    let completion_rate = (safe_div(s.completed_transactions, s.transaction_count) * 100.0).clamp(0.0, 100.0);
    let cancelled = (s.transaction_count - s.completed_transactions).max(0.0);
    let cancellation_rate = (safe_div(cancelled, s.transaction_count) * 100.0).clamp(0.0, 100.0);
    let positive_review_ratio = safe_div(s.positive_reviews, s.review_count).clamp(0.0, 1.0);
    let review_coverage = safe_div(s.review_count, s.transaction_count).clamp(0.0, 1.0);

    let engagement_index = saturating_sum(&[
        s.transaction_count,
        s.review_count,
        s.portfolio_count,
        s.bio_length,
        s.bio_word_count,
    ]);

    FeatureVector {
        portfolio_count: s.portfolio_count,
        average_ratings: s.average_ratings,
        transaction_count: s.transaction_count,
        completed_transactions: s.completed_transactions,
        review_count: s.review_count,
        star_count: s.star_count,
        positive_reviews: s.positive_reviews,
        neutral_reviews: s.neutral_reviews,
        negative_reviews: s.negative_reviews,
        completion_rate,
        cancellation_rate,
        bio_length: s.bio_length,
        bio_word_count: s.bio_word_count,
        positive_review_ratio,
        review_coverage,
        engagement_index,
    }
}
