use serde::Serialize;
use std::collections::HashMap;

use super::safe_ln;

/// Extra weight multiplier for a user's preferred categories. Tuned value.
pub const PERSONAL_WEIGHT: f64 = 2.0;

/// Exponential falloff per rank position in the user's top-category list.
/// Tuned value.
pub const RANK_DECAY: f64 = 0.4;

/// Multiplier on the cluster hot score inside the recommendation formula.
/// Tuned value.
pub const HOT_WEIGHT: f64 = 1.5;

/// Multiplier on ln(size) rewarding multi-source stories. Tuned value.
pub const SIZE_BONUS_WEIGHT: f64 = 0.5;

/// Seconds for the exponential age decay of the recommendation score. This
/// is deliberately independent of the cluster-level decay already baked into
/// the hot score; the two compound. Tuned value.
pub const AGE_DECAY_SECONDS: f64 = 86_400.0;

/// Maximum number of categories considered for personalization.
pub const MAX_PREFERRED_CATEGORIES: usize = 5;

/// A user's inferred interest in one category, derived from read history
/// over a trailing window. Recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAffinity {
    pub category_id: i64,
    pub category_name: String,
    pub category_slug: String,
    /// Distinct articles read in the category within the window.
    pub read_count: i64,
    /// Distinct calendar days with at least one read.
    pub active_days: i64,
    /// Timestamp of the most recent read.
    pub last_read: String,
}

/// Per-category personalization weights for one user.
///
/// Built from the user's top categories ordered by read_count desc,
/// active_days desc, last_read desc; the weight falls off exponentially
/// with rank position.
#[derive(Debug, Clone, Default)]
pub struct CategoryWeights {
    weights: HashMap<i64, f64>,
}

impl CategoryWeights {
    /// Derives weights from an affinity list already sorted by preference.
    ///
    /// Only the first [`MAX_PREFERRED_CATEGORIES`] entries contribute; the
    /// weight for rank `i` is `(read_count / max_read) * exp(-i * 0.4) * 2.0`.
    pub fn from_affinities(affinities: &[CategoryAffinity]) -> Self {
        let max_read = affinities
            .first()
            .map(|a| a.read_count.max(1))
            .unwrap_or(1) as f64;

        let weights = affinities
            .iter()
            .take(MAX_PREFERRED_CATEGORIES)
            .enumerate()
            .map(|(rank, affinity)| {
                let weight = (affinity.read_count as f64 / max_read)
                    * (-(rank as f64) * RANK_DECAY).exp()
                    * PERSONAL_WEIGHT;
                (affinity.category_id, weight)
            })
            .collect();

        Self { weights }
    }

    /// Weight for an article's category; 0 when the category is not among
    /// the user's top categories or the article has none.
    pub fn weight(&self, category_id: Option<i64>) -> f64 {
        category_id
            .and_then(|id| self.weights.get(&id).copied())
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Computes the personalized score for a (cluster, representative article)
/// pair.
///
/// # Arguments
/// * `hot_score` - The cluster's cached hot score
/// * `cluster_size` - Number of articles in the cluster
/// * `category_weight` - Output of [`CategoryWeights::weight`] for the
///   article's category
/// * `age_seconds` - Seconds since the article was published
pub fn recommendation_score(
    hot_score: f64,
    cluster_size: i64,
    category_weight: f64,
    age_seconds: f64,
) -> f64 {
    let base = hot_score * HOT_WEIGHT
        + category_weight
        + SIZE_BONUS_WEIGHT * safe_ln(cluster_size.max(1) as f64);

    base * (-age_seconds.max(0.0) / AGE_DECAY_SECONDS).exp()
}
