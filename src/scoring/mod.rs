// Module declarations
pub mod recommendation;

pub use recommendation::{recommendation_score, CategoryAffinity, CategoryWeights};

/// Hours for the exponential time decay of a cluster's hot score, and the
/// window for the recent-publication activity boost. Tuned value.
pub const HOT_DECAY_HOURS: f64 = 12.0;

/// Base score for a singleton cluster. Tuned value.
pub const SINGLE_ARTICLE_BASE: f64 = 0.3;

/// Base score for a two-article cluster. Tuned value.
pub const PAIR_BASE: f64 = 1.0;

/// Multiplier on ln(size + 1) for clusters of three or more. Tuned value.
pub const SIZE_BASE_FACTOR: f64 = 2.5;

/// Weight of total cluster views in the view boost. Tuned value.
pub const TOTAL_VIEW_WEIGHT: f64 = 0.4;

/// Weight of logged-in reads within the last 24 hours in the view boost.
/// Tuned value.
pub const RECENT_READ_WEIGHT: f64 = 0.6;

/// Upper bound on the report penalty, so reports can never dominate the
/// score. Tuned value.
pub const REPORT_PENALTY_CAP: f64 = 1.5;

/// View total at which the report penalty approaches full strength. The
/// penalty is scaled by `1 - exp(-views / 50)` so a handful of reports on a
/// low-traffic cluster carries little weight. Tuned value.
pub const REPORT_VIEW_SCALE: f64 = 50.0;

/// Activity boost contributed per article published within the decay window,
/// and the cap on the total boost. Tuned values.
pub const ACTIVITY_BOOST_PER_ARTICLE: f64 = 0.1;
pub const ACTIVITY_BOOST_CAP: f64 = 1.0;

/// An article with at least this many reports is suppressed unless its
/// report-to-view ratio stays below [`ABUSE_RATIO_THRESHOLD`]. Tuned values.
pub const ABUSE_REPORT_THRESHOLD: i64 = 10;
pub const ABUSE_RATIO_THRESHOLD: f64 = 0.01;

/// Snapshot of the aggregate signals feeding [`hot_score`].
///
/// Produced by the signal store; the aggregate reads behind it must come
/// from the same transaction as the write that persists the resulting score.
#[derive(Debug, Clone, Default)]
pub struct ClusterSignals {
    /// Number of articles in the cluster.
    pub size: i64,
    /// Sum of view_count across the cluster's articles.
    pub total_views: i64,
    /// Logged-in reads of the cluster's articles within the last 24 hours.
    pub recent_reads_24h: i64,
    /// Sum of report_count across the cluster's articles.
    pub total_reports: i64,
    /// Hours since the cluster last gained an article (falls back to its
    /// creation time).
    pub hours_since_update: f64,
    /// Articles in the cluster published within the decay window.
    pub recent_articles: i64,
}

/// Natural log, defined as 0 for non-positive input.
///
/// Guards the formulas against degenerate counters (size or count of 0, or
/// negative values from a corrupted store) without raising.
pub(crate) fn safe_ln(x: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else {
        x.ln()
    }
}

/// Computes a cluster's hot score from a signal snapshot.
///
/// The shape of the formula:
/// - a base term from cluster size, logarithmic above two articles;
/// - a view boost blending lifetime views with reads from the last 24 hours
///   (both logarithmic, so viral spikes don't run away);
/// - a report penalty normalized by views and capped, so a low-traffic
///   cluster isn't crushed by a handful of reports;
/// - exponential time decay from the last membership change;
/// - an activity boost (at most +100%) for clusters still gaining articles.
///
/// The result is always >= 0: the additive terms are clamped at zero before
/// the multiplicative decay and boost are applied.
pub fn hot_score(signals: &ClusterSignals) -> f64 {
    let base = match signals.size {
        i64::MIN..=1 => SINGLE_ARTICLE_BASE,
        2 => PAIR_BASE,
        size => SIZE_BASE_FACTOR * safe_ln(size as f64 + 1.0),
    };

    let view_boost = TOTAL_VIEW_WEIGHT * safe_ln(1.0 + signals.total_views as f64)
        + RECENT_READ_WEIGHT * safe_ln(1.0 + signals.recent_reads_24h as f64);

    let report_penalty = (safe_ln(1.0 + signals.total_reports as f64)
        * (1.0 - (-signals.total_views.max(0) as f64 / REPORT_VIEW_SCALE).exp()))
    .min(REPORT_PENALTY_CAP);

    let raw = (base + view_boost - report_penalty).max(0.0);

    let time_decay = (-signals.hours_since_update.max(0.0) / HOT_DECAY_HOURS).exp();

    let activity_boost = 1.0
        + (ACTIVITY_BOOST_PER_ARTICLE * signals.recent_articles.max(0) as f64)
            .min(ACTIVITY_BOOST_CAP);

    raw * time_decay * activity_boost
}

/// Display eligibility gate applied wherever a representative article is
/// chosen for a cluster.
///
/// Mirrors the SQL fragment in `db::ranking`; the two must stay in sync so
/// suppressed articles cannot leak into some views and not others.
pub fn article_eligible(report_count: i64, view_count: i64) -> bool {
    report_count < ABUSE_REPORT_THRESHOLD
        || (report_count as f64 / view_count.max(1) as f64) < ABUSE_RATIO_THRESHOLD
}
