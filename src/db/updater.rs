use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::core::Database;
use super::{catalog, signals};
use crate::error::CoreError;
use crate::scoring;
use crate::{TARGET_DB, TARGET_SCORING};

/// Identifies an article by ID or by URL, whichever the caller has on hand.
#[derive(Debug, Clone)]
pub enum ArticleRef {
    Id(i64),
    Url(String),
}

/// Why an article was reported.
///
/// The known values match what the report form submits; anything else is
/// carried opaquely in `Other` rather than rejected, so new form values
/// don't break older deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportReason {
    Under18,
    Harassment,
    Violence,
    RestrictedGoods,
    AdultContent,
    FalseInfo,
    IntellectualProperty,
    NotInterested,
    Other(String),
}

impl ReportReason {
    pub fn as_str(&self) -> &str {
        match self {
            ReportReason::Under18 => "under_18",
            ReportReason::Harassment => "harassment",
            ReportReason::Violence => "violence",
            ReportReason::RestrictedGoods => "restricted_goods",
            ReportReason::AdultContent => "adult_content",
            ReportReason::FalseInfo => "false_info",
            ReportReason::IntellectualProperty => "intellectual_property",
            ReportReason::NotInterested => "not_interested",
            ReportReason::Other(reason) => reason,
        }
    }
}

impl From<&str> for ReportReason {
    fn from(value: &str) -> Self {
        match value {
            "under_18" => ReportReason::Under18,
            "harassment" => ReportReason::Harassment,
            "violence" => ReportReason::Violence,
            "restricted_goods" => ReportReason::RestrictedGoods,
            "adult_content" => ReportReason::AdultContent,
            "false_info" => ReportReason::FalseInfo,
            "intellectual_property" => ReportReason::IntellectualProperty,
            "not_interested" => ReportReason::NotInterested,
            other => ReportReason::Other(other.to_string()),
        }
    }
}

impl Serialize for ReportReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReportReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(ReportReason::from(value.as_str()))
    }
}

/// A report as submitted by a reader.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub news_id: i64,
    pub user_id: Option<i64>,
    pub fingerprint: Option<String>,
    pub reason: ReportReason,
    pub description: Option<String>,
}

/// Per-cluster write locks enforcing single-writer-per-cluster on the
/// recompute path. Entries are created on first touch and kept for the
/// process lifetime; the key space is bounded by the cluster count.
static CLUSTER_LOCKS: Lazy<DashMap<i64, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

async fn lock_cluster(cluster_id: i64) -> OwnedMutexGuard<()> {
    let lock = CLUSTER_LOCKS
        .entry(cluster_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    lock.lock_owned().await
}

/// Records one view of an article.
///
/// As one atomic unit: increments the article's view counter, appends a
/// read log row when the viewer is logged in, and recomputes the owning
/// cluster's hot score from aggregates read inside the same transaction.
/// Calls are deliberately not idempotent; each call is one more view.
///
/// # Returns
/// * `Ok(())` - The view was applied
/// * `Err(CoreError::NotFound)` - No article matches the reference
pub async fn record_view(
    db: &Database,
    article: ArticleRef,
    user_id: Option<i64>,
) -> Result<(), CoreError> {
    let row = match &article {
        ArticleRef::Id(id) => {
            sqlx::query("SELECT id, url, cluster_id FROM news WHERE id = ?")
                .bind(id)
                .fetch_optional(db.pool())
                .await?
        }
        ArticleRef::Url(url) => {
            sqlx::query("SELECT id, url, cluster_id FROM news WHERE url = ?")
                .bind(url)
                .fetch_optional(db.pool())
                .await?
        }
    };

    let Some(row) = row else {
        return Err(CoreError::NotFound(format!("article {:?}", article)));
    };
    let news_id: i64 = row.get("id");
    let url: Option<String> = row.get("url");
    let cluster_id: Option<i64> = row.get("cluster_id");

    let _guard = match cluster_id {
        Some(id) => Some(lock_cluster(id).await),
        None => None,
    };

    let mut tx = db.pool().begin().await?;

    sqlx::query("UPDATE news SET view_count = view_count + 1 WHERE id = ?")
        .bind(news_id)
        .execute(&mut *tx)
        .await?;

    if let Some(user_id) = user_id {
        sqlx::query("INSERT INTO read_logs (user_id, news_id, url, read_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(news_id)
            .bind(&url)
            .bind(catalog::now_timestamp())
            .execute(&mut *tx)
            .await?;
    }

    if let Some(cluster_id) = cluster_id {
        refresh_hot_score(&mut *tx, cluster_id).await?;
    }

    tx.commit().await?;

    debug!(
        target: TARGET_DB,
        "Recorded view of article {} (user: {:?}, cluster: {:?})",
        news_id, user_id, cluster_id
    );
    Ok(())
}

/// Records an abuse report against an article.
///
/// Fails with `DuplicateReport` when the same user (or the same anonymous
/// fingerprint) already reported the article. Otherwise, as one atomic
/// unit: inserts the report, increments the article's report counter, and
/// recomputes the owning cluster's hot score.
pub async fn record_report(db: &Database, report: NewReport) -> Result<(), CoreError> {
    let row = sqlx::query("SELECT cluster_id FROM news WHERE id = ?")
        .bind(report.news_id)
        .fetch_optional(db.pool())
        .await?;

    let Some(row) = row else {
        return Err(CoreError::NotFound(format!("article {}", report.news_id)));
    };
    let cluster_id: Option<i64> = row.get("cluster_id");

    let _guard = match cluster_id {
        Some(id) => Some(lock_cluster(id).await),
        None => None,
    };

    let mut tx = db.pool().begin().await?;

    let existing = match (&report.user_id, &report.fingerprint) {
        (Some(user_id), _) => {
            sqlx::query("SELECT id FROM reports WHERE news_id = ? AND user_id = ?")
                .bind(report.news_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
        }
        (None, Some(fingerprint)) => {
            sqlx::query(
                "SELECT id FROM reports WHERE news_id = ? AND fingerprint = ? AND user_id IS NULL",
            )
            .bind(report.news_id)
            .bind(fingerprint)
            .fetch_optional(&mut *tx)
            .await?
        }
        (None, None) => None,
    };
    if existing.is_some() {
        return Err(CoreError::DuplicateReport);
    }

    let insert = sqlx::query(
        r#"
        INSERT INTO reports (news_id, user_id, fingerprint, reason, description, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.news_id)
    .bind(report.user_id)
    .bind(&report.fingerprint)
    .bind(report.reason.as_str())
    .bind(&report.description)
    .bind(catalog::now_timestamp())
    .execute(&mut *tx)
    .await;

    // The unique indexes back up the pre-check against racing inserts.
    if let Err(err) = insert {
        if CoreError::is_unique_violation(&err) {
            return Err(CoreError::DuplicateReport);
        }
        return Err(err.into());
    }

    sqlx::query("UPDATE news SET report_count = report_count + 1 WHERE id = ?")
        .bind(report.news_id)
        .execute(&mut *tx)
        .await?;

    if let Some(cluster_id) = cluster_id {
        refresh_hot_score(&mut *tx, cluster_id).await?;
    }

    tx.commit().await?;

    info!(
        target: TARGET_DB,
        "Recorded report against article {} (reason: {})",
        report.news_id,
        report.reason.as_str()
    );
    Ok(())
}

/// Recomputes and persists a cluster's hot score on the given connection.
///
/// The aggregate reads and the write share the connection, so when it
/// belongs to a transaction no concurrent recompute can interleave with
/// inconsistent intermediate reads.
pub(crate) async fn refresh_hot_score(
    conn: &mut SqliteConnection,
    cluster_id: i64,
) -> Result<f64, sqlx::Error> {
    let snapshot = signals::cluster_signals(&mut *conn, cluster_id).await?;
    let score = scoring::hot_score(&snapshot);

    sqlx::query("UPDATE clusters SET hot_score = ? WHERE id = ?")
        .bind(score)
        .bind(cluster_id)
        .execute(&mut *conn)
        .await?;

    debug!(
        target: TARGET_SCORING,
        "Cluster {} hot score -> {:.4} (size: {}, views: {}, reads24h: {}, reports: {})",
        cluster_id, score, snapshot.size, snapshot.total_views,
        snapshot.recent_reads_24h, snapshot.total_reports
    );
    Ok(score)
}

/// Recomputes one cluster's hot score outside the event path, e.g. after
/// ingestion attaches new articles.
pub async fn refresh_cluster_hot_score(db: &Database, cluster_id: i64) -> Result<f64, CoreError> {
    let _guard = lock_cluster(cluster_id).await;

    let mut tx = db.pool().begin().await?;
    let score = match refresh_hot_score(&mut *tx, cluster_id).await {
        Ok(score) => score,
        Err(sqlx::Error::RowNotFound) => {
            return Err(CoreError::NotFound(format!("cluster {}", cluster_id)));
        }
        Err(err) => return Err(err.into()),
    };
    tx.commit().await?;

    Ok(score)
}
