use sqlx::{Row, SqliteConnection};

use crate::scoring::{ClusterSignals, HOT_DECAY_HOURS};

/// Reads the aggregate signal snapshot for one cluster.
///
/// Callers on the mutation path must pass the connection of the transaction
/// that also persists the recomputed score, so the aggregates and the write
/// cannot interleave with a concurrent recompute.
///
/// # Arguments
/// * `conn` - Connection (or in-flight transaction) to read through
/// * `cluster_id` - ID of the cluster
///
/// # Returns
/// * `Ok(ClusterSignals)` - Snapshot for the scoring engine
/// * `Err(sqlx::Error::RowNotFound)` - If the cluster does not exist
pub async fn cluster_signals(
    conn: &mut SqliteConnection,
    cluster_id: i64,
) -> Result<ClusterSignals, sqlx::Error> {
    let cluster = sqlx::query(
        r#"
        SELECT
            size,
            (julianday('now') - julianday(COALESCE(last_update, created_at))) * 24.0
                AS hours_since_update
        FROM clusters
        WHERE id = ?
        "#,
    )
    .bind(cluster_id)
    .fetch_one(&mut *conn)
    .await?;

    let counters = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(view_count), 0) AS total_views,
            COALESCE(SUM(report_count), 0) AS total_reports
        FROM news
        WHERE cluster_id = ?
        "#,
    )
    .bind(cluster_id)
    .fetch_one(&mut *conn)
    .await?;

    let recent_reads_24h: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(rl.id)
        FROM read_logs rl
        JOIN news n ON n.id = rl.news_id
        WHERE n.cluster_id = ? AND rl.read_at >= datetime('now', '-24 hours')
        "#,
    )
    .bind(cluster_id)
    .fetch_one(&mut *conn)
    .await?;

    let recent_articles: i64 = sqlx::query_scalar(&format!(
        r#"
        SELECT COUNT(*)
        FROM news
        WHERE cluster_id = ? AND published_at >= datetime('now', '-{} hours')
        "#,
        HOT_DECAY_HOURS as i64
    ))
    .bind(cluster_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ClusterSignals {
        size: cluster.get("size"),
        total_views: counters.get("total_views"),
        recent_reads_24h,
        total_reports: counters.get("total_reports"),
        hours_since_update: cluster.get("hours_since_update"),
        recent_articles,
    })
}

/// Reads an article's raw counters.
///
/// # Returns
/// * `Ok(Some((view_count, report_count)))` - Current counter values
/// * `Ok(None)` - If the article does not exist
pub async fn article_counters(
    conn: &mut SqliteConnection,
    news_id: i64,
) -> Result<Option<(i64, i64)>, sqlx::Error> {
    let row = sqlx::query("SELECT view_count, report_count FROM news WHERE id = ?")
        .bind(news_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| (row.get("view_count"), row.get("report_count"))))
}
