use chrono::Utc;
use serde::Serialize;
use sqlx::Row;
use tracing::debug;

use super::core::Database;
use crate::error::CoreError;
use crate::TARGET_DB;

/// A news category as exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Fields for an article handed over by the ingestion pipeline.
///
/// Counters start at zero; they are owned by the score updater afterwards.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub published_at: Option<String>,
    pub category_id: Option<i64>,
    pub cluster_id: Option<i64>,
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Lists all categories ordered by name.
pub async fn categories(db: &Database) -> Result<Vec<Category>, CoreError> {
    let rows = sqlx::query("SELECT id, name, slug FROM categories ORDER BY name")
        .fetch_all(db.pool())
        .await?;

    Ok(rows
        .iter()
        .map(|row| Category {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
        })
        .collect())
}

/// Creates a category, returning its ID.
pub async fn create_category(db: &Database, name: &str, slug: &str) -> Result<i64, CoreError> {
    let id = sqlx::query("INSERT INTO categories (name, slug) VALUES (?, ?)")
        .bind(name)
        .bind(slug)
        .execute(db.pool())
        .await?
        .last_insert_rowid();

    Ok(id)
}

/// Creates an empty cluster in a category, returning its ID.
///
/// Size starts at zero and is maintained by [`insert_article`] as members
/// arrive.
pub async fn create_cluster(db: &Database, category_id: Option<i64>) -> Result<i64, CoreError> {
    let now = now_timestamp();

    let id = sqlx::query(
        r#"
        INSERT INTO clusters (category_id, size, created_at, last_update)
        VALUES (?, 0, ?, ?)
        "#,
    )
    .bind(category_id)
    .bind(&now)
    .bind(&now)
    .execute(db.pool())
    .await?
    .last_insert_rowid();

    debug!(target: TARGET_DB, "Created cluster {}", id);
    Ok(id)
}

/// Inserts an article, returning its ID.
///
/// When the article belongs to a cluster, the cluster's size and
/// last_update move in the same transaction; last_update feeds the hot
/// score's time decay and is only ever advanced here, on membership change.
pub async fn insert_article(db: &Database, article: &NewArticle) -> Result<i64, CoreError> {
    let now = now_timestamp();
    let mut tx = db.pool().begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO news
            (url, title, content, summary, image_url, source, published_at,
             category_id, cluster_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.url)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.summary)
    .bind(&article.image_url)
    .bind(&article.source)
    .bind(&article.published_at)
    .bind(article.category_id)
    .bind(article.cluster_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    if let Some(cluster_id) = article.cluster_id {
        sqlx::query(
            r#"
            UPDATE clusters
            SET size = size + 1,
                last_update = ?
            WHERE id = ?
            "#,
        )
        .bind(&now)
        .bind(cluster_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    debug!(target: TARGET_DB, "Inserted article {} into cluster {:?}", id, article.cluster_id);
    Ok(id)
}

/// Fetches an article's full text for the reader view.
pub async fn article_content(db: &Database, news_id: i64) -> Result<Option<String>, CoreError> {
    let row = sqlx::query("SELECT content FROM news WHERE id = ?")
        .bind(news_id)
        .fetch_optional(db.pool())
        .await?;

    match row {
        Some(row) => Ok(row.get("content")),
        None => Err(CoreError::NotFound(format!("article {}", news_id))),
    }
}
