use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::core::Database;
use super::preferences;
use crate::error::CoreError;
use crate::scoring::recommendation::{recommendation_score, CategoryWeights};
use crate::TARGET_DB;

/// Window for the trending feed, in hours.
pub const TRENDING_WINDOW_HOURS: i64 = 48;

/// Eligibility gate for representative-article selection, as a SQL
/// fragment. Must stay in sync with `scoring::article_eligible`; applying
/// it unevenly would let suppressed articles leak into some views.
pub(crate) const REPRESENTATIVE_FILTER: &str =
    "(report_count < 10 OR (report_count * 1.0 / MAX(view_count, 1)) < 0.01)";

/// One entry of a ranked feed: an article plus its cluster context.
///
/// Never exposes internal fields (embeddings, centroids) from the wider
/// system; the projection is exactly what the web layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub news_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub summary: Option<String>,
    pub source: Option<String>,
    /// ISO-8601, UTC.
    pub published_at: Option<String>,
    pub category: Option<String>,
    pub category_slug: Option<String>,
    pub cluster_id: Option<i64>,
    pub size: Option<i64>,
    pub hot_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trending_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_score: Option<f64>,
}

/// Who a feed is being assembled for. Personalization requires a known
/// user; everything else falls back to the global hot ranking.
#[derive(Debug, Clone)]
pub enum Audience {
    Anonymous,
    Personalized { user_id: i64 },
}

fn feed_item(row: &SqliteRow) -> FeedItem {
    FeedItem {
        news_id: row.get("news_id"),
        title: row.get("title"),
        url: row.get("url"),
        image_url: row.get("image_url"),
        summary: row.get("summary"),
        source: row.get("source"),
        published_at: row.get("published_at"),
        category: row.get("category"),
        category_slug: row.get("category_slug"),
        cluster_id: row.get("cluster_id"),
        size: row.get("size"),
        hot_score: row.get("hot_score"),
        trending_score: None,
        featured_score: None,
        recommendation_score: None,
    }
}

/// Globally hottest clusters, one representative article each.
///
/// # Arguments
/// * `db` - Database instance
/// * `limit` - Maximum number of clusters to return
/// * `offset` - Pagination offset
pub async fn hot_clusters(
    db: &Database,
    limit: i64,
    offset: i64,
) -> Result<Vec<FeedItem>, CoreError> {
    let sql = format!(
        r#"
        SELECT
            c.id AS cluster_id,
            c.size,
            c.hot_score,
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            cat.name AS category,
            cat.slug AS category_slug
        FROM clusters c
        LEFT JOIN categories cat ON cat.id = c.category_id
        JOIN news n ON n.id = (
            SELECT id
            FROM news
            WHERE cluster_id = c.id
              AND {REPRESENTATIVE_FILTER}
            ORDER BY published_at DESC
            LIMIT 1
        )
        ORDER BY c.hot_score DESC, n.published_at DESC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(db.pool())
        .await?;

    Ok(rows.iter().map(feed_item).collect())
}

/// Hottest clusters whose representative article is at most 48 hours old.
pub async fn trending_clusters(db: &Database, limit: i64) -> Result<Vec<FeedItem>, CoreError> {
    let sql = format!(
        r#"
        SELECT
            c.id AS cluster_id,
            c.size,
            c.hot_score,
            c.hot_score AS trending_score,
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            cat.name AS category,
            cat.slug AS category_slug
        FROM clusters c
        LEFT JOIN categories cat ON cat.id = c.category_id
        JOIN news n ON n.id = (
            SELECT id
            FROM news
            WHERE cluster_id = c.id
              AND {REPRESENTATIVE_FILTER}
            ORDER BY published_at DESC
            LIMIT 1
        )
        WHERE n.published_at >= datetime('now', '-{TRENDING_WINDOW_HOURS} hours')
        ORDER BY trending_score DESC, n.published_at DESC
        LIMIT ?
        "#
    );

    let rows = sqlx::query(&sql).bind(limit).fetch_all(db.pool()).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let mut item = feed_item(row);
            item.trending_score = row.get("trending_score");
            item
        })
        .collect())
}

/// Today's featured clusters.
///
/// The recency bonus is negligible next to the hot score; it only breaks
/// ties among same-day items in favor of fresher ones.
pub async fn featured_today(db: &Database, limit: i64) -> Result<Vec<FeedItem>, CoreError> {
    let sql = format!(
        r#"
        SELECT
            c.id AS cluster_id,
            c.size,
            c.hot_score,
            (
                c.hot_score
                + (strftime('%s', 'now') - strftime('%s', n.published_at)) * -0.00001
            ) AS featured_score,
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            cat.name AS category,
            cat.slug AS category_slug
        FROM clusters c
        LEFT JOIN categories cat ON cat.id = c.category_id
        JOIN news n ON n.id = (
            SELECT id
            FROM news
            WHERE cluster_id = c.id
              AND {REPRESENTATIVE_FILTER}
            ORDER BY published_at DESC
            LIMIT 1
        )
        WHERE n.published_at >= date('now', 'localtime')
        ORDER BY featured_score DESC, n.published_at DESC
        LIMIT ?
        "#
    );

    let rows = sqlx::query(&sql).bind(limit).fetch_all(db.pool()).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let mut item = feed_item(row);
            item.featured_score = row.get("featured_score");
            item
        })
        .collect())
}

/// Personalized feed.
///
/// For a known user with usable category affinity, picks per cluster the
/// latest eligible article the user has neither read nor reported, scores
/// it with the recommendation formula, and ranks descending. Anonymous
/// callers, users without history, and empty result pages at offset 0 all
/// delegate to the global hot ranking.
pub async fn recommended_clusters(
    db: &Database,
    audience: Audience,
    limit: i64,
    offset: i64,
) -> Result<Vec<FeedItem>, CoreError> {
    let user_id = match audience {
        Audience::Anonymous => return hot_clusters(db, limit, offset).await,
        Audience::Personalized { user_id } => user_id,
    };

    let affinities =
        preferences::preferred_categories(db, user_id, preferences::DEFAULT_DAY_RANGE).await?;
    let weights = CategoryWeights::from_affinities(&affinities);
    if weights.is_empty() {
        debug!(
            target: TARGET_DB,
            "User {} has no affinity data; serving hot feed", user_id
        );
        return hot_clusters(db, limit, offset).await;
    }

    let sql = format!(
        r#"
        SELECT
            c.id AS cluster_id,
            c.size,
            c.hot_score,
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            n.category_id AS article_category_id,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            strftime('%s', 'now') - strftime('%s', n.published_at) AS age_seconds,
            cat.name AS category,
            cat.slug AS category_slug
        FROM clusters c
        LEFT JOIN categories cat ON cat.id = c.category_id
        JOIN news n ON n.id = (
            SELECT id
            FROM news
            WHERE cluster_id = c.id
              AND {REPRESENTATIVE_FILTER}
              AND id NOT IN (SELECT news_id FROM read_logs WHERE user_id = ?)
              AND id NOT IN (SELECT news_id FROM reports WHERE user_id = ?)
            ORDER BY published_at DESC
            LIMIT 1
        )
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db.pool())
        .await?;

    let mut items: Vec<FeedItem> = rows
        .iter()
        .map(|row| {
            let mut item = feed_item(row);
            let age_seconds = row
                .get::<Option<i64>, _>("age_seconds")
                .map(|s| s as f64)
                .unwrap_or(f64::INFINITY);
            let category_weight =
                weights.weight(row.get::<Option<i64>, _>("article_category_id"));
            item.recommendation_score = Some(recommendation_score(
                item.hot_score.unwrap_or(0.0),
                item.size.unwrap_or(1),
                category_weight,
                age_seconds,
            ));
            item
        })
        .collect();

    // Primary key: score desc; universal secondary key: published_at desc.
    items.sort_by(|a, b| {
        b.recommendation_score
            .partial_cmp(&a.recommendation_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.published_at.cmp(&a.published_at))
    });

    let page: Vec<FeedItem> = items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect();

    // Nothing personalized to show at all: fall back rather than serve an
    // empty first page.
    if page.is_empty() && offset == 0 {
        return hot_clusters(db, limit, offset).await;
    }

    Ok(page)
}

/// Eligible articles in a category, newest first.
pub async fn news_by_category(
    db: &Database,
    slug: &str,
    page: i64,
    limit: i64,
) -> Result<Vec<FeedItem>, CoreError> {
    let offset = (page.max(1) - 1) * limit;
    let sql = format!(
        r#"
        SELECT
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            n.cluster_id,
            cat.name AS category,
            cat.slug AS category_slug,
            c.size,
            c.hot_score
        FROM news n
        JOIN categories cat ON cat.id = n.category_id
        LEFT JOIN clusters c ON c.id = n.cluster_id
        WHERE cat.slug = ? AND {REPRESENTATIVE_FILTER}
        ORDER BY n.published_at DESC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(slug)
        .bind(limit)
        .bind(offset)
        .fetch_all(db.pool())
        .await?;

    Ok(rows.iter().map(feed_item).collect())
}

/// Eligible articles inside one cluster, newest first.
pub async fn news_by_cluster(
    db: &Database,
    cluster_id: i64,
    page: i64,
    limit: i64,
) -> Result<Vec<FeedItem>, CoreError> {
    let offset = (page.max(1) - 1) * limit;
    let sql = format!(
        r#"
        SELECT
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            n.cluster_id,
            cat.name AS category,
            cat.slug AS category_slug,
            c.size,
            c.hot_score
        FROM news n
        LEFT JOIN categories cat ON cat.id = n.category_id
        LEFT JOIN clusters c ON c.id = n.cluster_id
        WHERE n.cluster_id = ? AND {REPRESENTATIVE_FILTER}
        ORDER BY n.published_at DESC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(cluster_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db.pool())
        .await?;

    Ok(rows.iter().map(feed_item).collect())
}

/// Latest eligible articles across all categories, newest first.
pub async fn latest_news(db: &Database, page: i64, limit: i64) -> Result<Vec<FeedItem>, CoreError> {
    let offset = (page.max(1) - 1) * limit;
    let sql = format!(
        r#"
        SELECT
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            n.cluster_id,
            cat.name AS category,
            cat.slug AS category_slug,
            c.size,
            c.hot_score
        FROM news n
        LEFT JOIN categories cat ON cat.id = n.category_id
        LEFT JOIN clusters c ON c.id = n.cluster_id
        WHERE {REPRESENTATIVE_FILTER}
        ORDER BY n.published_at DESC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(db.pool())
        .await?;

    Ok(rows.iter().map(feed_item).collect())
}

/// Substring search over title and summary.
///
/// Not a relevance engine: results order by cluster hotness, then recency.
/// The eligibility filter still applies so suppressed articles can't
/// resurface through search.
pub async fn search_news(
    db: &Database,
    keyword: &str,
    category_id: Option<i64>,
    limit: i64,
) -> Result<Vec<FeedItem>, CoreError> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Ok(Vec::new());
    }

    // Escape LIKE metacharacters so the keyword matches literally.
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{}%", escaped);

    let category_clause = if category_id.is_some() {
        "AND n.category_id = ?"
    } else {
        ""
    };

    let sql = format!(
        r#"
        SELECT
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            n.cluster_id,
            cat.name AS category,
            cat.slug AS category_slug,
            c.size,
            c.hot_score
        FROM news n
        LEFT JOIN categories cat ON cat.id = n.category_id
        LEFT JOIN clusters c ON c.id = n.cluster_id
        WHERE (n.title LIKE ? ESCAPE '\' OR n.summary LIKE ? ESCAPE '\')
          AND {REPRESENTATIVE_FILTER}
          {category_clause}
        ORDER BY
            COALESCE(c.hot_score, 0) DESC,
            n.published_at DESC
        LIMIT ?
        "#
    );

    let mut query = sqlx::query(&sql).bind(&pattern).bind(&pattern);
    if let Some(category_id) = category_id {
        query = query.bind(category_id);
    }
    let rows = query.bind(limit).fetch_all(db.pool()).await?;

    Ok(rows.iter().map(feed_item).collect())
}

/// A user's read history, deduplicated per article, most recent first.
pub async fn read_history(
    db: &Database,
    user_id: i64,
    page: i64,
    limit: i64,
) -> Result<Vec<FeedItem>, CoreError> {
    let offset = (page.max(1) - 1) * limit;

    let rows = sqlx::query(
        r#"
        SELECT
            MAX(rl.read_at) AS read_at,
            n.id AS news_id,
            n.title,
            n.url,
            n.image_url,
            n.summary,
            n.source,
            strftime('%Y-%m-%dT%H:%M:%S', n.published_at) AS published_at,
            n.cluster_id,
            cat.name AS category,
            cat.slug AS category_slug,
            c.size,
            c.hot_score
        FROM read_logs rl
        JOIN news n ON n.id = rl.news_id
        LEFT JOIN categories cat ON cat.id = n.category_id
        LEFT JOIN clusters c ON c.id = n.cluster_id
        WHERE rl.user_id = ?
        GROUP BY n.id
        ORDER BY read_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db.pool())
    .await?;

    Ok(rows.iter().map(feed_item).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{create_category, create_cluster, insert_article, NewArticle};
    use crate::db::updater::{record_report, record_view, ArticleRef, NewReport, ReportReason};
    use chrono::{Duration, Utc};

    fn timestamp(hours_ago: i64) -> String {
        (Utc::now() - Duration::hours(hours_ago))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    async fn set_hot_score(db: &Database, cluster_id: i64, score: f64) {
        sqlx::query("UPDATE clusters SET hot_score = ? WHERE id = ?")
            .bind(score)
            .bind(cluster_id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    async fn set_counters(db: &Database, news_id: i64, views: i64, reports: i64) {
        sqlx::query("UPDATE news SET view_count = ?, report_count = ? WHERE id = ?")
            .bind(views)
            .bind(reports)
            .bind(news_id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    async fn seed_article(
        db: &Database,
        category_id: i64,
        cluster_id: i64,
        slug: &str,
        hours_ago: i64,
    ) -> i64 {
        insert_article(
            db,
            &NewArticle {
                url: format!("https://example.com/{slug}"),
                title: format!("Title {slug}"),
                summary: Some(format!("Summary {slug}")),
                published_at: Some(timestamp(hours_ago)),
                category_id: Some(category_id),
                cluster_id: Some(cluster_id),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    async fn seed_two_clusters(db: &Database) -> (i64, i64, i64, i64) {
        let world = create_category(db, "World", "world").await.unwrap();
        let tech = create_category(db, "Tech", "tech").await.unwrap();

        let hot = create_cluster(db, Some(world)).await.unwrap();
        let cool = create_cluster(db, Some(tech)).await.unwrap();

        seed_article(db, world, hot, "hot-old", 6).await;
        seed_article(db, world, hot, "hot-new", 1).await;
        seed_article(db, tech, cool, "cool-only", 2).await;

        set_hot_score(db, hot, 5.0).await;
        set_hot_score(db, cool, 3.0).await;

        (world, tech, hot, cool)
    }

    #[tokio::test]
    async fn test_hot_orders_by_score_with_newest_representative() {
        let db = Database::new_in_memory().await.unwrap();
        let (_, _, hot, cool) = seed_two_clusters(&db).await;

        let feed = hot_clusters(&db, 10, 0).await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].cluster_id, Some(hot));
        assert_eq!(feed[1].cluster_id, Some(cool));
        assert_eq!(feed[0].title, "Title hot-new");
        assert_eq!(feed[0].size, Some(2));

        let paged = hot_clusters(&db, 1, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].cluster_id, Some(cool));
    }

    #[tokio::test]
    async fn test_suppressed_article_is_not_representative() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();
        let cluster = create_cluster(&db, Some(world)).await.unwrap();
        let older = seed_article(&db, world, cluster, "older", 5).await;
        let newest = seed_article(&db, world, cluster, "newest", 1).await;

        // Bad ratio: 12 reports on 50 views. The newest article is
        // suppressed and the older one takes its place.
        set_counters(&db, newest, 50, 12).await;
        set_hot_score(&db, cluster, 2.0).await;

        let feed = hot_clusters(&db, 10, 0).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].news_id, older);

        // Healthy ratio: 12 reports on 2000 views stays eligible.
        set_counters(&db, newest, 2000, 12).await;
        let feed = hot_clusters(&db, 10, 0).await.unwrap();
        assert_eq!(feed[0].news_id, newest);
    }

    #[tokio::test]
    async fn test_fully_suppressed_cluster_disappears() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();
        let cluster = create_cluster(&db, Some(world)).await.unwrap();
        let only = seed_article(&db, world, cluster, "only", 1).await;
        set_counters(&db, only, 10, 15).await;
        set_hot_score(&db, cluster, 9.0).await;

        assert!(hot_clusters(&db, 10, 0).await.unwrap().is_empty());
        assert!(trending_clusters(&db, 10).await.unwrap().is_empty());
        assert!(search_news(&db, "Title", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trending_restricted_to_recent_publications() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();

        let recent = create_cluster(&db, Some(world)).await.unwrap();
        seed_article(&db, world, recent, "recent", 3).await;
        set_hot_score(&db, recent, 1.0).await;

        let stale = create_cluster(&db, Some(world)).await.unwrap();
        seed_article(&db, world, stale, "stale", 72).await;
        set_hot_score(&db, stale, 8.0).await;

        let feed = trending_clusters(&db, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].cluster_id, Some(recent));
        assert_eq!(feed[0].trending_score, Some(1.0));
    }

    #[tokio::test]
    async fn test_featured_today_restricted_to_same_day() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();

        let today = create_cluster(&db, Some(world)).await.unwrap();
        seed_article(&db, world, today, "today", 0).await;
        set_hot_score(&db, today, 2.0).await;

        let yesterday = create_cluster(&db, Some(world)).await.unwrap();
        seed_article(&db, world, yesterday, "yesterday", 30).await;
        set_hot_score(&db, yesterday, 6.0).await;

        let feed = featured_today(&db, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].cluster_id, Some(today));
        // The recency bonus barely moves the hot score.
        let featured = feed[0].featured_score.unwrap();
        assert!((featured - 2.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_recommended_anonymous_matches_hot() {
        let db = Database::new_in_memory().await.unwrap();
        seed_two_clusters(&db).await;

        let hot: Vec<i64> = hot_clusters(&db, 10, 0)
            .await
            .unwrap()
            .iter()
            .map(|item| item.news_id)
            .collect();
        let recommended: Vec<i64> = recommended_clusters(&db, Audience::Anonymous, 10, 0)
            .await
            .unwrap()
            .iter()
            .map(|item| item.news_id)
            .collect();
        assert_eq!(hot, recommended);
    }

    #[tokio::test]
    async fn test_recommended_without_history_matches_hot() {
        let db = Database::new_in_memory().await.unwrap();
        seed_two_clusters(&db).await;

        let hot: Vec<i64> = hot_clusters(&db, 10, 0)
            .await
            .unwrap()
            .iter()
            .map(|item| item.news_id)
            .collect();
        let recommended: Vec<i64> =
            recommended_clusters(&db, Audience::Personalized { user_id: 77 }, 10, 0)
                .await
                .unwrap()
                .iter()
                .map(|item| item.news_id)
                .collect();
        assert_eq!(hot, recommended);
    }

    #[tokio::test]
    async fn test_recommended_prefers_affinity_and_skips_read_articles() {
        let db = Database::new_in_memory().await.unwrap();
        let (_, tech, hot, cool) = seed_two_clusters(&db).await;
        let user = 5;

        // Build tech affinity: the user reads several tech articles that
        // live outside the ranked clusters.
        for i in 0..4 {
            let id = insert_article(
                &db,
                &NewArticle {
                    url: format!("https://example.com/tech-extra/{i}"),
                    title: format!("Tech extra {i}"),
                    published_at: Some(timestamp(2)),
                    category_id: Some(tech),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            record_view(&db, ArticleRef::Id(id), Some(user)).await.unwrap();
        }
        // Narrow the hot-score gap so the affinity weight can flip the
        // order: (3.5*1.5) vs (3*1.5 + 2.0) at comparable ages.
        set_hot_score(&db, hot, 3.5).await;
        set_hot_score(&db, cool, 3.0).await;

        let feed = recommended_clusters(&db, Audience::Personalized { user_id: user }, 10, 0)
            .await
            .unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].cluster_id, Some(cool));
        assert!(feed[0].recommendation_score.unwrap() > feed[1].recommendation_score.unwrap());

        // Once the user reads the tech cluster's only article, it has no
        // unseen representative left and drops out.
        let cool_article: i64 = sqlx::query_scalar("SELECT id FROM news WHERE cluster_id = ?")
            .bind(cool)
            .fetch_one(db.pool())
            .await
            .unwrap();
        record_view(&db, ArticleRef::Id(cool_article), Some(user))
            .await
            .unwrap();
        set_hot_score(&db, cool, 3.0).await;

        let feed = recommended_clusters(&db, Audience::Personalized { user_id: user }, 10, 0)
            .await
            .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].cluster_id, Some(hot));
    }

    #[tokio::test]
    async fn test_recommended_skips_reported_articles() {
        let db = Database::new_in_memory().await.unwrap();
        let (world, _, hot, _) = seed_two_clusters(&db).await;
        let user = 11;

        // Some world reads so personalization kicks in.
        let warmup = seed_article(&db, world, hot, "warmup", 48).await;
        record_view(&db, ArticleRef::Id(warmup), Some(user)).await.unwrap();
        set_hot_score(&db, hot, 5.0).await;

        // Reporting the newest article rules it out as this user's
        // representative; the older sibling takes over.
        let newest: i64 = sqlx::query_scalar(
            "SELECT id FROM news WHERE cluster_id = ? ORDER BY published_at DESC LIMIT 1",
        )
        .bind(hot)
        .fetch_one(db.pool())
        .await
        .unwrap();
        record_report(
            &db,
            NewReport {
                news_id: newest,
                user_id: Some(user),
                fingerprint: None,
                reason: ReportReason::NotInterested,
                description: None,
            },
        )
        .await
        .unwrap();
        set_hot_score(&db, hot, 5.0).await;

        let feed = recommended_clusters(&db, Audience::Personalized { user_id: user }, 10, 0)
            .await
            .unwrap();
        let hot_entry = feed
            .iter()
            .find(|item| item.cluster_id == Some(hot))
            .expect("hot cluster present");
        assert_ne!(hot_entry.news_id, newest);
    }

    #[tokio::test]
    async fn test_by_category_and_by_cluster_pagination() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();
        let cluster = create_cluster(&db, Some(world)).await.unwrap();
        for i in 0..5 {
            seed_article(&db, world, cluster, &format!("page-{i}"), i).await;
        }

        let first = news_by_category(&db, "world", 1, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "Title page-0");

        let second = news_by_category(&db, "world", 2, 2).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].title, "Title page-2");

        let in_cluster = news_by_cluster(&db, cluster, 1, 10).await.unwrap();
        assert_eq!(in_cluster.len(), 5);
        assert!(news_by_cluster(&db, cluster + 1, 1, 10).await.unwrap().is_empty());
        assert!(news_by_category(&db, "no-such", 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_substring_and_escapes_wildcards() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();
        let tech = create_category(&db, "Tech", "tech").await.unwrap();
        let cluster = create_cluster(&db, Some(world)).await.unwrap();

        insert_article(
            &db,
            &NewArticle {
                url: "https://example.com/pct".to_string(),
                title: "Prices up 100% overnight".to_string(),
                published_at: Some(timestamp(1)),
                category_id: Some(world),
                cluster_id: Some(cluster),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        insert_article(
            &db,
            &NewArticle {
                url: "https://example.com/x".to_string(),
                title: "Prices up 100x overnight".to_string(),
                published_at: Some(timestamp(1)),
                category_id: Some(tech),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // '%' matches literally, not as a wildcard.
        let results = search_news(&db, "100%", None, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Prices up 100% overnight");

        let both = search_news(&db, "Prices", None, 10).await.unwrap();
        assert_eq!(both.len(), 2);

        let scoped = search_news(&db, "Prices", Some(tech), 10).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].category_slug, Some("tech".to_string()));

        assert!(search_news(&db, "   ", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_history_deduplicates_and_orders() {
        let db = Database::new_in_memory().await.unwrap();
        let world = create_category(&db, "World", "world").await.unwrap();
        let cluster = create_cluster(&db, Some(world)).await.unwrap();
        let first = seed_article(&db, world, cluster, "first", 4).await;
        let second = seed_article(&db, world, cluster, "second", 2).await;

        record_view(&db, ArticleRef::Id(first), Some(8)).await.unwrap();
        record_view(&db, ArticleRef::Id(second), Some(8)).await.unwrap();
        record_view(&db, ArticleRef::Id(first), Some(8)).await.unwrap();

        // Spread the log timestamps out; the three views above land within
        // the same second.
        for (news_id, hours_ago) in [(first, 3), (second, 1)] {
            sqlx::query("UPDATE read_logs SET read_at = ? WHERE news_id = ?")
                .bind(timestamp(hours_ago))
                .bind(news_id)
                .execute(db.pool())
                .await
                .unwrap();
        }
        sqlx::query(
            "UPDATE read_logs SET read_at = ? WHERE id = \
             (SELECT MAX(id) FROM read_logs WHERE news_id = ?)",
        )
        .bind(timestamp(0))
        .bind(first)
        .execute(db.pool())
        .await
        .unwrap();

        let history = read_history(&db, 8, 1, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        // Re-reading `first` moved it to the top.
        assert_eq!(history[0].news_id, first);
        assert!(read_history(&db, 9, 1, 10).await.unwrap().is_empty());
    }
}
