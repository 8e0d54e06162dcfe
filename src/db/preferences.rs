use sqlx::Row;
use tracing::debug;

use super::core::Database;
use crate::error::CoreError;
use crate::scoring::recommendation::MAX_PREFERRED_CATEGORIES;
use crate::scoring::CategoryAffinity;
use crate::TARGET_DB;

/// Default trailing window, in days, for affinity estimation.
pub const DEFAULT_DAY_RANGE: i64 = 30;

/// Derives a user's preferred categories from their read history.
///
/// Groups the user's read log rows (joined to articles and categories)
/// within the trailing window and ranks by read_count desc, active_days
/// desc, last_read desc, truncated to the top five. An empty list means
/// "no personalization available" and is not an error; anonymous and
/// no-history users both get one.
///
/// # Arguments
/// * `db` - Database instance
/// * `user_id` - ID of the user
/// * `day_range` - Trailing window in days
pub async fn preferred_categories(
    db: &Database,
    user_id: i64,
    day_range: i64,
) -> Result<Vec<CategoryAffinity>, CoreError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT
            n.category_id,
            cat.name AS category_name,
            cat.slug AS category_slug,
            COUNT(DISTINCT rl.news_id) AS read_count,
            COUNT(DISTINCT DATE(rl.read_at)) AS active_days,
            MAX(rl.read_at) AS last_read
        FROM read_logs rl
        JOIN news n ON n.id = rl.news_id
        JOIN categories cat ON cat.id = n.category_id
        WHERE rl.user_id = ?
          AND rl.read_at >= datetime('now', '-' || ? || ' days')
        GROUP BY n.category_id, cat.name, cat.slug
        ORDER BY
            read_count DESC,
            active_days DESC,
            last_read DESC
        LIMIT {}
        "#,
        MAX_PREFERRED_CATEGORIES
    ))
    .bind(user_id)
    .bind(day_range)
    .fetch_all(db.pool())
    .await?;

    let affinities: Vec<CategoryAffinity> = rows
        .iter()
        .map(|row| CategoryAffinity {
            category_id: row.get("category_id"),
            category_name: row.get("category_name"),
            category_slug: row.get("category_slug"),
            read_count: row.get("read_count"),
            active_days: row.get("active_days"),
            last_read: row.get("last_read"),
        })
        .collect();

    debug!(
        target: TARGET_DB,
        "User {} has {} preferred categories over {} days",
        user_id,
        affinities.len(),
        day_range
    );
    Ok(affinities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{create_category, insert_article, NewArticle};
    use crate::db::updater::{record_view, ArticleRef};

    #[tokio::test]
    async fn test_no_history_gives_empty_list() {
        let db = Database::new_in_memory().await.unwrap();
        let affinities = preferred_categories(&db, 1, DEFAULT_DAY_RANGE).await.unwrap();
        assert!(affinities.is_empty());
    }

    #[tokio::test]
    async fn test_affinities_ranked_and_capped_at_five() {
        let db = Database::new_in_memory().await.unwrap();

        // Seven categories; the user reads a different number of articles in
        // each, most in category 0.
        for cat in 0..7 {
            let category_id = create_category(&db, &format!("Cat {cat}"), &format!("cat-{cat}"))
                .await
                .unwrap();
            for article in 0..(7 - cat) {
                let news_id = insert_article(
                    &db,
                    &NewArticle {
                        url: format!("https://example.com/{cat}/{article}"),
                        title: format!("Article {cat}/{article}"),
                        category_id: Some(category_id),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
                record_view(&db, ArticleRef::Id(news_id), Some(42)).await.unwrap();
            }
        }

        let affinities = preferred_categories(&db, 42, DEFAULT_DAY_RANGE).await.unwrap();
        assert_eq!(affinities.len(), 5);
        assert_eq!(affinities[0].category_slug, "cat-0");
        assert_eq!(affinities[0].read_count, 7);
        // Strictly decreasing read counts in this fixture.
        for pair in affinities.windows(2) {
            assert!(pair[0].read_count > pair[1].read_count);
        }

        // Another user's reads don't leak in.
        let other = preferred_categories(&db, 43, DEFAULT_DAY_RANGE).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_rereads_count_distinct_articles() {
        let db = Database::new_in_memory().await.unwrap();
        let category_id = create_category(&db, "Tech", "tech").await.unwrap();
        let news_id = insert_article(
            &db,
            &NewArticle {
                url: "https://example.com/tech/1".to_string(),
                title: "One story".to_string(),
                category_id: Some(category_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        for _ in 0..5 {
            record_view(&db, ArticleRef::Id(news_id), Some(9)).await.unwrap();
        }

        let affinities = preferred_categories(&db, 9, DEFAULT_DAY_RANGE).await.unwrap();
        assert_eq!(affinities.len(), 1);
        assert_eq!(affinities[0].read_count, 1);
        assert_eq!(affinities[0].active_days, 1);
    }
}
