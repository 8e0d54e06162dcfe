use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                slug TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clusters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER,
                size INTEGER NOT NULL DEFAULT 0,
                hot_score REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_update TEXT,
                FOREIGN KEY (category_id) REFERENCES categories (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_clusters_hot ON clusters (category_id, hot_score DESC);

            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT UNIQUE,
                title TEXT NOT NULL,
                content TEXT,
                summary TEXT,
                image_url TEXT,
                source TEXT,
                published_at TEXT,
                category_id INTEGER,
                cluster_id INTEGER,
                view_count INTEGER NOT NULL DEFAULT 0,
                report_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (category_id) REFERENCES categories (id),
                FOREIGN KEY (cluster_id) REFERENCES clusters (id) ON DELETE SET NULL
            );
            -- Newest article within a cluster
            CREATE INDEX IF NOT EXISTS idx_news_cluster_time ON news (cluster_id, published_at DESC);
            -- Category feed pages
            CREATE INDEX IF NOT EXISTS idx_news_category_time ON news (category_id, published_at DESC);
            CREATE INDEX IF NOT EXISTS idx_news_url ON news (url);

            -- Append-only view log; one row per logged-in read
            CREATE TABLE IF NOT EXISTS read_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                news_id INTEGER NOT NULL,
                url TEXT,
                read_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (news_id) REFERENCES news (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_read_logs_user_time ON read_logs (user_id, read_at DESC);
            CREATE INDEX IF NOT EXISTS idx_read_logs_news_time ON read_logs (news_id, read_at DESC);

            -- Append-only abuse reports; at most one per (news, user) or
            -- per (news, fingerprint) when anonymous
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                news_id INTEGER NOT NULL,
                user_id INTEGER,
                fingerprint TEXT,
                reason TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (news_id) REFERENCES news (id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_news_user
                ON reports (news_id, user_id) WHERE user_id IS NOT NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_news_fingerprint
                ON reports (news_id, fingerprint) WHERE user_id IS NULL AND fingerprint IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_reports_news ON reports (news_id);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
