use anyhow::Result;
use axum::{
    extract::{Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::db::{
    catalog, preferences, ranking, updater, ArticleRef, Audience, Database, NewReport,
    ReportReason,
};
use crate::environment::get_env_var_parsed;
use crate::error::CoreError;
use crate::scoring::CategoryAffinity;
use crate::TARGET_WEB_REQUEST;

/// Request payload for recording a view. At least one of `news_id` and
/// `url` must be present.
#[derive(Deserialize)]
struct ViewRequest {
    news_id: Option<i64>,
    url: Option<String>,
    user_id: Option<i64>,
}

/// Request payload for reporting an article.
#[derive(Deserialize)]
struct ReportRequest {
    news_id: Option<i64>,
    user_id: Option<i64>,
    fingerprint: Option<String>,
    reason: Option<ReportReason>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
    user_id: Option<i64>,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_limit")]
    limit: i64,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    category_id: Option<i64>,
    #[serde(default = "default_page_limit")]
    limit: i64,
}

#[derive(Deserialize)]
struct AffinityQuery {
    #[serde(default = "default_day_range")]
    days: i64,
}

fn default_feed_limit() -> i64 {
    10
}

fn default_page() -> i64 {
    1
}

fn default_page_limit() -> i64 {
    20
}

fn default_day_range() -> i64 {
    preferences::DEFAULT_DAY_RANGE
}

/// Maps a core error onto the HTTP status the web layer expects.
fn status_for(operation: &str, err: CoreError) -> StatusCode {
    match err {
        CoreError::MalformedInput(ref detail) => {
            warn!(target: TARGET_WEB_REQUEST, "{} rejected: {}", operation, detail);
            StatusCode::BAD_REQUEST
        }
        CoreError::NotFound(ref what) => {
            warn!(target: TARGET_WEB_REQUEST, "{}: {} not found", operation, what);
            StatusCode::NOT_FOUND
        }
        CoreError::DuplicateReport => {
            warn!(target: TARGET_WEB_REQUEST, "{}: duplicate report", operation);
            StatusCode::CONFLICT
        }
        CoreError::TransientStore(err) => {
            warn!(target: TARGET_WEB_REQUEST, "{} store error: {:#?}", operation, err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Main application loop, setting up and running the Axum-based API server.
pub async fn api_loop() -> Result<()> {
    let app = Router::new()
        .route("/news/view", post(record_view))
        .route("/report", post(record_report))
        .route("/feeds/hot", get(hot_feed))
        .route("/feeds/trending", get(trending_feed))
        .route("/feeds/featured", get(featured_feed))
        .route("/feeds/recommended", get(recommended_feed))
        .route("/categories", get(list_categories))
        .route("/categories/{slug}/news", get(category_news))
        .route("/clusters/{cluster_id}/news", get(cluster_news))
        .route("/search", get(search))
        .route("/news/latest", get(latest_news))
        .route("/news/{news_id}/content", get(news_content))
        .route("/users/{user_id}/categories", get(user_categories))
        .route("/users/{user_id}/history", get(user_history));

    let port: u16 = get_env_var_parsed("PORT", 8080);
    let addr = format!("0.0.0.0:{}", port);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("Server running on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server failed");

    Ok(())
}

/// Records one view of an article, identified by ID or URL.
async fn record_view(Json(payload): Json<ViewRequest>) -> Result<Json<Value>, StatusCode> {
    let article = match (payload.news_id, payload.url) {
        (Some(id), _) => ArticleRef::Id(id),
        (None, Some(url)) => ArticleRef::Url(url),
        (None, None) => {
            return Err(status_for(
                "record_view",
                CoreError::MalformedInput("missing article id or url".to_string()),
            ));
        }
    };

    let db: &Database = Database::instance().await;
    updater::record_view(db, article, payload.user_id)
        .await
        .map_err(|err| status_for("record_view", err))?;

    Ok(Json(json!({ "success": true })))
}

/// Files an abuse report against an article.
async fn record_report(Json(payload): Json<ReportRequest>) -> Result<Json<Value>, StatusCode> {
    let (Some(news_id), Some(reason)) = (payload.news_id, payload.reason) else {
        return Err(status_for(
            "record_report",
            CoreError::MalformedInput("missing article id or reason".to_string()),
        ));
    };

    let db: &Database = Database::instance().await;
    updater::record_report(
        db,
        NewReport {
            news_id,
            user_id: payload.user_id,
            fingerprint: payload.fingerprint,
            reason,
            description: payload.description,
        },
    )
    .await
    .map_err(|err| status_for("record_report", err))?;

    Ok(Json(json!({ "success": true })))
}

async fn hot_feed(Query(query): Query<FeedQuery>) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::hot_clusters(db, query.limit, query.offset)
        .await
        .map(Json)
        .map_err(|err| status_for("hot_feed", err))
}

async fn trending_feed(
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::trending_clusters(db, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("trending_feed", err))
}

async fn featured_feed(
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::featured_today(db, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("featured_feed", err))
}

/// Personalized feed; anonymous callers get the global hot feed.
async fn recommended_feed(
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let audience = match query.user_id {
        Some(user_id) => Audience::Personalized { user_id },
        None => Audience::Anonymous,
    };

    let db = Database::instance().await;
    ranking::recommended_clusters(db, audience, query.limit, query.offset)
        .await
        .map(Json)
        .map_err(|err| status_for("recommended_feed", err))
}

async fn list_categories() -> Result<Json<Vec<catalog::Category>>, StatusCode> {
    let db = Database::instance().await;
    catalog::categories(db)
        .await
        .map(Json)
        .map_err(|err| status_for("list_categories", err))
}

async fn category_news(
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::news_by_category(db, &slug, query.page, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("category_news", err))
}

async fn cluster_news(
    Path(cluster_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::news_by_cluster(db, cluster_id, query.page, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("cluster_news", err))
}

async fn search(
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::search_news(db, &query.q, query.category_id, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("search", err))
}

async fn latest_news(
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::latest_news(db, query.page, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("latest_news", err))
}

async fn news_content(Path(news_id): Path<i64>) -> Result<Json<Value>, StatusCode> {
    let db = Database::instance().await;
    let content = catalog::article_content(db, news_id)
        .await
        .map_err(|err| status_for("news_content", err))?;

    Ok(Json(json!({ "content": content })))
}

async fn user_categories(
    Path(user_id): Path<i64>,
    Query(query): Query<AffinityQuery>,
) -> Result<Json<Vec<CategoryAffinity>>, StatusCode> {
    let db = Database::instance().await;
    preferences::preferred_categories(db, user_id, query.days)
        .await
        .map(Json)
        .map_err(|err| status_for("user_categories", err))
}

async fn user_history(
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ranking::FeedItem>>, StatusCode> {
    let db = Database::instance().await;
    ranking::read_history(db, user_id, query.page, query.limit)
        .await
        .map(Json)
        .map_err(|err| status_for("user_history", err))
}
