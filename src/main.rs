use anyhow::Result;
use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{debug, error, LevelFilter};
use prophecy::api::*;
use prophecy::db::{SQLite, DB};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const DEFAULT_LEADERBOARD_SIZE: usize = 50;

struct Backend {
    db: Box<dyn DB + Send + Sync>,
    paging: bool,
    api_key: Option<String>,
}
impl Backend {
    fn check_key(&self, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
        let expected = match &self.api_key {
            Some(key) => key,
            None => return Ok(()),
        };
        match headers.get("X-Api-Key").and_then(|key| key.to_str().ok()) {
            Some(key) if key == expected => Ok(()),
            _ => Err((StatusCode::UNAUTHORIZED, "Missing or wrong api key".into())),
        }
    }
}

fn map_insert_err(e: anyhow::Error) -> (StatusCode, String) {
    match e.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            debug!("Error: {:#}", e);
            (StatusCode::CONFLICT, format!("{:#}", e))
        }
        _ => map_any_err_and_code(e),
    }
}

#[debug_handler]
async fn get_predictions_page(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse>, (StatusCode, String)> {
    let backend = state.read().await;
    backend.check_key(&headers)?;
    if !backend.paging {
        return Err((
            StatusCode::NOT_IMPLEMENTED,
            "Pagination is disabled".to_string(),
        ));
    }
    let (items, count) = backend
        .db
        .get_predictions_page(query.limit, query.offset)
        .await
        .map_err(map_any_err_and_code)?;
    debug!(
        "Serving {} predictions at offset {} of {}",
        items.len(),
        query.offset,
        count
    );
    Ok(Json(PageResponse {
        items,
        count: Some(count),
    }))
}
async fn get_predictions(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PredictionRow>>, (StatusCode, String)> {
    let backend = state.read().await;
    backend.check_key(&headers)?;
    let predictions = backend
        .db
        .get_predictions()
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(predictions))
}
#[debug_handler]
async fn insert_prediction(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Json(request): Json<PredictionRow>,
) -> Result<StatusCode, (StatusCode, String)> {
    let backend = state.write().await;
    backend.check_key(&headers)?;
    let id = request.id.clone().unwrap_or_default();
    backend
        .db
        .add_prediction(request)
        .await
        .map_err(map_insert_err)?;
    debug!("Inserted prediction {}", id);
    Ok(StatusCode::CREATED)
}
async fn upsert_prediction(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Json(request): Json<PredictionRow>,
) -> Result<(), (StatusCode, String)> {
    let backend = state.write().await;
    backend.check_key(&headers)?;
    let id = request.id.clone().unwrap_or_default();
    backend
        .db
        .upsert_prediction(request)
        .await
        .map_err(map_any_err_and_code)?;
    debug!("Upserted prediction {}", id);
    Ok(())
}
async fn record_vote(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Json(request): Json<VoteRecord>,
) -> Result<StatusCode, (StatusCode, String)> {
    let backend = state.write().await;
    backend.check_key(&headers)?;
    debug!(
        "Recording vote of {} on option {} of prediction {} by {}",
        request.amount, request.option_selected, request.prediction_id, request.user_id
    );
    backend
        .db
        .add_vote(request)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(StatusCode::CREATED)
}
async fn get_votes(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Path(prediction): Path<String>,
) -> Result<Json<Vec<VoteRecord>>, (StatusCode, String)> {
    let backend = state.read().await;
    backend.check_key(&headers)?;
    let votes = backend
        .db
        .get_votes(&prediction)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(votes))
}
async fn upsert_user(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Json(request): Json<User>,
) -> Result<(), (StatusCode, String)> {
    let backend = state.write().await;
    backend.check_key(&headers)?;
    debug!("Upserting user {} ({})", request.username, request.id);
    backend
        .db
        .upsert_user(request)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn get_leaderboard(
    State(state): State<Arc<RwLock<Backend>>>,
    headers: HeaderMap,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, (StatusCode, String)> {
    let backend = state.read().await;
    backend.check_key(&headers)?;
    let entries = backend
        .db
        .get_leaderboard(query.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE))
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(entries))
}

#[derive(Parser)]
struct Args {
    #[arg(short, long, default_value_t = 8081)]
    port: u16,
    /// sqlx connection string, in memory if not set
    #[arg(short, long)]
    db: Option<String>,
    #[arg(short, long, env = "PROPHECY_API_KEY")]
    api_key: Option<String>,
    /// Answer paged requests with 501 like backends without range support
    #[arg(long)]
    no_paging: bool,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    Builder::default()
        .filter_level(if cli.verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Debug
        })
        .parse_default_env()
        .write_style(WriteStyle::Always)
        .init();
    let (_port, handle) = run_server(Some(cli.port), cli.db, cli.api_key, !cli.no_paging).await?;
    handle.await?;
    Ok(())
}

async fn run_server(
    port: Option<u16>,
    db_conn: Option<String>,
    api_key: Option<String>,
    paging: bool,
) -> Result<(u16, JoinHandle<()>)> {
    let state = Arc::new(RwLock::new(Backend {
        db: Box::new(SQLite::new(db_conn).await?),
        paging,
        api_key,
    }));
    let app = Router::new()
        .route(
            "/predictions",
            get(get_predictions_page)
                .post(insert_prediction)
                .put(upsert_prediction),
        )
        .route("/predictions/all", get(get_predictions))
        .route("/predictions/:id/votes", get(get_votes))
        .route("/votes", post(record_vote))
        .route("/users", put(upsert_user))
        .route("/leaderboard", get(get_leaderboard))
        .with_state(state);

    let addr = "127.0.0.1:".to_string() + port.unwrap_or(0).to_string().as_str();
    let server = axum::Server::try_bind(&addr.parse::<SocketAddr>()?)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    debug!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
