use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

mod error;
mod flatten;
mod handlers;
mod logging;
mod pictures;
mod state;
mod storage;

use crate::handlers::{
    comment_handler, file_handler, picture_handler, publish_handler, ws_handler,
};
use crate::state::AppState;
use crate::storage::{FileStorage, S3Storage, S3StorageConfig, Storage};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    public_dir: Option<PathBuf>,
    /// Base URL stored pictures and masks are served under.
    #[arg(long)]
    public_url: Option<String>,
    #[arg(long)]
    s3_bucket: Option<String>,
    #[arg(long)]
    s3_prefix: Option<String>,
    #[arg(long)]
    s3_region: Option<String>,
    #[arg(long)]
    s3_endpoint: Option<String>,
    #[arg(long)]
    s3_force_path_style: bool,
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(args.debug);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3000);

    let storage: Arc<dyn Storage> = match args.s3_bucket {
        Some(bucket) => {
            let mut config = S3StorageConfig::new(bucket);
            config.prefix = args.s3_prefix;
            config.region = args.s3_region;
            config.endpoint_url = args.s3_endpoint;
            config.force_path_style = args.s3_force_path_style;
            config.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
            config.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
            tracing::info!(bucket = %config.bucket, "storing pictures in s3");
            Arc::new(S3Storage::new(config).await)
        }
        None => {
            let data_dir = args
                .data_dir
                .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data"));
            tracing::info!(dir = %data_dir.display(), "storing pictures on disk");
            match FileStorage::new(data_dir).await {
                Ok(storage) => Arc::new(storage),
                Err(error) => {
                    tracing::error!("cannot prepare the data directory: {error}");
                    std::process::exit(1);
                }
            }
        }
    };

    let public_url = args
        .public_url
        .unwrap_or_else(|| format!("http://localhost:{port}"));
    let state = AppState::new(storage, public_url);

    let public_dir = args
        .public_dir
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../public"));

    let app = Router::new()
        .route("/pic", post(publish_handler))
        .route("/pic/:picture_id", get(picture_handler))
        .route("/pic/:picture_id/comments", post(comment_handler))
        .route("/pic/:picture_id/ws", get(ws_handler))
        .route("/files/:name", get(file_handler))
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!("failed to bind {addr}: {error}");
            std::process::exit(1);
        }
    };
    tracing::info!("picture store running at http://localhost:{port}");
    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!("server stopped: {error}");
    }
}
