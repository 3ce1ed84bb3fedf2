pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::grading_client::AiGradingService;
use crate::services::ocr::DatalabOcrService;
use crate::services::pipeline::GradingPipeline;
use crate::services::response_parser::BraceJsonParser;
use crate::services::result_store::PgResultStore;
use crate::services::uploads::UploadStore;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = match db::init_pool(&settings).await {
        Ok(pool) => {
            db::run_migrations(&pool).await?;
            tracing::info!("Database connected and migrated");
            pool
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                "Failed to connect to database; results will not be stored until it is reachable"
            );
            db::lazy_pool(&settings)?
        }
    };
    let results = Arc::new(PgResultStore::new(db_pool));

    let uploads = UploadStore::from_settings(&settings).await?;
    let extractor = Arc::new(DatalabOcrService::from_settings(&settings)?);
    let grader = Arc::new(AiGradingService::from_settings(&settings)?);
    let parser = Arc::new(BraceJsonParser::new(settings.grading().score_policy));

    tracing::info!(
        model = %settings.ai().ai_model,
        max_score = settings.grading().max_score,
        score_policy = settings.grading().score_policy.as_str(),
        upload_dir = %settings.storage().upload_dir,
        "Grading pipeline configured"
    );

    let pipeline = GradingPipeline::new(
        uploads,
        extractor,
        grader,
        parser,
        results.clone(),
        settings.grading().max_score,
        Duration::from_secs(settings.ai().ai_request_timeout),
    );

    let state = AppState::new(settings, Arc::new(pipeline), results);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Sheetgrade API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}
