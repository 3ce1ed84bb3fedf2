use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::pipeline::GradingPipeline;
use crate::services::result_store::ResultStore;

/// Shared handles built once at startup; read-only afterwards.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    pipeline: Arc<GradingPipeline>,
    results: Arc<dyn ResultStore>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        pipeline: Arc<GradingPipeline>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, pipeline, results }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn pipeline(&self) -> Arc<GradingPipeline> {
        self.inner.pipeline.clone()
    }

    pub(crate) fn results(&self) -> &dyn ResultStore {
        self.inner.results.as_ref()
    }
}
