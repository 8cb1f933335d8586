use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::worker::PipelineStats;

/// Readiness check against one backend
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ping(&self) -> AppResult<()>;
}

/// Shared state for the ops endpoints
#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<PipelineStats>,
    pub probes: Vec<Arc<dyn Probe>>,
}

impl AppState {
    pub fn new(stats: Arc<PipelineStats>) -> Self {
        Self {
            stats,
            probes: Vec::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(probe);
        self
    }
}
