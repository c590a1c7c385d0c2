use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, dataset::Dataset, llm::LlmManager, session::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub dataset: Arc<Dataset>,
    pub llm_manager: LlmManager,
    pub sessions: SessionStore,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, dataset: Dataset, llm_manager: LlmManager, shutdown_tx: Option<oneshot::Sender<()>>) -> Self {
        Self {
            config,
            dataset: Arc::new(dataset),
            llm_manager,
            sessions: SessionStore::new(),
            shutdown_sender: Arc::new(Mutex::new(shutdown_tx)),
        }
    }
}
