//! Shared application state, handed to every handler via axum's `State`
//! extractor (mirrors the teacher's `AxumAppState`).

use crate::config::Config;
use broker_core::{Dispatcher, LeaseManager};
use broker_postgres::PgStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PgStore>,
    pub dispatcher: Arc<Dispatcher<PgStore>>,
    pub lease: Arc<LeaseManager<PgStore>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: PgStore, config: Config) -> Self {
        let store = Arc::new(store);
        Self {
            dispatcher: Arc::new(Dispatcher::new(store.clone())),
            lease: Arc::new(LeaseManager::new(store.clone())),
            store,
            config: Arc::new(config),
        }
    }
}
