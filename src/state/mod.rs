pub mod chat_hub;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    auth::TokenVerifier, config::AppConfig, dao::match_store::MatchStore, error::ServiceError,
};

pub use self::chat_hub::{ChatConnection, ChatHub, MessageNotifier};

pub type SharedState = Arc<AppState>;

/// Central application state holding the storage handle, live chat sockets and configuration.
pub struct AppState {
    store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    chat_hub: ChatHub,
    config: Arc<AppConfig>,
    tokens: TokenVerifier,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::build(config, None)
    }

    /// Construct a state with a storage backend already installed.
    pub fn with_store(config: AppConfig, store: Arc<dyn MatchStore>) -> SharedState {
        Self::build(config, Some(store))
    }

    fn build(config: AppConfig, store: Option<Arc<dyn MatchStore>>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(store.is_none());
        let tokens = TokenVerifier::new(config.jwt_secret.as_bytes(), config.token_leeway_secs);
        Arc::new(Self {
            store: RwLock::new(store),
            degraded: degraded_tx,
            chat_hub: ChatHub::new(),
            config: Arc::new(config),
            tokens,
        })
    }

    /// Obtain the installed store, failing when the service runs degraded.
    pub async fn require_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        let guard = self.store.read().await;
        guard.as_ref().cloned().ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Registry of WebSocket connections subscribed to conversations.
    pub fn chat_hub(&self) -> &ChatHub {
        &self.chat_hub
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Bearer token verifier.
    pub fn tokens(&self) -> &TokenVerifier {
        &self.tokens
    }
}
