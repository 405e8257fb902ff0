//! Shared application state.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::db::Store;
use crate::generation::provider::TextProvider;

/// Process-wide state handed to every request handler.
///
/// The store sits behind a non-poisoning mutex; handlers take the lock for
/// single store calls and always release it before awaiting a provider
/// call.
pub struct AppState {
    pub store: Mutex<Store>,
    pub provider: Arc<dyn TextProvider>,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, provider: Arc<dyn TextProvider>, config: Config) -> SharedState {
        Arc::new(Self {
            store: Mutex::new(store),
            provider,
            config,
        })
    }
}
