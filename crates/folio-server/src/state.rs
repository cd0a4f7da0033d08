//! Application state for the API server.

use std::sync::Arc;

use folio_core::{JwtCodec, ProxySettings, TokenResolver};
use folio_proxy::{FallbackFetcher, ProxyOrchestrator};
use folio_storage::Database;

use crate::ServerError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Arc<Database>,
    /// Credential resolver, also used by the bearer middleware.
    pub resolver: TokenResolver,
    /// Proxy pipeline.
    pub proxy: Arc<ProxyOrchestrator>,
}

impl AppState {
    /// Creates application state from a database, settings and token codec.
    pub fn new(
        db: Database,
        settings: &ProxySettings,
        codec: JwtCodec,
    ) -> Result<Self, ServerError> {
        let db = Arc::new(db);
        let resolver = TokenResolver::new(Arc::new(codec), db.clone());
        let fetcher = FallbackFetcher::new(settings)?;
        let proxy = ProxyOrchestrator::new(resolver.clone(), fetcher);

        Ok(Self {
            db,
            resolver,
            proxy: Arc::new(proxy),
        })
    }

    /// Creates application state backed by an in-memory database.
    pub fn in_memory(settings: &ProxySettings, codec: JwtCodec) -> Result<Self, ServerError> {
        Self::new(Database::in_memory()?, settings, codec)
    }
}
