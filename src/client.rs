use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ClientConfig;
use crate::credential::CredentialService;
use crate::directory::UserDirectoryStore;
use crate::error::ClientError;
use crate::guard::AccessGuard;
use crate::navigation::Navigator;
use crate::profile::ProfileService;
use crate::session::SessionManager;
use crate::token_store::{FileTokenStore, TokenStore};
use crate::transport::{HttpTransport, Transport};

/// Wires the components of one console client together.
///
/// Owns the [`SessionManager`] and the context every directory store opened
/// through it belongs to. [`shutdown`](Self::shutdown) tears all of them down.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use console_access::{ClientConfig, ConsoleClient, InMemoryTransport, MemoryTokenStore};
///
/// let client = ConsoleClient::with_parts(
///     ClientConfig::default(),
///     Arc::new(InMemoryTransport::demo()),
///     Arc::new(MemoryTokenStore::new()),
/// )
/// .unwrap();
///
/// assert!(!client.session().is_authenticated());
/// let directory = client.open_directory();
/// client.shutdown();
/// assert!(directory.is_torn_down());
/// ```
pub struct ConsoleClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    credentials: Arc<CredentialService>,
    context: CancellationToken,
}

impl ConsoleClient {
    /// Starts a client talking HTTP to `config.server`, with the session kept in
    /// the configured token file.
    pub fn start(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config.server)?);
        let storage = Arc::new(FileTokenStore::new(config.token_path()));
        Self::with_parts(config, transport, storage)
    }

    /// Starts a client on explicit transport and storage.
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let session = Arc::new(SessionManager::restore(transport.clone(), storage)?);
        info!(
            base_url = %config.server.base_url,
            restored = session.is_authenticated(),
            "console client started"
        );

        let credentials = Arc::new(CredentialService::new(transport.clone(), session.clone()));

        Ok(Self {
            config,
            transport,
            session,
            credentials,
            context: CancellationToken::new(),
        })
    }

    /// The configuration the client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session owner.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// An access guard over the session.
    pub fn guard(&self) -> AccessGuard {
        AccessGuard::new(self.session.clone())
    }

    /// A navigator over the session.
    pub fn navigator(&self) -> Navigator {
        Navigator::new(self.guard())
    }

    /// A new directory store bound to this client's context.
    pub fn open_directory(&self) -> UserDirectoryStore {
        UserDirectoryStore::with_context(
            self.transport.clone(),
            self.session.clone(),
            self.context.child_token(),
        )
    }

    /// Password changes for the logged-in principal.
    ///
    /// Every call hands out the same service, so only one change can be in
    /// flight per client.
    pub fn credentials(&self) -> Arc<CredentialService> {
        self.credentials.clone()
    }

    /// The logged-in principal's profile.
    pub fn profile(&self) -> ProfileService {
        ProfileService::new(self.transport.clone(), self.session.clone())
    }

    /// Tears down every directory store opened through this client.
    ///
    /// The session is kept in storage; use [`SessionManager::logout`] to end it.
    pub fn shutdown(self) {
        self.context.cancel();
        info!("console client shut down");
    }
}
