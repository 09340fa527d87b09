//! Session, access control and user directory logic for an administrative console.
//!
//! The crate holds everything a console front end needs apart from rendering:
//! - **Sessions**: [`SessionManager`] owns the single logged-in [`Principal`]
//!   and its token, persisted through a [`TokenStore`]
//! - **Access control**: [`AccessGuard`] maps (session, required role) to a
//!   [`Decision`]; [`Navigator`] applies it to routes
//! - **User directory**: [`UserDirectoryStore`] keeps an optimistic, race-safe
//!   snapshot of user records
//! - **Credentials**: [`CredentialService`] changes passwords
//!
//! All remote calls go through the [`Transport`] port.
//!
//! # Core Types
//!
//! - [`Secret<T>`]: Wrapper that redacts passwords and tokens in logs/output
//! - [`Tainted<T>`]: Untrusted form input, promoted to [`Verified<T>`] only by a [`Sanitizer`]
//! - [`ConsoleClient`]: Wires the components together for one client
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use console_access::{
//!     ClientConfig, ConsoleClient, Decision, InMemoryTransport, MemoryTokenStore, Role, Secret,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let client = ConsoleClient::with_parts(
//!     ClientConfig::default(),
//!     Arc::new(InMemoryTransport::demo()),
//!     Arc::new(MemoryTokenStore::new()),
//! )
//! .unwrap();
//!
//! client.session().login("admin", Secret::from("admin123")).await.unwrap();
//! assert_eq!(client.guard().evaluate(Some(Role::Admin)), Decision::Allow);
//!
//! let directory = client.open_directory();
//! let users = directory.list().await.unwrap();
//! assert_eq!(users.len(), 3);
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod credential;
mod directory;
mod error;
mod events;
mod guard;
pub mod logging;
mod navigation;
mod principal;
mod profile;
mod record;
mod sanitizer;
mod secret;
mod session;
mod tainted;
mod token_store;
mod transport;
mod verified;

pub use client::ConsoleClient;
pub use config::{ClientConfig, ServerConfig, StorageConfig, BASE_URL_ENV, TOKEN_PATH_ENV};
pub use credential::CredentialService;
pub use directory::UserDirectoryStore;
pub use error::{
    AuthError, ClientError, ConfigError, DirectoryError, NotFoundError, RegistrationError,
    StorageError, TransportError, ValidationError,
};
pub use events::{SessionEvent, SessionEventKind, SessionEvents};
pub use guard::{decide, AccessGuard, Decision};
pub use navigation::{Access, MenuItem, Navigation, Navigator, Route};
pub use principal::{Principal, Role, UnknownRole, UserId};
pub use profile::ProfileService;
pub use record::{DashboardStats, NewUser, ProfilePatch, UserChanges, UserDraft, UserPatch, UserRecord};
pub use sanitizer::{
    EmailSanitizer, PasswordPolicy, SanitizationError, SanitizationErrorKind, Sanitizer,
    UsernameSanitizer,
};
pub use secret::Secret;
pub use session::{Session, SessionManager};
pub use tainted::Tainted;
pub use token_store::{FileTokenStore, MemoryTokenStore, StoredSession, TokenStore};
pub use transport::{
    HoldGuard, HttpTransport, InMemoryTransport, LoginReply, Operation, Registration, Transport,
};
pub use verified::Verified;
