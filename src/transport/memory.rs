use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::{LoginReply, Registration, Transport};
use crate::error::TransportError;
use crate::principal::{Principal, Role, UserId};
use crate::record::{DashboardStats, NewUser, UserChanges, UserRecord};
use crate::Secret;

/// Names the transport operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `login`
    Login,
    /// `register`
    Register,
    /// `list_users`
    ListUsers,
    /// `create_user`
    CreateUser,
    /// `update_user`
    UpdateUser,
    /// `delete_user`
    DeleteUser,
    /// `change_password`
    ChangePassword,
    /// `dashboard_stats`
    DashboardStats,
    /// `fetch_profile`
    FetchProfile,
    /// `update_profile`
    UpdateProfile,
}

struct Account {
    record: UserRecord,
    password: String,
}

struct Backend {
    accounts: BTreeMap<UserId, Account>,
    tokens: HashMap<String, UserId>,
    next_id: UserId,
    issued: u64,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<TransportError>>,
    offline: bool,
    login_includes_user: bool,
}

impl Backend {
    fn allocate_id(&mut self) -> UserId {
        let max = self.accounts.keys().next_back().copied().unwrap_or(0);
        let id = self.next_id.max(max + 1);
        self.next_id = id + 1;
        id
    }

    fn authorize(&self, token: &Secret<String>) -> Result<UserId, TransportError> {
        self.tokens
            .get(token.expose_secret())
            .copied()
            .filter(|id| self.accounts.contains_key(id))
            .ok_or(TransportError::Unauthorized(401))
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.accounts
            .values()
            .any(|a| a.record.username == username && Some(a.record.id) != except)
    }

    fn insert(&mut self, username: &str, email: &str, password: &str, role: Role) -> UserRecord {
        let id = self.allocate_id();
        let record = UserRecord {
            id,
            username: username.to_string(),
            email: email.to_string(),
            role,
            created_at: Utc::now(),
        };
        self.accounts.insert(
            id,
            Account {
                record: record.clone(),
                password: password.to_string(),
            },
        );
        record
    }

    fn apply(&mut self, id: UserId, changes: &UserChanges) -> Result<UserRecord, TransportError> {
        if let Some(username) = &changes.username {
            if self.username_taken(username, Some(id)) {
                return Err(duplicate_username());
            }
        }
        let account = self.accounts.get_mut(&id).ok_or(TransportError::NotFound)?;
        account.record = changes.apply_to(&account.record);
        Ok(account.record.clone())
    }
}

fn duplicate_username() -> TransportError {
    TransportError::Rejected {
        status: 400,
        message: "Username already exists".to_string(),
    }
}

/// Keeps the transport paused while alive; see [`InMemoryTransport::hold`].
pub struct HoldGuard {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// An in-process backend implementing [`Transport`].
///
/// Holds accounts, passwords and issued tokens in memory and answers like the
/// HTTP backend would (401 for bad credentials or tokens, 404 for unknown ids,
/// 400 with a message for duplicate usernames). Tests use its hooks to inject
/// failures, count calls and pause requests mid-flight.
///
/// # Examples
///
/// ```
/// use console_access::{InMemoryTransport, Operation, Role};
///
/// let transport = InMemoryTransport::new()
///     .with_user("admin", "admin@example.com", "correctpass", Role::Admin);
/// assert_eq!(transport.users().len(), 1);
/// assert_eq!(transport.calls(Operation::Login), 0);
/// ```
pub struct InMemoryTransport {
    backend: Mutex<Backend>,
    gate: Arc<RwLock<()>>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    /// An empty backend.
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend {
                accounts: BTreeMap::new(),
                tokens: HashMap::new(),
                next_id: 1,
                issued: 0,
                calls: HashMap::new(),
                failures: HashMap::new(),
                offline: false,
                login_includes_user: true,
            }),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// The three accounts the console ships with in demo mode.
    pub fn demo() -> Self {
        Self::new()
            .with_user("admin", "admin@example.com", "admin123", Role::Admin)
            .with_user("user1", "user1@example.com", "password1", Role::User)
            .with_user("user2", "user2@example.com", "password2", Role::User)
    }

    /// Adds an account; ids are assigned sequentially.
    pub fn with_user(
        self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Self {
        self.backend.lock().insert(username, email, password, role);
        self
    }

    /// Makes the next call to `op` fail with `error`. Calls queue up in order.
    pub fn fail_next(&self, op: Operation, error: TransportError) {
        self.backend
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// While offline, every call fails with [`TransportError::Network`].
    pub fn set_offline(&self, offline: bool) {
        self.backend.lock().offline = offline;
    }

    /// Invalidates every issued token, as if the server-side sessions expired.
    pub fn revoke_tokens(&self) {
        self.backend.lock().tokens.clear();
    }

    /// Forces the next server-assigned id to be at least `id`.
    pub fn set_next_id(&self, id: UserId) {
        self.backend.lock().next_id = id;
    }

    /// Controls whether login replies carry the user object.
    pub fn set_login_includes_user(&self, include: bool) {
        self.backend.lock().login_includes_user = include;
    }

    /// Number of calls made to `op` so far.
    pub fn calls(&self, op: Operation) -> usize {
        self.backend.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Server-side view of all users, ordered by id.
    pub fn users(&self) -> Vec<UserRecord> {
        self.backend
            .lock()
            .accounts
            .values()
            .map(|a| a.record.clone())
            .collect()
    }

    /// Returns true when `username` currently has `password`.
    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.backend
            .lock()
            .accounts
            .values()
            .any(|a| a.record.username == username && a.password == password)
    }

    /// Pauses every call until the returned guard is dropped.
    ///
    /// Calls issued while paused wait before they are counted or answered, which
    /// lets tests observe an operation while its request is in flight.
    pub async fn hold(&self) -> HoldGuard {
        HoldGuard {
            _guard: self.gate.clone().write_owned().await,
        }
    }

    async fn pass_gate(&self) {
        drop(self.gate.read().await);
    }

    fn enter(&self, op: Operation) -> Result<(), TransportError> {
        let mut backend = self.backend.lock();
        *backend.calls.entry(op).or_insert(0) += 1;

        if backend.offline {
            return Err(TransportError::Network("connection refused".to_string()));
        }
        if let Some(error) = backend.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn login(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<LoginReply, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::Login)?;

        let mut backend = self.backend.lock();
        let principal = backend
            .accounts
            .values()
            .find(|a| a.record.username == username && &a.password == password.expose_secret())
            .map(|a| Principal::new(a.record.id, a.record.username.clone(), a.record.role))
            .ok_or(TransportError::Unauthorized(401))?;

        backend.issued += 1;
        let token = format!("mem-token-{}-{}", principal.id, backend.issued);
        backend.tokens.insert(token.clone(), principal.id);

        Ok(LoginReply {
            token: Secret::new(token),
            user: backend.login_includes_user.then_some(principal),
        })
    }

    async fn register(&self, registration: &Registration) -> Result<(), TransportError> {
        self.pass_gate().await;
        self.enter(Operation::Register)?;

        let mut backend = self.backend.lock();
        if backend.username_taken(&registration.username, None) {
            return Err(duplicate_username());
        }
        backend.insert(
            &registration.username,
            &registration.email,
            registration.password.expose_secret(),
            Role::User,
        );
        Ok(())
    }

    async fn list_users(&self, token: &Secret<String>) -> Result<Vec<UserRecord>, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::ListUsers)?;

        let backend = self.backend.lock();
        backend.authorize(token)?;
        Ok(backend.accounts.values().map(|a| a.record.clone()).collect())
    }

    async fn create_user(
        &self,
        token: &Secret<String>,
        user: &NewUser,
    ) -> Result<UserRecord, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::CreateUser)?;

        let mut backend = self.backend.lock();
        backend.authorize(token)?;
        if backend.username_taken(&user.username, None) {
            return Err(duplicate_username());
        }
        Ok(backend.insert(
            &user.username,
            &user.email,
            user.password.expose_secret(),
            user.role,
        ))
    }

    async fn update_user(
        &self,
        token: &Secret<String>,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<UserRecord, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::UpdateUser)?;

        let mut backend = self.backend.lock();
        backend.authorize(token)?;
        backend.apply(id, changes)
    }

    async fn delete_user(&self, token: &Secret<String>, id: UserId) -> Result<(), TransportError> {
        self.pass_gate().await;
        self.enter(Operation::DeleteUser)?;

        let mut backend = self.backend.lock();
        backend.authorize(token)?;
        backend
            .accounts
            .remove(&id)
            .ok_or(TransportError::NotFound)?;
        backend.tokens.retain(|_, owner| *owner != id);
        Ok(())
    }

    async fn change_password(
        &self,
        token: &Secret<String>,
        current: &Secret<String>,
        new: &Secret<String>,
    ) -> Result<(), TransportError> {
        self.pass_gate().await;
        self.enter(Operation::ChangePassword)?;

        let mut backend = self.backend.lock();
        let id = backend.authorize(token)?;
        let account = backend.accounts.get_mut(&id).ok_or(TransportError::NotFound)?;
        if &account.password != current.expose_secret() {
            return Err(TransportError::Rejected {
                status: 400,
                message: "Current password is incorrect".to_string(),
            });
        }
        account.password = new.expose_secret().clone();
        Ok(())
    }

    async fn dashboard_stats(&self, token: &Secret<String>) -> Result<DashboardStats, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::DashboardStats)?;

        let backend = self.backend.lock();
        backend.authorize(token)?;
        let records: Vec<UserRecord> = backend.accounts.values().map(|a| a.record.clone()).collect();
        Ok(DashboardStats::from_records(&records))
    }

    async fn fetch_profile(&self, token: &Secret<String>) -> Result<UserRecord, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::FetchProfile)?;

        let backend = self.backend.lock();
        let id = backend.authorize(token)?;
        backend
            .accounts
            .get(&id)
            .map(|a| a.record.clone())
            .ok_or(TransportError::NotFound)
    }

    async fn update_profile(
        &self,
        token: &Secret<String>,
        changes: &UserChanges,
    ) -> Result<UserRecord, TransportError> {
        self.pass_gate().await;
        self.enter(Operation::UpdateProfile)?;

        let mut backend = self.backend.lock();
        let id = backend.authorize(token)?;
        let own_fields = UserChanges {
            role: None,
            ..changes.clone()
        };
        backend.apply(id, &own_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> Secret<String> {
        Secret::from(s)
    }

    #[tokio::test]
    async fn login_issues_distinct_tokens() {
        let transport = InMemoryTransport::demo();

        let first = transport.login("admin", &pw("admin123")).await.unwrap();
        let second = transport.login("admin", &pw("admin123")).await.unwrap();

        assert!(!first.token.matches(&second.token));
        assert_eq!(first.user.unwrap().role, Role::Admin);
        assert_eq!(transport.calls(Operation::Login), 2);
    }

    #[tokio::test]
    async fn bad_password_is_unauthorized() {
        let transport = InMemoryTransport::demo();
        let err = transport.login("admin", &pw("nope")).await.unwrap_err();
        assert_eq!(err, TransportError::Unauthorized(401));
    }

    #[tokio::test]
    async fn revoked_tokens_are_rejected() {
        let transport = InMemoryTransport::demo();
        let reply = transport.login("admin", &pw("admin123")).await.unwrap();

        transport.revoke_tokens();

        let err = transport.list_users(&reply.token).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let transport = InMemoryTransport::demo();
        transport.fail_next(Operation::Login, TransportError::Network("down".to_string()));

        let err = transport.login("admin", &pw("admin123")).await.unwrap_err();
        assert_eq!(err, TransportError::Network("down".to_string()));
        assert!(transport.login("admin", &pw("admin123")).await.is_ok());
    }

    #[tokio::test]
    async fn ids_follow_forced_next_id() {
        let transport = InMemoryTransport::demo();
        let token = transport.login("admin", &pw("admin123")).await.unwrap().token;
        transport.set_next_id(10);

        let user = NewUser {
            username: "late".to_string(),
            email: "late@example.com".to_string(),
            password: pw("pw"),
            role: Role::User,
        };
        let created = transport.create_user(&token, &user).await.unwrap();
        assert_eq!(created.id, 10);
    }

    #[tokio::test]
    async fn deleting_a_user_revokes_their_tokens() {
        let transport = InMemoryTransport::demo();
        let admin = transport.login("admin", &pw("admin123")).await.unwrap().token;
        let user = transport.login("user1", &pw("password1")).await.unwrap().token;

        transport.delete_user(&admin, 2).await.unwrap();

        assert!(transport.fetch_profile(&user).await.unwrap_err().is_unauthorized());
        assert_eq!(
            transport.delete_user(&admin, 2).await.unwrap_err(),
            TransportError::NotFound
        );
    }

    #[tokio::test]
    async fn profile_update_cannot_change_role() {
        let transport = InMemoryTransport::demo();
        let token = transport.login("user1", &pw("password1")).await.unwrap().token;

        let changes = UserChanges {
            role: Some(Role::Admin),
            email: Some("u1@example.org".to_string()),
            ..UserChanges::default()
        };
        let updated = transport.update_profile(&token, &changes).await.unwrap();

        assert_eq!(updated.role, Role::User);
        assert_eq!(updated.email, "u1@example.org");
    }
}
