//! The user directory: a local snapshot of user records kept in step with the
//! server through optimistic mutations.
//!
//! Every mutation follows the same shape:
//!
//! 1. validate input locally (nothing is sent when this fails)
//! 2. apply the change to the snapshot and mark the id as in flight
//! 3. submit through the [`Transport`]
//! 4. reconcile with the server's answer, or roll the local change back
//!
//! Two mutations never overlap on the same id; the second one fails with
//! [`DirectoryError::Busy`]. The snapshot lock is never held across an await.
//!
//! An optimistic create is tracked by a ticket of its own rather than by the
//! local id it displays, since the server may hand that id to someone else.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DirectoryError, NotFoundError, TransportError};
use crate::principal::UserId;
use crate::record::{DashboardStats, UserDraft, UserPatch, UserRecord};
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::Secret;

type Ticket = u64;

#[derive(Debug, Default)]
struct DirectoryState {
    records: Vec<UserRecord>,
    // Ids with an update or delete in flight.
    in_flight: HashSet<UserId>,
    // Creates awaiting the server's answer, mapped to their local id.
    pending: HashMap<Ticket, UserId>,
    next_ticket: Ticket,
}

impl DirectoryState {
    fn position(&self, id: UserId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    fn next_id(&self) -> UserId {
        self.records
            .iter()
            .map(|r| r.id)
            .chain(self.in_flight.iter().copied())
            .chain(self.pending.values().copied())
            .max()
            .map_or(1, |max| max + 1)
    }

    fn busy(&self, id: UserId) -> bool {
        self.in_flight.contains(&id) || self.pending.values().any(|&local| local == id)
    }

    fn issue_ticket(&mut self, id: UserId) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(ticket, id);
        ticket
    }

    /// Forgets optimistic creates whose local id now belongs to a server record.
    fn release_claimed(&mut self, id: UserId) {
        self.pending.retain(|_, local| *local != id);
    }

    fn upsert(&mut self, record: UserRecord) {
        match self.position(record.id) {
            Some(index) => self.records[index] = record,
            None => self.records.push(record),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mark {
    Id(UserId),
    Create(Ticket),
}

/// Keeps a mutation marked as in flight until dropped.
struct InFlight<'a> {
    state: &'a Mutex<DirectoryState>,
    mark: Mark,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a Mutex<DirectoryState>, mark: Mark) -> Self {
        Self { state, mark }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        match self.mark {
            Mark::Id(id) => {
                state.in_flight.remove(&id);
            }
            Mark::Create(ticket) => {
                state.pending.remove(&ticket);
            }
        }
    }
}

/// Owns the list of user records shown by the console.
///
/// Reads ([`snapshot`](Self::snapshot), [`get`](Self::get)) are synchronous.
/// Mutations are optimistic: the snapshot changes immediately and is rolled
/// back if the server refuses. A `401`/`403` from the server clears the session.
///
/// The store belongs to a client context. After [`teardown`](Self::teardown)
/// every operation fails with [`DirectoryError::Cancelled`], and answers that
/// arrive late are dropped without touching the snapshot.
pub struct UserDirectoryStore {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    state: Mutex<DirectoryState>,
    context: CancellationToken,
}

impl UserDirectoryStore {
    /// An empty store with its own context.
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionManager>) -> Self {
        Self::with_context(transport, session, CancellationToken::new())
    }

    /// An empty store that is torn down together with `context`.
    pub fn with_context(
        transport: Arc<dyn Transport>,
        session: Arc<SessionManager>,
        context: CancellationToken,
    ) -> Self {
        Self {
            transport,
            session,
            state: Mutex::new(DirectoryState::default()),
            context,
        }
    }

    /// Fetches all users and replaces the snapshot with the result.
    ///
    /// Optimistic entries of creates still in flight are kept unless the server
    /// list already uses their id. On failure the snapshot is left unchanged.
    pub async fn list(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        self.ensure_live()?;
        let token = self.bearer()?;

        let fetched = match self.round_trip(self.transport.list_users(&token)).await? {
            Ok(records) => records,
            Err(e) => return Err(self.transport_failure(e, &token, None)),
        };

        let mut state = self.state.lock();
        let optimistic: Vec<UserRecord> = state
            .records
            .iter()
            .filter(|r| state.pending.values().any(|&local| local == r.id))
            .cloned()
            .collect();

        state.records = Vec::with_capacity(fetched.len() + optimistic.len());
        for record in fetched {
            state.upsert(record);
        }
        for record in optimistic {
            if state.position(record.id).is_some() {
                debug!(user_id = record.id, "server list claims optimistic id");
                state.release_claimed(record.id);
            } else {
                state.records.push(record);
            }
        }

        debug!(count = state.records.len(), "directory refreshed");
        Ok(state.records.clone())
    }

    /// Adds a user.
    ///
    /// The new entry appears immediately with id `max(existing) + 1`. When the
    /// server answers, its record replaces the optimistic one, including the id
    /// it assigned. When the server refuses, the entry is removed again.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when the draft fails validation
    /// - `Unauthorized` when there is no session or the server rejected it
    /// - `Rejected` / `NetworkFailure` when the server refused or was unreachable
    /// - `Cancelled` when the store was torn down
    pub async fn create(&self, draft: UserDraft) -> Result<UserRecord, DirectoryError> {
        self.ensure_live()?;
        let user = draft.verify()?;
        let token = self.bearer()?;

        let (provisional_id, ticket, _in_flight) = {
            let mut state = self.state.lock();
            let id = state.next_id();
            state.records.push(UserRecord {
                id,
                username: user.username.clone(),
                email: user.email.clone(),
                role: user.role,
                created_at: Utc::now(),
            });
            let ticket = state.issue_ticket(id);
            (id, ticket, InFlight::new(&self.state, Mark::Create(ticket)))
        };
        debug!(user_id = provisional_id, username = %user.username, "optimistic create");

        let outcome = self
            .round_trip(self.transport.create_user(&token, &user))
            .await?;

        let created = match outcome {
            Ok(created) => created,
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    if let Some(local) = state.pending.remove(&ticket) {
                        state.records.retain(|r| r.id != local);
                    }
                }
                warn!(user_id = provisional_id, error = %e, "create rolled back");
                return Err(self.transport_failure(e, &token, None));
            }
        };

        {
            let mut state = self.state.lock();
            let slot = state
                .pending
                .remove(&ticket)
                .and_then(|local| state.position(local));

            let index = match slot {
                Some(index) => {
                    state.records[index] = created.clone();
                    index
                }
                None => {
                    state.upsert(created.clone());
                    state.position(created.id).unwrap_or_default()
                }
            };

            if created.id != provisional_id {
                warn!(
                    provisional = provisional_id,
                    assigned = created.id,
                    "server assigned a different id"
                );
            }
            // Any other entry holding the assigned id is stale, and an
            // overlapping create that displayed it must not touch it again.
            let mut position = 0;
            state.records.retain(|r| {
                let keep = r.id != created.id || position == index;
                position += 1;
                keep
            });
            state.release_claimed(created.id);
        }

        info!(user_id = created.id, username = %created.username, "user created");
        Ok(created)
    }

    /// Changes fields of an existing user.
    ///
    /// An empty patch returns the current record without contacting the server.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the id is not in the snapshot
    /// - `Busy` when another mutation on the id is in flight
    /// - `InvalidInput` when a field fails validation
    /// - any transport failure, after the pre-patch record was restored
    pub async fn update(&self, id: UserId, patch: UserPatch) -> Result<UserRecord, DirectoryError> {
        self.ensure_live()?;
        let changes = patch.verify()?;
        let token = self.bearer()?;

        let (previous, _in_flight) = {
            let mut state = self.state.lock();
            if state.busy(id) {
                return Err(DirectoryError::Busy(id));
            }
            let index = state.position(id).ok_or(NotFoundError { id })?;
            let previous = state.records[index].clone();
            if changes.is_empty() {
                return Ok(previous);
            }
            state.records[index] = changes.apply_to(&previous);
            state.in_flight.insert(id);
            (previous, InFlight::new(&self.state, Mark::Id(id)))
        };

        let outcome = self
            .round_trip(self.transport.update_user(&token, id, &changes))
            .await?;

        match outcome {
            Ok(updated) => {
                self.state.lock().upsert(updated.clone());
                info!(user_id = id, "user updated");
                Ok(updated)
            }
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    if let Some(index) = state.position(id) {
                        state.records[index] = previous;
                    }
                }
                warn!(user_id = id, error = %e, "update rolled back");
                Err(self.transport_failure(e, &token, Some(id)))
            }
        }
    }

    /// Removes a user.
    ///
    /// The entry disappears immediately. If the server fails, it is put back at
    /// its former position. If the server reports the user gone already, the
    /// entry stays removed and `NotFound` is returned.
    pub async fn delete(&self, id: UserId) -> Result<(), DirectoryError> {
        self.ensure_live()?;
        let token = self.bearer()?;

        let (index, removed, _in_flight) = {
            let mut state = self.state.lock();
            if state.busy(id) {
                return Err(DirectoryError::Busy(id));
            }
            let index = state.position(id).ok_or(NotFoundError { id })?;
            let removed = state.records.remove(index);
            state.in_flight.insert(id);
            (index, removed, InFlight::new(&self.state, Mark::Id(id)))
        };

        let outcome = self
            .round_trip(self.transport.delete_user(&token, id))
            .await?;

        match outcome {
            Ok(()) => {
                self.state.lock().records.retain(|r| r.id != id);
                info!(user_id = id, "user deleted");
                Ok(())
            }
            Err(TransportError::NotFound) => {
                self.state.lock().records.retain(|r| r.id != id);
                warn!(user_id = id, "user was already gone on the server");
                Err(NotFoundError { id }.into())
            }
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    if state.position(id).is_none() {
                        let at = index.min(state.records.len());
                        state.records.insert(at, removed);
                    }
                }
                warn!(user_id = id, error = %e, "delete rolled back");
                Err(self.transport_failure(e, &token, Some(id)))
            }
        }
    }

    /// Server-side user counts for the dashboard.
    pub async fn stats(&self) -> Result<DashboardStats, DirectoryError> {
        self.ensure_live()?;
        let token = self.bearer()?;

        self.round_trip(self.transport.dashboard_stats(&token))
            .await?
            .map_err(|e| self.transport_failure(e, &token, None))
    }

    /// User counts computed from the local snapshot.
    pub fn local_stats(&self) -> DashboardStats {
        DashboardStats::from_records(&self.state.lock().records)
    }

    /// The record with `id`, if present.
    pub fn get(&self, id: UserId) -> Option<UserRecord> {
        let state = self.state.lock();
        state.position(id).map(|i| state.records[i].clone())
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Vec<UserRecord> {
        self.state.lock().records.clone()
    }

    /// True while a mutation on `id` is in flight, including a create still
    /// showing `id` as its local id.
    pub fn is_pending(&self, id: UserId) -> bool {
        self.state.lock().busy(id)
    }

    /// Cancels the store's context. Idempotent.
    pub fn teardown(&self) {
        if !self.context.is_cancelled() {
            info!("directory torn down");
        }
        self.context.cancel();
    }

    /// True after [`teardown`](Self::teardown) or after the owning client shut down.
    pub fn is_torn_down(&self) -> bool {
        self.context.is_cancelled()
    }

    fn ensure_live(&self) -> Result<(), DirectoryError> {
        if self.context.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        Ok(())
    }

    fn bearer(&self) -> Result<Arc<Secret<String>>, DirectoryError> {
        self.session.bearer().ok_or(DirectoryError::Unauthorized)
    }

    /// Runs `call` unless the context is cancelled first.
    ///
    /// The outer error is `Cancelled`; the inner result is the transport's.
    async fn round_trip<T, F>(&self, call: F) -> Result<Result<T, TransportError>, DirectoryError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        let outcome = tokio::select! {
            biased;
            _ = self.context.cancelled() => return Err(DirectoryError::Cancelled),
            outcome = call => outcome,
        };

        if self.context.is_cancelled() {
            debug!("dropping answer that arrived after teardown");
            return Err(DirectoryError::Cancelled);
        }
        Ok(outcome)
    }

    fn transport_failure(
        &self,
        error: TransportError,
        token: &Arc<Secret<String>>,
        id: Option<UserId>,
    ) -> DirectoryError {
        match error {
            TransportError::Unauthorized(status) => {
                warn!(status, "directory request unauthorized; ending session");
                self.session.expire(token);
                DirectoryError::Unauthorized
            }
            TransportError::NotFound => match id {
                Some(id) => NotFoundError { id }.into(),
                None => DirectoryError::Rejected("not found".to_string()),
            },
            TransportError::Rejected { status, message } if message.is_empty() => {
                DirectoryError::Rejected(format!("status {status}"))
            }
            TransportError::Rejected { message, .. } => DirectoryError::Rejected(message),
            other @ (TransportError::Network(_) | TransportError::Decode(_)) => {
                DirectoryError::NetworkFailure(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Role;
    use crate::token_store::MemoryTokenStore;
    use crate::transport::{InMemoryTransport, Operation};

    async fn admin_store() -> (Arc<InMemoryTransport>, Arc<SessionManager>, Arc<UserDirectoryStore>) {
        let transport = Arc::new(InMemoryTransport::demo());
        let session = Arc::new(
            SessionManager::restore(transport.clone(), Arc::new(MemoryTokenStore::new())).unwrap(),
        );
        session.login("admin", Secret::from("admin123")).await.unwrap();
        let store = Arc::new(UserDirectoryStore::new(transport.clone(), session.clone()));
        store.list().await.unwrap();
        (transport, session, store)
    }

    fn ids(store: &UserDirectoryStore) -> Vec<UserId> {
        store.snapshot().iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn list_replaces_snapshot() {
        let (_, _, store) = admin_store().await;
        assert_eq!(ids(&store), vec![1, 2, 3]);
        assert_eq!(store.local_stats().admin_users, 1);
    }

    #[tokio::test]
    async fn create_appends_next_id() {
        let (_, _, store) = admin_store().await;

        let created = store
            .create(UserDraft::new("newbie", "new@example.com", "pw123", Role::User))
            .await
            .unwrap();

        assert_eq!(created.id, 4);
        assert_eq!(ids(&store), vec![1, 2, 3, 4]);
        assert!(!store.is_pending(4));
    }

    #[tokio::test]
    async fn create_adopts_server_id() {
        let (transport, _, store) = admin_store().await;
        transport.set_next_id(40);

        let created = store
            .create(UserDraft::new("newbie", "new@example.com", "pw123", Role::User))
            .await
            .unwrap();

        assert_eq!(created.id, 40);
        assert_eq!(ids(&store), vec![1, 2, 3, 40]);
    }

    #[tokio::test]
    async fn rejected_create_is_rolled_back() {
        let (_, _, store) = admin_store().await;

        let err = store
            .create(UserDraft::new("user1", "dup@example.com", "pw123", Role::User))
            .await
            .unwrap_err();

        assert_eq!(err, DirectoryError::Rejected("Username already exists".to_string()));
        assert_eq!(ids(&store), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn invalid_draft_never_reaches_transport() {
        let (transport, _, store) = admin_store().await;

        let err = store
            .create(UserDraft::new("x", "new@example.com", "pw123", Role::User))
            .await
            .unwrap_err();

        assert!(matches!(err, DirectoryError::InvalidInput(_)));
        assert_eq!(transport.calls(Operation::CreateUser), 0);
    }

    #[tokio::test]
    async fn update_failure_restores_previous_record() {
        let (transport, _, store) = admin_store().await;
        let before = store.get(2).unwrap();
        transport.fail_next(Operation::UpdateUser, TransportError::Network("reset".to_string()));

        let err = store
            .update(2, UserPatch::new().email("moved@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DirectoryError::NetworkFailure(_)));
        assert_eq!(store.get(2).unwrap(), before);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (transport, _, store) = admin_store().await;

        let err = store.update(99, UserPatch::new().role(Role::Admin)).await.unwrap_err();

        assert_eq!(err, DirectoryError::NotFound(NotFoundError { id: 99 }));
        assert_eq!(transport.calls(Operation::UpdateUser), 0);
    }

    #[tokio::test]
    async fn empty_patch_makes_no_call() {
        let (transport, _, store) = admin_store().await;
        let record = store.update(3, UserPatch::new()).await.unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(transport.calls(Operation::UpdateUser), 0);
    }

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let (_, _, store) = admin_store().await;

        store.delete(2).await.unwrap();
        let err = store.delete(2).await.unwrap_err();

        assert_eq!(err, DirectoryError::NotFound(NotFoundError { id: 2 }));
        assert_eq!(ids(&store), vec![1, 3]);
    }

    #[tokio::test]
    async fn failed_delete_reinserts_at_former_position() {
        let (transport, _, store) = admin_store().await;
        transport.fail_next(
            Operation::DeleteUser,
            TransportError::Rejected {
                status: 500,
                message: "database locked".to_string(),
            },
        );

        let err = store.delete(2).await.unwrap_err();

        assert_eq!(err, DirectoryError::Rejected("database locked".to_string()));
        assert_eq!(ids(&store), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn server_404_on_delete_keeps_entry_removed() {
        let (transport, _, store) = admin_store().await;
        transport.fail_next(Operation::DeleteUser, TransportError::NotFound);

        let err = store.delete(3).await.unwrap_err();

        assert_eq!(err, DirectoryError::NotFound(NotFoundError { id: 3 }));
        assert_eq!(ids(&store), vec![1, 2]);
    }

    #[tokio::test]
    async fn unauthorized_ends_session() {
        let (transport, session, store) = admin_store().await;
        transport.revoke_tokens();

        let err = store.list().await.unwrap_err();

        assert_eq!(err, DirectoryError::Unauthorized);
        assert!(!session.is_authenticated());
        assert_eq!(store.delete(2).await.unwrap_err(), DirectoryError::Unauthorized);
    }

    #[tokio::test]
    async fn concurrent_mutation_on_same_id_is_busy() {
        let (transport, _, store) = admin_store().await;
        let hold = transport.hold().await;

        let pending = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(2, UserPatch::new().email("busy@example.com"))
                    .await
            })
        };
        while !store.is_pending(2) {
            tokio::task::yield_now().await;
        }

        assert_eq!(store.delete(2).await.unwrap_err(), DirectoryError::Busy(2));
        assert_eq!(store.get(2).unwrap().email, "busy@example.com");

        drop(hold);
        pending.await.unwrap().unwrap();
        assert!(!store.is_pending(2));
        assert_eq!(transport.calls(Operation::DeleteUser), 0);
    }

    #[tokio::test]
    async fn teardown_discards_late_answers() {
        let (transport, _, store) = admin_store().await;
        let hold = transport.hold().await;

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.delete(3).await })
        };
        while !store.is_pending(3) {
            tokio::task::yield_now().await;
        }

        store.teardown();
        drop(hold);

        assert_eq!(pending.await.unwrap(), Err(DirectoryError::Cancelled));
        assert_eq!(ids(&store), vec![1, 2]);
        assert_eq!(store.list().await.unwrap_err(), DirectoryError::Cancelled);
    }

    fn server_view(transport: &InMemoryTransport) -> Vec<(UserId, String)> {
        let mut users: Vec<_> = transport
            .users()
            .into_iter()
            .map(|r| (r.id, r.username))
            .collect();
        users.sort();
        users
    }

    fn local_view(store: &UserDirectoryStore) -> Vec<(UserId, String)> {
        let mut users: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|r| (r.id, r.username))
            .collect();
        users.sort();
        users
    }

    async fn start_create(
        store: &Arc<UserDirectoryStore>,
        username: &str,
        local_id: UserId,
    ) -> tokio::task::JoinHandle<Result<UserRecord, DirectoryError>> {
        let draft = UserDraft::new(username, format!("{username}@example.com"), "pw123", Role::User);
        let handle = {
            let store = store.clone();
            tokio::spawn(async move { store.create(draft).await })
        };
        while !store.is_pending(local_id) {
            tokio::task::yield_now().await;
        }
        handle
    }

    #[tokio::test]
    async fn overlapping_creates_with_shifted_server_ids() {
        let (transport, _, store) = admin_store().await;
        transport.set_next_id(5);
        let hold = transport.hold().await;

        let alpha = start_create(&store, "alpha", 4).await;
        let bravo = start_create(&store, "bravo", 5).await;
        assert_eq!(ids(&store), vec![1, 2, 3, 4, 5]);

        drop(hold);
        let alpha = alpha.await.unwrap().unwrap();
        let bravo = bravo.await.unwrap().unwrap();

        let mut assigned = vec![alpha.id, bravo.id];
        assigned.sort();
        assert_eq!(assigned, vec![5, 6]);
        assert_eq!(local_view(&store), server_view(&transport));
        assert!(!store.is_pending(5));
        assert!(!store.is_pending(6));
    }

    #[tokio::test]
    async fn refused_sibling_create_keeps_committed_record() {
        let (transport, _, store) = admin_store().await;
        transport.set_next_id(5);
        let hold = transport.hold().await;

        let alpha = start_create(&store, "alpha", 4).await;
        let duplicate = start_create(&store, "user1", 5).await;

        drop(hold);
        let alpha = alpha.await.unwrap().unwrap();
        let err = duplicate.await.unwrap().unwrap_err();

        assert_eq!(err, DirectoryError::Rejected("Username already exists".to_string()));
        assert_eq!(alpha.id, 5);
        assert_eq!(store.get(5).unwrap().username, "alpha");
        assert_eq!(local_view(&store), server_view(&transport));
    }

    #[tokio::test]
    async fn stats_come_from_server() {
        let (_, _, store) = admin_store().await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats, store.local_stats());
    }
}
