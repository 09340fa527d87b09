//! Property tests for access decisions, session lifecycle and the directory
//! snapshot staying in step with the server.

use std::collections::BTreeSet;
use std::sync::Arc;

use console_access::{
    decide, ClientConfig, ConsoleClient, Decision, InMemoryTransport, MemoryTokenStore,
    Principal, Role, Secret, UserDirectoryStore, UserDraft, UserId,
};
use proptest::prelude::*;

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Admin), Just(Role::User)]
}

fn arb_principal() -> impl Strategy<Value = Principal> {
    (
        1u64..10_000,
        prop::string::string_regex("[a-z0-9_]{3,12}").unwrap(),
        arb_role(),
    )
        .prop_map(|(id, username, role)| Principal::new(id, username, role))
}

#[derive(Debug, Clone)]
enum Step {
    Create(Role),
    /// Two creates submitted while the server is paused; the second one
    /// reuses an existing username when `duplicate` is set.
    CreatePair { duplicate: bool },
    Delete(UserId),
    /// Moves the server's id counter ahead of what the client expects.
    SkipIds(u64),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        arb_role().prop_map(Step::Create),
        any::<bool>().prop_map(|duplicate| Step::CreatePair { duplicate }),
        (1u64..12).prop_map(Step::Delete),
        (0u64..3).prop_map(Step::SkipIds),
    ]
}

fn draft(name: &str, role: Role) -> UserDraft {
    UserDraft::new(name, format!("{name}@example.com"), "pw", role)
}

fn local_view(directory: &UserDirectoryStore) -> BTreeSet<(UserId, String)> {
    directory
        .snapshot()
        .into_iter()
        .map(|r| (r.id, r.username))
        .collect()
}

fn server_view(transport: &InMemoryTransport) -> BTreeSet<(UserId, String)> {
    transport
        .users()
        .into_iter()
        .map(|r| (r.id, r.username))
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Property: the guard follows its truth table for every principal and requirement
    #[test]
    fn proptest_guard_truth_table(
        principal in prop::option::of(arb_principal()),
        required in prop::option::of(arb_role()),
    ) {
        let decision = decide(principal.as_ref(), required);

        let expected = match (&principal, required) {
            (None, _) => Decision::RedirectToLogin,
            (Some(p), Some(role)) if p.role != role => Decision::RedirectToHome,
            _ => Decision::Allow,
        };
        prop_assert_eq!(decision, expected);
    }

    /// Property: without a session nothing is ever allowed
    #[test]
    fn proptest_no_session_never_allows(required in prop::option::of(arb_role())) {
        prop_assert_eq!(decide(None, required), Decision::RedirectToLogin);
    }

    /// Property: logout is idempotent, whatever happened before
    #[test]
    fn proptest_logout_idempotent(logged_in in any::<bool>(), repeats in 1usize..4) {
        runtime().block_on(async {
            let client = ConsoleClient::with_parts(
                ClientConfig::default(),
                Arc::new(InMemoryTransport::demo()),
                Arc::new(MemoryTokenStore::new()),
            )
            .unwrap();
            if logged_in {
                client.session().login("admin", Secret::from("admin123")).await.unwrap();
            }

            for _ in 0..repeats {
                client.session().logout();
                assert!(client.session().current_principal().is_none());
            }
            assert_eq!(client.guard().evaluate(None), Decision::RedirectToLogin);
        });
    }

    /// Property: after every step the snapshot holds exactly the server's users,
    /// with pairwise distinct ids, even when creates overlap and the server
    /// assigns ids the client did not expect
    #[test]
    fn proptest_directory_matches_server(steps in prop::collection::vec(arb_step(), 1..20)) {
        runtime().block_on(async {
            let transport = Arc::new(InMemoryTransport::demo());
            let client = ConsoleClient::with_parts(
                ClientConfig::default(),
                transport.clone(),
                Arc::new(MemoryTokenStore::new()),
            )
            .unwrap();
            client.session().login("admin", Secret::from("admin123")).await.unwrap();
            let directory = client.open_directory();
            directory.list().await.unwrap();

            for (n, step) in steps.into_iter().enumerate() {
                match step {
                    Step::Create(role) => {
                        directory.create(draft(&format!("member{n}"), role)).await.unwrap();
                    }
                    Step::CreatePair { duplicate } => {
                        let first = format!("pair{n}a");
                        let second = if duplicate { "user1".to_string() } else { format!("pair{n}b") };
                        let expected = directory.snapshot().len() + 2;
                        let hold = transport.hold().await;

                        let directory = &directory;
                        let release = async move {
                            while directory.snapshot().len() < expected {
                                tokio::task::yield_now().await;
                            }
                            drop(hold);
                        };
                        let (a, _, _) = tokio::join!(
                            directory.create(draft(&first, Role::User)),
                            directory.create(draft(&second, Role::User)),
                            release,
                        );
                        a.unwrap();
                    }
                    Step::Delete(id) => {
                        // Deleting the admin would revoke the session.
                        if id != 1 {
                            let _ = directory.delete(id).await;
                        }
                    }
                    Step::SkipIds(gap) => {
                        let max = transport.users().iter().map(|r| r.id).max().unwrap_or(0);
                        transport.set_next_id(max + 1 + gap);
                    }
                }

                let snapshot = directory.snapshot();
                let ids: BTreeSet<UserId> = snapshot.iter().map(|r| r.id).collect();
                assert_eq!(ids.len(), snapshot.len());
                assert_eq!(local_view(&directory), server_view(&transport));
            }
        });
    }
}
