//! Concurrent token requests share one exchange.

mod common;

use std::time::Duration;

use common::{Harness, jwt};
use kin_auth::{AuthError, Credential, ExchangeGrant, MemorySlot, Token, TokenStore};
use kin_core::SessionState;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn concurrent_callers_trigger_one_exchange() {
    let harness = Harness::signed_in();
    harness.exchange.with_latency(Duration::from_millis(50));
    let token = jwt(3600);
    harness.exchange.returning(&token);

    let mut callers = Vec::new();
    for _ in 0..8 {
        let manager = harness.manager.clone();
        callers.push(tokio::spawn(async move { manager.get_valid_token().await }));
    }

    for caller in callers {
        let resolved = caller.await.expect("join").expect("token").expect("present");
        assert_eq!(resolved.as_str(), token);
    }
    assert_eq!(harness.exchange.calls(), 1);
    assert!(!harness.manager.is_exchanging());
    assert_eq!(harness.manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn two_simultaneous_calls_resolve_with_same_token() {
    let harness = Harness::signed_in();
    harness.exchange.with_latency(Duration::from_millis(100));
    harness.exchange.returning("abc123");

    let (first, second) = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(
            harness.manager.get_valid_token(),
            harness.manager.get_valid_token()
        )
    })
    .await
    .expect("both resolve well within a second");

    let first = first.expect("ok").expect("token");
    let second = second.expect("ok").expect("token");
    assert_eq!(first.as_str(), "abc123");
    assert_eq!(second.as_str(), "abc123");
    assert_eq!(harness.exchange.calls(), 1);
}

#[tokio::test]
async fn slow_credential_lookup_reuses_token_from_finished_exchange() {
    let harness = Harness::signed_in();
    harness.identity.slow_first_lookup(Duration::from_millis(80));

    let (slow, fast) = tokio::join!(
        harness.manager.get_valid_token(),
        harness.manager.get_valid_token()
    );

    let slow = slow.expect("ok").expect("token");
    let fast = fast.expect("ok").expect("token");
    assert_eq!(slow, fast);
    assert_eq!(harness.exchange.calls(), 1);
    assert_eq!(harness.slot.peek().as_deref(), Some(fast.as_str()));
}

#[tokio::test]
async fn login_joining_refresh_refetches_profile() {
    let harness = Harness::authenticated().await;
    assert_eq!(harness.users.calls(), 1);
    harness.exchange.hold_first_call();

    let manager = harness.manager.clone();
    let refresh = tokio::spawn(async move { manager.refresh().await });
    harness.exchange.started().await;
    harness.users.respond(Ok(common::profile("u_2")));

    let (login, ()) = tokio::join!(
        harness.manager.login(Credential::new("provider-id-token")),
        async { harness.exchange.release() }
    );

    assert!(login.expect("ok").is_some());
    assert!(refresh.await.expect("join").expect("ok").is_some());
    assert_eq!(harness.exchange.calls(), 2, "login joined the refresh");
    assert_eq!(harness.users.calls(), 2);
    assert_eq!(harness.manager.user().map(|u| u.id).as_deref(), Some("u_2"));
}

#[tokio::test]
async fn valid_held_token_needs_no_exchange() {
    let harness = Harness::authenticated().await;
    assert_eq!(harness.exchange.calls(), 1);

    let held = harness.manager.get_valid_token().await.expect("ok");
    assert!(held.is_some());
    assert_eq!(harness.exchange.calls(), 1);
}

#[tokio::test]
async fn expired_persisted_token_refreshes_once() {
    let stale = jwt(-60);
    assert!(!TokenStore::is_valid(&Token::new(stale.clone()), 0));

    let harness = Harness::new(common::FakeIdentity::signed_in(), MemorySlot::with_token(&stale));
    assert_eq!(harness.manager.initialize().await, SessionState::Anonymous);

    let (a, b) = tokio::join!(
        harness.manager.get_valid_token(),
        harness.manager.get_valid_token()
    );
    assert!(a.expect("ok").is_some());
    assert!(b.expect("ok").is_some());
    assert_eq!(harness.exchange.calls(), 1);
    assert_ne!(harness.slot.peek(), Some(stale));
}

#[tokio::test]
async fn no_credential_resolves_absent_without_exchange() {
    let harness = Harness::new(common::FakeIdentity::signed_out(), MemorySlot::default());
    let token = harness.manager.get_valid_token().await.expect("ok");
    assert!(token.is_none());
    assert_eq!(harness.exchange.calls(), 0);
}

#[tokio::test]
async fn network_failure_is_retried_by_next_caller() {
    let harness = Harness::signed_in();
    harness
        .exchange
        .then(Err(AuthError::Network("connection reset".into())));

    let err = harness.manager.get_valid_token().await.unwrap_err();
    assert!(err.is_transient());
    assert!(!harness.manager.is_exchanging(), "slot cleared on failure");
    assert_eq!(harness.manager.state(), SessionState::Anonymous);
    assert_eq!(harness.identity.sign_outs(), 0);

    let token = harness.manager.get_valid_token().await.expect("retry succeeds");
    assert!(token.is_some());
    assert_eq!(harness.exchange.calls(), 2);
}

#[tokio::test]
async fn joined_callers_all_see_the_same_failure() {
    let harness = Harness::signed_in();
    harness.exchange.with_latency(Duration::from_millis(20));
    harness
        .exchange
        .then(Err(AuthError::Network("gateway timeout".into())));

    let (a, b, c) = tokio::join!(
        harness.manager.get_valid_token(),
        harness.manager.get_valid_token(),
        harness.manager.get_valid_token()
    );
    for result in [a, b, c] {
        assert!(matches!(result, Err(AuthError::Network(_))));
    }
    assert_eq!(harness.exchange.calls(), 1);
}

#[tokio::test]
async fn rejected_exchange_forces_logout() {
    let harness = Harness::authenticated().await;
    harness.exchange.then(Err(AuthError::ExchangeRejected(
        "credential revoked".into(),
    )));

    let err = harness.manager.refresh().await.unwrap_err();
    assert!(err.forces_logout());

    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.state, SessionState::Anonymous);
    assert!(snapshot.token.is_none());
    assert!(snapshot.reauth_required);
    assert!(harness.slot.peek().is_none());
    assert_eq!(harness.cache.invalidations(), 1);
    common::eventually("provider sign-out", || harness.identity.sign_outs() == 1).await;
}

#[tokio::test]
async fn grant_profile_skips_current_user_fetch() {
    let harness = Harness::signed_in();
    harness
        .exchange
        .then(Ok(ExchangeGrant::new(jwt(3600)).with_user(common::profile("u_9"))));

    harness.manager.get_valid_token().await.expect("ok");
    assert_eq!(harness.users.calls(), 0);
    assert_eq!(harness.manager.user().map(|u| u.id).as_deref(), Some("u_9"));
}

#[tokio::test]
async fn refresh_keeps_user_without_refetch() {
    let harness = Harness::authenticated().await;
    assert_eq!(harness.users.calls(), 1);
    let before = harness.manager.token().expect("token");

    let fresh = jwt(7200);
    harness.exchange.returning(&fresh);
    let after = harness.manager.refresh().await.expect("ok").expect("token");

    assert_ne!(before, after);
    assert_eq!(after.as_str(), fresh);
    assert_eq!(harness.users.calls(), 1, "profile kept on refresh");
    assert!(harness.manager.user().is_some());
}
