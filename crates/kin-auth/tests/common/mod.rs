//! Fakes and helpers shared by the kin-auth integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use kin_auth::{
    AuthError, Collaborators, Credential, CurrentUserClient, ExchangeClient, ExchangeGrant,
    IdentityAdapter, IdentityEvent, InvalidationBus, MemorySlot, QueryCache, SessionManager,
    Token, TokenSlot,
};
use kin_config::SessionConfig;
use kin_core::UserProfile;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};

/// Unsigned JWT expiring `offset_secs` from now.
pub fn jwt(offset_secs: i64) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    format!(
        "{}.{}.{}",
        engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        engine.encode(format!(r#"{{"sub":"u_1","exp":{exp}}}"#)),
        engine.encode("sig")
    )
}

pub fn profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.into(),
        display_name: Some(format!("User {id}")),
        email: None,
        avatar_url: None,
        token_balance: 0,
        created_at: None,
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

pub struct FakeIdentity {
    events: broadcast::Sender<IdentityEvent>,
    credential: Mutex<Option<Credential>>,
    sign_outs: AtomicUsize,
    fail_sign_out: AtomicBool,
    first_lookup_delay: Mutex<Option<Duration>>,
}

impl FakeIdentity {
    pub fn signed_in() -> Arc<Self> {
        let identity = Self::signed_out();
        identity.set_credential(Some(Credential::new("provider-id-token")));
        identity
    }

    pub fn signed_out() -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self {
            events,
            credential: Mutex::new(None),
            sign_outs: AtomicUsize::new(0),
            fail_sign_out: AtomicBool::new(false),
            first_lookup_delay: Mutex::new(None),
        })
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        *self.credential.lock() = credential;
    }

    pub fn emit(&self, event: IdentityEvent) {
        let _ = self.events.send(event);
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    /// Delay only the next `raw_credential()` lookup.
    pub fn slow_first_lookup(&self, delay: Duration) {
        *self.first_lookup_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl IdentityAdapter for FakeIdentity {
    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    async fn raw_credential(&self) -> Result<Option<Credential>, AuthError> {
        let delay = self.first_lookup_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.credential.lock().clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock() = None;
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::IdentityProvider("provider offline".into()));
        }
        Ok(())
    }
}

/// Exchange endpoint with scripted responses, optional latency and an
/// optional gate holding the first call until released.
pub struct FakeExchange {
    calls: AtomicUsize,
    default_token: Mutex<String>,
    scripted: Mutex<VecDeque<Result<ExchangeGrant, AuthError>>>,
    latency: Mutex<Duration>,
    gate_first: AtomicBool,
    gate: Notify,
    started: Notify,
}

impl FakeExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            default_token: Mutex::new(jwt(3600)),
            scripted: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            gate_first: AtomicBool::new(false),
            gate: Notify::new(),
            started: Notify::new(),
        })
    }

    pub fn returning(&self, token: &str) {
        *self.default_token.lock() = token.to_string();
    }

    pub fn then(&self, response: Result<ExchangeGrant, AuthError>) {
        self.scripted.lock().push_back(response);
    }

    pub fn with_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn hold_first_call(&self) {
        self.gate_first.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Resolves once an exchange call has begun.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn exchange(&self, _credential: &Credential) -> Result<ExchangeGrant, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if self.gate_first.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let scripted = self.scripted.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(ExchangeGrant::new(self.default_token.lock().clone())))
    }
}

pub struct FakeUsers {
    calls: AtomicUsize,
    response: Mutex<Result<UserProfile, AuthError>>,
}

impl FakeUsers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Ok(profile("u_1"))),
        })
    }

    pub fn respond(&self, response: Result<UserProfile, AuthError>) {
        *self.response.lock() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CurrentUserClient for FakeUsers {
    async fn fetch(&self, _token: &Token) -> Result<UserProfile, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.lock().clone()
    }
}

#[derive(Default)]
pub struct CountingCache {
    invalidations: AtomicUsize,
}

impl CountingCache {
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl QueryCache for CountingCache {
    fn invalidate_all(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Slot whose every operation fails.
pub struct UnavailableSlot;

impl TokenSlot for UnavailableSlot {
    fn read(&self) -> Result<Option<String>, AuthError> {
        Err(AuthError::StorageUnavailable("storage disabled".into()))
    }
    fn write(&self, _token: &str) -> Result<(), AuthError> {
        Err(AuthError::StorageUnavailable("quota exceeded".into()))
    }
    fn remove(&self) -> Result<(), AuthError> {
        Err(AuthError::StorageUnavailable("storage disabled".into()))
    }
    fn kind(&self) -> &'static str {
        "unavailable"
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub identity: Arc<FakeIdentity>,
    pub exchange: Arc<FakeExchange>,
    pub users: Arc<FakeUsers>,
    pub cache: Arc<CountingCache>,
    pub slot: MemorySlot,
    pub bus: InvalidationBus,
}

impl Harness {
    pub fn new(identity: Arc<FakeIdentity>, slot: MemorySlot) -> Self {
        let exchange = FakeExchange::new();
        let users = FakeUsers::new();
        let cache = Arc::new(CountingCache::default());
        let bus = InvalidationBus::new();
        let manager = SessionManager::new(
            Collaborators {
                identity: identity.clone(),
                exchange: exchange.clone(),
                users: users.clone(),
                cache: cache.clone(),
            },
            Box::new(slot.clone()),
            bus.clone(),
            &SessionConfig::default(),
        );
        Self {
            manager,
            identity,
            exchange,
            users,
            cache,
            slot,
            bus,
        }
    }

    /// Signed-in identity, empty storage.
    pub fn signed_in() -> Self {
        Self::new(FakeIdentity::signed_in(), MemorySlot::default())
    }

    /// Signed-in identity with an established backend session.
    pub async fn authenticated() -> Self {
        let harness = Self::signed_in();
        harness.manager.initialize().await;
        harness
            .manager
            .login(Credential::new("provider-id-token"))
            .await
            .expect("login")
            .expect("token");
        harness
    }
}
