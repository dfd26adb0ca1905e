//! Session lifecycle orchestration.
//!
//! [`SessionManager`] owns the [`TokenStore`] and the in-flight exchange slot,
//! reacts to identity-provider events and invalidation-bus messages, and
//! publishes a [`SessionSnapshot`] after every transition.
//!
//! State is only mutated in short synchronous sections on either side of an
//! await. A generation counter is bumped on every teardown; work that started
//! under an older generation never writes its result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt as _;
use kin_config::{KindredConfig, SessionConfig};
use kin_core::{InvalidationReason, SessionState, UserProfile};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::QueryCache;
use crate::consumer::SessionSnapshot;
use crate::error::AuthError;
use crate::exchange::{CurrentUserClient, ExchangeClient};
use crate::http::{HttpCurrentUserClient, HttpExchangeClient};
use crate::identity::{Credential, IdentityAdapter, IdentityEvent};
use crate::invalidation::InvalidationBus;
use crate::single_flight::InFlightSlot;
use crate::slot::{TokenSlot, slot_from_config};
use crate::token::Token;
use crate::token_store::TokenStore;

type ExchangeOutcome = Result<Option<Token>, AuthError>;

/// How a caller wants an exchange to behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeMode {
    /// Reuse a valid held token; keep the current profile.
    Lazy,
    /// Exchange even if the held token is valid; keep the current profile.
    Forced,
    /// Exchange even if the held token is valid and refetch the profile.
    Login,
}

/// External collaborators the manager depends on.
pub struct Collaborators {
    pub identity: Arc<dyn IdentityAdapter>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub users: Arc<dyn CurrentUserClient>,
    pub cache: Arc<dyn QueryCache>,
}

struct SessionCore {
    state: SessionState,
    store: TokenStore,
    user: Option<UserProfile>,
    generation: u64,
    in_flight: InFlightSlot<ExchangeOutcome>,
    reauth_required: bool,
    last_invalidation: Option<InvalidationReason>,
}

struct SessionInner {
    collaborators: Collaborators,
    bus: InvalidationBus,
    skew_secs: i64,
    restore_on_start: bool,
    core: Mutex<SessionCore>,
    snapshots: watch::Sender<SessionSnapshot>,
    listening: AtomicBool,
}

/// The session orchestrator. Cheap to clone; clones share one session.
///
/// Construct one per running application and pass it to the components that
/// need it.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        slot: Box<dyn TokenSlot>,
        bus: InvalidationBus,
        config: &SessionConfig,
    ) -> Self {
        let store = TokenStore::new(slot);
        let (snapshots, _) = watch::channel(SessionSnapshot {
            persistent: store.is_persistent(),
            ..SessionSnapshot::default()
        });
        Self {
            inner: Arc::new(SessionInner {
                collaborators,
                bus,
                skew_secs: config.expiry_skew_secs,
                restore_on_start: config.restore_on_start,
                core: Mutex::new(SessionCore {
                    state: SessionState::Uninitialized,
                    store,
                    user: None,
                    generation: 0,
                    in_flight: InFlightSlot::new(),
                    reauth_required: false,
                    last_invalidation: None,
                }),
                snapshots,
                listening: AtomicBool::new(false),
            }),
        }
    }

    /// Build a manager backed by the HTTP collaborators and the configured
    /// storage slot.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Other` if the API section is not configured or the
    /// HTTP clients cannot be built.
    pub fn from_config(
        identity: Arc<dyn IdentityAdapter>,
        cache: Arc<dyn QueryCache>,
        bus: InvalidationBus,
        config: &KindredConfig,
    ) -> Result<Self, AuthError> {
        let api = config
            .require_api()
            .map_err(|e| AuthError::Other(e.to_string()))?;
        let collaborators = Collaborators {
            identity,
            exchange: Arc::new(HttpExchangeClient::new(api)?),
            users: Arc::new(HttpCurrentUserClient::new(api)?),
            cache,
        };
        Ok(Self::new(
            collaborators,
            slot_from_config(&config.storage),
            bus,
            &config.session,
        ))
    }

    /// Restore a persisted session on application start.
    ///
    /// A valid persisted token is confirmed against the current-user endpoint;
    /// any failure discards it. Calling this more than once is a no-op.
    pub async fn initialize(&self) -> SessionState {
        let inner = &self.inner;
        let (token, generation) = {
            let mut core = inner.core.lock();
            if core.state != SessionState::Uninitialized {
                return core.state;
            }
            inner.transition(&mut core, SessionState::Restoring);
            if !inner.restore_on_start {
                inner.transition(&mut core, SessionState::Anonymous);
                return core.state;
            }
            let restored = core.store.restore().cloned();
            match restored {
                Some(token) if token.is_valid(inner.skew_secs) => (token, core.generation),
                Some(token) => {
                    tracing::debug!(expires_at = ?token.expires_at(), "persisted token expired; discarding");
                    core.store.clear();
                    inner.transition(&mut core, SessionState::Anonymous);
                    return core.state;
                }
                None => {
                    inner.transition(&mut core, SessionState::Anonymous);
                    return core.state;
                }
            }
        };

        let fetched = inner.collaborators.users.fetch(&token).await;

        let mut core = inner.core.lock();
        if core.generation != generation || core.store.get() != Some(&token) {
            tracing::debug!("session changed while restoring; keeping newer state");
            return core.state;
        }
        match fetched {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "session restored");
                core.user = Some(user);
                inner.transition(&mut core, SessionState::Authenticated);
                SessionState::Authenticated
            }
            Err(error) if error.forces_logout() => {
                inner.teardown_locked(&mut core, &InvalidationReason::Unauthorized);
                drop(core);
                tracing::warn!(%error, "persisted token rejected; session discarded");
                inner.after_teardown(true);
                SessionState::Anonymous
            }
            Err(error) => {
                tracing::warn!(%error, "persisted token could not be confirmed; discarding");
                core.generation += 1;
                core.store.clear();
                inner.transition(&mut core, SessionState::Anonymous);
                SessionState::Anonymous
            }
        }
    }

    /// The accessor used by the data-fetch layer.
    ///
    /// Resolves immediately with a valid held token. Otherwise, if the identity
    /// provider has a credential, joins or starts the single exchange. `Ok(None)`
    /// when no identity is signed in.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure. Rejections have already ended the
    /// session by the time the error is returned.
    pub async fn get_valid_token(&self) -> Result<Option<Token>, AuthError> {
        let inner = &self.inner;
        let (pending, generation) = {
            let core = inner.core.lock();
            if let Some(token) = core.store.get().filter(|t| t.is_valid(inner.skew_secs)) {
                return Ok(Some(token.clone()));
            }
            (core.in_flight.current(), core.generation)
        };
        if let Some(flight) = pending {
            return flight.await;
        }

        let Some(credential) = inner.collaborators.identity.raw_credential().await? else {
            tracing::debug!("no identity credential; staying anonymous");
            return Ok(None);
        };
        inner.exchange(credential, generation, ExchangeMode::Lazy).await
    }

    /// The identity provider reports a signed-in identity.
    ///
    /// No exchange happens if a valid backend token is already held.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_valid_token`].
    pub async fn on_identity_credential_available(
        &self,
        credential: Credential,
    ) -> Result<Option<Token>, AuthError> {
        let generation = {
            let core = self.inner.core.lock();
            if let Some(token) = core
                .store
                .get()
                .filter(|t| t.is_valid(self.inner.skew_secs))
            {
                return Ok(Some(token.clone()));
            }
            core.generation
        };
        self.inner
            .exchange(credential, generation, ExchangeMode::Lazy)
            .await
    }

    /// The identity provider reports signed-out.
    ///
    /// A held backend session is inconsistent with that and is ended. The
    /// provider is not asked to sign out again.
    pub fn on_identity_signed_out(&self) {
        let active = {
            let core = self.inner.core.lock();
            core.store.get().is_some() || core.in_flight.is_occupied()
        };
        if active {
            tracing::warn!("identity provider signed out while a backend session is held");
            self.inner
                .teardown(&InvalidationReason::UserRequested, false);
        }
    }

    /// Explicit sign-in completion from the UI. Always exchanges (or joins the
    /// pending exchange) and refetches the profile. A login that joins an
    /// exchange started elsewhere refetches the profile once that exchange
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_valid_token`].
    pub async fn login(&self, credential: Credential) -> Result<Option<Token>, AuthError> {
        let generation = self.inner.core.lock().generation;
        tracing::info!("login requested");
        self.inner
            .exchange(credential, generation, ExchangeMode::Login)
            .await
    }

    /// Exchange again even if the held token is still valid.
    ///
    /// # Errors
    ///
    /// `AuthError::CredentialUnavailable` when no identity is signed in, or the
    /// exchange failure.
    pub async fn refresh(&self) -> Result<Option<Token>, AuthError> {
        let inner = &self.inner;
        let (pending, generation) = {
            let core = inner.core.lock();
            (core.in_flight.current(), core.generation)
        };
        if let Some(flight) = pending {
            return flight.await;
        }
        let credential = inner
            .collaborators
            .identity
            .raw_credential()
            .await?
            .ok_or(AuthError::CredentialUnavailable)?;
        inner
            .exchange(credential, generation, ExchangeMode::Forced)
            .await
    }

    /// Refetch the profile for the held token.
    ///
    /// `Ok(None)` when no token is held or the session changed meanwhile.
    ///
    /// # Errors
    ///
    /// `AuthError::Unauthorized` (after ending the session) or transport errors.
    pub async fn refetch_user(&self) -> Result<Option<UserProfile>, AuthError> {
        self.inner.refetch_user().await
    }

    /// End the session.
    ///
    /// Local state is cleared before this returns; the identity-provider
    /// sign-out runs in the background and its failure is only logged.
    /// Idempotent.
    pub fn logout(&self) {
        tracing::info!("logout requested");
        self.inner
            .teardown(&InvalidationReason::UserRequested, true);
    }

    /// Tear the session down in response to an invalidation.
    pub fn handle_invalidation(&self, reason: InvalidationReason) {
        tracing::info!(%reason, "session invalidated");
        self.inner.teardown(&reason, true);
    }

    /// Start the identity-event and invalidation-bus handlers.
    ///
    /// Only one set of listeners may run per manager. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `AuthError::Other` if listeners are already running.
    pub fn spawn_listeners(&self) -> Result<ListenerGuard, AuthError> {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return Err(AuthError::Other("session listeners already running".into()));
        }

        let mut identity_events = self.inner.collaborators.identity.subscribe();
        let manager = self.clone();
        let identity_task = tokio::spawn(async move {
            loop {
                match identity_events.recv().await {
                    Ok(IdentityEvent::SignedIn(credential)) => {
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            if let Err(error) =
                                manager.on_identity_credential_available(credential).await
                            {
                                tracing::warn!(%error, "exchange after identity sign-in failed");
                            }
                        });
                    }
                    Ok(IdentityEvent::SignedOut) => manager.on_identity_signed_out(),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "identity events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut invalidations = self.inner.bus.subscribe();
        let manager = self.clone();
        let bus_task = tokio::spawn(async move {
            loop {
                match invalidations.recv().await {
                    Ok(reason) => manager.handle_invalidation(reason),
                    // at least one invalidation was missed
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "invalidation bus lagged");
                        manager.handle_invalidation(InvalidationReason::Unauthorized);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(ListenerGuard {
            tasks: vec![identity_task, bus_task],
            inner: Arc::clone(&self.inner),
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.core.lock().state
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.inner.core.lock().user.clone()
    }

    /// The held token, valid or not.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.inner.core.lock().store.get().cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let core = self.inner.core.lock();
        self.inner.authenticated(&core)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.core.lock().state.is_loading()
    }

    /// Whether an exchange is currently outstanding.
    #[must_use]
    pub fn is_exchanging(&self) -> bool {
        self.inner.core.lock().in_flight.is_occupied()
    }

    /// `false` once token storage has failed and the session is memory-only.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.inner.core.lock().store.is_persistent()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let core = self.inner.core.lock();
        self.inner.snapshot_of(&core)
    }

    /// Observe session snapshots. A forced logout is visible on the next
    /// `changed()`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    #[must_use]
    pub fn bus(&self) -> &InvalidationBus {
        &self.inner.bus
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("SessionManager")
            .field("state", &core.state)
            .field("generation", &core.generation)
            .field("store", &core.store)
            .field("exchanging", &core.in_flight.is_occupied())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    /// Join the pending exchange or start one under `seen_generation`.
    ///
    /// A lazy caller gets the held token if one became valid while it was
    /// looking up its credential.
    async fn exchange(
        self: &Arc<Self>,
        credential: Credential,
        seen_generation: u64,
        mode: ExchangeMode,
    ) -> ExchangeOutcome {
        let fetch_profile = mode == ExchangeMode::Login;
        let (flight, started) = {
            let mut core = self.core.lock();
            if core.generation != seen_generation {
                tracing::debug!("session ended before the exchange started; skipping");
                return Ok(None);
            }
            if mode == ExchangeMode::Lazy
                && let Some(token) = core.store.get().filter(|t| t.is_valid(self.skew_secs))
            {
                tracing::debug!("token became valid while resolving credential");
                return Ok(Some(token.clone()));
            }
            let generation = core.generation;
            let inner = Arc::clone(self);
            let (flight, started) = core.in_flight.join_or_start(move |id| {
                inner
                    .run_exchange(id, generation, credential, fetch_profile)
                    .boxed()
            });
            if started {
                self.transition(&mut core, SessionState::Refreshing);
            } else {
                tracing::debug!("joining in-flight exchange");
            }
            (flight, started)
        };
        let outcome = flight.await;

        if fetch_profile
            && !started
            && let Ok(Some(token)) = &outcome
        {
            match self.refetch_user().await {
                Ok(_) => {}
                Err(error) if error.forces_logout() => return Err(error),
                Err(error) => {
                    tracing::warn!(%error, "profile refetch after joined login failed");
                }
            }
            tracing::debug!(expires_at = ?token.expires_at(), "joined login refetched profile");
        }
        outcome
    }

    async fn refetch_user(&self) -> Result<Option<UserProfile>, AuthError> {
        let (token, generation) = {
            let core = self.core.lock();
            let Some(token) = core.store.get().cloned() else {
                return Ok(None);
            };
            (token, core.generation)
        };

        let fetched = self.collaborators.users.fetch(&token).await;

        let mut core = self.core.lock();
        if core.generation != generation || core.store.get() != Some(&token) {
            return Ok(None);
        }
        match fetched {
            Ok(user) => {
                core.user = Some(user.clone());
                self.publish(&core);
                Ok(Some(user))
            }
            Err(error) if error.forces_logout() => {
                self.teardown_locked(&mut core, &InvalidationReason::Unauthorized);
                drop(core);
                tracing::warn!(%error, "profile refetch rejected; session ended");
                self.after_teardown(true);
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Body of one in-flight exchange. Clears its slot before any caller
    /// observes the outcome.
    async fn run_exchange(
        self: Arc<Self>,
        id: u64,
        generation: u64,
        credential: Credential,
        fetch_profile: bool,
    ) -> ExchangeOutcome {
        tracing::debug!(flight = id, generation, "exchange started");
        let result = self.exchange_for_session(&credential, fetch_profile).await;
        drop(credential);

        let mut core = self.core.lock();
        core.in_flight.settle(id);

        if core.generation != generation {
            tracing::debug!(
                flight = id,
                generation,
                current = core.generation,
                "discarding exchange result from an ended session"
            );
            return result.map(|_| None);
        }

        match result {
            Ok((token, user)) => {
                core.store.set(token.clone());
                if let Some(user) = user {
                    core.user = Some(user);
                }
                core.reauth_required = false;
                core.last_invalidation = None;
                self.transition(&mut core, SessionState::Authenticated);
                tracing::info!(expires_at = ?token.expires_at(), "session established");
                Ok(Some(token))
            }
            Err(error) if error.forces_logout() => {
                self.teardown_locked(&mut core, &InvalidationReason::Unauthorized);
                drop(core);
                tracing::warn!(%error, "exchange rejected; session ended");
                self.after_teardown(true);
                Err(error)
            }
            Err(error) => {
                self.settle(&mut core);
                tracing::warn!(%error, "exchange failed; next caller will retry");
                Err(error)
            }
        }
    }

    async fn exchange_for_session(
        &self,
        credential: &Credential,
        fetch_profile: bool,
    ) -> Result<(Token, Option<UserProfile>), AuthError> {
        let grant = self.collaborators.exchange.exchange(credential).await?;
        let token = Token::new(grant.token);
        if let (Some(reported), Some(decoded)) = (grant.expires_at, token.expires_at())
            && reported != decoded
        {
            tracing::debug!(%reported, %decoded, "backend expiry differs from token claim; using claim");
        }

        if let Some(user) = grant.user {
            return Ok((token, Some(user)));
        }
        let has_user = self.core.lock().user.is_some();
        if has_user && !fetch_profile {
            return Ok((token, None));
        }
        let user = self.collaborators.users.fetch(&token).await?;
        Ok((token, Some(user)))
    }

    fn teardown(&self, reason: &InvalidationReason, sign_out: bool) {
        {
            let mut core = self.core.lock();
            self.teardown_locked(&mut core, reason);
        }
        self.after_teardown(sign_out);
    }

    /// Clear local session state. Any in-flight exchange is detached and its
    /// result will be discarded.
    fn teardown_locked(&self, core: &mut SessionCore, reason: &InvalidationReason) {
        core.generation += 1;
        core.in_flight.detach();
        core.store.clear();
        core.user = None;
        core.reauth_required = reason.requires_reauth();
        core.last_invalidation = reason.requires_reauth().then(|| reason.clone());
        tracing::debug!(%reason, generation = core.generation, "session torn down");
        self.transition(core, SessionState::Anonymous);
    }

    fn after_teardown(&self, sign_out: bool) {
        self.collaborators.cache.invalidate_all();
        if sign_out {
            self.spawn_provider_sign_out();
        }
    }

    fn spawn_provider_sign_out(&self) {
        let identity = Arc::clone(&self.collaborators.identity);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = identity.sign_out().await {
                        tracing::warn!(%error, "identity provider sign-out failed; local session already cleared");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("no async runtime; identity provider sign-out skipped");
            }
        }
    }

    /// Settle after a transient failure: authenticated only if a usable
    /// session is still held.
    fn settle(&self, core: &mut SessionCore) {
        let to = if core.user.is_some() && core.store.has_valid(self.skew_secs) {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        };
        self.transition(core, to);
    }

    fn transition(&self, core: &mut SessionCore, to: SessionState) {
        let from = core.state;
        if from != to && !from.can_transition_to(to) {
            tracing::warn!(%from, %to, "unexpected session state transition");
        }
        core.state = to;
        tracing::debug!(%from, %to, generation = core.generation, "session state");
        self.publish(core);
    }

    fn publish(&self, core: &SessionCore) {
        self.snapshots.send_replace(self.snapshot_of(core));
    }

    fn authenticated(&self, core: &SessionCore) -> bool {
        matches!(
            core.state,
            SessionState::Authenticated | SessionState::Refreshing
        ) && core.user.is_some()
            && core.store.has_valid(self.skew_secs)
    }

    fn snapshot_of(&self, core: &SessionCore) -> SessionSnapshot {
        SessionSnapshot {
            state: core.state,
            user: core.user.clone(),
            token: core.store.get().cloned(),
            is_authenticated: self.authenticated(core),
            reauth_required: core.reauth_required,
            last_invalidation: core.last_invalidation.clone(),
            persistent: core.store.is_persistent(),
        }
    }
}

/// Keeps the session listeners running; aborts them on drop.
pub struct ListenerGuard {
    tasks: Vec<JoinHandle<()>>,
    inner: Arc<SessionInner>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.inner.listening.store(false, Ordering::SeqCst);
    }
}
