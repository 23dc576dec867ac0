//! Authenticated session lifecycle.
//!
//! `SessionManager` is the context object the front end holds on to. It
//! owns the current [`UserRecord`], restores it from storage at startup,
//! re-validates it with the backend as the user stays active, and performs
//! login and logout. Consumers read state through [`SessionManager::subscribe`]
//! rather than any global.
//!
//! None of the lifecycle operations fail outward: expiry and transport
//! problems are resolved locally and reported through the [`Notifier`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::{ActivityDecision, ActivityKind, RefreshThrottle};
use crate::api::{ApiError, AuthApi, LoginRequest};
use crate::auth::{RecordCodec, SessionStore, UserRecord};
use crate::config::{FailurePolicy, SessionConfig};
use crate::navigate::Navigator;
use crate::notify::{Notification, Notifier};

const MSG_SESSION_EXPIRED: &str = "Session has expired, please log in again";
const MSG_SERVER_UNREACHABLE: &str =
    "Could not reach the server. Your session may have expired, please log in again";
const MSG_LOGIN_TIMEOUT: &str = "Connection timeout, server not responding";
const MSG_EMPTY_LOGIN_RESPONSE: &str = "Something went wrong";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session expired - the server did not renew the token")]
    NoRenewedToken,

    #[error("Server unreachable: {0}")]
    Transport(ApiError),

    #[error("Login failed: {0}")]
    LoginRejected(ApiError),

    #[error("Login failed: empty response from server")]
    EmptyResponse,
}

impl SessionError {
    fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Timeout | ApiError::NetworkError(_) => SessionError::Transport(err),
            other => SessionError::LoginRejected(other),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Transport(e) if e.is_timeout())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Restoring,
    Authenticated,
}

/// Snapshot of the session published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserRecord>,
    /// A restore or refresh request is in flight
    pub loading: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Restoring
        } else if self.user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }
}

/// How a restore attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing stored; no request was made
    NoSession,
    /// The backend issued a fresh token
    Renewed,
    /// The backend refused to renew; the user was logged out
    Expired,
    /// The backend was unreachable and the stored session was kept
    Fallback,
    /// The backend was unreachable and the session was dropped
    Cleared,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Persist the session so it survives a restart
    pub remember_me: bool,
    /// Where the user was headed before being asked to log in
    pub return_url: Option<String>,
}

struct Inner {
    config: SessionConfig,
    codec: RecordCodec,
    api: Arc<dyn AuthApi>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionState>,
    throttle: Mutex<RefreshThrottle>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Clone is cheap; all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        codec: RecordCodec,
        api: Arc<dyn AuthApi>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let throttle = RefreshThrottle::new(config.refresh_rule, Local::now().naive_local());

        Self {
            inner: Arc::new(Inner {
                config,
                codec,
                api,
                store,
                notifier,
                navigator,
                state,
                throttle: Mutex::new(throttle),
                listener: Mutex::new(None),
            }),
        }
    }

    // ===== State access =====

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase()
    }

    pub fn user(&self) -> Option<UserRecord> {
        self.inner.state.borrow().user.clone()
    }

    /// Current access token, if signed in
    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().user.as_ref().map(|u| u.token.clone())
    }

    /// The persisted session record, read without contacting the backend
    pub fn stored_user(&self) -> Option<UserRecord> {
        self.read_stored()
    }

    fn set_loading(&self, loading: bool) {
        self.inner.state.send_modify(|s| s.loading = loading);
    }

    // ===== Lifecycle =====

    /// Restore the persisted session at startup
    pub async fn init(&self) -> RestoreOutcome {
        info!("Initializing session");
        self.restore_session().await
    }

    /// Stop background activity handling
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener().take() {
            handle.abort();
            debug!("Activity listener aborted");
        }
    }

    /// Re-validate the session with the backend and renew its token.
    pub async fn restore_session(&self) -> RestoreOutcome {
        let Some(candidate) = self.read_stored() else {
            self.set_loading(false);
            debug!("No stored session to restore");
            return RestoreOutcome::NoSession;
        };

        self.set_loading(true);
        debug!(user_id = %candidate.id, "Restoring session");

        match self.validate(&candidate).await {
            Ok(token) => {
                let user = candidate.with_token(token);
                self.write_stored(&user);
                self.inner.state.send_modify(|s| {
                    s.loading = false;
                    s.user = Some(user);
                });
                info!("Session renewed");
                RestoreOutcome::Renewed
            }
            Err(SessionError::NoRenewedToken) => {
                self.set_loading(false);
                self.logout();
                self.notify_expiry(MSG_SESSION_EXPIRED);
                RestoreOutcome::Expired
            }
            Err(err) => {
                warn!(error = %err, "Session check failed");
                self.notify_expiry(MSG_SERVER_UNREACHABLE);
                match self.inner.config.failure_policy {
                    FailurePolicy::BestEffortRestore => {
                        let user = self.read_stored().unwrap_or(candidate);
                        self.inner.state.send_modify(|s| {
                            s.loading = false;
                            s.user = Some(user);
                        });
                        RestoreOutcome::Fallback
                    }
                    FailurePolicy::StrictClear => {
                        self.set_loading(false);
                        self.logout();
                        RestoreOutcome::Cleared
                    }
                }
            }
        }
    }

    async fn validate(&self, candidate: &UserRecord) -> Result<String, SessionError> {
        match self
            .inner
            .api
            .check_session(&candidate.token, &candidate.refresh_token)
            .await
        {
            Ok(resp) => resp
                .renewed_token()
                .map(str::to_string)
                .ok_or(SessionError::NoRenewedToken),
            Err(e) if e.is_rejection() => {
                debug!(error = %e, "Session rejected by server");
                Err(SessionError::NoRenewedToken)
            }
            Err(e) => Err(SessionError::Transport(e)),
        }
    }

    /// Log in and start a session.
    ///
    /// On failure the error is returned and, unless it is one the user
    /// should not see, also surfaced as a notification.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserRecord, SessionError> {
        let request = LoginRequest::new(&credentials.username, &credentials.password);
        info!(user_type = request.user_type, "Logging in");

        let user = match self.inner.api.login(&request).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.inner
                    .notifier
                    .notify(Notification::error(MSG_EMPTY_LOGIN_RESPONSE));
                return Err(SessionError::EmptyResponse);
            }
            Err(e) => {
                let err = SessionError::from_login(e);
                warn!(error = %err, "Login failed");
                self.notify_login_failure(&err);
                return Err(err);
            }
        };

        self.inner
            .state
            .send_modify(|s| s.user = Some(user.clone()));
        if credentials.remember_me {
            self.write_stored(&user);
        } else if let Err(e) = self.inner.store.remove(&self.inner.config.storage_key) {
            // A record left by an earlier remembered login must not replace this one
            warn!(error = %e, "Failed to remove stored session");
        }

        let destination = self.post_login_destination(credentials.return_url.as_deref());
        self.inner.navigator.replace(destination);

        self.restore_session().await;
        Ok(user)
    }

    fn post_login_destination<'a>(&'a self, return_url: Option<&'a str>) -> &'a str {
        match return_url {
            Some(url) if self.inner.config.honor_return_url && !url.is_empty() && url != "/" => url,
            _ => &self.inner.config.post_login_path,
        }
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) {
        self.inner.state.send_modify(|s| s.user = None);
        if let Err(e) = self.inner.store.remove(&self.inner.config.storage_key) {
            warn!(error = %e, "Failed to remove stored session");
        }
        self.inner.api.clear_cookies();
        self.inner.navigator.push(&self.inner.config.landing_path);
        info!("Logged out");
    }

    // ===== Activity =====

    /// Treat `now` as the most recent activity
    pub fn mark_activity(&self, now: NaiveDateTime) {
        *self.throttle() = RefreshThrottle::new(self.inner.config.refresh_rule, now);
    }

    pub async fn record_activity(&self, kind: ActivityKind) -> Option<RestoreOutcome> {
        self.record_activity_at(kind, Local::now().naive_local()).await
    }

    /// Feed one activity event to the refresh throttle, refreshing the
    /// session when it says so.
    pub async fn record_activity_at(
        &self,
        kind: ActivityKind,
        now: NaiveDateTime,
    ) -> Option<RestoreOutcome> {
        let decision = self.throttle().observe(now);
        match decision {
            ActivityDecision::Refresh => {
                debug!(%kind, "Activity triggered session refresh");
                Some(self.restore_session().await)
            }
            ActivityDecision::Reset => {
                debug!(%kind, "Activity window reset");
                None
            }
            ActivityDecision::Ignore => None,
        }
    }

    /// Process activity events in the background until the sender is dropped
    /// or [`SessionManager::shutdown`] is called.
    pub fn spawn_activity_listener(&self, mut events: mpsc::Receiver<ActivityKind>) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(kind) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                SessionManager { inner }.record_activity(kind).await;
            }
            debug!("Activity listener stopped");
        });

        if let Some(previous) = self.listener().replace(handle) {
            previous.abort();
        }
    }

    // ===== Helpers =====

    fn throttle(&self) -> std::sync::MutexGuard<'_, RefreshThrottle> {
        self.inner.throttle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.listener.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_stored(&self) -> Option<UserRecord> {
        let key = &self.inner.config.storage_key;
        let encoded = match self.inner.store.load(key) {
            Ok(encoded) => encoded?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                return None;
            }
        };

        match self.inner.codec.decode(&encoded) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                if let Err(e) = self.inner.store.remove(key) {
                    warn!(error = %e, "Failed to remove stored session");
                }
                None
            }
        }
    }

    fn write_stored(&self, user: &UserRecord) {
        let result = self
            .inner
            .codec
            .encode(user)
            .map_err(anyhow::Error::from)
            .and_then(|encoded| self.inner.store.save(&self.inner.config.storage_key, &encoded));
        if let Err(e) = result {
            warn!(error = %e, "Failed to save session");
        }
    }

    fn notify_expiry(&self, message: &str) {
        let duration = Duration::from_millis(self.inner.config.notification_duration_ms);
        self.inner
            .notifier
            .notify(Notification::error(message).with_duration(duration));
    }

    fn notify_login_failure(&self, err: &SessionError) {
        if err.is_timeout() {
            self.inner.notifier.notify(Notification::error(MSG_LOGIN_TIMEOUT));
            return;
        }

        let text = err.to_string();
        let marker = self.inner.config.suppressed_error_marker.as_str();
        if !marker.is_empty() && text.contains(marker) {
            debug!(error = %text, "Login error notification suppressed");
            return;
        }
        self.inner.notifier.notify(Notification::error(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::activity::RefreshRule;
    use crate::api::AuthCheckResponse;
    use crate::auth::MemoryStore;
    use crate::navigate::RouteHistory;
    use crate::notify::NotificationQueue;

    type CheckReply = Result<AuthCheckResponse, ApiError>;
    type LoginReply = Result<Option<UserRecord>, ApiError>;

    /// Scripted backend: replies are consumed in order.
    #[derive(Default)]
    struct FakeApi {
        check_replies: Mutex<VecDeque<CheckReply>>,
        login_replies: Mutex<VecDeque<LoginReply>>,
        check_calls: Mutex<Vec<(String, String)>>,
        login_calls: Mutex<Vec<LoginRequest>>,
        cookie_clears: AtomicUsize,
        /// Session state as seen by each auth check while it was in flight
        states_during_check: Mutex<Vec<SessionState>>,
        session: Mutex<Option<watch::Receiver<SessionState>>>,
    }

    impl FakeApi {
        fn reply_check(&self, reply: CheckReply) {
            self.check_replies.lock().unwrap().push_back(reply);
        }

        fn renew_with(&self, token: &str) {
            self.reply_check(Ok(AuthCheckResponse {
                token: Some(token.to_string()),
            }));
        }

        fn reply_login(&self, reply: LoginReply) {
            self.login_replies.lock().unwrap().push_back(reply);
        }

        fn check_calls(&self) -> Vec<(String, String)> {
            self.check_calls.lock().unwrap().clone()
        }

        fn login_calls(&self) -> Vec<LoginRequest> {
            self.login_calls.lock().unwrap().clone()
        }

        fn states_during_check(&self) -> Vec<SessionState> {
            self.states_during_check.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn check_session(&self, token: &str, refresh_token: &str) -> CheckReply {
            self.check_calls
                .lock()
                .unwrap()
                .push((token.to_string(), refresh_token.to_string()));
            if let Some(session) = self.session.lock().unwrap().as_ref() {
                let state = session.borrow().clone();
                self.states_during_check.lock().unwrap().push(state);
            }
            self.check_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::ServerError("unexpected check".into())))
        }

        async fn login(&self, request: &LoginRequest) -> LoginReply {
            self.login_calls.lock().unwrap().push(request.clone());
            self.login_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::ServerError("unexpected login".into())))
        }

        fn clear_cookies(&self) {
            self.cookie_clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        manager: SessionManager,
        api: Arc<FakeApi>,
        store: Arc<MemoryStore>,
        notices: Arc<NotificationQueue>,
        routes: Arc<RouteHistory>,
    }

    impl Harness {
        fn new(config: SessionConfig) -> Self {
            let api = Arc::new(FakeApi::default());
            let store = Arc::new(MemoryStore::new());
            let notices = Arc::new(NotificationQueue::new());
            let routes = Arc::new(RouteHistory::new("/login"));
            let codec = RecordCodec::new("test-secret").expect("codec");
            let manager = SessionManager::new(
                config,
                codec,
                api.clone(),
                store.clone(),
                notices.clone(),
                routes.clone(),
            );
            *api.session.lock().unwrap() = Some(manager.subscribe());
            Self {
                manager,
                api,
                store,
                notices,
                routes,
            }
        }

        fn seed(&self, record: &UserRecord) {
            let encoded = self.manager.inner.codec.encode(record).expect("encode");
            self.store.save("userData", &encoded).expect("seed");
        }

        fn stored(&self) -> Option<UserRecord> {
            self.store
                .load("userData")
                .expect("load")
                .map(|encoded| self.manager.inner.codec.decode(&encoded).expect("decode"))
        }

        fn messages(&self) -> Vec<String> {
            self.notices.drain().into_iter().map(|n| n.message).collect()
        }
    }

    fn record(token: &str) -> UserRecord {
        UserRecord {
            id: "42".into(),
            company_code: "01".into(),
            user_type: "A".into(),
            full_name: "Jane Doe".into(),
            email: "jane@x.com".into(),
            token: token.into(),
            refresh_token: "refresh-1".into(),
            ip: String::new(),
            browser: String::new(),
        }
    }

    fn credentials(username: &str, remember_me: bool) -> Credentials {
        Credentials {
            username: username.into(),
            password: "pw".into(),
            remember_me,
            return_url: Some("/gl/transactions/list".into()),
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .expect("valid test time")
    }

    // -------------------------------------------------------------------------
    // Restore
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_restore_with_empty_storage_makes_no_request() {
        let h = Harness::new(SessionConfig::default());

        assert_eq!(h.manager.init().await, RestoreOutcome::NoSession);

        let state = h.manager.snapshot();
        assert!(!state.loading);
        assert!(state.user.is_none());
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        assert!(h.api.check_calls().is_empty());
        assert!(h.messages().is_empty());
    }

    #[tokio::test]
    async fn test_restore_renews_token() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("old-token"));
        h.api.renew_with("new-token");

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::Renewed);

        assert_eq!(
            h.api.check_calls(),
            vec![("old-token".to_string(), "refresh-1".to_string())]
        );
        assert_eq!(h.manager.token().as_deref(), Some("new-token"));
        assert_eq!(h.manager.phase(), SessionPhase::Authenticated);
        assert_eq!(h.stored().map(|r| r.token), Some("new-token".to_string()));
    }

    #[tokio::test]
    async fn test_restore_is_loading_while_check_in_flight() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("old-token"));
        h.api.renew_with("new-token");

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::Renewed);

        let during = h.api.states_during_check();
        assert_eq!(during.len(), 1);
        assert!(during[0].loading);
        assert_eq!(during[0].phase(), SessionPhase::Restoring);

        let after = h.manager.snapshot();
        assert!(!after.loading);
        assert_eq!(after.phase(), SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn test_restore_without_renewed_token_logs_out() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("old-token"));
        h.api.reply_check(Ok(AuthCheckResponse { token: None }));

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::Expired);

        assert_eq!(h.manager.phase(), SessionPhase::Unauthenticated);
        assert!(h.store.is_empty());
        assert_eq!(h.routes.current(), "/home");
        assert_eq!(h.api.cookie_clears.load(Ordering::SeqCst), 1);

        let notices = h.notices.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, MSG_SESSION_EXPIRED);
        assert_eq!(notices[0].duration, Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_restore_rejected_token_is_expiry() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("old-token"));
        h.api.reply_check(Err(ApiError::Unauthorized));

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::Expired);
        assert!(h.manager.user().is_none());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_best_effort_keeps_stored_user() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("old-token"));
        h.api.reply_check(Err(ApiError::Timeout));

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::Fallback);

        assert_eq!(h.manager.user(), Some(record("old-token")));
        assert!(!h.manager.snapshot().loading);
        assert!(h.stored().is_some());
        assert_eq!(h.messages(), vec![MSG_SERVER_UNREACHABLE.to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_strict_clear_logs_out() {
        let h = Harness::new(SessionConfig {
            failure_policy: FailurePolicy::StrictClear,
            ..SessionConfig::default()
        });
        h.seed(&record("old-token"));
        h.api.reply_check(Err(ApiError::ServerError("bad gateway".into())));

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::Cleared);

        assert!(h.manager.user().is_none());
        assert!(h.store.is_empty());
        assert_eq!(h.messages(), vec![MSG_SERVER_UNREACHABLE.to_string()]);
    }

    #[tokio::test]
    async fn test_unreadable_stored_session_is_discarded() {
        let h = Harness::new(SessionConfig::default());
        h.store.save("userData", "garbage").expect("seed");

        assert_eq!(h.manager.restore_session().await, RestoreOutcome::NoSession);
        assert!(h.store.is_empty());
        assert!(h.api.check_calls().is_empty());
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("t"));
        h.api.renew_with("t2");
        h.manager.init().await;
        assert_eq!(h.manager.phase(), SessionPhase::Authenticated);

        h.manager.logout();
        let once = (h.manager.snapshot(), h.store.is_empty(), h.routes.history());
        h.manager.logout();
        let twice = (h.manager.snapshot(), h.store.is_empty(), h.routes.history());

        assert_eq!(once, twice);
        assert_eq!(
            twice,
            (
                SessionState::default(),
                true,
                vec!["/login".to_string(), "/home".to_string()]
            )
        );
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_without_remember_me_does_not_persist() {
        let h = Harness::new(SessionConfig::default());
        h.api.reply_login(Ok(Some(record("login-token"))));

        let user = h.manager.login(&credentials("admin", false)).await.expect("login");

        assert_eq!(user.token, "login-token");
        assert!(h.store.is_empty());
        // Nothing stored, so the follow-up restore makes no request
        assert!(h.api.check_calls().is_empty());
        assert_eq!(h.manager.token().as_deref(), Some("login-token"));
        assert_eq!(h.manager.phase(), SessionPhase::Authenticated);
        assert!(h.messages().is_empty());
        assert_eq!(h.api.login_calls()[0].user_type, "A");
        assert_eq!(h.routes.current(), "/mycourses/list");
        assert_eq!(h.routes.history(), vec!["/mycourses/list".to_string()]);
    }

    #[tokio::test]
    async fn test_login_without_remember_me_drops_earlier_stored_account() {
        let h = Harness::new(SessionConfig::default());
        let earlier = UserRecord {
            id: "7".into(),
            ..record("earlier-token")
        };
        h.seed(&earlier);
        h.api.reply_login(Ok(Some(record("login-token"))));

        h.manager.login(&credentials("admin", false)).await.expect("login");

        assert_eq!(h.manager.user().map(|u| u.id), Some("42".to_string()));
        assert_eq!(h.manager.token().as_deref(), Some("login-token"));
        assert!(h.store.is_empty());
        assert!(h.api.check_calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_with_remember_me_persists() {
        let h = Harness::new(SessionConfig::default());
        h.api.reply_login(Ok(Some(record("login-token"))));
        h.api.renew_with("renewed");

        h.manager.login(&credentials("admin@x.com", true)).await.expect("login");

        assert_eq!(h.api.login_calls()[0].user_type, "S");
        assert_eq!(
            h.api.check_calls(),
            vec![("login-token".to_string(), "refresh-1".to_string())]
        );
        assert_eq!(h.stored().map(|r| r.token), Some("renewed".to_string()));
    }

    #[tokio::test]
    async fn test_login_honors_return_url_when_enabled() {
        let h = Harness::new(SessionConfig {
            honor_return_url: true,
            ..SessionConfig::default()
        });
        h.api.reply_login(Ok(Some(record("login-token"))));

        h.manager.login(&credentials("admin", false)).await.expect("login");
        assert_eq!(h.routes.current(), "/gl/transactions/list");
    }

    #[tokio::test]
    async fn test_login_timeout_notification() {
        let h = Harness::new(SessionConfig::default());
        h.api.reply_login(Err(ApiError::Timeout));

        let err = h.manager.login(&credentials("admin", true)).await.expect_err("timeout");

        assert!(err.is_timeout());
        assert!(h.manager.user().is_none());
        assert!(h.store.is_empty());
        assert_eq!(h.messages(), vec![MSG_LOGIN_TIMEOUT.to_string()]);
    }

    #[tokio::test]
    async fn test_login_rejection_is_shown() {
        let h = Harness::new(SessionConfig::default());
        h.api.reply_login(Err(ApiError::AccessDenied("invalid password".into())));

        let err = h.manager.login(&credentials("admin", false)).await.expect_err("rejected");

        assert!(matches!(err, SessionError::LoginRejected(_)));
        let messages = h.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("invalid password"));
    }

    #[tokio::test]
    async fn test_login_error_with_marker_is_suppressed() {
        let h = Harness::new(SessionConfig::default());
        h.api.reply_login(Err(ApiError::InvalidResponse(
            "missing field `compcode`".into(),
        )));

        let err = h.manager.login(&credentials("admin", false)).await.expect_err("invalid");

        assert!(matches!(err, SessionError::LoginRejected(_)));
        assert!(h.messages().is_empty());
    }

    #[tokio::test]
    async fn test_login_empty_response() {
        let h = Harness::new(SessionConfig::default());
        h.api.reply_login(Ok(None));

        let err = h.manager.login(&credentials("admin", false)).await.expect_err("empty");

        assert!(matches!(err, SessionError::EmptyResponse));
        assert!(h.manager.user().is_none());
        assert_eq!(h.messages(), vec![MSG_EMPTY_LOGIN_RESPONSE.to_string()]);
    }

    // -------------------------------------------------------------------------
    // Activity
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_activity_refresh_window() {
        for rule in [RefreshRule::default(), RefreshRule::CalendarHour] {
            let h = Harness::new(SessionConfig {
                refresh_rule: rule,
                ..SessionConfig::default()
            });
            h.seed(&record("old-token"));
            h.api.renew_with("new-token");
            h.manager.mark_activity(at(9, 10));

            let early = h.manager.record_activity_at(ActivityKind::KeyPress, at(9, 34)).await;
            assert_eq!(early, None, "{:?}", rule);
            assert!(h.api.check_calls().is_empty());

            let late = h
                .manager
                .record_activity_at(ActivityKind::PointerMove, at(10, 35))
                .await;
            assert_eq!(late, Some(RestoreOutcome::Renewed), "{:?}", rule);
            assert_eq!(h.manager.token().as_deref(), Some("new-token"));
        }
    }

    #[tokio::test]
    async fn test_activity_listener_refreshes_session() {
        let h = Harness::new(SessionConfig::default());
        h.seed(&record("old-token"));
        h.api.renew_with("new-token");
        h.manager
            .mark_activity(Local::now().naive_local() - chrono::Duration::hours(2));

        let mut state = h.manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        h.manager.spawn_activity_listener(rx);
        tx.send(ActivityKind::TouchStart).await.expect("send");

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                state.changed().await.expect("session dropped");
                if state.borrow().user.as_ref().map(|u| u.token.as_str()) == Some("new-token") {
                    break;
                }
            }
        })
        .await
        .expect("refresh did not happen");

        h.manager.shutdown();
        assert_eq!(h.api.check_calls().len(), 1);
    }

    #[test]
    fn test_phase() {
        let mut state = SessionState::default();
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        state.loading = true;
        assert_eq!(state.phase(), SessionPhase::Restoring);
        state.user = Some(record("t"));
        assert_eq!(state.phase(), SessionPhase::Restoring);
        state.loading = false;
        assert_eq!(state.phase(), SessionPhase::Authenticated);
    }
}
