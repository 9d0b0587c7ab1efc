//! Credential strategies and request decoration.
//!
//! Exactly one strategy is active per client:
//!
//! - [`Credential::StaticKey`]: a pre-shared API key sent as `x-api-key`,
//!   immutable for the life of the process.
//! - [`Credential::Session`]: username/password exchanged for a session id at
//!   `POST /api/session`, sent as `X-Metabase-Session`. The id is not tracked
//!   for expiry; a 401 from the server is the only staleness signal.
//!
//! The session id lives in an `RwLock<Option<Arc<SecretString>>>`. Readers
//! clone the `Arc` and release the lock immediately; a login swaps in a new
//! `Arc` under a short write lock after its network exchange has finished, so
//! a reader sees either the old token or the new one and never a mix.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::HeaderName;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;
use crate::transport::{HttpRequest, Transport, send_cancellable};
use crate::types::{SessionRequest, SessionResponse};

/// Header carrying a static API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying a session id.
pub const SESSION_HEADER: &str = "x-metabase-session";

/// Login endpoint.
pub const LOGIN_PATH: &str = "/api/session";

/// The active authentication strategy.
pub enum Credential {
    /// Pre-shared API key.
    StaticKey(SecretString),
    /// Session obtained by logging in.
    Session(SessionAuth),
}

impl Credential {
    /// Selects a strategy from raw configuration values.
    ///
    /// A non-empty API key wins over any username/password. Otherwise both a
    /// username and a password must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigurationError`] if neither a key nor a
    /// complete username/password pair is supplied.
    pub fn from_parts(api_key: &str, username: &str, password: &str) -> Result<Self, ClientError> {
        if !api_key.is_empty() {
            return Ok(Self::StaticKey(SecretString::new(api_key.into())));
        }
        if !username.is_empty() && !password.is_empty() {
            return Ok(Self::Session(SessionAuth::new(username, password)));
        }
        Err(ClientError::ConfigurationError(
            "either API key or username/password must be provided".to_string(),
        ))
    }

    /// Whether this is the login-based strategy.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticKey(_) => f.debug_tuple("StaticKey").field(&"[REDACTED]").finish(),
            Self::Session(session) => f.debug_tuple("Session").field(session).finish(),
        }
    }
}

/// Username/password credentials plus the current session id.
pub struct SessionAuth {
    username: String,
    password: SecretString,
    session_id: RwLock<Option<Arc<SecretString>>>,
}

impl SessionAuth {
    /// Creates session credentials with no session id yet.
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: SecretString::new(password.into()),
            session_id: RwLock::new(None),
        }
    }

    /// Snapshot of the current session id, if a login has completed.
    pub async fn session_id(&self) -> Option<Arc<SecretString>> {
        self.session_id.read().await.clone()
    }

    async fn replace_session_id(&self, id: SecretString) {
        *self.session_id.write().await = Some(Arc::new(id));
    }
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("session_id", &"[REDACTED]")
            .finish()
    }
}

/// Owns authentication state and decorates outbound requests.
///
/// Login traffic goes straight to the transport and is never itself
/// decorated or retried.
pub struct CredentialProvider {
    credential: Credential,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider {
    /// Creates a provider without performing any network call.
    #[must_use]
    pub fn new(credential: Credential, transport: Arc<dyn Transport>) -> Self {
        Self {
            credential,
            transport,
        }
    }

    /// Selects a strategy and, for sessions, performs the initial login.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigurationError`] for an incomplete credential
    /// set, or [`ClientError::InitialAuthError`] if the first login fails. The
    /// initial login is not retried.
    pub async fn initialize(
        transport: Arc<dyn Transport>,
        api_key: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, ClientError> {
        let provider = Self::new(Credential::from_parts(api_key, username, password)?, transport);
        if provider.is_session() {
            if let Err(e) = provider.login(cancel).await {
                error!(error = %e, "initial authentication failed");
                return Err(ClientError::InitialAuthError(Box::new(e)));
            }
        }
        Ok(provider)
    }

    /// Whether the session strategy is active.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        self.credential.is_session()
    }

    /// The active strategy.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Exchanges username/password for a fresh session id and stores it.
    ///
    /// Safe to call concurrently; the last login to complete wins. A no-op for
    /// the static key strategy.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthError`] on a non-2xx answer, or a transport,
    /// decoding, or cancellation error.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        let Credential::Session(session) = &self.credential else {
            return Ok(());
        };

        info!(username = %session.username, "authenticating with Metabase session");

        let request = HttpRequest::post(LOGIN_PATH).json(&SessionRequest {
            username: &session.username,
            password: session.password.expose_secret(),
        })?;

        let response = send_cancellable(self.transport.as_ref(), request, cancel).await?;
        if !response.is_success() {
            return Err(ClientError::AuthError {
                status: response.status,
                body: response.text(),
            });
        }

        let SessionResponse { id } = response.json()?;
        session.replace_session_id(SecretString::new(id.into())).await;

        info!("metabase session created successfully");
        Ok(())
    }

    /// Attaches the identity header for the active strategy.
    ///
    /// Before the first login completes there is no session id and no header
    /// is attached; the server's 401 then drives a re-login.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is not a valid header value.
    pub async fn decorate(&self, request: &mut HttpRequest) -> Result<(), ClientError> {
        match &self.credential {
            Credential::StaticKey(key) => request.set_sensitive_header(
                HeaderName::from_static(API_KEY_HEADER),
                key.expose_secret(),
            ),
            Credential::Session(session) => match session.session_id().await {
                Some(id) => request.set_sensitive_header(
                    HeaderName::from_static(SESSION_HEADER),
                    id.expose_secret(),
                ),
                None => Ok(()),
            },
        }
    }

    /// Decides whether a rejected request should be replayed.
    ///
    /// True only for a 401, with the session strategy active, after a fresh
    /// login succeeds. A failed login is logged and reported as `false` so the
    /// original rejection reaches the caller. A login cut short by `cancel` is
    /// also `false`; the caller checks the token to report the cancellation.
    pub async fn should_retry_after_rejection(
        &self,
        status: StatusCode,
        cancel: &CancellationToken,
    ) -> bool {
        if status != StatusCode::UNAUTHORIZED || !self.is_session() {
            return false;
        }

        warn!("received 401, re-authenticating");
        match self.login(cancel).await {
            Ok(()) => true,
            Err(ClientError::Cancelled) => {
                debug!("re-authentication cancelled");
                false
            }
            Err(e) => {
                error!(error = %e, "re-authentication failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_support::ScriptedTransport;
    use crate::transport::{HttpResponse, ReqwestTransport};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn header_value(request: &HttpRequest, name: &str) -> Option<String> {
        request
            .headers
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn test_neither_key_nor_complete_pair_is_rejected() {
        for (key, user, pass) in [("", "", ""), ("", "admin", ""), ("", "", "secret")] {
            let err = Credential::from_parts(key, user, pass).unwrap_err();
            assert!(matches!(err, ClientError::ConfigurationError(_)));
            assert!(
                err.to_string()
                    .contains("either API key or username/password must be provided")
            );
        }
    }

    #[test]
    fn test_api_key_takes_precedence() {
        let credential = Credential::from_parts("mb_key", "admin", "secret").unwrap();
        assert!(!credential.is_session());
        let credential = Credential::from_parts("mb_key", "admin", "").unwrap();
        assert!(!credential.is_session());
        let credential = Credential::from_parts("", "admin", "secret").unwrap();
        assert!(credential.is_session());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let key = Credential::from_parts("super-secret-key", "", "").unwrap();
        let session = Credential::from_parts("", "admin@test.com", "hunter2").unwrap();
        let debug_str = format!("{key:?} {session:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("admin@test.com"));
        assert!(!debug_str.contains("super-secret-key"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_login_against_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/session"))
            .and(body_json(json!({
                "username": "admin@test.com",
                "password": "password123"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "test-session-id"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = Arc::new(ReqwestTransport::new(&mock_server.uri()).unwrap());
        let provider = CredentialProvider::new(
            Credential::from_parts("", "admin@test.com", "password123").unwrap(),
            transport,
        );

        provider.login(&CancellationToken::new()).await.unwrap();

        let mut request = HttpRequest::get("/api/database");
        provider.decorate(&mut request).await.unwrap();
        assert_eq!(
            header_value(&request, SESSION_HEADER).as_deref(),
            Some("test-session-id")
        );
        assert!(request.headers.get(API_KEY_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_login_failure_reports_status_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/session"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string(r#"{"errors":{"password":"did not match"}}"#),
            )
            .mount(&mock_server)
            .await;

        let transport = Arc::new(ReqwestTransport::new(&mock_server.uri()).unwrap());
        let provider = CredentialProvider::new(
            Credential::from_parts("", "admin@test.com", "wrong").unwrap(),
            transport,
        );

        let err = provider.login(&CancellationToken::new()).await.unwrap_err();
        match err {
            ClientError::AuthError { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("did not match"));
            }
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initialize_with_key_performs_no_login() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let provider = CredentialProvider::initialize(
            transport.clone(),
            "mb_key",
            "admin",
            "secret",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(transport.request_count(), 0);

        let mut request = HttpRequest::get("/api/database");
        provider.decorate(&mut request).await.unwrap();
        assert_eq!(header_value(&request, API_KEY_HEADER).as_deref(), Some("mb_key"));
        assert!(request.headers.get(SESSION_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_initialize_failure_is_initial_auth_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse::new(
            StatusCode::UNAUTHORIZED,
            "nope",
        )]));
        let err = CredentialProvider::initialize(
            transport.clone(),
            "",
            "admin",
            "wrong",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::InitialAuthError(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_failure_is_logged_without_password() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse::new(
            StatusCode::UNAUTHORIZED,
            "invalid credentials",
        )]));
        CredentialProvider::initialize(
            transport,
            "",
            "admin",
            "hunter2",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("initial authentication failed"), "{output}");
        assert!(output.contains("ERROR"));
        assert!(!output.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_retry_decision_requires_401_and_session() {
        let cancel = CancellationToken::new();

        let key_provider = CredentialProvider::new(
            Credential::from_parts("mb_key", "", "").unwrap(),
            Arc::new(ScriptedTransport::new(vec![])),
        );
        assert!(
            !key_provider
                .should_retry_after_rejection(StatusCode::UNAUTHORIZED, &cancel)
                .await
        );

        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse::new(
            StatusCode::OK,
            r#"{"id":"fresh"}"#,
        )]));
        let session_provider = CredentialProvider::new(
            Credential::from_parts("", "admin", "secret").unwrap(),
            transport.clone(),
        );
        assert!(
            !session_provider
                .should_retry_after_rejection(StatusCode::FORBIDDEN, &cancel)
                .await
        );
        assert_eq!(transport.request_count(), 0);

        assert!(
            session_provider
                .should_retry_after_rejection(StatusCode::UNAUTHORIZED, &cancel)
                .await
        );
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_relogin_suppresses_retry_and_keeps_old_session() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            HttpResponse::new(StatusCode::OK, r#"{"id":"first"}"#),
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "down"),
        ]));
        let provider = CredentialProvider::new(
            Credential::from_parts("", "admin", "secret").unwrap(),
            transport,
        );
        let cancel = CancellationToken::new();

        provider.login(&cancel).await.unwrap();
        assert!(
            !provider
                .should_retry_after_rejection(StatusCode::UNAUTHORIZED, &cancel)
                .await
        );

        let mut request = HttpRequest::get("/api/database");
        provider.decorate(&mut request).await.unwrap();
        assert_eq!(header_value(&request, SESSION_HEADER).as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_decorate_before_login_attaches_nothing() {
        let provider = CredentialProvider::new(
            Credential::from_parts("", "admin", "secret").unwrap(),
            Arc::new(ScriptedTransport::new(vec![])),
        );
        let mut request = HttpRequest::get("/api/database");
        provider.decorate(&mut request).await.unwrap();
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_logins_never_expose_torn_tokens() {
        let tokens: Vec<String> = (0..32)
            .map(|i| format!("session-{i:04}-{}", "x".repeat(64)))
            .collect();
        let responses = tokens
            .iter()
            .map(|t| HttpResponse::new(StatusCode::OK, json!({"id": t}).to_string()))
            .collect();
        let provider = Arc::new(CredentialProvider::new(
            Credential::from_parts("", "admin", "secret").unwrap(),
            Arc::new(ScriptedTransport::new(responses)),
        ));

        let mut handles = Vec::new();
        for _ in 0..tokens.len() {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                provider.login(&CancellationToken::new()).await.unwrap();
            }));
        }
        let issued = Arc::new(tokens.clone());
        for _ in 0..64 {
            let provider = Arc::clone(&provider);
            let issued = Arc::clone(&issued);
            handles.push(tokio::spawn(async move {
                let mut request = HttpRequest::get("/api/database");
                provider.decorate(&mut request).await.unwrap();
                if let Some(seen) = header_value(&request, SESSION_HEADER) {
                    assert!(issued.contains(&seen), "torn session id: {seen}");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut request = HttpRequest::get("/api/database");
        provider.decorate(&mut request).await.unwrap();
        let last = header_value(&request, SESSION_HEADER).unwrap();
        assert!(tokens.contains(&last));
    }

    #[tokio::test]
    async fn test_cancelled_login_leaves_state_untouched() {
        let provider = CredentialProvider::new(
            Credential::from_parts("", "admin", "secret").unwrap(),
            Arc::new(ScriptedTransport::new(vec![HttpResponse::new(
                StatusCode::OK,
                r#"{"id":"never"}"#,
            )])),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.login(&cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));

        let Credential::Session(session) = provider.credential() else {
            unreachable!("session strategy expected");
        };
        assert!(session.session_id().await.is_none());
    }
}
