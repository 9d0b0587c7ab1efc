//! The Metabase client facade.
//!
//! [`MetabaseClient`] owns one [`Dispatcher`] and exposes the calls the core
//! needs: the current-user check and dataset execution/export. Every query
//! carrying free-text SQL passes [`validate_read_only`] before the dispatcher
//! is touched.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::guard::validate_read_only;
use crate::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::types::{DatasetQueryRequest, DatasetQueryResponse, ExportFormat, QueryType, User};

const CURRENT_USER_PATH: &str = "/api/user/current";
const DATASET_PATH: &str = "/api/dataset";

/// Authenticated client for a single Metabase instance.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and may be called
/// concurrently.
#[derive(Debug)]
pub struct MetabaseClient {
    dispatcher: Dispatcher,
}

impl MetabaseClient {
    /// Connects to `base_url` with the default transport.
    ///
    /// A non-empty `api_key` takes precedence; otherwise `username` and
    /// `password` are exchanged for a session before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigurationError`] for an invalid URL or an
    /// incomplete credential set, and [`ClientError::InitialAuthError`] if the
    /// first login fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use metabridge_client::MetabaseClient;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> Result<(), metabridge_client::ClientError> {
    /// let cancel = CancellationToken::new();
    /// let client =
    ///     MetabaseClient::new("https://metabase.example.com", "mb_key", "", "", &cancel).await?;
    /// client.health_check(&cancel).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        base_url: &str,
        api_key: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, ClientError> {
        let transport = Arc::new(ReqwestTransport::new(base_url)?);
        Self::with_transport(transport, api_key, username, password, cancel).await
    }

    /// Connects through a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Same as [`MetabaseClient::new`], minus URL validation.
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        api_key: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, ClientError> {
        let credentials = CredentialProvider::initialize(
            Arc::clone(&transport),
            api_key,
            username,
            password,
            cancel,
        )
        .await?;

        info!(
            session = credentials.is_session(),
            "metabase client initialized"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(transport, Arc::new(credentials)),
        })
    }

    /// The dispatcher behind this client.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fetches the user the active credential belongs to.
    ///
    /// # Errors
    ///
    /// Returns any dispatch error.
    pub async fn current_user(&self, cancel: &CancellationToken) -> Result<User, ClientError> {
        self.dispatcher
            .send_json(HttpRequest::get(CURRENT_USER_PATH), cancel)
            .await
    }

    /// Verifies the instance is reachable and the credential is accepted.
    ///
    /// Any 2xx from the current-user endpoint passes; the body is not read.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HealthCheckError`] wrapping the underlying failure.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.dispatcher
            .send_raw(HttpRequest::get(CURRENT_USER_PATH), cancel)
            .await
            .map_err(|e| ClientError::HealthCheckError(Box::new(e)))?;
        debug!("metabase health check passed");
        Ok(())
    }

    /// Runs an ad-hoc query through `POST /api/dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for a malformed request,
    /// [`ClientError::BlockedOperationError`] for native SQL that fails the
    /// read-only guard, or any dispatch error.
    pub async fn execute_query(
        &self,
        request: &DatasetQueryRequest,
        cancel: &CancellationToken,
    ) -> Result<DatasetQueryResponse, ClientError> {
        check_query(request)?;
        let http = HttpRequest::post(DATASET_PATH).json(request)?;
        self.dispatcher.send_json(http, cancel).await
    }

    /// Downloads query results through `POST /api/dataset/{format}`.
    ///
    /// The body is returned exactly as the server sent it.
    ///
    /// # Errors
    ///
    /// Same as [`MetabaseClient::execute_query`].
    pub async fn export_query_results(
        &self,
        request: &DatasetQueryRequest,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError> {
        check_query(request)?;
        let http = HttpRequest::post(format!("{DATASET_PATH}/{format}")).json(request)?;
        self.dispatcher.send_raw(http, cancel).await
    }
}

/// Shape checks plus the read-only gate, run before anything is dispatched.
fn check_query(request: &DatasetQueryRequest) -> Result<(), ClientError> {
    match request.query_type {
        QueryType::Native => {
            let sql = request
                .sql()
                .filter(|sql| !sql.trim().is_empty())
                .ok_or_else(|| {
                    ClientError::InvalidRequest(
                        "native query requires non-empty SQL".to_string(),
                    )
                })?;
            validate_read_only(sql)
        }
        QueryType::Query => {
            if request.query.is_none() {
                return Err(ClientError::InvalidRequest(
                    "MBQL query requires a query object".to_string(),
                ));
            }
            Ok(())
        }
    }
}
