//! Authenticated request dispatch.
//!
//! Every API call goes through [`Dispatcher::send_json`] or
//! [`Dispatcher::send_raw`]. A call is decorated, sent, and on a 401 from the
//! first attempt the credential provider decides whether one replay is
//! allowed. At most two attempts are ever made; a 401 on the replay is final.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::CredentialProvider;
use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpResponse, Transport, send_cancellable};

/// Sends requests with credentials attached and the single re-auth retry.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialProvider>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher that sends through `transport` with `credentials`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// The provider used to decorate requests.
    #[must_use]
    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }

    /// Sends `request` and decodes a 2xx body as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RemoteApiError`] for a non-2xx answer after any
    /// retry, [`ClientError::SerializationError`] for an undecodable body,
    /// [`ClientError::Cancelled`] if `cancel` fires, or a transport error.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<T, ClientError> {
        self.execute(request, cancel).await?.json()
    }

    /// Sends `request` and returns the 2xx body bytes untouched.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::send_json`], minus decoding.
    pub async fn send_raw(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError> {
        Ok(self.execute(request, cancel).await?.body)
    }

    async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, ClientError> {
        let mut response = self.attempt(request.clone(), cancel).await?;

        if !response.is_success()
            && self
                .credentials
                .should_retry_after_rejection(response.status, cancel)
                .await
        {
            debug!(path = %request.path, "replaying request with refreshed session");
            response = self.attempt(request, cancel).await?;
        } else if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::RemoteApiError {
                status: response.status,
                body: response.text(),
            })
        }
    }

    async fn attempt(
        &self,
        mut request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        self.credentials.decorate(&mut request).await?;
        send_cancellable(self.transport.as_ref(), request, cancel).await
    }
}
