//! # metabridge-client
//!
//! Authenticated request core for the Metabase REST API.
//!
//! The crate is split along the outbound call path:
//! - [`guard`]: read-only SQL denylist run before any free-text query is sent
//! - [`auth`]: static API key or login-based session credentials
//! - [`dispatcher`]: decorate, send, one 401-triggered re-login and replay
//! - [`transport`]: the HTTP seam, with a `reqwest` implementation
//! - [`client`]: the facade tying it together
//!
//! ## Example
//!
//! ```no_run
//! use metabridge_client::{DatasetQueryRequest, MetabaseClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), metabridge_client::ClientError> {
//! let cancel = CancellationToken::new();
//! let client = MetabaseClient::new(
//!     "https://metabase.example.com",
//!     "",
//!     "analyst@example.com",
//!     "password",
//!     &cancel,
//! )
//! .await?;
//!
//! let request = DatasetQueryRequest::native(1, "SELECT count(*) FROM orders");
//! let response = client.execute_query(&request, &cancel).await?;
//! println!("{} rows", response.row_count);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use auth::{Credential, CredentialProvider};
pub use client::MetabaseClient;
pub use dispatcher::Dispatcher;
pub use error::ClientError;
pub use guard::validate_read_only;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use types::{
    DatasetCol, DatasetData, DatasetQueryRequest, DatasetQueryResponse, ExportFormat, NativeForm,
    NativeQuery, QueryType, User,
};
