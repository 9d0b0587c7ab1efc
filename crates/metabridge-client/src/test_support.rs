#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// In-memory transport that answers from a fixed script and records every
/// request it sees.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    stall_when_empty: bool,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            stall_when_empty: false,
        }
    }

    /// Like [`ScriptedTransport::new`], but hangs forever once the script runs out.
    pub fn stalling(responses: Vec<HttpResponse>) -> Self {
        Self {
            stall_when_empty: true,
            ..Self::new(responses)
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        if next.is_none() && self.stall_when_empty {
            return std::future::pending().await;
        }
        next.ok_or_else(|| {
            ClientError::InvalidRequest(format!("no scripted response for {}", request.path))
        })
    }
}

/// Transport that never answers; used to exercise cancellation.
pub struct PendingTransport;

#[async_trait]
impl Transport for PendingTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, ClientError> {
        std::future::pending().await
    }
}
