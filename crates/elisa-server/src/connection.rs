//! Elisa Connection - Client Sessions
//!
//! A connection is one logical client session. Requests are executed on a
//! blocking worker so the async caller never stalls the runtime. Dropping
//! the returned future does not interrupt the worker, so a write is either
//! never started or runs to completion.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::ServerError;
use crate::protocol::{decode_request, encode_response, Request, Response};
use crate::server::ServerInner;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Request counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub requests: u64,
    pub failures: u64,
}

/// One client session.
pub struct Connection {
    id: u64,
    server: Arc<ServerInner>,
    closed: AtomicBool,
    requests: AtomicU64,
    failures: AtomicU64,
}

impl Connection {
    pub(crate) fn new(id: u64, server: Arc<ServerInner>) -> Self {
        Self {
            id,
            server,
            closed: AtomicBool::new(false),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Execute a request and report its outcome.
    pub async fn execute(&self, request: Request) -> Response {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let op = request.op();
        let result = self.dispatch(request).await;
        if let Err(err) = &result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Connection {}: {} failed: {}", self.id, op, err);
        }
        Response::from(result)
    }

    async fn dispatch(&self, request: Request) -> Result<JsonValue, ServerError> {
        if self.is_closed() {
            return Err(ServerError::ConnectionClosed(self.id));
        }
        self.server.ensure_running()?;

        let server = Arc::clone(&self.server);
        tokio::task::spawn_blocking(move || server.handle(request))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
    }

    /// Execute one line of JSON text and return the encoded response line.
    pub async fn execute_line(&self, line: &str) -> String {
        let response = match decode_request(line) {
            Ok(request) => self.execute(request).await,
            Err(err) => {
                self.requests.fetch_add(1, Ordering::Relaxed);
                self.failures.fetch_add(1, Ordering::Relaxed);
                Response::from_error(&err)
            }
        };
        encode_response(&response)
    }

    /// End the session, returning whether this call closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.server.release_connection();
        tracing::debug!("Connection {} closed", self.id);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
