//! Elisa Protocol - Request and Response Messages
//!
//! Serializable messages exchanged between a client session and the server.
//! A request names one core operation and the database (and usually the
//! collection) it targets. A response is either a success carrying a JSON
//! value or a failure carrying an error kind and message, never both.
//!
//! Messages travel as single lines of JSON text:
//!
//! ```text
//! {"op":"insert","database":"app","collection":"users","document":{"name":"a"}}
//! {"status":"ok","value":{"_id":"...","name":"a"}}
//! {"status":"error","kind":"NotFound","message":"document not found: x"}
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::ServerError;
use elisa_common::ErrorKind;
use elisa_document::{Document, DocumentId, Filter, IndexType, Query, Schema, Update};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Sent when a response cannot itself be encoded.
const ENCODE_FAILURE: &str =
    r#"{"status":"error","kind":"Internal","message":"failed to encode response"}"#;

// =============================================================================
// Request
// =============================================================================

/// A single core operation addressed to a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Insert {
        database: String,
        collection: String,
        document: Document,
    },
    InsertMany {
        database: String,
        collection: String,
        documents: Vec<Document>,
    },
    Get {
        database: String,
        collection: String,
        id: DocumentId,
    },
    Update {
        database: String,
        collection: String,
        id: DocumentId,
        update: Update,
    },
    Remove {
        database: String,
        collection: String,
        id: DocumentId,
    },
    Find {
        database: String,
        collection: String,
        #[serde(default)]
        query: Query,
    },
    Count {
        database: String,
        collection: String,
        #[serde(default)]
        filter: Option<Filter>,
    },
    Explain {
        database: String,
        collection: String,
        #[serde(default)]
        query: Query,
    },
    /// Materialize a collection, optionally declaring its schema.
    Collection {
        database: String,
        collection: String,
        #[serde(default)]
        schema: Option<Schema>,
    },
    DropCollection {
        database: String,
        collection: String,
    },
    ListCollections {
        database: String,
    },
    CreateIndex {
        database: String,
        collection: String,
        field: String,
        index_type: IndexType,
    },
    DropIndex {
        database: String,
        collection: String,
        field: String,
    },
}

impl Request {
    /// Name of the targeted database.
    pub fn database(&self) -> &str {
        match self {
            Self::Insert { database, .. }
            | Self::InsertMany { database, .. }
            | Self::Get { database, .. }
            | Self::Update { database, .. }
            | Self::Remove { database, .. }
            | Self::Find { database, .. }
            | Self::Count { database, .. }
            | Self::Explain { database, .. }
            | Self::Collection { database, .. }
            | Self::DropCollection { database, .. }
            | Self::ListCollections { database }
            | Self::CreateIndex { database, .. }
            | Self::DropIndex { database, .. } => database,
        }
    }

    /// Wire name of the operation.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::InsertMany { .. } => "insert_many",
            Self::Get { .. } => "get",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::Find { .. } => "find",
            Self::Count { .. } => "count",
            Self::Explain { .. } => "explain",
            Self::Collection { .. } => "collection",
            Self::DropCollection { .. } => "drop_collection",
            Self::ListCollections { .. } => "list_collections",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
        }
    }

    /// Whether the operation may change stored state.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Self::Get { .. }
                | Self::Find { .. }
                | Self::Count { .. }
                | Self::Explain { .. }
                | Self::ListCollections { .. }
        )
    }
}

// =============================================================================
// Response
// =============================================================================

/// Outcome of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { value: JsonValue },
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn ok(value: JsonValue) -> Self {
        Self::Ok { value }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(err: &ServerError) -> Self {
        Self::error(err.kind(), err.to_string())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn value(&self) -> Option<&JsonValue> {
        match self {
            Self::Ok { value } => Some(value),
            Self::Error { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    pub fn into_result(self) -> Result<JsonValue, (ErrorKind, String)> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Error { kind, message } => Err((kind, message)),
        }
    }
}

impl From<Result<JsonValue, ServerError>> for Response {
    fn from(result: Result<JsonValue, ServerError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(err) => Self::from_error(&err),
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Parse one line of JSON text into a request.
pub fn decode_request(line: &str) -> Result<Request, ServerError> {
    serde_json::from_str(line.trim()).map_err(|e| ServerError::MalformedRequest(e.to_string()))
}

/// Render a request as one line of JSON text.
pub fn encode_request(request: &Request) -> Result<String, ServerError> {
    serde_json::to_string(request).map_err(|e| ServerError::Internal(e.to_string()))
}

/// Render a response as one line of JSON text.
pub fn encode_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| ENCODE_FAILURE.to_string())
}

/// Parse one line of JSON text into a response.
pub fn decode_response(line: &str) -> Result<Response, ServerError> {
    serde_json::from_str(line.trim()).map_err(|e| ServerError::MalformedRequest(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
