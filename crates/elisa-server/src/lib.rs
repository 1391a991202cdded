//! Elisa Server - Session Layer
//!
//! Hosts Elisa databases for remote clients. Requests arrive as JSON lines,
//! are decoded into protocol messages, dispatched into the document engine
//! on blocking workers, and answered with a discriminated success or error
//! response. Socket transport is left to the embedding process.
//!
//! Key Features:
//! - Line-oriented JSON request/response protocol
//! - Bounded connection admission
//! - Error kinds carried on every failure response
//! - Cancellation-safe execution of core calls
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;

pub use connection::{Connection, ConnectionStats};
pub use error::ServerError;
pub use protocol::{decode_request, decode_response, encode_request, encode_response, Request, Response};
pub use server::Server;
