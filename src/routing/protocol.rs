//! Routing Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) of the public
//! key-value surface and the internode join call.
//!
//! These structures are serialized via JSON and sent over HTTP; a node that
//! does not own a key answers with a 307 redirect to the owner's API address
//! rather than proxying.

use serde::{Deserialize, Serialize};

use crate::cluster::NodeDescriptor;

// --- API Endpoints ---

/// Public endpoint for client write requests.
pub const ENDPOINT_PUT: &str = "/put";
/// Public endpoint for client read requests (`/get/:key`).
pub const ENDPOINT_GET: &str = "/get";
/// Public endpoint for client delete requests (`/delete/:key`).
pub const ENDPOINT_DELETE: &str = "/delete";
/// Internode endpoint a new replica calls on an existing member (`/join?addr=`).
pub const ENDPOINT_JOIN: &str = "/join";
/// Diagnostic endpoint listing the current leader descriptors and readiness.
pub const ENDPOINT_LEADERS: &str = "/leaders";

// --- Data Transfer Objects ---

/// Standard client request for writing data.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    /// The data key.
    pub key: String,
    /// The value to store.
    pub value: String,
}

/// Standard acknowledgment for write and delete operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
}

/// Standard response for data retrieval.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    /// The value, if found. `None` indicates the key does not exist.
    pub value: Option<String>,
}

/// Query parameters of the internode join call.
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    /// Consensus bind address of the joining replica.
    pub addr: String,
}

/// Error payload returned alongside non-2xx statuses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response format for the leader listing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeadersResponse {
    /// Cluster readiness code: `OK`, `ERROR`, or `NOT_READY`.
    pub readiness: String,
    pub leaders: Vec<NodeDescriptor>,
}
