//! HTTP API for the Wandr backend.
//!
//! ## Endpoints
//!
//! All paths are under `/api/v1`.
//!
//! - `POST /process-text-command` - Submit a travel command for extraction
//! - `GET /get-command-result/{task_id}` - Get task status and result
//! - `GET /health` - Health check
//! - `GET /status` - Service status
//! - `GET /config` - Non-sensitive configuration
//! - `GET|POST /test` - Echo request details

pub mod error;
mod routes;
pub mod system;
pub mod tasks;
pub mod types;

pub use error::{ApiError, ErrorResponse};
pub use routes::{router, serve, AppState, API_PREFIX};
pub use types::*;
