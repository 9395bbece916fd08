//! # Wandr Backend
//!
//! Turns free-text travel requests into structured trip parameters.
//!
//! A client submits a command such as "two days in Manali under 10k" and
//! gets a task id back immediately. A background worker asks the language
//! model for the trip details and stores the outcome, which the client then
//! polls for.
//!
//! ## Task Flow
//! 1. Receive the command via `POST /api/v1/process-text-command`
//! 2. Create a `pending` task record and schedule the extraction
//! 3. Call the model, normalize its answer, store `completed` or `failed`
//! 4. Serve the record from `GET /api/v1/get-command-result/{task_id}`
//!
//! ## Modules
//! - `api`: HTTP routes, handlers and error responses
//! - `extraction`: prompt construction and answer normalization
//! - `llm`: upstream model client (Gemini)
//! - `task`: task records, stores and the background executor

pub mod api;
pub mod config;
pub mod extraction;
pub mod llm;
pub mod task;
pub mod util;

pub use config::Config;
