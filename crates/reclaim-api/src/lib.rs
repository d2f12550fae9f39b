//! Reclaim API Library
//!
//! HTTP surface for the receipt pipeline: ingest, receipt read/delete,
//! warranty checks, the internal reaper endpoint and the OpenAPI document.

mod api_doc;
mod handlers;

pub mod auth;
pub mod constants;
pub mod error;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
