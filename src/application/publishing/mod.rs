//! Publish state machine and the content-service write workflow.

mod commands;
mod queries;
mod scheduled;
mod service;
mod strategy;
mod structure;
pub mod types;

pub use service::ContentService;
pub use strategy::{ContentLookup, PublishStrategy, is_path_published, is_path_publishable};
pub use types::{
    ContentServiceError, OperationOutcome, OperationResult, PublishOutcome, PublishResult,
};
