//! Published-content cache and publish workflow.
//!
//! Reads flow through [`cache::SourceArbitrator`], which reconciles a search
//! index, a structured document tree and the authoritative store into
//! identity-stable [`cache::PublishedNode`] values. Writes flow through
//! [`application::publishing::ContentService`], which owns the publish state
//! machine and raises tree changes for cache invalidation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
