//! Content workflow services and the collaborator seams they depend on.

pub mod audit;
pub mod error;
pub mod notifications;
pub mod publishing;
pub mod repos;
pub mod scheduled;
pub mod scope;
