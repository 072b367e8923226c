//! Database seeding functionality
//!
//! Populates catalog tables that must exist before the API can serve requests.

pub mod connector;

pub use connector::seed_connectors;
