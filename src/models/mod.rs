//! Data models for the OAI-PMH explore service.
//!
//! Registries, metadata formats, templates and records are written by the
//! harvester and only read here. Saved queries are the one thing this service
//! mutates, and only through their data-source list.

mod query;
mod record;
mod registry;
mod result;

pub use query::*;
pub use record::*;
pub use registry::*;
pub use result::*;
