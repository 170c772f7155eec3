//! Workflow pipelines orchestrating the CA services.

pub mod hierarchy;

pub use hierarchy::{CaHierarchy, HierarchyAudit};
