//! Shared test scaffolding: isolated database contexts, record fixtures,
//! and assertion macros used across the workspace's test suites.

pub mod context;
pub mod fixtures;
pub mod generators;
mod macros;

pub use context::TestDb;

/// Convenient re-exports for test modules.
pub mod prelude {
    pub use crate::context::TestDb;
    pub use crate::fixtures::{all_columns, patch, seeded_records, sorted_rows};
    pub use crate::generators::{small_key, small_value, update_patch};
}
