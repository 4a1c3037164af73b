//! Local storage for content records and run history.
//!
//! - [`traits::LocalStore`]: the interface the orchestrator persists through
//! - [`memory::InMemoryStore`]: DashMap-backed implementation

pub mod traits;
pub mod memory;
