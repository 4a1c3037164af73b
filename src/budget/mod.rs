//! Storage budget accounting.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Budget Module                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  tracker.rs   - StorageBudgetTracker                         │
//! │  └─ BudgetLimits: global ceiling + per-category ceilings     │
//! │  └─ reserve / commit / release / record_removal              │
//! │  └─ Reservation: single-use token for a pending fetch        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  pressure.rs  - BudgetPressure: fill ratio → level           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tracker is the only holder of `used_bytes`. Every mutation goes
//! through one of its four operations, each taken under the same lock.

pub mod tracker;
pub mod pressure;

pub use tracker::{
    BudgetLimits, BudgetSnapshot, CategoryShortfall, InsufficientSpace, Reservation,
    StorageBudgetTracker,
};
pub use pressure::BudgetPressure;
