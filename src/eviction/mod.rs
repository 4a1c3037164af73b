//! Eviction policy for stored content.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  scoring.rs   - Retention scoring + victim selection         │
//! │  └─ EvictionWeights: recency / usage / size knobs            │
//! │  └─ EvictionPolicy: priority + recency + usage - size        │
//! │  └─ EvictionPlan: ordered victims + bytes they free          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Score
//!
//! `score = priority_weight + recency_bonus + usage_bonus - size_penalty`
//!
//! The priority term is spaced wider than the other three terms can move a
//! score, so priority always dominates. Lowest score is evicted first.
//!
//! CRITICAL content is only considered once every other candidate has been
//! taken, only when nothing is protected, and the plan is flagged when it
//! happens. The policy never deletes anything itself: the orchestrator
//! removes the victims and reports them to the budget tracker.

pub mod scoring;

pub use scoring::{EvictionPlan, EvictionPolicy, EvictionWeights, VictimSelection};
