#![deny(warnings)]

//! Schedule search for Harvest Planner.
//!
//! Two engines share the domain crates below: a fast per-tile greedy
//! simulator that seeds and lower-bounds the real search, and a
//! memory-bounded breadth-first simulator over the game-state tree, gated
//! by a canonicalizing cache and adaptive pruning.

pub mod bfs;
pub mod cache;
pub mod greedy;

pub use bfs::{Bfs, BfsContext, BfsStats, FrontierNode, LoadMonitor, NoopMonitor};
pub use cache::CanonCache;
pub use greedy::{run_greedy, GreedyOutcome, GreedySetup};
