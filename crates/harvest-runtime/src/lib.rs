#![deny(warnings)]

//! Runtime for Harvest Planner: the worker pool, resource monitoring and
//! the orchestrator that glues the greedy heuristic to the breadth-first
//! simulator.

pub mod monitor;
pub mod orchestrator;
pub mod pool;

pub use monitor::{
    default_memory_probe, AbortFlag, MemoryMonitor, MemoryProbe, Yielder,
};
pub use orchestrator::{
    ParallelismProbe, PlanOutcome, PlanRequest, Planner, RunStats, MEMORY_FAILURE_VALUE,
    SYNTHETIC_WALLET_GOLD,
};
pub use pool::{DeepOutcome, LevelOutcome, PoolSetup, PoolStats, WorkerPool};
