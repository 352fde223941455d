//! Off-thread subtree evaluation.
//!
//! The pool owns `W` worker threads. Each worker is configured once with
//! the crop catalog blob and the starting conditions, holds its own
//! private canonical cache, and receives work over a per-worker channel.
//! Calendars cross the thread boundary in the canonical wire form, so a
//! worker exercises exactly the same serialization contract an
//! out-of-process worker would.
//!
//! Two dispatch modes:
//!
//! - **Deep**: one frontier node per worker; the worker drains the whole
//!   subtree locally and returns its single best leaf. Nodes go out in
//!   longest-processing-time-first order so the heavy subtrees are not the
//!   last ones still running.
//! - **Shallow**: the frontier is sliced into `W` contiguous chunks and
//!   each worker expands its chunk by exactly one level; outputs keep
//!   their input grouping so the merged frontier is deterministic.
//!
//! Worker caches are never merged; duplicate work across workers is the
//! accepted price of parallelism.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use harvest_core::{wire, Calendar, CropCatalog, Day, PlanError, TileReleasePolicy, Tiles};
use harvest_econ::PlantGates;
use harvest_search::{Bfs, BfsContext, CanonCache, FrontierNode, LoadMonitor};

use crate::monitor::Yielder;

/// Everything a worker needs, installed once at pool construction.
#[derive(Clone, Debug)]
pub struct PoolSetup {
    /// Crop catalog in its configure wire form.
    pub catalog_blob: String,
    /// Shortlist crop names, discovery order.
    pub shortlist: Vec<String>,
    pub season_len: Day,
    pub payday_delay: Day,
    pub policy: TileReleasePolicy,
    pub multi_crop: bool,
    pub use_cache: bool,
    pub cache_sig_digits: u32,
    pub starting_gold: Decimal,
    pub starting_tiles: Tiles,
    pub gold_floor_fraction: f64,
    pub tile_floor_fraction: f64,
}

/// A frontier node in wire form.
#[derive(Clone, Debug)]
pub struct WireNode {
    pub day: Day,
    pub blob: String,
}

enum WorkerJob {
    Subtree { node: WireNode },
    Level { chunk: usize, nodes: Vec<WireNode> },
    Shutdown,
}

/// Outputs of one input node in a shallow dispatch.
struct LevelGroup {
    input_index: usize,
    nodes: Vec<WireNode>,
    leaf: Option<(Decimal, String)>,
}

enum WorkerReply {
    Subtree {
        worker: usize,
        best: Option<(Decimal, String)>,
        ops: u64,
        cache_hits: u64,
    },
    Level {
        worker: usize,
        chunk: usize,
        groups: Vec<LevelGroup>,
        ops: u64,
        cache_hits: u64,
    },
    Fault {
        worker: usize,
        message: String,
    },
}

/// Aggregate counters for one dispatcher call.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolStats {
    pub worker_ops: u64,
    pub worker_cache_hits: u64,
    pub subtrees: u64,
    pub faults: u64,
}

/// Result of a deep dispatch.
#[derive(Debug)]
pub struct DeepOutcome {
    pub best: Option<(Decimal, Calendar)>,
    pub stats: PoolStats,
    pub aborted: bool,
}

/// Result of a shallow dispatch: the next frontier plus finished leaves.
pub struct LevelOutcome {
    pub nodes: Vec<FrontierNode>,
    pub leaves: Vec<(Decimal, Calendar)>,
    pub stats: PoolStats,
    pub aborted: bool,
}

pub struct WorkerPool {
    job_txs: Vec<Sender<WorkerJob>>,
    reply_rx: Receiver<WorkerReply>,
    handles: Vec<JoinHandle<()>>,
    catalog: CropCatalog,
    setup: Arc<PoolSetup>,
    monitor: Arc<dyn LoadMonitor>,
}

const REPLY_TIMEOUT: Duration = Duration::from_secs(120);

impl WorkerPool {
    /// Spawn `size` workers and install the setup in each.
    pub fn new(
        setup: PoolSetup,
        size: usize,
        monitor: Arc<dyn LoadMonitor>,
    ) -> Result<Self, PlanError> {
        let catalog = CropCatalog::parse_blob(&setup.catalog_blob)?;
        let setup = Arc::new(setup);
        let size = size.max(1);
        let (reply_tx, reply_rx) = mpsc::channel();
        let mut job_txs = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for worker in 0..size {
            let (job_tx, job_rx) = mpsc::channel();
            let setup = Arc::clone(&setup);
            let reply_tx = reply_tx.clone();
            let monitor = Arc::clone(&monitor);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("plan-worker-{worker}"))
                    .spawn(move || worker_main(worker, setup, job_rx, reply_tx, monitor))
                    .map_err(|e| PlanError::WorkerFault(format!("spawn failed: {e}")))?,
            );
            job_txs.push(job_tx);
        }
        info!(target: "plan.pool", size, "worker pool ready");
        Ok(Self {
            job_txs,
            reply_rx,
            handles,
            catalog,
            setup,
            monitor,
        })
    }

    pub fn size(&self) -> usize {
        self.job_txs.len()
    }

    /// Deep dispatch: hand every frontier node to a worker as a whole
    /// subtree, heaviest first, one per free worker.
    pub fn run_deep(
        &mut self,
        frontier: Vec<FrontierNode>,
        yielder: &mut Yielder,
    ) -> Result<DeepOutcome, PlanError> {
        let mut nodes: Vec<(SubtreeCost, FrontierNode)> = frontier
            .into_iter()
            .map(|n| (subtree_cost(&n), n))
            .collect();
        // LPT: heavier subtrees first; the stable sort keeps FIFO order
        // between equals.
        nodes.sort_by(|a, b| b.0.cmp(&a.0));

        let mut merge = ReplyMerge::new(self.size(), &self.catalog, self.setup.as_ref());
        let mut idle: VecDeque<usize> = (0..self.size()).collect();
        let mut outstanding = 0usize;
        for (_, node) in nodes {
            if self.monitor.aborted() {
                break;
            }
            let worker = loop {
                if let Some(w) = idle.pop_front() {
                    break w;
                }
                let reply = self.recv_reply()?;
                idle.push_back(merge.absorb(reply)?);
                outstanding -= 1;
            };
            yielder.maybe_yield();
            let blob = wire::to_wire(&node.calendar, 1);
            let job = WorkerJob::Subtree {
                node: WireNode {
                    day: node.day,
                    blob,
                },
            };
            if self.job_txs[worker].send(job).is_err() {
                merge.fault(worker, "job channel closed");
                continue;
            }
            outstanding += 1;
        }
        while outstanding > 0 {
            let reply = self.recv_reply()?;
            merge.absorb(reply)?;
            outstanding -= 1;
            yielder.maybe_yield();
        }
        merge.check_total_failure()?;
        debug!(
            target: "plan.pool",
            subtrees = merge.stats.subtrees,
            worker_ops = merge.stats.worker_ops,
            faults = merge.stats.faults,
            "deep dispatch complete"
        );
        Ok(DeepOutcome {
            best: merge.best,
            stats: merge.stats,
            aborted: self.monitor.aborted(),
        })
    }

    /// Shallow dispatch: expand the whole frontier by exactly one level,
    /// one contiguous chunk per worker.
    pub fn run_level(
        &mut self,
        frontier: Vec<FrontierNode>,
        yielder: &mut Yielder,
    ) -> Result<LevelOutcome, PlanError> {
        let size = self.size();
        let chunk_len = frontier.len().div_ceil(size).max(1);
        let mut merge = ReplyMerge::new(size, &self.catalog, self.setup.as_ref());
        let mut outstanding = 0usize;
        for (chunk, nodes) in frontier.chunks(chunk_len).enumerate() {
            let wired: Vec<WireNode> = nodes
                .iter()
                .map(|n| WireNode {
                    day: n.day,
                    blob: wire::to_wire(&n.calendar, 1),
                })
                .collect();
            yielder.maybe_yield();
            if self.job_txs[chunk].send(WorkerJob::Level {
                chunk,
                nodes: wired,
            })
            .is_err()
            {
                merge.fault(chunk, "job channel closed");
                continue;
            }
            outstanding += 1;
        }
        while outstanding > 0 {
            let reply = self.recv_reply()?;
            merge.absorb(reply)?;
            outstanding -= 1;
            yielder.maybe_yield();
        }
        merge.check_total_failure()?;
        let (nodes, leaves) = merge.into_level_results(yielder)?;
        debug!(
            target: "plan.pool",
            inputs = merge.stats.worker_ops,
            outputs = nodes.len(),
            leaves = leaves.len(),
            "level dispatch complete"
        );
        Ok(LevelOutcome {
            nodes,
            leaves,
            stats: merge.stats,
            aborted: self.monitor.aborted(),
        })
    }

    fn recv_reply(&self) -> Result<WorkerReply, PlanError> {
        self.reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|e| PlanError::WorkerFault(format!("worker reply lost: {e}")))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for tx in &self.job_txs {
            let _ = tx.send(WorkerJob::Shutdown);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Two-level cost estimate for LPT ordering: how many decision days are
/// still ahead, then how early they sit in the season (earlier days head
/// larger subtrees).
type SubtreeCost = (u64, u64);

fn subtree_cost(node: &FrontierNode) -> SubtreeCost {
    let season_len = node.calendar.season_len();
    let mut count = 0u64;
    let mut weight = 0u64;
    for d in node.day..=season_len {
        if node.calendar.day(d).day_of_interest {
            count += 1;
            weight += u64::from(season_len - d + 1);
        }
    }
    (count, weight)
}

/// Reply aggregation shared by both dispatch modes.
struct ReplyMerge<'a> {
    best: Option<(Decimal, Calendar)>,
    stats: PoolStats,
    groups: Vec<(usize, Vec<LevelGroup>)>,
    faulted: Vec<bool>,
    successes: u64,
    catalog: &'a CropCatalog,
    setup: &'a PoolSetup,
}

impl<'a> ReplyMerge<'a> {
    fn new(size: usize, catalog: &'a CropCatalog, setup: &'a PoolSetup) -> Self {
        Self {
            best: None,
            stats: PoolStats::default(),
            groups: Vec::new(),
            faulted: vec![false; size],
            successes: 0,
            catalog,
            setup,
        }
    }

    fn fault(&mut self, worker: usize, message: &str) {
        warn!(target: "plan.pool", worker, reason = message, "worker fault, contribution dropped");
        self.stats.faults += 1;
        if let Some(slot) = self.faulted.get_mut(worker) {
            *slot = true;
        }
    }

    fn offer(&mut self, wealth: Decimal, calendar: Calendar) {
        // First seen wins on equal wealth, in reply-completion order.
        if self.best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
            self.best = Some((wealth, calendar));
        }
    }

    /// Fold one reply in; returns the worker index, now idle again.
    fn absorb(&mut self, reply: WorkerReply) -> Result<usize, PlanError> {
        match reply {
            WorkerReply::Subtree {
                worker,
                best,
                ops,
                cache_hits,
            } => {
                self.stats.worker_ops += ops;
                self.stats.worker_cache_hits += cache_hits;
                self.stats.subtrees += 1;
                self.successes += 1;
                if let Some((wealth, blob)) = best {
                    let calendar = wire::from_wire(
                        &blob,
                        self.catalog,
                        self.setup.payday_delay,
                        self.setup.policy,
                    )?;
                    self.offer(wealth, calendar);
                }
                Ok(worker)
            }
            WorkerReply::Level {
                worker,
                chunk,
                groups,
                ops,
                cache_hits,
            } => {
                self.stats.worker_ops += ops;
                self.stats.worker_cache_hits += cache_hits;
                self.successes += 1;
                self.groups.push((chunk, groups));
                Ok(worker)
            }
            WorkerReply::Fault { worker, message } => {
                self.fault(worker, &message);
                Ok(worker)
            }
        }
    }

    fn check_total_failure(&self) -> Result<(), PlanError> {
        if self.successes == 0 && self.faulted.iter().any(|f| *f) {
            return Err(PlanError::WorkerFault(
                "every worker faulted on the same dispatch".into(),
            ));
        }
        Ok(())
    }

    /// Deserialize the level outputs in `(chunk, input)` order so merging
    /// is deterministic regardless of reply arrival.
    fn into_level_results(
        &mut self,
        yielder: &mut Yielder,
    ) -> Result<(Vec<FrontierNode>, Vec<(Decimal, Calendar)>), PlanError> {
        self.groups.sort_by_key(|(chunk, _)| *chunk);
        let mut nodes = Vec::new();
        let mut leaves = Vec::new();
        for (_, groups) in &mut self.groups {
            groups.sort_by_key(|g| g.input_index);
            for group in groups.iter() {
                for out in &group.nodes {
                    let calendar = wire::from_wire(
                        &out.blob,
                        self.catalog,
                        self.setup.payday_delay,
                        self.setup.policy,
                    )?;
                    nodes.push(FrontierNode {
                        day: out.day,
                        calendar,
                    });
                }
                if let Some((wealth, blob)) = &group.leaf {
                    let calendar = wire::from_wire(
                        blob,
                        self.catalog,
                        self.setup.payday_delay,
                        self.setup.policy,
                    )?;
                    leaves.push((*wealth, calendar));
                }
                yielder.maybe_yield();
            }
        }
        Ok((nodes, leaves))
    }
}

/// Per-worker state living on the worker thread: the parsed catalog, the
/// resolved shortlist context and the private cache.
struct WorkerState {
    ctx: BfsContext,
    catalog: CropCatalog,
    cache: CanonCache,
    monitor: Arc<dyn LoadMonitor>,
}

fn build_worker_state(
    setup: &PoolSetup,
    monitor: Arc<dyn LoadMonitor>,
) -> Result<WorkerState, PlanError> {
    let catalog = CropCatalog::parse_blob(&setup.catalog_blob)?;
    let shortlist = setup
        .shortlist
        .iter()
        .map(|name| {
            catalog
                .get(name)
                .cloned()
                .ok_or_else(|| PlanError::InvalidInput(format!("unknown shortlist crop {name:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cheapest = catalog
        .cheapest_enabled_buy()
        .ok_or_else(|| PlanError::InvalidInput("no enabled crops in worker catalog".into()))?;
    let ctx = BfsContext {
        gates: PlantGates::new(
            cheapest,
            setup.starting_gold,
            setup.starting_tiles,
            setup.gold_floor_fraction,
            setup.tile_floor_fraction,
        ),
        shortlist,
        season_len: setup.season_len,
        payday_delay: setup.payday_delay,
        policy: setup.policy,
        multi_crop: setup.multi_crop,
        use_cache: setup.use_cache,
        cache_sig_digits: setup.cache_sig_digits,
    };
    Ok(WorkerState {
        ctx,
        catalog,
        cache: CanonCache::new(),
        monitor,
    })
}

fn worker_main(
    worker: usize,
    setup: Arc<PoolSetup>,
    jobs: Receiver<WorkerJob>,
    replies: Sender<WorkerReply>,
    monitor: Arc<dyn LoadMonitor>,
) {
    let mut state = match build_worker_state(&setup, monitor) {
        Ok(state) => state,
        Err(e) => {
            // Configuration is broken; answer every job with the fault.
            while let Ok(job) = jobs.recv() {
                if matches!(job, WorkerJob::Shutdown) {
                    break;
                }
                let _ = replies.send(WorkerReply::Fault {
                    worker,
                    message: e.to_string(),
                });
            }
            return;
        }
    };
    while let Ok(job) = jobs.recv() {
        let reply = match job {
            WorkerJob::Shutdown => break,
            WorkerJob::Subtree { node } => run_subtree(worker, &mut state, &node),
            WorkerJob::Level { chunk, nodes } => run_level_chunk(worker, &mut state, chunk, &nodes),
        };
        let reply = reply.unwrap_or_else(|e| WorkerReply::Fault {
            worker,
            message: e.to_string(),
        });
        if replies.send(reply).is_err() {
            break; // pool is gone
        }
    }
}

fn run_subtree(
    worker: usize,
    state: &mut WorkerState,
    node: &WireNode,
) -> Result<WorkerReply, PlanError> {
    let calendar = wire::from_wire(
        &node.blob,
        &state.catalog,
        state.ctx.payday_delay,
        state.ctx.policy,
    )?;
    let hits_before = state.cache.hits();
    let mut bfs = Bfs::new(&state.ctx, state.monitor.as_ref());
    bfs.install_cache(std::mem::take(&mut state.cache));
    bfs.seed(FrontierNode {
        day: node.day,
        calendar,
    });
    bfs.run_to_completion();
    let stats = bfs.stats();
    let best = bfs
        .best()
        .map(|(wealth, cal)| (wealth, wire::to_wire(cal, 1)));
    state.cache = bfs.take_cache();
    Ok(WorkerReply::Subtree {
        worker,
        best,
        ops: stats.ops,
        cache_hits: state.cache.hits() - hits_before,
    })
}

fn run_level_chunk(
    worker: usize,
    state: &mut WorkerState,
    chunk: usize,
    nodes: &[WireNode],
) -> Result<WorkerReply, PlanError> {
    let mut groups = Vec::with_capacity(nodes.len());
    let mut ops = 0u64;
    let hits_before = state.cache.hits();
    for (input_index, wired) in nodes.iter().enumerate() {
        if state.monitor.aborted() {
            break;
        }
        let calendar = wire::from_wire(
            &wired.blob,
            &state.catalog,
            state.ctx.payday_delay,
            state.ctx.policy,
        )?;
        let mut bfs = Bfs::new(&state.ctx, state.monitor.as_ref());
        bfs.install_cache(std::mem::take(&mut state.cache));
        bfs.seed(FrontierNode {
            day: wired.day,
            calendar,
        });
        // Exactly one expansion: the seeded node's children become the
        // group's output nodes, a finished branch its leaf.
        let _ = bfs.step();
        ops += 1;
        let out_nodes = bfs
            .take_frontier()
            .into_iter()
            .map(|n| WireNode {
                day: n.day,
                blob: wire::to_wire(&n.calendar, 1),
            })
            .collect();
        let leaf = bfs
            .best()
            .map(|(wealth, cal)| (wealth, wire::to_wire(cal, 1)));
        state.cache = bfs.take_cache();
        groups.push(LevelGroup {
            input_index,
            nodes: out_nodes,
            leaf,
        });
    }
    Ok(WorkerReply::Level {
        worker,
        chunk,
        groups,
        ops,
        cache_hits: state.cache.hits() - hits_before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::Crop;
    use harvest_search::NoopMonitor;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn crop(name: &str, maturity: Day, regrow: Option<Day>, buy: i64, sell: i64) -> Crop {
        Crop {
            name: name.into(),
            days_to_maturity: maturity,
            regrow,
            buy_price: dec(buy),
            sell_price: dec(sell),
            enabled: true,
            season: None,
            second_season: None,
        }
    }

    fn catalog() -> CropCatalog {
        CropCatalog::new(vec![
            crop("Redberry", 6, None, 40, 90),
            crop("Blueberry", 6, None, 40, 90),
        ])
        .unwrap()
    }

    fn setup(shortlist: Vec<&str>) -> PoolSetup {
        PoolSetup {
            catalog_blob: catalog().to_blob(),
            shortlist: shortlist.into_iter().map(String::from).collect(),
            season_len: 28,
            payday_delay: 0,
            policy: TileReleasePolicy::OnPayday,
            multi_crop: true,
            use_cache: true,
            cache_sig_digits: 2,
            starting_gold: dec(800),
            starting_tiles: Tiles::Finite(10),
            gold_floor_fraction: 0.5,
            tile_floor_fraction: 0.07,
        }
    }

    fn root_frontier() -> Vec<FrontierNode> {
        vec![FrontierNode {
            day: 1,
            calendar: Calendar::new(28, dec(800), Tiles::Finite(10)),
        }]
    }

    fn sequential_best(setup: &PoolSetup) -> Decimal {
        let state = build_worker_state(setup, Arc::new(NoopMonitor)).unwrap();
        let monitor = NoopMonitor;
        let mut bfs = Bfs::new(&state.ctx, &monitor);
        bfs.seed(root_frontier().remove(0));
        bfs.run_to_completion();
        bfs.best().map(|(w, _)| w).unwrap()
    }

    #[test]
    fn deep_dispatch_matches_sequential_search() {
        let s = setup(vec!["Redberry", "Blueberry"]);
        let expected = sequential_best(&s);
        let mut pool = WorkerPool::new(s, 2, Arc::new(NoopMonitor)).unwrap();
        let mut yielder = Yielder::default();
        let out = pool.run_deep(root_frontier(), &mut yielder).unwrap();
        let (wealth, cal) = out.best.unwrap();
        assert_eq!(wealth, expected);
        assert!(cal.validate(0, TileReleasePolicy::OnPayday).is_ok());
        assert!(!out.aborted);
        assert_eq!(out.stats.subtrees, 1);
        assert!(out.stats.worker_ops > 0);
    }

    #[test]
    fn level_dispatch_expands_exactly_one_level() {
        let s = setup(vec!["Redberry", "Blueberry"]);
        let mut pool = WorkerPool::new(s, 2, Arc::new(NoopMonitor)).unwrap();
        let mut yielder = Yielder::default();
        let out = pool.run_level(root_frontier(), &mut yielder).unwrap();
        // The root expands into one successor per shortlist crop, none of
        // which are finished branches yet.
        assert_eq!(out.nodes.len(), 2);
        assert!(out.leaves.is_empty());
        assert!(out.nodes.iter().all(|n| n.day == 7));
        // Input grouping: successors arrive in shortlist order.
        let first = &out.nodes[0].calendar.day(1).plants[0];
        assert_eq!(first.crop.name, "Redberry");
    }

    #[test]
    fn level_dispatch_round_trips_the_frontier() {
        let s = setup(vec!["Redberry", "Blueberry"]);
        let expected = sequential_best(&s);
        let mut pool = WorkerPool::new(s, 2, Arc::new(NoopMonitor)).unwrap();
        let mut yielder = Yielder::default();
        let mut frontier = root_frontier();
        let mut best: Option<Decimal> = None;
        while !frontier.is_empty() {
            let out = pool.run_level(frontier, &mut yielder).unwrap();
            for (wealth, _) in out.leaves {
                if best.map(|b| wealth > b).unwrap_or(true) {
                    best = Some(wealth);
                }
            }
            frontier = out.nodes;
        }
        assert_eq!(best.unwrap(), expected);
    }

    #[test]
    fn unknown_shortlist_crop_faults_every_worker() {
        let s = PoolSetup {
            shortlist: vec!["Nonesuch".into()],
            ..setup(vec!["Redberry"])
        };
        let mut pool = WorkerPool::new(s, 2, Arc::new(NoopMonitor)).unwrap();
        let mut yielder = Yielder::default();
        let err = pool.run_deep(root_frontier(), &mut yielder).unwrap_err();
        assert!(matches!(err, PlanError::WorkerFault(_)));
    }

    #[test]
    fn lpt_orders_by_interest_days_then_earliness() {
        let mut light = Calendar::new(28, dec(800), Tiles::Finite(10));
        light.day_mut(20).day_of_interest = true;
        let mut heavy = light.clone();
        heavy.day_mut(5).day_of_interest = true;
        let light_node = FrontierNode {
            day: 2,
            calendar: light,
        };
        let heavy_node = FrontierNode {
            day: 2,
            calendar: heavy,
        };
        assert!(subtree_cost(&heavy_node) > subtree_cost(&light_node));

        // Same count, earlier day wins on the secondary key.
        let mut early = Calendar::new(28, dec(800), Tiles::Finite(10));
        early.day_mut(5).day_of_interest = true;
        let mut late = Calendar::new(28, dec(800), Tiles::Finite(10));
        late.day_mut(20).day_of_interest = true;
        let early_node = FrontierNode {
            day: 2,
            calendar: early,
        };
        let late_node = FrontierNode {
            day: 2,
            calendar: late,
        };
        assert_eq!(subtree_cost(&early_node).0, subtree_cost(&late_node).0);
        assert!(subtree_cost(&early_node).1 > subtree_cost(&late_node).1);
    }

    #[test]
    fn worker_caches_persist_across_dispatches() {
        let s = setup(vec!["Redberry", "Blueberry"]);
        let mut pool = WorkerPool::new(s, 1, Arc::new(NoopMonitor)).unwrap();
        let mut yielder = Yielder::default();
        let first = pool.run_deep(root_frontier(), &mut yielder).unwrap();
        assert!(first.best.is_some());
        // The identical subtree again: the worker's private cache
        // short-circuits it at the root, so the reply carries no leaf.
        let second = pool.run_deep(root_frontier(), &mut yielder).unwrap();
        assert!(second.best.is_none());
        assert!(second.stats.worker_cache_hits >= 1);
        assert_eq!(second.stats.worker_ops, 1);
    }

    #[test]
    fn deep_dispatch_handles_more_nodes_than_workers() {
        let s = setup(vec!["Redberry", "Blueberry"]);
        let mut pool = WorkerPool::new(s, 2, Arc::new(NoopMonitor)).unwrap();
        let mut yielder = Yielder::default();
        // Six identical roots: back-pressure forces reuse of both workers.
        let frontier: Vec<FrontierNode> = (0..6).map(|_| root_frontier().remove(0)).collect();
        let out = pool.run_deep(frontier, &mut yielder).unwrap();
        assert_eq!(out.stats.subtrees, 6);
        assert!(out.best.is_some());
    }
}
