//! The planning orchestrator.
//!
//! One query runs through a fixed pipeline: validate and normalize the
//! inputs, establish the greedy floor and the crop shortlist, expand the
//! game-state tree sequentially until the frontier is worth dispatching,
//! hand the remainder to the worker pool, and report the better of the
//! greedy and simulated schedules (ties favour greedy). A start day past 1
//! plans the shortened season and shifts the result into place; a memory
//! abort returns the `(-2, empty calendar)` sentinel with all search state
//! dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{info, warn};

use harvest_core::{Calendar, CropCatalog, Day, PlanError, PlannerOptions, Tiles};
use harvest_econ::{shortlist_cap, PlantGates};
use harvest_search::{Bfs, BfsContext, FrontierNode, GreedySetup, LoadMonitor};

use crate::monitor::{default_memory_probe, MemoryMonitor, MemoryProbe, Yielder};
use crate::pool::{PoolSetup, WorkerPool};

/// Synthetic wallet installed when the caller asks for unlimited gold.
/// The reported value is the wealth minus this stake.
pub const SYNTHETIC_WALLET_GOLD: i64 = 100_000_000;

/// Value reported when the memory monitor aborts a run.
pub const MEMORY_FAILURE_VALUE: i64 = -2;

/// Operations between memory samples.
const MONITOR_INTERVAL: u64 = 500;

/// Upper bound on pool size regardless of the parallelism probe.
const MAX_WORKERS: usize = 4;

/// Probe for available parallelism; `None` when the host cannot say.
pub type ParallelismProbe = Arc<dyn Fn() -> Option<usize> + Send + Sync>;

fn default_parallelism_probe() -> ParallelismProbe {
    Arc::new(|| std::thread::available_parallelism().ok().map(|n| n.get()))
}

/// One planning query.
#[derive(Clone, Debug)]
pub struct PlanRequest {
    pub season_len: Day,
    /// First plantable day, `1..season_len`.
    pub start_day: Day,
    /// Plantable tiles; zero or negative means unlimited.
    pub tiles: i64,
    /// Starting gold; zero or negative switches to the synthetic wallet
    /// and profit reporting.
    pub wallet: Decimal,
    pub catalog: CropCatalog,
}

/// Counters and context reported alongside a plan.
#[derive(Clone, Debug, Default)]
pub struct RunStats {
    pub greedy_wealth: Decimal,
    pub greedy_passes: usize,
    pub sim_wealth: Decimal,
    pub shortlist: Vec<String>,
    pub sequential_ops: u64,
    pub sequential_cache_hits: u64,
    pub worker_ops: u64,
    pub worker_cache_hits: u64,
    pub subtrees_dispatched: u64,
    pub levels_dispatched: u64,
    pub worker_faults: u64,
    pub workers: usize,
    pub peak_frontier: usize,
    pub elapsed: Duration,
    pub infinite_gold: bool,
    pub aborted: bool,
}

/// The planner's answer: the schedule value (wealth, or profit in
/// infinite-gold mode), the winning calendar, and the run counters.
#[derive(Clone, Debug)]
pub struct PlanOutcome {
    pub value: Decimal,
    pub calendar: Calendar,
    pub stats: RunStats,
}

enum DispatchMode {
    Sequential,
    Shallow,
    Deep,
}

/// The engine front door. Construction is cheap; every call to
/// [`Planner::plan`] runs with fresh search state.
pub struct Planner {
    options: PlannerOptions,
    memory_probe: MemoryProbe,
    parallelism_probe: ParallelismProbe,
    prefer_shallow: bool,
}

impl Planner {
    pub fn new(options: PlannerOptions) -> Self {
        Self {
            options,
            memory_probe: default_memory_probe(),
            parallelism_probe: default_parallelism_probe(),
            prefer_shallow: false,
        }
    }

    /// Replace the memory probe (tests, constrained hosts).
    pub fn with_memory_probe(mut self, probe: MemoryProbe) -> Self {
        self.memory_probe = probe;
        self
    }

    /// Replace the parallelism probe.
    pub fn with_parallelism_probe(mut self, probe: ParallelismProbe) -> Self {
        self.parallelism_probe = probe;
        self
    }

    /// Use shallow (level-at-a-time) dispatch instead of deep subtrees,
    /// for environments where subtree sizes are too uneven.
    pub fn prefer_shallow(mut self, yes: bool) -> Self {
        self.prefer_shallow = yes;
        self
    }

    fn worker_count(&self) -> usize {
        (self.parallelism_probe)()
            .unwrap_or(MAX_WORKERS)
            .clamp(1, MAX_WORKERS)
    }

    /// Run one query to completion.
    pub fn plan(&self, request: &PlanRequest) -> Result<PlanOutcome, PlanError> {
        let started = Instant::now();

        // Validation: no partial state on bad input.
        if request.season_len < 2 {
            return Err(PlanError::InvalidInput(format!(
                "season of {} days leaves nothing to plan",
                request.season_len
            )));
        }
        if request.start_day < 1 || request.start_day >= request.season_len {
            return Err(PlanError::InvalidInput(format!(
                "start day {} outside 1..{}",
                request.start_day, request.season_len
            )));
        }
        let enabled = request.catalog.enabled();
        if enabled.is_empty() {
            return Err(PlanError::InvalidInput("no enabled crops".into()));
        }

        // Normalization.
        let tiles = if request.tiles <= 0 {
            Tiles::Infinite
        } else {
            Tiles::Finite(request.tiles as u64)
        };
        let infinite_gold = request.wallet <= Decimal::ZERO;
        let wallet = if infinite_gold {
            Decimal::new(SYNTHETIC_WALLET_GOLD, 0)
        } else {
            request.wallet
        };
        let shift_days = request.start_day - 1;
        let season_len = request.season_len - shift_days;
        let delay = self.options.payday_delay;
        let policy = self.options.release_policy();

        let mut stats = RunStats {
            infinite_gold,
            workers: self.worker_count(),
            ..RunStats::default()
        };

        // Greedy floor and shortlist.
        let greedy = harvest_search::run_greedy(&GreedySetup {
            crops: enabled.clone(),
            season_len,
            wallet,
            tiles,
            payday_delay: delay,
            policy,
            multi_crop: self.options.multi_crop,
            shortlist_ceiling: shortlist_cap(tiles, wallet, self.options.max_num_crop_types),
        });
        stats.greedy_wealth = greedy.wealth;
        stats.greedy_passes = greedy.passes;
        stats.shortlist = greedy.shortlist.iter().map(|c| c.name.clone()).collect();

        // The simulated refinement, floor-seeded.
        let monitor = Arc::new(MemoryMonitor::new(
            Arc::clone(&self.memory_probe),
            self.options.memory_threshold_gb,
            MONITOR_INTERVAL,
        ));
        let cheapest = request
            .catalog
            .cheapest_enabled_buy()
            .unwrap_or(Decimal::ZERO);
        let ctx = BfsContext {
            gates: PlantGates::new(
                cheapest,
                wallet,
                tiles,
                self.options.gold_floor_fraction,
                self.options.tile_floor_fraction,
            ),
            shortlist: greedy.shortlist.clone(),
            season_len,
            payday_delay: delay,
            policy,
            multi_crop: self.options.multi_crop,
            use_cache: self.options.use_cache,
            cache_sig_digits: self.options.cache_sig_digits,
        };
        let mut bfs = Bfs::new(&ctx, monitor.as_ref());
        bfs.offer(greedy.wealth, greedy.calendar.clone());
        if !greedy.shortlist.is_empty() {
            bfs.seed(FrontierNode {
                day: 1,
                calendar: Calendar::new(season_len, wallet, tiles),
            });
        }

        let mut yielder = Yielder::default();
        let mut pool: Option<WorkerPool> = None;
        let mut mode = DispatchMode::Sequential;
        while !monitor.aborted() {
            match mode {
                DispatchMode::Sequential => {
                    if bfs.frontier_len() == 0 {
                        break;
                    }
                    if bfs.frontier_len() >= self.options.deep_seeds.max(1) {
                        mode = if self.prefer_shallow {
                            DispatchMode::Shallow
                        } else {
                            DispatchMode::Deep
                        };
                        continue;
                    }
                    if !bfs.step() {
                        break;
                    }
                }
                DispatchMode::Deep => {
                    let frontier = bfs.take_frontier();
                    let pool = self.pool_for(
                        &mut pool,
                        request,
                        &stats.shortlist,
                        season_len,
                        wallet,
                        tiles,
                        Arc::clone(&monitor),
                    )?;
                    let out = pool.run_deep(frontier, &mut yielder)?;
                    stats.worker_ops += out.stats.worker_ops;
                    stats.worker_cache_hits += out.stats.worker_cache_hits;
                    stats.subtrees_dispatched += out.stats.subtrees;
                    stats.worker_faults += out.stats.faults;
                    monitor.sample();
                    if let Some((wealth, calendar)) = out.best {
                        bfs.offer(wealth, calendar);
                    }
                    // Subtrees run to exhaustion; nothing returns to the
                    // frontier.
                    break;
                }
                DispatchMode::Shallow => {
                    let frontier = bfs.take_frontier();
                    if frontier.is_empty() {
                        break;
                    }
                    let pool = self.pool_for(
                        &mut pool,
                        request,
                        &stats.shortlist,
                        season_len,
                        wallet,
                        tiles,
                        Arc::clone(&monitor),
                    )?;
                    let out = pool.run_level(frontier, &mut yielder)?;
                    stats.worker_ops += out.stats.worker_ops;
                    stats.worker_cache_hits += out.stats.worker_cache_hits;
                    stats.levels_dispatched += 1;
                    stats.worker_faults += out.stats.faults;
                    monitor.sample();
                    for (wealth, calendar) in out.leaves {
                        bfs.offer(wealth, calendar);
                    }
                    for node in out.nodes {
                        bfs.seed(node);
                    }
                }
            }
        }

        let bfs_stats = bfs.stats();
        stats.sequential_ops = bfs_stats.ops;
        stats.sequential_cache_hits = bfs_stats.cache_hits;
        stats.peak_frontier = bfs_stats.peak_frontier;
        stats.elapsed = started.elapsed();

        if let Err(failure) = monitor.check() {
            // Soft failure: drop every cache and frontier, report the
            // sentinel, stay usable for a smaller follow-up query.
            bfs.clear();
            drop(pool);
            stats.aborted = true;
            warn!(target: "plan.run", %failure, "returning sentinel");
            return Ok(PlanOutcome {
                value: Decimal::new(MEMORY_FAILURE_VALUE, 0),
                calendar: Calendar::empty(),
                stats,
            });
        }

        // Greedy seeded best-so-far first, so on a tie it is still the
        // incumbent here.
        let (best_wealth, best_calendar) = bfs
            .into_best()
            .unwrap_or((greedy.wealth, greedy.calendar));
        stats.sim_wealth = best_wealth;

        let value = if infinite_gold {
            best_wealth - Decimal::new(SYNTHETIC_WALLET_GOLD, 0)
        } else {
            best_wealth
        };
        let calendar = if shift_days > 0 {
            best_calendar.shift(i32::from(shift_days))
        } else {
            best_calendar
        };
        info!(
            target: "plan.run",
            %value,
            greedy = %stats.greedy_wealth,
            ops = stats.sequential_ops + stats.worker_ops,
            workers = stats.workers,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "plan complete"
        );
        Ok(PlanOutcome {
            value,
            calendar,
            stats,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn pool_for<'p>(
        &self,
        slot: &'p mut Option<WorkerPool>,
        request: &PlanRequest,
        shortlist: &[String],
        season_len: Day,
        wallet: Decimal,
        tiles: Tiles,
        monitor: Arc<MemoryMonitor>,
    ) -> Result<&'p mut WorkerPool, PlanError> {
        if slot.is_none() {
            let setup = PoolSetup {
                catalog_blob: request.catalog.to_blob(),
                shortlist: shortlist.to_vec(),
                season_len,
                payday_delay: self.options.payday_delay,
                policy: self.options.release_policy(),
                multi_crop: self.options.multi_crop,
                use_cache: self.options.use_cache,
                cache_sig_digits: self.options.cache_sig_digits,
                starting_gold: wallet,
                starting_tiles: tiles,
                gold_floor_fraction: self.options.gold_floor_fraction,
                tile_floor_fraction: self.options.tile_floor_fraction,
            };
            *slot = Some(WorkerPool::new(setup, self.worker_count(), monitor)?);
        }
        Ok(slot.as_mut().expect("pool just installed"))
    }
}
