//! Breadth-first schedule simulator.
//!
//! The frontier is a FIFO of `(day, calendar)` nodes. Expanding a node
//! plants each shortlist crop at its decision day, then either enqueues
//! the successor at the next admissible planting day or lets the finished
//! branch's wealth compete for best-so-far. A canonical cache collapses
//! nodes whose remaining future is indistinguishable under bucketing, and
//! a load monitor is consulted between expansions so a memory abort never
//! interrupts a transition mid-flight.

use std::collections::VecDeque;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, trace};

use harvest_core::{wire, Calendar, Crop, Day, TileReleasePolicy};
use harvest_econ::{apply_planting, next_plant_day, PlantGates};

use crate::cache::CanonCache;

/// Abort hook consulted once per expanded node. Implementations count the
/// calls and probe process memory at their own cadence; returning `true`
/// stops the search.
pub trait LoadMonitor: Send + Sync {
    /// Called once per operation. `true` means abort now.
    fn checkpoint(&self) -> bool;
    /// Current abort state, without counting an operation.
    fn aborted(&self) -> bool;
}

/// Monitor that never aborts, for tests and benches.
#[derive(Debug, Default)]
pub struct NoopMonitor;

impl LoadMonitor for NoopMonitor {
    fn checkpoint(&self) -> bool {
        false
    }
    fn aborted(&self) -> bool {
        false
    }
}

/// One unexpanded branch.
#[derive(Clone, Debug)]
pub struct FrontierNode {
    pub day: Day,
    pub calendar: Calendar,
}

/// Read-only search parameters, installed once per run (or once per
/// worker).
#[derive(Clone, Debug)]
pub struct BfsContext {
    pub shortlist: Vec<Arc<Crop>>,
    pub season_len: Day,
    pub payday_delay: Day,
    pub policy: TileReleasePolicy,
    pub multi_crop: bool,
    pub use_cache: bool,
    pub cache_sig_digits: u32,
    pub gates: PlantGates,
}

/// Counters reported back to the orchestrator.
#[derive(Clone, Copy, Debug, Default)]
pub struct BfsStats {
    /// Nodes dequeued (including cache hits).
    pub ops: u64,
    pub cache_hits: u64,
    /// Finished branches whose wealth competed for best-so-far.
    pub leaves: u64,
    pub peak_frontier: usize,
}

/// The sequential engine. The worker pool runs one of these per subtree
/// with a worker-private cache; the orchestrator runs one directly until
/// the frontier is large enough to be worth dispatching.
pub struct Bfs<'a> {
    ctx: &'a BfsContext,
    monitor: &'a dyn LoadMonitor,
    frontier: VecDeque<FrontierNode>,
    cache: CanonCache,
    best: Option<(Decimal, Calendar)>,
    stats: BfsStats,
    next_batch_id: u64,
}

impl<'a> Bfs<'a> {
    pub fn new(ctx: &'a BfsContext, monitor: &'a dyn LoadMonitor) -> Self {
        Self {
            ctx,
            monitor,
            frontier: VecDeque::new(),
            cache: CanonCache::new(),
            best: None,
            stats: BfsStats::default(),
            next_batch_id: 1,
        }
    }

    /// Push a node onto the frontier tail.
    pub fn seed(&mut self, node: FrontierNode) {
        self.next_batch_id = self.next_batch_id.max(node.calendar.max_batch_id() + 1);
        self.frontier.push_back(node);
        self.stats.peak_frontier = self.stats.peak_frontier.max(self.frontier.len());
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Hand the remaining frontier to a dispatcher.
    pub fn take_frontier(&mut self) -> Vec<FrontierNode> {
        self.frontier.drain(..).collect()
    }

    /// Drop all search state, keeping the statistics.
    pub fn clear(&mut self) {
        self.frontier.clear();
        self.cache.clear();
        self.best = None;
    }

    /// Replace the engine's cache with one that already has history. A
    /// worker threads its private cache through consecutive jobs this way.
    pub fn install_cache(&mut self, cache: CanonCache) {
        self.cache = cache;
    }

    /// Take the cache back out, leaving an empty one behind.
    pub fn take_cache(&mut self) -> CanonCache {
        std::mem::take(&mut self.cache)
    }

    pub fn best(&self) -> Option<(Decimal, &Calendar)> {
        self.best.as_ref().map(|(w, c)| (*w, c))
    }

    pub fn into_best(self) -> Option<(Decimal, Calendar)> {
        self.best
    }

    pub fn stats(&self) -> BfsStats {
        let mut stats = self.stats;
        stats.cache_hits = self.cache.hits();
        stats
    }

    /// Merge a candidate produced elsewhere (a worker subtree, say).
    /// First seen wins on equal wealth.
    pub fn offer(&mut self, wealth: Decimal, calendar: Calendar) {
        if self.best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
            self.best = Some((wealth, calendar));
        }
    }

    fn consider_leaf(&mut self, calendar: Calendar) {
        self.stats.leaves += 1;
        let wealth = calendar.wealth();
        trace!(target: "plan.bfs", %wealth, "branch complete");
        self.offer(wealth, calendar);
    }

    /// Expand one frontier node. Returns `false` when the frontier is
    /// exhausted or the monitor called an abort.
    pub fn step(&mut self) -> bool {
        if self.monitor.aborted() {
            return false;
        }
        let Some(node) = self.frontier.pop_front() else {
            return false;
        };
        self.stats.ops += 1;
        if self.ctx.use_cache {
            let key = wire::cache_key(&node.calendar, node.day, self.ctx.cache_sig_digits);
            if self.cache.check_and_insert(&key) {
                return !self.monitor.checkpoint();
            }
        }

        let mut produced = false;
        for crop in &self.ctx.shortlist {
            let state = node.calendar.day(node.day);
            let units = crop.units_plantable(state.free_tiles, state.wallet);
            if units == 0 {
                continue;
            }
            let mut successor = node.calendar.clone();
            let id = self.next_batch_id;
            if apply_planting(
                &mut successor,
                node.day,
                crop,
                units,
                id,
                self.ctx.payday_delay,
                self.ctx.policy,
            )
            .is_none()
            {
                continue;
            }
            self.next_batch_id += 1;
            produced = true;
            let resume = if self.ctx.multi_crop {
                node.day
            } else {
                node.day + 1
            };
            match next_plant_day(&successor, resume, &self.ctx.gates) {
                Some(day) => {
                    self.frontier.push_back(FrontierNode {
                        day,
                        calendar: successor,
                    });
                    self.stats.peak_frontier = self.stats.peak_frontier.max(self.frontier.len());
                }
                None => self.consider_leaf(successor),
            }
        }
        if !produced {
            self.consider_leaf(node.calendar);
        }
        !self.monitor.checkpoint()
    }

    /// Drain the frontier completely (or until an abort).
    pub fn run_to_completion(&mut self) {
        while !self.frontier.is_empty() {
            if !self.step() {
                break;
            }
        }
        debug!(
            target: "plan.bfs",
            ops = self.stats.ops,
            cache_hits = self.cache.hits(),
            leaves = self.stats.leaves,
            "frontier drained"
        );
    }

    pub fn aborted(&self) -> bool {
        self.monitor.aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::Tiles;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn crop(name: &str, maturity: Day, regrow: Option<Day>, buy: i64, sell: i64) -> Arc<Crop> {
        Arc::new(Crop {
            name: name.into(),
            days_to_maturity: maturity,
            regrow,
            buy_price: dec(buy),
            sell_price: dec(sell),
            enabled: true,
            season: None,
            second_season: None,
        })
    }

    fn context(shortlist: Vec<Arc<Crop>>, wallet: i64, tiles: Tiles, use_cache: bool) -> BfsContext {
        let cheapest = shortlist
            .iter()
            .map(|c| c.buy_price)
            .min()
            .unwrap_or(Decimal::ZERO);
        BfsContext {
            gates: PlantGates::new(cheapest, dec(wallet), tiles, 0.5, 0.07),
            shortlist,
            season_len: 28,
            payday_delay: 0,
            policy: TileReleasePolicy::OnPayday,
            multi_crop: true,
            use_cache,
            cache_sig_digits: 2,
        }
    }

    fn root(wallet: i64, tiles: Tiles) -> FrontierNode {
        FrontierNode {
            day: 1,
            calendar: Calendar::new(28, dec(wallet), tiles),
        }
    }

    fn run(ctx: &BfsContext, node: FrontierNode) -> (Option<(Decimal, Calendar)>, BfsStats) {
        let monitor = NoopMonitor;
        let mut bfs = Bfs::new(ctx, &monitor);
        bfs.seed(node);
        bfs.run_to_completion();
        let stats = bfs.stats();
        (bfs.into_best(), stats)
    }

    #[test]
    fn single_crop_tree_finds_the_replant_chain() {
        let ctx = context(vec![crop("Radish", 6, None, 40, 90)], 400, Tiles::Finite(10), true);
        let (best, stats) = run(&ctx, root(400, Tiles::Finite(10)));
        let (wealth, cal) = best.unwrap();
        // Waves on days 1, 7, 13, 19: 400 -> 900 -> 2025 on ten tiles max.
        assert!(wealth > dec(400), "wealth {wealth}");
        assert!(cal.validate(0, TileReleasePolicy::OnPayday).is_ok());
        assert!(stats.ops > 0);
        assert!(stats.leaves > 0);
    }

    #[test]
    fn seeded_bfs_never_falls_under_the_greedy_floor() {
        // The greedy floor seeds best-so-far, so even where pruning cuts
        // the greedy path out of the tree the report cannot regress.
        let shortlist = vec![
            crop("Blueberry", 13, Some(4), 80, 150),
            crop("Radish", 6, None, 40, 90),
            crop("Starfruit", 13, None, 400, 750),
        ];
        let greedy = crate::greedy::run_greedy(&crate::greedy::GreedySetup {
            crops: shortlist.clone(),
            season_len: 28,
            wallet: dec(5000),
            tiles: Tiles::Finite(100),
            payday_delay: 0,
            policy: TileReleasePolicy::OnPayday,
            multi_crop: true,
            shortlist_ceiling: 5,
        });
        let ctx = context(shortlist, 5000, Tiles::Finite(100), true);
        let monitor = NoopMonitor;
        let mut bfs = Bfs::new(&ctx, &monitor);
        bfs.offer(greedy.wealth, greedy.calendar.clone());
        bfs.seed(root(5000, Tiles::Finite(100)));
        bfs.run_to_completion();
        let (wealth, _) = bfs.best().unwrap();
        assert!(
            wealth >= greedy.wealth,
            "simulated {wealth} under greedy floor {}",
            greedy.wealth
        );
    }

    /// Two crops with identical economics: the subtrees they open are
    /// economically the same future, so the cache collapses one of them.
    fn twin_crops() -> Vec<Arc<Crop>> {
        vec![
            crop("Redberry", 6, None, 40, 90),
            crop("Blueberry", 6, None, 40, 90),
        ]
    }

    #[test]
    fn cache_prunes_equivalent_futures() {
        let (_, without) = run(
            &context(twin_crops(), 800, Tiles::Finite(10), false),
            root(800, Tiles::Finite(10)),
        );
        let (_, with) = run(
            &context(twin_crops(), 800, Tiles::Finite(10), true),
            root(800, Tiles::Finite(10)),
        );
        assert!(with.cache_hits > 0, "expected cache hits");
        assert!(with.ops < without.ops);
    }

    #[test]
    fn cache_on_and_off_agree_on_best_wealth() {
        let (best_off, _) = run(
            &context(twin_crops(), 800, Tiles::Finite(10), false),
            root(800, Tiles::Finite(10)),
        );
        let (best_on, _) = run(
            &context(twin_crops(), 800, Tiles::Finite(10), true),
            root(800, Tiles::Finite(10)),
        );
        let (off_wealth, off_cal) = best_off.unwrap();
        let (on_wealth, on_cal) = best_on.unwrap();
        assert_eq!(off_wealth, on_wealth);
        assert_eq!(
            off_cal.day(1).plants.first().map(|b| b.crop.name.clone()),
            on_cal.day(1).plants.first().map(|b| b.crop.name.clone())
        );
    }

    #[test]
    fn gold_floor_prunes_midgrowth_reinvestment() {
        // Planting Starfruit leaves 200 gold: enough for radishes, but
        // under half the starting gold. The floor postpones the next
        // decision to the Starfruit payday, cutting out the penny-ante
        // branches a floorless search would explore.
        let shortlist = vec![
            crop("Starfruit", 13, None, 400, 750),
            crop("Radish", 6, None, 100, 150),
        ];
        let floored = context(shortlist.clone(), 1000, Tiles::Finite(100), false);
        let mut floorless = context(shortlist, 1000, Tiles::Finite(100), false);
        floorless.gates = PlantGates::new(dec(100), dec(1000), Tiles::Finite(100), 0.0, 0.0);
        let (floored_best, floored_stats) = run(&floored, root(1000, Tiles::Finite(100)));
        let (_, floorless_stats) = run(&floorless, root(1000, Tiles::Finite(100)));
        assert!(floored_best.is_some());
        assert!(
            floored_stats.ops < floorless_stats.ops,
            "floored {} vs floorless {}",
            floored_stats.ops,
            floorless_stats.ops
        );
    }

    struct CountingMonitor {
        calls: AtomicU64,
        abort_after: u64,
    }

    impl LoadMonitor for CountingMonitor {
        fn checkpoint(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            n >= self.abort_after
        }
        fn aborted(&self) -> bool {
            self.calls.load(Ordering::Relaxed) >= self.abort_after
        }
    }

    #[test]
    fn monitor_abort_stops_the_search_between_expansions() {
        let shortlist = vec![
            crop("Radish", 6, None, 40, 90),
            crop("Turnip", 4, None, 20, 35),
            crop("Wheat", 3, None, 10, 16),
        ];
        let ctx = context(shortlist, 2000, Tiles::Finite(50), false);
        let monitor = CountingMonitor {
            calls: AtomicU64::new(0),
            abort_after: 5,
        };
        let mut bfs = Bfs::new(&ctx, &monitor);
        bfs.seed(root(2000, Tiles::Finite(50)));
        bfs.run_to_completion();
        assert!(bfs.aborted());
        assert_eq!(bfs.stats().ops, 5);
        // A partial best may exist; the frontier still holds work.
        assert!(bfs.frontier_len() > 0);
    }

    #[test]
    fn first_seen_wins_ties() {
        let ctx = context(vec![crop("Radish", 6, None, 40, 90)], 400, Tiles::Finite(10), true);
        let monitor = NoopMonitor;
        let mut bfs = Bfs::new(&ctx, &monitor);
        let marker = Calendar::new(28, dec(999), Tiles::Finite(1));
        bfs.offer(dec(999), marker.clone());
        // Same wealth, different calendar: the incumbent stays.
        bfs.offer(dec(999), Calendar::new(28, dec(999), Tiles::Finite(2)));
        let (w, c) = bfs.best().unwrap();
        assert_eq!(w, dec(999));
        assert_eq!(c, &marker);
    }
}
