//! The per-tile greedy heuristic ("PPI").
//!
//! A single pass walks the season day by day: on every day of interest it
//! plants whatever maximizes `units * profit_index` against the live day
//! state, then jumps to the next day a payday lands on. Two outer loops
//! re-run the pass with crops stripped out:
//!
//! - **TopCrop** repeatedly removes the crop a pass planted on day 1, to
//!   surface schedules that never get to exist while the strongest opener
//!   soaks up the wallet.
//! - **AllCrop** removes *every* crop a pass planted, surfacing one new
//!   schedule per crop tier until nothing plants at all.
//!
//! The best wealth over all passes is the floor the simulator has to beat;
//! the first distinct crops AllCrop visits become the simulator's
//! shortlist.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use harvest_core::{Calendar, Crop, Day, Tiles, TileReleasePolicy};
use harvest_econ::{apply_planting, best_plant_choice, shortlist_cap};

/// Starting conditions for the greedy passes.
#[derive(Clone, Debug)]
pub struct GreedySetup {
    /// Enabled crops, catalog order.
    pub crops: Vec<Arc<Crop>>,
    pub season_len: Day,
    pub wallet: Decimal,
    pub tiles: Tiles,
    pub payday_delay: Day,
    pub policy: TileReleasePolicy,
    pub multi_crop: bool,
    /// Ceiling on the shortlist before the ratio-based reduction.
    pub shortlist_ceiling: usize,
}

/// What the greedy phase hands to the orchestrator.
#[derive(Clone, Debug)]
pub struct GreedyOutcome {
    /// The wealth floor: the simulator result must not fall below this.
    pub wealth: Decimal,
    pub calendar: Calendar,
    /// Crops the simulator is permitted to plant, in discovery order.
    pub shortlist: Vec<Arc<Crop>>,
    /// Number of single passes executed across both outer loops.
    pub passes: usize,
}

struct Pass {
    calendar: Calendar,
    planted: Vec<Arc<Crop>>,
}

fn single_pass(setup: &GreedySetup, crops: &[Arc<Crop>]) -> Pass {
    let mut calendar = Calendar::new(setup.season_len, setup.wallet, setup.tiles);
    let mut planted: Vec<Arc<Crop>> = Vec::new();
    let mut next_id = 1u64;
    let mut day: Day = 1;
    while day <= setup.season_len {
        if calendar.day(day).day_of_interest {
            loop {
                let Some((crop, units, score)) =
                    best_plant_choice(&calendar, day, crops, setup.payday_delay)
                else {
                    break;
                };
                let applied = apply_planting(
                    &mut calendar,
                    day,
                    &crop,
                    units,
                    next_id,
                    setup.payday_delay,
                    setup.policy,
                );
                if applied.is_none() {
                    break;
                }
                next_id += 1;
                debug!(
                    target: "plan.greedy",
                    day,
                    crop = %crop.name,
                    units,
                    %score,
                    "greedy planting"
                );
                if !planted.iter().any(|c| c.name == crop.name) {
                    planted.push(Arc::clone(&crop));
                }
                if !setup.multi_crop {
                    break;
                }
            }
        }
        match calendar.next_interest_day(day) {
            Some(next) => day = next,
            None => break,
        }
    }
    Pass { calendar, planted }
}

fn active<'a>(all: &'a [Arc<Crop>], removed: &HashSet<String>) -> Vec<Arc<Crop>> {
    all.iter()
        .filter(|c| !removed.contains(&c.name))
        .cloned()
        .collect()
}

/// Run both greedy loops and derive the floor and the shortlist.
pub fn run_greedy(setup: &GreedySetup) -> GreedyOutcome {
    let mut best: Option<(Decimal, Calendar)> = None;
    let mut passes = 0usize;
    let consider = |pass: &Pass, best: &mut Option<(Decimal, Calendar)>| {
        let wealth = pass.calendar.wealth();
        // First seen wins on equal wealth.
        if best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
            *best = Some((wealth, pass.calendar.clone()));
        }
    };

    // TopCrop: strip the day-1 crop and retry.
    let mut removed: HashSet<String> = HashSet::new();
    loop {
        let crops = active(&setup.crops, &removed);
        if crops.is_empty() {
            break;
        }
        let pass = single_pass(setup, &crops);
        passes += 1;
        consider(&pass, &mut best);
        let opener = pass
            .calendar
            .day(1)
            .plants
            .first()
            .map(|b| b.crop.name.clone());
        match opener {
            Some(name) => removed.insert(name),
            None => break,
        };
    }

    // AllCrop: strip everything a pass planted, collect discovery order.
    let mut visited: Vec<Arc<Crop>> = Vec::new();
    removed.clear();
    loop {
        let crops = active(&setup.crops, &removed);
        if crops.is_empty() {
            break;
        }
        let pass = single_pass(setup, &crops);
        passes += 1;
        consider(&pass, &mut best);
        if pass.planted.is_empty() {
            break;
        }
        for crop in &pass.planted {
            if !visited.iter().any(|c| c.name == crop.name) {
                visited.push(Arc::clone(crop));
            }
            removed.insert(crop.name.clone());
        }
    }

    let cap = shortlist_cap(setup.tiles, setup.wallet, setup.shortlist_ceiling);
    visited.truncate(cap);

    let (wealth, calendar) = best.unwrap_or_else(|| {
        let cal = Calendar::new(setup.season_len, setup.wallet, setup.tiles);
        (cal.wealth(), cal)
    });
    info!(
        target: "plan.greedy",
        %wealth,
        passes,
        shortlist = visited.len(),
        "greedy floor established"
    );
    GreedyOutcome {
        wealth,
        calendar,
        shortlist: visited,
        passes,
    }
}
