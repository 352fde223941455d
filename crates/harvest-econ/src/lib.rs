#![deny(warnings)]

//! Planting economics for Harvest Planner.
//!
//! This crate owns the calendar transition rule (plant a batch, propagate
//! its costs, paydays and tile occupancy through the rest of the season),
//! the per-day greedy plant choice, and the two load-shedding gates the
//! search uses: the shortlist size derived from the tile-to-currency ratio
//! and the next-plant-day test with its gold and tile floors.

use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::warn;

use harvest_core::{Calendar, Crop, Day, PlantBatch, Tiles, TileReleasePolicy};

/// Add to a wallet, saturating instead of overflowing. Overflow is logged
/// once per occurrence and never surfaces as an error.
pub fn credit_wallet(wallet: Decimal, amount: Decimal) -> Decimal {
    match wallet.checked_add(amount) {
        Some(v) => v,
        None => {
            warn!(target: "plan.econ", %wallet, %amount, "wallet credit saturated");
            Decimal::MAX
        }
    }
}

fn checked_cost(units: u64, price: Decimal) -> Option<Decimal> {
    Decimal::from(units).checked_mul(price)
}

/// Plant `units` tiles of `crop` on `day`, producing the successor state
/// in place. Returns the created batch, or `None` when the planting is
/// forbidden: zero units, a crop that can never harvest from this day, or
/// a single-harvest crop that cannot pay for itself.
pub fn apply_planting(
    cal: &mut Calendar,
    day: Day,
    crop: &Arc<Crop>,
    units: u64,
    batch_id: u64,
    delay: Day,
    policy: TileReleasePolicy,
) -> Option<Arc<PlantBatch>> {
    if units == 0 || day < 1 || day > cal.season_len() {
        return None;
    }
    let season_len = cal.season_len();
    let num_harvests = crop.num_harvests(day, season_len);
    if num_harvests == 0 {
        return None;
    }
    if num_harvests == 1 && crop.buy_price >= crop.sell_price {
        return None;
    }

    let cost = checked_cost(units, crop.buy_price).unwrap_or_else(|| {
        warn!(target: "plan.econ", units, crop = %crop.name, "planting cost saturated");
        Decimal::MAX
    });
    if cal.day(day).wallet < cost {
        return None;
    }

    let batch = Arc::new(PlantBatch::new(
        batch_id,
        Arc::clone(crop),
        units,
        day,
        season_len,
    ));
    let paydays = batch.paydays(delay);
    let release_day = batch.release_day(delay, policy);
    let sale = checked_cost(units, crop.sell_price).unwrap_or(Decimal::MAX);

    let mut credited = Decimal::ZERO;
    for j in day..=cal.terminal_day() {
        let is_payday = paydays.contains(&j);
        if is_payday {
            credited = credit_wallet(credited, sale);
        }
        let occupied = j < release_day;
        let st = cal.day_mut(j);
        st.wallet = credit_wallet(st.wallet - cost, credited);
        if occupied {
            st.free_tiles = st.free_tiles.saturating_sub(units);
            st.plants.push(Arc::clone(&batch));
        }
        if is_payday || j == day {
            st.day_of_interest = true;
        }
    }
    Some(batch)
}

/// The crop the greedy heuristic would plant right now, with the unit
/// count and the score `units * profit_index`. `None` when no enabled
/// crop has a positive score. Ties keep the earliest catalog entry.
pub fn best_plant_choice(
    cal: &Calendar,
    day: Day,
    crops: &[Arc<Crop>],
    delay: Day,
) -> Option<(Arc<Crop>, u64, Decimal)> {
    let season_len = cal.season_len();
    let st = cal.day(day);
    let mut best: Option<(Arc<Crop>, u64, Decimal)> = None;
    for crop in crops {
        let num_harvests = crop.num_harvests(day, season_len);
        if num_harvests == 0 {
            continue;
        }
        if num_harvests == 1 && crop.buy_price >= crop.sell_price {
            continue;
        }
        let units = crop.units_plantable(st.free_tiles, st.wallet);
        if units == 0 {
            continue;
        }
        let index = crop.profit_index(day, season_len, delay);
        let score = Decimal::from(units).checked_mul(index).unwrap_or(Decimal::MAX);
        if score <= Decimal::ZERO {
            continue;
        }
        if best.as_ref().map(|(_, _, s)| score > *s).unwrap_or(true) {
            best = Some((Arc::clone(crop), units, score));
        }
    }
    best
}

/// How many crop types the combinatorial search may consider, from the
/// tile-to-currency ratio of the starting conditions. A high ratio blows
/// up the branching factor, so the list shrinks as tiles get cheap
/// relative to gold. `ceiling` caps the result.
pub fn shortlist_cap(tiles: Tiles, wallet: Decimal, ceiling: usize) -> usize {
    let by_ratio = match tiles {
        Tiles::Infinite => 5,
        Tiles::Finite(t) => {
            let wallet = wallet.to_f64().unwrap_or(0.0);
            if wallet <= 0.0 {
                2
            } else {
                let rho = t as f64 / wallet;
                if rho <= 0.1 {
                    5
                } else if rho <= 0.2 {
                    4
                } else if rho <= 0.4 {
                    3
                } else {
                    2
                }
            }
        }
    };
    by_ratio.min(ceiling.max(1))
}

/// Pruning gates for extending a branch, fixed at configure time.
#[derive(Clone, Debug)]
pub struct PlantGates {
    /// Lowest buy price among enabled crops.
    pub cheapest_buy: Decimal,
    /// `starting_gold * gold_floor_fraction`.
    pub gold_floor: Decimal,
    /// `starting_tiles * tile_floor_fraction`; `None` for an infinite
    /// farm, where the tile floor never binds.
    pub tile_floor: Option<f64>,
}

impl PlantGates {
    pub fn new(
        cheapest_buy: Decimal,
        starting_gold: Decimal,
        starting_tiles: Tiles,
        gold_floor_fraction: f64,
        tile_floor_fraction: f64,
    ) -> Self {
        let gold_floor = starting_gold
            .checked_mul(Decimal::from_f64(gold_floor_fraction).unwrap_or(Decimal::ZERO))
            .unwrap_or(Decimal::MAX);
        let tile_floor = match starting_tiles {
            Tiles::Infinite => None,
            Tiles::Finite(t) => Some(t as f64 * tile_floor_fraction),
        };
        Self {
            cheapest_buy,
            gold_floor,
            tile_floor,
        }
    }

    /// Whether a further planting on this day is worth exploring.
    pub fn admits(&self, st: &harvest_core::DayState) -> bool {
        if st.wallet < self.cheapest_buy || st.wallet < self.gold_floor {
            return false;
        }
        if !st.free_tiles.is_positive() {
            return false;
        }
        match (self.tile_floor, st.free_tiles) {
            (None, _) | (_, Tiles::Infinite) => true,
            (Some(floor), Tiles::Finite(t)) => t as f64 > floor,
        }
    }
}

/// First day in `start..=season_len` on which all gates admit another
/// planting, or `None` when the branch is complete.
pub fn next_plant_day(cal: &Calendar, start: Day, gates: &PlantGates) -> Option<Day> {
    (start.max(1)..=cal.season_len()).find(|d| gates.admits(cal.day(*d)))
}
