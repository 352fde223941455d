//! Per-day farm state and the season calendar.
//!
//! A [`Calendar`] maps day `1..=season_len + 1` to a [`DayState`]. The
//! extra terminal day exists because a harvest on the last season day pays
//! out one day later when the payday delay is 1; the calendar's wealth is
//! defined as the terminal day's wallet.
//!
//! Day states are held behind `Arc` so cloning a calendar shares every day
//! by reference; the search mutates only a suffix of the season, and
//! `Arc::make_mut` deep-copies exactly the days it touches.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::crop::Crop;
use crate::error::PlanError;
use crate::options::TileReleasePolicy;
use crate::Day;

/// Free-tile count for one day. Infinite farms are gold-limited only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tiles {
    Infinite,
    Finite(u64),
}

impl Tiles {
    pub fn is_infinite(self) -> bool {
        matches!(self, Tiles::Infinite)
    }

    pub fn is_positive(self) -> bool {
        match self {
            Tiles::Infinite => true,
            Tiles::Finite(t) => t > 0,
        }
    }

    /// Occupy `n` tiles. Infinite stays infinite; finite counts never go
    /// below zero.
    pub fn saturating_sub(self, n: u64) -> Tiles {
        match self {
            Tiles::Infinite => Tiles::Infinite,
            Tiles::Finite(t) => Tiles::Finite(t.saturating_sub(n)),
        }
    }

    pub fn saturating_add(self, n: u64) -> Tiles {
        match self {
            Tiles::Infinite => Tiles::Infinite,
            Tiles::Finite(t) => Tiles::Finite(t.saturating_add(n)),
        }
    }

    /// Wire encoding: infinity is `-1`.
    pub fn wire(self) -> i64 {
        match self {
            Tiles::Infinite => -1,
            Tiles::Finite(t) => i64::try_from(t).unwrap_or(i64::MAX),
        }
    }

    pub fn from_wire(v: i64) -> Tiles {
        if v < 0 {
            Tiles::Infinite
        } else {
            Tiles::Finite(v as u64)
        }
    }
}

impl fmt::Display for Tiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tiles::Infinite => write!(f, "inf"),
            Tiles::Finite(t) => write!(f, "{t}"),
        }
    }
}

/// A batch of identical plantings. Immutable once created and shared by
/// reference across every day state it occupies.
#[derive(Debug, PartialEq)]
pub struct PlantBatch {
    /// Unique within one calendar; needed only to reconstruct planting
    /// order after deserialization.
    pub id: u64,
    pub crop: Arc<Crop>,
    pub count: u64,
    pub plant_day: Day,
    /// Season length the harvest days were derived against.
    pub num_days: Day,
    harvest_days: Vec<Day>,
}

impl PlantBatch {
    pub fn new(id: u64, crop: Arc<Crop>, count: u64, plant_day: Day, num_days: Day) -> Self {
        let harvest_days = crop.harvest_days(plant_day, num_days);
        Self {
            id,
            crop,
            count,
            plant_day,
            num_days,
            harvest_days,
        }
    }

    pub fn harvest_days(&self) -> &[Day] {
        &self.harvest_days
    }

    /// Paydays for this batch, clipped to the terminal day. A harvest whose
    /// payday would land past `num_days + 1` never settles.
    pub fn paydays(&self, delay: Day) -> Vec<Day> {
        let terminal = self.num_days + 1;
        self.harvest_days
            .iter()
            .filter_map(|h| h.checked_add(delay))
            .filter(|p| *p <= terminal)
            .collect()
    }

    /// First day this batch no longer occupies its tiles. Persistent
    /// batches hold their tiles through the whole season.
    pub fn release_day(&self, delay: Day, policy: TileReleasePolicy) -> Day {
        let terminal = self.num_days + 1;
        if self.crop.is_persistent(self.num_days) {
            return terminal;
        }
        match self.harvest_days.first() {
            None => terminal,
            Some(&h) => match policy {
                TileReleasePolicy::OnHarvest => h,
                TileReleasePolicy::OnPayday => h.saturating_add(delay).min(terminal),
            },
        }
    }

    /// Whether the batch sits on its tiles at `day`.
    pub fn occupies(&self, day: Day, delay: Day, policy: TileReleasePolicy) -> bool {
        self.plant_day <= day && day < self.release_day(delay, policy)
    }

    /// The same batch moved `k` days later into a season `k` days longer.
    pub fn shifted(&self, k: Day) -> Self {
        PlantBatch::new(
            self.id,
            Arc::clone(&self.crop),
            self.count,
            self.plant_day + k,
            self.num_days + k,
        )
    }

    /// The same batch moved `k` days earlier. `None` if it would fall off
    /// the front of the season.
    pub fn shifted_back(&self, k: Day) -> Option<Self> {
        if self.plant_day <= k || self.num_days <= k {
            return None;
        }
        Some(PlantBatch::new(
            self.id,
            Arc::clone(&self.crop),
            self.count,
            self.plant_day - k,
            self.num_days - k,
        ))
    }

    /// Wire form: `name;count;plant_day;num_days`.
    pub fn wire(&self) -> String {
        format!(
            "{};{};{};{}",
            self.crop.name, self.count, self.plant_day, self.num_days
        )
    }
}

/// State of the farm on one day.
#[derive(Clone, Debug, PartialEq)]
pub struct DayState {
    pub wallet: Decimal,
    pub free_tiles: Tiles,
    /// Batches occupying tiles on this day, in planting order.
    pub plants: Vec<Arc<PlantBatch>>,
    /// True when the wallet or tile count changes on this day (a planting
    /// or a payday).
    pub day_of_interest: bool,
}

impl Default for DayState {
    fn default() -> Self {
        Self {
            wallet: Decimal::ZERO,
            free_tiles: Tiles::Finite(0),
            plants: Vec::new(),
            day_of_interest: false,
        }
    }
}

/// The season calendar: day `1..=season_len + 1` mapped to [`DayState`].
#[derive(Clone, Debug, PartialEq)]
pub struct Calendar {
    days: Vec<Arc<DayState>>,
    season_len: Day,
}

impl Calendar {
    /// A fresh calendar with the starting wallet and tile count on every
    /// day. Day 1 and the terminal day are flagged as days of interest:
    /// the first decision happens on day 1, and the terminal day is the
    /// wealth read-out line.
    pub fn new(season_len: Day, wallet: Decimal, tiles: Tiles) -> Self {
        let base = Arc::new(DayState {
            wallet,
            free_tiles: tiles,
            plants: Vec::new(),
            day_of_interest: false,
        });
        let flagged = Arc::new(DayState {
            day_of_interest: true,
            ..(*base).clone()
        });
        let terminal = season_len as usize + 1;
        let mut days = Vec::with_capacity(terminal + 1);
        days.push(Arc::new(DayState::default())); // index 0, never a real day
        for d in 1..=terminal {
            if d == 1 || d == terminal {
                days.push(Arc::clone(&flagged));
            } else {
                days.push(Arc::clone(&base));
            }
        }
        Self { days, season_len }
    }

    /// The sentinel calendar returned on memory failure.
    pub fn empty() -> Self {
        Self {
            days: Vec::new(),
            season_len: 0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.days.is_empty()
    }

    pub fn season_len(&self) -> Day {
        self.season_len
    }

    /// The payout-only day after the season's last day.
    pub fn terminal_day(&self) -> Day {
        self.season_len + 1
    }

    pub fn day(&self, d: Day) -> &DayState {
        &self.days[d as usize]
    }

    /// Mutable access; deep-copies the day if it is still shared.
    pub fn day_mut(&mut self, d: Day) -> &mut DayState {
        Arc::make_mut(&mut self.days[d as usize])
    }

    /// Final wealth: the terminal day's wallet. Zero for the sentinel.
    pub fn wealth(&self) -> Decimal {
        self.days
            .last()
            .map(|s| s.wallet)
            .unwrap_or(Decimal::ZERO)
    }

    /// The next flagged day strictly after `day`, within the plantable
    /// season.
    pub fn next_interest_day(&self, day: Day) -> Option<Day> {
        ((day + 1)..=self.season_len).find(|d| self.day(*d).day_of_interest)
    }

    /// Highest batch id present, or 0 when nothing is planted.
    pub fn max_batch_id(&self) -> u64 {
        self.days
            .iter()
            .flat_map(|s| s.plants.iter())
            .map(|b| b.id)
            .max()
            .unwrap_or(0)
    }

    /// Distinct batches in planting order.
    pub fn batches(&self) -> Vec<Arc<PlantBatch>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for state in &self.days {
            for b in &state.plants {
                if seen.insert(b.id) {
                    out.push(Arc::clone(b));
                }
            }
        }
        out.sort_by_key(|b| b.id);
        out
    }

    /// Move the whole schedule `k` days later (positive `k`) or earlier
    /// (negative `k`). Forward shifts leave days `1..=k` empty; backward
    /// shifts drop the leading days, which must be empty.
    pub fn shift(&self, k: i32) -> Calendar {
        match k {
            0 => self.clone(),
            k if k > 0 => self.shift_forward(k as Day),
            k => self.shift_back(k.unsigned_abs() as Day),
        }
    }

    fn shift_forward(&self, k: Day) -> Calendar {
        let new_len = self.season_len + k;
        let mut moved: std::collections::HashMap<u64, Arc<PlantBatch>> =
            std::collections::HashMap::new();
        let mut days = Vec::with_capacity(new_len as usize + 2);
        let empty = Arc::new(DayState::default());
        for _ in 0..=k {
            days.push(Arc::clone(&empty)); // index 0 plus the k vacated days
        }
        for d in 1..=(self.season_len + 1) {
            let old = self.day(d);
            let plants = old
                .plants
                .iter()
                .map(|b| {
                    Arc::clone(
                        moved
                            .entry(b.id)
                            .or_insert_with(|| Arc::new(b.shifted(k))),
                    )
                })
                .collect();
            days.push(Arc::new(DayState {
                wallet: old.wallet,
                free_tiles: old.free_tiles,
                plants,
                day_of_interest: old.day_of_interest,
            }));
        }
        Calendar {
            days,
            season_len: new_len,
        }
    }

    fn shift_back(&self, k: Day) -> Calendar {
        let new_len = self.season_len.saturating_sub(k);
        let mut moved: std::collections::HashMap<u64, Arc<PlantBatch>> =
            std::collections::HashMap::new();
        let mut days = Vec::with_capacity(new_len as usize + 2);
        days.push(Arc::new(DayState::default()));
        for d in (k + 1)..=(self.season_len + 1) {
            let old = self.day(d);
            let plants = old
                .plants
                .iter()
                .filter_map(|b| {
                    b.shifted_back(k)
                        .map(|nb| Arc::clone(moved.entry(b.id).or_insert_with(|| Arc::new(nb))))
                })
                .collect();
            days.push(Arc::new(DayState {
                wallet: old.wallet,
                free_tiles: old.free_tiles,
                plants,
                day_of_interest: old.day_of_interest,
            }));
        }
        Calendar {
            days,
            season_len: new_len,
        }
    }

    /// Check the calendar's structural invariants: no negative wallets or
    /// tile counts, batches present exactly on the days they occupy,
    /// wallet changes only on flagged days, and no planting that could
    /// never pay for itself.
    pub fn validate(&self, delay: Day, policy: TileReleasePolicy) -> Result<(), PlanError> {
        if self.is_sentinel() {
            return Ok(());
        }
        let terminal = self.terminal_day();
        for d in 1..=terminal {
            let st = self.day(d);
            if st.wallet < Decimal::ZERO {
                return Err(PlanError::InvalidInput(format!(
                    "negative wallet {} on day {d}",
                    st.wallet
                )));
            }
            for b in &st.plants {
                if !b.occupies(d, delay, policy) {
                    return Err(PlanError::InvalidInput(format!(
                        "batch {} listed on day {d} outside its occupancy",
                        b.id
                    )));
                }
            }
            if d > 1 && d < terminal {
                let prev = self.day(d - 1);
                if st.wallet != prev.wallet && !st.day_of_interest {
                    return Err(PlanError::InvalidInput(format!(
                        "wallet changed on unflagged day {d}"
                    )));
                }
            }
        }
        for b in self.batches() {
            let nh = b.crop.num_harvests(b.plant_day, b.num_days);
            if nh == 0 {
                return Err(PlanError::InvalidInput(format!(
                    "batch {} of {:?} can never harvest",
                    b.id, b.crop.name
                )));
            }
            if nh == 1 && b.crop.buy_price >= b.crop.sell_price {
                return Err(PlanError::InvalidInput(format!(
                    "batch {} of {:?} cannot pay for itself",
                    b.id, b.crop.name
                )));
            }
            // A flagged interior day must carry a planting or a payday.
            let mut expected: Vec<Day> = vec![b.plant_day];
            expected.extend(b.paydays(delay));
            for d in expected {
                if d <= self.season_len && !self.day(d).day_of_interest {
                    return Err(PlanError::InvalidInput(format!(
                        "day {d} should be flagged for batch {}",
                        b.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(name: &str, maturity: Day, regrow: Option<Day>, buy: i64, sell: i64) -> Arc<Crop> {
        Arc::new(Crop {
            name: name.into(),
            days_to_maturity: maturity,
            regrow,
            buy_price: Decimal::new(buy, 0),
            sell_price: Decimal::new(sell, 0),
            enabled: true,
            season: None,
            second_season: None,
        })
    }

    #[test]
    fn tiles_wire_round_trip() {
        assert_eq!(Tiles::Infinite.wire(), -1);
        assert_eq!(Tiles::Finite(62).wire(), 62);
        assert_eq!(Tiles::from_wire(-1), Tiles::Infinite);
        assert_eq!(Tiles::from_wire(0), Tiles::Finite(0));
        assert!(Tiles::Infinite.saturating_sub(10).is_infinite());
        assert_eq!(Tiles::Finite(3).saturating_sub(5), Tiles::Finite(0));
    }

    #[test]
    fn batch_release_days_by_policy() {
        let single = PlantBatch::new(1, crop("Radish", 6, None, 40, 90), 10, 1, 28);
        assert_eq!(single.release_day(0, TileReleasePolicy::OnHarvest), 7);
        assert_eq!(single.release_day(0, TileReleasePolicy::OnPayday), 7);
        assert_eq!(single.release_day(1, TileReleasePolicy::OnHarvest), 7);
        assert_eq!(single.release_day(1, TileReleasePolicy::OnPayday), 8);
        assert!(single.occupies(6, 1, TileReleasePolicy::OnPayday));
        assert!(single.occupies(7, 1, TileReleasePolicy::OnPayday));
        assert!(!single.occupies(7, 1, TileReleasePolicy::OnHarvest));

        let keeper = PlantBatch::new(2, crop("Blueberry", 13, Some(4), 80, 150), 10, 1, 28);
        assert_eq!(keeper.release_day(0, TileReleasePolicy::OnHarvest), 29);
        assert!(keeper.occupies(28, 0, TileReleasePolicy::OnHarvest));
        assert!(!keeper.occupies(29, 0, TileReleasePolicy::OnHarvest));
    }

    #[test]
    fn paydays_clip_at_terminal_day() {
        let late = PlantBatch::new(1, crop("Radish", 6, None, 40, 90), 1, 22, 28);
        assert_eq!(late.paydays(0), vec![28]);
        assert_eq!(late.paydays(1), vec![29]);
        assert_eq!(late.paydays(2), Vec::<Day>::new());
    }

    #[test]
    fn fresh_calendar_shape() {
        let cal = Calendar::new(28, Decimal::new(5000, 0), Tiles::Finite(100));
        assert_eq!(cal.terminal_day(), 29);
        assert_eq!(cal.wealth(), Decimal::new(5000, 0));
        assert!(cal.day(1).day_of_interest);
        assert!(cal.day(29).day_of_interest);
        assert!(!cal.day(2).day_of_interest);
        assert_eq!(cal.next_interest_day(1), None);
    }

    #[test]
    fn day_mut_copies_on_write_only() {
        let cal = Calendar::new(28, Decimal::new(100, 0), Tiles::Finite(10));
        let mut fork = cal.clone();
        fork.day_mut(10).wallet = Decimal::new(7, 0);
        assert_eq!(cal.day(10).wallet, Decimal::new(100, 0));
        assert_eq!(fork.day(10).wallet, Decimal::new(7, 0));
        // Untouched days are still shared.
        assert!(Arc::ptr_eq(&cal.days[11], &fork.days[11]));
    }

    #[test]
    fn shift_round_trip() {
        let mut cal = Calendar::new(14, Decimal::new(300, 0), Tiles::Finite(4));
        let b = Arc::new(PlantBatch::new(1, crop("Radish", 6, None, 40, 90), 2, 1, 14));
        for d in 1..=6 {
            let st = cal.day_mut(d);
            st.plants.push(Arc::clone(&b));
            st.free_tiles = Tiles::Finite(2);
        }
        cal.day_mut(1).day_of_interest = true;
        cal.day_mut(7).day_of_interest = true;

        let shifted = cal.shift(14);
        assert_eq!(shifted.season_len(), 28);
        assert!(shifted.day(15).day_of_interest);
        assert_eq!(shifted.day(15).plants[0].plant_day, 15);
        assert_eq!(shifted.day(15).plants[0].num_days, 28);
        assert_eq!(shifted.day(3).wallet, Decimal::ZERO);
        assert!(shifted.day(3).plants.is_empty());

        let back = shifted.shift(-14);
        assert_eq!(back, cal);
    }

    #[test]
    fn batches_in_planting_order() {
        let mut cal = Calendar::new(14, Decimal::new(300, 0), Tiles::Finite(4));
        let b2 = Arc::new(PlantBatch::new(2, crop("Radish", 6, None, 40, 90), 1, 3, 14));
        let b1 = Arc::new(PlantBatch::new(1, crop("Turnip", 4, None, 20, 35), 1, 1, 14));
        cal.day_mut(3).plants.push(Arc::clone(&b2));
        cal.day_mut(1).plants.push(Arc::clone(&b1));
        cal.day_mut(2).plants.push(Arc::clone(&b1));
        let order: Vec<u64> = cal.batches().iter().map(|b| b.id).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(cal.max_batch_id(), 2);
    }

    #[test]
    fn validate_flags_misplaced_batches() {
        let mut cal = Calendar::new(14, Decimal::new(300, 0), Tiles::Finite(4));
        let b = Arc::new(PlantBatch::new(1, crop("Radish", 6, None, 40, 90), 1, 2, 14));
        // Listed on a day before its planting.
        cal.day_mut(1).plants.push(Arc::clone(&b));
        assert!(cal.validate(0, TileReleasePolicy::OnPayday).is_err());
    }

    proptest::proptest! {
        // A forward shift followed by the matching backward shift is the
        // identity, whatever sits in the calendar.
        #[test]
        fn shift_round_trip_prop(
            k in 1i32..12,
            wallet in 0i64..10_000,
            tiles in 0u64..50,
            plant_day in 1u16..10,
            count in 1u64..20,
        ) {
            let mut cal = Calendar::new(14, Decimal::new(wallet, 0), Tiles::Finite(tiles));
            let b = Arc::new(PlantBatch::new(
                1,
                crop("Radish", 6, None, 40, 90),
                count,
                plant_day,
                14,
            ));
            for d in plant_day..(plant_day + 6).min(15) {
                cal.day_mut(d).plants.push(Arc::clone(&b));
            }
            cal.day_mut(plant_day).day_of_interest = true;
            let back = cal.shift(k).shift(-k);
            proptest::prop_assert_eq!(back, cal);
        }
    }

    #[test]
    fn validate_accepts_sentinel() {
        assert!(Calendar::empty()
            .validate(0, TileReleasePolicy::OnPayday)
            .is_ok());
        assert_eq!(Calendar::empty().wealth(), Decimal::ZERO);
        assert!(Calendar::empty().is_sentinel());
    }
}
