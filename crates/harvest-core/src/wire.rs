//! Canonical calendar text forms.
//!
//! Two serializations share one line grammar:
//!
//! ```text
//! <day>_<wallet>_<free_tiles>[_<plants>]
//! ```
//!
//! The *wire* form (worker hand-off) carries raw numbers and the plant
//! batches (`name;count;plant_day;num_days`, joined with `-`). The *cache
//! key* form buckets wallet and tile counts to a small number of
//! significant digits and never carries plants: two calendars whose
//! remaining future is economically indistinguishable under that rounding
//! must produce the same key.
//!
//! Lines are emitted only for days of interest, plus the first and last
//! day of the serialized range. Infinite tiles serialize as `-1`.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::calendar::{Calendar, DayState, PlantBatch, Tiles};
use crate::crop::CropCatalog;
use crate::error::PlanError;
use crate::options::TileReleasePolicy;
use crate::Day;

/// Round to `digits` significant figures, half to even. Zero stays zero.
pub fn round_sig(x: Decimal, digits: u32) -> Decimal {
    if x.is_zero() {
        return Decimal::ZERO;
    }
    let digits = digits.max(1);
    let mantissa = x.mantissa().unsigned_abs();
    let magnitude = decimal_digit_count(mantissa) as i64 - 1 - i64::from(x.scale());
    let k = magnitude - (i64::from(digits) - 1);
    if k <= 0 {
        x.round_dp_with_strategy((-k) as u32, RoundingStrategy::MidpointNearestEven)
    } else {
        let pow = Decimal::from_i128_with_scale(10i128.pow(k as u32), 0);
        (x / pow).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * pow
    }
}

fn decimal_digit_count(mut v: u128) -> u32 {
    let mut n = 1;
    while v >= 10 {
        v /= 10;
        n += 1;
    }
    n
}

fn bucket_label(x: Decimal, digits: u32) -> String {
    round_sig(x, digits).normalize().to_string()
}

fn tiles_bucket(tiles: Tiles, digits: u32) -> String {
    match tiles {
        Tiles::Infinite => "-1".to_string(),
        Tiles::Finite(t) => bucket_label(Decimal::from(t), digits),
    }
}

fn line_days(cal: &Calendar, from_day: Day) -> Vec<Day> {
    let terminal = cal.terminal_day();
    (from_day..=terminal)
        .filter(|d| cal.day(*d).day_of_interest || *d == from_day || *d == terminal)
        .collect()
}

/// The cache-lookup key for the future of `cal` as seen from `from_day`.
pub fn cache_key(cal: &Calendar, from_day: Day, digits: u32) -> String {
    line_days(cal, from_day)
        .into_iter()
        .map(|d| {
            let st = cal.day(d);
            format!(
                "{d}_{}_{}",
                bucket_label(st.wallet, digits),
                tiles_bucket(st.free_tiles, digits)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The worker hand-off form of `cal` from `from_day` onward.
pub fn to_wire(cal: &Calendar, from_day: Day) -> String {
    line_days(cal, from_day)
        .into_iter()
        .map(|d| {
            let st = cal.day(d);
            let mut line = format!(
                "{d}_{}_{}",
                st.wallet.normalize(),
                st.free_tiles.wire()
            );
            if !st.plants.is_empty() {
                line.push('_');
                line.push_str(
                    &st.plants
                        .iter()
                        .map(|b| b.wire())
                        .collect::<Vec<_>>()
                        .join("-"),
                );
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct LineRec {
    day: Day,
    wallet: Decimal,
    tiles: i64,
    batches: Vec<BatchRec>,
}

struct BatchRec {
    name: String,
    count: u64,
    plant_day: Day,
    num_days: Day,
}

impl BatchRec {
    fn key(&self) -> String {
        format!("{};{};{};{}", self.name, self.count, self.plant_day, self.num_days)
    }
}

fn parse_line(line: &str) -> Result<LineRec, PlanError> {
    let bad = |what: &str| PlanError::InvalidInput(format!("{what} in calendar line {line:?}"));
    let mut parts = line.splitn(4, '_');
    let day: Day = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("bad day"))?;
    let wallet: Decimal = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("bad wallet"))?;
    let tiles: i64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("bad tile count"))?;
    let mut batches = Vec::new();
    if let Some(plants) = parts.next() {
        for item in plants.split('-') {
            let fields: Vec<&str> = item.split(';').collect();
            if fields.len() != 4 {
                return Err(bad("bad batch"));
            }
            batches.push(BatchRec {
                name: fields[0].to_string(),
                count: fields[1].parse().map_err(|_| bad("bad batch count"))?,
                plant_day: fields[2].parse().map_err(|_| bad("bad batch day"))?,
                num_days: fields[3].parse().map_err(|_| bad("bad batch span"))?,
            });
        }
    }
    Ok(LineRec {
        day,
        wallet,
        tiles,
        batches,
    })
}

/// Rebuild a calendar from its wire form.
///
/// Wallet values are carried forward between listed days (they only change
/// on listed days); tile counts and per-day plant lists are re-derived
/// from the batches, whose occupancy follows the same release rules the
/// transition uses.
pub fn from_wire(
    blob: &str,
    catalog: &CropCatalog,
    delay: Day,
    policy: TileReleasePolicy,
) -> Result<Calendar, PlanError> {
    let lines = blob
        .lines()
        .filter(|l| !l.is_empty())
        .map(parse_line)
        .collect::<Result<Vec<_>, _>>()?;
    if lines.is_empty() {
        return Err(PlanError::InvalidInput("empty calendar blob".into()));
    }
    if lines.windows(2).any(|w| w[0].day >= w[1].day) {
        return Err(PlanError::InvalidInput(
            "calendar lines out of order".into(),
        ));
    }
    let terminal = lines.last().map(|l| l.day).unwrap_or(1);
    if terminal < 1 {
        return Err(PlanError::InvalidInput("terminal day missing".into()));
    }
    let season_len = terminal - 1;
    let first_day = lines[0].day;

    // Batches in first-encounter order; the encounter order is the
    // planting order because a batch always appears on its plant day.
    let mut batches: Vec<Arc<PlantBatch>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for line in &lines {
        for rec in &line.batches {
            if by_key.contains_key(&rec.key()) {
                continue;
            }
            let crop = catalog.get(&rec.name).ok_or_else(|| {
                PlanError::InvalidInput(format!("unknown crop {:?} in calendar blob", rec.name))
            })?;
            let id = batches.len() as u64 + 1;
            by_key.insert(rec.key(), batches.len());
            batches.push(Arc::new(PlantBatch::new(
                id,
                Arc::clone(crop),
                rec.count,
                rec.plant_day,
                rec.num_days,
            )));
        }
    }

    // Total capacity = free tiles on the first listed day plus whatever
    // the batches occupy there.
    let infinite = lines[0].tiles < 0;
    let base_total: u64 = if infinite {
        0
    } else {
        let occupied: u64 = batches
            .iter()
            .filter(|b| b.occupies(first_day, delay, policy))
            .map(|b| b.count)
            .sum();
        (lines[0].tiles as u64).saturating_add(occupied)
    };

    let mut payday_flags = vec![false; terminal as usize + 1];
    for b in &batches {
        for p in b.paydays(delay) {
            if let Some(slot) = payday_flags.get_mut(p as usize) {
                *slot = true;
            }
        }
        if let Some(slot) = payday_flags.get_mut(b.plant_day as usize) {
            *slot = true;
        }
    }

    let mut cal = Calendar::new(season_len, Decimal::ZERO, Tiles::Finite(0));
    // Overwrite the constructor's uniform days with the reconstruction.
    let mut wallet = Decimal::ZERO;
    let mut li = 0usize;
    let mut prev_wallet = Decimal::ZERO;
    for d in 1..=terminal {
        if lines.get(li).map(|l| l.day) == Some(d) {
            wallet = lines[li].wallet;
            li += 1;
        }
        if d < first_day {
            *cal.day_mut(d) = DayState::default();
            continue;
        }
        let plants: Vec<Arc<PlantBatch>> = batches
            .iter()
            .filter(|b| b.occupies(d, delay, policy))
            .cloned()
            .collect();
        let used: u64 = plants.iter().map(|b| b.count).sum();
        let free_tiles = if infinite {
            Tiles::Infinite
        } else {
            Tiles::Finite(base_total.saturating_sub(used))
        };
        let day_of_interest = d == terminal
            || payday_flags[d as usize]
            || (d > first_day && wallet != prev_wallet);
        *cal.day_mut(d) = DayState {
            wallet,
            free_tiles,
            plants,
            day_of_interest,
        };
        prev_wallet = wallet;
    }
    Ok(cal)
}
