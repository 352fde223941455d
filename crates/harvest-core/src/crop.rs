//! Crop economics.
//!
//! A [`Crop`] is immutable once built: per-tile buy and sell prices, days to
//! first maturity, an optional regrow cadence, and opaque season tags. All
//! derived queries (harvest days, harvest counts, the per-tile profit index)
//! are total functions of the plant day and the season length.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calendar::Tiles;
use crate::error::PlanError;
use crate::Day;

/// One catalog entry. Prices are per tile; `regrow` of `None` means the
/// crop is harvested once and the tile comes back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub name: String,
    /// Days from planting to the first harvest. At least 1.
    pub days_to_maturity: Day,
    /// Regrow cadence in days. `Some(r)` with `1 <= r < season_len` makes
    /// the crop persistent for that season: one planting, a harvest every
    /// `r` days after the first.
    pub regrow: Option<Day>,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub enabled: bool,
    /// Season tags, opaque to the engine.
    pub season: Option<String>,
    pub second_season: Option<String>,
}

impl Crop {
    /// Whether a planting survives to repeated harvests within a season of
    /// `season_len` days.
    pub fn is_persistent(&self, season_len: Day) -> bool {
        match self.regrow {
            Some(r) => r >= 1 && r < season_len,
            None => false,
        }
    }

    /// Ordered harvest days for a planting on `plant_day`, clipped to the
    /// season. Empty when the first harvest would land past the season end.
    pub fn harvest_days(&self, plant_day: Day, season_len: Day) -> Vec<Day> {
        let first = match plant_day.checked_add(self.days_to_maturity) {
            Some(f) => f,
            None => return Vec::new(),
        };
        if first > season_len {
            return Vec::new();
        }
        if !self.is_persistent(season_len) {
            return vec![first];
        }
        let cadence = self.regrow.unwrap_or(1).max(1);
        let mut days = Vec::new();
        let mut d = first;
        while d <= season_len {
            days.push(d);
            d = match d.checked_add(cadence) {
                Some(n) => n,
                None => break,
            };
        }
        days
    }

    /// Number of harvests a planting on `plant_day` yields.
    pub fn num_harvests(&self, plant_day: Day, season_len: Day) -> usize {
        self.harvest_days(plant_day, season_len).len()
    }

    /// Per-tile currency gained by planting this crop on `plant_day` under
    /// payday delay `delay`, over the rest of the season.
    ///
    /// Persistent crops pay once per harvest from a single purchase.
    /// Non-persistent crops are assumed to be replanted every cycle; a
    /// cycle is `days_to_maturity + delay` except the last, which does not
    /// have to wait for its payday. Returns `-buy_price` when no harvest
    /// fits at all.
    pub fn profit_index(&self, plant_day: Day, season_len: Day, delay: Day) -> Decimal {
        if plant_day >= season_len
            || u32::from(plant_day) + u32::from(self.days_to_maturity) > u32::from(season_len)
        {
            return -self.buy_price;
        }
        if self.is_persistent(season_len) {
            let n = self.num_harvests(plant_day, season_len) as u64;
            return Decimal::from(n) * self.sell_price - self.buy_price;
        }
        let cycle = u32::from(self.days_to_maturity) + u32::from(delay);
        let span = u32::from(season_len - plant_day) + u32::from(delay);
        let harvests = if cycle == 0 { 0 } else { span / cycle };
        if harvests == 0 {
            -self.buy_price
        } else {
            Decimal::from(harvests) * (self.sell_price - self.buy_price)
        }
    }

    /// How many tiles of this crop the wallet and the free-tile count
    /// admit. Infinite tiles are gold-limited only; a free crop combined
    /// with infinite tiles is forbidden and plants nothing.
    pub fn units_plantable(&self, free_tiles: Tiles, wallet: Decimal) -> u64 {
        if self.buy_price.is_zero() {
            return match free_tiles {
                Tiles::Infinite => 0,
                Tiles::Finite(t) => t,
            };
        }
        let by_gold = (wallet / self.buy_price)
            .floor()
            .to_u64()
            .unwrap_or_default();
        match free_tiles {
            Tiles::Infinite => by_gold,
            Tiles::Finite(t) => by_gold.min(t),
        }
    }

    /// One line of the worker-configure wire form:
    /// `name;buy;sell;maturity;regrow;season;second_season;enabled`.
    /// A missing regrow cadence is written as `-1`.
    pub fn to_line(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{}",
            self.name,
            self.buy_price.normalize(),
            self.sell_price.normalize(),
            self.days_to_maturity,
            self.regrow.map(i64::from).unwrap_or(-1),
            self.season.as_deref().unwrap_or(""),
            self.second_season.as_deref().unwrap_or(""),
            u8::from(self.enabled),
        )
    }

    /// Inverse of [`Crop::to_line`].
    pub fn parse_line(line: &str) -> Result<Crop, PlanError> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != 8 {
            return Err(PlanError::InvalidInput(format!(
                "crop line has {} fields, expected 8: {line:?}",
                fields.len()
            )));
        }
        let name = fields[0].to_string();
        let buy_price = parse_decimal(fields[1], "buy price")?;
        let sell_price = parse_decimal(fields[2], "sell price")?;
        let days_to_maturity: Day = fields[3]
            .parse()
            .map_err(|_| PlanError::InvalidInput(format!("bad maturity {:?}", fields[3])))?;
        let regrow_raw: i64 = fields[4]
            .parse()
            .map_err(|_| PlanError::InvalidInput(format!("bad regrow {:?}", fields[4])))?;
        let regrow = if regrow_raw >= 1 {
            Some(Day::try_from(regrow_raw).map_err(|_| {
                PlanError::InvalidInput(format!("regrow out of range: {regrow_raw}"))
            })?)
        } else {
            None
        };
        let season = non_empty(fields[5]);
        let second_season = non_empty(fields[6]);
        let enabled = match fields[7] {
            "1" | "true" => true,
            "0" | "false" => false,
            other => {
                return Err(PlanError::InvalidInput(format!(
                    "bad enabled flag {other:?}"
                )))
            }
        };
        let crop = Crop {
            name,
            days_to_maturity,
            regrow,
            buy_price,
            sell_price,
            enabled,
            season,
            second_season,
        };
        crop.validate()?;
        Ok(crop)
    }

    /// Field-level sanity used at catalog build time. Names must stay
    /// clear of the wire separators.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.name.is_empty() {
            return Err(PlanError::InvalidInput("crop with empty name".into()));
        }
        if self.name.contains(&[';', '_', '-', '\n'][..]) {
            return Err(PlanError::InvalidInput(format!(
                "crop name {:?} contains a reserved separator",
                self.name
            )));
        }
        if self.days_to_maturity == 0 {
            return Err(PlanError::InvalidInput(format!(
                "crop {:?} has non-positive days to maturity",
                self.name
            )));
        }
        if self.buy_price < Decimal::ZERO || self.sell_price < Decimal::ZERO {
            return Err(PlanError::InvalidInput(format!(
                "crop {:?} has a negative price",
                self.name
            )));
        }
        Ok(())
    }
}

fn parse_decimal(s: &str, what: &str) -> Result<Decimal, PlanError> {
    s.parse()
        .map_err(|_| PlanError::InvalidInput(format!("bad {what} {s:?}")))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// The crop catalog for one run. Insertion order is preserved; the greedy
/// heuristic breaks ties in favour of earlier entries.
#[derive(Clone, Debug, Default)]
pub struct CropCatalog {
    crops: Vec<Arc<Crop>>,
}

impl CropCatalog {
    pub fn new(crops: Vec<Crop>) -> Result<Self, PlanError> {
        let mut seen = std::collections::HashSet::new();
        for crop in &crops {
            crop.validate()?;
            if !seen.insert(crop.name.clone()) {
                return Err(PlanError::InvalidInput(format!(
                    "duplicate crop name {:?}",
                    crop.name
                )));
            }
        }
        Ok(Self {
            crops: crops.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Crop>> {
        self.crops.iter()
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Crop>> {
        self.crops.iter().find(|c| c.name == name)
    }

    /// Enabled crops in catalog order.
    pub fn enabled(&self) -> Vec<Arc<Crop>> {
        self.crops.iter().filter(|c| c.enabled).cloned().collect()
    }

    /// Lowest buy price among enabled crops. `None` when nothing is
    /// enabled.
    pub fn cheapest_enabled_buy(&self) -> Option<Decimal> {
        self.crops
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.buy_price)
            .min()
    }

    /// The newline-joined configure payload handed to workers.
    pub fn to_blob(&self) -> String {
        self.crops
            .iter()
            .map(|c| c.to_line())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Inverse of [`CropCatalog::to_blob`].
    pub fn parse_blob(blob: &str) -> Result<Self, PlanError> {
        let crops = blob
            .lines()
            .filter(|l| !l.is_empty())
            .map(Crop::parse_line)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(crops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueberry() -> Crop {
        Crop {
            name: "Blueberry".into(),
            days_to_maturity: 13,
            regrow: Some(4),
            buy_price: Decimal::new(80, 0),
            sell_price: Decimal::new(150, 0),
            enabled: true,
            season: Some("summer".into()),
            second_season: None,
        }
    }

    fn radish() -> Crop {
        Crop {
            name: "Radish".into(),
            days_to_maturity: 6,
            regrow: None,
            buy_price: Decimal::new(40, 0),
            sell_price: Decimal::new(90, 0),
            enabled: true,
            season: None,
            second_season: None,
        }
    }

    #[test]
    fn harvest_days_of_persistent_crop() {
        let c = blueberry();
        assert_eq!(c.harvest_days(1, 28), vec![14, 18, 22, 26]);
        assert_eq!(c.num_harvests(1, 28), 4);
        // Too late to mature.
        assert_eq!(c.harvest_days(16, 28), Vec::<Day>::new());
        assert_eq!(c.num_harvests(16, 28), 0);
    }

    #[test]
    fn harvest_days_of_single_harvest_crop() {
        let c = radish();
        assert_eq!(c.harvest_days(1, 28), vec![7]);
        assert_eq!(c.harvest_days(22, 28), vec![28]);
        assert_eq!(c.harvest_days(23, 28), Vec::<Day>::new());
    }

    #[test]
    fn persistence_depends_on_season_length() {
        let mut c = blueberry();
        c.regrow = Some(30);
        assert!(!c.is_persistent(28));
        assert!(c.is_persistent(31));
    }

    #[test]
    fn profit_index_persistent() {
        let c = blueberry();
        // 4 harvests at 150, one 80 purchase.
        assert_eq!(c.profit_index(1, 28, 0), Decimal::new(520, 0));
        // No harvest fits: pure loss.
        assert_eq!(c.profit_index(16, 28, 0), Decimal::new(-80, 0));
    }

    #[test]
    fn profit_index_replant_cycles() {
        let c = radish();
        // floor(27 / 6) = 4 cycles of 50 profit.
        assert_eq!(c.profit_index(1, 28, 0), Decimal::new(200, 0));
        // A payday delay lengthens every cycle but the last:
        // floor((27 + 1) / 7) = 4.
        assert_eq!(c.profit_index(1, 28, 1), Decimal::new(200, 0));
        assert_eq!(c.profit_index(1, 28, 3), Decimal::new(150, 0));
    }

    #[test]
    fn units_plantable_limits() {
        let c = blueberry();
        assert_eq!(
            c.units_plantable(Tiles::Finite(100), Decimal::new(5000, 0)),
            62
        );
        assert_eq!(
            c.units_plantable(Tiles::Finite(10), Decimal::new(5000, 0)),
            10
        );
        assert_eq!(
            c.units_plantable(Tiles::Infinite, Decimal::new(5000, 0)),
            62
        );
        assert_eq!(c.units_plantable(Tiles::Finite(10), Decimal::ZERO), 0);
    }

    #[test]
    fn free_crop_with_infinite_tiles_is_forbidden() {
        let mut c = radish();
        c.buy_price = Decimal::ZERO;
        assert_eq!(c.units_plantable(Tiles::Infinite, Decimal::new(100, 0)), 0);
        assert_eq!(
            c.units_plantable(Tiles::Finite(7), Decimal::new(100, 0)),
            7
        );
    }

    #[test]
    fn crop_line_round_trip() {
        for crop in [blueberry(), radish()] {
            let line = crop.to_line();
            let back = Crop::parse_line(&line).unwrap();
            assert_eq!(back, crop);
        }
        assert_eq!(blueberry().to_line(), "Blueberry;80;150;13;4;summer;;1");
    }

    #[test]
    fn bad_lines_are_rejected() {
        assert!(Crop::parse_line("only;three;fields").is_err());
        assert!(Crop::parse_line("X;eighty;150;13;4;;;1").is_err());
        assert!(Crop::parse_line("X;80;150;0;4;;;1").is_err());
        assert!(Crop::parse_line("X;80;150;13;4;;;maybe").is_err());
    }

    #[test]
    fn catalog_rejects_reserved_names_and_duplicates() {
        let mut bad = radish();
        bad.name = "Hot_Pepper".into();
        assert!(CropCatalog::new(vec![bad]).is_err());
        assert!(CropCatalog::new(vec![radish(), radish()]).is_err());
    }

    #[test]
    fn catalog_blob_round_trip() {
        let cat = CropCatalog::new(vec![blueberry(), radish()]).unwrap();
        let blob = cat.to_blob();
        let back = CropCatalog::parse_blob(&blob).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.to_blob(), blob);
        assert_eq!(back.cheapest_enabled_buy(), Some(Decimal::new(40, 0)));
    }

    #[test]
    fn enabled_view_skips_disabled() {
        let mut r = radish();
        r.enabled = false;
        let cat = CropCatalog::new(vec![blueberry(), r]).unwrap();
        let enabled = cat.enabled();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "Blueberry");
    }
}
