//! Engine configuration options.
//!
//! All knobs recognised by the engine, with the documented defaults. The
//! struct deserializes from scenario files; absent fields keep their
//! defaults so a minimal scenario stays minimal.

use serde::Deserialize;

/// When a non-persistent batch gives its tiles back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileReleasePolicy {
    /// Tiles free up on the harvest day itself, even if the sale settles
    /// later. More realistic when the payday delay is positive.
    OnHarvest,
    /// Tiles stay occupied until the sale settles. Default.
    OnPayday,
}

/// Tunables for one planning run. Installed at configure time and
/// read-only thereafter.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerOptions {
    /// Ceiling on shortlist size before the tile-to-currency reduction.
    pub max_num_crop_types: usize,
    /// `true` selects [`TileReleasePolicy::OnHarvest`].
    pub return_tiles_asap: bool,
    /// Permit several plantings on the same decision day.
    pub multi_crop: bool,
    /// Toggle the canonical calendar cache.
    pub use_cache: bool,
    /// Frontier size at which the run switches from sequential expansion
    /// to deep (subtree-per-worker) dispatch.
    pub deep_seeds: usize,
    /// Abort threshold for the memory monitor, in gigabytes.
    pub memory_threshold_gb: f64,
    /// Days between a harvest and the wallet credit.
    pub payday_delay: u16,
    /// A branch is only extended while the wallet holds at least this
    /// fraction of the starting gold.
    pub gold_floor_fraction: f64,
    /// A branch is only extended while more than this fraction of the
    /// starting tiles is still free.
    pub tile_floor_fraction: f64,
    /// Significant digits kept when bucketing wallet and tile counts for
    /// the cache key.
    pub cache_sig_digits: u32,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            max_num_crop_types: 5,
            return_tiles_asap: false,
            multi_crop: true,
            use_cache: true,
            deep_seeds: 120,
            memory_threshold_gb: 1.38,
            payday_delay: 0,
            gold_floor_fraction: 0.5,
            tile_floor_fraction: 0.07,
            cache_sig_digits: 2,
        }
    }
}

impl PlannerOptions {
    /// The tile-release policy implied by `return_tiles_asap`.
    pub fn release_policy(&self) -> TileReleasePolicy {
        if self.return_tiles_asap {
            TileReleasePolicy::OnHarvest
        } else {
            TileReleasePolicy::OnPayday
        }
    }
}
