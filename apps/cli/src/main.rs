#![deny(warnings)]

//! Headless CLI: load a scenario, run one planning query, print the
//! schedule and optionally export the calendar as JSON.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use harvest_core::{Calendar, Crop, CropCatalog, Day, PlannerOptions};
use harvest_runtime::{PlanOutcome, PlanRequest, Planner};

#[derive(Default)]
struct CliArgs {
    scenario: Option<String>,
    export_path: Option<String>,
    shallow: bool,
    start_day: Option<Day>,
    wallet: Option<i64>,
    tiles: Option<i64>,
}

fn parse_args() -> CliArgs {
    let mut args = CliArgs::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--export" => args.export_path = it.next(),
            "--shallow" => args.shallow = true,
            "--start-day" => args.start_day = it.next().and_then(|s| s.parse().ok()),
            "--wallet" => args.wallet = it.next().and_then(|s| s.parse().ok()),
            "--tiles" => args.tiles = it.next().and_then(|s| s.parse().ok()),
            _ => {}
        }
    }
    args
}

#[derive(serde::Deserialize)]
struct ScenarioFile {
    season_length: Day,
    #[serde(default = "default_start_day")]
    start_day: Day,
    tiles: i64,
    wallet: i64,
    #[serde(default)]
    options: PlannerOptions,
    crops: Vec<CropSpec>,
}

fn default_start_day() -> Day {
    1
}

#[derive(serde::Deserialize)]
struct CropSpec {
    name: String,
    buy: i64,
    sell: i64,
    grow: Day,
    #[serde(default)]
    regrow: Option<Day>,
    #[serde(default)]
    season: Option<String>,
    #[serde(default)]
    second_season: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CropSpec {
    fn into_crop(self) -> Crop {
        Crop {
            name: self.name,
            days_to_maturity: self.grow,
            regrow: self.regrow,
            buy_price: Decimal::new(self.buy, 0),
            sell_price: Decimal::new(self.sell, 0),
            enabled: self.enabled,
            season: self.season,
            second_season: self.second_season,
        }
    }
}

/// A small built-in scenario so `harvest-cli` with no arguments shows the
/// engine doing something sensible.
fn demo_scenario() -> ScenarioFile {
    let yaml = r#"
season_length: 28
tiles: 100
wallet: 5000
crops:
  - { name: Blueberry, buy: 80, sell: 150, grow: 13, regrow: 4, season: summer }
  - { name: Melon, buy: 80, sell: 250, grow: 12, season: summer }
  - { name: Radish, buy: 40, sell: 90, grow: 6, season: summer }
  - { name: Starfruit, buy: 400, sell: 750, grow: 13, season: summer }
"#;
    serde_yaml::from_str(yaml).expect("built-in scenario parses")
}

fn describe_schedule(calendar: &Calendar, payday_delay: Day) -> String {
    let mut lines = Vec::new();
    if calendar.is_sentinel() {
        return "  (no schedule: run aborted)".to_string();
    }
    let batches = calendar.batches();
    for d in 1..=calendar.terminal_day() {
        let mut actions = Vec::new();
        for batch in &batches {
            if batch.plant_day == d {
                let cost = batch.crop.buy_price * Decimal::from(batch.count);
                actions.push(format!(
                    "plant {} x {} (cost {})",
                    batch.count,
                    batch.crop.name,
                    cost.normalize()
                ));
            }
            if batch.paydays(payday_delay).contains(&d) {
                let credit = batch.crop.sell_price * Decimal::from(batch.count);
                actions.push(format!(
                    "sell {} x {} (credit {})",
                    batch.count,
                    batch.crop.name,
                    credit.normalize()
                ));
            }
        }
        if !actions.is_empty() {
            let state = calendar.day(d);
            lines.push(format!(
                "  day {d:>2}: {} | wallet {} | free tiles {}",
                actions.join(", "),
                state.wallet.normalize(),
                state.free_tiles
            ));
        }
    }
    if lines.is_empty() {
        lines.push("  (nothing worth planting)".to_string());
    }
    lines.join("\n")
}

#[derive(serde::Serialize)]
struct ExportRow {
    day: Day,
    wallet: String,
    free_tiles: i64,
    day_of_interest: bool,
    plants: Vec<ExportBatch>,
}

#[derive(serde::Serialize)]
struct ExportBatch {
    crop: String,
    count: u64,
    plant_day: Day,
}

#[derive(serde::Serialize)]
struct ExportFile {
    value: String,
    season_length: Day,
    aborted: bool,
    rows: Vec<ExportRow>,
}

fn export_json(path: &str, outcome: &PlanOutcome) -> Result<()> {
    let calendar = &outcome.calendar;
    let mut rows = Vec::new();
    if !calendar.is_sentinel() {
        for d in 1..=calendar.terminal_day() {
            let state = calendar.day(d);
            rows.push(ExportRow {
                day: d,
                wallet: state.wallet.normalize().to_string(),
                free_tiles: state.free_tiles.wire(),
                day_of_interest: state.day_of_interest,
                plants: state
                    .plants
                    .iter()
                    .map(|b| ExportBatch {
                        crop: b.crop.name.clone(),
                        count: b.count,
                        plant_day: b.plant_day,
                    })
                    .collect(),
            });
        }
    }
    let file = ExportFile {
        value: outcome.value.normalize().to_string(),
        season_length: calendar.season_len(),
        aborted: outcome.stats.aborted,
        rows,
    };
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(
        scenario = ?args.scenario,
        export = ?args.export_path,
        shallow = args.shallow,
        sha = env!("GIT_SHA"),
        "starting CLI"
    );

    let mut scenario = match &args.scenario {
        Some(name) => {
            // Bundled scenarios go by short name; anything else is a path.
            let path = match name.as_str() {
                "classic" => "assets/scenarios/classic.yaml".to_string(),
                "backyard" => "assets/scenarios/backyard.yaml".to_string(),
                other => other.to_string(),
            };
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading scenario {path}"))?;
            serde_yaml::from_str::<ScenarioFile>(&text)
                .with_context(|| format!("parsing scenario {path}"))?
        }
        None => demo_scenario(),
    };
    if let Some(day) = args.start_day {
        scenario.start_day = day;
    }
    if let Some(wallet) = args.wallet {
        scenario.wallet = wallet;
    }
    if let Some(tiles) = args.tiles {
        scenario.tiles = tiles;
    }

    let payday_delay = scenario.options.payday_delay;
    let catalog = CropCatalog::new(scenario.crops.into_iter().map(CropSpec::into_crop).collect())?;
    let request = PlanRequest {
        season_len: scenario.season_length,
        start_day: scenario.start_day,
        tiles: scenario.tiles,
        wallet: Decimal::new(scenario.wallet, 0),
        catalog,
    };
    let planner = Planner::new(scenario.options).prefer_shallow(args.shallow);
    let outcome = planner.plan(&request)?;

    let label = if outcome.stats.infinite_gold {
        "profit"
    } else {
        "final wealth"
    };
    println!(
        "Plan | {}: {} | greedy floor: {} | season: {} days | start day: {}",
        label,
        outcome.value.normalize(),
        outcome.stats.greedy_wealth.normalize(),
        request.season_len,
        request.start_day
    );
    println!("{}", describe_schedule(&outcome.calendar, payday_delay));
    println!(
        "Search | ops: {} (+{} in workers) | cache hits: {}/{} | shortlist: [{}] | workers: {} | subtrees: {} | {:.1?}{}",
        outcome.stats.sequential_ops,
        outcome.stats.worker_ops,
        outcome.stats.sequential_cache_hits,
        outcome.stats.worker_cache_hits,
        outcome.stats.shortlist.join(", "),
        outcome.stats.workers,
        outcome.stats.subtrees_dispatched,
        outcome.stats.elapsed,
        if outcome.stats.aborted {
            " | ABORTED (memory)"
        } else {
            ""
        }
    );

    let export = args.export_path.unwrap_or_else(|| {
        let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        format!("plans/plan_{}.json", ts)
    });
    if let Err(e) = export_json(&export, &outcome) {
        eprintln!("failed to export plan: {e}");
    } else {
        println!("Plan written: {export}");
    }

    Ok(())
}
