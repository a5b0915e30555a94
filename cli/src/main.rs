#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use ccg_core::conference::tiebreak::standard_registry;
use ccg_core::conference::ConferenceName;
use ccg_core::outcomes::{ConferenceSeasonOutcomes, ScenarioOutcomes};
use ccg_core::scenario::ScenarioCondition;
use ccg_core::season::SeasonSnapshot;
use ccg_core::simulator::Simulator;
use ccg_core::{Date, REGULAR_SEASON_GAMES};
use chrono::{Datelike, Duration, Local, Weekday};
use itertools::Itertools;
use log::info;
use rand::Rng;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "ccg", about = "Conference championship Monte-Carlo simulator")]
enum Opt {
    /// Run season simulations and print outcome tables
    Simulate {
        /// Season snapshot file
        #[structopt(parse(from_os_str))]
        snapshot: PathBuf,
        /// Number of simulated seasons
        #[structopt(long, default_value = "100000")]
        iterations: u64,
        /// Worker count; defaults to the available parallelism
        #[structopt(long)]
        workers: Option<usize>,
        /// Base seed for reproducible runs
        #[structopt(long)]
        seed: Option<u64>,
        /// Restrict the snapshot to one conference
        #[structopt(long)]
        conference: Option<String>,
    },
    /// Print a summary of a season snapshot
    Inspect {
        /// Season snapshot file
        #[structopt(parse(from_os_str))]
        snapshot: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    match Opt::from_args() {
        Opt::Simulate {
            snapshot,
            iterations,
            workers,
            seed,
            conference,
        } => simulate(&snapshot, iterations, workers, seed, conference),
        Opt::Inspect { snapshot } => inspect(&snapshot),
    }
}

fn load(path: &Path, conference: Option<&str>) -> Result<SeasonSnapshot> {
    let season = ccg_data::file_io::load_season(path, None)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    match conference {
        Some(name) => season
            .filter(&ConferenceName::from(name))
            .with_context(|| format!("filtering to conference {name}")),
        None => Ok(season),
    }
}

fn simulate(
    path: &Path,
    iterations: u64,
    workers: Option<usize>,
    seed: Option<u64>,
    conference: Option<String>,
) -> Result<()> {
    let season = load(path, conference.as_deref())?;
    let registry = standard_registry(season.conferences());
    let scenarios = vec![ScenarioOutcomes::new(vec![ScenarioCondition::any_outcome()])];
    let (week_start, week_end) = current_week();
    let mut simulator = Simulator::new(season, registry, scenarios, week_start, week_end);

    let workers = workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    let base_seed = seed.unwrap_or_else(|| rand::rng().random());
    let seeds: Vec<u64> = (0..workers)
        .map(|index| base_seed.wrapping_add(index as u64))
        .collect();
    info!("simulating {iterations} seasons on {workers} workers (seed {base_seed})");
    simulator.simulate_parallel(iterations, &seeds)?;

    for (name, outcomes) in simulator.conference_outcomes() {
        print_conference(name, outcomes);
    }
    Ok(())
}

fn print_conference(name: &ConferenceName, outcomes: &ConferenceSeasonOutcomes) {
    println!("{name} ({} simulated seasons)", outcomes.total_seasons);
    println!("{:<16} {:>8} {:>14}", "team", "P(CCG)", "likely record");
    let by_probability = outcomes
        .team_names()
        .into_iter()
        .map(|team| {
            let probability = outcomes.prob_in_ccg(&team);
            (team, probability)
        })
        .sorted_by(|a, b| b.1.total_cmp(&a.1));
    for (team, probability) in by_probability {
        let likely = outcomes
            .prob_final_win_count(&team)
            .into_iter()
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .next();
        let record = match likely {
            Some((wins, _)) => format!("{wins}-{}", REGULAR_SEASON_GAMES.saturating_sub(wins)),
            None => String::from("-"),
        };
        println!("{team:<16} {:>7.1}% {record:>14}", probability * 100.0);
    }
    println!();
    println!("most likely championship games:");
    for (matchup, count) in outcomes
        .ccg_participants
        .iter()
        .sorted_by_key(|(_, count)| std::cmp::Reverse(**count))
        .take(10)
    {
        let probability = *count as f64 / outcomes.total_seasons.max(1) as f64;
        println!("  {:>5.1}%  {matchup}", probability * 100.0);
    }
    println!();
}

fn inspect(path: &Path) -> Result<()> {
    let season = load(path, None)?;
    println!("{} season snapshot", season.year());
    println!(
        "{} conferences, {} games ({} played)",
        season.conferences().len(),
        season.games().len(),
        season.games().iter().filter(|game| game.is_over()).count()
    );
    for conference in season.conferences() {
        println!();
        println!(
            "{} ({} teams{})",
            conference.name,
            conference.teams.len(),
            if conference.has_championship_game {
                ", championship game"
            } else {
                ""
            }
        );
        for team in &conference.teams {
            let view = season.team(team)?;
            println!(
                "  {team:<16} {:>6}  predicted {}",
                view.record().to_string(),
                view.predicted_record()
            );
        }
    }
    Ok(())
}

/// Today through the coming Sunday, the window of "this week's" games.
fn current_week() -> (Date, Date) {
    let today = Local::now().date_naive();
    let mut end = today + Duration::days(7);
    while end.weekday() != Weekday::Sun {
        end -= Duration::days(1);
    }
    (Date::from(today), Date::from(end))
}
