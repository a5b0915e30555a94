//! # Simulator
//!
//! Drives N season rolls into the outcome accumulators. Iterations are
//! independent, so the driver shards naturally: each worker owns a
//! zero-initialised [`Simulator`] over the shared immutable snapshot and the
//! coordinator folds the shards back together with the monoidal merges.
//! With fixed per-worker seeds and shard sizes the merged result is
//! deterministic regardless of scheduling.
use crate::conference::ConferenceName;
use crate::game::{Game, Matchup};
use crate::outcomes::{
    ConferenceSeasonOutcomes, Merge, OutcomeError, ScenarioOutcomes, WeekOutcomes,
};
use crate::roll::UniformSource;
use crate::scenario::ScenarioError;
use crate::season::{SeasonError, SeasonSnapshot};
use crate::conference::tiebreak::{SeederRegistry, TieError};
use crate::Date;
use log::{debug, warn};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SimError {
    #[error("Season error: {0}")]
    Season(#[from] SeasonError),
    #[error("Tiebreak error: {0}")]
    Tie(#[from] TieError),
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("Outcome error: {0}")]
    Outcome(#[from] OutcomeError),
}

/// Monte-Carlo driver over one season snapshot.
pub struct Simulator {
    season: SeasonSnapshot,
    registry: SeederRegistry,
    scenarios: Vec<ScenarioOutcomes>,
    conference_outcomes: BTreeMap<ConferenceName, ConferenceSeasonOutcomes>,
    week_outcomes: BTreeMap<ConferenceName, WeekOutcomes>,
}

impl Simulator {
    /// `week_start..=week_end` selects each conference's games of interest
    /// for the [`WeekOutcomes`] tallies.
    pub fn new(
        season: SeasonSnapshot,
        registry: SeederRegistry,
        scenarios: Vec<ScenarioOutcomes>,
        week_start: Date,
        week_end: Date,
    ) -> Self {
        let mut conference_outcomes = BTreeMap::new();
        let mut week_outcomes = BTreeMap::new();
        for conference in season.conferences() {
            let week_games: Vec<Matchup> = season
                .games()
                .iter()
                .filter(|game| game.date() >= week_start && game.date() <= week_end)
                .filter(|game| {
                    conference.teams.contains(game.away())
                        || conference.teams.contains(game.home())
                })
                .map(Game::matchup)
                .collect();
            conference_outcomes.insert(
                conference.name.clone(),
                ConferenceSeasonOutcomes::default(),
            );
            week_outcomes.insert(conference.name.clone(), WeekOutcomes::new(week_games));
        }
        Self {
            season,
            registry,
            scenarios,
            conference_outcomes,
            week_outcomes,
        }
    }

    pub fn season(&self) -> &SeasonSnapshot {
        &self.season
    }

    pub fn scenarios(&self) -> &[ScenarioOutcomes] {
        &self.scenarios
    }

    pub fn conference_outcomes(&self) -> &BTreeMap<ConferenceName, ConferenceSeasonOutcomes> {
        &self.conference_outcomes
    }

    pub fn week_outcomes(&self) -> &BTreeMap<ConferenceName, WeekOutcomes> {
        &self.week_outcomes
    }

    /// A worker copy: shared snapshot, zeroed accumulators.
    pub fn shard(&self) -> Simulator {
        Simulator {
            season: self.season.clone(),
            registry: self.registry.clone(),
            scenarios: self
                .scenarios
                .iter()
                .map(ScenarioOutcomes::shallow_clone)
                .collect(),
            conference_outcomes: self
                .conference_outcomes
                .keys()
                .map(|name| (name.clone(), ConferenceSeasonOutcomes::default()))
                .collect(),
            week_outcomes: self
                .week_outcomes
                .iter()
                .map(|(name, week)| (name.clone(), week.shallow_clone()))
                .collect(),
        }
    }

    /// Fold another simulator's tallies into this one.
    pub fn merge(&mut self, other: Simulator) {
        for (name, outcomes) in other.conference_outcomes {
            self.conference_outcomes
                .entry(name)
                .or_default()
                .merge(outcomes);
        }
        for (name, week) in other.week_outcomes {
            if let Some(mine) = self.week_outcomes.get_mut(&name) {
                mine.merge(week);
            } else {
                self.week_outcomes.insert(name, week);
            }
        }
        for (mine, theirs) in self.scenarios.iter_mut().zip(other.scenarios) {
            mine.merge(theirs);
        }
    }

    /// Run `iterations` unconstrained season rolls.
    ///
    /// # Errors
    ///
    /// A tiebreak or accumulator failure aborts the run; tallies collected
    /// so far are kept.
    pub fn simulate<S: UniformSource>(
        &mut self,
        iterations: u64,
        source: &mut S,
    ) -> Result<(), SimError> {
        let source: &mut dyn UniformSource = source;
        for _ in 0..iterations {
            self.simulate_once(source)?;
        }
        Ok(())
    }

    fn simulate_once(&mut self, source: &mut dyn UniformSource) -> Result<(), SimError> {
        let rolled = self.season.roll(source);
        let mut ccg_games: Vec<Matchup> = Vec::new();
        for conference in rolled.conferences() {
            if !conference.has_championship_game {
                continue;
            }
            let Some(seeder) = self.registry.get(&conference.name) else {
                debug!("no seeder registered for {}", conference.name);
                continue;
            };
            let view = rolled.conference(&conference.name)?;
            let (seed_1, seed_2) = seeder.seed(&view, source)?;
            let ccg = Matchup::new(seed_1, seed_2);
            self.conference_outcomes
                .get_mut(&conference.name)
                .expect("accumulators exist for every conference")
                .accept(&view, &ccg)?;
            if let Some(week) = self.week_outcomes.get_mut(&conference.name) {
                week.accept(&view, &ccg)?;
            }
            ccg_games.push(ccg);
        }
        for scenario in &mut self.scenarios {
            scenario.accept(&rolled, &ccg_games)?;
        }
        Ok(())
    }

    /// Run `iterations` rolls constrained by the scenario's forcers,
    /// counting each into the scenario's own tallies.
    ///
    /// # Errors
    ///
    /// Fails with *ScenarioInvalid* if a constrained roll does not satisfy
    /// the scenario's predicates, which indicates a forcer that cannot fully
    /// encode its condition.
    pub fn simulate_scenario<S: UniformSource>(
        &self,
        scenario: &mut ScenarioOutcomes,
        iterations: u64,
        source: &mut S,
    ) -> Result<(), SimError> {
        let source: &mut dyn UniformSource = source;
        let conditions = scenario.conditions().to_vec();
        for iteration in 0..iterations {
            let rolled = self.season.roll_with_forcers(source, &conditions)?;
            let ccg_games = self.championship_games(&rolled, source)?;
            if !scenario.accept(&rolled, &ccg_games)? {
                let description = scenario.description(", ");
                warn!(
                    "scenario '{}' produced an unsatisfying season at iteration {}",
                    description, iteration
                );
                return Err(SimError::Scenario(ScenarioError::ScenarioInvalid {
                    scenario: description,
                    iteration,
                }));
            }
        }
        Ok(())
    }

    fn championship_games(
        &self,
        rolled: &SeasonSnapshot,
        source: &mut dyn UniformSource,
    ) -> Result<Vec<Matchup>, SimError> {
        let mut ccg_games = Vec::new();
        for conference in rolled.conferences() {
            if !conference.has_championship_game {
                continue;
            }
            let Some(seeder) = self.registry.get(&conference.name) else {
                continue;
            };
            let view = rolled.conference(&conference.name)?;
            let (seed_1, seed_2) = seeder.seed(&view, source)?;
            ccg_games.push(Matchup::new(seed_1, seed_2));
        }
        Ok(ccg_games)
    }

    /// Shard `iterations` across one seeded worker per entry of `seeds` and
    /// merge the results.
    ///
    /// Failed shards are logged and skipped; successful shards are merged
    /// regardless, then the first failure is returned.
    ///
    /// # Errors
    ///
    /// The first shard failure, after merging the surviving shards.
    pub fn simulate_parallel(&mut self, iterations: u64, seeds: &[u64]) -> Result<(), SimError> {
        if seeds.is_empty() || iterations == 0 {
            return Ok(());
        }
        let sizes = shard_sizes(iterations, seeds.len());
        let shards: Vec<Result<Simulator, SimError>> = {
            let this: &Simulator = &*self;
            seeds
                .par_iter()
                .enumerate()
                .map(|(index, &seed)| {
                    let mut shard = this.shard();
                    let mut rng = StdRng::seed_from_u64(seed);
                    shard.simulate(sizes[index], &mut rng)?;
                    Ok(shard)
                })
                .collect()
        };
        let mut first_error = None;
        for result in shards {
            match result {
                Ok(shard) => self.merge(shard),
                Err(error) => {
                    warn!("simulation shard failed: {error}");
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Simulate every scenario independently, one worker per scenario.
    ///
    /// Each scenario gets `iterations` constrained rolls and its own rng
    /// derived from `base_seed`. A failed scenario's partial tallies are
    /// discarded, reported as an error in its slot.
    pub fn run_scenarios_parallel(
        &self,
        scenarios: Vec<ScenarioOutcomes>,
        iterations: u64,
        base_seed: u64,
    ) -> Vec<Result<ScenarioOutcomes, SimError>> {
        scenarios
            .into_par_iter()
            .enumerate()
            .map(|(index, mut scenario)| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
                match self.simulate_scenario(&mut scenario, iterations, &mut rng) {
                    Ok(()) => Ok(scenario),
                    Err(error) => {
                        warn!(
                            "scenario '{}' failed: {error}",
                            scenario.description(", ")
                        );
                        Err(error)
                    }
                }
            })
            .collect()
    }
}

/// Evenly sized shards, remainder on the last one.
fn shard_sizes(iterations: u64, workers: usize) -> Vec<u64> {
    let per_worker = iterations / workers as u64;
    let mut sizes = vec![per_worker; workers];
    if let Some(last) = sizes.last_mut() {
        *last += iterations % workers as u64;
    }
    sizes
}
