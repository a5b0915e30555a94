//! # Scenario conditions
//!
//! A [`ScenarioCondition`] is both a predicate over a fully rolled season
//! and a forcer that samples *from* the condition directly. The dual role
//! matters: rejection sampling a rare condition is hopeless, so the forcer
//! biases the roll toward the condition and the predicate re-verifies the
//! result afterwards. A forcer that cannot fully encode its predicate
//! surfaces as *ScenarioInvalid* in the simulator instead of silently
//! skewing the tallies.
//!
//! Conditions also carry their analytic probability and the per-matchup
//! factors behind it, so joint scenario probabilities can be computed
//! without simulating.
use crate::game::{Game, GameError, Matchup};
use crate::roll::UniformSource;
use crate::season::{SeasonError, SeasonSnapshot};
use crate::team::{RollConstraints, RollError, TeamName};
use crate::REGULAR_SEASON_GAMES;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Display table for compact scenario descriptions; falls back to the full
/// team name.
#[derive(Debug, Clone, Default)]
pub struct ShortNames(BTreeMap<TeamName, String>);

impl ShortNames {
    pub fn new(names: BTreeMap<TeamName, String>) -> Self {
        Self(names)
    }

    pub fn insert(&mut self, team: TeamName, short: impl Into<String>) {
        self.0.insert(team, short.into());
    }

    pub fn get<'a>(&'a self, team: &'a TeamName) -> &'a str {
        self.0.get(team).map(String::as_str).unwrap_or(team.as_ref())
    }

    fn join(&self, teams: &BTreeSet<TeamName>) -> String {
        teams
            .iter()
            .map(|team| self.get(team))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ConditionKind {
    WinExactly {
        team: TeamName,
        wins: u32,
        required_wins: BTreeSet<TeamName>,
        required_losses: BTreeSet<TeamName>,
    },
    WinAtMost {
        team: TeamName,
        max_wins: u32,
        required_wins: BTreeSet<TeamName>,
        required_losses: BTreeSet<TeamName>,
    },
    Beat {
        winner: TeamName,
        loser: TeamName,
    },
    WinOutExceptPossibly {
        team: TeamName,
        allowed_losses: BTreeSet<TeamName>,
    },
    AnyOutcome,
}

/// A what-if condition: predicate, forcer and analytic probability in one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioCondition {
    kind: ConditionKind,
    description: String,
    probability: f64,
    probability_factors: BTreeMap<Matchup, f64>,
}

impl ScenarioCondition {
    /// `team` finishes with exactly `wins` wins, beating everyone in
    /// `required_wins` and losing to everyone in `required_losses`.
    ///
    /// # Errors
    ///
    /// Errors if the team is unknown or the constraint set is inconsistent.
    pub fn win_exactly(
        season: &SeasonSnapshot,
        team: &TeamName,
        wins: u32,
        required_wins: BTreeSet<TeamName>,
        required_losses: BTreeSet<TeamName>,
        names: &ShortNames,
    ) -> Result<Self, ScenarioError> {
        let mut description = format!(
            "{} {}-{}",
            names.get(team),
            wins,
            REGULAR_SEASON_GAMES as i64 - i64::from(wins)
        );
        if !required_wins.is_empty() {
            description += &format!(", beat {}", names.join(&required_wins));
        }
        if !required_losses.is_empty() {
            description += &format!(", lost to {}", names.join(&required_losses));
        }
        Self::win_exactly_described(season, team, wins, required_wins, required_losses, description)
    }

    fn win_exactly_described(
        season: &SeasonSnapshot,
        team: &TeamName,
        wins: u32,
        required_wins: BTreeSet<TeamName>,
        required_losses: BTreeSet<TeamName>,
        description: String,
    ) -> Result<Self, ScenarioError> {
        let constraints = RollConstraints {
            total_wins: Some(wins),
            wins_against: required_wins.clone(),
            losses_against: required_losses.clone(),
            ..RollConstraints::default()
        };
        let (probability, probability_factors) =
            season.team(team)?.probability_of(&constraints)?;
        Ok(Self {
            kind: ConditionKind::WinExactly {
                team: team.clone(),
                wins,
                required_wins,
                required_losses,
            },
            description,
            probability,
            probability_factors,
        })
    }

    /// `team` finishes with at most `max_wins` wins.
    ///
    /// # Errors
    ///
    /// Errors if the team is unknown or the constraint set is inconsistent.
    pub fn win_at_most(
        season: &SeasonSnapshot,
        team: &TeamName,
        max_wins: u32,
        required_wins: BTreeSet<TeamName>,
        required_losses: BTreeSet<TeamName>,
        names: &ShortNames,
    ) -> Result<Self, ScenarioError> {
        let mut description = format!(
            "{} {}-{} or worse",
            names.get(team),
            max_wins,
            REGULAR_SEASON_GAMES as i64 - i64::from(max_wins)
        );
        if !required_wins.is_empty() {
            description += &format!(", beat {}", names.join(&required_wins));
        }
        if !required_losses.is_empty() {
            description += &format!(", lost to {}", names.join(&required_losses));
        }
        let constraints = RollConstraints {
            max_wins: Some(max_wins),
            wins_against: required_wins.clone(),
            losses_against: required_losses.clone(),
            ..RollConstraints::default()
        };
        let (probability, probability_factors) =
            season.team(team)?.probability_of(&constraints)?;
        Ok(Self {
            kind: ConditionKind::WinAtMost {
                team: team.clone(),
                max_wins,
                required_wins,
                required_losses,
            },
            description,
            probability,
            probability_factors,
        })
    }

    /// `team` loses none of its remaining games.
    ///
    /// # Errors
    ///
    /// Errors if the team is unknown.
    pub fn win_out(
        season: &SeasonSnapshot,
        team: &TeamName,
        names: &ShortNames,
    ) -> Result<Self, ScenarioError> {
        let view = season.team(team)?;
        let total = view.wins() + view.remaining_games().count() as u32;
        Self::win_exactly(season, team, total, BTreeSet::new(), BTreeSet::new(), names)
    }

    /// `team` wins out except for losses to exactly `losses`.
    ///
    /// # Errors
    ///
    /// Errors if the team is unknown or a named loss is not remaining.
    pub fn win_out_except(
        season: &SeasonSnapshot,
        team: &TeamName,
        losses: BTreeSet<TeamName>,
        names: &ShortNames,
    ) -> Result<Self, ScenarioError> {
        let view = season.team(team)?;
        // An oversized loss set is caught by the roll-plan validation below.
        let wins = (view.wins() + view.remaining_games().count() as u32)
            .saturating_sub(losses.len() as u32);
        let description = format!("{} lose to {}", names.get(team), names.join(&losses));
        Self::win_exactly_described(season, team, wins, BTreeSet::new(), losses, description)
    }

    /// `winner` beats `loser`.
    ///
    /// # Errors
    ///
    /// Errors if the teams are unknown or never meet.
    pub fn beat(
        season: &SeasonSnapshot,
        winner: &TeamName,
        loser: &TeamName,
        names: &ShortNames,
    ) -> Result<Self, ScenarioError> {
        let view = season.team(winner)?;
        let game = view
            .game_against(loser)
            .ok_or_else(|| ScenarioError::NoSuchGame {
                team: winner.clone(),
                opponent: loser.clone(),
            })?;
        let probability = game.win_probability(winner)?;
        let matchup = Matchup::new(winner.clone(), loser.clone());
        Ok(Self {
            kind: ConditionKind::Beat {
                winner: winner.clone(),
                loser: loser.clone(),
            },
            description: format!("{} beat {}", names.get(winner), names.get(loser)),
            probability,
            probability_factors: [(matchup, probability)].into_iter().collect(),
        })
    }

    /// `team`'s final loss set stays inside its current losses plus
    /// `possible_losses`; everything else is a forced win.
    ///
    /// # Errors
    ///
    /// Errors if the team is unknown.
    pub fn win_out_except_possibly(
        season: &SeasonSnapshot,
        team: &TeamName,
        possible_losses: BTreeSet<TeamName>,
        names: &ShortNames,
    ) -> Result<Self, ScenarioError> {
        let view = season.team(team)?;
        let allowed_losses: BTreeSet<TeamName> = possible_losses
            .union(&view.losses_against())
            .cloned()
            .collect();
        let mut probability = 1.0;
        let mut probability_factors = BTreeMap::new();
        for game in view.remaining_games() {
            let opponent = game.opponent(team)?;
            if !possible_losses.contains(opponent) {
                let p = game.win_probability(team)?;
                probability *= p;
                probability_factors.insert(Matchup::new(team.clone(), opponent.clone()), p);
            }
        }
        let noun = if possible_losses.len() > 1 {
            "losses"
        } else {
            "loss"
        };
        Ok(Self {
            kind: ConditionKind::WinOutExceptPossibly {
                team: team.clone(),
                allowed_losses,
            },
            description: format!(
                "{} only possible {}: {}",
                names.get(team),
                noun,
                names.join(&possible_losses)
            ),
            probability,
            probability_factors,
        })
    }

    /// The always-true condition.
    pub fn any_outcome() -> Self {
        Self {
            kind: ConditionKind::AnyOutcome,
            description: String::from("Overall"),
            probability: 1.0,
            probability_factors: BTreeMap::new(),
        }
    }

    /// Whether a fully rolled season satisfies this condition.
    ///
    /// # Errors
    ///
    /// Errors if the condition's team is absent from `season`.
    pub fn holds(&self, season: &SeasonSnapshot) -> Result<bool, ScenarioError> {
        match &self.kind {
            ConditionKind::WinExactly {
                team,
                wins,
                required_wins,
                required_losses,
            } => {
                let view = season.team(team)?;
                Ok(view.wins() == *wins
                    && view.wins_against().is_superset(required_wins)
                    && view.losses_against().is_superset(required_losses))
            }
            ConditionKind::WinAtMost {
                team,
                max_wins,
                required_wins,
                required_losses,
            } => {
                let view = season.team(team)?;
                Ok(view.wins() <= *max_wins
                    && view.wins_against().is_superset(required_wins)
                    && view.losses_against().is_superset(required_losses))
            }
            ConditionKind::Beat { winner, loser } => {
                Ok(season.team(winner)?.wins_against().contains(loser))
            }
            ConditionKind::WinOutExceptPossibly {
                team,
                allowed_losses,
            } => Ok(season.team(team)?.losses_against().is_subset(allowed_losses)),
            ConditionKind::AnyOutcome => Ok(true),
        }
    }

    /// Produce fully determined games consistent with this condition.
    ///
    /// # Errors
    ///
    /// Errors if the condition's inputs are inconsistent with `season`.
    pub fn force<S: UniformSource + ?Sized>(
        &self,
        source: &mut S,
        season: &SeasonSnapshot,
    ) -> Result<Vec<Game>, ScenarioError> {
        match &self.kind {
            ConditionKind::WinExactly {
                team,
                wins,
                required_wins,
                required_losses,
            } => {
                let constraints = RollConstraints {
                    total_wins: Some(*wins),
                    wins_against: required_wins.clone(),
                    losses_against: required_losses.clone(),
                    ..RollConstraints::default()
                };
                Ok(season.team(team)?.roll(source, &constraints)?.games().to_vec())
            }
            ConditionKind::WinAtMost {
                team,
                max_wins,
                required_wins,
                required_losses,
            } => {
                let constraints = RollConstraints {
                    max_wins: Some(*max_wins),
                    wins_against: required_wins.clone(),
                    losses_against: required_losses.clone(),
                    ..RollConstraints::default()
                };
                Ok(season.team(team)?.roll(source, &constraints)?.games().to_vec())
            }
            ConditionKind::Beat { winner, loser } => {
                let view = season.team(winner)?;
                let game = view
                    .game_against(loser)
                    .ok_or_else(|| ScenarioError::NoSuchGame {
                        team: winner.clone(),
                        opponent: loser.clone(),
                    })?;
                Ok(vec![game.forced(winner, true)?])
            }
            ConditionKind::WinOutExceptPossibly {
                team,
                allowed_losses,
            } => {
                let view = season.team(team)?;
                let nobody = BTreeSet::new();
                view.games()
                    .iter()
                    .map(|game| {
                        let opponent = game.opponent(team)?;
                        if allowed_losses.contains(opponent) {
                            Ok(game.roll(source, &nobody, &nobody))
                        } else {
                            Ok(game.forced(team, true)?)
                        }
                    })
                    .collect()
            }
            ConditionKind::AnyOutcome => Ok(Vec::new()),
        }
    }

    /// Analytic probability of the condition under the snapshot odds.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Per-matchup factors behind [`ScenarioCondition::probability`].
    pub fn probability_factors(&self) -> &BTreeMap<Matchup, f64> {
        &self.probability_factors
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for ScenarioCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

#[derive(Error, Debug, Clone)]
pub enum ScenarioError {
    #[error("Conflicting forced outcomes for {matchup}")]
    ForcingConflict { matchup: Matchup },
    #[error("Scenario '{scenario}' produced an unsatisfying season at iteration {iteration}")]
    ScenarioInvalid { scenario: String, iteration: u64 },
    #[error("{team} never plays {opponent}")]
    NoSuchGame { team: TeamName, opponent: TeamName },
    #[error(transparent)]
    Season(#[from] SeasonError),
    #[error(transparent)]
    Roll(#[from] RollError),
    #[error(transparent)]
    Game(#[from] GameError),
}
