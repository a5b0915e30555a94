//! # Team view
//!
//! [`TeamView`] is a read-only projection of a season onto one team: the
//! date-sorted list of its games plus the conference it belongs to. Records,
//! opponent sets and win percentages are all derived from the games on
//! demand; the view holds no other state.
//!
//! The module also hosts the central sampling primitive,
//! [`TeamView::roll`], which samples the remaining games conditioned on
//! forced results and an optional season win total. Conditioning is done by
//! enumerating loss subsets and inverting their cumulative distribution with
//! a single uniform draw; rejection sampling would be far too slow for rare
//! targets.
use crate::conference::ConferenceName;
use crate::game::{Game, GameError, Matchup};
use crate::roll::UniformSource;
use derive_more::{AsRef, Display, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// The unambiguous common name of a team (e.g. "SMU", "BYU").
///
/// Treated as an opaque value: equality is case- and whitespace-sensitive.
#[derive(
    Deserialize,
    Serialize,
    Debug,
    Display,
    Clone,
    AsRef,
    From,
    Into,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
#[as_ref(forward)]
pub struct TeamName(String);

impl From<&str> for TeamName {
    fn from(name: &str) -> Self {
        Self(String::from(name))
    }
}

/// Win percentage as an exact ratio.
///
/// Standings tiers are built by grouping equal percentages; comparing by
/// cross multiplication keeps that grouping independent of float rounding.
/// An empty record counts as 1.000, matching how an untested team is seeded.
#[derive(Debug, Clone, Copy)]
pub struct WinPercentage {
    wins: u32,
    total: u32,
}

impl WinPercentage {
    pub fn new(wins: u32, total: u32) -> Self {
        if total == 0 {
            Self { wins: 1, total: 1 }
        } else {
            Self { wins, total }
        }
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.wins) / f64::from(self.total)
    }
}

impl Ord for WinPercentage {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.wins) * u64::from(other.total);
        let rhs = u64::from(other.wins) * u64::from(self.total);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for WinPercentage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for WinPercentage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WinPercentage {}

impl fmt::Display for WinPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.as_f64())
    }
}

/// Wins, losses and ties against some set of opponents.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Record {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

impl Record {
    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.ties
    }

    pub fn win_percentage(&self) -> WinPercentage {
        WinPercentage::new(self.wins, self.games())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ties > 0 {
            write!(f, "{}-{}-{}", self.wins, self.losses, self.ties)
        } else {
            write!(f, "{}-{}", self.wins, self.losses)
        }
    }
}

/// Constraints for [`TeamView::roll`] and [`TeamView::probability_of`].
///
/// `total_wins` and `max_wins` are mutually exclusive; the `*_against` sets
/// name remaining opponents whose games are forced before anything is
/// sampled.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RollConstraints {
    pub total_wins: Option<u32>,
    pub max_wins: Option<u32>,
    pub wins_against: BTreeSet<TeamName>,
    pub losses_against: BTreeSet<TeamName>,
}

impl RollConstraints {
    /// Finish the season with exactly `total` wins.
    pub fn exactly(total: u32) -> Self {
        Self {
            total_wins: Some(total),
            ..Self::default()
        }
    }

    /// Finish the season with at most `max` wins.
    pub fn at_most(max: u32) -> Self {
        Self {
            max_wins: Some(max),
            ..Self::default()
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RollError {
    #[error("Forced wins and losses for {team} overlap: {overlap:?}")]
    ForcedSetsOverlap {
        team: TeamName,
        overlap: BTreeSet<TeamName>,
    },
    #[error("{team} has no remaining game against {opponent}")]
    NotARemainingOpponent { team: TeamName, opponent: TeamName },
    #[error("Both a total-wins target and a max-wins cap given for {team}")]
    ConflictingTargets { team: TeamName },
    #[error("{team} cannot finish with {target} wins")]
    UnreachableWinTarget { team: TeamName, target: u32 },
    #[error("Game error: {0}")]
    Game(#[from] GameError),
}

/// Execution plan for a constrained roll: forced games materialised, the
/// rest split out with the permitted loss counts among them.
struct RollPlan {
    resolved: Vec<Game>,
    unforced: Vec<Game>,
    /// `None` means unconstrained sampling of `unforced`.
    loss_counts: Option<Vec<usize>>,
    forced_factors: Vec<(Matchup, f64)>,
}

/// Read-only projection of a season onto one team.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamView {
    name: TeamName,
    games: Vec<Game>,
    conference: Option<ConferenceName>,
}

impl TeamView {
    pub fn new(name: TeamName, mut games: Vec<Game>, conference: Option<ConferenceName>) -> Self {
        games.sort_by_key(Game::date);
        Self {
            name,
            games,
            conference,
        }
    }

    pub fn name(&self) -> &TeamName {
        &self.name
    }

    pub fn conference(&self) -> Option<&ConferenceName> {
        self.conference.as_ref()
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn played_games(&self) -> impl Iterator<Item = &Game> {
        self.games.iter().filter(|game| game.is_over())
    }

    pub fn remaining_games(&self) -> impl Iterator<Item = &Game> {
        self.games.iter().filter(|game| !game.is_over())
    }

    pub fn opponents(&self) -> BTreeSet<TeamName> {
        self.opponents_of(self.games.iter())
    }

    pub fn played_opponents(&self) -> BTreeSet<TeamName> {
        self.opponents_of(self.played_games())
    }

    pub fn remaining_opponents(&self) -> BTreeSet<TeamName> {
        self.opponents_of(self.remaining_games())
    }

    fn opponents_of<'a>(&self, games: impl Iterator<Item = &'a Game>) -> BTreeSet<TeamName> {
        games
            .map(|game| {
                game.opponent(&self.name)
                    .expect("view games contain the team")
                    .clone()
            })
            .collect()
    }

    pub fn wins(&self) -> u32 {
        self.record().wins
    }

    pub fn losses(&self) -> u32 {
        self.record().losses
    }

    pub fn ties(&self) -> u32 {
        self.record().ties
    }

    pub fn record(&self) -> Record {
        let mut record = Record::default();
        for game in self.played_games() {
            if game.is_tie() {
                record.ties += 1;
            } else if game.winner() == Some(&self.name) {
                record.wins += 1;
            } else {
                record.losses += 1;
            }
        }
        record
    }

    pub fn win_percentage(&self) -> WinPercentage {
        self.record().win_percentage()
    }

    /// Opponents this team has beaten.
    pub fn wins_against(&self) -> BTreeSet<TeamName> {
        self.opponents_of(
            self.played_games()
                .filter(|game| game.winner() == Some(&self.name)),
        )
    }

    /// Opponents this team has not beaten (ties included).
    pub fn losses_against(&self) -> BTreeSet<TeamName> {
        self.opponents_of(
            self.played_games()
                .filter(|game| game.winner() != Some(&self.name)),
        )
    }

    /// Expected season win total under the stored probabilities.
    pub fn predicted_wins(&self) -> f64 {
        self.games
            .iter()
            .map(|game| {
                game.win_probability(&self.name)
                    .expect("view games contain the team")
            })
            .sum()
    }

    pub fn predicted_losses(&self) -> f64 {
        self.games
            .iter()
            .filter(|game| !game.is_tie())
            .map(|game| {
                1.0 - game
                    .win_probability(&self.name)
                    .expect("view games contain the team")
            })
            .sum()
    }

    pub fn predicted_win_percentage(&self) -> f64 {
        let wins = self.predicted_wins();
        let total = wins + self.predicted_losses() + f64::from(self.ties());
        if total > 0.0 {
            wins / total
        } else {
            1.0
        }
    }

    /// Human-readable predicted record, e.g. "9.5-2.5".
    pub fn predicted_record(&self) -> String {
        format!("{:.1}-{:.1}", self.predicted_wins(), self.predicted_losses())
    }

    pub fn game_against(&self, opponent: &TeamName) -> Option<&Game> {
        self.games.iter().find(|game| game.contains(opponent))
    }

    pub fn plays_any(&self, teams: &BTreeSet<TeamName>) -> bool {
        !self.opponents().is_disjoint(teams)
    }

    /// Whether all of `opponents` have been played.
    pub fn has_played(&self, opponents: &BTreeSet<TeamName>) -> bool {
        self.has_played_excluding(opponents, &BTreeSet::new())
    }

    /// [`TeamView::has_played`] with matchups in `excluded` treated as not
    /// yet played.
    pub fn has_played_excluding(
        &self,
        opponents: &BTreeSet<TeamName>,
        excluded: &BTreeSet<Matchup>,
    ) -> bool {
        let mut played = self.played_opponents();
        self.remove_excluded_partners(&mut played, excluded);
        opponents.iter().all(|opponent| played.contains(opponent))
    }

    /// Record restricted to finished games against `opponents`.
    pub fn filtered_record(&self, opponents: &BTreeSet<TeamName>) -> Record {
        let mut record = Record::default();
        for game in self.played_games() {
            let opponent = game
                .opponent(&self.name)
                .expect("view games contain the team");
            if !opponents.contains(opponent) {
                continue;
            }
            if game.is_tie() {
                record.ties += 1;
            } else if game.winner() == Some(&self.name) {
                record.wins += 1;
            } else {
                record.losses += 1;
            }
        }
        record
    }

    /// [`TeamView::filtered_record`] with matchups in `excluded` treated as
    /// not yet played.
    pub fn filtered_record_excluding(
        &self,
        opponents: &BTreeSet<TeamName>,
        excluded: &BTreeSet<Matchup>,
    ) -> Record {
        let mut opponents = opponents.clone();
        self.remove_excluded_partners(&mut opponents, excluded);
        self.filtered_record(&opponents)
    }

    pub fn filtered_win_percentage(
        &self,
        opponents: &BTreeSet<TeamName>,
        excluded: &BTreeSet<Matchup>,
    ) -> WinPercentage {
        self.filtered_record_excluding(opponents, excluded)
            .win_percentage()
    }

    fn remove_excluded_partners(&self, set: &mut BTreeSet<TeamName>, excluded: &BTreeSet<Matchup>) {
        for matchup in excluded {
            if let Some(other) = matchup.other(&self.name) {
                set.remove(other);
            }
        }
    }

    /// Sample the remaining games subject to `constraints`.
    ///
    /// Forced games are materialised first. When a win target or cap is set,
    /// the unforced games are sampled jointly: every loss subset of the
    /// permitted size is weighted by its probability and one subset is drawn
    /// from the normalised cumulative distribution. The subset count is
    /// `C(|unforced|, losses)`, small for real schedules.
    ///
    /// # Errors
    ///
    /// Errors if the constraints are inconsistent: overlapping forced sets,
    /// a forced opponent without a remaining game, both a target and a cap,
    /// or an unreachable win count.
    pub fn roll<S: UniformSource + ?Sized>(
        &self,
        source: &mut S,
        constraints: &RollConstraints,
    ) -> Result<TeamView, RollError> {
        let RollPlan {
            mut resolved,
            unforced,
            loss_counts,
            ..
        } = self.plan(constraints)?;
        match loss_counts {
            None => {
                let nobody = BTreeSet::new();
                resolved.extend(
                    unforced
                        .iter()
                        .map(|game| game.roll(source, &nobody, &nobody)),
                );
            }
            Some(counts) => {
                let chosen = self.draw_loss_subset(source, &unforced, &counts, constraints)?;
                for (index, game) in unforced.iter().enumerate() {
                    resolved.push(game.forced(&self.name, !chosen.contains(&index))?);
                }
            }
        }
        Ok(TeamView::new(
            self.name.clone(),
            resolved,
            self.conference.clone(),
        ))
    }

    /// Probability that a season naturally satisfies `constraints`, plus the
    /// per-matchup factors contributed by the individually forced games.
    ///
    /// The joint probability of the win-count part is not separable per
    /// matchup, so it contributes to the product but not to the factor map.
    ///
    /// # Errors
    ///
    /// Same validation as [`TeamView::roll`].
    pub fn probability_of(
        &self,
        constraints: &RollConstraints,
    ) -> Result<(f64, BTreeMap<Matchup, f64>), RollError> {
        let RollPlan {
            unforced,
            loss_counts,
            forced_factors,
            ..
        } = self.plan(constraints)?;
        let mut probability: f64 = forced_factors.iter().map(|(_, p)| p).product();
        let factors: BTreeMap<Matchup, f64> = forced_factors.into_iter().collect();
        if let Some(counts) = loss_counts {
            let win_probabilities = self.win_probabilities(&unforced)?;
            probability *= subset_mass(&win_probabilities, &counts);
        }
        Ok((probability, factors))
    }

    fn plan(&self, constraints: &RollConstraints) -> Result<RollPlan, RollError> {
        if constraints.total_wins.is_some() && constraints.max_wins.is_some() {
            return Err(RollError::ConflictingTargets {
                team: self.name.clone(),
            });
        }
        let overlap: BTreeSet<TeamName> = constraints
            .wins_against
            .intersection(&constraints.losses_against)
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(RollError::ForcedSetsOverlap {
                team: self.name.clone(),
                overlap,
            });
        }
        let remaining = self.remaining_opponents();
        for opponent in constraints
            .wins_against
            .iter()
            .chain(constraints.losses_against.iter())
        {
            if !remaining.contains(opponent) {
                return Err(RollError::NotARemainingOpponent {
                    team: self.name.clone(),
                    opponent: opponent.clone(),
                });
            }
        }

        let mut resolved: Vec<Game> = self.played_games().cloned().collect();
        let mut unforced: Vec<Game> = Vec::new();
        let mut forced_factors: Vec<(Matchup, f64)> = Vec::new();
        for game in self.remaining_games() {
            let opponent = game
                .opponent(&self.name)
                .expect("view games contain the team")
                .clone();
            if constraints.wins_against.contains(&opponent) {
                forced_factors.push((
                    Matchup::new(self.name.clone(), opponent),
                    game.win_probability(&self.name)?,
                ));
                resolved.push(game.forced(&self.name, true)?);
            } else if constraints.losses_against.contains(&opponent) {
                forced_factors.push((
                    Matchup::new(self.name.clone(), opponent),
                    1.0 - game.win_probability(&self.name)?,
                ));
                resolved.push(game.forced(&self.name, false)?);
            } else {
                unforced.push(game.clone());
            }
        }

        let floor = self.wins() + constraints.wins_against.len() as u32;
        let k = unforced.len();
        let loss_counts = match (constraints.total_wins, constraints.max_wins) {
            (None, None) => None,
            (Some(target), None) => {
                let ceiling = floor + k as u32;
                if target < floor || target > ceiling {
                    return Err(RollError::UnreachableWinTarget {
                        team: self.name.clone(),
                        target,
                    });
                }
                Some(vec![(ceiling - target) as usize])
            }
            (None, Some(cap)) => {
                if cap < floor {
                    return Err(RollError::UnreachableWinTarget {
                        team: self.name.clone(),
                        target: cap,
                    });
                }
                let max_unforced_wins = (cap - floor).min(k as u32) as usize;
                Some(((k - max_unforced_wins)..=k).collect())
            }
            (Some(_), Some(_)) => unreachable!("checked above"),
        };
        Ok(RollPlan {
            resolved,
            unforced,
            loss_counts,
            forced_factors,
        })
    }

    fn win_probabilities(&self, games: &[Game]) -> Result<Vec<f64>, RollError> {
        games
            .iter()
            .map(|game| game.win_probability(&self.name).map_err(RollError::from))
            .collect()
    }

    /// Pick the indices of the unforced games to lose.
    fn draw_loss_subset<S: UniformSource + ?Sized>(
        &self,
        source: &mut S,
        unforced: &[Game],
        loss_counts: &[usize],
        constraints: &RollConstraints,
    ) -> Result<Vec<usize>, RollError> {
        let win_probabilities = self.win_probabilities(unforced)?;
        let combos = loss_subsets(&win_probabilities, loss_counts);
        let total: f64 = combos.iter().map(|(_, p)| p).sum();
        if total <= 0.0 {
            return Err(RollError::UnreachableWinTarget {
                team: self.name.clone(),
                target: constraints.total_wins.or(constraints.max_wins).unwrap_or(0),
            });
        }
        let draw = source.uniform();
        let mut running = 0.0;
        for (combo, probability) in &combos {
            running += probability / total;
            if draw <= running {
                return Ok(combo.clone());
            }
        }
        // Floating point slack: the last bucket owns the tail.
        Ok(combos
            .last()
            .map(|(combo, _)| combo.clone())
            .expect("loss_counts is never empty"))
    }
}

/// Every loss subset of the permitted sizes with its joint probability.
fn loss_subsets(win_probabilities: &[f64], loss_counts: &[usize]) -> Vec<(Vec<usize>, f64)> {
    let mut combos = Vec::new();
    for &losses in loss_counts {
        for combo in (0..win_probabilities.len()).combinations(losses) {
            let probability = win_probabilities
                .iter()
                .enumerate()
                .map(|(index, p)| if combo.contains(&index) { 1.0 - p } else { *p })
                .product();
            combos.push((combo, probability));
        }
    }
    combos
}

fn subset_mass(win_probabilities: &[f64], loss_counts: &[usize]) -> f64 {
    loss_subsets(win_probabilities, loss_counts)
        .iter()
        .map(|(_, p)| p)
        .sum()
}
