//! # Outcome tallies
//!
//! Monoidal accumulators over rolled seasons. Every tally supports
//! `accept(..)` for a single observation and [`Merge::merge`] for combining
//! independently collected tallies; `Default` is the identity. Keeping the
//! two next to each other is deliberate: every counter bumped by `accept`
//! has a matching line in `merge`, which is what makes the simulator
//! shard-and-merge parallel without locks.
//!
//! Maps are `BTreeMap`s so iteration (and therefore any rendering of the
//! tallies) is deterministic.
use crate::conference::{ConferenceView, Standing};
use crate::game::Matchup;
use crate::scenario::{ScenarioCondition, ScenarioError};
use crate::season::SeasonSnapshot;
use crate::team::{TeamName, TeamView};
use crate::REGULAR_SEASON_GAMES;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub type Count = u64;

/// Monoid combine: key-wise addition with `other`.
pub trait Merge {
    fn merge(&mut self, other: Self);
}

fn merge_counts<K: Ord>(into: &mut BTreeMap<K, Count>, from: BTreeMap<K, Count>) {
    for (key, count) in from {
        *into.entry(key).or_default() += count;
    }
}

/// Sorted tuple of team names; used as a map key for loss sets and week
/// winner permutations.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TeamList(Vec<TeamName>);

impl TeamList {
    pub fn new(mut names: Vec<TeamName>) -> Self {
        names.sort();
        Self(names)
    }

    pub fn from_set(names: &BTreeSet<TeamName>) -> Self {
        Self(names.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeamName> {
        self.0.iter()
    }

    pub fn contains_all(&self, names: &BTreeSet<TeamName>) -> bool {
        names.iter().all(|name| self.0.contains(name))
    }
}

#[derive(Error, Debug, Clone)]
pub enum OutcomeError {
    #[error("No winner recorded for {0}")]
    NoWinner(Matchup),
    #[error("Week game {0} not found in the conference")]
    GameNotFound(Matchup),
    #[error(transparent)]
    Conference(#[from] crate::conference::ConferenceError),
}

/// Leaf tally: one team's outcomes within a fixed loss-set bucket.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BasicTeamSeasonOutcomes {
    pub total_seasons: Count,
    pub made_ccg: Count,
    pub standing: BTreeMap<Standing, Count>,
    pub ccg_participants: BTreeMap<Matchup, Count>,
}

impl BasicTeamSeasonOutcomes {
    pub fn accept(&mut self, team: &TeamName, standing: Standing, ccg: &Matchup) {
        self.total_seasons += 1;
        *self.standing.entry(standing).or_default() += 1;
        *self.ccg_participants.entry(ccg.clone()).or_default() += 1;
        if ccg.contains(team) {
            self.made_ccg += 1;
        }
    }
}

impl Merge for BasicTeamSeasonOutcomes {
    fn merge(&mut self, other: Self) {
        self.total_seasons += other.total_seasons;
        self.made_ccg += other.made_ccg;
        merge_counts(&mut self.standing, other.standing);
        merge_counts(&mut self.ccg_participants, other.ccg_participants);
    }
}

/// One team's season outcomes, bucketed by the exact set of teams it lost to.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TeamSeasonOutcomes {
    pub total_seasons: Count,
    pub win_counts: BTreeMap<u32, Count>,
    pub win_counts_in_ccg: BTreeMap<u32, Count>,
    pub made_ccg: Count,
    pub standing: BTreeMap<Standing, Count>,
    pub lost_to: BTreeMap<TeamList, BasicTeamSeasonOutcomes>,
}

impl TeamSeasonOutcomes {
    pub fn accept(
        &mut self,
        conference: &ConferenceView,
        team: &TeamView,
        ccg: &Matchup,
    ) -> Result<(), OutcomeError> {
        let standing = conference.standing(team.name())?;
        let lost_to = TeamList::from_set(&team.losses_against());

        self.total_seasons += 1;
        *self.standing.entry(standing).or_default() += 1;
        *self.win_counts.entry(team.wins()).or_default() += 1;
        if ccg.contains(team.name()) {
            self.made_ccg += 1;
            *self.win_counts_in_ccg.entry(team.wins()).or_default() += 1;
        }
        self.lost_to
            .entry(lost_to)
            .or_default()
            .accept(team.name(), standing, ccg);
        Ok(())
    }
}

impl Merge for TeamSeasonOutcomes {
    fn merge(&mut self, other: Self) {
        self.total_seasons += other.total_seasons;
        merge_counts(&mut self.win_counts, other.win_counts);
        merge_counts(&mut self.win_counts_in_ccg, other.win_counts_in_ccg);
        self.made_ccg += other.made_ccg;
        merge_counts(&mut self.standing, other.standing);
        for (lost_to, outcomes) in other.lost_to {
            self.lost_to.entry(lost_to).or_default().merge(outcomes);
        }
    }
}

/// Conference-level tally over rolled seasons, with the derived probability
/// queries the figures are built from.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConferenceSeasonOutcomes {
    pub total_seasons: Count,
    pub teams: BTreeMap<TeamName, TeamSeasonOutcomes>,
    pub ccg_participants: BTreeMap<Matchup, Count>,
}

impl ConferenceSeasonOutcomes {
    pub fn accept(
        &mut self,
        conference: &ConferenceView,
        ccg: &Matchup,
    ) -> Result<(), OutcomeError> {
        self.total_seasons += 1;
        *self.ccg_participants.entry(ccg.clone()).or_default() += 1;
        for team in conference.teams() {
            self.teams
                .entry(team.name().clone())
                .or_default()
                .accept(conference, team, ccg)?;
        }
        Ok(())
    }

    pub fn team_names(&self) -> BTreeSet<TeamName> {
        self.teams.keys().cloned().collect()
    }

    /// P(team plays in the championship game).
    pub fn prob_in_ccg(&self, team: &TeamName) -> f64 {
        let made: Count = self
            .ccg_participants
            .iter()
            .filter(|(matchup, _)| matchup.contains(team))
            .map(|(_, count)| count)
            .sum();
        made as f64 / self.total_seasons.max(1) as f64
    }

    /// P(target in CCG | team lost to exactly this set), for every loss set
    /// with a positive probability.
    pub fn prob_in_ccg_given_specific_losses(
        &self,
        team: &TeamName,
        ccg_target: Option<&TeamName>,
    ) -> BTreeMap<TeamList, f64> {
        let target = ccg_target.unwrap_or(team);
        let Some(outcomes) = self.teams.get(team) else {
            return BTreeMap::new();
        };
        let mut result = BTreeMap::new();
        for (losses, bucket) in &outcomes.lost_to {
            let made: Count = bucket
                .ccg_participants
                .iter()
                .filter(|(matchup, _)| matchup.contains(target))
                .map(|(_, count)| count)
                .sum();
            let probability = made as f64 / bucket.total_seasons.max(1) as f64;
            if probability > 0.0 {
                result.insert(losses.clone(), probability);
            }
        }
        result
    }

    /// P(target in CCG | team's total losses), grouped by loss count.
    pub fn prob_in_ccg_given_total_losses(
        &self,
        team: &TeamName,
        ccg_target: Option<&TeamName>,
    ) -> BTreeMap<u32, f64> {
        let target = ccg_target.unwrap_or(team);
        let Some(outcomes) = self.teams.get(team) else {
            return BTreeMap::new();
        };
        let mut made: BTreeMap<u32, Count> = BTreeMap::new();
        let mut totals: BTreeMap<u32, Count> = BTreeMap::new();
        for (losses, bucket) in &outcomes.lost_to {
            let count: Count = bucket
                .ccg_participants
                .iter()
                .filter(|(matchup, _)| matchup.contains(target))
                .map(|(_, count)| count)
                .sum();
            *made.entry(losses.len() as u32).or_default() += count;
            *totals.entry(losses.len() as u32).or_default() += bucket.total_seasons;
        }
        made.into_iter()
            .map(|(losses, count)| {
                let total = totals.get(&losses).copied().unwrap_or(0).max(1);
                (losses, count as f64 / total as f64)
            })
            .collect()
    }

    /// Distribution of the team's final win count in a 12-game season.
    pub fn prob_final_win_count(&self, team: &TeamName) -> BTreeMap<u32, f64> {
        let Some(outcomes) = self.teams.get(team) else {
            return BTreeMap::new();
        };
        let mut totals: BTreeMap<u32, Count> = BTreeMap::new();
        for (losses, bucket) in &outcomes.lost_to {
            *totals.entry(losses.len() as u32).or_default() += bucket.total_seasons;
        }
        totals
            .into_iter()
            .map(|(losses, count)| {
                (
                    REGULAR_SEASON_GAMES.saturating_sub(losses),
                    count as f64 / self.total_seasons.max(1) as f64,
                )
            })
            .collect()
    }
}

impl Merge for ConferenceSeasonOutcomes {
    fn merge(&mut self, other: Self) {
        self.total_seasons += other.total_seasons;
        for (team, outcomes) in other.teams {
            self.teams.entry(team).or_default().merge(outcomes);
        }
        merge_counts(&mut self.ccg_participants, other.ccg_participants);
    }
}

/// Tally of seasons satisfying a conjunction of scenario conditions,
/// keyed by the cross-conference championship matchup tuple.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScenarioOutcomes {
    conditions: Vec<ScenarioCondition>,
    description_override: Option<String>,
    total_seasons: Count,
    ccg_participants: BTreeMap<Vec<Matchup>, Count>,
}

impl ScenarioOutcomes {
    pub fn new(conditions: Vec<ScenarioCondition>) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description_override = Some(description.into());
        self
    }

    pub fn conditions(&self) -> &[ScenarioCondition] {
        &self.conditions
    }

    pub fn total_seasons(&self) -> Count {
        self.total_seasons
    }

    pub fn ccg_participants(&self) -> &BTreeMap<Vec<Matchup>, Count> {
        &self.ccg_participants
    }

    /// A shard with the same conditions and zeroed tallies.
    pub fn shallow_clone(&self) -> Self {
        Self::new(self.conditions.clone())
    }

    /// Whether every condition holds for a rolled season.
    ///
    /// # Errors
    ///
    /// Errors if a condition's team is absent from `season`.
    pub fn satisfied_by(&self, season: &SeasonSnapshot) -> Result<bool, ScenarioError> {
        for condition in &self.conditions {
            if !condition.holds(season)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Count the season if it satisfies the conditions; returns whether it
    /// did.
    ///
    /// # Errors
    ///
    /// Errors if a condition's team is absent from `season`.
    pub fn accept(
        &mut self,
        season: &SeasonSnapshot,
        ccg_games: &[Matchup],
    ) -> Result<bool, ScenarioError> {
        if !self.satisfied_by(season)? {
            return Ok(false);
        }
        self.total_seasons += 1;
        *self
            .ccg_participants
            .entry(ccg_games.to_vec())
            .or_default() += 1;
        Ok(true)
    }

    /// Analytic joint probability of the conditions.
    ///
    /// Conditions multiply as if independent, except that a matchup claimed
    /// by two conditions only counts its factor once.
    pub fn probability(&self) -> f64 {
        let mut probability = 1.0;
        let mut seen: BTreeSet<Matchup> = BTreeSet::new();
        for condition in &self.conditions {
            probability *= condition.probability();
            for (matchup, factor) in condition.probability_factors() {
                if seen.contains(matchup) {
                    probability /= factor;
                }
                seen.insert(matchup.clone());
            }
        }
        probability
    }

    /// P(team in its conference's championship game | scenario).
    pub fn prob_in_ccg(&self, team: &TeamName) -> f64 {
        let made: Count = self
            .ccg_participants
            .iter()
            .filter(|(games, _)| games.iter().any(|matchup| matchup.contains(team)))
            .map(|(_, count)| count)
            .sum();
        made as f64 / self.total_seasons.max(1) as f64
    }

    pub fn description(&self, separator: &str) -> String {
        if let Some(description) = &self.description_override {
            return description.clone();
        }
        self.conditions
            .iter()
            .map(ScenarioCondition::description)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl Merge for ScenarioOutcomes {
    fn merge(&mut self, other: Self) {
        self.total_seasons += other.total_seasons;
        merge_counts(&mut self.ccg_participants, other.ccg_participants);
    }
}

/// "Given this week's winners" tally: for each permutation of winners of the
/// watched games, the championship matchups that followed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WeekOutcomes {
    games: Vec<Matchup>,
    total_count: Count,
    permutations: BTreeMap<TeamList, BTreeMap<Matchup, Count>>,
}

impl WeekOutcomes {
    pub fn new(games: Vec<Matchup>) -> Self {
        Self {
            games,
            ..Self::default()
        }
    }

    pub fn games(&self) -> &[Matchup] {
        &self.games
    }

    pub fn total_count(&self) -> Count {
        self.total_count
    }

    /// A shard watching the same games with zeroed tallies.
    pub fn shallow_clone(&self) -> Self {
        Self::new(self.games.clone())
    }

    /// Record the watched games' winners and the championship pairing of one
    /// rolled conference.
    ///
    /// # Errors
    ///
    /// Errors if a watched game is missing from the conference or has no
    /// winner.
    pub fn accept(
        &mut self,
        conference: &ConferenceView,
        ccg: &Matchup,
    ) -> Result<(), OutcomeError> {
        let mut winners: Vec<TeamName> = Vec::with_capacity(self.games.len());
        for matchup in &self.games {
            let team = conference
                .teams()
                .iter()
                .find(|team| matchup.contains(team.name()))
                .ok_or_else(|| OutcomeError::GameNotFound(matchup.clone()))?;
            let opponent = matchup
                .other(team.name())
                .ok_or_else(|| OutcomeError::GameNotFound(matchup.clone()))?;
            let game = team
                .game_against(opponent)
                .ok_or_else(|| OutcomeError::GameNotFound(matchup.clone()))?;
            let winner = game
                .winner()
                .ok_or_else(|| OutcomeError::NoWinner(matchup.clone()))?;
            winners.push(winner.clone());
        }
        *self
            .permutations
            .entry(TeamList::new(winners))
            .or_default()
            .entry(ccg.clone())
            .or_default() += 1;
        self.total_count += 1;
        Ok(())
    }

    /// P(target in CCG | all of `winners` won their watched games).
    pub fn prob_in_ccg_given_winners(
        &self,
        winners: &BTreeSet<TeamName>,
        ccg_target: &TeamName,
    ) -> f64 {
        let mut seasons: Count = 0;
        let mut in_ccg: Count = 0;
        for (permutation, results) in &self.permutations {
            if permutation.contains_all(winners) {
                seasons += results.values().sum::<Count>();
                in_ccg += results
                    .iter()
                    .filter(|(matchup, _)| matchup.contains(ccg_target))
                    .map(|(_, count)| count)
                    .sum::<Count>();
            }
        }
        in_ccg as f64 / seasons.max(1) as f64
    }

    /// P(all of `winners` win their watched games).
    pub fn prob_of_winners(&self, winners: &BTreeSet<TeamName>) -> f64 {
        let seasons: Count = self
            .permutations
            .iter()
            .filter(|(permutation, _)| permutation.contains_all(winners))
            .map(|(_, results)| results.values().sum::<Count>())
            .sum();
        seasons as f64 / self.total_count.max(1) as f64
    }
}

impl Merge for WeekOutcomes {
    fn merge(&mut self, other: Self) {
        self.total_count += other.total_count;
        for (winners, results) in other.permutations {
            merge_counts(self.permutations.entry(winners).or_default(), results);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conference::{Conference, ConferenceName};
    use crate::game::mock_data::played;

    fn matchup(a: &str, b: &str) -> Matchup {
        Matchup::new(TeamName::from(a), TeamName::from(b))
    }

    fn standing(position: u32, tier_size: u32) -> Standing {
        Standing {
            position,
            tier_size,
        }
    }

    fn sample_basic(seed: &[(&str, &str)]) -> BasicTeamSeasonOutcomes {
        let mut outcomes = BasicTeamSeasonOutcomes::default();
        for (a, b) in seed {
            outcomes.accept(&TeamName::from("A"), standing(1, 1), &matchup(a, b));
        }
        outcomes
    }

    #[test]
    fn merge_identity() {
        let outcomes = sample_basic(&[("A", "B"), ("B", "C")]);
        let mut merged = outcomes.clone();
        merged.merge(BasicTeamSeasonOutcomes::default());
        assert_eq!(merged, outcomes);
    }

    #[test]
    fn merge_commutes_and_associates() {
        let a = sample_basic(&[("A", "B")]);
        let b = sample_basic(&[("B", "C"), ("A", "C")]);
        let c = sample_basic(&[("A", "B"), ("A", "C")]);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b.clone();
        ba.merge(a.clone());
        assert_eq!(ab, ba);

        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());
        let mut bc = b.clone();
        bc.merge(c.clone());
        let mut right = a.clone();
        right.merge(bc);
        assert_eq!(left, right);
    }

    #[test]
    fn basic_accept_counts() {
        let outcomes = sample_basic(&[("A", "B"), ("B", "C")]);
        assert_eq!(outcomes.total_seasons, 2);
        assert_eq!(outcomes.made_ccg, 1);
        assert_eq!(outcomes.ccg_participants[&matchup("A", "B")], 1);
        assert_eq!(outcomes.standing[&standing(1, 1)], 2);
    }

    fn small_view(results: &[(&str, &str, (u16, u16))]) -> ConferenceView {
        let names: BTreeSet<TeamName> = results
            .iter()
            .flat_map(|(a, b, _)| [TeamName::from(*a), TeamName::from(*b)])
            .collect();
        let conference = Conference::try_new(
            ConferenceName::from("zzz"),
            names.clone(),
            None,
            true,
        )
        .unwrap();
        let games: Vec<_> = results
            .iter()
            .map(|(a, b, score)| played(a, b, *score))
            .collect();
        let teams = names
            .iter()
            .map(|name| {
                crate::team::TeamView::new(
                    name.clone(),
                    games.iter().filter(|game| game.contains(name)).cloned().collect(),
                    Some(ConferenceName::from("zzz")),
                )
            })
            .collect();
        ConferenceView::new(conference, teams)
    }

    #[test]
    fn conference_accept_and_queries() {
        // A beat B and C; B beat C. Pretend the CCG pairing is (A, B).
        let view = small_view(&[
            ("A", "B", (1, 0)),
            ("A", "C", (1, 0)),
            ("B", "C", (1, 0)),
        ]);
        let mut outcomes = ConferenceSeasonOutcomes::default();
        outcomes.accept(&view, &matchup("A", "B")).unwrap();
        outcomes.accept(&view, &matchup("A", "B")).unwrap();

        assert_eq!(outcomes.total_seasons, 2);
        assert_eq!(outcomes.prob_in_ccg(&TeamName::from("A")), 1.0);
        assert_eq!(outcomes.prob_in_ccg(&TeamName::from("C")), 0.0);

        let a = &outcomes.teams[&TeamName::from("A")];
        assert_eq!(a.made_ccg, 2);
        assert_eq!(a.win_counts[&2], 2);
        assert_eq!(a.win_counts_in_ccg[&2], 2);

        // B lost only to A and still made the CCG in every season.
        let by_losses =
            outcomes.prob_in_ccg_given_specific_losses(&TeamName::from("B"), None);
        let lost_to_a = TeamList::new(vec![TeamName::from("A")]);
        assert_eq!(by_losses[&lost_to_a], 1.0);

        let by_total = outcomes.prob_in_ccg_given_total_losses(&TeamName::from("B"), None);
        assert_eq!(by_total[&1], 1.0);

        // C never made it: the query drops zero-probability rows.
        assert!(outcomes
            .prob_in_ccg_given_specific_losses(&TeamName::from("C"), None)
            .is_empty());

        let wins = outcomes.prob_final_win_count(&TeamName::from("B"));
        assert_eq!(wins[&(REGULAR_SEASON_GAMES - 1)], 1.0);
    }

    #[test]
    fn conference_merge_matches_sequential_accept() {
        let view = small_view(&[
            ("A", "B", (1, 0)),
            ("A", "C", (1, 0)),
            ("B", "C", (1, 0)),
        ]);
        let mut sequential = ConferenceSeasonOutcomes::default();
        sequential.accept(&view, &matchup("A", "B")).unwrap();
        sequential.accept(&view, &matchup("A", "C")).unwrap();

        let mut left = ConferenceSeasonOutcomes::default();
        left.accept(&view, &matchup("A", "B")).unwrap();
        let mut right = ConferenceSeasonOutcomes::default();
        right.accept(&view, &matchup("A", "C")).unwrap();
        left.merge(right);

        assert_eq!(left, sequential);
    }

    #[test]
    fn week_outcomes_bucket_by_winners() {
        let view_a = small_view(&[
            ("A", "B", (1, 0)),
            ("A", "C", (1, 0)),
            ("B", "C", (1, 0)),
        ]);
        let view_b = small_view(&[
            ("A", "B", (0, 1)),
            ("A", "C", (1, 0)),
            ("B", "C", (1, 0)),
        ]);
        let mut week = WeekOutcomes::new(vec![matchup("A", "B")]);
        week.accept(&view_a, &matchup("A", "C")).unwrap();
        week.accept(&view_a, &matchup("A", "C")).unwrap();
        week.accept(&view_b, &matchup("B", "C")).unwrap();

        let a_won: BTreeSet<TeamName> = [TeamName::from("A")].into_iter().collect();
        let b_won: BTreeSet<TeamName> = [TeamName::from("B")].into_iter().collect();
        assert_eq!(week.prob_of_winners(&a_won), 2.0 / 3.0);
        assert_eq!(week.prob_in_ccg_given_winners(&a_won, &TeamName::from("A")), 1.0);
        assert_eq!(week.prob_in_ccg_given_winners(&b_won, &TeamName::from("A")), 0.0);
        assert_eq!(week.prob_in_ccg_given_winners(&b_won, &TeamName::from("B")), 1.0);
    }

    #[test]
    fn week_outcomes_need_a_winner() {
        let view = small_view(&[("A", "B", (7, 7)), ("A", "C", (1, 0))]);
        let mut week = WeekOutcomes::new(vec![matchup("A", "B")]);
        let result = week.accept(&view, &matchup("A", "C"));
        assert!(matches!(result, Err(OutcomeError::NoWinner(_))));
    }
}
