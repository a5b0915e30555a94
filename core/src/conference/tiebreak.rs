//! # Tiebreakers and championship seeding
//!
//! Tied standings tiers are resolved by an ordered [`Cascade`] of
//! [`Tiebreaker`] rules. Each rule takes the tied subset and partitions it
//! into ranked tiers; a rule that cannot separate anybody returns the subset
//! as a single tier, which tells the cascade to move on to the next rule.
//! Only the final coin toss consumes randomness, so the cascade terminates
//! in practice; [`TieError::Indeterminate`] is kept as a defensive failure.
//!
//! Rules are plain values behind a trait object, so a conference's procedure
//! is data: a list. Season-specific adjustments (matchups treated as not yet
//! played, hosts outside the 12-game win cap) come in through the
//! [`TiebreakContext`], read from the conference record.
//!
//! [`CascadeSeeder`] turns standings plus a cascade into the two
//! championship-game seeds, handling the one-, two- and many-team top-tier
//! cases separately because a pair can be settled by the first rule that
//! splits it, while a bigger group is refined rule by rule.
use crate::conference::{sorted_with_ties, Conference, ConferenceName, ConferenceView};
use crate::game::Matchup;
use crate::roll::UniformSource;
use crate::team::{TeamName, TeamView, WinPercentage};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Everything a tiebreaker rule may consult.
pub struct TiebreakContext<'a> {
    view: &'a ConferenceView,
    members: BTreeSet<TeamName>,
    standings: &'a [BTreeSet<TeamName>],
}

impl<'a> TiebreakContext<'a> {
    pub fn new(view: &'a ConferenceView, standings: &'a [BTreeSet<TeamName>]) -> Self {
        Self {
            view,
            members: view.team_names(),
            standings,
        }
    }

    pub fn members(&self) -> &BTreeSet<TeamName> {
        &self.members
    }

    pub fn standings(&self) -> &[BTreeSet<TeamName>] {
        self.standings
    }

    pub fn excluded_pairs(&self) -> &BTreeSet<Matchup> {
        &self.view.conference().tiebreak_excluded_pairs
    }

    pub fn cap_exempt_hosts(&self) -> &BTreeSet<TeamName> {
        &self.view.conference().cap_exempt_hosts
    }

    /// # Panics
    ///
    /// Tied subsets are drawn from the standings, so every name resolves.
    fn team(&self, name: &TeamName) -> &TeamView {
        self.view
            .team(name)
            .expect("tied teams are conference members")
    }

    fn filtered_percentage(&self, name: &TeamName, opponents: &BTreeSet<TeamName>) -> WinPercentage {
        self.team(name)
            .filtered_win_percentage(opponents, self.excluded_pairs())
    }
}

/// One tiebreaker rule.
///
/// Returns the tied subset partitioned into ranked tiers, best first;
/// `[tied]` signals "could not split".
pub trait Tiebreaker: Send + Sync {
    fn split(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>>;

    fn name(&self) -> &'static str;
}

/// Head-to-head results among the tied teams.
///
/// A team that has beaten every other tied team ranks first outright. If any
/// pair has not met, the rule cannot split; otherwise the subset is ranked
/// by win percentage restricted to the tied teams.
pub struct HeadToHead;

impl Tiebreaker for HeadToHead {
    fn split(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        _source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>> {
        for name in tied {
            let mut others = tied.clone();
            others.remove(name);
            let team = ctx.team(name);
            if team.has_played_excluding(&others, ctx.excluded_pairs())
                && team
                    .filtered_record_excluding(&others, ctx.excluded_pairs())
                    .wins
                    == others.len() as u32
            {
                return vec![[name.clone()].into_iter().collect(), others];
            }
        }
        let all_met = tied.iter().all(|name| {
            let mut others = tied.clone();
            others.remove(name);
            ctx.team(name)
                .has_played_excluding(&others, ctx.excluded_pairs())
        });
        if !all_met {
            return vec![tied.clone()];
        }
        sorted_with_ties(
            tied.iter()
                .map(|name| (name.clone(), ctx.filtered_percentage(name, tied)))
                .collect(),
        )
    }

    fn name(&self) -> &'static str {
        "head-to-head"
    }
}

/// Opponents every tied team has already played.
fn common_opponents(ctx: &TiebreakContext, tied: &BTreeSet<TeamName>) -> BTreeSet<TeamName> {
    let mut common = ctx.members().clone();
    for name in tied {
        let played = ctx.team(name).played_opponents();
        common.retain(|opponent| played.contains(opponent));
    }
    for matchup in ctx.excluded_pairs() {
        let (a, b) = matchup.teams();
        if tied.contains(a) || tied.contains(b) {
            common.remove(a);
            common.remove(b);
        }
    }
    common
}

/// Win percentage against the opponents common to all tied teams.
pub struct AgainstAllCommonOpponents;

impl Tiebreaker for AgainstAllCommonOpponents {
    fn split(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        _source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>> {
        let common = common_opponents(ctx, tied);
        sorted_with_ties(
            tied.iter()
                .map(|name| (name.clone(), ctx.filtered_percentage(name, &common)))
                .collect(),
        )
    }

    fn name(&self) -> &'static str {
        "against-all-common-opponents"
    }
}

/// Win percentage against common opponents, walked down the standings.
///
/// Descends tier by tier, ranking the still-tied teams against the common
/// opponents in that tier. A split whose leading tier has fewer than three
/// teams is final; a bigger leading tier keeps descending with a refreshed
/// common-opponent set.
pub struct AgainstHighestCommonOpponent;

impl Tiebreaker for AgainstHighestCommonOpponent {
    fn split(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        _source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>> {
        let mut tied = tied.clone();
        let mut common = common_opponents(ctx, &tied);
        let mut settled: Vec<BTreeSet<TeamName>> = Vec::new();
        for tier in ctx.standings() {
            let tier_common: BTreeSet<TeamName> =
                tier.intersection(&common).cloned().collect();
            let results = sorted_with_ties(
                tied.iter()
                    .map(|name| (name.clone(), ctx.filtered_percentage(name, &tier_common)))
                    .collect(),
            );
            if results.len() > 1 {
                if results[0].len() < 3 {
                    return results.into_iter().chain(settled).collect();
                }
                let mut results = results.into_iter();
                tied = results.next().expect("split has a leading tier");
                settled = results.chain(settled).collect();
                common = common_opponents(ctx, &tied);
            }
        }
        std::iter::once(tied).chain(settled).collect()
    }

    fn name(&self) -> &'static str {
        "against-highest-common-opponent"
    }
}

/// Aggregate conference record of each tied team's played opponents.
///
/// `include_tied_opponents` controls whether games against the tied teams
/// themselves count in the opponents' measured records. `true` measures
/// opponents against the whole conference; `false` strikes the tied teams
/// from the measured set first.
pub struct StrengthOfSchedule {
    pub include_tied_opponents: bool,
}

impl Tiebreaker for StrengthOfSchedule {
    fn split(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        _source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>> {
        let measured: BTreeSet<TeamName> = if self.include_tied_opponents {
            ctx.members().clone()
        } else {
            ctx.members().difference(tied).cloned().collect()
        };
        sorted_with_ties(
            tied.iter()
                .map(|name| {
                    let team = ctx.team(name);
                    let mut opponents: BTreeSet<TeamName> = ctx
                        .members()
                        .intersection(&team.played_opponents())
                        .cloned()
                        .collect();
                    for matchup in ctx.excluded_pairs() {
                        if let Some(other) = matchup.other(name) {
                            opponents.remove(other);
                        }
                    }
                    let mut wins = 0;
                    let mut played = 0;
                    for opponent in &opponents {
                        let record = ctx
                            .team(opponent)
                            .filtered_record_excluding(&measured, ctx.excluded_pairs());
                        wins += record.wins;
                        played += record.games();
                    }
                    (name.clone(), WinPercentage::new(wins, played.max(1)))
                })
                .collect(),
        )
    }

    fn name(&self) -> &'static str {
        "strength-of-schedule"
    }
}

/// Total wins in a 12-game season.
///
/// Non-neutral games hosted by a cap-exempt team are skipped, so a 13-game
/// schedule is counted back down to twelve.
pub struct CappedSeasonWins;

impl Tiebreaker for CappedSeasonWins {
    fn split(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        _source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>> {
        sorted_with_ties(
            tied.iter()
                .map(|name| {
                    let wins = ctx
                        .team(name)
                        .games()
                        .iter()
                        .filter(|game| {
                            game.neutral() || !ctx.cap_exempt_hosts().contains(game.home())
                        })
                        .filter(|game| game.winner() == Some(name))
                        .count() as u32;
                    (name.clone(), wins)
                })
                .collect(),
        )
    }

    fn name(&self) -> &'static str {
        "capped-season-wins"
    }
}

/// Random selection. Always splits, guaranteeing cascade termination.
pub struct CoinToss;

impl Tiebreaker for CoinToss {
    fn split(
        &self,
        _ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        source: &mut dyn UniformSource,
    ) -> Vec<BTreeSet<TeamName>> {
        let index = ((source.uniform() * tied.len() as f64) as usize).min(tied.len() - 1);
        let winner = tied
            .iter()
            .nth(index)
            .cloned()
            .expect("tied subsets are never empty");
        let mut rest = tied.clone();
        rest.remove(&winner);
        vec![[winner].into_iter().collect(), rest]
    }

    fn name(&self) -> &'static str {
        "coin-toss"
    }
}

/// Ordered list of tiebreaker rules.
pub struct Cascade {
    rules: Vec<Box<dyn Tiebreaker>>,
}

impl Cascade {
    pub fn new(rules: Vec<Box<dyn Tiebreaker>>) -> Self {
        Self { rules }
    }

    /// The canonical championship tiebreak procedure: head-to-head, common
    /// opponents, highest common opponent, strength of schedule, capped
    /// season wins, coin toss.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(HeadToHead),
            Box::new(AgainstAllCommonOpponents),
            Box::new(AgainstHighestCommonOpponent),
            Box::new(StrengthOfSchedule {
                include_tied_opponents: true,
            }),
            Box::new(CappedSeasonWins),
            Box::new(CoinToss),
        ])
    }

    pub fn rules(&self) -> &[Box<dyn Tiebreaker>] {
        &self.rules
    }
}

#[derive(Error, Debug, Clone)]
pub enum TieError {
    #[error("Tiebreak cascade exhausted without separating {teams:?}")]
    Indeterminate { teams: BTreeSet<TeamName> },
    #[error("Conference {0} has fewer than two seedable teams")]
    NotEnoughTeams(ConferenceName),
    #[error("Rule '{rule}' returned an empty partition")]
    EmptyPartition { rule: &'static str },
}

/// Computes the championship game participants for a conference.
pub trait ChampionshipSeeder: Send + Sync {
    /// The `(seed_1, seed_2)` pair.
    fn seed(
        &self,
        view: &ConferenceView,
        source: &mut dyn UniformSource,
    ) -> Result<(TeamName, TeamName), TieError>;
}

/// Map from conference name to its seeding procedure.
pub type SeederRegistry = HashMap<ConferenceName, Arc<dyn ChampionshipSeeder>>;

/// The standard registry: every conference that stages a championship game
/// gets the canonical cascade.
pub fn standard_registry<'a>(
    conferences: impl IntoIterator<Item = &'a Conference>,
) -> SeederRegistry {
    conferences
        .into_iter()
        .filter(|conference| conference.has_championship_game)
        .map(|conference| {
            (
                conference.name.clone(),
                Arc::new(CascadeSeeder::standard()) as Arc<dyn ChampionshipSeeder>,
            )
        })
        .collect()
}

enum MultiOutcome {
    Single(TeamName),
    Pair(BTreeSet<TeamName>),
}

/// Seeder that drives a [`Cascade`] over the standings.
pub struct CascadeSeeder {
    cascade: Cascade,
}

impl CascadeSeeder {
    pub fn new(cascade: Cascade) -> Self {
        Self { cascade }
    }

    pub fn standard() -> Self {
        Self::new(Cascade::standard())
    }

    /// Walk the rules until one splits the pair.
    fn pairwise(
        &self,
        ctx: &TiebreakContext,
        pair: &BTreeSet<TeamName>,
        source: &mut dyn UniformSource,
    ) -> Result<(TeamName, TeamName), TieError> {
        for rule in self.cascade.rules() {
            let result = rule.split(ctx, pair, source);
            match result.len() {
                0 => return Err(TieError::EmptyPartition { rule: rule.name() }),
                1 => continue,
                _ => {
                    // A split pair is two singleton tiers.
                    let first = only(&result[0], rule.name())?;
                    let second = only(&result[1], rule.name())?;
                    return Ok((first, second));
                }
            }
        }
        Err(TieError::Indeterminate {
            teams: pair.clone(),
        })
    }

    /// Refine a group of three or more until a single team or a pair leads.
    fn multi(
        &self,
        ctx: &TiebreakContext,
        tied: &BTreeSet<TeamName>,
        source: &mut dyn UniformSource,
    ) -> Result<MultiOutcome, TieError> {
        let mut tiers = vec![tied.clone()];
        for rule in self.cascade.rules() {
            let result = rule.split(ctx, &tiers[0], source);
            if result.is_empty() {
                return Err(TieError::EmptyPartition { rule: rule.name() });
            }
            tiers = if tiers.len() > 1 {
                result.into_iter().chain(tiers.into_iter().skip(1)).collect()
            } else {
                result
            };
            match tiers[0].len() {
                1 => return Ok(MultiOutcome::Single(only(&tiers[0], rule.name())?)),
                2 => return Ok(MultiOutcome::Pair(tiers[0].clone())),
                _ => continue,
            }
        }
        Err(TieError::Indeterminate {
            teams: tied.clone(),
        })
    }

    /// Best team of an arbitrary tied group.
    fn first_of_group(
        &self,
        ctx: &TiebreakContext,
        group: &BTreeSet<TeamName>,
        source: &mut dyn UniformSource,
    ) -> Result<TeamName, TieError> {
        match group.len() {
            0 => Err(TieError::NotEnoughTeams(ctx.view.name().clone())),
            1 => only(group, "singleton"),
            2 => Ok(self.pairwise(ctx, group, source)?.0),
            _ => match self.multi(ctx, group, source)? {
                MultiOutcome::Single(team) => Ok(team),
                MultiOutcome::Pair(pair) => Ok(self.pairwise(ctx, &pair, source)?.0),
            },
        }
    }
}

impl ChampionshipSeeder for CascadeSeeder {
    fn seed(
        &self,
        view: &ConferenceView,
        source: &mut dyn UniformSource,
    ) -> Result<(TeamName, TeamName), TieError> {
        let standings = view.standings();
        let ctx = TiebreakContext::new(view, standings);
        let top = standings
            .first()
            .ok_or_else(|| TieError::NotEnoughTeams(view.name().clone()))?;
        match top.len() {
            1 => {
                let seed_1 = only(top, "top tier")?;
                let second = standings
                    .get(1)
                    .ok_or_else(|| TieError::NotEnoughTeams(view.name().clone()))?;
                let seed_2 = self.first_of_group(&ctx, second, source)?;
                Ok((seed_1, seed_2))
            }
            2 => self.pairwise(&ctx, top, source),
            _ => {
                let seed_1 = self.first_of_group(&ctx, top, source)?;
                let remaining: BTreeSet<TeamName> =
                    top.iter().filter(|name| **name != seed_1).cloned().collect();
                let seed_2 = self.first_of_group(&ctx, &remaining, source)?;
                Ok((seed_1, seed_2))
            }
        }
    }
}

impl ConferenceView {
    /// Championship game participants under `seeder`.
    ///
    /// # Errors
    ///
    /// See [`ChampionshipSeeder::seed`].
    pub fn championship_pair(
        &self,
        seeder: &dyn ChampionshipSeeder,
        source: &mut dyn UniformSource,
    ) -> Result<(TeamName, TeamName), TieError> {
        seeder.seed(self, source)
    }
}

fn only(tier: &BTreeSet<TeamName>, rule: &'static str) -> Result<TeamName, TieError> {
    tier.iter()
        .next()
        .cloned()
        .ok_or(TieError::EmptyPartition { rule })
}



#[cfg(test)]
mod seeder_tests {
    use super::fixture::{tied, view};
    use super::*;
    use crate::conference::ConferenceView;
    use crate::game::mock_data::played;
    use crate::game::Game;
    use crate::roll::Scripted;

    fn small_view(games: Vec<Game>, names: &[&str]) -> ConferenceView {
        let conference = Conference::try_new(
            ConferenceName::from("zzz"),
            names.iter().map(|name| TeamName::from(*name)).collect(),
            None,
            true,
        )
        .unwrap();
        let teams = names
            .iter()
            .map(|name| {
                let name = TeamName::from(*name);
                let team_games: Vec<Game> = games
                    .iter()
                    .filter(|game| game.contains(&name))
                    .cloned()
                    .collect();
                TeamView::new(name, team_games, Some(ConferenceName::from("zzz")))
            })
            .collect();
        ConferenceView::new(conference, teams)
    }

    #[test]
    fn single_leader_takes_seed_one() {
        let games = vec![
            played("A", "B", (1, 0)),
            played("A", "C", (1, 0)),
            played("B", "C", (1, 0)),
        ];
        let view = small_view(games, &["A", "B", "C"]);
        let mut source = Scripted::new(vec![]);
        let (seed_1, seed_2) = CascadeSeeder::standard().seed(&view, &mut source).unwrap();
        assert_eq!(seed_1, TeamName::from("A"));
        assert_eq!(seed_2, TeamName::from("B"));
    }

    #[test]
    fn two_team_tie_resolved_head_to_head() {
        // A and B both 2-1, A beat B.
        let games = vec![
            played("A", "B", (1, 0)),
            played("A", "C", (1, 0)),
            played("B", "C", (1, 0)),
            played("C", "D", (1, 0)),
            played("D", "A", (1, 0)),
            played("B", "D", (1, 0)),
        ];
        let view = small_view(games, &["A", "B", "C", "D"]);
        assert_eq!(view.standings()[0], tied("AB"));
        let mut source = Scripted::new(vec![]);
        let (seed_1, seed_2) = CascadeSeeder::standard().seed(&view, &mut source).unwrap();
        assert_eq!(seed_1, TeamName::from("A"));
        assert_eq!(seed_2, TeamName::from("B"));
    }

    #[test]
    fn circular_three_way_tie_reaches_the_coin_toss() {
        // A > B > C > A, everyone beat D: a pure rock-paper-scissors top.
        let games = vec![
            played("A", "B", (1, 0)),
            played("B", "C", (1, 0)),
            played("C", "A", (1, 0)),
            played("A", "D", (1, 0)),
            played("B", "D", (1, 0)),
            played("C", "D", (1, 0)),
        ];
        let view = small_view(games, &["A", "B", "C", "D"]);
        assert_eq!(view.standings()[0], tied("ABC"));

        // Toss picks A; B beat C for the second seed... but C lost to A and
        // beat nobody left: remaining pair {B, C}, B beat C head-to-head.
        let mut source = Scripted::new(vec![0.1]);
        let (seed_1, seed_2) = CascadeSeeder::standard().seed(&view, &mut source).unwrap();
        assert_eq!(seed_1, TeamName::from("A"));
        assert_eq!(seed_2, TeamName::from("B"));

        // Toss picks B; remaining pair {A, C}, C beat A.
        let mut source = Scripted::new(vec![0.5]);
        let (seed_1, seed_2) = CascadeSeeder::standard().seed(&view, &mut source).unwrap();
        assert_eq!(seed_1, TeamName::from("B"));
        assert_eq!(seed_2, TeamName::from("C"));
    }

    #[test]
    fn fixture_top_pair_is_settled_by_the_sweep() {
        let view = view();
        let mut source = Scripted::new(vec![]);
        let (seed_1, seed_2) = CascadeSeeder::standard().seed(&view, &mut source).unwrap();
        // f beat h head-to-head.
        assert_eq!(seed_1, TeamName::from("f"));
        assert_eq!(seed_2, TeamName::from("h"));
    }

    #[test]
    fn lone_team_cannot_be_seeded() {
        let games = vec![played("A", "B", (1, 0))];
        let conference = Conference::try_new(
            ConferenceName::from("zzz"),
            [TeamName::from("A")].into_iter().collect(),
            None,
            true,
        )
        .unwrap();
        let team = TeamView::new(TeamName::from("A"), games, Some(ConferenceName::from("zzz")));
        let view = ConferenceView::new(conference, vec![team]);
        let mut source = Scripted::new(vec![]);
        assert!(matches!(
            CascadeSeeder::standard().seed(&view, &mut source),
            Err(TieError::NotEnoughTeams(_))
        ));
    }
}
