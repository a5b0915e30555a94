//! # Conference
//!
//! A [`Conference`] is metadata: its member teams, optional divisions and
//! whether it stages a championship game. The only season-specific knobs it
//! carries are the tiebreaker adjustments — matchups to treat as not yet
//! played and hosts whose home games fall outside the 12-game win total —
//! which are data attached at ingestion, never control flow.
//!
//! [`ConferenceView`] projects a rolled (or partially played) season onto
//! one conference and derives the standings: teams partitioned into tiers
//! of equal intra-conference win percentage, best tier first.
pub mod tiebreak;

use crate::game::Matchup;
use crate::team::{TeamName, TeamView, WinPercentage};
use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Abbreviated conference name (e.g. "B12").
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
pub struct ConferenceName(String);

impl From<&str> for ConferenceName {
    fn from(name: &str) -> Self {
        Self(String::from(name))
    }
}

/// Named subset of a conference's teams.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Division {
    pub name: String,
    pub teams: BTreeSet<TeamName>,
}

/// A conference of teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conference {
    pub name: ConferenceName,
    pub teams: BTreeSet<TeamName>,
    pub divisions: Option<BTreeSet<Division>>,
    pub has_championship_game: bool,
    /// Matchups treated as not yet played when tiebreakers consult records.
    #[serde(default)]
    pub tiebreak_excluded_pairs: BTreeSet<Matchup>,
    /// Non-neutral games hosted by these teams do not count toward the
    /// 12-game-season win total.
    #[serde(default)]
    pub cap_exempt_hosts: BTreeSet<TeamName>,
}

impl Conference {
    /// Fallible constructor.
    ///
    /// # Errors
    ///
    /// Division teams must be conference members and divisions must be
    /// pairwise disjoint.
    pub fn try_new(
        name: ConferenceName,
        teams: BTreeSet<TeamName>,
        divisions: Option<BTreeSet<Division>>,
        has_championship_game: bool,
    ) -> Result<Self, ConferenceError> {
        if let Some(divisions) = &divisions {
            for division in divisions {
                for team in &division.teams {
                    if !teams.contains(team) {
                        return Err(ConferenceError::DivisionTeamNotMember {
                            division: division.name.clone(),
                            team: team.clone(),
                        });
                    }
                }
            }
            let mut seen: BTreeSet<&TeamName> = BTreeSet::new();
            for division in divisions {
                for team in &division.teams {
                    if !seen.insert(team) {
                        return Err(ConferenceError::DivisionsOverlap(team.clone()));
                    }
                }
            }
        }
        Ok(Self {
            name,
            teams,
            divisions,
            has_championship_game,
            tiebreak_excluded_pairs: BTreeSet::new(),
            cap_exempt_hosts: BTreeSet::new(),
        })
    }

    pub fn with_tiebreak_excluded_pairs(mut self, pairs: BTreeSet<Matchup>) -> Self {
        self.tiebreak_excluded_pairs = pairs;
        self
    }

    pub fn with_cap_exempt_hosts(mut self, hosts: BTreeSet<TeamName>) -> Self {
        self.cap_exempt_hosts = hosts;
        self
    }
}

/// Position of a team in the standings: 1-indexed, with the number of teams
/// sharing the position before tiebreaking.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Standing {
    pub position: u32,
    pub tier_size: u32,
}

#[derive(Error, Debug, Clone)]
pub enum ConferenceError {
    #[error("No team '{team}' in conference {conference}")]
    UnknownTeam {
        conference: ConferenceName,
        team: TeamName,
    },
    #[error("Division '{division}' team '{team}' is not a conference member")]
    DivisionTeamNotMember { division: String, team: TeamName },
    #[error("Team '{0}' appears in more than one division")]
    DivisionsOverlap(TeamName),
}

/// Read-only projection of a season onto one conference.
///
/// The standings are computed eagerly: every roll reads them at least once
/// (seeding, per-team standing queries), and the view is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceView {
    conference: Conference,
    teams: Vec<TeamView>,
    standings: Vec<BTreeSet<TeamName>>,
}

impl ConferenceView {
    pub(crate) fn new(conference: Conference, mut teams: Vec<TeamView>) -> Self {
        teams.sort_by(|a, b| a.name().cmp(b.name()));
        let standings = standings_of(&conference, &teams);
        Self {
            conference,
            teams,
            standings,
        }
    }

    pub fn conference(&self) -> &Conference {
        &self.conference
    }

    pub fn name(&self) -> &ConferenceName {
        &self.conference.name
    }

    pub fn teams(&self) -> &[TeamView] {
        &self.teams
    }

    pub fn team_names(&self) -> BTreeSet<TeamName> {
        self.teams.iter().map(|team| team.name().clone()).collect()
    }

    pub fn team(&self, name: &TeamName) -> Result<&TeamView, ConferenceError> {
        // Teams are name-sorted at construction.
        self.teams
            .binary_search_by(|team| team.name().cmp(name))
            .map(|index| &self.teams[index])
            .map_err(|_| ConferenceError::UnknownTeam {
                conference: self.conference.name.clone(),
                team: name.clone(),
            })
    }

    /// Standings tiers: teams grouped by intra-conference win percentage,
    /// best first. No tiebreaking is applied here.
    pub fn standings(&self) -> &[BTreeSet<TeamName>] {
        &self.standings
    }

    /// Standing of `team` before tiebreaking.
    ///
    /// # Errors
    ///
    /// Errors if `team` is not a conference member.
    pub fn standing(&self, team: &TeamName) -> Result<Standing, ConferenceError> {
        let mut teams_above = 0;
        for tier in &self.standings {
            if tier.contains(team) {
                return Ok(Standing {
                    position: teams_above + 1,
                    tier_size: tier.len() as u32,
                });
            }
            teams_above += tier.len() as u32;
        }
        Err(ConferenceError::UnknownTeam {
            conference: self.conference.name.clone(),
            team: team.clone(),
        })
    }
}

fn standings_of(conference: &Conference, teams: &[TeamView]) -> Vec<BTreeSet<TeamName>> {
    let members: BTreeSet<TeamName> = teams.iter().map(|team| team.name().clone()).collect();
    let keyed: Vec<(TeamName, WinPercentage)> = teams
        .iter()
        .map(|team| {
            (
                team.name().clone(),
                team.filtered_win_percentage(&members, &conference.tiebreak_excluded_pairs),
            )
        })
        .collect();
    sorted_with_ties(keyed)
}

/// Group names by key into tiers, best (greatest key) first.
pub(crate) fn sorted_with_ties<K: Ord>(mut keyed: Vec<(TeamName, K)>) -> Vec<BTreeSet<TeamName>> {
    keyed.sort_by(|a, b| b.1.cmp(&a.1));
    let mut tiers: Vec<BTreeSet<TeamName>> = Vec::new();
    let mut last: Option<K> = None;
    for (name, key) in keyed {
        match (&last, tiers.last_mut()) {
            (Some(previous), Some(tier)) if *previous == key => {
                tier.insert(name);
            }
            _ => {
                tiers.push([name].into_iter().collect());
            }
        }
        last = Some(key);
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::mock_data::{played, upcoming};

    fn conference(teams: &[&str]) -> Conference {
        Conference::try_new(
            ConferenceName::from("zzz"),
            teams.iter().map(|name| TeamName::from(*name)).collect(),
            None,
            true,
        )
        .unwrap()
    }

    fn view() -> ConferenceView {
        // a beat b and c, b beat c; d still unplayed against everyone.
        let games = vec![
            played("a", "b", (1, 0)),
            played("a", "c", (1, 0)),
            played("b", "c", (1, 0)),
            upcoming("a", "d", 0.5),
        ];
        let team = |name: &str| {
            TeamView::new(
                TeamName::from(name),
                games
                    .iter()
                    .filter(|game| game.contains(&TeamName::from(name)))
                    .cloned()
                    .collect(),
                Some(ConferenceName::from("zzz")),
            )
        };
        ConferenceView::new(
            conference(&["a", "b", "c", "d"]),
            vec![team("a"), team("b"), team("c"), team("d")],
        )
    }

    #[test]
    fn divisions_must_be_members() {
        let division = Division {
            name: String::from("South"),
            teams: [TeamName::from("x")].into_iter().collect(),
        };
        let result = Conference::try_new(
            ConferenceName::from("zzz"),
            [TeamName::from("a")].into_iter().collect(),
            Some([division].into_iter().collect()),
            true,
        );
        assert!(matches!(
            result,
            Err(ConferenceError::DivisionTeamNotMember { .. })
        ));
    }

    #[test]
    fn divisions_must_be_disjoint() {
        let teams: BTreeSet<TeamName> =
            [TeamName::from("a"), TeamName::from("b")].into_iter().collect();
        let north = Division {
            name: String::from("North"),
            teams: [TeamName::from("a")].into_iter().collect(),
        };
        let south = Division {
            name: String::from("South"),
            teams: [TeamName::from("a"), TeamName::from("b")].into_iter().collect(),
        };
        let result = Conference::try_new(
            ConferenceName::from("zzz"),
            teams,
            Some([north, south].into_iter().collect()),
            true,
        );
        assert!(matches!(result, Err(ConferenceError::DivisionsOverlap(_))));
    }

    #[test]
    fn standings_tiers() {
        let view = view();
        let standings = view.standings();
        // a: 2-0 (1.000), d: 0-0 (seeds as 1.000), b: 1-1, c: 0-2.
        assert_eq!(standings.len(), 3);
        assert_eq!(
            standings[0],
            [TeamName::from("a"), TeamName::from("d")].into_iter().collect()
        );
        assert_eq!(standings[1], [TeamName::from("b")].into_iter().collect());
        assert_eq!(standings[2], [TeamName::from("c")].into_iter().collect());
    }

    #[test]
    fn standing_positions() {
        let view = view();
        assert_eq!(
            view.standing(&TeamName::from("a")).unwrap(),
            Standing { position: 1, tier_size: 2 }
        );
        assert_eq!(
            view.standing(&TeamName::from("b")).unwrap(),
            Standing { position: 3, tier_size: 1 }
        );
        assert!(view.standing(&TeamName::from("x")).is_err());
    }

    #[test]
    fn sorted_with_ties_groups_equal_keys() {
        let tiers = sorted_with_ties(vec![
            (TeamName::from("a"), 3),
            (TeamName::from("b"), 1),
            (TeamName::from("c"), 3),
            (TeamName::from("d"), 2),
        ]);
        assert_eq!(tiers.len(), 3);
        assert_eq!(
            tiers[0],
            [TeamName::from("a"), TeamName::from("c")].into_iter().collect()
        );
        assert_eq!(tiers[1], [TeamName::from("d")].into_iter().collect());
        assert_eq!(tiers[2], [TeamName::from("b")].into_iter().collect());
    }
}
