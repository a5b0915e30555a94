//! # Season snapshot
//!
//! [`SeasonSnapshot`] is the immutable root of the model: a year, the
//! conference records and every game known at snapshot time. Team and
//! conference views are derived from it, and rolling produces a new
//! snapshot with the same matchups, every game finished.
use crate::conference::{Conference, ConferenceName, ConferenceView};
use crate::game::{Game, GameKey};
use crate::roll::UniformSource;
use crate::scenario::{ScenarioCondition, ScenarioError};
use crate::team::{TeamName, TeamView};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Season year, e.g. 2024.
#[derive(
    Deserialize,
    Serialize,
    Debug,
    Display,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    From,
    Into,
)]
pub struct Year(pub i32);

/// A season at a fixed point in time: completed games with scores, remaining
/// games with win probabilities, and the conference metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSnapshot {
    year: Year,
    conferences: Vec<Conference>,
    games: Vec<Game>,
}

impl SeasonSnapshot {
    /// Fallible constructor.
    ///
    /// # Errors
    ///
    /// Game identities `(date, away, home)` and conference names must be
    /// unique, and every conference member must appear in at least one game.
    pub fn try_new(
        year: Year,
        mut conferences: Vec<Conference>,
        mut games: Vec<Game>,
    ) -> Result<Self, SeasonError> {
        games.sort_by(|a, b| a.key().cmp(&b.key()));
        for window in games.windows(2) {
            if window[0].key() == window[1].key() {
                return Err(SeasonError::DuplicateGame(window[0].key()));
            }
        }
        conferences.sort_by(|a, b| a.name.cmp(&b.name));
        for window in conferences.windows(2) {
            if window[0].name == window[1].name {
                return Err(SeasonError::DuplicateConference(window[0].name.clone()));
            }
        }
        for conference in &conferences {
            if conference.teams.is_empty() {
                return Err(SeasonError::EmptyConference(conference.name.clone()));
            }
            for team in &conference.teams {
                if !games.iter().any(|game| game.contains(team)) {
                    return Err(SeasonError::TeamWithoutGames {
                        conference: conference.name.clone(),
                        team: team.clone(),
                    });
                }
            }
        }
        Ok(Self {
            year,
            conferences,
            games,
        })
    }

    /// The invariants hold by construction when only outcomes changed.
    fn with_games(&self, games: Vec<Game>) -> Self {
        Self {
            year: self.year,
            conferences: self.conferences.clone(),
            games,
        }
    }

    pub fn year(&self) -> Year {
        self.year
    }

    /// Conferences, sorted by name.
    pub fn conferences(&self) -> &[Conference] {
        &self.conferences
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    /// Project the season onto one team.
    ///
    /// # Errors
    ///
    /// Errors if no game involves `name`.
    pub fn team(&self, name: &TeamName) -> Result<TeamView, SeasonError> {
        let games: Vec<Game> = self
            .games
            .iter()
            .filter(|game| game.contains(name))
            .cloned()
            .collect();
        if games.is_empty() {
            return Err(SeasonError::UnknownTeam(name.clone()));
        }
        let conference = self
            .conferences
            .iter()
            .find(|conference| conference.teams.contains(name))
            .map(|conference| conference.name.clone());
        Ok(TeamView::new(name.clone(), games, conference))
    }

    /// Project the season onto one conference.
    ///
    /// # Errors
    ///
    /// Errors if the conference is absent or a member has no games.
    pub fn conference(&self, name: &ConferenceName) -> Result<ConferenceView, SeasonError> {
        let conference = self
            .conferences
            .iter()
            .find(|conference| conference.name == *name)
            .ok_or_else(|| SeasonError::UnknownConference(name.clone()))?;
        let teams: Vec<TeamView> = conference
            .teams
            .iter()
            .map(|team| self.team(team))
            .collect::<Result<_, _>>()?;
        Ok(ConferenceView::new(conference.clone(), teams))
    }

    /// Restrict the snapshot to one conference, keeping only games with both
    /// endpoints inside it.
    ///
    /// # Errors
    ///
    /// Errors if the conference is absent or a member plays no
    /// intra-conference game.
    pub fn filter(&self, name: &ConferenceName) -> Result<SeasonSnapshot, SeasonError> {
        let conference = self
            .conferences
            .iter()
            .find(|conference| conference.name == *name)
            .ok_or_else(|| SeasonError::UnknownConference(name.clone()))?;
        let games: Vec<Game> = self
            .games
            .iter()
            .filter(|game| {
                conference.teams.contains(game.away()) && conference.teams.contains(game.home())
            })
            .cloned()
            .collect();
        SeasonSnapshot::try_new(self.year, vec![conference.clone()], games)
    }

    /// Sample one fully played season.
    pub fn roll<S: UniformSource + ?Sized>(&self, source: &mut S) -> SeasonSnapshot {
        self.roll_forced(source, &BTreeSet::new(), &BTreeSet::new())
    }

    /// Sample one fully played season with forced winners and losers.
    pub fn roll_forced<S: UniformSource + ?Sized>(
        &self,
        source: &mut S,
        force_winners: &BTreeSet<TeamName>,
        force_losers: &BTreeSet<TeamName>,
    ) -> SeasonSnapshot {
        self.with_games(
            self.games
                .iter()
                .map(|game| game.roll(source, force_winners, force_losers))
                .collect(),
        )
    }

    /// Sample one fully played season constrained by scenario forcers.
    ///
    /// Each forcer emits fully determined games; the union is applied and
    /// the untouched games are sampled independently. The output carries
    /// exactly the matchups of the input, every game finished.
    ///
    /// # Errors
    ///
    /// Errors if two forcers disagree on a matchup's winner, or a forcer
    /// itself fails.
    pub fn roll_with_forcers<S: UniformSource + ?Sized>(
        &self,
        source: &mut S,
        forcers: &[ScenarioCondition],
    ) -> Result<SeasonSnapshot, ScenarioError> {
        let mut forced: BTreeMap<GameKey, Game> = BTreeMap::new();
        for forcer in forcers {
            for game in forcer.force(source, self)? {
                match forced.get(&game.key()) {
                    Some(existing) if existing.winner() != game.winner() => {
                        return Err(ScenarioError::ForcingConflict {
                            matchup: game.matchup(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        forced.insert(game.key(), game);
                    }
                }
            }
        }
        let nobody = BTreeSet::new();
        let games = self
            .games
            .iter()
            .map(|game| {
                forced
                    .get(&game.key())
                    .cloned()
                    .unwrap_or_else(|| game.roll(source, &nobody, &nobody))
            })
            .collect();
        Ok(self.with_games(games))
    }
}

#[derive(Error, Debug, Clone)]
pub enum SeasonError {
    #[error("No such team: {0}")]
    UnknownTeam(TeamName),
    #[error("No such conference: {0}")]
    UnknownConference(ConferenceName),
    #[error("Duplicate game: {0:?}")]
    DuplicateGame(GameKey),
    #[error("Duplicate conference: {0}")]
    DuplicateConference(ConferenceName),
    #[error("Conference {0} has no teams")]
    EmptyConference(ConferenceName),
    #[error("{team} of {conference} appears in no game")]
    TeamWithoutGames {
        conference: ConferenceName,
        team: TeamName,
    },
}

#[cfg(test)]
pub(crate) mod mock_data {
    use super::*;
    use crate::game::mock_data::{played, upcoming};

    /// Two four-team conferences and one cross-conference game.
    pub fn season() -> SeasonSnapshot {
        let east = Conference::try_new(
            ConferenceName::from("EAST"),
            ["A", "B", "C", "D"].iter().map(|name| TeamName::from(*name)).collect(),
            None,
            true,
        )
        .unwrap();
        let west = Conference::try_new(
            ConferenceName::from("WEST"),
            ["W", "X", "Y", "Z"].iter().map(|name| TeamName::from(*name)).collect(),
            None,
            true,
        )
        .unwrap();
        let games = vec![
            played("A", "B", (1, 0)),
            played("C", "D", (1, 0)),
            upcoming("A", "C", 0.6),
            upcoming("B", "D", 0.5),
            upcoming("A", "D", 0.7),
            upcoming("B", "C", 0.4),
            played("W", "X", (1, 0)),
            played("Y", "Z", (1, 0)),
            upcoming("W", "Y", 0.5),
            upcoming("X", "Z", 0.5),
            upcoming("W", "Z", 0.5),
            upcoming("X", "Y", 0.5),
            upcoming("A", "W", 0.5),
        ];
        SeasonSnapshot::try_new(Year(2024), vec![east, west], games).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::mock_data::season;
    use super::*;
    use crate::game::mock_data::{played, upcoming};
    use crate::roll::Scripted;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn duplicate_games_are_rejected() {
        let games = vec![played("A", "B", (1, 0)), played("A", "B", (2, 0))];
        let result = SeasonSnapshot::try_new(Year(2024), vec![], games);
        assert!(matches!(result, Err(SeasonError::DuplicateGame(_))));
    }

    #[test]
    fn conference_members_need_games() {
        let conference = Conference::try_new(
            ConferenceName::from("EAST"),
            [TeamName::from("A"), TeamName::from("Q")].into_iter().collect(),
            None,
            true,
        )
        .unwrap();
        let games = vec![played("A", "B", (1, 0))];
        let result = SeasonSnapshot::try_new(Year(2024), vec![conference], games);
        assert!(matches!(result, Err(SeasonError::TeamWithoutGames { .. })));
    }

    #[test]
    fn unknown_lookups_fail() {
        let season = season();
        assert!(matches!(
            season.team(&TeamName::from("nope")),
            Err(SeasonError::UnknownTeam(_))
        ));
        assert!(matches!(
            season.conference(&ConferenceName::from("nope")),
            Err(SeasonError::UnknownConference(_))
        ));
    }

    #[test]
    fn team_view_carries_conference() {
        let season = season();
        let team = season.team(&TeamName::from("A")).unwrap();
        assert_eq!(team.conference(), Some(&ConferenceName::from("EAST")));
        // 3 intra-conference games plus the cross-conference one.
        assert_eq!(team.games().len(), 4);
    }

    #[test]
    fn filter_keeps_intra_conference_games_only() {
        let season = season();
        let east = season.filter(&ConferenceName::from("EAST")).unwrap();
        assert_eq!(east.conferences().len(), 1);
        assert_eq!(east.games().len(), 6);
        assert!(east
            .games()
            .iter()
            .all(|game| !game.contains(&TeamName::from("W"))));
    }

    #[test]
    fn roll_finishes_every_matchup_once() {
        let season = season();
        let mut rng = StdRng::seed_from_u64(11);
        let rolled = season.roll(&mut rng);
        assert_eq!(rolled.games().len(), season.games().len());
        assert!(rolled.games().iter().all(Game::is_over));
        let keys: BTreeSet<GameKey> = season.games().iter().map(Game::key).collect();
        let rolled_keys: BTreeSet<GameKey> = rolled.games().iter().map(Game::key).collect();
        assert_eq!(keys, rolled_keys);
    }

    #[test]
    fn completed_games_survive_rolling() {
        let season = season();
        let mut rng = StdRng::seed_from_u64(3);
        let rolled = season.roll(&mut rng);
        let game = rolled
            .games()
            .iter()
            .find(|game| game.contains(&TeamName::from("B")) && game.contains(&TeamName::from("A")))
            .unwrap();
        // A beat B in the ingested result; rolling must not rewrite it.
        assert_eq!(game.winner(), Some(&TeamName::from("A")));
    }

    #[test]
    fn forced_winners_win_out() {
        let season = season();
        let mut source = Scripted::new(vec![0.5; 16]);
        let winners: BTreeSet<TeamName> = [TeamName::from("D")].into_iter().collect();
        let rolled = season.roll_forced(&mut source, &winners, &BTreeSet::new());
        let team = rolled.team(&TeamName::from("D")).unwrap();
        // D had one loss ingested; everything remaining becomes a win.
        assert_eq!(team.losses(), 1);
        assert_eq!(team.wins(), 2);
    }

    #[test]
    fn tie_games_pass_through() {
        let games = vec![played("A", "B", (7, 7)), upcoming("A", "C", 0.5)];
        let season = SeasonSnapshot::try_new(Year(2024), vec![], games).unwrap();
        let mut source = Scripted::new(vec![0.9]);
        let rolled = season.roll(&mut source);
        let team = rolled.team(&TeamName::from("A")).unwrap();
        assert_eq!(team.ties(), 1);
    }
}
