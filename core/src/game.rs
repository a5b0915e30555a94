//! # Game
//!
//! A [`Game`] is the fundamental record of the season model: one matchup,
//! either finished (it carries a final score) or upcoming (it carries a win
//! probability for the away side). Everything else in the crate is derived
//! from collections of games.
//!
//! Games are never mutated. Rolling or forcing an outcome produces a clone
//! with a canonical 1-0 score, so `winner` is well defined downstream and a
//! rolled game can never be a tie. Ties only enter through ingested final
//! scores and survive rolling untouched.
use crate::roll::UniformSource;
use crate::team::TeamName;
use crate::Date;
use derive_more::{Display, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Validated win probability in `[0, 1]`.
#[derive(Debug, Display, Deserialize, Serialize, Clone, Copy, PartialEq, PartialOrd, Into)]
pub struct WinProbability(f64);

impl WinProbability {
    /// Fallible constructor.
    ///
    /// # Errors
    ///
    /// Errors if `p` is outside `[0, 1]` (NaN included).
    pub fn try_new(p: f64) -> Result<Self, GameError> {
        if (0.0..=1.0).contains(&p) {
            Ok(Self(p))
        } else {
            Err(GameError::ProbabilityOutOfRange(p))
        }
    }

    pub fn complement(self) -> Self {
        Self(1.0 - self.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Final score of a game, away side first.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Score {
    pub away: u16,
    pub home: u16,
}

impl Score {
    pub fn new(away: u16, home: u16) -> Self {
        Self { away, home }
    }
}

impl From<(u16, u16)> for Score {
    fn from((away, home): (u16, u16)) -> Self {
        Self { away, home }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.away, self.home)
    }
}

/// Unordered pair of team names.
///
/// Normalised on construction so that `Matchup::new(a, b)` and
/// `Matchup::new(b, a)` compare equal; used as the key for championship-game
/// pairings, tiebreaker exclusions and scenario probability factors.
#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Matchup(TeamName, TeamName);

impl Matchup {
    pub fn new(a: TeamName, b: TeamName) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn contains(&self, team: &TeamName) -> bool {
        self.0 == *team || self.1 == *team
    }

    /// The other side of the pair, if `team` is one of them.
    pub fn other(&self, team: &TeamName) -> Option<&TeamName> {
        if self.0 == *team {
            Some(&self.1)
        } else if self.1 == *team {
            Some(&self.0)
        } else {
            None
        }
    }

    pub fn teams(&self) -> (&TeamName, &TeamName) {
        (&self.0, &self.1)
    }
}

impl fmt::Display for Matchup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.0, self.1)
    }
}

/// Identity of a matchup within a season: `(date, away, home)`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GameKey(Date, TeamName, TeamName);

/// Supplies win probabilities for ingested matchups that carry neither a
/// final score nor odds.
pub trait WinProbabilityProvider {
    fn win_probability(&self, away: &TeamName, home: &TeamName, neutral: bool) -> WinProbability;
}

/// A game between two teams.
///
/// Exactly one of final score and away-side win probability is present; the
/// constructor enforces it. On a neutral site the away/home distinction is a
/// naming convention only.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Game {
    date: Date,
    away: TeamName,
    home: TeamName,
    neutral: bool,
    score: Option<Score>,
    away_win_probability: Option<WinProbability>,
}

impl Game {
    /// Fallible constructor.
    ///
    /// # Errors
    ///
    /// Enforces distinct teams and exactly one of {score, probability}.
    pub fn try_new(
        date: Date,
        away: TeamName,
        home: TeamName,
        neutral: bool,
        score: Option<Score>,
        away_win_probability: Option<WinProbability>,
    ) -> Result<Self, GameError> {
        if away == home {
            return Err(GameError::TeamsNotDistinct(away));
        }
        match (&score, &away_win_probability) {
            (None, None) => Err(GameError::MissingOutcomeModel { away, home }),
            (Some(_), Some(_)) => Err(GameError::AmbiguousOutcomeModel { away, home }),
            _ => Ok(Self {
                date,
                away,
                home,
                neutral,
                score,
                away_win_probability,
            }),
        }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn away(&self) -> &TeamName {
        &self.away
    }

    pub fn home(&self) -> &TeamName {
        &self.home
    }

    pub fn neutral(&self) -> bool {
        self.neutral
    }

    pub fn score(&self) -> Option<Score> {
        self.score
    }

    pub fn away_win_probability(&self) -> Option<WinProbability> {
        self.away_win_probability
    }

    pub fn key(&self) -> GameKey {
        GameKey(self.date, self.away.clone(), self.home.clone())
    }

    pub fn matchup(&self) -> Matchup {
        Matchup::new(self.away.clone(), self.home.clone())
    }

    pub fn is_over(&self) -> bool {
        self.score.is_some()
    }

    pub fn is_tie(&self) -> bool {
        matches!(self.score, Some(score) if score.away == score.home)
    }

    /// Winner, if the game is over and not a tie.
    pub fn winner(&self) -> Option<&TeamName> {
        let score = self.score?;
        match score.away.cmp(&score.home) {
            std::cmp::Ordering::Greater => Some(&self.away),
            std::cmp::Ordering::Less => Some(&self.home),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, team: &TeamName) -> bool {
        self.away == *team || self.home == *team
    }

    /// The opponent of `team` in this game.
    ///
    /// # Errors
    ///
    /// Errors if `team` is not a participant.
    pub fn opponent(&self, team: &TeamName) -> Result<&TeamName, GameError> {
        if self.away == *team {
            Ok(&self.home)
        } else if self.home == *team {
            Ok(&self.away)
        } else {
            Err(self.unknown_team(team))
        }
    }

    /// Win probability of `team`: 1 if it won, 0 if it lost or tied, the
    /// stored probability (or its complement for the home side) otherwise.
    ///
    /// # Errors
    ///
    /// Errors if `team` is not a participant.
    pub fn win_probability(&self, team: &TeamName) -> Result<f64, GameError> {
        if !self.contains(team) {
            return Err(self.unknown_team(team));
        }
        if self.is_over() {
            return Ok(if self.winner() == Some(team) { 1.0 } else { 0.0 });
        }
        // try_new guarantees a probability when there is no score.
        let p = self
            .away_win_probability
            .expect("a game without a final score carries a probability");
        Ok(if self.away == *team {
            p.value()
        } else {
            p.complement().value()
        })
    }

    /// Clone with the outcome forced for `team`; an already finished game is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Errors if `team` is not a participant.
    pub fn forced(&self, team: &TeamName, win: bool) -> Result<Game, GameError> {
        if !self.contains(team) {
            return Err(self.unknown_team(team));
        }
        Ok(self.force_participant(team, win))
    }

    /// Sample an outcome; already finished games are returned unchanged and
    /// a forced team short-circuits the draw.
    pub fn roll<S: UniformSource + ?Sized>(
        &self,
        source: &mut S,
        force_winners: &BTreeSet<TeamName>,
        force_losers: &BTreeSet<TeamName>,
    ) -> Game {
        if self.is_over() {
            return self.clone();
        }
        for winner in force_winners {
            if self.contains(winner) {
                return self.force_participant(winner, true);
            }
        }
        for loser in force_losers {
            if self.contains(loser) {
                return self.force_participant(loser, false);
            }
        }
        let p = self
            .away_win_probability
            .expect("a game without a final score carries a probability")
            .value();
        let score = if source.chance(p) {
            Score::new(1, 0)
        } else {
            Score::new(0, 1)
        };
        self.with_score(score)
    }

    /// `team` must be a participant and the game not over.
    fn force_participant(&self, team: &TeamName, win: bool) -> Game {
        if self.is_over() {
            return self.clone();
        }
        let score = if (win && self.away == *team) || (!win && self.home == *team) {
            Score::new(1, 0)
        } else {
            Score::new(0, 1)
        };
        self.with_score(score)
    }

    fn with_score(&self, score: Score) -> Game {
        Game {
            date: self.date,
            away: self.away.clone(),
            home: self.home.clone(),
            neutral: self.neutral,
            score: Some(score),
            away_win_probability: None,
        }
    }

    fn unknown_team(&self, team: &TeamName) -> GameError {
        GameError::UnknownTeam {
            team: team.clone(),
            away: self.away.clone(),
            home: self.home.clone(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum GameError {
    #[error("'{team}' is not a participant in {away} at {home}")]
    UnknownTeam {
        team: TeamName,
        away: TeamName,
        home: TeamName,
    },
    #[error("A game needs two distinct teams, got '{0}' twice")]
    TeamsNotDistinct(TeamName),
    #[error("{away} at {home} carries neither a final score nor a win probability")]
    MissingOutcomeModel { away: TeamName, home: TeamName },
    #[error("{away} at {home} carries both a final score and a win probability")]
    AmbiguousOutcomeModel { away: TeamName, home: TeamName },
    #[error("Win probability {0} outside [0, 1]")]
    ProbabilityOutOfRange(f64),
}


#[cfg(test)]
mod tests {
    use super::mock_data::{played, upcoming};
    use super::*;
    use crate::roll::Scripted;

    #[test]
    fn winner_and_tie() {
        let game = played("a", "b", (21, 17));
        assert_eq!(game.winner(), Some(&TeamName::from("a")));
        assert!(!game.is_tie());

        let tie = played("a", "b", (10, 10));
        assert_eq!(tie.winner(), None);
        assert!(tie.is_tie());
    }

    #[test]
    fn probabilities_sum_to_one() {
        let game = upcoming("a", "b", 0.3);
        let p_a = game.win_probability(&TeamName::from("a")).unwrap();
        let p_b = game.win_probability(&TeamName::from("b")).unwrap();
        assert!((p_a + p_b - 1.0).abs() < 1e-12);

        let over = played("a", "b", (7, 3));
        assert_eq!(over.win_probability(&TeamName::from("a")).unwrap(), 1.0);
        assert_eq!(over.win_probability(&TeamName::from("b")).unwrap(), 0.0);
    }

    #[test]
    fn unknown_team_is_rejected() {
        let game = upcoming("a", "b", 0.5);
        assert!(game.win_probability(&TeamName::from("c")).is_err());
        assert!(game.opponent(&TeamName::from("c")).is_err());
        assert!(game.forced(&TeamName::from("c"), true).is_err());
    }

    #[test]
    fn exactly_one_outcome_model() {
        let err = Game::try_new(
            Date::mock(),
            TeamName::from("a"),
            TeamName::from("b"),
            false,
            None,
            None,
        );
        assert!(matches!(err, Err(GameError::MissingOutcomeModel { .. })));

        let err = Game::try_new(
            Date::mock(),
            TeamName::from("a"),
            TeamName::from("b"),
            false,
            Some(Score::new(1, 0)),
            Some(WinProbability::try_new(0.5).unwrap()),
        );
        assert!(matches!(err, Err(GameError::AmbiguousOutcomeModel { .. })));
    }

    #[test]
    fn forcing_picks_the_right_side() {
        let game = upcoming("a", "b", 0.5);
        let forced = game.forced(&TeamName::from("b"), true).unwrap();
        assert_eq!(forced.winner(), Some(&TeamName::from("b")));
        assert!(forced.is_over());
        assert!(forced.away_win_probability().is_none());

        // Finished games are left alone.
        let over = played("a", "b", (3, 7));
        let unchanged = over.forced(&TeamName::from("a"), true).unwrap();
        assert_eq!(unchanged.winner(), Some(&TeamName::from("b")));
    }

    #[test]
    fn roll_respects_forced_sets() {
        let game = upcoming("a", "b", 0.01);
        let mut source = Scripted::new(vec![]);
        let winners: BTreeSet<TeamName> = [TeamName::from("a")].into_iter().collect();
        let rolled = game.roll(&mut source, &winners, &BTreeSet::new());
        assert_eq!(rolled.winner(), Some(&TeamName::from("a")));
    }

    #[test]
    fn roll_samples_the_away_probability() {
        let game = upcoming("a", "b", 0.7);
        let none = BTreeSet::new();
        let mut source = Scripted::new(vec![0.69, 0.71]);
        let first = game.roll(&mut source, &none, &none);
        assert_eq!(first.winner(), Some(&TeamName::from("a")));
        let second = game.roll(&mut source, &none, &none);
        assert_eq!(second.winner(), Some(&TeamName::from("b")));
    }

    #[test]
    fn matchup_is_unordered() {
        let ab = Matchup::new(TeamName::from("b"), TeamName::from("a"));
        assert_eq!(ab, Matchup::new(TeamName::from("a"), TeamName::from("b")));
        assert_eq!(ab.other(&TeamName::from("a")), Some(&TeamName::from("b")));
        assert_eq!(ab.other(&TeamName::from("c")), None);
    }

    #[test]
    fn probability_bounds() {
        assert!(WinProbability::try_new(1.2).is_err());
        assert!(WinProbability::try_new(-0.1).is_err());
        assert!(WinProbability::try_new(f64::NAN).is_err());
        assert_eq!(WinProbability::try_new(0.25).unwrap().complement().value(), 0.75);
    }
}
