#![forbid(unsafe_code)]
#![warn(
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod conference;
pub mod error;
pub mod game;
pub mod outcomes;
pub mod roll;
pub mod scenario;
pub mod season;
pub mod simulator;
pub mod team;

/// Calendar date of a game.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub struct Date(NaiveDate);

impl Date {
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn mock() -> Self {
        Self(NaiveDate::from_ymd_opt(1632, 11, 6).expect("hard-coded valid date"))
    }
}

impl From<NaiveDate> for Date {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl FromStr for Date {
    type Err = chrono::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Length of a regular season; win totals and loss tuples are reported
/// against this number of games.
pub const REGULAR_SEASON_GAMES: u32 = 12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trip() {
        let date: Date = "2024-11-23".parse().unwrap();
        assert_eq!(date.to_string(), "2024-11-23");
    }

    #[test]
    fn date_rejects_gibberish() {
        assert!("23/11/2024".parse::<Date>().is_err());
    }
}
