//! # Snapshot text format
//!
//! A season snapshot serialises to a line-oriented form:
//!
//! ```text
//! 2024
//! $ conferences
//! B12
//! True
//! BYU,Kansas St,Iowa St
//! West,BYU&East,Kansas St,Iowa St
//! %
//! ...next conference...
//! $ games
//! 2024-10-05*BYU*Iowa St*True*None*0.45
//! 2024-09-07*BYU*Kansas St*False*(34,28)*None
//! ```
//!
//! The first line is the year. Conference records are four lines (name,
//! championship-game flag, comma-separated teams, `&`-separated divisions)
//! separated by `%`. Game lines are `date*away*home*neutral*score*
//! probability` with `None` for the absent half of the score/probability
//! pair. Lines starting with `#` are comments.
use ccg_core::conference::{Conference, ConferenceError, ConferenceName, Division};
use ccg_core::game::{Game, GameError, Score, WinProbability, WinProbabilityProvider};
use ccg_core::season::{SeasonError, SeasonSnapshot, Year};
use ccg_core::team::TeamName;
use ccg_core::Date;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotParseError {
    #[error("Line {line}: could not parse year '{text}'")]
    YearParse { line: usize, text: String },
    #[error("Missing year line")]
    MissingYear,
    #[error("Missing '$ games' section")]
    MissingGames,
    #[error("Line {line}: conference record needs 4 lines, got {got}")]
    ConferenceRecord { line: usize, got: usize },
    #[error("Line {line}: could not parse bool '{text}'")]
    BoolParse { line: usize, text: String },
    #[error("Line {line}: could not parse date '{text}'")]
    DateParse { line: usize, text: String },
    #[error("Line {line}: could not parse score '{text}'")]
    ScoreParse { line: usize, text: String },
    #[error("Line {line}: could not parse probability '{text}'")]
    ProbabilityParse { line: usize, text: String },
    #[error("Line {line}: game record needs 6 fields, got {got}")]
    GameRecord { line: usize, got: usize },
    #[error("Line {line}: game has neither score nor probability and no provider was given")]
    MissingProbability { line: usize },
    #[error("Line {line}: unexpected line '{text}'")]
    UnexpectedLine { line: usize, text: String },
    #[error("Game error: {0}")]
    Game(#[from] GameError),
    #[error("Conference error: {0}")]
    Conference(#[from] ConferenceError),
    #[error("Season error: {0}")]
    Season(#[from] SeasonError),
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

enum Section {
    Year,
    Conferences,
    Games,
}

/// Parse a snapshot from its text form.
///
/// Games that carry neither a score nor a probability are completed from
/// `provider` when one is given.
///
/// # Errors
///
/// Positional [`SnapshotParseError`] for the first malformed line, or the
/// underlying model error if the parsed snapshot violates an invariant.
pub fn parse_season(
    input: &str,
    provider: Option<&dyn WinProbabilityProvider>,
) -> Result<SeasonSnapshot, SnapshotParseError> {
    let mut year: Option<Year> = None;
    let mut conferences: Vec<Conference> = Vec::new();
    let mut games: Vec<Game> = Vec::new();
    let mut buffer: Vec<(usize, String)> = Vec::new();
    let mut section = Section::Year;

    for (index, raw) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.starts_with('#') {
            continue;
        }
        // The fourth line of a conference record (divisions) may be empty,
        // so blank lines are only skipped outside that section.
        if line.is_empty() && !matches!(section, Section::Conferences) {
            continue;
        }
        match section {
            Section::Year => {
                if year.is_none() {
                    let parsed = line.parse().map_err(|_| SnapshotParseError::YearParse {
                        line: line_no,
                        text: line.to_string(),
                    })?;
                    year = Some(Year(parsed));
                } else if line.starts_with('$') {
                    section = Section::Conferences;
                } else {
                    return Err(SnapshotParseError::UnexpectedLine {
                        line: line_no,
                        text: line.to_string(),
                    });
                }
            }
            Section::Conferences => {
                if line.starts_with('$') || line.starts_with('%') {
                    if !buffer.is_empty() {
                        conferences.push(parse_conference(&buffer)?);
                        buffer.clear();
                    }
                    if line.starts_with('$') {
                        section = Section::Games;
                    }
                } else {
                    buffer.push((line_no, line.to_string()));
                }
            }
            Section::Games => {
                games.push(parse_game(line_no, line, provider)?);
            }
        }
    }

    let year = year.ok_or(SnapshotParseError::MissingYear)?;
    if !matches!(section, Section::Games) {
        return Err(SnapshotParseError::MissingGames);
    }
    Ok(SeasonSnapshot::try_new(year, conferences, games)?)
}

/// Render a snapshot to its text form; the exact inverse of
/// [`parse_season`].
pub fn serialize_season(season: &SeasonSnapshot) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(season.year().to_string());
    lines.push(String::from("$ conferences"));
    let mut first = true;
    for conference in season.conferences() {
        if !first {
            lines.push(String::from("%"));
        }
        first = false;
        lines.push(conference.name.to_string());
        lines.push(String::from(bool_text(conference.has_championship_game)));
        lines.push(
            conference
                .teams
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>()
                .join(","),
        );
        lines.push(match &conference.divisions {
            None => String::new(),
            Some(divisions) => divisions
                .iter()
                .map(|division| {
                    std::iter::once(division.name.as_str())
                        .chain(division.teams.iter().map(AsRef::as_ref))
                        .collect::<Vec<&str>>()
                        .join(",")
                })
                .collect::<Vec<String>>()
                .join("&"),
        });
    }
    lines.push(String::from("$ games"));
    for game in season.games() {
        lines.push(format!(
            "{}*{}*{}*{}*{}*{}",
            game.date(),
            game.away(),
            game.home(),
            bool_text(game.neutral()),
            score_text(game.score()),
            probability_text(game.away_win_probability()),
        ));
    }
    lines.join("\n") + "\n"
}

fn parse_conference(buffer: &[(usize, String)]) -> Result<Conference, SnapshotParseError> {
    if buffer.len() != 4 {
        return Err(SnapshotParseError::ConferenceRecord {
            line: buffer.first().map(|(line, _)| *line).unwrap_or(0),
            got: buffer.len(),
        });
    }
    let name = ConferenceName::from(buffer[0].1.as_str());
    let has_championship_game = parse_bool(buffer[1].0, &buffer[1].1)?;
    let teams: BTreeSet<TeamName> = buffer[2]
        .1
        .split(',')
        .map(|team| TeamName::from(team.trim()))
        .collect();
    let divisions = parse_divisions(&buffer[3].1);
    Ok(Conference::try_new(
        name,
        teams,
        divisions,
        has_championship_game,
    )?)
}

fn parse_divisions(text: &str) -> Option<BTreeSet<Division>> {
    let divisions: BTreeSet<Division> = text
        .split('&')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let mut fields = part.split(',').map(str::trim);
            let name = fields.next().unwrap_or_default().to_string();
            let teams = fields.map(TeamName::from).collect();
            Division { name, teams }
        })
        .collect();
    if divisions.is_empty() {
        None
    } else {
        Some(divisions)
    }
}

fn parse_game(
    line: usize,
    text: &str,
    provider: Option<&dyn WinProbabilityProvider>,
) -> Result<Game, SnapshotParseError> {
    let fields: Vec<&str> = text.split('*').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(SnapshotParseError::GameRecord {
            line,
            got: fields.len(),
        });
    }
    let date: Date = fields[0].parse().map_err(|_| SnapshotParseError::DateParse {
        line,
        text: fields[0].to_string(),
    })?;
    let away = TeamName::from(fields[1]);
    let home = TeamName::from(fields[2]);
    let neutral = parse_bool(line, fields[3])?;
    let score = parse_score(line, fields[4])?;
    let mut probability = parse_probability(line, fields[5])?;
    if score.is_none() && probability.is_none() {
        match provider {
            Some(provider) => {
                probability = Some(provider.win_probability(&away, &home, neutral));
            }
            None => return Err(SnapshotParseError::MissingProbability { line }),
        }
    }
    Ok(Game::try_new(date, away, home, neutral, score, probability)?)
}

fn parse_bool(line: usize, text: &str) -> Result<bool, SnapshotParseError> {
    match text {
        "t" | "1" | "true" | "T" | "True" | "TRUE" => Ok(true),
        "f" | "0" | "false" | "F" | "False" | "FALSE" => Ok(false),
        _ => Err(SnapshotParseError::BoolParse {
            line,
            text: text.to_string(),
        }),
    }
}

fn parse_score(line: usize, text: &str) -> Result<Option<Score>, SnapshotParseError> {
    if text == "None" || text == "none" || text.is_empty() {
        return Ok(None);
    }
    let inner = text
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| SnapshotParseError::ScoreParse {
            line,
            text: text.to_string(),
        })?;
    let mut parts = inner.split(',').map(str::trim);
    let away = parts.next().and_then(|part| part.parse::<u16>().ok());
    let home = parts.next().and_then(|part| part.parse::<u16>().ok());
    match (away, home, parts.next()) {
        (Some(away), Some(home), None) => Ok(Some(Score::new(away, home))),
        _ => Err(SnapshotParseError::ScoreParse {
            line,
            text: text.to_string(),
        }),
    }
}

fn parse_probability(
    line: usize,
    text: &str,
) -> Result<Option<WinProbability>, SnapshotParseError> {
    if text == "None" || text == "none" || text.is_empty() {
        return Ok(None);
    }
    let value: f64 = text.parse().map_err(|_| SnapshotParseError::ProbabilityParse {
        line,
        text: text.to_string(),
    })?;
    WinProbability::try_new(value).map(Some).map_err(|_| {
        SnapshotParseError::ProbabilityParse {
            line,
            text: text.to_string(),
        }
    })
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn score_text(score: Option<Score>) -> String {
    match score {
        None => String::from("None"),
        Some(score) => format!("({},{})", score.away, score.home),
    }
}

fn probability_text(probability: Option<WinProbability>) -> String {
    match probability {
        None => String::from("None"),
        Some(probability) => probability.value().to_string(),
    }
}
