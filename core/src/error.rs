//! Top-level error type for `ccg_core`
use crate::conference::tiebreak::TieError;
use crate::conference::ConferenceError;
use crate::game::GameError;
use crate::outcomes::OutcomeError;
use crate::scenario::ScenarioError;
use crate::season::SeasonError;
use crate::simulator::SimError;
use crate::team::RollError;
use thiserror::Error;

/// Top-level error type for `ccg_core`
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("Game error: {0}")]
    Game(#[from] GameError),
    #[error("Roll error: {0}")]
    Roll(#[from] RollError),
    #[error("Conference error: {0}")]
    Conference(#[from] ConferenceError),
    #[error("Season error: {0}")]
    Season(#[from] SeasonError),
    #[error("Tiebreak error: {0}")]
    Tie(#[from] TieError),
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("Outcome error: {0}")]
    Outcome(#[from] OutcomeError),
    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),
}
