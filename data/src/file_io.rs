//! Snapshot file helpers.
use crate::snapshot::{parse_season, serialize_season, SnapshotParseError};
use ccg_core::game::WinProbabilityProvider;
use ccg_core::season::SeasonSnapshot;
use log::debug;
use std::path::Path;

/// Load a snapshot from a text file.
///
/// # Errors
///
/// I/O and parse errors, see [`SnapshotParseError`].
pub fn load_season(
    path: &Path,
    provider: Option<&dyn WinProbabilityProvider>,
) -> Result<SeasonSnapshot, SnapshotParseError> {
    let text = std::fs::read_to_string(path)?;
    let season = parse_season(&text, provider)?;
    debug!(
        "loaded {}: {} conferences, {} games",
        path.display(),
        season.conferences().len(),
        season.games().len()
    );
    Ok(season)
}

/// Write a snapshot to a text file.
///
/// # Errors
///
/// I/O errors only.
pub fn save_season(path: &Path, season: &SeasonSnapshot) -> Result<(), SnapshotParseError> {
    std::fs::write(path, serialize_season(season))?;
    Ok(())
}
