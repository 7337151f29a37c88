//! CSV export of recorded cycle events.
//!
//! One row per event (see `EventRow`); the parent directory is created on demand.

use std::{fs::create_dir_all, path::Path};

use log::info;

use crate::error::Result;
use crate::utils::metrics::CycleEvent;

/// Writes `events` to `path`, replacing any existing file. Returns the row count.
pub fn export_events_csv(path: impl AsRef<Path>, events: &[CycleEvent]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for event in events {
        writer.serialize(event.to_row())?;
    }
    writer.flush()?;

    info!("Exported {} cycle events to {:?}", events.len(), path);
    Ok(events.len())
}
