use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

pub type EventId = u32;

/// A movement route attached to a map event. Routes may delegate movement
/// to another event by id, which is how reference chains (and cycles) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRoute {
    pub target_event: Option<EventId>,
    pub repeat: bool,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEvent {
    pub id: EventId,
    pub name: String,
    pub route: Option<MoveRoute>,
}

/// The serializable game snapshot a save slot persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub map_id: u32,
    pub map_display_name: String,
    pub party: Vec<String>,
    pub playtime_seconds: u64,
    pub events: Vec<MapEvent>,
}

#[derive(Debug, Error)]
pub enum SaveError {
    /// A movement-route chain loops back on itself. Serializing such a
    /// state would produce a corrupt payload, so the save fails wholesale.
    #[error("save payload contains a movement-route cycle through event {event_id}")]
    SerializationCycle { event_id: EventId },
    #[error("failed to encode save payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Encodes the state for persistence, rejecting route reference cycles
/// before any bytes are produced.
pub fn serialize_state(state: &GameState) -> Result<Vec<u8>, SaveError> {
    if let Some(event_id) = find_route_cycle(state) {
        return Err(SaveError::SerializationCycle { event_id });
    }
    Ok(serde_json::to_vec(state)?)
}

pub fn deserialize_state(bytes: &[u8]) -> Result<GameState, SaveError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Follows every event's route-delegation chain; returns the first event
/// at which a chain revisits itself. A route pointing at its own event is
/// the smallest such cycle.
fn find_route_cycle(state: &GameState) -> Option<EventId> {
    let targets: HashMap<EventId, Option<EventId>> = state
        .events
        .iter()
        .map(|event| {
            (
                event.id,
                event.route.as_ref().and_then(|route| route.target_event),
            )
        })
        .collect();

    for event in &state.events {
        let mut visited = vec![event.id];
        let mut cursor = event.route.as_ref().and_then(|route| route.target_event);
        while let Some(next) = cursor {
            if visited.contains(&next) {
                return Some(next);
            }
            visited.push(next);
            cursor = targets.get(&next).copied().flatten();
        }
    }
    None
}

/// `H:MM:SS` playtime string for slot metadata.
pub fn format_playtime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours}:{minutes:02}:{secs:02}")
}
