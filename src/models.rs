//! Records exchanged with the simulation.
//!
//! These structs match the shapes the simulation-side services return. Each
//! carries a serde derive for `invoke_as` and a matching [`Schema`] for
//! schema-driven decoding.

use serde::{Deserialize, Serialize};

use crate::schema::{FieldKind, Schema};

/// A position or direction in simulation space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn schema() -> Schema {
        Schema::new("Vector3")
            .field("x", FieldKind::Float)
            .field("y", FieldKind::Float)
            .field("z", FieldKind::Float)
    }
}

/// Ray-cast perception grid: per-ray hit distance and hit object type.
///
/// An object type of `-1` means the ray hit nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RayResults {
    #[serde(rename = "rayDistances")]
    pub ray_distances: Vec<Vec<f64>>,
    #[serde(rename = "rayHitObjectTypes")]
    pub ray_hit_object_types: Vec<Vec<i64>>,
    #[serde(rename = "NumObjectTypes")]
    pub num_object_types: i64,
}

impl RayResults {
    pub fn schema() -> Schema {
        Schema::new("RayResults")
            .field(
                "rayDistances",
                FieldKind::sequence_of(FieldKind::sequence_of(FieldKind::Float)),
            )
            .field(
                "rayHitObjectTypes",
                FieldKind::sequence_of(FieldKind::sequence_of(FieldKind::Int)),
            )
            .field("NumObjectTypes", FieldKind::Int)
    }
}

/// What one agent perceives after a step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerObservation {
    #[serde(rename = "IAmAlive")]
    pub i_am_alive: bool,
    #[serde(rename = "IHaveAKey")]
    pub i_have_a_key: bool,
    #[serde(rename = "rayResults")]
    pub ray_results: RayResults,
}

impl PlayerObservation {
    pub fn schema() -> Schema {
        Schema::new("PlayerObservation")
            .field("IAmAlive", FieldKind::Bool)
            .field("IHaveAKey", FieldKind::Bool)
            .field("rayResults", FieldKind::Record(RayResults::schema()))
    }
}

/// Result of `reset` and `rlStep`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RlResult {
    pub reward: f64,
    #[serde(rename = "episodeFinished")]
    pub episode_finished: bool,
    #[serde(rename = "playerObservations")]
    pub player_observations: Vec<PlayerObservation>,
}

impl RlResult {
    pub fn schema() -> Schema {
        Schema::new("RlResult")
            .field("reward", FieldKind::Float)
            .field("episodeFinished", FieldKind::Bool)
            .field(
                "playerObservations",
                FieldKind::sequence_of(FieldKind::Record(PlayerObservation::schema())),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, FieldValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rl_payload() -> serde_json::Value {
        json!({
            "reward": 0.5,
            "episodeFinished": false,
            "playerObservations": [{
                "IAmAlive": true,
                "IHaveAKey": false,
                "rayResults": {
                    "rayDistances": [[0.1, 0.25], [0.4, -1]],
                    "rayHitObjectTypes": [[0, 2], [1, -1]],
                    "NumObjectTypes": 3
                }
            }]
        })
    }

    #[test]
    fn test_schema_and_serde_agree() {
        let payload = rl_payload();

        let typed: RlResult = serde_json::from_value(payload.clone()).unwrap();
        let record = decode(&payload, &RlResult::schema()).unwrap();

        assert_eq!(record.float("reward"), Some(typed.reward));
        assert_eq!(record.bool("episodeFinished"), Some(typed.episode_finished));

        let observations = record
            .get("playerObservations")
            .and_then(FieldValue::as_sequence)
            .unwrap();
        assert_eq!(observations.len(), typed.player_observations.len());

        let rays = observations[0]
            .as_record()
            .and_then(|o| o.record("rayResults"))
            .unwrap();
        assert_eq!(rays.int("NumObjectTypes"), Some(3));

        // Serializing the typed value yields a payload the schema still accepts
        let reencoded = serde_json::to_value(&typed).unwrap();
        assert_eq!(decode(&reencoded, &RlResult::schema()).unwrap(), record);
    }

    #[test]
    fn test_vector3_schema_matches_fields() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let record = decode(&serde_json::to_value(v).unwrap(), &Vector3::schema()).unwrap();
        assert_eq!(record.float("z"), Some(3.0));
    }
}
