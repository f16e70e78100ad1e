use super::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Track scene description: the bodies to materialize, the checkpoint ring and the race manager.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackScene {
    #[serde(default = "default_track_name")]
    pub name: String,
    #[serde(default)]
    pub race_manager: Option<RaceManagerSpec>,
    #[serde(default)]
    pub bodies: Vec<BodySpec>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaceManagerSpec {
    /// Overrides `race.toml::race.countdown_seconds` for this track.
    pub countdown_seconds: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodySpec {
    pub name: String,
    pub mesh: String,
    #[serde(default = "default_mass")]
    pub mass: f32,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation_degrees: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default)]
    pub driver: bool,
    #[serde(default)]
    pub race_player: Option<RacePlayerSpec>,
    #[serde(default)]
    pub wheel_visuals: bool,
    #[serde(default = "default_color")]
    pub color: [f32; 3],
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RacePlayerSpec {
    pub max_laps: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSpec {
    pub index: usize,
    pub position: [f32; 3],
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default)]
    pub is_finish_line: bool,
}

fn default_track_name() -> String {
    "unnamed".to_string()
}

fn default_mass() -> f32 {
    1.0
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_color() -> [f32; 3] {
    [0.7, 0.7, 0.72]
}

impl TrackScene {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, body) in self.bodies.iter().enumerate() {
            if body.mesh.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "track `{}`::bodies[{index}] (`{}`) has an empty mesh name",
                    self.name, body.name
                )));
            }
            if !body.mass.is_finite() || body.mass < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "track `{}`::bodies[{index}].mass must be a finite value >= 0",
                    self.name
                )));
            }
            if body.scale.iter().any(|axis| !axis.is_finite() || *axis <= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "track `{}`::bodies[{index}].scale components must be > 0",
                    self.name
                )));
            }
            if body.driver && body.mass == 0.0 {
                return Err(ConfigError::Validation(format!(
                    "track `{}`::bodies[{index}] is driver-controlled but static (mass 0)",
                    self.name
                )));
            }
            if let Some(player) = &body.race_player {
                if player.max_laps == Some(0) {
                    return Err(ConfigError::Validation(format!(
                        "track `{}`::bodies[{index}].race_player.max_laps must be > 0",
                        self.name
                    )));
                }
            }
        }

        self.validate_checkpoints()
    }

    fn validate_checkpoints(&self) -> Result<(), ConfigError> {
        if self.checkpoints.is_empty() {
            return Ok(());
        }

        let count = self.checkpoints.len();
        let mut seen = vec![false; count];
        for checkpoint in &self.checkpoints {
            if checkpoint.index >= count {
                return Err(ConfigError::Validation(format!(
                    "track `{}`::checkpoints index {} is outside 0..{count}",
                    self.name, checkpoint.index
                )));
            }
            if seen[checkpoint.index] {
                return Err(ConfigError::Validation(format!(
                    "track `{}`::checkpoints contains duplicate index {}",
                    self.name, checkpoint.index
                )));
            }
            seen[checkpoint.index] = true;

            if let Some(radius) = checkpoint.radius {
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(ConfigError::Validation(format!(
                        "track `{}`::checkpoints[{}].radius must be > 0",
                        self.name, checkpoint.index
                    )));
                }
            }
        }

        let finish_lines: Vec<usize> = self
            .checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.is_finish_line)
            .map(|checkpoint| checkpoint.index)
            .collect();
        match finish_lines.as_slice() {
            [0] => Ok(()),
            [] => Err(ConfigError::Validation(format!(
                "track `{}`::checkpoints has no finish line",
                self.name
            ))),
            [other] => Err(ConfigError::Validation(format!(
                "track `{}`::checkpoints finish line must be index 0, found {other}",
                self.name
            ))),
            _ => Err(ConfigError::Validation(format!(
                "track `{}`::checkpoints has {} finish lines; exactly one is allowed",
                self.name,
                finish_lines.len()
            ))),
        }
    }

    pub fn has_race_players(&self) -> bool {
        self.bodies.iter().any(|body| body.race_player.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TrackScene {
        serde_json::from_str(json).expect("track json should parse")
    }

    #[test]
    fn body_fields_default_when_omitted() {
        let track = parse(r#"{ "bodies": [ { "name": "crate", "mesh": "box" } ] }"#);
        let body = &track.bodies[0];

        assert_eq!(track.name, "unnamed");
        assert!((body.mass - 1.0).abs() < f32::EPSILON);
        assert_eq!(body.scale, [1.0, 1.0, 1.0]);
        assert_eq!(body.rotation_degrees, [0.0, 0.0, 0.0]);
        assert!(!body.driver);
        assert!(body.race_player.is_none());
        assert!(track.validate().is_ok());
    }

    #[test]
    fn checkpoint_indices_must_be_dense() {
        let track = parse(
            r#"{ "checkpoints": [
                { "index": 0, "position": [0, 0, 0], "is_finish_line": true },
                { "index": 2, "position": [5, 0, 0] }
            ] }"#,
        );

        let error = track.validate().expect_err("gap in indices should fail");
        assert!(error.to_string().contains("outside 0..2"));
    }

    #[test]
    fn exactly_one_finish_line_at_index_zero() {
        let none = parse(
            r#"{ "checkpoints": [
                { "index": 0, "position": [0, 0, 0] },
                { "index": 1, "position": [5, 0, 0] }
            ] }"#,
        );
        assert!(none
            .validate()
            .expect_err("missing finish line should fail")
            .to_string()
            .contains("no finish line"));

        let two = parse(
            r#"{ "checkpoints": [
                { "index": 0, "position": [0, 0, 0], "is_finish_line": true },
                { "index": 1, "position": [5, 0, 0], "is_finish_line": true }
            ] }"#,
        );
        assert!(two
            .validate()
            .expect_err("two finish lines should fail")
            .to_string()
            .contains("exactly one"));

        let misplaced = parse(
            r#"{ "checkpoints": [
                { "index": 0, "position": [0, 0, 0] },
                { "index": 1, "position": [5, 0, 0], "is_finish_line": true }
            ] }"#,
        );
        assert!(misplaced.validate().is_err());
    }

    #[test]
    fn static_driver_bodies_are_rejected() {
        let track = parse(
            r#"{ "bodies": [ { "name": "car", "mesh": "car", "mass": 0.0, "driver": true } ] }"#,
        );

        assert!(track.validate().is_err());
    }
}
