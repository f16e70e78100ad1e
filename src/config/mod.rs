mod track;

pub use track::{BodySpec, CheckpointSpec, RaceManagerSpec, RacePlayerSpec, TrackScene};

use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_game_config)
            .add_systems(Update, reload_game_config_hotkey);
    }
}

fn load_game_config(
    mut commands: Commands,
    mut window_query: Query<&mut Window, With<PrimaryWindow>>,
) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    if let Ok(mut window) = window_query.single_mut() {
        window.title = config.game.app.window_title.clone();
    }

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

fn reload_game_config_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    game_config: Option<ResMut<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    let Some(mut current_config) = game_config else {
        warn!("Config hot-reload requested, but `GameConfig` resource is not initialized yet.");
        return;
    };

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *current_config = new_config;
            log_config_summary("Hot-reloaded", &current_config);
        }
        Err(error) => {
            error!("Config hot-reload failed; keeping previous config: {error}");
        }
    }
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} vehicles (active `{}`), track `{}` with {} bodies and {} checkpoints.",
        config.vehicles_by_id.len(),
        config.game.app.default_vehicle,
        config.track.name,
        config.track.bodies.len(),
        config.track.checkpoints.len()
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub vehicles: VehiclesFile,
    pub race: RaceFile,
    pub track: TrackScene,
    pub vehicles_by_id: HashMap<String, VehicleConfig>,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml_or_default(&config_dir.join("game.toml"))?;
        let vehicles: VehiclesFile = read_toml_or_default(&config_dir.join("vehicles.toml"))?;
        let race: RaceFile = read_toml_or_default(&config_dir.join("race.toml"))?;
        let track = TrackScene::load(Path::new(&game.app.track_path))?;

        let config = Self::from_parts(game, vehicles, race, track)?;
        Ok(config)
    }

    pub fn from_parts(
        game: GameFile,
        vehicles: VehiclesFile,
        race: RaceFile,
        track: TrackScene,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            vehicles_by_id: to_index("vehicles.toml::vehicles", &vehicles.vehicles)?,
            game,
            vehicles,
            race,
            track,
        };

        config.validate()?;
        Ok(config)
    }

    /// Tuning used by every driver-controlled body.
    pub fn active_vehicle(&self) -> Option<&VehicleConfig> {
        self.vehicles_by_id.get(&self.game.app.default_vehicle)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self
            .vehicles_by_id
            .contains_key(&self.game.app.default_vehicle)
        {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_vehicle references unknown vehicle id `{}`",
                self.game.app.default_vehicle
            )));
        }

        let physics = &self.game.physics;
        if !physics.gravity.is_finite() || physics.gravity < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::physics.gravity must be a finite value >= 0".to_string(),
            ));
        }

        for (index, vehicle) in self.vehicles.vehicles.iter().enumerate() {
            vehicle.validate(index)?;
        }

        let race = &self.race.race;
        if !race.countdown_seconds.is_finite() || race.countdown_seconds < 0.0 {
            return Err(ConfigError::Validation(
                "race.toml::race.countdown_seconds must be a finite value >= 0".to_string(),
            ));
        }
        if race.default_max_laps == 0 {
            return Err(ConfigError::Validation(
                "race.toml::race.default_max_laps must be > 0".to_string(),
            ));
        }
        if !race.default_checkpoint_radius.is_finite() || race.default_checkpoint_radius <= 0.0 {
            return Err(ConfigError::Validation(
                "race.toml::race.default_checkpoint_radius must be > 0".to_string(),
            ));
        }
        if !race.auto_start_delay_seconds.is_finite() || race.auto_start_delay_seconds < 0.0 {
            return Err(ConfigError::Validation(
                "race.toml::race.auto_start_delay_seconds must be a finite value >= 0".to_string(),
            ));
        }
        if !race.lap_guard_seconds.is_finite() || race.lap_guard_seconds < 0.0 {
            return Err(ConfigError::Validation(
                "race.toml::race.lap_guard_seconds must be a finite value >= 0".to_string(),
            ));
        }

        self.track.validate()?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "failed to parse track scene `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        info!("`{}` not found; using built-in defaults.", path.display());
        return Ok(T::default());
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GameFile {
    pub app: AppConfig,
    pub physics: PhysicsConfig,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window_title: String,
    pub track_path: String,
    pub asset_root: String,
    pub default_vehicle: String,
    pub debug_overlay: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_title: "Checkpoint Racer".to_string(),
            track_path: "assets/tracks/oval.json".to_string(),
            asset_root: "assets".to_string(),
            default_vehicle: "roadster".to_string(),
            debug_overlay: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// World gravity magnitude, applied once along -Y. Never changed per vehicle.
    pub gravity: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self { gravity: 9.81 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub follow_distance_m: f32,
    pub follow_height_m: f32,
    pub follow_stiffness: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            follow_distance_m: 11.0,
            follow_height_m: 4.5,
            follow_stiffness: 6.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehiclesFile {
    pub vehicles: Vec<VehicleConfig>,
}

impl Default for VehiclesFile {
    fn default() -> Self {
        Self {
            vehicles: vec![VehicleConfig::default()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub id: String,
    pub suspension_stiffness: f32,
    pub suspension_compression: f32,
    pub suspension_damping: f32,
    pub suspension_rest_length_m: f32,
    pub max_suspension_travel_m: f32,
    pub max_suspension_force_n: f32,
    pub friction_slip: f32,
    pub roll_influence: f32,
    pub wheel_radius_m: f32,
    pub wheel_width_m: f32,
    pub wheel_inset_x_m: f32,
    pub wheel_connection_height_m: f32,
    pub wheel_offset_z_m: f32,
    pub chassis_friction: f32,
    pub chassis_linear_damping: f32,
    pub chassis_angular_damping: f32,
    pub max_speed_mps: f32,
    pub max_engine_force_n: f32,
    pub max_reverse_force_n: f32,
    pub engine_force_increment_n: f32,
    pub max_brake_force_n: f32,
    pub default_brake_force_n: f32,
    pub airborne_gravity_scale: f32,
    pub air_control_force_n: f32,
    pub steering_increment: f32,
    pub steering_return_factor: f32,
    pub steering_max_angle_low_speed: f32,
    pub steering_max_angle_high_speed: f32,
    pub steering_speed_threshold_mps: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            id: "roadster".to_string(),
            suspension_stiffness: 20.0,
            suspension_compression: 4.4,
            suspension_damping: 2.3,
            suspension_rest_length_m: 0.6,
            max_suspension_travel_m: 0.3,
            max_suspension_force_n: 6_000.0,
            friction_slip: 1.2,
            roll_influence: 0.1,
            wheel_radius_m: 0.5,
            wheel_width_m: 0.4,
            wheel_inset_x_m: 0.15,
            wheel_connection_height_m: 0.2,
            wheel_offset_z_m: 0.0,
            chassis_friction: 0.8,
            chassis_linear_damping: 0.1,
            chassis_angular_damping: 0.5,
            max_speed_mps: 40.0,
            max_engine_force_n: 1_500.0,
            max_reverse_force_n: 700.0,
            engine_force_increment_n: 75.0,
            max_brake_force_n: 2_000.0,
            default_brake_force_n: 150.0,
            airborne_gravity_scale: 0.6,
            air_control_force_n: 400.0,
            steering_increment: 0.04,
            steering_return_factor: 0.9,
            steering_max_angle_low_speed: 0.4,
            steering_max_angle_high_speed: 0.07,
            steering_speed_threshold_mps: 10.0,
        }
    }
}

impl VehicleConfig {
    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let positive = [
            ("suspension_stiffness", self.suspension_stiffness),
            ("suspension_rest_length_m", self.suspension_rest_length_m),
            ("max_suspension_force_n", self.max_suspension_force_n),
            ("friction_slip", self.friction_slip),
            ("wheel_radius_m", self.wheel_radius_m),
            ("wheel_width_m", self.wheel_width_m),
            ("max_speed_mps", self.max_speed_mps),
            ("max_engine_force_n", self.max_engine_force_n),
            ("engine_force_increment_n", self.engine_force_increment_n),
            ("steering_increment", self.steering_increment),
            ("steering_speed_threshold_mps", self.steering_speed_threshold_mps),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].{field} must be > 0"
                )));
            }
        }

        let non_negative = [
            ("suspension_compression", self.suspension_compression),
            ("suspension_damping", self.suspension_damping),
            ("max_suspension_travel_m", self.max_suspension_travel_m),
            ("roll_influence", self.roll_influence),
            ("chassis_friction", self.chassis_friction),
            ("chassis_linear_damping", self.chassis_linear_damping),
            ("chassis_angular_damping", self.chassis_angular_damping),
            ("max_reverse_force_n", self.max_reverse_force_n),
            ("max_brake_force_n", self.max_brake_force_n),
            ("default_brake_force_n", self.default_brake_force_n),
            ("airborne_gravity_scale", self.airborne_gravity_scale),
            ("air_control_force_n", self.air_control_force_n),
            ("steering_max_angle_low_speed", self.steering_max_angle_low_speed),
            ("steering_max_angle_high_speed", self.steering_max_angle_high_speed),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].{field} must be a finite value >= 0"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.steering_return_factor) {
            return Err(ConfigError::Validation(format!(
                "vehicles.toml::vehicles[{index}].steering_return_factor must be within [0, 1]"
            )));
        }
        if self.steering_max_angle_high_speed > self.steering_max_angle_low_speed {
            return Err(ConfigError::Validation(format!(
                "vehicles.toml::vehicles[{index}] steering_max_angle_high_speed must not exceed steering_max_angle_low_speed"
            )));
        }
        if self.roll_influence > 1.0 {
            return Err(ConfigError::Validation(format!(
                "vehicles.toml::vehicles[{index}].roll_influence must be within [0, 1]"
            )));
        }

        Ok(())
    }
}

impl HasId for VehicleConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaceFile {
    pub race: RaceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub countdown_seconds: f32,
    pub default_max_laps: u32,
    pub default_checkpoint_radius: f32,
    pub auto_start_delay_seconds: f32,
    /// Minimum race time before a finish-line crossing counts as a lap.
    pub lap_guard_seconds: f32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 3.0,
            default_max_laps: 3,
            default_checkpoint_radius: 5.0,
            auto_start_delay_seconds: 2.0,
            lap_guard_seconds: 1.0,
        }
    }
}
