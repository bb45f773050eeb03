//! Server configuration.

use serde::{Deserialize, Serialize};
use tracing::info;
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub orb: OrbConfig,
    #[serde(default)]
    pub virus: VirusConfig,
    #[serde(default)]
    pub eject: EjectConfig,
    #[serde(default)]
    pub penalty: PenaltyConfig,
    #[serde(default)]
    pub room: RoomConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

/// Server networking and scheduling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Wall-clock frame interval in milliseconds. Simulation itself always
    /// advances in fixed 1/50 s steps.
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            frame_interval_ms: default_frame_interval(),
        }
    }
}

fn default_port() -> u16 {
    11443
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    100
}
fn default_frame_interval() -> u64 {
    16
}

/// Map bounds. Coordinates run from 0 to width/height.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    #[serde(default = "default_map_size")]
    pub width: f32,
    #[serde(default = "default_map_size")]
    pub height: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_map_size(),
            height: default_map_size(),
        }
    }
}

fn default_map_size() -> f32 {
    3000.0
}

/// Player blob configuration. Masses are areas: radius = sqrt(mass / PI).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_start_mass")]
    pub start_mass: f32,
    /// Decay never takes a blob below this.
    #[serde(default = "default_player_min_mass")]
    pub min_mass: f32,
    /// MAXIMUM_MASS_LIMIT.
    #[serde(default = "default_player_max_mass")]
    pub max_mass: f32,
    #[serde(default = "default_player_min_split")]
    pub min_split_mass: f32,
    #[serde(default = "default_player_min_eject")]
    pub min_eject_mass: f32,
    #[serde(default = "default_player_max_blobs")]
    pub max_blobs: usize,
    #[serde(default = "default_player_min_speed")]
    pub min_speed: f32,
    #[serde(default = "default_player_max_speed")]
    pub max_speed: f32,
    /// Seek speed per unit of distance to the target, before clamping.
    #[serde(default = "default_player_speed_scale")]
    pub speed_scale: f32,
    /// Blobs above this radius move slower by sqrt(radius / base_radius).
    #[serde(default = "default_player_base_radius")]
    pub base_radius: f32,
    /// Fraction of mass lost per second at multiplier 1.
    #[serde(default = "default_player_decay_rate")]
    pub decay_rate: f32,
    #[serde(default = "default_player_merge_base")]
    pub merge_base_secs: f32,
    #[serde(default = "default_player_merge_per_mass")]
    pub merge_secs_per_mass: f32,
    #[serde(default = "default_player_split_speed")]
    pub split_speed: f32,
    #[serde(default = "default_player_split_friction")]
    pub split_friction: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            start_mass: default_player_start_mass(),
            min_mass: default_player_min_mass(),
            max_mass: default_player_max_mass(),
            min_split_mass: default_player_min_split(),
            min_eject_mass: default_player_min_eject(),
            max_blobs: default_player_max_blobs(),
            min_speed: default_player_min_speed(),
            max_speed: default_player_max_speed(),
            speed_scale: default_player_speed_scale(),
            base_radius: default_player_base_radius(),
            decay_rate: default_player_decay_rate(),
            merge_base_secs: default_player_merge_base(),
            merge_secs_per_mass: default_player_merge_per_mass(),
            split_speed: default_player_split_speed(),
            split_friction: default_player_split_friction(),
        }
    }
}

fn default_player_start_mass() -> f32 {
    400.0
}
fn default_player_min_mass() -> f32 {
    100.0
}
fn default_player_max_mass() -> f32 {
    50_000.0
}
fn default_player_min_split() -> f32 {
    700.0
}
fn default_player_min_eject() -> f32 {
    500.0
}
fn default_player_max_blobs() -> usize {
    16
}
fn default_player_min_speed() -> f32 {
    40.0
}
fn default_player_max_speed() -> f32 {
    260.0
}
fn default_player_speed_scale() -> f32 {
    4.0
}
fn default_player_base_radius() -> f32 {
    12.0
}
fn default_player_decay_rate() -> f32 {
    0.002
}
fn default_player_merge_base() -> f32 {
    10.0
}
fn default_player_merge_per_mass() -> f32 {
    0.005
}
fn default_player_split_speed() -> f32 {
    600.0
}
fn default_player_split_friction() -> f32 {
    4.0
}

/// Orb (food) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrbConfig {
    /// Orb count cap per room.
    #[serde(default = "default_orb_max_count")]
    pub max_count: usize,
    #[serde(default = "default_orb_mass")]
    pub mass: f32,
    /// Growth cap in non-default rooms.
    #[serde(default = "default_orb_max_mass")]
    pub max_mass: f32,
    #[serde(default = "default_orb_growth_step")]
    pub growth_step: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            max_count: default_orb_max_count(),
            mass: default_orb_mass(),
            max_mass: default_orb_max_mass(),
            growth_step: default_orb_growth_step(),
        }
    }
}

fn default_orb_max_count() -> usize {
    600
}
fn default_orb_mass() -> f32 {
    20.0
}
fn default_orb_max_mass() -> f32 {
    60.0
}
fn default_orb_growth_step() -> f32 {
    2.0
}

/// Virus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirusConfig {
    /// Virus count cap per room.
    #[serde(default = "default_virus_max_count")]
    pub max_count: usize,
    #[serde(default = "default_virus_base_mass")]
    pub base_mass: f32,
    /// VIRUS_EAT_MIN_MASS: smaller blobs pass over viruses untouched.
    #[serde(default = "default_virus_eat_min_mass")]
    pub eat_min_mass: f32,
    /// Ejects absorbed before the virus clones itself.
    #[serde(default = "default_virus_max_feed")]
    pub max_feed: u32,
    #[serde(default = "default_virus_shoot_speed")]
    pub shoot_speed: f32,
    #[serde(default = "default_virus_friction")]
    pub friction: f32,
    /// Upper bound on pieces a blob explodes into.
    #[serde(default = "default_virus_explode_pieces")]
    pub explode_pieces: usize,
}

impl Default for VirusConfig {
    fn default() -> Self {
        Self {
            max_count: default_virus_max_count(),
            base_mass: default_virus_base_mass(),
            eat_min_mass: default_virus_eat_min_mass(),
            max_feed: default_virus_max_feed(),
            shoot_speed: default_virus_shoot_speed(),
            friction: default_virus_friction(),
            explode_pieces: default_virus_explode_pieces(),
        }
    }
}

fn default_virus_max_count() -> usize {
    20
}
fn default_virus_base_mass() -> f32 {
    1600.0
}
fn default_virus_eat_min_mass() -> f32 {
    2400.0
}
fn default_virus_max_feed() -> u32 {
    7
}
fn default_virus_shoot_speed() -> f32 {
    700.0
}
fn default_virus_friction() -> f32 {
    2.0
}
fn default_virus_explode_pieces() -> usize {
    8
}

/// Ejected mass configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EjectConfig {
    /// Mass of the spawned projectile.
    #[serde(default = "default_eject_mass")]
    pub mass: f32,
    /// Mass removed from the source blob.
    #[serde(default = "default_eject_mass_cost")]
    pub mass_cost: f32,
    #[serde(default = "default_eject_speed")]
    pub speed: f32,
    #[serde(default = "default_eject_friction")]
    pub friction: f32,
    /// The ejecting player cannot collect its own eject before this age.
    #[serde(default = "default_eject_owner_immunity")]
    pub owner_immunity_secs: f32,
}

impl Default for EjectConfig {
    fn default() -> Self {
        Self {
            mass: default_eject_mass(),
            mass_cost: default_eject_mass_cost(),
            speed: default_eject_speed(),
            friction: default_eject_friction(),
            owner_immunity_secs: default_eject_owner_immunity(),
        }
    }
}

fn default_eject_mass() -> f32 {
    40.0
}
fn default_eject_mass_cost() -> f32 {
    60.0
}
fn default_eject_speed() -> f32 {
    500.0
}
fn default_eject_friction() -> f32 {
    3.0
}
fn default_eject_owner_immunity() -> f32 {
    1.0
}

/// Virus-eat penalty configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PenaltyConfig {
    #[serde(default = "default_penalty_window")]
    pub window_secs: u64,
    /// Eats inside the window at which decay starts to accelerate.
    #[serde(default = "default_penalty_threshold")]
    pub threshold: usize,
    /// Multiplier added per eat at or above the threshold.
    #[serde(default = "default_penalty_step")]
    pub step: f32,
    #[serde(default = "default_penalty_max_multiplier")]
    pub max_multiplier: f32,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            window_secs: default_penalty_window(),
            threshold: default_penalty_threshold(),
            step: default_penalty_step(),
            max_multiplier: default_penalty_max_multiplier(),
        }
    }
}

fn default_penalty_window() -> u64 {
    60
}
fn default_penalty_threshold() -> usize {
    3
}
fn default_penalty_step() -> f32 {
    1.0
}
fn default_penalty_max_multiplier() -> f32 {
    6.0
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomConfig {
    /// Duration of a created room when the host does not pick one.
    #[serde(default = "default_room_duration")]
    pub default_duration_secs: u64,
    /// Orb growth timer period for non-default rooms.
    #[serde(default = "default_orb_growth_interval")]
    pub orb_growth_interval_ms: u64,
    /// Name of the always-available public room.
    #[serde(default = "default_room_name")]
    pub default_room_name: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_room_duration(),
            orb_growth_interval_ms: default_orb_growth_interval(),
            default_room_name: default_room_name(),
        }
    }
}

fn default_room_duration() -> u64 {
    300
}
fn default_orb_growth_interval() -> u64 {
    1000
}
fn default_room_name() -> String {
    "Lobby".to_string()
}
