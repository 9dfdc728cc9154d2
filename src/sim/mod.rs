//! Simulator interface consumed by the scenario helpers.
//!
//! The simulator owns physics, rendering and actor lifecycles. This crate only
//! sequences calls against it, so the surface is expressed as traits that a
//! client binding implements.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod scenario;

pub use scenario::{
    apply_settings, camera_descriptors, cleanup, connect_to_server, is_car_blueprint, load_map,
    setting_traffic_manager, spawn_ego_vehicle, spawn_npc_pedestrians, spawn_npc_vehicles,
    CleanupReport, ScenarioActors, WALKER_CONTROLLER_BLUEPRINT,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

impl Transform {
    pub fn at(location: Location) -> Self {
        Self {
            location,
            rotation: Rotation::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
}

impl Blueprint {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub synchronous_mode: bool,
    /// `None` lets the simulator pick a variable step.
    pub fixed_delta_seconds: Option<f64>,
}

/// A simulated entity: vehicle, walker, sensor or AI controller.
///
/// Not every operation is meaningful for every kind; bindings reject the ones
/// the simulator would reject.
pub trait Actor {
    fn id(&self) -> u32;

    /// `role_name` attribute, set on cameras to name their output directory.
    fn role_name(&self) -> Option<String>;

    fn set_autopilot(&mut self, enabled: bool, tm_port: Option<u16>) -> Result<()>;

    /// Start a walker AI controller.
    fn start(&mut self) -> Result<()>;

    fn go_to_location(&mut self, location: Location) -> Result<()>;

    fn set_max_speed(&mut self, speed: f64) -> Result<()>;

    /// Stop a sensor stream or walker controller.
    fn stop(&mut self) -> Result<()>;

    fn destroy(&mut self) -> Result<()>;
}

pub trait SimWorld {
    type Actor: Actor;

    /// Blueprints whose id matches a wildcard pattern such as `vehicle.*`.
    fn blueprints(&self, pattern: &str) -> Vec<Blueprint>;

    fn find_blueprint(&self, id: &str) -> Option<Blueprint>;

    /// Spawn, or `None` when the simulator refuses (e.g. collision at the
    /// spawn point).
    fn try_spawn_actor(
        &mut self,
        blueprint: &Blueprint,
        transform: &Transform,
        attach_to: Option<&Self::Actor>,
    ) -> Option<Self::Actor>;

    fn random_location_from_navigation(&mut self) -> Option<Location>;

    fn settings(&self) -> Result<WorldSettings>;

    fn apply_settings(&mut self, settings: &WorldSettings) -> Result<()>;
}

pub trait TrafficManager {
    fn set_synchronous_mode(&mut self, enabled: bool) -> Result<()>;

    fn port(&self) -> u16;
}

pub trait SimClient {
    type World: SimWorld;
    type TrafficManager: TrafficManager;

    fn available_maps(&self) -> Result<Vec<String>>;

    fn load_world(&mut self, map: &str) -> Result<Self::World>;

    fn traffic_manager(&mut self) -> Result<Self::TrafficManager>;
}

/// Opens client sessions.
pub trait SimConnector {
    type Client: SimClient;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<Self::Client>;
}
