use anyhow::{anyhow, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{
    Actor, Blueprint, SimClient, SimConnector, SimWorld, TrafficManager, Transform, WorldSettings,
};
use crate::capture::CameraDescriptor;
use crate::config::SimulationSettings;

pub const WALKER_CONTROLLER_BLUEPRINT: &str = "controller.ai.walker";
const VEHICLE_PATTERN: &str = "vehicle.*";
const WALKER_PATTERN: &str = "walker.pedestrian.*";
const TWO_WHEELER_MARKERS: [&str; 4] = ["bike", "bicycle", "motorcycle", "vespa"];

pub fn connect_to_server<C: SimConnector>(
    connector: &C,
    settings: &SimulationSettings,
) -> Result<C::Client> {
    let client = connector
        .connect(&settings.host, settings.port, settings.timeout)
        .with_context(|| {
            format!(
                "failed to connect to simulator at {}:{}",
                settings.host, settings.port
            )
        })?;
    log::info!("connected to simulator at {}:{}", settings.host, settings.port);
    Ok(client)
}

pub fn load_map<C: SimClient>(client: &mut C, map: &str) -> Result<C::World> {
    log::debug!("available maps: {:?}", client.available_maps()?);
    let world = client
        .load_world(map)
        .with_context(|| format!("failed to load map {}", map))?;
    log::info!("{} loaded", map);
    Ok(world)
}

pub fn apply_settings<W: SimWorld>(
    world: &mut W,
    synchronous_mode: bool,
    fixed_delta_seconds: f64,
) -> Result<()> {
    let mut settings = world.settings()?;
    settings.synchronous_mode = synchronous_mode;
    settings.fixed_delta_seconds = Some(fixed_delta_seconds);
    world.apply_settings(&settings)?;
    log::info!(
        "world settings applied: synchronous mode: {}, fixed delta seconds: {}",
        synchronous_mode,
        fixed_delta_seconds
    );
    Ok(())
}

pub fn setting_traffic_manager<C: SimClient>(
    client: &mut C,
    synchronous_mode: bool,
) -> Result<(C::TrafficManager, u16)> {
    let mut traffic_manager = client.traffic_manager()?;
    traffic_manager.set_synchronous_mode(synchronous_mode)?;
    let tm_port = traffic_manager.port();
    log::info!(
        "traffic manager settings applied: synchronous mode: {}, port: {}",
        synchronous_mode,
        tm_port
    );
    Ok((traffic_manager, tm_port))
}

/// Four-wheeled vehicles only.
pub fn is_car_blueprint(blueprint: &Blueprint) -> bool {
    !TWO_WHEELER_MARKERS
        .iter()
        .any(|marker| blueprint.id.contains(marker))
}

/// Spawn `floor(spawn_points * car_ratio)` autopiloted cars.
///
/// Spawn point 0 is left free; car `i` goes to point `i + 1`. Points the
/// simulator refuses are skipped, so fewer cars than requested may appear.
pub fn spawn_npc_vehicles<W: SimWorld, R: Rng>(
    world: &mut W,
    tm_port: u16,
    spawn_points: &[Transform],
    car_ratio: f64,
    rng: &mut R,
) -> Vec<W::Actor> {
    let num_vehicles = (spawn_points.len() as f64 * car_ratio) as usize;
    let car_bps: Vec<Blueprint> = world
        .blueprints(VEHICLE_PATTERN)
        .into_iter()
        .filter(is_car_blueprint)
        .collect();
    if car_bps.is_empty() {
        log::warn!("no car blueprints available; skipping NPC vehicles");
        return Vec::new();
    }

    let mut vehicles = Vec::new();
    for transform in spawn_points.iter().skip(1).take(num_vehicles) {
        let Some(vehicle_bp) = car_bps.choose(rng) else {
            break;
        };
        if let Some(mut npc) = world.try_spawn_actor(vehicle_bp, transform, None) {
            if let Err(err) = npc.set_autopilot(true, Some(tm_port)) {
                log::warn!("autopilot failed for vehicle {}: {:#}", npc.id(), err);
            }
            vehicles.push(npc);
        }
    }
    log::info!("spawned {} NPC vehicles", vehicles.len());
    vehicles
}

/// Spawn walkers at random navigable locations, each with a started AI
/// controller heading somewhere random at 1-2 m/s.
pub fn spawn_npc_pedestrians<W: SimWorld, R: Rng>(
    world: &mut W,
    num_walkers: usize,
    rng: &mut R,
) -> (Vec<W::Actor>, Vec<W::Actor>) {
    let mut pedestrians = Vec::new();
    let mut walker_controllers = Vec::new();
    let walker_bps = world.blueprints(WALKER_PATTERN);
    let ctrl_bp = world.find_blueprint(WALKER_CONTROLLER_BLUEPRINT);

    for _ in 0..num_walkers {
        let Some(walker_bp) = walker_bps.choose(rng) else {
            log::warn!("no pedestrian blueprints available");
            break;
        };
        let Some(loc) = world.random_location_from_navigation() else {
            continue;
        };
        let Some(walker) = world.try_spawn_actor(walker_bp, &Transform::at(loc), None) else {
            continue;
        };
        if let Some(ctrl_bp) = &ctrl_bp {
            let ctrl = world.try_spawn_actor(ctrl_bp, &Transform::default(), Some(&walker));
            if let Some(mut ctrl) = ctrl {
                let destination = world.random_location_from_navigation();
                let speed = 1.0 + rng.gen::<f64>();
                let started = ctrl.start().and_then(|_| {
                    if let Some(destination) = destination {
                        ctrl.go_to_location(destination)?;
                    }
                    ctrl.set_max_speed(speed)
                });
                if let Err(err) = started {
                    log::warn!("walker controller {} did not start: {:#}", ctrl.id(), err);
                }
                walker_controllers.push(ctrl);
            }
        }
        pedestrians.push(walker);
    }
    log::info!("spawned {} NPC pedestrians", pedestrians.len());
    (pedestrians, walker_controllers)
}

/// Spawn the ego vehicle at the second-to-last spawn point with autopilot.
pub fn spawn_ego_vehicle<W: SimWorld>(
    world: &mut W,
    blueprint: &Blueprint,
    spawn_points: &[Transform],
) -> Option<W::Actor> {
    let spawn_point = spawn_points.len().checked_sub(2).map(|i| &spawn_points[i]);
    let ego_vehicle = spawn_point.and_then(|point| world.try_spawn_actor(blueprint, point, None));
    match ego_vehicle {
        Some(mut ego) => {
            if let Err(err) = ego.set_autopilot(true, None) {
                log::warn!("autopilot failed for ego vehicle: {:#}", err);
            }
            log::info!("ego vehicle spawned");
            Some(ego)
        }
        None => {
            log::warn!("failed to spawn ego vehicle");
            None
        }
    }
}

/// Camera descriptors from spawned camera actors, in the same order.
pub fn camera_descriptors<A: Actor>(cameras: &[A]) -> Result<Vec<CameraDescriptor>> {
    cameras
        .iter()
        .map(|camera| {
            let role_name = camera
                .role_name()
                .ok_or_else(|| anyhow!("camera actor {} has no role_name", camera.id()))?;
            CameraDescriptor::new(role_name)
        })
        .collect()
}

/// Everything a capture session spawned.
pub struct ScenarioActors<A> {
    pub cameras: Vec<A>,
    pub depth_cameras: Vec<A>,
    pub vehicles: Vec<A>,
    pub pedestrians: Vec<A>,
    pub walker_controllers: Vec<A>,
    pub ego_vehicle: Option<A>,
}

impl<A> Default for ScenarioActors<A> {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            depth_cameras: Vec::new(),
            vehicles: Vec::new(),
            pedestrians: Vec::new(),
            walker_controllers: Vec::new(),
            ego_vehicle: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub destroyed: usize,
    pub failures: usize,
}

/// Tear down every spawned actor and return the world and traffic manager
/// to asynchronous mode. Individual failures are logged and counted.
pub fn cleanup<C: SimClient>(
    client: &mut C,
    world: &mut C::World,
    actors: ScenarioActors<<C::World as SimWorld>::Actor>,
) -> Result<CleanupReport> {
    log::info!("starting cleanup");
    let mut report = CleanupReport::default();
    let ScenarioActors {
        cameras,
        depth_cameras,
        vehicles,
        pedestrians,
        walker_controllers,
        ego_vehicle,
    } = actors;

    for (label, group) in [("camera", cameras), ("depth camera", depth_cameras)] {
        let count = group.len();
        for mut sensor in group {
            let name = sensor.role_name().unwrap_or_else(|| sensor.id().to_string());
            teardown(&mut sensor, true, &mut report);
            log::debug!("{} {} destroyed", label, name);
        }
        log::info!("destroyed {} {}s", count, label);
    }

    for (label, group, stop_first) in [
        ("NPC vehicle", vehicles, false),
        ("NPC pedestrian", pedestrians, false),
        ("walker controller", walker_controllers, true),
        ("ego vehicle", ego_vehicle.into_iter().collect(), false),
    ] {
        let count = group.len();
        for mut actor in group {
            teardown(&mut actor, stop_first, &mut report);
        }
        log::info!("destroyed {} {}s", count, label);
    }

    world.apply_settings(&WorldSettings {
        synchronous_mode: false,
        fixed_delta_seconds: None,
    })?;
    client.traffic_manager()?.set_synchronous_mode(false)?;
    log::info!("simulation set back to asynchronous mode");
    log::info!("cleanup complete");
    Ok(report)
}

fn teardown<A: Actor>(actor: &mut A, stop_first: bool, report: &mut CleanupReport) {
    if stop_first {
        if let Err(err) = actor.stop() {
            log::warn!("failed to stop actor {}: {:#}", actor.id(), err);
        }
    }
    match actor.destroy() {
        Ok(()) => report.destroyed += 1,
        Err(err) => {
            log::warn!("failed to destroy actor {}: {:#}", actor.id(), err);
            report.failures += 1;
        }
    }
}
