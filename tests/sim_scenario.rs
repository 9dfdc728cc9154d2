use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use carla_perception::config::SimulationSettings;
use carla_perception::sim::{
    apply_settings, camera_descriptors, cleanup, connect_to_server, is_car_blueprint, load_map,
    setting_traffic_manager, spawn_ego_vehicle, spawn_npc_pedestrians, spawn_npc_vehicles, Actor,
    Blueprint, Location, ScenarioActors, SimClient, SimConnector, SimWorld, TrafficManager,
    Transform, WorldSettings, WALKER_CONTROLLER_BLUEPRINT,
};

type Journal = Rc<RefCell<Vec<String>>>;

struct FakeActor {
    id: u32,
    blueprint: String,
    role_name: Option<String>,
    spawned_at: Transform,
    parent: Option<u32>,
    autopilot: Option<Option<u16>>,
    max_speed: Option<f64>,
    fail_destroy: bool,
    journal: Journal,
}

impl FakeActor {
    fn sensor(id: u32, role: &str, journal: &Journal) -> Self {
        Self {
            id,
            blueprint: "sensor.camera.rgb".to_string(),
            role_name: Some(role.to_string()),
            spawned_at: Transform::default(),
            parent: None,
            autopilot: None,
            max_speed: None,
            fail_destroy: false,
            journal: journal.clone(),
        }
    }

    fn note(&self, what: &str) {
        self.journal.borrow_mut().push(format!("{} {}", what, self.id));
    }
}

impl Actor for FakeActor {
    fn id(&self) -> u32 {
        self.id
    }

    fn role_name(&self) -> Option<String> {
        self.role_name.clone()
    }

    fn set_autopilot(&mut self, enabled: bool, tm_port: Option<u16>) -> Result<()> {
        if enabled {
            self.autopilot = Some(tm_port);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.note("start");
        Ok(())
    }

    fn go_to_location(&mut self, _location: Location) -> Result<()> {
        Ok(())
    }

    fn set_max_speed(&mut self, speed: f64) -> Result<()> {
        self.max_speed = Some(speed);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.note("stop");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.fail_destroy {
            return Err(anyhow!("actor {} already gone", self.id));
        }
        self.note("destroy");
        Ok(())
    }
}

struct FakeWorld {
    blueprints: Vec<Blueprint>,
    /// Spawn requests at these x coordinates are refused.
    blocked_x: Vec<f64>,
    next_id: u32,
    nav_calls: u32,
    settings: WorldSettings,
    journal: Journal,
}

impl FakeWorld {
    fn new(journal: &Journal) -> Self {
        let blueprints = [
            "vehicle.tesla.model3",
            "vehicle.audi.a2",
            "vehicle.bh.crossbike",
            "vehicle.diamondback.century_bicycle",
            "vehicle.harley-davidson.low_rider_motorcycle",
            "vehicle.vespa.zx125",
            "walker.pedestrian.0001",
            "walker.pedestrian.0002",
            WALKER_CONTROLLER_BLUEPRINT,
        ]
        .into_iter()
        .map(Blueprint::new)
        .collect();
        Self {
            blueprints,
            blocked_x: Vec::new(),
            next_id: 100,
            nav_calls: 0,
            settings: WorldSettings {
                synchronous_mode: true,
                fixed_delta_seconds: Some(0.05),
            },
            journal: journal.clone(),
        }
    }
}

impl SimWorld for FakeWorld {
    type Actor = FakeActor;

    fn blueprints(&self, pattern: &str) -> Vec<Blueprint> {
        let prefix = pattern.trim_end_matches('*');
        self.blueprints
            .iter()
            .filter(|bp| bp.id.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn find_blueprint(&self, id: &str) -> Option<Blueprint> {
        self.blueprints.iter().find(|bp| bp.id == id).cloned()
    }

    fn try_spawn_actor(
        &mut self,
        blueprint: &Blueprint,
        transform: &Transform,
        attach_to: Option<&FakeActor>,
    ) -> Option<FakeActor> {
        if self.blocked_x.contains(&transform.location.x) {
            return None;
        }
        self.next_id += 1;
        Some(FakeActor {
            id: self.next_id,
            blueprint: blueprint.id.clone(),
            role_name: None,
            spawned_at: *transform,
            parent: attach_to.map(|a| a.id),
            autopilot: None,
            max_speed: None,
            fail_destroy: false,
            journal: self.journal.clone(),
        })
    }

    fn random_location_from_navigation(&mut self) -> Option<Location> {
        self.nav_calls += 1;
        Some(Location {
            x: self.nav_calls as f64,
            y: 0.0,
            z: 0.0,
        })
    }

    fn settings(&self) -> Result<WorldSettings> {
        Ok(self.settings)
    }

    fn apply_settings(&mut self, settings: &WorldSettings) -> Result<()> {
        self.settings = *settings;
        Ok(())
    }
}

struct FakeTrafficManager {
    port: u16,
    journal: Journal,
}

impl TrafficManager for FakeTrafficManager {
    fn set_synchronous_mode(&mut self, enabled: bool) -> Result<()> {
        self.journal
            .borrow_mut()
            .push(format!("tm sync {}", enabled));
        Ok(())
    }

    fn port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug)]
struct FakeClient {
    maps: Vec<String>,
    journal: Journal,
}

impl SimClient for FakeClient {
    type World = FakeWorld;
    type TrafficManager = FakeTrafficManager;

    fn available_maps(&self) -> Result<Vec<String>> {
        Ok(self.maps.clone())
    }

    fn load_world(&mut self, map: &str) -> Result<FakeWorld> {
        if !self.maps.iter().any(|m| m.ends_with(map)) {
            return Err(anyhow!("map {} not found", map));
        }
        Ok(FakeWorld::new(&self.journal))
    }

    fn traffic_manager(&mut self) -> Result<FakeTrafficManager> {
        Ok(FakeTrafficManager {
            port: 8000,
            journal: self.journal.clone(),
        })
    }
}

struct FakeConnector {
    journal: Journal,
}

impl SimConnector for FakeConnector {
    type Client = FakeClient;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<FakeClient> {
        if host != "localhost" {
            return Err(anyhow!("connection refused"));
        }
        self.journal
            .borrow_mut()
            .push(format!("connect {}:{} {:?}", host, port, timeout));
        Ok(FakeClient {
            maps: vec!["/Game/Carla/Maps/Town01_Opt".to_string()],
            journal: self.journal.clone(),
        })
    }
}

fn spawn_points(n: usize) -> Vec<Transform> {
    (0..n)
        .map(|i| {
            Transform::at(Location {
                x: 1000.0 + i as f64,
                y: 0.0,
                z: 0.5,
            })
        })
        .collect()
}

fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn connects_loads_map_and_applies_settings() {
    let journal = journal();
    let connector = FakeConnector {
        journal: journal.clone(),
    };
    let settings = SimulationSettings::default();

    let mut client = connect_to_server(&connector, &settings).unwrap();
    assert_eq!(journal.borrow()[0], "connect localhost:2000 10s");

    let mut world = load_map(&mut client, "Town01_Opt").unwrap();
    assert!(load_map(&mut client, "Town99").is_err());

    apply_settings(&mut world, true, 0.1).unwrap();
    assert_eq!(
        world.settings,
        WorldSettings {
            synchronous_mode: true,
            fixed_delta_seconds: Some(0.1)
        }
    );

    let (_tm, port) = setting_traffic_manager(&mut client, true).unwrap();
    assert_eq!(port, 8000);
    assert!(journal.borrow().contains(&"tm sync true".to_string()));

    let remote = SimulationSettings {
        host: "carla-server".to_string(),
        ..SimulationSettings::default()
    };
    let err = connect_to_server(&connector, &remote).unwrap_err();
    assert!(format!("{err:#}").contains("carla-server:2000"));
}

#[test]
fn car_filter_excludes_two_wheelers() {
    assert!(is_car_blueprint(&Blueprint::new("vehicle.tesla.model3")));
    assert!(!is_car_blueprint(&Blueprint::new("vehicle.bh.crossbike")));
    assert!(!is_car_blueprint(&Blueprint::new("vehicle.vespa.zx125")));
    assert!(!is_car_blueprint(&Blueprint::new(
        "vehicle.yamaha.yzf_motorcycle"
    )));
}

#[test]
fn npc_vehicles_use_ratio_and_skip_the_first_spawn_point() {
    let journal = journal();
    let mut world = FakeWorld::new(&journal);
    let points = spawn_points(10);
    world.blocked_x.push(1002.0);
    let mut rng = StdRng::seed_from_u64(7);

    let vehicles = spawn_npc_vehicles(&mut world, 8000, &points, 0.35, &mut rng);

    // floor(10 * 0.35) = 3 attempts at points 1..=3, point 2 refused.
    let xs: Vec<f64> = vehicles.iter().map(|v| v.spawned_at.location.x).collect();
    assert_eq!(xs, vec![1001.0, 1003.0]);
    for vehicle in &vehicles {
        assert!(is_car_blueprint(&Blueprint::new(vehicle.blueprint.clone())));
        assert_eq!(vehicle.autopilot, Some(Some(8000)));
    }

    let none = spawn_npc_vehicles(&mut world, 8000, &points, 0.0, &mut rng);
    assert!(none.is_empty());
}

#[test]
fn pedestrians_get_started_controllers() {
    let journal = journal();
    let mut world = FakeWorld::new(&journal);
    let mut rng = StdRng::seed_from_u64(11);

    let (pedestrians, controllers) = spawn_npc_pedestrians(&mut world, 5, &mut rng);

    assert_eq!(pedestrians.len(), 5);
    assert_eq!(controllers.len(), 5);
    for (walker, ctrl) in pedestrians.iter().zip(&controllers) {
        assert!(walker.blueprint.starts_with("walker.pedestrian."));
        assert_eq!(ctrl.blueprint, WALKER_CONTROLLER_BLUEPRINT);
        assert_eq!(ctrl.parent, Some(walker.id));
        let speed = ctrl.max_speed.unwrap();
        assert!((1.0..2.0).contains(&speed), "speed {speed}");
        assert!(journal.borrow().contains(&format!("start {}", ctrl.id)));
    }
}

#[test]
fn ego_vehicle_takes_second_to_last_spawn_point() {
    let journal = journal();
    let mut world = FakeWorld::new(&journal);
    let bp = Blueprint::new("vehicle.lincoln.mkz_2020");

    let ego = spawn_ego_vehicle(&mut world, &bp, &spawn_points(6)).unwrap();
    assert_eq!(ego.spawned_at.location.x, 1004.0);
    assert_eq!(ego.autopilot, Some(None));

    assert!(spawn_ego_vehicle(&mut world, &bp, &spawn_points(1)).is_none());
    world.blocked_x.push(1004.0);
    assert!(spawn_ego_vehicle(&mut world, &bp, &spawn_points(6)).is_none());
}

#[test]
fn camera_descriptors_follow_actor_order() {
    let journal = journal();
    let cameras = vec![
        FakeActor::sensor(1, "front", &journal),
        FakeActor::sensor(2, "left_1", &journal),
    ];
    let descriptors = camera_descriptors(&cameras).unwrap();
    let names: Vec<&str> = descriptors.iter().map(|d| d.role_name.as_str()).collect();
    assert_eq!(names, vec!["front", "left_1"]);

    let mut unnamed = FakeActor::sensor(3, "x", &journal);
    unnamed.role_name = None;
    assert!(camera_descriptors(&[unnamed]).is_err());
}

#[test]
fn cleanup_destroys_everything_and_restores_async_mode() {
    let journal = journal();
    let connector = FakeConnector {
        journal: journal.clone(),
    };
    let mut client = connect_to_server(&connector, &SimulationSettings::default()).unwrap();
    let mut world = load_map(&mut client, "Town01_Opt").unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let points = spawn_points(10);

    let vehicles = spawn_npc_vehicles(&mut world, 8000, &points, 0.2, &mut rng);
    let (pedestrians, walker_controllers) = spawn_npc_pedestrians(&mut world, 2, &mut rng);
    let ego_vehicle = spawn_ego_vehicle(&mut world, &Blueprint::new("vehicle.audi.a2"), &points);
    let mut broken = FakeActor::sensor(2, "left_1", &journal);
    broken.fail_destroy = true;
    let actors = ScenarioActors {
        cameras: vec![FakeActor::sensor(1, "front", &journal), broken],
        depth_cameras: vec![FakeActor::sensor(3, "front_depth", &journal)],
        vehicles,
        pedestrians,
        walker_controllers,
        ego_vehicle,
    };
    let controller_ids: Vec<u32> = actors.walker_controllers.iter().map(|c| c.id).collect();

    let report = cleanup(&mut client, &mut world, actors).unwrap();

    // 3 sensors + 2 vehicles + 2 walkers + 2 controllers + ego, one refused.
    assert_eq!(report.destroyed, 9);
    assert_eq!(report.failures, 1);
    let log = journal.borrow();
    for sensor in [1, 2, 3] {
        assert!(log.contains(&format!("stop {sensor}")));
    }
    for id in controller_ids {
        let stop = log.iter().position(|e| *e == format!("stop {id}")).unwrap();
        let destroy = log.iter().position(|e| *e == format!("destroy {id}")).unwrap();
        assert!(stop < destroy);
    }
    assert_eq!(log.last().map(String::as_str), Some("tm sync false"));
    assert_eq!(
        world.settings,
        WorldSettings {
            synchronous_mode: false,
            fixed_delta_seconds: None
        }
    );
}
