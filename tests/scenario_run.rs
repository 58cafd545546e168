use std::fs;
use std::path::{Path, PathBuf};

use oceanfleet::{
    engine::{Engine, EngineBuilder, EngineSettings},
    error::ScenarioError,
    scenario::{Scenario, ScenarioLoader},
    trace::MemoryTrace,
    world::World,
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn scenario_path() -> PathBuf {
    PathBuf::from("scenarios/two_harbors.yaml")
}

fn build_engine(scenario: &Scenario, snapshot_dir: &Path, interval: u64) -> Engine {
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        snapshot_interval_ticks: interval,
        snapshot_dir: snapshot_dir.to_path_buf(),
    };
    EngineBuilder::standard(settings, scenario.event_system()).build()
}

fn assert_bounds(world: &World) {
    for ship in world.ships() {
        assert!(
            ship.fuel <= ship.max_fuel,
            "{} has {} of {} fuel",
            ship.id,
            ship.fuel,
            ship.max_fuel
        );
        for (kind, hold) in &ship.cargo {
            assert!(hold.remaining <= hold.max, "{} overfilled {kind:?}", ship.id);
        }
        if let Some(rig) = &ship.rig {
            assert!(rig.payload <= rig.max_payload, "{} rig overfilled", ship.id);
        }
    }
    for corp in world.corporations() {
        assert!(corp.credits() >= 0, "{} went into debt", corp.id);
    }
}

#[test]
fn demo_scenario_stays_within_bounds_every_tick() {
    let scenario = scenario_loader().load(scenario_path()).unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = build_engine(&scenario, Path::new("snapshots_run_tests"), 0);
    let mut trace = MemoryTrace::new();

    let ticks = scenario.ticks(None);
    for _ in 0..ticks {
        engine.step(&mut world, &mut trace).unwrap();
        assert_bounds(&world);
    }
    assert_eq!(world.tick(), ticks);
    assert!(!trace.events().is_empty());
}

#[test]
fn identical_seeds_produce_identical_traces() {
    let scenario = scenario_loader().load(scenario_path()).unwrap();
    let run = || {
        let mut world = scenario.build_world().unwrap();
        let mut engine = build_engine(&scenario, Path::new("snapshots_run_tests"), 0);
        let mut trace = MemoryTrace::new();
        let summary = engine.run(&mut world, 60, &mut trace).unwrap();
        (trace.lines(), summary.garbage_left)
    };
    let (first, first_garbage) = run();
    let (second, second_garbage) = run();
    assert_eq!(first, second);
    assert_eq!(first_garbage, second_garbage);
}

#[test]
fn snapshots_land_on_interval_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = scenario_loader().load(scenario_path()).unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = build_engine(&scenario, dir.path(), 2);
    let mut trace = MemoryTrace::new();
    engine.run(&mut world, 4, &mut trace).unwrap();

    let scenario_dir = dir.path().join(&scenario.name);
    assert!(scenario_dir.join("tick_000002.json").exists());
    assert!(scenario_dir.join("tick_000004.json").exists());
    assert!(!scenario_dir.join("tick_000003.json").exists());

    let raw = fs::read_to_string(scenario_dir.join("tick_000004.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["tick"], 4);
    assert_eq!(snapshot["corporations"].as_array().unwrap().len(), 2);
    assert!(!snapshot["ships"].as_array().unwrap().is_empty());
}

#[test]
fn loader_reads_yaml_and_json_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("bay.yaml"),
        r#"
name: yaml_bay
map:
  rows: ["s~~"]
corporations:
  - id: 0
    name: Blue
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("bay.json"),
        r#"{
  "name": "json_bay",
  "seed": 9,
  "map": { "rows": ["s~~"] },
  "harbors": [{ "id": 0, "tile": 0, "corporations": [0], "refueling": { "refuel_cost": 5 } }],
  "corporations": [{
    "id": 0,
    "name": "Blue",
    "ships": [{ "id": 0, "tile": 1, "kind": "scouting", "max_velocity": 10,
                "acceleration": 10, "max_fuel": 50, "fuel_consumption": 1 }]
  }]
}"#,
    )
    .unwrap();

    let loader = ScenarioLoader::new(dir.path());
    let yaml = loader.load("bay.yaml").unwrap();
    assert_eq!(yaml.name, "yaml_bay");
    assert_eq!(yaml.seed, 42);

    let json = loader.load("bay.json").unwrap();
    assert_eq!(json.name, "json_bay");
    assert_eq!(json.seed, 9);
    let world = json.build_world().unwrap();
    assert_eq!(world.ships().count(), 1);
    assert_eq!(world.refuel_tiles().len(), 1);
}

#[test]
fn loader_reports_missing_and_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ScenarioLoader::new(dir.path());

    let err = loader.load("absent.yaml").unwrap_err();
    assert!(matches!(err, ScenarioError::Io { .. }), "{err}");

    fs::write(
        dir.path().join("crowded.yaml"),
        r#"
name: crowded
map:
  rows: ["s~"]
corporations:
  - id: 0
    name: Blue
harbors:
  - id: 0
    tile: 0
    corporations: [0]
    shipyard: { repair_cost: 10, ship_cost: 100 }
    refueling: { refuel_cost: 5 }
    unloading: { unload_return: 2, accepts: [plastic] }
"#,
    )
    .unwrap();
    let err = loader.load("crowded.yaml").unwrap_err();
    assert!(matches!(err, ScenarioError::Validation(_)), "{err}");

    fs::write(dir.path().join("broken.json"), "{ \"name\": ").unwrap();
    let err = loader.load("broken.json").unwrap_err();
    assert!(matches!(err, ScenarioError::Json(_)), "{err}");
}
