use std::{fs, path::PathBuf};

use approx::assert_relative_eq;

use hydroaero::{
    config::{read_simulation_config_from_file, read_structure_from_file},
    coordinator::{ControlCommands, EventSchedule, RunStatus, Simulation},
    hydro::LoadEngine,
    output_writer::OutputWriter,
};

const SIMULATION: &str = r#"
time_step: 0.05
n_steps: 40
record_every: 4
hydro:
  buoyancy: {mode: analytic}
  added_mass: fold_into_mass
waves: {type: still}
output_dir: unused
"#;

const STRUCTURE: &str = r#"
members:
  - name: spar
    kind: substructure
    start: [0, 0, -120]
    end: [0, 0, 10]
    elements: 13
    rigid: true
    properties: {diameter: 9.4, mass_per_length: 40000, cd: 0.6}
  - name: tower
    kind: tower
    start: [0, 0, 10]
    end: [0, 0, 87.6]
    elements: 4
    rigid: true
    properties: {diameter: 6.0, mass_per_length: 3500}
point_masses:
  - {at: {member: spar, node: 0}, mass: 2.69e6}
  - {at: {member: tower, node: -1}, mass: 3.5e5, inertia: [4.4e7, 2.4e7, 2.4e7]}
springs:
  - {at: {member: spar, node: 3}, anchor: [850, 0, -320], stiffness: 4.1e4}
  - {at: {member: spar, node: 3}, anchor: [-425, 736.1215932, -320], stiffness: 4.1e4}
  - {at: {member: spar, node: 3}, anchor: [-425, -736.1215932, -320], stiffness: 4.1e4}
connectors:
  - nodes: [{member: spar, node: -1}, {member: tower, node: 0}]
    release: {type: rigid}
"#;

fn input_dir() -> PathBuf {
    let dir = std::env::temp_dir().join("hydroaero_floating_run");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("simulation.yaml"), SIMULATION).unwrap();
    fs::write(dir.join("structure.yaml"), STRUCTURE).unwrap();
    dir
}

#[test]
fn test_spar_in_still_water() {
    let dir = input_dir();
    let config = read_simulation_config_from_file(dir.join("simulation.yaml")).unwrap();
    let structure = read_structure_from_file(dir.join("structure.yaml")).unwrap();
    let model = structure.assemble(&config, &dir).unwrap().model;
    assert_eq!(model.bodies.len(), 2);

    let waves = config.wave_field().unwrap();
    let hydro = LoadEngine::new(
        config.environment,
        config.hydro,
        Box::new(waves),
        config.inflow(),
        &model,
    )
    .unwrap();
    let mut sim = Simulation::from_model(model)
        .unwrap()
        .with_hydro(hydro)
        .with_events(EventSchedule::new(config.events.clone()))
        .with_record_every(config.record_every);
    sim.run(config.n_steps, |_| ControlCommands::default())
        .unwrap();
    assert_eq!(sim.status(), RunStatus::Finished);
    assert_eq!(sim.recorder.len(), 11);

    // Axisymmetric loads in still water leave the spar centred
    let top = sim.model.n_nodes() - 1;
    for channel in ["node0.position_x", "node0.position_y"] {
        let x = sim.recorder.last(channel).unwrap();
        assert_relative_eq!(x, 0., epsilon = 1e-4);
    }
    let z = sim.recorder.channel(&format!("node{top}.position_z")).unwrap();
    assert!((z[z.len() - 1] - 87.6).abs() < 0.5);
    // Buoyancy carries the weight of the hull
    let buoyancy = sim.recorder.last("spar.buoyancy_z").unwrap();
    assert_relative_eq!(
        buoyancy,
        config.environment.water_density
            * config.environment.gravity
            * std::f64::consts::FRAC_PI_4
            * 9.4
            * 9.4
            * 120.,
        max_relative = 0.01
    );

    let out = OutputWriter::new(dir.join("output")).unwrap();
    let path = out.write_time_series("spar", &sim.recorder).unwrap();
    let mut reader = csv::ReaderBuilder::new().from_path(path).unwrap();
    assert_eq!(&reader.headers().unwrap()[0], "time");
    assert_eq!(reader.records().count(), 11);
}
