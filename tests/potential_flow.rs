use std::{f64::consts::TAU, fs, path::PathBuf};

use approx::assert_relative_eq;

use hydroaero::{
    config::read_potential_flow_from_file,
    coordinator::{ControlCommands, Simulation},
    error::ConfigError,
    model::Model,
    potential::{PotentialFlowBody, PotentialFlowSettings},
};

/// Heave-dominated dataset: A33(inf) = 900 kg, C33 = 1e4 N/m
const DATASET: &str = r#"
name: buoy
frequencies: [0.2, 1.0, 2.0]
added_mass:
  - [950, 0, 0, 0, 0, 0, 950, 0, 0, 0, 0, 950, 0, 0, 0, 10, 0, 0, 10, 0, 10]
  - [930, 0, 0, 0, 0, 0, 930, 0, 0, 0, 0, 930, 0, 0, 0, 10, 0, 0, 10, 0, 10]
  - [910, 0, 0, 0, 0, 0, 910, 0, 0, 0, 0, 910, 0, 0, 0, 10, 0, 0, 10, 0, 10]
damping:
  - [5, 0, 0, 0, 0, 0, 5, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0]
  - [40, 0, 0, 0, 0, 0, 40, 0, 0, 0, 0, 40, 0, 0, 0, 0, 0, 0, 0, 0, 0]
  - [10, 0, 0, 0, 0, 0, 10, 0, 0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 0, 0]
added_mass_infinite: [900, 0, 0, 0, 0, 0, 900, 0, 0, 0, 0, 900, 0, 0, 0, 10, 0, 0, 10, 0, 10]
hydrostatic_stiffness: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1e4, 0, 0, 0, 0, 0, 0, 0, 0, 0]
"#;

fn write_dataset(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("hydroaero_potential_flow");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, DATASET).unwrap();
    path
}

#[test]
fn test_read_dataset() {
    let data = read_potential_flow_from_file(write_dataset("read.yaml")).unwrap();
    assert_eq!(data.name, "buoy");
    assert_relative_eq!(data.added_mass[1][0][0], 930.);
    assert_relative_eq!(data.hydrostatic_stiffness.unwrap()[2][2], 1e4);

    // Diffraction needs the excitation table this dataset lacks
    let settings = PotentialFlowSettings::default();
    assert!(matches!(
        data.validate(&settings.requirements()),
        Err(ConfigError::MissingTable {
            table: "excitation",
            ..
        })
    ));

    assert!(matches!(
        read_potential_flow_from_file("/nonexistent/buoy.yaml"),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn test_free_heave_period() {
    let data = read_potential_flow_from_file(write_dataset("heave.yaml")).unwrap();

    let mut model = Model::new();
    model.set_gravity(0., 0., 0.);
    model.set_time_step(0.005);
    let node = model
        .add_node()
        .position(0., 0., 0.)
        .translation_velocity(0., 0., 0.2)
        .build();
    model.add_point_mass(node, 100., [1e3; 3]);

    let settings = PotentialFlowSettings {
        radiation: false,
        diffraction: false,
        hydrostatics: true,
        ..Default::default()
    };
    let body = PotentialFlowBody::new(&data, node, &model, &settings, &[], 0.005).unwrap();
    let mut sim = Simulation::from_model(model)
        .unwrap()
        .with_potential_body(body);
    sim.run(600, |_| ControlCommands::default()).unwrap();

    // Heave period 2 pi sqrt((m + A33) / C33)
    let period = TAU * (1000f64 / 1e4).sqrt();
    let t = sim.recorder.channel("time").unwrap();
    let z = sim.recorder.channel("node0.position_z").unwrap();
    let crossing = (1..z.len())
        .find(|&i| z[i - 1] > 0. && z[i] <= 0.)
        .map(|i| t[i])
        .unwrap();
    assert_relative_eq!(crossing, period / 2., max_relative = 0.03);

    // Amplitude v0 / omega
    let peak = z.iter().cloned().fold(0., f64::max);
    assert_relative_eq!(peak, 0.2 * period / TAU, max_relative = 0.05);
    assert!(sim.recorder.last("buoy.hydrostatic_fz").is_some());
}
