use std::{
    env,
    error::Error,
    path::{Path, PathBuf},
    process,
};

use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;

use hydroaero::{
    config::{
        read_simulation_config_from_file, read_structure_from_file, SimulationConfig,
        StructureInput, WaveInput,
    },
    coordinator::{ControlCommands, EventSchedule, Simulation},
    error::{ConfigError, SimulationError},
    hydro::LoadEngine,
    output_writer::OutputWriter,
    potential::PotentialFlowBody,
    sweep::{run_sweep, CancelToken, SweepCell},
};

/// Ballasted spar buoy with a tower-top mass and three mooring springs
const DEFAULT_STRUCTURE: &str = r#"
members:
  - name: spar
    kind: substructure
    start: [0, 0, -120]
    end: [0, 0, 10]
    elements: 13
    rigid: true
    properties: {diameter: 9.4, mass_per_length: 40000, cd: 0.6, ca: 0.97}
  - name: tower
    kind: tower
    start: [0, 0, 10]
    end: [0, 0, 87.6]
    elements: 8
    rigid: true
    properties: {diameter: 6.0, mass_per_length: 3500, aero_cd: 0.8}
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

fn default_config() -> SimulationConfig {
    SimulationConfig {
        time_step: 0.05,
        n_steps: 2000,
        record_every: 2,
        waves: WaveInput::Regular {
            height: 6.,
            period: 10.,
            direction: 0.,
        },
        ..Default::default()
    }
}

/// Builds the simulation of one operating point
fn build(
    config: &SimulationConfig,
    structure: &StructureInput,
    base_dir: &Path,
) -> Result<Simulation, ConfigError> {
    let assembled = structure.assemble(config, base_dir)?;
    let model = assembled.model;
    let waves = config.wave_field()?;

    let hydro = LoadEngine::new(
        config.environment,
        config.hydro,
        Box::new(waves.clone()),
        config.inflow(),
        &model,
    )?;
    let bodies = assembled
        .potential_bodies
        .iter()
        .map(|(data, node)| {
            PotentialFlowBody::new(
                data,
                *node,
                &model,
                &config.potential_flow,
                &waves.components,
                config.time_step,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut sim = Simulation::from_model(model)?
        .with_hydro(hydro)
        .with_events(EventSchedule::new(config.events.clone()))
        .with_record_every(config.record_every);
    for body in bodies {
        sim = sim.with_potential_body(body);
    }
    Ok(sim)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

/// Mean surge and pitch-induced tower-top offset over the second half of a run
fn sweep_cell(
    cell: &SweepCell,
    config: &SimulationConfig,
    structure: &StructureInput,
    base_dir: &Path,
) -> Result<(f64, f64), SimulationError> {
    let mut config = config.clone();
    config.wind.speed = cell.wind_speed;
    config.record_every = 1;
    let mut sim = build(&config, structure, base_dir)?;
    sim.run(config.n_steps, |_| ControlCommands::default())?;

    let tail = |name: &str| -> f64 {
        let v = sim.recorder.channel(name).unwrap_or_default();
        mean(&v[v.len() / 2..])
    };
    let top = sim.model.n_nodes() - 1;
    Ok((
        tail("node0.position_x"),
        tail(&format!("node{top}.position_x")),
    ))
}

fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = env::args().collect::<Vec<_>>();
    let (config, structure, base_dir) = match args.as_slice() {
        [_, sim_file, structure_file, ..] => {
            let base = Path::new(structure_file)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            (
                read_simulation_config_from_file(sim_file)?,
                read_structure_from_file(structure_file)?,
                base,
            )
        }
        _ => {
            info!("no input files given, running the built-in spar");
            (
                default_config(),
                serde_yaml::from_str::<StructureInput>(DEFAULT_STRUCTURE)?,
                PathBuf::new(),
            )
        }
    };
    config.validate()?;

    let writer = OutputWriter::new(&config.output_dir)?;
    let mut sim = build(&config, &structure, &base_dir)?;

    match sim.modal_analysis(&config.modal) {
        Ok(modes) => {
            for (i, f) in modes.frequencies().iter().take(6).enumerate() {
                info!("mode {i}: {f:.4} Hz");
            }
            writer.write_modal("floating_spar", &modes)?;
        }
        Err(e) => warn!("modal analysis skipped: {e}"),
    }

    let result = sim.run(config.n_steps, |_| ControlCommands::default());
    // Partial results are written before the error is reported
    writer.write_time_series("floating_spar", &sim.recorder)?;
    result?;

    if let Some(grid) = &config.sweep {
        let cancel = CancelToken::new();
        let results = run_sweep(grid.cells(), 0, &cancel, |cell| {
            sweep_cell(cell, &config, &structure, &base_dir)
        })?;
        for (cell, (surge, top)) in results.successes() {
            info!(
                "wind {:5.1} m/s: mean surge {surge:8.3} m, tower top {top:8.3} m",
                cell.wind_speed
            );
        }
        for (cell, r) in results.cells.iter().zip(&results.results) {
            if let Some(Err(e)) = r {
                warn!("sweep cell {} failed: {e}", cell.index);
            }
        }
    }
    Ok(())
}

fn main() {
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
        eprintln!("logger: {e}");
    }
    if let Err(e) = run() {
        error!("{e}");
        process::exit(1);
    }
}
