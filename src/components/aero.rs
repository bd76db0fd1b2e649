use itertools::Itertools;
use serde::Deserialize;

use crate::{
    error::ConfigError,
    interp::{interp_clamped, is_strictly_ascending},
    loads::{LoadTarget, NodalLoads, SegmentTarget},
    model::{BodyId, Model},
    util::{add, dist, lerp, Vec3},
};

/// How station samples are interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeroLoadKind {
    /// Force (N) and moment (N m) applied at the station point
    Atomic,
    /// Force (N/m) and moment (N m/m) per unit length, scaled by the station width
    Distributed,
}

/// Axes in which station samples are expressed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeroLoadFrame {
    #[default]
    Global,
    /// Twist-corrected frame of the station's nearest node
    Section,
}

/// Force and moment at one aerodynamic station
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct StationSample {
    pub force: Vec3,
    pub moment: Vec3,
}

/// Source of per-station aerodynamic loads, typically an external blade
/// element or vortex solver
pub trait AeroLoadsProvider {
    fn n_stations(&self) -> usize;

    /// Station samples at time `t`, one per station
    fn samples(&self, t: f64) -> Vec<StationSample>;
}

//------------------------------------------------------------------------------
// Time series provider
//------------------------------------------------------------------------------

/// Station samples recorded at discrete times, linearly interpolated and held
/// constant outside the recorded range
#[derive(Clone, Debug)]
pub struct TimeSeriesAeroLoads {
    time: Vec<f64>,
    /// `[time][station]`
    samples: Vec<Vec<StationSample>>,
}

impl TimeSeriesAeroLoads {
    pub fn new(time: Vec<f64>, samples: Vec<Vec<StationSample>>) -> Result<Self, ConfigError> {
        let table = "aero time series";
        if time.is_empty() || time.len() != samples.len() {
            return Err(ConfigError::CoefficientTable {
                table: table.to_string(),
                details: format!("{} times for {} sample rows", time.len(), samples.len()),
            });
        }
        if !is_strictly_ascending(&time) {
            return Err(ConfigError::CoefficientTable {
                table: table.to_string(),
                details: "time is not strictly ascending".to_string(),
            });
        }
        if !samples.iter().map(|row| row.len()).all_equal() {
            return Err(ConfigError::CoefficientTable {
                table: table.to_string(),
                details: "rows have different station counts".to_string(),
            });
        }
        let finite = samples
            .iter()
            .flatten()
            .all(|s| s.force.iter().chain(&s.moment).all(|v| v.is_finite()));
        if !finite {
            return Err(ConfigError::CoefficientTable {
                table: table.to_string(),
                details: "non-finite sample".to_string(),
            });
        }
        Ok(Self { time, samples })
    }

    /// Loads held constant in time
    pub fn steady(samples: Vec<StationSample>) -> Result<Self, ConfigError> {
        Self::new(vec![0.], vec![samples])
    }
}

impl AeroLoadsProvider for TimeSeriesAeroLoads {
    fn n_stations(&self) -> usize {
        self.samples.first().map_or(0, |row| row.len())
    }

    fn samples(&self, t: f64) -> Vec<StationSample> {
        let channel = |station: usize, f: fn(&StationSample) -> f64| {
            let y = self.samples.iter().map(|row| f(&row[station])).collect_vec();
            interp_clamped(&self.time, &y, t)
        };
        (0..self.n_stations())
            .map(|i| StationSample {
                force: [
                    channel(i, |s| s.force[0]),
                    channel(i, |s| s.force[1]),
                    channel(i, |s| s.force[2]),
                ],
                moment: [
                    channel(i, |s| s.moment[0]),
                    channel(i, |s| s.moment[1]),
                    channel(i, |s| s.moment[2]),
                ],
            })
            .collect()
    }
}

//------------------------------------------------------------------------------
// Aero component
//------------------------------------------------------------------------------

/// Aerodynamic loads applied to the stations of one body
pub struct AeroComponent {
    pub body: BodyId,
    /// Normalized station coordinates along the body
    pub station_s: Vec<f64>,
    /// Station widths (m) from the reference geometry
    pub widths: Vec<f64>,
    pub kind: AeroLoadKind,
    pub frame: AeroLoadFrame,
    provider: Box<dyn AeroLoadsProvider + Send>,
}

impl AeroComponent {
    pub fn new(
        model: &Model,
        body: BodyId,
        station_s: Vec<f64>,
        kind: AeroLoadKind,
        frame: AeroLoadFrame,
        provider: Box<dyn AeroLoadsProvider + Send>,
    ) -> Result<Self, ConfigError> {
        let view = model.body_view(body)?;
        let table = format!("aero stations of body '{}'", view.body.name);
        if station_s.is_empty()
            || !is_strictly_ascending(&station_s)
            || station_s.iter().any(|s| !(0. ..=1.).contains(s))
        {
            return Err(ConfigError::CoefficientTable {
                table,
                details: "station coordinates must be ascending within [0, 1]".to_string(),
            });
        }
        if provider.n_stations() != station_s.len() {
            return Err(ConfigError::CoefficientTable {
                table,
                details: format!(
                    "provider has {} stations, body has {}",
                    provider.n_stations(),
                    station_s.len()
                ),
            });
        }

        let points = station_s.iter().map(|&s| view.position_at(s)).collect_vec();
        let widths = station_widths(&points);

        Ok(Self {
            body,
            station_s,
            widths,
            kind,
            frame,
            provider,
        })
    }

    /// Adds the provider's loads at time `t` to the nodal buffer. Returns the
    /// total aerodynamic force.
    pub fn apply(&self, model: &Model, t: f64, loads: &mut NodalLoads) -> Vec3 {
        let Ok(view) = model.body_view(self.body) else {
            return [0.; 3];
        };
        let mut total = [0.; 3];
        for (sample, &s, &width) in
            itertools::izip!(self.provider.samples(t), &self.station_s, &self.widths)
        {
            let Some((e, s_local)) = view.locate(s) else {
                continue;
            };
            let (a, b) = (&model.nodes[e.nodes[0].0], &model.nodes[e.nodes[1].0]);
            let scale = match self.kind {
                AeroLoadKind::Atomic => 1.,
                AeroLoadKind::Distributed => width,
            };
            let (mut force, mut moment) = (
                sample.force.map(|v| v * scale),
                sample.moment.map(|v| v * scale),
            );
            if self.frame == AeroLoadFrame::Section {
                let frame = if s_local < 0.5 { &a.twisted_frame } else { &b.twisted_frame };
                force = frame.to_global(&force);
                moment = frame.to_global(&moment);
            }
            let mut target = SegmentTarget::new(a, b, loads);
            target.add_force_at(s_local, &force);
            target.add_torque_at(s_local, &moment);
            total = add(&total, &force);
        }
        total
    }
}

/// Width of each station by the midpoint rule: the distance between the
/// midpoints to its neighbours, the end stations reaching only to their
/// inner midpoint
pub fn station_widths(points: &[Vec3]) -> Vec<f64> {
    match points.len() {
        0 => vec![],
        1 => vec![0.],
        n => {
            let mids = points
                .iter()
                .tuple_windows()
                .map(|(p, q)| lerp(p, q, 0.5))
                .collect_vec();
            (0..n)
                .map(|i| {
                    let lo = if i == 0 { &points[0] } else { &mids[i - 1] };
                    let hi = if i == n - 1 { &points[n - 1] } else { &mids[i] };
                    dist(lo, hi)
                })
                .collect()
        }
    }
}
