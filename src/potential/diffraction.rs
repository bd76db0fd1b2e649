use std::f64::consts::TAU;

use log::warn;
use num_complex::Complex64;

use crate::{
    hydro::waves::WaveComponent,
    interp::{bilinear_weights, bracket, bracket_periodic},
    potential::data::{ExcitationTable, Rao6},
};

/// Locates a heading on a table grid. Grids covering the full circle wrap,
/// others are clamped to their end headings.
pub fn heading_bracket(headings: &[f64], heading: f64) -> (usize, usize, f64) {
    let n = headings.len();
    if n < 2 {
        return (0, 0, 0.);
    }
    let span = headings[n - 1] - headings[0];
    if span >= TAU - 1e-6 {
        // Both ends of the circle are tabulated
        let x = headings[0] + (heading - headings[0]).rem_euclid(TAU);
        return bracket(headings, x);
    }
    let spacing = span / (n - 1) as f64;
    if span + spacing >= TAU - 1e-6 {
        bracket_periodic(headings, heading)
    } else {
        bracket(headings, heading)
    }
}

/// Counts the components whose frequency lies outside the table. They are
/// clamped to the end frequencies, with one warning per table.
pub(crate) fn warn_clamped(
    table: &str,
    frequencies: &[f64],
    components: &[WaveComponent],
) -> usize {
    let (Some(&lo), Some(&hi)) = (frequencies.first(), frequencies.last()) else {
        return 0;
    };
    let n = components
        .iter()
        .filter(|c| c.omega < lo || c.omega > hi)
        .count();
    if n > 0 {
        warn!(
            "{table}: {n} of {} wave frequencies clamped to table range [{lo:.4}, {hi:.4}] rad/s",
            components.len()
        );
    }
    n
}

/// Excitation coefficient interpolated bilinearly in frequency and heading
pub fn interpolate_excitation(table: &ExcitationTable, omega: f64, heading: f64) -> Rao6 {
    let corners = bilinear_weights(
        bracket(&table.frequencies, omega),
        heading_bracket(&table.headings, heading),
    );
    let mut out = [Complex64::new(0., 0.); 6];
    for (i, j, w) in corners {
        for (o, c) in out.iter_mut().zip(&table.coefficients[i][j]) {
            *o += c * w;
        }
    }
    out
}

/// First-order wave excitation for a fixed set of wave components
#[derive(Clone, Debug)]
pub struct Diffraction {
    /// Transfer coefficient of each component
    transfer: Vec<Rao6>,
    /// Components outside the table frequency range
    pub clamped: usize,
}

impl Diffraction {
    pub fn new(table: &ExcitationTable, components: &[WaveComponent]) -> Self {
        Self {
            clamped: warn_clamped("excitation", &table.frequencies, components),
            transfer: components
                .iter()
                .map(|c| interpolate_excitation(table, c.omega, c.direction))
                .collect(),
        }
    }

    /// `sum Re(X a exp(i theta))` over the components, with `theta` the phase of
    /// each component at the body reference point `(x, y)`
    pub fn force(&self, components: &[WaveComponent], x: f64, y: f64, t: f64) -> [f64; 6] {
        let mut f = [0.; 6];
        for (c, x_c) in components.iter().zip(&self.transfer) {
            let e = Complex64::from_polar(c.amplitude, c.theta(x, y, t));
            for (fi, xi) in f.iter_mut().zip(x_c) {
                *fi += (xi * e).re;
            }
        }
        f
    }
}
