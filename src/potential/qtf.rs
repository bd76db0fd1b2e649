use num_complex::Complex64;
use serde::Deserialize;

use crate::{
    hydro::waves::WaveComponent,
    interp::{bilinear_weights, bracket},
    potential::{
        data::{QtfTable, Rao6},
        diffraction::{heading_bracket, warn_clamped},
    },
};

/// Second-order difference-frequency formulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QtfMethod {
    /// Complete double sum over component pairs
    #[default]
    Full,
    /// Off-diagonal terms approximated from the diagonal (Newman)
    Newman,
    /// Diagonal terms only, constant mean drift
    MeanDrift,
}

const ZERO: Rao6 = [Complex64 { re: 0., im: 0. }; 6];

/// Interpolates one `[heading][i][j]` array onto the pair `(w_i, w_j)`
fn interpolate_pair(
    table: &QtfTable,
    data: &[Vec<Vec<Rao6>>],
    (wi, wj): (f64, f64),
    heading: f64,
) -> Rao6 {
    let fi = bracket(&table.frequencies, wi);
    let fj = bracket(&table.frequencies, wj);
    let (h0, h1, wh) = heading_bracket(&table.headings, heading);
    let mut out = ZERO;
    for (h, w_h) in [(h0, 1. - wh), (h1, wh)] {
        if w_h == 0. {
            continue;
        }
        for (i, j, w) in bilinear_weights(fi, fj) {
            for (o, q) in out.iter_mut().zip(&data[h][i][j]) {
                *o += q * (w * w_h);
            }
        }
    }
    out
}

/// Second-order wave forces for a fixed set of wave components
#[derive(Clone, Debug)]
pub struct SecondOrderForce {
    pub method: QtfMethod,
    /// Difference coefficients per component pair `[i][j]`
    difference: Vec<Vec<Rao6>>,
    /// Sum coefficients per component pair `[i][j]`
    sum: Option<Vec<Vec<Rao6>>>,    /// Components outside the table frequency range
    pub clamped: usize,
}

impl SecondOrderForce {
    /// Interpolates a table onto the component frequencies. One-sided tables
    /// are completed first. The heading of a pair is the mean of the two
    /// component directions.
    pub fn new(
        table: &QtfTable,
        components: &[WaveComponent],
        method: QtfMethod,
        include_sum: bool,
    ) -> Self {
        let table = table.filled();
        let n = components.len();
        let pair_heading = |i: usize, j: usize| {
            0.5 * (components[i].direction + components[j].direction)
        };
        let pair = |data: &[Vec<Vec<Rao6>>], i: usize, j: usize| {
            interpolate_pair(
                &table,
                data,
                (components[i].omega, components[j].omega),
                pair_heading(i, j),
            )
        };

        let difference = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| match method {
                        QtfMethod::Full => pair(&table.difference, i, j),
                        QtfMethod::Newman | QtfMethod::MeanDrift if i == j => {
                            pair(&table.difference, i, i)
                        }
                        QtfMethod::Newman | QtfMethod::MeanDrift => ZERO,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let sum = match (&table.sum, include_sum) {
            (Some(data), true) => Some(
                (0..n)
                    .map(|i| (0..n).map(|j| pair(data, i, j)).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        };

        Self {
            method,
            difference,
            sum,
            clamped: warn_clamped("qtf", &table.frequencies, components),
        }
    }

    /// Difference-frequency force. Pairs with `w_i < w_j` use the Hermitian
    /// conjugate of the table entry, so the double sum is real.
    pub fn difference_force(
        &self,
        components: &[WaveComponent],
        x: f64,
        y: f64,
        t: f64,
    ) -> [f64; 6] {
        let n = components.len();
        let theta = components
            .iter()
            .map(|c| c.theta(x, y, t))
            .collect::<Vec<_>>();
        let mut f = [0.; 6];
        match self.method {
            QtfMethod::Full => {
                for i in 0..n {
                    for j in 0..n {
                        let a = components[i].amplitude * components[j].amplitude;
                        let e = Complex64::from_polar(a, theta[i] - theta[j]);
                        for (fk, q) in f.iter_mut().zip(&self.difference[i][j]) {
                            *fk += (q * e).re;
                        }
                    }
                }
            }
            QtfMethod::Newman => {
                // Q_ij ~ (Re Q_ii + Re Q_jj) / 2, factored into two single sums
                for k in 0..6 {
                    let (mut p, mut q, mut r, mut s) = (0., 0., 0., 0.);
                    for i in 0..n {
                        let a = components[i].amplitude;
                        let d = self.difference[i][i][k].re;
                        let (sn, cs) = theta[i].sin_cos();
                        p += a * cs;
                        q += a * sn;
                        r += a * d * cs;
                        s += a * d * sn;
                    }
                    f[k] = p * r + q * s;
                }
            }
            QtfMethod::MeanDrift => {
                for (i, c) in components.iter().enumerate() {
                    let a2 = c.amplitude * c.amplitude;
                    for (fk, q) in f.iter_mut().zip(&self.difference[i][i]) {
                        *fk += a2 * q.re;
                    }
                }
            }
        }
        f
    }

    /// Sum-frequency force, zero when not requested
    pub fn sum_force(&self, components: &[WaveComponent], x: f64, y: f64, t: f64) -> [f64; 6] {
        let mut f = [0.; 6];
        let Some(sum) = &self.sum else {
            return f;
        };
        let theta = components
            .iter()
            .map(|c| c.theta(x, y, t))
            .collect::<Vec<_>>();
        for (i, ci) in components.iter().enumerate() {
            for (j, cj) in components.iter().enumerate() {
                let e = Complex64::from_polar(ci.amplitude * cj.amplitude, theta[i] + theta[j]);
                for (fk, q) in f.iter_mut().zip(&sum[i][j]) {
                    *fk += (q * e).re;
                }
            }
        }
        f
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn table() -> QtfTable {
        let c = |re: f64, im: f64| [Complex64::new(re, im); 6];
        QtfTable {
            frequencies: vec![0.5, 1.0],
            headings: vec![0.],
            difference: vec![vec![vec![c(2., 0.), c(0., 0.)], vec![c(1., 0.5), c(4., 0.)]]],
            sum: Some(vec![vec![vec![c(1., 0.), c(0., 0.)], vec![c(3., 0.), c(1., 0.)]]]),
            one_sided: true,
        }
    }

    fn components() -> Vec<WaveComponent> {
        vec![
            WaveComponent::new(1., 0.5, 0.3, 0., 200., 9.80665),
            WaveComponent::new(0.5, 1.0, 1.1, 0., 200., 9.80665),
        ]
    }

    #[test]
    fn test_mean_drift() {
        let comps = components();
        let qtf = SecondOrderForce::new(&table(), &comps, QtfMethod::MeanDrift, false);
        // 1^2 * 2 + 0.5^2 * 4, constant in time
        for t in [0., 3., 17.] {
            assert_relative_eq!(qtf.difference_force(&comps, 0., 0., t)[0], 3., epsilon = 1e-12);
        }
        assert_eq!(qtf.sum_force(&comps, 0., 0., 1.), [0.; 6]);
    }

    #[test]
    fn test_full_difference_is_hermitian_sum() {
        let comps = components();
        let qtf = SecondOrderForce::new(&table(), &comps, QtfMethod::Full, false);
        let t = 2.;
        let dtheta = comps[0].theta(0., 0., t) - comps[1].theta(0., 0., t);
        let q10 = Complex64::new(1., 0.5);
        // Mean drift plus twice the real part of the off-diagonal pair
        let a = comps[0].amplitude * comps[1].amplitude;
        let slow = 2. * (q10.conj() * Complex64::from_polar(a, dtheta)).re;
        assert_relative_eq!(
            qtf.difference_force(&comps, 0., 0., t)[2],
            3. + slow,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_newman_matches_explicit_double_sum() {
        let comps = components();
        let qtf = SecondOrderForce::new(&table(), &comps, QtfMethod::Newman, false);
        let t = 4.5;
        let d = [2., 4.];
        let mut exp = 0.;
        for i in 0..2 {
            for j in 0..2 {
                let a = comps[i].amplitude * comps[j].amplitude;
                let dt = comps[i].theta(0., 0., t) - comps[j].theta(0., 0., t);
                exp += a * 0.5 * (d[i] + d[j]) * dt.cos();
            }
        }
        assert_relative_eq!(qtf.difference_force(&comps, 0., 0., t)[1], exp, epsilon = 1e-12);
    }

    #[test]
    fn test_sum_frequency() {
        let comps = components();
        let qtf = SecondOrderForce::new(&table(), &comps, QtfMethod::MeanDrift, true);
        let t = 1.5;
        let th = comps.iter().map(|c| c.theta(0., 0., t)).collect::<Vec<_>>();
        let exp = 1. * (2. * th[0]).cos()
            + 0.25 * (2. * th[1]).cos()
            + 2. * 0.5 * 3. * (th[0] + th[1]).cos();
        assert_relative_eq!(qtf.sum_force(&comps, 0., 0., t)[0], exp, epsilon = 1e-12);
    }
}
