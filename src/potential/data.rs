use num_complex::Complex64;
use serde::Deserialize;

use crate::{error::ConfigError, interp::is_strictly_ascending};

pub type Mat6 = [[f64; 6]; 6];
/// Complex force per degree of freedom
pub type Rao6 = [Complex64; 6];

/// First-order wave excitation transfer functions, force per unit amplitude
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ExcitationTable {
    /// Angular frequencies (rad/s)
    pub frequencies: Vec<f64>,
    /// Wave headings (rad)
    pub headings: Vec<f64>,
    /// `[frequency][heading]`
    pub coefficients: Vec<Vec<Rao6>>,
}

/// Second-order quadratic transfer functions, force per unit amplitude squared
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QtfTable {
    pub frequencies: Vec<f64>,
    pub headings: Vec<f64>,
    /// Difference-frequency coefficients `[heading][i][j]`
    pub difference: Vec<Vec<Vec<Rao6>>>,
    /// Sum-frequency coefficients `[heading][i][j]`
    #[serde(default)]
    pub sum: Option<Vec<Vec<Vec<Rao6>>>>,
    /// Only entries with `frequencies[i] >= frequencies[j]` are given
    #[serde(default)]
    pub one_sided: bool,
}

/// Frequency-domain hydrodynamic coefficients of one floating body, expressed
/// in global axes about the body reference point
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PotentialFlowData {
    pub name: String,
    /// Angular frequencies (rad/s) of the radiation coefficients
    pub frequencies: Vec<f64>,
    pub added_mass: Vec<Mat6>,
    pub damping: Vec<Mat6>,
    pub added_mass_infinite: Mat6,
    #[serde(default)]
    pub hydrostatic_stiffness: Option<Mat6>,
    #[serde(default)]
    pub excitation: Option<ExcitationTable>,
    #[serde(default)]
    pub qtf: Option<QtfTable>,
}

/// Tables a run needs from a dataset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Requirements {
    pub excitation: bool,
    pub qtf: bool,
    pub sum_frequency: bool,
    pub hydrostatics: bool,
}

fn table_error(table: String, details: impl Into<String>) -> ConfigError {
    ConfigError::CoefficientTable {
        table,
        details: details.into(),
    }
}

fn check_grid(table: &str, name: &str, grid: &[f64], positive: bool) -> Result<(), ConfigError> {
    if grid.is_empty() {
        return Err(table_error(table.to_string(), format!("empty {name} grid")));
    }
    if !is_strictly_ascending(grid) {
        return Err(table_error(
            table.to_string(),
            format!("{name} grid is not strictly ascending"),
        ));
    }
    if positive && grid[0] < 0. {
        return Err(table_error(
            table.to_string(),
            format!("negative {name} {}", grid[0]),
        ));
    }
    Ok(())
}

fn check_mat6(table: &str, m: &Mat6) -> Result<(), ConfigError> {
    if m.iter().flatten().any(|v| !v.is_finite()) {
        return Err(table_error(table.to_string(), "non-finite coefficient"));
    }
    Ok(())
}

fn check_rao(table: &str, r: &Rao6) -> Result<(), ConfigError> {
    if r.iter().any(|c| !(c.re.is_finite() && c.im.is_finite())) {
        return Err(table_error(table.to_string(), "non-finite coefficient"));
    }
    Ok(())
}

impl ExcitationTable {
    pub fn validate(&self, body: &str) -> Result<(), ConfigError> {
        let table = format!("{body}/excitation");
        check_grid(&table, "frequency", &self.frequencies, true)?;
        check_grid(&table, "heading", &self.headings, false)?;
        if self.coefficients.len() != self.frequencies.len()
            || self
                .coefficients
                .iter()
                .any(|row| row.len() != self.headings.len())
        {
            return Err(table_error(
                table,
                format!(
                    "expected {} x {} coefficients",
                    self.frequencies.len(),
                    self.headings.len()
                ),
            ));
        }
        self.coefficients
            .iter()
            .flatten()
            .try_for_each(|r| check_rao(&table, r))
    }
}

impl QtfTable {
    pub fn validate(&self, body: &str, require_sum: bool) -> Result<(), ConfigError> {
        let table = format!("{body}/qtf");
        check_grid(&table, "frequency", &self.frequencies, true)?;
        check_grid(&table, "heading", &self.headings, false)?;
        let n = self.frequencies.len();
        let check = |name: &str, data: &Vec<Vec<Vec<Rao6>>>| {
            let shape_ok = data.len() == self.headings.len()
                && data
                    .iter()
                    .all(|m| m.len() == n && m.iter().all(|row| row.len() == n));
            if !shape_ok {
                return Err(table_error(
                    table.clone(),
                    format!("{name} must be {} x {n} x {n}", self.headings.len()),
                ));
            }
            data.iter()
                .flatten()
                .flatten()
                .try_for_each(|r| check_rao(&table, r))
        };
        check("difference", &self.difference)?;
        match &self.sum {
            Some(sum) => check("sum", sum)?,
            None if require_sum => {
                return Err(ConfigError::MissingTable {
                    table: "sum-frequency QTF",
                    required_by: "second-order sum-frequency forces",
                })
            }
            None => {}
        }
        Ok(())
    }

    /// Completes a one-sided table. Difference coefficients are Hermitian,
    /// `Q(j, i) = conj(Q(i, j))`; sum coefficients are symmetric.
    pub fn filled(&self) -> QtfTable {
        if !self.one_sided {
            return self.clone();
        }
        let n = self.frequencies.len();
        let fill = |data: &Vec<Vec<Vec<Rao6>>>, conjugate: bool| -> Vec<Vec<Vec<Rao6>>> {
            data.iter()
                .map(|m| {
                    (0..n)
                        .map(|i| {
                            (0..n)
                                .map(|j| {
                                    if self.frequencies[i] >= self.frequencies[j] {
                                        m[i][j]
                                    } else if conjugate {
                                        m[j][i].map(|c| c.conj())
                                    } else {
                                        m[j][i]
                                    }
                                })
                                .collect()
                        })
                        .collect()
                })
                .collect()
        };
        QtfTable {
            frequencies: self.frequencies.clone(),
            headings: self.headings.clone(),
            difference: fill(&self.difference, true),
            sum: self.sum.as_ref().map(|s| fill(s, false)),
            one_sided: false,
        }
    }
}

impl PotentialFlowData {
    /// Rejects malformed or missing tables. Never substitutes zero coefficients.
    pub fn validate(&self, required: &Requirements) -> Result<(), ConfigError> {
        let table = format!("{}/radiation", self.name);
        check_grid(&table, "frequency", &self.frequencies, true)?;
        let n = self.frequencies.len();
        if self.added_mass.len() != n || self.damping.len() != n {
            return Err(table_error(
                table,
                format!(
                    "{n} frequencies but {} added mass and {} damping matrices",
                    self.added_mass.len(),
                    self.damping.len()
                ),
            ));
        }
        self.added_mass
            .iter()
            .chain(&self.damping)
            .chain(std::iter::once(&self.added_mass_infinite))
            .try_for_each(|m| check_mat6(&table, m))?;

        match (&self.hydrostatic_stiffness, required.hydrostatics) {
            (Some(c), _) => check_mat6(&format!("{}/hydrostatics", self.name), c)?,
            (None, true) => {
                return Err(ConfigError::MissingTable {
                    table: "hydrostatic stiffness",
                    required_by: "hydrostatic restoring",
                })
            }
            (None, false) => {}
        }
        match (&self.excitation, required.excitation) {
            (Some(x), _) => x.validate(&self.name)?,
            (None, true) => {
                return Err(ConfigError::MissingTable {
                    table: "excitation",
                    required_by: "diffraction forces",
                })
            }
            (None, false) => {}
        }
        match (&self.qtf, required.qtf) {
            (Some(q), _) => q.validate(&self.name, required.sum_frequency)?,
            (None, true) => {
                return Err(ConfigError::MissingTable {
                    table: "QTF",
                    required_by: "second-order wave forces",
                })
            }
            (None, false) => {}
        }
        Ok(())
    }
}
