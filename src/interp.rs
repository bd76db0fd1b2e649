use interp::{interp, InterpMode};

//------------------------------------------------------------------------------
// Linear interpolation
//------------------------------------------------------------------------------

/// Linear interpolation of tabulated `y(x)`, holding the first/last value outside the grid
pub fn interp_clamped(x: &[f64], y: &[f64], xp: f64) -> f64 {
    interp(x, y, xp, &InterpMode::FirstLast)
}

/// Locates `xp` on an ascending grid, returning the bounding indices and the
/// interpolation weight of the upper index. Values outside the grid are clamped.
pub fn bracket(grid: &[f64], xp: f64) -> (usize, usize, f64) {
    let n = grid.len();
    if n == 1 || xp <= grid[0] {
        return (0, 0, 0.);
    }
    if xp >= grid[n - 1] {
        return (n - 1, n - 1, 0.);
    }
    let i = grid.partition_point(|&g| g <= xp).saturating_sub(1).min(n - 2);
    let w = (xp - grid[i]) / (grid[i + 1] - grid[i]);
    (i, i + 1, w)
}

/// Locates `xp` on a periodic grid of angles (radians) spanning a full circle.
/// The grid must be ascending and cover less than 2*pi.
pub fn bracket_periodic(grid: &[f64], xp: f64) -> (usize, usize, f64) {
    use std::f64::consts::TAU;
    let n = grid.len();
    if n == 1 {
        return (0, 0, 0.);
    }
    let x = grid[0] + (xp - grid[0]).rem_euclid(TAU);
    if x >= grid[n - 1] {
        // Between last point and first point + 2*pi
        let span = grid[0] + TAU - grid[n - 1];
        return (n - 1, 0, (x - grid[n - 1]) / span);
    }
    bracket(grid, x)
}

/// Returns the four (i, j, weight) corners for bilinear interpolation at `(x, y)`
pub fn bilinear_weights(
    (i0, i1, wx): (usize, usize, f64),
    (j0, j1, wy): (usize, usize, f64),
) -> [(usize, usize, f64); 4] {
    [
        (i0, j0, (1. - wx) * (1. - wy)),
        (i1, j0, wx * (1. - wy)),
        (i0, j1, (1. - wx) * wy),
        (i1, j1, wx * wy),
    ]
}

/// Checks that a grid is finite and strictly ascending
pub fn is_strictly_ascending(grid: &[f64]) -> bool {
    grid.iter().all(|v| v.is_finite()) && grid.windows(2).all(|w| w[1] > w[0])
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_interp_clamped() {
        let x = [0., 1., 2.];
        let y = [0., 10., 30.];
        assert_relative_eq!(interp_clamped(&x, &y, 0.5), 5.);
        assert_relative_eq!(interp_clamped(&x, &y, 1.5), 20.);
        assert_relative_eq!(interp_clamped(&x, &y, -1.), 0.);
        assert_relative_eq!(interp_clamped(&x, &y, 3.), 30.);
    }

    #[test]
    fn test_bracket() {
        struct Case {
            xp: f64,
            exp: (usize, usize, f64),
        }
        let grid = [0., 1., 3.];
        vec![
            Case {
                xp: -1.,
                exp: (0, 0, 0.),
            },
            Case {
                xp: 0.25,
                exp: (0, 1, 0.25),
            },
            Case {
                xp: 2.,
                exp: (1, 2, 0.5),
            },
            Case {
                xp: 5.,
                exp: (2, 2, 0.),
            },
        ]
        .iter()
        .for_each(|c| {
            let (i, j, w) = bracket(&grid, c.xp);
            assert_eq!((i, j), (c.exp.0, c.exp.1));
            assert_relative_eq!(w, c.exp.2, epsilon = 1e-14);
        });
    }

    #[test]
    fn test_bracket_periodic() {
        let grid = [0., PI / 2., PI, 3. * PI / 2.];
        let (i, j, w) = bracket_periodic(&grid, 7. * PI / 4.);
        assert_eq!((i, j), (3, 0));
        assert_relative_eq!(w, 0.5, epsilon = 1e-12);

        let (i, j, w) = bracket_periodic(&grid, -PI / 4.);
        assert_eq!((i, j), (3, 0));
        assert_relative_eq!(w, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_bilinear_weights_sum_to_one() {
        let w = bilinear_weights(bracket(&[0., 1.], 0.3), bracket(&[0., 2.], 1.5));
        let total: f64 = w.iter().map(|c| c.2).sum();
        assert_relative_eq!(total, 1., epsilon = 1e-14);
    }
}
