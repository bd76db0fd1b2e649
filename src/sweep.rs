//! Independent simulations over a grid of operating points, run on a bounded
//! worker pool.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use itertools::iproduct;
use log::{info, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Deserialize;

use crate::error::SweepError;

/// One operating point of a sweep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepCell {
    pub index: usize,
    /// Hub height wind speed (m/s)
    pub wind_speed: f64,
    /// Rotor speed (rpm)
    pub rotor_speed: f64,
    /// Collective pitch (rad)
    pub pitch: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SweepGrid {
    pub wind_speeds: Vec<f64>,
    pub rotor_speeds: Vec<f64>,
    pub pitches: Vec<f64>,
}

impl SweepGrid {
    /// Cartesian product, pitch varying fastest
    pub fn cells(&self) -> Vec<SweepCell> {
        iproduct!(&self.wind_speeds, &self.rotor_speeds, &self.pitches)
            .enumerate()
            .map(|(index, (&wind_speed, &rotor_speed, &pitch))| SweepCell {
                index,
                wind_speed,
                rotor_speed,
                pitch,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.wind_speeds.len() * self.rotor_speeds.len() * self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cooperative cancellation shared between the caller and the workers. Cells
/// check it before they start; running cells are not interrupted.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result slot of each cell, `None` for cells that never ran
pub struct SweepResults<T, E> {
    pub cells: Vec<SweepCell>,
    pub results: Vec<Option<Result<T, E>>>,
    pub cancelled: bool,
}

impl<T, E> SweepResults<T, E> {
    pub fn n_completed(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    /// Successful cells with their results
    pub fn successes(&self) -> impl Iterator<Item = (&SweepCell, &T)> {
        self.cells
            .iter()
            .zip(&self.results)
            .filter_map(|(c, r)| match r {
                Some(Ok(v)) => Some((c, v)),
                _ => None,
            })
    }
}

/// Runs `f` for every cell on a pool of `threads` workers (`0` for one per
/// core). A cell that panics yields `SweepError::Panicked` in its slot without
/// affecting the others.
pub fn run_sweep<T, E, F>(
    cells: Vec<SweepCell>,
    threads: usize,
    cancel: &CancelToken,
    f: F,
) -> Result<SweepResults<T, E>, SweepError>
where
    T: Send + Sync,
    E: Send + Sync + From<SweepError>,
    F: Fn(&SweepCell) -> Result<T, E> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| SweepError::Pool(e.to_string()))?;

    let n = cells.len();
    let slots = (0..n).map(|_| OnceLock::new()).collect::<Vec<_>>();
    let completed = AtomicUsize::new(0);
    info!("sweep started: {n} cells on {} workers", pool.current_num_threads());

    pool.install(|| {
        (0..n).into_par_iter().for_each(|i| {
            if cancel.is_cancelled() {
                return;
            }
            let result = catch_unwind(AssertUnwindSafe(|| f(&cells[i]))).unwrap_or_else(|_| {
                warn!("sweep cell {i} panicked");
                Err(E::from(SweepError::Panicked(i)))
            });
            // Each index is visited once, so the slot is always empty here
            let _ = slots[i].set(result);
            completed.fetch_add(1, Ordering::SeqCst);
        });
    });

    let cancelled = cancel.is_cancelled();
    let n_done = completed.load(Ordering::SeqCst);
    if cancelled {
        info!("sweep cancelled: {n_done} of {n} cells completed");
    } else {
        info!("sweep finished: {n_done} cells");
    }

    Ok(SweepResults {
        cells,
        results: slots.into_iter().map(OnceLock::into_inner).collect(),
        cancelled,
    })
}
