use std::sync::atomic::{AtomicUsize, Ordering};

use hydroaero::{
    error::SweepError,
    sweep::{run_sweep, CancelToken, SweepGrid},
};

#[test]
fn test_cancel_mid_sweep() {
    let grid = SweepGrid {
        wind_speeds: vec![4., 6., 8., 10., 12.],
        rotor_speeds: vec![5., 7.5],
        pitches: vec![0., 0.05],
    };
    assert_eq!(grid.len(), 20);

    let cancel = CancelToken::new();
    let done = AtomicUsize::new(0);
    let results = run_sweep(grid.cells(), 1, &cancel, |cell| {
        if done.fetch_add(1, Ordering::SeqCst) + 1 == 7 {
            cancel.cancel();
        }
        Ok::<_, SweepError>(cell.wind_speed * cell.rotor_speed)
    })
    .unwrap();

    assert!(results.cancelled);
    assert_eq!(results.results.iter().filter(|r| r.is_some()).count(), 7);
    assert_eq!(results.results.iter().filter(|r| r.is_none()).count(), 13);
    assert_eq!(results.n_completed(), 7);
    // Completed cells hold the values computed for them
    for (cell, value) in results.successes() {
        assert_eq!(*value, cell.wind_speed * cell.rotor_speed);
    }
}

#[test]
fn test_failed_cells_do_not_stop_the_sweep() {
    let grid = SweepGrid {
        wind_speeds: vec![4., 8.],
        rotor_speeds: vec![5.],
        pitches: vec![0., 0.1, 0.2],
    };
    let results = run_sweep(grid.cells(), 3, &CancelToken::new(), |cell| {
        if cell.pitch > 0.15 {
            Err(SweepError::Panicked(cell.index))
        } else {
            Ok(cell.index)
        }
    })
    .unwrap();
    assert_eq!(results.n_completed(), 6);
    assert_eq!(results.successes().count(), 4);
}
