//! Per-pixel evaluation over a whole grid.
//!
//! Every pixel reads the *original* grid and writes into a scratch buffer;
//! the caller's grid is only replaced once every pixel has succeeded. With
//! more than one worker the scratch buffer is split into horizontal bands and
//! each band binds its own `ExecutionContext` on a rayon thread.
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::context::{ExecutionContext, PreparedEffect};
use crate::error::EngineError;
use crate::grid::PixelGrid;
use crate::params::Params;

#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    /// `1` evaluates on the calling thread, `0` uses one band per rayon
    /// thread, anything else splits the grid into that many bands.
    pub workers: usize,
    pub timeout: Option<Duration>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

pub fn apply_effect(
    effect: &PreparedEffect,
    params: &Params,
    grid: &mut PixelGrid,
    options: &EvalOptions,
) -> Result<(), EngineError> {
    let started = Instant::now();
    let deadline = options.timeout.map(Deadline::after);
    let workers = resolve_workers(options.workers, grid.height());

    let scratch = if grid.is_empty() {
        // Nothing to evaluate, but preload and compile faults still surface.
        ExecutionContext::bind(effect, params, deadline)?;
        Vec::new()
    } else if workers <= 1 {
        let mut scratch = vec![0u8; grid.as_raw().len()];
        evaluate_rows(effect, params, grid, 0, &mut scratch, deadline)?;
        scratch
    } else {
        evaluate_bands(effect, params, grid, workers, deadline)?
    };

    grid.commit(scratch);
    info!(
        effect = effect.id(),
        width = grid.width(),
        height = grid.height(),
        workers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "applied effect"
    );
    Ok(())
}

fn resolve_workers(requested: usize, height: u32) -> usize {
    let workers = if requested == 0 {
        rayon::current_num_threads()
    } else {
        requested
    };
    workers.clamp(1, (height as usize).max(1))
}

fn evaluate_bands(
    effect: &PreparedEffect,
    params: &Params,
    source: &PixelGrid,
    workers: usize,
    deadline: Option<Deadline>,
) -> Result<Vec<u8>, EngineError> {
    let row_len = source.width() as usize * 4;
    let rows_per_band = (source.height() as usize).div_ceil(workers);
    let mut scratch = vec![0u8; source.as_raw().len()];

    scratch
        .par_chunks_mut(rows_per_band * row_len)
        .enumerate()
        .try_for_each(|(band, out)| {
            let first_row = (band * rows_per_band) as u32;
            debug!(effect = effect.id(), band, first_row, rows = out.len() / row_len, "evaluating band");
            evaluate_rows(effect, params, source, first_row, out, deadline)
        })?;
    Ok(scratch)
}

/// Evaluates the rows starting at `first_row` into `out`, which holds
/// exactly those rows.
fn evaluate_rows(
    effect: &PreparedEffect,
    params: &Params,
    source: &PixelGrid,
    first_row: u32,
    out: &mut [u8],
    deadline: Option<Deadline>,
) -> Result<(), EngineError> {
    let mut context = ExecutionContext::bind(effect, params, deadline)?;
    let width = source.width();

    for (offset, row) in out.chunks_exact_mut(width as usize * 4).enumerate() {
        if deadline.is_some_and(|d| d.expired()) {
            return Err(EngineError::Cancelled {
                effect: context.effect().to_string(),
                budget: deadline.map(|d| d.budget()).unwrap_or_default(),
            });
        }
        let y = first_row + offset as u32;
        for (x, slot) in (0..width).zip(row.chunks_exact_mut(4)) {
            let result = context.invoke(x, y, source.pixel(x, y))?;
            slot.copy_from_slice(&result.to_array());
        }
    }
    Ok(())
}
