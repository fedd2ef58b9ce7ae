use std::time::Instant;

use effects::{resolve_preloads, PackError, UnitKind, UnitStore};
use engine::{apply_effect, EvalOptions, PixelGrid, PreparedEffect};
use tracing::{debug, info};

use crate::parser::{ChainProgram, ChainStep};
use crate::ChainError;

/// Runs every step of `program` over `grid` in order.
///
/// All effects are loaded and their preloads resolved before any pixel is
/// evaluated. Steps then run over a working copy, which replaces `grid` only
/// after the last step succeeds; on any error `grid` is left as it was.
pub fn apply_chain(
    program: &ChainProgram,
    store: &dyn UnitStore,
    grid: &mut PixelGrid,
    options: &EvalOptions,
) -> Result<(), ChainError> {
    let started = Instant::now();
    let prepared = program
        .steps()
        .iter()
        .enumerate()
        .map(|(index, step)| prepare_step(index + 1, step, store))
        .collect::<Result<Vec<_>, _>>()?;

    let mut working = grid.clone();
    for (index, (step, effect)) in program.steps().iter().zip(&prepared).enumerate() {
        info!(step = index + 1, effect = %step.effect, line = step.line, "running chain step");
        apply_effect(effect, &step.params, &mut working, options).map_err(|source| {
            ChainError::Step {
                step: index + 1,
                effect: step.effect.clone(),
                source,
            }
        })?;
    }

    *grid = working;
    info!(
        steps = program.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chain complete"
    );
    Ok(())
}

fn prepare_step(
    number: usize,
    step: &ChainStep,
    store: &dyn UnitStore,
) -> Result<PreparedEffect, ChainError> {
    let load_error = |source: PackError| match source {
        PackError::NotFound {
            kind: UnitKind::Effect,
            ..
        } => ChainError::UnknownEffect {
            step: number,
            effect: step.effect.clone(),
        },
        source => ChainError::Load {
            step: number,
            effect: step.effect.clone(),
            source,
        },
    };

    let unit = store.effect(&step.effect).map_err(load_error)?;
    let preloads = resolve_preloads(&unit, store).map_err(load_error)?;
    debug!(step = number, effect = unit.id(), preloads = preloads.len(), "prepared chain step");
    Ok(PreparedEffect::from_parts(unit.id(), unit.source(), preloads))
}
