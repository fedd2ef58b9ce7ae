//! One isolated rhai environment per effect invocation.
//!
//! Types:
//!
//! - `PreparedEffect` is an effect with its preload files already resolved to
//!   text. It is plain data, so parallel evaluation can hand it to several
//!   workers that each bind their own context.
//! - `ExecutionContext` owns a rhai `Engine`, the scope left behind by the
//!   preloads (frozen as constants) plus step parameters, and the compiled
//!   per-pixel program. It is created, used and dropped inside one apply call.
//!
//! Functions:
//!
//! - `ExecutionContext::bind` runs preloads in declared order and compiles the
//!   effect source.
//! - `ExecutionContext::invoke` evaluates the program for a single pixel.
use effects::{resolve_preloads, PreloadScript, TransformUnit, UnitStore};
use rhai::{Dynamic, Engine, EvalAltResult, ParseError, Position, Scope, AST, INT};
use tracing::debug;

use crate::error::EngineError;
use crate::evaluator::Deadline;
use crate::grid::Rgba;
use crate::marshal::{map_to_pixel, pixel_to_map};
use crate::params::Params;

#[derive(Debug, Clone)]
pub struct PreparedEffect {
    id: String,
    source: String,
    preloads: Vec<PreloadScript>,
}

impl PreparedEffect {
    pub fn prepare(unit: &TransformUnit, store: &dyn UnitStore) -> Result<Self, EngineError> {
        let preloads = resolve_preloads(unit, store)?;
        Ok(Self::from_parts(unit.id(), unit.source(), preloads))
    }

    pub fn from_parts(
        id: impl Into<String>,
        source: impl Into<String>,
        preloads: Vec<PreloadScript>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            preloads,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn preloads(&self) -> &[PreloadScript] {
        &self.preloads
    }
}

pub struct ExecutionContext {
    effect: String,
    engine: Engine,
    scope: Scope<'static>,
    program: AST,
    deadline: Option<Deadline>,
}

impl ExecutionContext {
    pub fn bind(
        effect: &PreparedEffect,
        params: &Params,
        deadline: Option<Deadline>,
    ) -> Result<Self, EngineError> {
        let engine = build_engine(effect.id(), deadline);
        let mut scope = Scope::new();
        let mut functions = AST::empty();

        for script in effect.preloads() {
            debug!(effect = effect.id(), file = %script.file, origin = ?script.origin, "running preload");
            let preload_error = |message: String| EngineError::Preload {
                effect: effect.id().to_string(),
                file: script.file.clone(),
                message,
            };
            let ast = engine
                .compile(&script.source)
                .map_err(|err| preload_error(describe_parse_error(&err)))?;
            let runnable = functions.merge(&ast);
            engine
                .run_ast_with_scope(&mut scope, &runnable)
                .map_err(|err| {
                    if is_terminated(&err) {
                        cancelled(effect.id(), deadline)
                    } else {
                        preload_error(err.to_string())
                    }
                })?;
            functions = functions.merge(&ast.clone_functions_only());
        }

        // Preload state is visible to the procedure but read-only, so no pixel
        // can observe another pixel's writes.
        let mut frozen = Scope::new();
        for (name, _, value) in scope.iter() {
            frozen.push_constant_dynamic(name, value);
        }
        for (name, value) in params {
            frozen.push_constant_dynamic(name.as_str(), value.to_dynamic());
        }

        let main = engine
            .compile(effect.source())
            .map_err(|err| EngineError::Compile {
                effect: effect.id().to_string(),
                message: describe_parse_error(&err),
            })?;
        let program = functions.merge(&main);

        debug!(
            effect = effect.id(),
            preloads = effect.preloads().len(),
            params = params.len(),
            "bound execution context"
        );
        Ok(Self {
            effect: effect.id().to_string(),
            engine,
            scope: frozen,
            program,
            deadline,
        })
    }

    pub fn invoke(&mut self, x: u32, y: u32, pixel: Rgba) -> Result<Rgba, EngineError> {
        let checkpoint = self.scope.len();
        self.scope
            .push_constant("x", x as INT)
            .push_constant("y", y as INT)
            .push("pixel", pixel_to_map(pixel));
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &self.program);
        self.scope.rewind(checkpoint);

        let value = result.map_err(|err| {
            if is_terminated(&err) {
                cancelled(&self.effect, self.deadline)
            } else {
                EngineError::Evaluation {
                    effect: self.effect.clone(),
                    x,
                    y,
                    message: err.to_string(),
                }
            }
        })?;

        map_to_pixel(value).map_err(|reason| EngineError::InvalidReturn {
            effect: self.effect.clone(),
            x,
            y,
            reason,
        })
    }

    pub fn effect(&self) -> &str {
        &self.effect
    }
}

fn build_engine(effect: &str, deadline: Option<Deadline>) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(128, 64);

    let print_effect = effect.to_string();
    engine.on_print(move |text| {
        tracing::info!(target: "pixelfx::script", effect = %print_effect, "{text}");
    });
    let debug_effect = effect.to_string();
    engine.on_debug(move |text, source, pos| {
        tracing::debug!(
            target: "pixelfx::script",
            effect = %debug_effect,
            source = source.unwrap_or_default(),
            position = %describe_position(pos),
            "{text}"
        );
    });

    if let Some(deadline) = deadline {
        engine.on_progress(move |ops| {
            if ops % 1024 == 0 && deadline.expired() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });
    }
    engine
}

fn cancelled(effect: &str, deadline: Option<Deadline>) -> EngineError {
    EngineError::Cancelled {
        effect: effect.to_string(),
        budget: deadline.map(|d| d.budget()).unwrap_or_default(),
    }
}

fn is_terminated(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_terminated(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => is_terminated(inner),
        _ => false,
    }
}

fn describe_parse_error(err: &ParseError) -> String {
    let pos = err.position();
    if pos.is_none() {
        err.to_string()
    } else {
        format!("{} ({})", err.err_type(), describe_position(pos))
    }
}

fn describe_position(pos: Position) -> String {
    match (pos.line(), pos.position()) {
        (Some(line), Some(column)) => format!("line {line}, column {column}"),
        (Some(line), None) => format!("line {line}"),
        _ => "unknown position".to_string(),
    }
}
