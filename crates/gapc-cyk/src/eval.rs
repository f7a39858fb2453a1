//! Reference evaluator for generated procedures.
//!
//! Runs a [`Procedure`] single-threaded over concrete sequence lengths and
//! reports every non-terminal evaluation call it reaches. Work-shared loops run
//! all of their iterations in one thread; each call records the loop instance
//! and iteration it ran in, so a schedule can be checked for cells that
//! different threads could compute concurrently.
pub mod env;
pub mod error;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

pub use env::Env;
pub use error::EvalError;

use crate::{
    ast::{
        AssignOp, BinaryOp, Call, CallKind, Condition, Expr, ForLoop, Ident, Procedure, Step, Stmt,
        StmtId, StmtPool, VarDecl, VarType,
    },
    builtin::Builtins,
    model::GrammarModel,
};

const DEFAULT_MAX_STEPS: u64 = 50_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    /// Length of every input sequence, by sequence variable.
    pub sequences: FxHashMap<SmolStr, i64>,
    /// Preprocessor symbols and their values.
    pub defines: FxHashMap<SmolStr, i64>,
    /// Variables declared outside the procedure.
    pub globals: FxHashMap<SmolStr, i64>,
    pub max_steps: u64,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            sequences: FxHashMap::default(),
            defines: FxHashMap::default(),
            globals: FxHashMap::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl EvalOptions {
    /// Binds one length per track to the model's sequence variables.
    pub fn for_model(model: &GrammarModel, lengths: &[usize]) -> Result<Self, EvalError> {
        if lengths.len() != model.axiom.tracks {
            return Err(EvalError::LengthMismatch {
                lengths: lengths.len(),
                tracks: model.axiom.tracks,
            });
        }

        Ok(Self {
            sequences: model
                .sequences
                .iter()
                .cloned()
                .zip(lengths.iter().map(|&len| len as i64))
                .collect(),
            ..Default::default()
        })
    }

    pub fn define(self, symbol: impl Into<SmolStr>) -> Self {
        self.define_value(symbol, 1)
    }

    pub fn define_value(mut self, symbol: impl Into<SmolStr>, value: i64) -> Self {
        self.defines.insert(symbol.into(), value);
        self
    }

    pub fn with_global(mut self, name: impl Into<SmolStr>, value: i64) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Checkpoint state of a run that starts from scratch: nothing to load,
    /// every saved index at zero and, for outside grammars, the inside sweep
    /// still pending.
    pub fn with_fresh_checkpoint(self, model: &GrammarModel, builtins: &Builtins) -> Self {
        let indices = model
            .indices
            .iter()
            .flat_map(|indices| [indices.left.clone(), indices.right.clone()])
            .chain(
                builtins
                    .tiled_progress_indices()
                    .into_iter()
                    .cloned(),
            )
            .collect::<Vec<_>>();

        let options = indices
            .into_iter()
            .fold(self.with_global(builtins.load_checkpoint.clone(), 0), |options, index| {
                options.with_global(index, 0)
            });
        if model.options.outside {
            options.with_global(builtins.outside_phase.clone(), 0)
        } else {
            options
        }
    }
}

/// Position of a call within a work-shared loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkShare {
    /// Distinct for every entry into a work-shared loop.
    pub instance: usize,
    pub iteration: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtCall {
    pub routine: SmolStr,
    pub args: Vec<i64>,
    pub work_share: Option<WorkShare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalStats {
    pub calls: usize,
    pub steps: u64,
}

struct Evaluator<'a, F> {
    builtins: &'a Builtins,
    options: &'a EvalOptions,
    pool: &'a StmtPool,
    env: Env,
    on_call: F,
    lock_depth: usize,
    next_instance: usize,
    work_share: Option<WorkShare>,
    stats: EvalStats,
}

/// Executes `procedure`, handing every evaluation call to `on_call` in order.
pub fn eval_procedure<F>(
    procedure: &Procedure,
    builtins: &Builtins,
    options: &EvalOptions,
    on_call: F,
) -> Result<EvalStats, EvalError>
where
    F: FnMut(&NtCall),
{
    let mut evaluator = Evaluator {
        builtins,
        options,
        pool: &procedure.pool,
        env: Env::new(options.globals.clone()),
        on_call,
        lock_depth: 0,
        next_instance: 0,
        work_share: None,
        stats: EvalStats::default(),
    };

    evaluator.env.push_scope();
    evaluator.exec_body(&procedure.body)?;
    if evaluator.lock_depth != 0 {
        return Err(EvalError::UnbalancedLock(evaluator.lock_depth));
    }

    debug!(
        calls = evaluator.stats.calls,
        steps = evaluator.stats.steps,
        "evaluated {}",
        procedure.name
    );
    Ok(evaluator.stats)
}

/// Every evaluation call of `procedure`, in execution order.
pub fn collect_calls(
    procedure: &Procedure,
    builtins: &Builtins,
    options: &EvalOptions,
) -> Result<Vec<NtCall>, EvalError> {
    let mut calls = Vec::new();
    eval_procedure(procedure, builtins, options, |call| calls.push(call.clone()))?;
    Ok(calls)
}

impl<F> Evaluator<'_, F>
where
    F: FnMut(&NtCall),
{
    fn tick(&mut self) -> Result<(), EvalError> {
        self.stats.steps += 1;
        if self.stats.steps > self.options.max_steps {
            Err(EvalError::StepLimitExceeded(self.options.max_steps))
        } else {
            Ok(())
        }
    }

    fn exec_body(&mut self, body: &[StmtId]) -> Result<(), EvalError> {
        body.iter().try_for_each(|&id| self.exec(id))
    }

    fn scoped(&mut self, body: &[StmtId]) -> Result<(), EvalError> {
        self.env.push_scope();
        let result = self.exec_body(body);
        self.env.pop_scope();
        result
    }

    fn exec(&mut self, id: StmtId) -> Result<(), EvalError> {
        self.tick()?;
        let pool = self.pool;
        match pool.get(id) {
            Stmt::For(for_loop) => self.exec_loop(for_loop),
            Stmt::Block { body, .. } => self.scoped(body),
            Stmt::Call(call) => self.exec_call(call),
            Stmt::Assign { target, op, value } => {
                let value = self.eval(value)?;
                let value = match op {
                    AssignOp::Set => value,
                    AssignOp::Add => self.resolve(target)? + value,
                };
                self.env.assign(target, value)
            }
            Stmt::Decl(decl) => self.declare(decl),
            Stmt::Raw(_) => Ok(()),
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => match cond {
                Condition::Expr(cond) => {
                    if self.eval(cond)? != 0 {
                        self.scoped(then_body)
                    } else {
                        self.scoped(else_body)
                    }
                }
                // Preprocessor switches open no scope.
                Condition::Defined(symbol) if self.options.defines.contains_key(symbol) => {
                    self.exec_body(then_body)
                }
                Condition::NotDefined(symbol) if !self.options.defines.contains_key(symbol) => {
                    self.exec_body(then_body)
                }
                Condition::Defined(_) | Condition::NotDefined(_) => self.exec_body(else_body),
            },
        }
    }

    fn declare(&mut self, decl: &VarDecl) -> Result<(), EvalError> {
        let value = match &decl.init {
            Some(init) => self.eval(init)?,
            None => 0,
        };
        match decl.ty {
            VarType::Existing => self.env.assign(&decl.name, value),
            VarType::Size | VarType::Int => {
                self.env.define(decl.name.clone(), value);
                Ok(())
            }
        }
    }

    fn exec_loop(&mut self, for_loop: &ForLoop) -> Result<(), EvalError> {
        self.env.push_scope();
        let result = self.run_loop(for_loop);
        self.env.pop_scope();
        result
    }

    fn run_loop(&mut self, for_loop: &ForLoop) -> Result<(), EvalError> {
        self.declare(&for_loop.var)?;
        let var = &for_loop.var.name;

        let shared = for_loop.pragma.is_some_and(|pragma| pragma.is_work_sharing());
        let outer = self.work_share;
        let instance = self.next_instance;
        if shared {
            self.next_instance += 1;
        }

        let mut iteration = 0;
        while self.eval(&for_loop.cond)? != 0 {
            self.tick()?;
            if shared {
                self.work_share = Some(WorkShare {
                    instance,
                    iteration,
                });
            }
            let result = self.scoped(&for_loop.body);
            self.work_share = outer;
            result?;

            let next = match &for_loop.step {
                Step::Increment => self.resolve(var)? + 1,
                Step::Decrement => self.resolve(var)? - 1,
                Step::Add(expr) => self.resolve(var)? + self.eval(expr)?,
            };
            self.env.assign(var, next)?;
            iteration += 1;
        }
        Ok(())
    }

    fn exec_call(&mut self, call: &Call) -> Result<(), EvalError> {
        let args = call
            .args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;

        match (call.kind, &call.receiver) {
            (CallKind::NonTerminal, _) => {
                self.stats.calls += 1;
                (self.on_call)(&NtCall {
                    routine: call.name.clone(),
                    args,
                    work_share: self.work_share,
                });
                Ok(())
            }
            (CallKind::Runtime, Some(receiver)) if *receiver == self.builtins.mutex => {
                if call.name == self.builtins.lock_shared {
                    self.lock_depth += 1;
                    Ok(())
                } else if call.name == self.builtins.unlock_shared {
                    self.lock_depth = self
                        .lock_depth
                        .checked_sub(1)
                        .ok_or(EvalError::UnlockWithoutLock)?;
                    Ok(())
                } else {
                    Err(EvalError::UnknownFunction(call.name.clone()))
                }
            }
            (CallKind::Runtime, None) if call.name == self.builtins.assert => {
                match call.args.iter().zip(args).find(|(_, value)| *value == 0) {
                    Some((arg, _)) => Err(EvalError::AssertionFailed(arg.to_string())),
                    None => Ok(()),
                }
            }
            (CallKind::Runtime, _) => Err(EvalError::UnknownFunction(call.name.clone())),
        }
    }

    fn resolve(&self, name: &Ident) -> Result<i64, EvalError> {
        self.env
            .resolve(name)
            .or_else(|| self.options.defines.get(name).copied())
            .ok_or_else(|| EvalError::Undefined(name.clone()))
    }

    fn eval(&mut self, expr: &Expr) -> Result<i64, EvalError> {
        match expr {
            Expr::Int(value) => Ok(*value),
            Expr::Var(name) => self.resolve(name),
            Expr::PostIncrement(name) => {
                let value = self.resolve(name)?;
                self.env.assign(name, value + 1)?;
                Ok(value)
            }
            Expr::MethodCall {
                receiver, method, ..
            } => {
                if *method != self.builtins.size {
                    return Err(EvalError::UnknownFunction(method.clone()));
                }
                self.options
                    .sequences
                    .get(receiver)
                    .copied()
                    .ok_or_else(|| EvalError::UnknownSequence(receiver.clone()))
            }
            Expr::Not(operand) => Ok(i64::from(self.eval(operand)? == 0)),
            Expr::Cond(cond, then, otherwise) => {
                if self.eval(cond)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if self.eval(lhs)? != 0 {
                    Ok(1)
                } else {
                    Ok(i64::from(self.eval(rhs)? != 0))
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs_value = self.eval(rhs)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs_value),
                    BinaryOp::Sub => Ok(lhs - rhs_value),
                    BinaryOp::Mul => Ok(lhs * rhs_value),
                    BinaryOp::Div if rhs_value == 0 => Err(EvalError::DivisionByZero(expr.to_string())),
                    BinaryOp::Div => Ok(lhs / rhs_value),
                    BinaryOp::Less => Ok(i64::from(lhs < rhs_value)),
                    BinaryOp::Greater => Ok(i64::from(lhs > rhs_value)),
                    BinaryOp::Or => Ok(i64::from(lhs != 0 || rhs_value != 0)),
                }
            }
        }
    }
}
