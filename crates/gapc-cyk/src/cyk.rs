//! Generation of the bottom-up table-filling procedure.
//!
//! The procedure is assembled from empty loop skeletons (one per traversal
//! flavour), which are then decorated with non-terminal evaluation calls at the
//! nesting depth matching each table's dimensionality.
mod checkpoint;
mod inject;
mod loops;
mod tiled;
mod traversal;

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::{
    ast::{Body, Condition, Expr, Pragma, Procedure, Stmt, StmtPool},
    builtin::Builtins,
    error::CykError,
    model::{GrammarModel, NonTerminal, Parallel, TableDims},
};

use loops::Axis;

/// How a loop nest walks the DP matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Single-threaded sweep from the diagonal towards row 0.
    Inside,
    /// Single-threaded sweep from whole-input spans inwards.
    Outside,
    /// Tile borders and tile interiors shared among worker threads.
    TiledParallel,
    /// The columns a tiled run leaves over, computed by one thread.
    TiledSerial,
}

pub(crate) struct CykBuilder<'a> {
    model: &'a GrammarModel,
    builtins: &'a Builtins,
    pool: StmtPool,
    checkpoint: bool,
}

impl<'a> CykBuilder<'a> {
    pub(crate) fn new(model: &'a GrammarModel, builtins: &'a Builtins) -> Result<Self, CykError> {
        model.validate()?;

        let tracks = model.axiom.tracks;
        if model.sequences.len() != tracks {
            return Err(CykError::TrackMismatch {
                sequences: model.sequences.len(),
                tracks,
            });
        }
        if model.indices.len() != tracks {
            return Err(CykError::IndexMismatch {
                indices: model.indices.len(),
                tracks,
            });
        }

        Ok(Self {
            model,
            builtins,
            pool: StmtPool::new(),
            checkpoint: model.options.checkpoint,
        })
    }

    pub(crate) fn with_pool(mut self, pool: StmtPool) -> Self {
        self.pool = pool;
        self
    }

    pub(crate) fn finish(self, body: Body) -> Procedure {
        Procedure::new(self.builtins.procedure.clone(), self.pool, body)
    }

    fn build(&mut self) -> Result<Body, CykError> {
        if !self.model.options.cyk {
            debug!("bottom-up evaluation not requested, emitting an empty procedure");
            return Ok(Vec::new());
        }

        let mut body = Vec::new();
        if self.checkpoint {
            body.extend(self.loaded_markers());
        }

        let single = self.single_thread_branch()?;
        if self.tiled_enabled()? {
            let parallel = self.parallel_branch();
            body.push(self.pool.alloc(Stmt::If {
                cond: Condition::NotDefined(self.builtins.openmp_macro.clone()),
                then_body: single,
                else_body: parallel,
            }));
        } else {
            body.extend(single);
        }

        Ok(body)
    }

    fn single_thread_branch(&mut self) -> Result<Body, CykError> {
        let model = self.model;
        if !model.options.outside {
            let nts = model.tabulated().collect::<Vec<_>>();
            let skeleton = self.traversal(TraversalMode::Inside);
            return Ok(self.decorate(skeleton, &nts, TraversalMode::Inside));
        }

        let (outside, inside): (Vec<_>, Vec<_>) = model.tabulated().partition(|nt| nt.outside);
        if let Some(nt) = outside.iter().find(|nt| !self.fits_outside_traversal(nt)) {
            return Err(CykError::ReducedTableInOutsideTraversal(nt.name.clone()));
        }
        debug!(
            inside = inside.len(),
            outside = outside.len(),
            "building inside and outside traversals"
        );

        let mut body = Vec::new();
        if !inside.is_empty() {
            let skeleton = self.traversal(TraversalMode::Inside);
            body.extend(self.decorate(skeleton, &inside, TraversalMode::Inside));
        }
        if self.checkpoint {
            // A run resumed during the outside sweep skips the inside sweep
            // and keeps the saved indices.
            body.push(self.outside_phase_switch());
            body = vec![self.pool.alloc(Stmt::If {
                cond: Condition::Expr(self.phase_not_restored()),
                then_body: body,
                else_body: Vec::new(),
            })];
        }
        let skeleton = self.traversal(TraversalMode::Outside);
        body.extend(self.decorate(skeleton, &outside, TraversalMode::Outside));
        Ok(body)
    }

    /// The outside sweep only places full tables spanning every track, plus
    /// constant tables after the sweep.
    fn fits_outside_traversal(&self, nt: &NonTerminal) -> bool {
        nt.dimension() == 0
            || (nt.first_track == 0
                && nt.tracks == self.model.axiom.tracks
                && nt.tables.iter().all(|dims| *dims == TableDims::QUADRATIC))
    }

    fn tiled_enabled(&self) -> Result<bool, CykError> {
        let options = &self.model.options;
        let tracks = self.model.axiom.tracks;
        let reduced = self.model.tabulated().find(|nt| nt.dimension() == 1);

        match options.parallel {
            Parallel::Off => Ok(false),
            Parallel::On => {
                if tracks > 1 {
                    Err(CykError::MultiTrackParallel(tracks))
                } else if options.outside {
                    Err(CykError::OutsideParallel)
                } else if let Some(nt) = reduced {
                    Err(CykError::ReducedTableInTiledSchedule(nt.name.clone()))
                } else {
                    Ok(true)
                }
            }
            Parallel::Auto => {
                if tracks > 1 || options.outside {
                    debug!(tracks, outside = options.outside, "tiled branch not applicable");
                    Ok(false)
                } else if let Some(nt) = reduced {
                    warn!(
                        nonterminal = %nt.name,
                        "single-index table cannot be tiled, emitting single-threaded code only"
                    );
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
        }
    }

    fn parallel_branch(&mut self) -> Body {
        let model = self.model;
        let nts = model.tabulated().collect::<Vec<_>>();
        let mut body = Vec::new();

        if self.checkpoint {
            body.extend(self.tile_computation(true));
            body.extend(self.tiled_checkpoint_header());
        }

        let mut block = self.tile_computation(false);
        block.push(
            self.pool
                .alloc(Stmt::raw("// OPENMP < 3 requires signed int here ...")),
        );
        let tiled = self.tiled_traversal();
        block.extend(self.decorate(tiled, &nts, TraversalMode::TiledParallel));
        block.push(self.pool.alloc(Stmt::raw("// end parallel")));
        body.push(self.pool.alloc(Stmt::block(block, Some(Pragma::Parallel))));

        body.extend(self.tile_computation(false));
        let serial = self.traversal(TraversalMode::TiledSerial);
        body.extend(self.decorate(serial, &nts, TraversalMode::TiledSerial));
        body
    }

    fn sequence(&self, track: usize) -> &'a SmolStr {
        let model: &'a GrammarModel = self.model;
        &model.sequences[track]
    }

    /// `seq.size()` of the given track.
    fn sequence_size(&self, track: usize) -> Expr {
        Expr::method_call(self.sequence(track).clone(), self.builtins.size.clone())
    }
}

/// Generates the table-filling procedure for `model`.
pub fn generate(model: &GrammarModel, builtins: &Builtins) -> Result<Procedure, CykError> {
    let mut builder = CykBuilder::new(model, builtins)?;
    let body = builder.build()?;
    let procedure = builder.finish(body);
    debug!(
        statements = procedure.pool.subtree_size(&procedure.body),
        "generated {}",
        procedure.name
    );
    Ok(procedure)
}

/// Builds the undecorated loop nest of one traversal flavour over every track.
pub fn skeleton(
    model: &GrammarModel,
    builtins: &Builtins,
    mode: TraversalMode,
) -> Result<Procedure, CykError> {
    let mut builder = CykBuilder::new(model, builtins)?;
    let body = match mode {
        TraversalMode::TiledParallel => builder.tiled_traversal(),
        _ => builder.traversal(mode),
    };
    Ok(builder.finish(body))
}

/// Places evaluation calls of every tabulated non-terminal into `procedure`.
///
/// Levels that already hold a call are left untouched, so decorating twice
/// yields the same procedure.
pub fn inject_calls(
    procedure: &mut Procedure,
    model: &GrammarModel,
    builtins: &Builtins,
    mode: TraversalMode,
) -> Result<(), CykError> {
    let pool = std::mem::take(&mut procedure.pool);
    let mut builder = CykBuilder::new(model, builtins)?.with_pool(pool);
    let nts = model.tabulated().collect::<Vec<_>>();
    let body = std::mem::take(&mut procedure.body);
    procedure.body = builder.decorate(body, &nts, mode);
    procedure.pool = builder.pool;
    Ok(())
}
