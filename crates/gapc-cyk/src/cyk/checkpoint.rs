use smol_str::SmolStr;

use super::{CykBuilder, TraversalMode};
use crate::ast::{Body, Expr, Stmt, StmtId, VarDecl, VarType};

impl CykBuilder<'_> {
    /// `int idx_loaded = !load_checkpoint || !idx;` for both running indices of
    /// every track.
    ///
    /// A marker starts out true unless a checkpoint is being restored and the
    /// saved index has progressed past its default. Outside generation adds a
    /// second set for the outside sweep, which only restores indices saved
    /// after the inside sweep finished.
    pub(super) fn loaded_markers(&mut self) -> Body {
        let model = self.model;
        let indices = model
            .indices
            .iter()
            .flat_map(|indices| [&indices.left, &indices.right])
            .collect::<Vec<_>>();

        let mut markers = indices
            .iter()
            .map(|index| self.loaded_marker(index))
            .collect::<Vec<_>>();
        if model.options.outside {
            markers.extend(indices.iter().map(|index| self.outside_loaded_marker(index)));
        }

        markers
            .into_iter()
            .map(|marker| self.pool.alloc(Stmt::Decl(marker)))
            .collect()
    }

    fn outside_loaded_marker(&self, index: &SmolStr) -> VarDecl {
        VarDecl::new(
            VarType::Int,
            self.builtins.outside_loaded(index),
            self.phase_not_restored()
                .or(Expr::var(index.clone()).not()),
        )
    }

    /// `!load_checkpoint || !outside_phase`: true unless a run is resumed
    /// after its inside sweep.
    pub(super) fn phase_not_restored(&self) -> Expr {
        Expr::var(self.builtins.load_checkpoint.clone())
            .not()
            .or(Expr::var(self.builtins.outside_phase.clone()).not())
    }

    /// Ends the inside sweep of an outside run: every saved index goes back to
    /// zero and the phase flag is set, under the lock so that no checkpoint
    /// sees half of the switch.
    pub(super) fn outside_phase_switch(&mut self) -> StmtId {
        let builtins = self.builtins;
        let model = self.model;
        let mut stmts = vec![self.pool.alloc(Stmt::raw(builtins.lock_guard.clone()))];
        for index in model.indices.iter().flat_map(|indices| [&indices.left, &indices.right]) {
            stmts.push(self.pool.alloc(Stmt::assign(index.clone(), Expr::int(0))));
        }
        stmts.push(
            self.pool
                .alloc(Stmt::assign(builtins.outside_phase.clone(), Expr::int(1))),
        );
        self.pool.alloc(Stmt::block(stmts, None))
    }

    fn loaded_marker(&self, index: &SmolStr) -> VarDecl {
        VarDecl::new(
            VarType::Int,
            self.builtins.loaded(index),
            Expr::var(self.builtins.load_checkpoint.clone())
                .not()
                .or(Expr::var(index.clone()).not()),
        )
    }

    /// Start expression of a checkpointed loop: the saved index on the first
    /// entry after a restore, `start` on every other entry.
    pub(super) fn resumable(&self, index: &SmolStr, start: Expr, mode: TraversalMode) -> Expr {
        let marker = match mode {
            TraversalMode::Outside => self.builtins.outside_loaded(index),
            TraversalMode::Inside | TraversalMode::TiledParallel | TraversalMode::TiledSerial => {
                self.builtins.loaded(index)
            }
        };
        Expr::cond(Expr::post_increment(marker), start, Expr::var(index.clone()))
    }

    /// Markers and saved starts for the three tiled progress indices.
    pub(super) fn tiled_checkpoint_header(&mut self) -> Body {
        let builtins = self.builtins;
        let [outer_1, outer_2, inner_2] = builtins.tiled_progress_indices();

        let mut decls = builtins
            .tiled_progress_indices()
            .into_iter()
            .map(|index| self.loaded_marker(index))
            .collect::<Vec<_>>();
        decls.push(VarDecl::new(
            VarType::Int,
            builtins.start(outer_1),
            self.resumable(outer_1, Expr::int(0), TraversalMode::TiledParallel),
        ));
        decls.push(VarDecl::new(
            VarType::Int,
            builtins.start(outer_2),
            self.resumable(
                outer_2,
                Expr::var(builtins.tile_size.clone()),
                TraversalMode::TiledParallel,
            ),
        ));
        decls.push(VarDecl::new(
            VarType::Int,
            builtins.start(inner_2),
            Expr::var(inner_2.clone()),
        ));

        decls
            .into_iter()
            .map(|decl| self.pool.alloc(Stmt::Decl(decl)))
            .collect()
    }
}
