//! Tiled schedule for shared-memory parallel evaluation of single-track
//! grammars.
//!
//! With `tile_size = 4` and an input of length 12, phase A fills the triangular
//! tiles on the diagonal, one tile per `z` iteration:
//!
//! ```text
//!     |  0   1   2   3   4   5   6   7   8   9  10  11  12
//! ----|----------------------------------------------------
//!   0 |  0   2   5   9
//!   1 |      1   4   8
//!   2 |          3   7
//!   3 |              6
//!   4 |                 10  12  15  19
//!   5 |                     11  14  18
//!   6 |                         13  17
//!   7 |                             16
//!   8 |                                 20  22  25  29
//!   9 |                                     21  24  28
//!  10 |                                         23  27
//!  11 |                                             26
//! ```
//!
//! Phase B then fills square tiles one tile diagonal `z` at a time; the tiles of
//! one diagonal (one per `y`) only read tiles closer to the main diagonal and
//! are shared among the worker threads:
//!
//! ```text
//!     |  0   1   2   3   4   5   6   7   8   9  10  11  12
//! ----|----------------------------------------------------
//!   0 |                 33  37  41  45  65  69  73  77
//!   1 |                 32  36  40  44  64  68  72  76
//!   2 |                 31  35  39  43  63  67  71  75
//!   3 |                 30  34  38  42  62  66  70  74
//!   4 |                                 49  53  57  61
//!   5 |                                 48  52  56  60
//!   6 |                                 47  51  55  59
//!   7 |                                 46  50  54  58
//! ```
//!
//! Columns from `max_tiles_n` on are left to the serial remainder traversal.
use tracing::debug;

use super::{Axis, CykBuilder, TraversalMode};
use crate::ast::{Body, Call, Condition, Expr, Pragma, Stmt, StmtId, VarDecl, VarType};

impl CykBuilder<'_> {
    /// Declares `tile_size`, `max_tiles` and `max_tiles_n`.
    ///
    /// With checkpointing, `tile_size` is declared once at procedure scope
    /// (`just_tile_size`) and the other computations only refer to it.
    pub(super) fn tile_computation(&mut self, just_tile_size: bool) -> Body {
        let builtins = self.builtins;
        let tile_size = Expr::var(builtins.tile_size.clone());
        let mut stmts = Vec::new();

        if !self.checkpoint || just_tile_size {
            stmts.push(self.pool.alloc(Stmt::Decl(VarDecl::new(
                VarType::Size,
                builtins.tile_size.clone(),
                Expr::int(i64::from(self.model.options.tile_size)),
            ))));
            let tile_size_override = self.pool.alloc(Stmt::assign(
                builtins.tile_size.clone(),
                Expr::var(builtins.tile_size_macro.clone()),
            ));
            stmts.push(self.pool.alloc(Stmt::If {
                cond: Condition::Defined(builtins.tile_size_macro.clone()),
                then_body: vec![tile_size_override],
                else_body: Vec::new(),
            }));
            if just_tile_size {
                return stmts;
            }
        }

        stmts.push(self.pool.alloc(Stmt::Call(Call::runtime(
            builtins.assert.clone(),
            vec![tile_size.clone()],
        ))));
        stmts.push(self.pool.alloc(Stmt::Decl(VarDecl::new(
            VarType::Size,
            builtins.max_tiles.clone(),
            self.sequence_size(0).div(tile_size.clone()),
        ))));
        stmts.push(self.pool.alloc(Stmt::Decl(VarDecl::new(
            VarType::Int,
            builtins.max_tiles_n.clone(),
            Expr::var(builtins.max_tiles.clone()).times(tile_size),
        ))));
        stmts
    }

    /// Phase A followed by phase B, both still without evaluation calls.
    pub(super) fn tiled_traversal(&mut self) -> Body {
        debug!(checkpoint = self.checkpoint, "building tiled traversal skeleton");
        vec![self.border_phase(), self.interior_phase()]
    }

    fn lock(&mut self) -> StmtId {
        let builtins = self.builtins;
        self.pool.alloc(Stmt::Call(Call::method(
            builtins.mutex.clone(),
            builtins.lock_shared.clone(),
        )))
    }

    fn unlock(&mut self) -> StmtId {
        let builtins = self.builtins;
        self.pool.alloc(Stmt::Call(Call::method(
            builtins.mutex.clone(),
            builtins.unlock_shared.clone(),
        )))
    }

    /// Phase A: the triangular tile on the diagonal at offset `z`.
    fn border_phase(&mut self) -> StmtId {
        let builtins = self.builtins;
        let indices = self.model.indices[0].clone();
        let z = Expr::var(builtins.tile_z.clone());
        let tile_size = Expr::var(builtins.tile_size.clone());

        let row = self.loop_pair(
            Axis::Row,
            &indices.left,
            Expr::var(indices.right.clone()).plus(Expr::int(1)),
            z.clone(),
            TraversalMode::TiledParallel,
        );
        let column = self.loop_pair(
            Axis::Column,
            &indices.right,
            z.clone(),
            z.clone().plus(tile_size.clone()),
            TraversalMode::TiledParallel,
        );
        self.pool.push_child(column.loop_id, row.loop_id);

        let start = if self.checkpoint {
            Expr::var(builtins.start(&builtins.outer_loop_1_idx))
        } else {
            Expr::int(0)
        };
        let loop_z = self.schedule_loop(
            &builtins.tile_z,
            start,
            Expr::var(builtins.max_tiles_n.clone()),
        );

        if self.checkpoint {
            let lock = self.lock();
            self.pool.extend_children(loop_z, [lock, column.loop_id]);

            // The progress marker may only advance once every thread finished
            // its batch, so a snapshot never sees a half-computed batch.
            let wait = self.pool.alloc(Stmt::raw(
                "// force omp to wait for all threads to finish their current batch (of size tile_size)",
            ));
            let progress = self.pool.alloc(Stmt::assign(
                builtins.outer_loop_1_idx.clone(),
                z.plus(tile_size),
            ));
            let unlock = self.unlock();
            let ordered = self.pool.alloc(Stmt::block(
                vec![wait, progress, unlock],
                Some(Pragma::Ordered),
            ));
            self.pool.push_child(loop_z, ordered);
        } else {
            self.pool.push_child(loop_z, column.loop_id);
        }

        self.set_pragma(loop_z);
        loop_z
    }

    /// Phase B: square tiles `tile_size` diagonals away from the main diagonal.
    fn interior_phase(&mut self) -> StmtId {
        let builtins = self.builtins;
        let indices = self.model.indices[0].clone();
        let z = Expr::var(builtins.tile_z.clone());
        let y = Expr::var(builtins.tile_y.clone());
        let x = Expr::var(builtins.tile_x.clone());
        let tile_size = Expr::var(builtins.tile_size.clone());
        let inner_loaded = builtins.loaded(&builtins.inner_loop_2_idx);

        let row = self.loop_pair(
            Axis::Row,
            &indices.left,
            x.clone(),
            x.minus(tile_size.clone()),
            TraversalMode::TiledParallel,
        );
        let column = self.loop_pair(
            Axis::Column,
            &indices.right,
            y.clone(),
            y.clone().plus(tile_size.clone()),
            TraversalMode::TiledParallel,
        );
        self.pool.push_child(column.loop_id, row.loop_id);

        let start_y = if self.checkpoint {
            Expr::cond(
                Expr::var(inner_loaded.clone()),
                z.clone(),
                Expr::var(builtins.start(&builtins.inner_loop_2_idx)),
            )
        } else {
            z.clone()
        };
        let loop_y = self.schedule_loop(
            &builtins.tile_y,
            start_y,
            Expr::var(builtins.max_tiles_n.clone()),
        );

        let x_decl = self.pool.alloc(Stmt::Decl(VarDecl::new(
            VarType::Size,
            builtins.tile_x.clone(),
            y.minus(z.clone()).plus(tile_size.clone()),
        )));
        if self.checkpoint {
            let consumed = self
                .pool
                .alloc(Stmt::add_assign(inner_loaded, Expr::int(1)));
            let lock = self.lock();
            self.pool
                .extend_children(loop_y, [consumed, lock, x_decl, column.loop_id]);

            let inner_progress = self.pool.alloc(Stmt::add_assign(
                builtins.inner_loop_2_idx.clone(),
                tile_size.clone(),
            ));
            let outer_progress = self
                .pool
                .alloc(Stmt::assign(builtins.outer_loop_2_idx.clone(), z.clone()));
            let unlock = self.unlock();
            let ordered = self.pool.alloc(Stmt::block(
                vec![inner_progress, outer_progress, unlock],
                Some(Pragma::Ordered),
            ));
            self.pool.push_child(loop_y, ordered);
        } else {
            self.pool.extend_children(loop_y, [x_decl, column.loop_id]);
        }
        self.set_pragma(loop_y);

        let start_z = if self.checkpoint {
            Expr::var(builtins.start(&builtins.outer_loop_2_idx))
        } else {
            tile_size.clone()
        };
        let loop_z = self.schedule_loop(
            &builtins.tile_z,
            start_z,
            Expr::var(builtins.max_tiles_n.clone()),
        );
        self.pool.push_child(loop_z, loop_y);
        if self.checkpoint {
            let reset = self.pool.alloc(Stmt::assign(
                builtins.inner_loop_2_idx.clone(),
                z.plus(tile_size),
            ));
            self.pool.push_child(loop_z, reset);
        }
        loop_z
    }

    /// Marks a scheduling loop as work-shared among the threads of the team.
    fn set_pragma(&mut self, loop_id: StmtId) {
        let pragma = if self.checkpoint {
            Pragma::OrderedFor
        } else {
            Pragma::For
        };
        if let Stmt::For(for_loop) = self.pool.get_mut(loop_id) {
            for_loop.pragma = Some(pragma);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builtin::Builtins,
        model::{CykOptions, GrammarModel, NonTerminal, TableDims},
    };
    use rstest::rstest;

    fn model(checkpoint: bool) -> GrammarModel {
        GrammarModel::new("x", 1)
            .with_nonterminal(NonTerminal::new("x", vec![TableDims::QUADRATIC]))
            .with_options(CykOptions {
                checkpoint,
                tile_size: 4,
                ..Default::default()
            })
    }

    #[rstest]
    #[case::plain(false, false, 5)]
    #[case::plain_header(false, true, 2)]
    #[case::checkpoint(true, false, 3)]
    #[case::checkpoint_header(true, true, 2)]
    fn test_tile_computation(
        #[case] checkpoint: bool,
        #[case] just_tile_size: bool,
        #[case] expected: usize,
    ) {
        let model = model(checkpoint);
        let builtins = Builtins::new();
        let mut builder = CykBuilder::new(&model, &builtins).unwrap();
        let stmts = builder.tile_computation(just_tile_size);
        assert_eq!(stmts.len(), expected);

        if !checkpoint || just_tile_size {
            assert_eq!(
                builder.pool.get(stmts[0]),
                &Stmt::Decl(VarDecl::new(VarType::Size, "tile_size", Expr::int(4)))
            );
        }
    }

    #[rstest]
    #[case(false, Pragma::For)]
    #[case(true, Pragma::OrderedFor)]
    fn test_work_shared_loops(#[case] checkpoint: bool, #[case] pragma: Pragma) {
        let model = model(checkpoint);
        let builtins = Builtins::new();
        let mut builder = CykBuilder::new(&model, &builtins).unwrap();
        let body = builder.tiled_traversal();

        let border = builder.pool.as_loop(body[0]).unwrap();
        assert_eq!(border.var.name, "z");
        assert_eq!(border.pragma, Some(pragma));

        let interior = builder.pool.as_loop(body[1]).unwrap();
        assert_eq!(interior.var.name, "z");
        assert_eq!(interior.pragma, None);
        let loop_y = builder.pool.as_loop(interior.body[0]).unwrap();
        assert_eq!(loop_y.var.name, "y");
        assert_eq!(loop_y.pragma, Some(pragma));
        assert!(!loop_y.table_index);
    }

    #[test]
    fn test_interior_rows_stay_within_tile() {
        let model = model(false);
        let builtins = Builtins::new();
        let mut builder = CykBuilder::new(&model, &builtins).unwrap();
        let body = builder.tiled_traversal();

        let interior = builder.pool.as_loop(body[1]).unwrap();
        let loop_y = builder.pool.as_loop(interior.body[0]).unwrap();
        let column = builder.pool.as_loop(loop_y.body[1]).unwrap();
        let row = builder.pool.as_loop(column.body[0]).unwrap();

        assert_eq!(row.var.ty, VarType::Int);
        assert_eq!(row.var.init, Some(Expr::var("x")));
        assert_eq!(
            row.cond,
            Expr::var("t_0_i").greater(Expr::var("x").minus(Expr::var("tile_size")))
        );
    }
}
