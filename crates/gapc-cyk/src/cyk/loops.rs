use smol_str::SmolStr;

use super::{CykBuilder, TraversalMode};
use crate::ast::{Expr, ForLoop, Step, Stmt, StmtId, VarDecl, VarType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Walks the left running index.
    Row,
    /// Walks the right running index.
    Column,
}

/// A loop together with the declaration of the index value it never reaches.
///
/// Regions computed after the loop (top row, last column, corner cell) declare
/// `end_state` so that they address the boundary cell with the same index
/// variable the loop used.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopPair {
    pub loop_id: StmtId,
    pub end_state: VarDecl,
}

impl CykBuilder<'_> {
    pub(super) fn loop_pair(
        &mut self,
        axis: Axis,
        var: &SmolStr,
        start: Expr,
        end: Expr,
        mode: TraversalMode,
    ) -> LoopPair {
        let mut ty = match (axis, mode) {
            (Axis::Row, TraversalMode::TiledParallel) => VarType::Int,
            _ => VarType::Size,
        };
        let mut start = start;
        // Checkpointed indices live outside the procedure; declaring them again
        // would shadow the restored value.
        if self.checkpoint && mode != TraversalMode::TiledParallel {
            ty = VarType::Existing;
            start = self.resumable(var, start, mode);
        }

        let index = Expr::var(var.clone());
        let (cond, step, boundary) = match axis {
            Axis::Column => (index.less(end.clone()), Step::Increment, end),
            Axis::Row if mode == TraversalMode::Outside => {
                (index.less(end), Step::Increment, Expr::int(1))
            }
            Axis::Row => (index.greater(end), Step::Decrement, Expr::int(1)),
        };

        let for_loop = ForLoop::new(VarDecl::new(ty, var.clone(), start), cond, step);
        LoopPair {
            loop_id: self.pool.alloc(Stmt::For(for_loop)),
            end_state: VarDecl::new(ty, var.clone(), boundary),
        }
    }

    /// A tile scheduling loop: `for (int var = start; var < end; var += tile_size)`.
    pub(super) fn schedule_loop(&mut self, var: &SmolStr, start: Expr, end: Expr) -> StmtId {
        let mut for_loop = ForLoop::new(
            VarDecl::new(VarType::Int, var.clone(), start),
            Expr::var(var.clone()).less(end),
            Step::Add(Expr::var(self.builtins.tile_size.clone())),
        );
        for_loop.table_index = false;
        self.pool.alloc(Stmt::For(for_loop))
    }
}
