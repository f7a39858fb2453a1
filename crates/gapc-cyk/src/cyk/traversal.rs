//! Single-threaded loop nests over the DP matrices of every track.
//!
//! For one track of length `n`, inside traversal fills the cells in the
//! following order (regions in brackets):
//!
//! ```text
//!    |  0  1  2  3   4  5          |  0  1  2  3  4  5
//! ---|-------------------       ---|------------------
//!  0 |  0  2  5  9  14 20        0 |  B  B  B  B  B  D
//!  1 |     1  4  8  13 19        1 |     A  A  A  A  C
//!  2 |        3  7  12 18        2 |        A  A  A  C
//!  3 |           6  11 17        3 |           A  A  C
//!  4 |              10 16        4 |              A  C
//!  5 |                 15        5 |                 C
//! ```
//!
//! The nest of track `k + 1` is copied into every region of track `k`, so the
//! first track ends up outermost.
use tracing::debug;

use super::{Axis, CykBuilder, TraversalMode};
use crate::ast::{Body, Expr, Stmt, StmtId};

impl CykBuilder<'_> {
    /// Loop nest over every track of the axiom, first track outermost.
    pub(super) fn traversal(&mut self, mode: TraversalMode) -> Body {
        let tracks = self.model.axiom.tracks;
        debug!(?mode, tracks, "building traversal skeleton");
        (0..tracks)
            .rev()
            .fold(Vec::new(), |nested, track| self.single_track(track, &nested, mode))
    }

    pub(super) fn single_track(
        &mut self,
        track: usize,
        nested: &[StmtId],
        mode: TraversalMode,
    ) -> Body {
        match mode {
            TraversalMode::Outside => self.single_track_outside(track, nested),
            TraversalMode::Inside | TraversalMode::TiledParallel | TraversalMode::TiledSerial => {
                self.single_track_inside(track, nested, mode)
            }
        }
    }

    fn single_track_inside(&mut self, track: usize, nested: &[StmtId], mode: TraversalMode) -> Body {
        let indices = self.model.indices[track].clone();
        let size = self.sequence_size(track);
        // Successors are assumed to yield at least one character, so every
        // row starts one past the column.
        let row_start = Expr::var(indices.right.clone()).plus(Expr::int(1));

        // A: the triangle below row 0, left of the last column.
        let row = self.loop_pair(Axis::Row, &indices.left, row_start.clone(), Expr::int(1), mode);
        let copy = self.pool.deep_copy_all(nested);
        self.pool.extend_children(row.loop_id, copy);

        let column_start = match mode {
            TraversalMode::TiledSerial => Expr::var(self.builtins.max_tiles_n.clone()),
            _ => Expr::int(0),
        };
        let column = self.loop_pair(Axis::Column, &indices.right, column_start, size, mode);
        let row_end = self.pool.alloc(Stmt::Decl(row.end_state));
        self.pool.extend_children(column.loop_id, [row.loop_id, row_end]);

        // B: row 0, after the triangle of the same column.
        let copy = self.pool.deep_copy_all(nested);
        self.pool.extend_children(column.loop_id, copy);

        let mut stmts = vec![
            column.loop_id,
            self.pool.alloc(Stmt::Decl(column.end_state)),
        ];

        // C: the last column, once every other column is complete.
        let last_column = self.loop_pair(Axis::Row, &indices.left, row_start, Expr::int(1), mode);
        let copy = self.pool.deep_copy_all(nested);
        self.pool.extend_children(last_column.loop_id, copy);
        stmts.push(last_column.loop_id);
        stmts.push(self.pool.alloc(Stmt::Decl(last_column.end_state)));

        // D: the corner cell.
        stmts.extend_from_slice(nested);
        stmts
    }

    /// Span lengths shrink from the whole input towards single positions; the
    /// row loop picks the diagonal, the column loop walks along it.
    fn single_track_outside(&mut self, track: usize, nested: &[StmtId]) -> Body {
        let indices = self.model.indices[track].clone();
        let size = self.sequence_size(track);
        let end = size.clone().plus(Expr::int(1));

        let column = self.loop_pair(
            Axis::Column,
            &indices.right,
            size.minus(Expr::var(indices.left.clone())),
            end.clone(),
            TraversalMode::Outside,
        );
        self.pool.extend_children(column.loop_id, nested.iter().copied());

        let row = self.loop_pair(Axis::Row, &indices.left, Expr::int(0), end, TraversalMode::Outside);
        self.pool.push_child(row.loop_id, column.loop_id);
        vec![row.loop_id]
    }
}
