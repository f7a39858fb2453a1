use smol_str::SmolStr;
use tracing::trace;

use super::{CykBuilder, TraversalMode};
use crate::{
    ast::{Body, Call, Expr, Stmt, StmtId},
    model::{NonTerminal, Side, TableIndex},
};

impl CykBuilder<'_> {
    /// Places the evaluation call of every non-terminal in `nts` (in order) at
    /// each level of `body` whose in-scope table indices are exactly the
    /// non-terminal's materialized indices, then drops loops left empty.
    pub(super) fn decorate(
        &mut self,
        body: Body,
        nts: &[&NonTerminal],
        mode: TraversalMode,
    ) -> Body {
        self.decorate_level(body, &[], nts, mode)
    }

    fn decorate_level(
        &mut self,
        stmts: Body,
        loop_vars: &[SmolStr],
        nts: &[&NonTerminal],
        mode: TraversalMode,
    ) -> Body {
        let kept = self.place_calls(stmts, loop_vars, nts, mode);
        self.drop_unread_boundaries(kept)
    }

    fn place_calls(
        &mut self,
        stmts: Body,
        loop_vars: &[SmolStr],
        nts: &[&NonTerminal],
        mode: TraversalMode,
    ) -> Body {
        let mut contains_loop = false;
        let mut kept = Vec::with_capacity(stmts.len());

        for id in stmts {
            let Some(for_loop) = self.pool.as_loop(id) else {
                kept.push(id);
                continue;
            };
            contains_loop = true;

            let mut inner_vars = loop_vars.to_vec();
            if for_loop.table_index {
                inner_vars.push(for_loop.var.name.clone());
            }
            let var = for_loop.var.name.clone();

            let body = self.pool.take_children(id);
            let body = self.decorate_level(body, &inner_vars, nts, mode);
            let live = body
                .iter()
                .any(|&child| self.pool.get(child).is_loop() || self.holds_nt_call(child));
            self.pool.replace_children(id, body);

            if live {
                kept.push(id);
            } else {
                trace!(%var, "dropping loop without evaluation calls");
            }
        }

        // Work-shared loops must not split one cell's evaluation across
        // iterations of an enclosing scheduled loop.
        if mode == TraversalMode::TiledParallel && contains_loop {
            return kept;
        }
        if kept.iter().any(|&id| self.holds_nt_call(id)) {
            return kept;
        }

        let calls = nts
            .iter()
            .filter_map(|nt| self.nt_call(nt, loop_vars, mode))
            .collect::<Vec<_>>();
        if calls.is_empty() {
            return kept;
        }

        let calls = calls
            .into_iter()
            .map(|call| self.pool.alloc(Stmt::Call(call)))
            .collect::<Vec<_>>();

        if !self.checkpoint {
            kept.extend(calls);
            return kept;
        }

        match mode {
            TraversalMode::Inside | TraversalMode::Outside => {
                let mut guarded = vec![self.pool.alloc(Stmt::raw(self.builtins.lock_guard.clone()))];
                guarded.extend(calls);
                if loop_vars.is_empty() {
                    // Procedure scope: keep the guard from outliving the calls.
                    kept.push(self.pool.alloc(Stmt::block(guarded, None)));
                } else {
                    kept.extend(guarded);
                }
            }
            TraversalMode::TiledSerial => {
                let builtins = self.builtins;
                kept.push(self.pool.alloc(Stmt::Call(Call::method(
                    builtins.mutex.clone(),
                    builtins.lock_shared.clone(),
                ))));
                kept.extend(calls);
                kept.push(self.pool.alloc(Stmt::Call(Call::method(
                    builtins.mutex.clone(),
                    builtins.unlock_shared.clone(),
                ))));
            }
            TraversalMode::TiledParallel => kept.extend(calls),
        }
        kept
    }

    /// Removes the last-row and last-column declarations of running indices
    /// that no other statement of the level reads.
    fn drop_unread_boundaries(&self, stmts: Body) -> Body {
        stmts
            .iter()
            .copied()
            .filter(|&id| {
                let Stmt::Decl(decl) = self.pool.get(id) else {
                    return true;
                };
                if !self.is_running_index(&decl.name) {
                    return true;
                }

                let others = stmts
                    .iter()
                    .copied()
                    .filter(|&other| other != id)
                    .collect::<Vec<_>>();
                let read = self.pool.reads(&others, &decl.name);
                if !read {
                    trace!(var = %decl.name, "dropping unread boundary declaration");
                }
                read
            })
            .collect()
    }

    fn is_running_index(&self, name: &str) -> bool {
        self.model
            .indices
            .iter()
            .any(|indices| indices.left == name || indices.right == name)
    }

    /// Whether `id` is an evaluation call or a plain block holding one.
    fn holds_nt_call(&self, id: StmtId) -> bool {
        match self.pool.get(id) {
            Stmt::Block { body, pragma: None } => body.iter().any(|&child| self.holds_nt_call(child)),
            stmt => stmt.is_nt_call(),
        }
    }

    fn nt_call(&self, nt: &NonTerminal, loop_vars: &[SmolStr], mode: TraversalMode) -> Option<Call> {
        let indices = self.model.table_indices(nt);
        let used = indices
            .iter()
            .filter(|index| loop_vars.contains(&index.name))
            .count();

        if used != loop_vars.len() {
            return None;
        }
        // These nests declare no boundary indices outside their loops.
        if matches!(mode, TraversalMode::Outside | TraversalMode::TiledParallel)
            && used != indices.len()
        {
            return None;
        }

        let args = indices
            .iter()
            .map(|index| self.call_arg(index, mode))
            .collect::<Vec<_>>();
        let routine = nt.routine_name(self.builtins);
        trace!(%routine, depth = loop_vars.len(), ?mode, "injecting evaluation call");
        Some(Call::non_terminal(routine, args))
    }

    fn call_arg(&self, index: &TableIndex, mode: TraversalMode) -> Expr {
        match (index.side, mode) {
            (Side::Right, _) => Expr::var(index.name.clone()),
            // Diagonal `i` of length `n - i` starts at `i + j - n`.
            (Side::Left, TraversalMode::Outside) => {
                let right = &self.model.indices[index.track].right;
                Expr::var(index.name.clone())
                    .plus(Expr::var(right.clone()))
                    .minus(self.sequence_size(index.track))
            }
            (Side::Left, _) => Expr::var(index.name.clone()).minus(Expr::int(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{ForLoop, Procedure},
        builtin::Builtins,
        cyk::{generate, inject_calls, skeleton},
        model::{CykOptions, GrammarModel, Parallel, TableDims},
    };
    use rstest::rstest;

    fn model(tables: Vec<Vec<TableDims>>, tracks: usize) -> GrammarModel {
        tables
            .into_iter()
            .enumerate()
            .fold(GrammarModel::new("a", tracks), |model, (n, tables)| {
                model.with_nonterminal(NonTerminal::new(format!("nt{}", n), tables))
            })
            .with_options(CykOptions {
                parallel: Parallel::Off,
                ..Default::default()
            })
    }

    /// `(routine, depth)` of every evaluation call, in program order.
    fn calls(procedure: &Procedure) -> Vec<(String, usize)> {
        let mut calls = Vec::new();
        procedure.walk(|_, stmt, depth| match stmt {
            Stmt::Call(call) if stmt.is_nt_call() => calls.push((call.name.to_string(), depth)),
            _ => {}
        });
        calls
    }

    fn loops(procedure: &Procedure) -> Vec<String> {
        let mut loops = Vec::new();
        procedure.walk(|_, stmt, depth| {
            if let Stmt::For(ForLoop { var, .. }) = stmt {
                loops.push(format!("{}{}", " ".repeat(depth), var.name));
            }
        });
        loops
    }

    #[rstest]
    #[case::quadratic(
        vec![TableDims::QUADRATIC],
        vec![("nt_tabulate_nt0", 2), ("nt_tabulate_nt0", 1), ("nt_tabulate_nt0", 1), ("nt_tabulate_nt0", 0)]
    )]
    #[case::left_only(vec![TableDims::LEFT_ONLY], vec![("nt_tabulate_nt0", 1), ("nt_tabulate_nt0", 0)])]
    #[case::right_only(vec![TableDims::RIGHT_ONLY], vec![("nt_tabulate_nt0", 1), ("nt_tabulate_nt0", 0)])]
    #[case::constant(vec![TableDims::CONSTANT], vec![("nt_tabulate_nt0", 0)])]
    fn test_call_depth(#[case] tables: Vec<TableDims>, #[case] expected: Vec<(&str, usize)>) {
        let model = model(vec![tables], 1);
        let procedure = generate(&model, &Builtins::new()).unwrap();
        assert_eq!(
            calls(&procedure),
            expected
                .into_iter()
                .map(|(name, depth)| (name.to_string(), depth))
                .collect::<Vec<_>>()
        );
    }

    #[rstest]
    #[case::left_only(vec![TableDims::LEFT_ONLY], vec!["t_0_i"])]
    #[case::right_only(vec![TableDims::RIGHT_ONLY], vec!["t_0_j"])]
    #[case::constant(vec![TableDims::CONSTANT], vec![])]
    fn test_unused_loops_are_pruned(#[case] tables: Vec<TableDims>, #[case] expected: Vec<&str>) {
        let model = model(vec![tables], 1);
        let procedure = generate(&model, &Builtins::new()).unwrap();
        assert_eq!(loops(&procedure), expected);
    }

    fn declarations(procedure: &Procedure) -> Vec<String> {
        let mut decls = Vec::new();
        procedure.walk(|_, stmt, depth| {
            if let Stmt::Decl(decl) = stmt {
                decls.push(format!("{}{}", " ".repeat(depth), decl.name));
            }
        });
        decls
    }

    #[rstest]
    #[case::quadratic(vec![TableDims::QUADRATIC], vec![" t_0_i", "t_0_j", "t_0_i"])]
    #[case::left_only(vec![TableDims::LEFT_ONLY], vec!["t_0_j", "t_0_i"])]
    #[case::right_only(vec![TableDims::RIGHT_ONLY], vec!["t_0_j"])]
    #[case::constant(vec![TableDims::CONSTANT], vec![])]
    fn test_unread_boundaries_are_pruned(#[case] tables: Vec<TableDims>, #[case] expected: Vec<&str>) {
        let model = model(vec![tables], 1);
        let procedure = generate(&model, &Builtins::new()).unwrap();
        assert_eq!(declarations(&procedure), expected);
    }

    #[test]
    fn test_calls_follow_evaluation_order() {
        let model = model(
            vec![vec![TableDims::QUADRATIC], vec![TableDims::QUADRATIC]],
            1,
        )
        .with_order(["nt1", "nt0"]);
        let procedure = generate(&model, &Builtins::new()).unwrap();
        let names = calls(&procedure)
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(
            &names[..2],
            &["nt_tabulate_nt1".to_string(), "nt_tabulate_nt0".to_string()]
        );
    }

    #[rstest]
    #[case::single_track(vec![vec![TableDims::QUADRATIC], vec![TableDims::RIGHT_ONLY], vec![TableDims::CONSTANT]], 1, TraversalMode::Inside)]
    #[case::two_tracks(vec![vec![TableDims::QUADRATIC; 2], vec![TableDims::LEFT_ONLY; 2]], 2, TraversalMode::Inside)]
    #[case::outside(vec![vec![TableDims::QUADRATIC]], 1, TraversalMode::Outside)]
    #[case::serial(vec![vec![TableDims::QUADRATIC]], 1, TraversalMode::TiledSerial)]
    #[case::tiled(vec![vec![TableDims::QUADRATIC]], 1, TraversalMode::TiledParallel)]
    fn test_injection_is_idempotent(
        #[case] tables: Vec<Vec<TableDims>>,
        #[case] tracks: usize,
        #[case] mode: TraversalMode,
    ) {
        let model = model(tables, tracks);
        let builtins = Builtins::new();
        let mut procedure = skeleton(&model, &builtins, mode).unwrap();

        inject_calls(&mut procedure, &model, &builtins, mode).unwrap();
        let once = (calls(&procedure), loops(&procedure));
        let size = procedure.pool.subtree_size(&procedure.body);

        inject_calls(&mut procedure, &model, &builtins, mode).unwrap();
        assert_eq!((calls(&procedure), loops(&procedure)), once);
        assert_eq!(procedure.pool.subtree_size(&procedure.body), size);
    }

    #[test]
    fn test_tiled_calls_only_at_innermost_level() {
        let model = model(vec![vec![TableDims::QUADRATIC], vec![TableDims::CONSTANT]], 1);
        let builtins = Builtins::new();
        let mut procedure = skeleton(&model, &builtins, TraversalMode::TiledParallel).unwrap();
        inject_calls(&mut procedure, &model, &builtins, TraversalMode::TiledParallel).unwrap();

        // border: z / j / i, interior: z / y / j / i
        assert_eq!(
            calls(&procedure),
            vec![
                ("nt_tabulate_nt0".to_string(), 3),
                ("nt_tabulate_nt0".to_string(), 4)
            ]
        );
    }

    #[test]
    fn test_checkpoint_guards() {
        let mut model = model(vec![vec![TableDims::QUADRATIC]], 1);
        model.options.checkpoint = true;
        let builtins = Builtins::new();

        let mut procedure = skeleton(&model, &builtins, TraversalMode::TiledSerial).unwrap();
        inject_calls(&mut procedure, &model, &builtins, TraversalMode::TiledSerial).unwrap();
        let mut methods = Vec::new();
        procedure.walk(|_, stmt, _| {
            if let Stmt::Call(Call {
                receiver: Some(receiver),
                name,
                ..
            }) = stmt
            {
                methods.push(format!("{}.{}", receiver, name));
            }
        });
        assert_eq!(methods.len(), 8);
        assert!(
            methods
                .chunks(2)
                .all(|pair| pair == ["mutex.lock_shared", "mutex.unlock_shared"])
        );

        let mut procedure = skeleton(&model, &builtins, TraversalMode::Inside).unwrap();
        inject_calls(&mut procedure, &model, &builtins, TraversalMode::Inside).unwrap();
        let mut guards = 0;
        procedure.walk(|_, stmt, _| {
            if matches!(stmt, Stmt::Raw(code) if code.starts_with("std::lock_guard")) {
                guards += 1;
            }
        });
        assert_eq!(guards, 4);

        let mut procedure = skeleton(&model, &builtins, TraversalMode::Outside).unwrap();
        inject_calls(&mut procedure, &model, &builtins, TraversalMode::Outside).unwrap();
        let mut first = Vec::new();
        procedure.walk(|_, stmt, _| {
            if let Stmt::For(ForLoop { body, .. }) = stmt {
                if body.iter().any(|&child| procedure.pool.get(child).is_nt_call()) {
                    first.push(procedure.pool.get(body[0]).clone());
                }
            }
        });
        assert_eq!(first, vec![Stmt::raw("std::lock_guard<fair_mutex> lock(mutex);")]);
    }

    #[test]
    fn test_outside_left_argument_follows_diagonal() {
        let model = model(vec![vec![TableDims::QUADRATIC]], 1);
        let builtins = Builtins::new();
        let mut procedure = skeleton(&model, &builtins, TraversalMode::Outside).unwrap();
        inject_calls(&mut procedure, &model, &builtins, TraversalMode::Outside).unwrap();

        let mut args = Vec::new();
        procedure.walk(|_, stmt, _| {
            if let Stmt::Call(call) = stmt {
                args.push(call.args.clone());
            }
        });
        assert_eq!(
            args,
            vec![vec![
                Expr::var("t_0_i")
                    .plus(Expr::var("t_0_j"))
                    .minus(Expr::method_call("t_0_seq", "size")),
                Expr::var("t_0_j"),
            ]]
        );
    }
}
