//! C++ rendering of generated procedures.
use std::fmt;

use crate::ast::{
    AssignOp, Call, Condition, Expr, ForLoop, Pragma, Procedure, Step, Stmt, StmtId, VarDecl,
    VarType,
};

const UNARY_PRECEDENCE: u8 = 6;

#[derive(Clone, Debug, Default)]
pub struct Printer {
    config: PrinterConfig,
    output: String,
}

#[derive(Clone, Debug)]
pub struct PrinterConfig {
    pub indent_width: usize,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self { indent_width: 2 }
    }
}

impl Printer {
    pub fn new(config: Option<PrinterConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            output: String::new(),
        }
    }

    /// Renders `procedure` as a parameterless `void` function.
    pub fn print(&mut self, procedure: &Procedure) -> String {
        self.output.clear();
        self.output.push_str(&format!("void {}() {{\n", procedure.name));
        self.print_body(procedure, &procedure.body, 1);
        self.output.push_str("}\n");

        let mut result = String::with_capacity(self.output.len());
        for line in self.output.lines() {
            result.push_str(line.trim_end());
            result.push('\n');
        }
        result
    }

    fn print_body(&mut self, procedure: &Procedure, body: &[StmtId], level: usize) {
        for &id in body {
            self.print_stmt(procedure, id, level);
        }
    }

    fn print_stmt(&mut self, procedure: &Procedure, id: StmtId, level: usize) {
        match procedure.pool.get(id) {
            Stmt::For(ForLoop {
                var,
                cond,
                step,
                body,
                pragma,
                ..
            }) => {
                self.print_pragma(*pragma, level);
                self.append_indent(level);
                self.output.push_str(&format!(
                    "for ({}; {}; {}) {{\n",
                    declaration(var),
                    cond,
                    step_expr(&var.name, step)
                ));
                self.print_body(procedure, body, level + 1);
                self.append_line(level, "}");
            }
            Stmt::Block { body, pragma } => {
                self.print_pragma(*pragma, level);
                self.append_line(level, "{");
                self.print_body(procedure, body, level + 1);
                self.append_line(level, "}");
            }
            Stmt::Call(call) => self.append_line(level, &format!("{};", call_expr(call))),
            Stmt::Assign { target, op, value } => {
                let op = match op {
                    AssignOp::Set => "=",
                    AssignOp::Add => "+=",
                };
                self.append_line(level, &format!("{} {} {};", target, op, value));
            }
            Stmt::Decl(decl) => self.append_line(level, &format!("{};", declaration(decl))),
            Stmt::Raw(code) => self.append_line(level, code),
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let directive = match cond {
                    Condition::Expr(cond) => {
                        self.append_line(level, &format!("if ({}) {{", cond));
                        self.print_body(procedure, then_body, level + 1);
                        if !else_body.is_empty() {
                            self.append_line(level, "} else {");
                            self.print_body(procedure, else_body, level + 1);
                        }
                        self.append_line(level, "}");
                        return;
                    }
                    Condition::Defined(symbol) => format!("#ifdef {}", symbol),
                    Condition::NotDefined(symbol) => format!("#ifndef {}", symbol),
                };

                // Preprocessor lines always start at column 0.
                self.append_line(0, &directive);
                self.print_body(procedure, then_body, level);
                if !else_body.is_empty() {
                    self.append_line(0, "#else");
                    self.print_body(procedure, else_body, level);
                }
                self.append_line(0, "#endif");
            }
        }
    }

    fn print_pragma(&mut self, pragma: Option<Pragma>, level: usize) {
        let Some(pragma) = pragma else {
            return;
        };
        let line = match pragma {
            Pragma::Parallel => "#pragma omp parallel",
            Pragma::For => "#pragma omp for",
            Pragma::OrderedFor => "#pragma omp for ordered schedule(dynamic)",
            Pragma::Ordered => "#pragma omp ordered",
        };
        self.append_line(level, line);
    }

    fn append_line(&mut self, level: usize, line: &str) {
        self.append_indent(level);
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn append_indent(&mut self, level: usize) {
        self.output
            .push_str(&" ".repeat(level * self.config.indent_width));
    }
}

fn declaration(decl: &VarDecl) -> String {
    let ty = match decl.ty {
        VarType::Size => "unsigned int ",
        VarType::Int => "int ",
        VarType::Existing => "",
    };
    match &decl.init {
        Some(init) => format!("{}{} = {}", ty, decl.name, init),
        None => format!("{}{}", ty, decl.name),
    }
}

fn step_expr(var: &str, step: &Step) -> String {
    match step {
        Step::Increment => format!("++{}", var),
        Step::Decrement => format!("--{}", var),
        Step::Add(expr) => format!("{} += {}", var, expr),
    }
}

fn call_expr(call: &Call) -> String {
    let args = args(&call.args);
    match &call.receiver {
        Some(receiver) => format!("{}.{}({})", receiver, call.name, args),
        None => format!("{}({})", call.name, args),
    }
}

fn args(args: &[Expr]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Writes `expr`, parenthesized when it binds weaker than `min_precedence`.
fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, min_precedence: u8) -> fmt::Result {
    match expr {
        Expr::Int(value) => write!(f, "{}", value),
        Expr::Var(name) => write!(f, "{}", name),
        Expr::PostIncrement(name) => write!(f, "{}++", name),
        Expr::MethodCall {
            receiver,
            method,
            args: call_args,
        } => write!(f, "{}.{}({})", receiver, method, args(call_args)),
        Expr::Not(operand) => {
            write!(f, "!")?;
            write_expr(f, operand, UNARY_PRECEDENCE)
        }
        Expr::Binary(op, lhs, rhs) => {
            let precedence = op.precedence();
            let parenthesize = precedence < min_precedence;
            if parenthesize {
                write!(f, "(")?;
            }
            write_expr(f, lhs, precedence)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, rhs, precedence + 1)?;
            if parenthesize {
                write!(f, ")")?;
            }
            Ok(())
        }
        Expr::Cond(cond, then, otherwise) => {
            let parenthesize = min_precedence > 0;
            if parenthesize {
                write!(f, "(")?;
            }
            write!(f, "(")?;
            write_expr(f, cond, 0)?;
            write!(f, ") ? ")?;
            write_expr(f, then, 1)?;
            write!(f, " : ")?;
            write_expr(f, otherwise, 1)?;
            if parenthesize {
                write!(f, ")")?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builtin::Builtins,
        cyk::generate,
        model::{CykOptions, GrammarModel, NonTerminal, Parallel, TableDims},
    };
    use rstest::rstest;

    fn model(parallel: Parallel) -> GrammarModel {
        GrammarModel::new("x", 1)
            .with_nonterminal(NonTerminal::new("x", vec![TableDims::QUADRATIC]))
            .with_options(CykOptions {
                parallel,
                ..Default::default()
            })
    }

    #[rstest]
    #[case::sum(Expr::var("t_0_j").plus(Expr::int(1)), "t_0_j + 1")]
    #[case::left_assoc(
        Expr::var("y").minus(Expr::var("z")).plus(Expr::var("tile_size")),
        "y - z + tile_size"
    )]
    #[case::right_grouping(
        Expr::var("a").minus(Expr::var("b").plus(Expr::var("c"))),
        "a - (b + c)"
    )]
    #[case::product(
        Expr::var("a").plus(Expr::var("b")).times(Expr::var("c")),
        "(a + b) * c"
    )]
    #[case::method(
        Expr::method_call("t_0_seq", "size").div(Expr::var("tile_size")),
        "t_0_seq.size() / tile_size"
    )]
    #[case::or(
        Expr::var("load_checkpoint").not().or(Expr::var("t_0_i").not()),
        "!load_checkpoint || !t_0_i"
    )]
    #[case::not_of_binary(Expr::var("a").less(Expr::var("b")).not(), "!(a < b)")]
    #[case::cond(
        Expr::cond(Expr::post_increment("t_0_i_loaded"), Expr::int(0), Expr::var("t_0_i")),
        "(t_0_i_loaded++) ? 0 : t_0_i"
    )]
    #[case::nested_cond(
        Expr::var("a").plus(Expr::cond(Expr::var("c"), Expr::int(1), Expr::int(2))),
        "a + ((c) ? 1 : 2)"
    )]
    fn test_expr(#[case] expr: Expr, #[case] expected: &str) {
        assert_eq!(expr.to_string(), expected);
    }

    #[test]
    fn test_empty_procedure() {
        let procedure = Procedure::new("cyk", Default::default(), Vec::new());
        assert_eq!(Printer::new(None).print(&procedure), "void cyk() {\n}\n");
    }

    #[test]
    fn test_single_track_inside() {
        let procedure = generate(&model(Parallel::Off), &Builtins::new()).unwrap();
        let expected = "\
void cyk() {
  for (unsigned int t_0_j = 0; t_0_j < t_0_seq.size(); ++t_0_j) {
    for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; --t_0_i) {
      nt_tabulate_x(t_0_i - 1, t_0_j);
    }
    unsigned int t_0_i = 1;
    nt_tabulate_x(t_0_i - 1, t_0_j);
  }
  unsigned int t_0_j = t_0_seq.size();
  for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; --t_0_i) {
    nt_tabulate_x(t_0_i - 1, t_0_j);
  }
  unsigned int t_0_i = 1;
  nt_tabulate_x(t_0_i - 1, t_0_j);
}
";
        assert_eq!(Printer::new(None).print(&procedure), expected);
    }

    #[test]
    fn test_right_only_table_declares_no_row_boundary() {
        let model = GrammarModel::new("x", 1)
            .with_nonterminal(NonTerminal::new("x", vec![TableDims::RIGHT_ONLY]))
            .with_options(CykOptions {
                parallel: Parallel::Off,
                ..Default::default()
            });
        let procedure = generate(&model, &Builtins::new()).unwrap();
        let expected = "\
void cyk() {
  for (unsigned int t_0_j = 0; t_0_j < t_0_seq.size(); ++t_0_j) {
    nt_tabulate_x(t_0_j);
  }
  unsigned int t_0_j = t_0_seq.size();
  nt_tabulate_x(t_0_j);
}
";
        assert_eq!(Printer::new(None).print(&procedure), expected);
    }

    #[test]
    fn test_indent_width() {
        let procedure = generate(&model(Parallel::Off), &Builtins::new()).unwrap();
        let output = Printer::new(Some(PrinterConfig { indent_width: 4 })).print(&procedure);
        assert!(output.contains("\n        nt_tabulate_x(t_0_i - 1, t_0_j);\n"));
    }

    #[test]
    fn test_openmp_switch() {
        let procedure = generate(&model(Parallel::On), &Builtins::new()).unwrap();
        let output = Printer::new(None).print(&procedure);
        let lines = output.lines().collect::<Vec<_>>();

        for directive in ["#ifndef _OPENMP", "#else", "#endif", "#ifdef TILE_SIZE"] {
            assert!(lines.contains(&directive), "missing {directive}");
        }
        assert!(lines.contains(&"  #pragma omp parallel"));
        assert!(lines.contains(&"    #pragma omp for"));
        assert!(lines.contains(&"    for (int z = 0; z < max_tiles_n; z += tile_size) {"));
        assert!(lines.contains(&"    tile_size = TILE_SIZE;"));
        assert!(lines.contains(&"    assert(tile_size);"));
        assert!(output.lines().all(|line| line == line.trim_end()));
    }

    #[test]
    fn test_checkpoint_markers() {
        let mut model = model(Parallel::Off);
        model.options.checkpoint = true;
        let procedure = generate(&model, &Builtins::new()).unwrap();
        let output = Printer::new(None).print(&procedure);

        assert!(output.starts_with(
            "void cyk() {\n  int t_0_i_loaded = !load_checkpoint || !t_0_i;\n  int t_0_j_loaded = !load_checkpoint || !t_0_j;\n"
        ));
        assert!(output.contains(
            "  for (t_0_j = (t_0_j_loaded++) ? 0 : t_0_j; t_0_j < t_0_seq.size(); ++t_0_j) {\n"
        ));
        assert!(output.contains("      std::lock_guard<fair_mutex> lock(mutex);\n"));
        assert!(output.ends_with(
            "  t_0_i = 1;\n  {\n    std::lock_guard<fair_mutex> lock(mutex);\n    nt_tabulate_x(t_0_i - 1, t_0_j);\n  }\n}\n"
        ));
    }

    #[test]
    fn test_outside_checkpoint_phases() {
        let model = GrammarModel::new("x", 1)
            .with_nonterminal(NonTerminal::new("x", vec![TableDims::QUADRATIC]))
            .with_nonterminal(NonTerminal::new("outside_x", vec![TableDims::QUADRATIC]).outside())
            .with_options(CykOptions {
                checkpoint: true,
                outside: true,
                parallel: Parallel::Off,
                ..Default::default()
            });
        let procedure = generate(&model, &Builtins::new()).unwrap();
        let output = Printer::new(None).print(&procedure);

        for expected in [
            "  int t_0_i_outside_loaded = !load_checkpoint || !outside_phase || !t_0_i;\n",
            "  if (!load_checkpoint || !outside_phase) {\n",
            "    {\n      std::lock_guard<fair_mutex> lock(mutex);\n      t_0_i = 0;\n      t_0_j = 0;\n      outside_phase = 1;\n    }\n  }\n",
            "  for (t_0_i = (t_0_i_outside_loaded++) ? 0 : t_0_i; t_0_i < t_0_seq.size() + 1; ++t_0_i) {\n",
            "      std::lock_guard<fair_mutex> lock(mutex);\n      nt_tabulate_outside_x(t_0_i + t_0_j - t_0_seq.size(), t_0_j);\n",
        ] {
            assert!(output.contains(expected), "missing {expected:?} in\n{output}");
        }
    }
}
