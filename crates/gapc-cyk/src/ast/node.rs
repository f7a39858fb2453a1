use smol_str::SmolStr;

use crate::arena::ArenaId;

pub type Ident = SmolStr;
pub type StmtId = ArenaId<Node>;
pub type Body = Vec<StmtId>;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    Greater,
    Or,
}

impl BinaryOp {
    pub(crate) fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::Less | BinaryOp::Greater => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div => 5,
        }
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::Or => "||",
        }
    }
}

/// Expressions of the emitted procedure.
///
/// Expressions are small and never shared, so they are owned trees rather than
/// arena nodes.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Expr {
    Int(i64),
    Var(Ident),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `x++`: yields the current value and increments the variable.
    PostIncrement(Ident),
    MethodCall {
        receiver: Ident,
        method: Ident,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn var(name: impl Into<Ident>) -> Self {
        Expr::Var(name.into())
    }

    pub fn method_call(receiver: impl Into<Ident>, method: impl Into<Ident>) -> Self {
        Expr::MethodCall {
            receiver: receiver.into(),
            method: method.into(),
            args: Vec::new(),
        }
    }

    pub fn post_increment(name: impl Into<Ident>) -> Self {
        Expr::PostIncrement(name.into())
    }

    pub fn cond(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Cond(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn plus(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn minus(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn times(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    pub fn less(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Less, self, rhs)
    }

    pub fn greater(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Greater, self, rhs)
    }

    pub fn or(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Or, self, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Names of all variables the expression reads.
    pub fn variables(&self) -> Vec<&Ident> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a Ident>) {
        match self {
            Expr::Int(_) => {}
            Expr::Var(name) | Expr::PostIncrement(name) => names.push(name),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Expr::Not(expr) => expr.collect_variables(names),
            Expr::Cond(cond, then, otherwise) => {
                cond.collect_variables(names);
                then.collect_variables(names);
                otherwise.collect_variables(names);
            }
            Expr::MethodCall { receiver, args, .. } => {
                names.push(receiver);
                args.iter().for_each(|arg| arg.collect_variables(names));
            }
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum VarType {
    Size,
    Int,
    /// The variable is declared outside the procedure (checkpoint state); the
    /// declaration only assigns.
    Existing,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct VarDecl {
    pub ty: VarType,
    pub name: Ident,
    pub init: Option<Expr>,
}

impl VarDecl {
    pub fn new(ty: VarType, name: impl Into<Ident>, init: Expr) -> Self {
        Self {
            ty,
            name: name.into(),
            init: Some(init),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Step {
    Increment,
    Decrement,
    Add(Expr),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Pragma {
    Parallel,
    For,
    OrderedFor,
    Ordered,
}

impl Pragma {
    pub fn is_work_sharing(self) -> bool {
        matches!(self, Pragma::For | Pragma::OrderedFor)
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ForLoop {
    pub var: VarDecl,
    pub cond: Expr,
    pub step: Step,
    pub body: Body,
    /// Whether the loop variable addresses a DP table index, as opposed to a
    /// tile scheduling variable.
    pub table_index: bool,
    pub pragma: Option<Pragma>,
}

impl ForLoop {
    pub fn new(var: VarDecl, cond: Expr, step: Step) -> Self {
        Self {
            var,
            cond,
            step,
            body: Vec::new(),
            table_index: true,
            pragma: None,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CallKind {
    /// Evaluation of one DP cell of a tabulated non-terminal.
    NonTerminal,
    Runtime,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub receiver: Option<Ident>,
    pub name: Ident,
    pub args: Vec<Expr>,
}

impl Call {
    pub fn non_terminal(name: impl Into<Ident>, args: Vec<Expr>) -> Self {
        Self {
            kind: CallKind::NonTerminal,
            receiver: None,
            name: name.into(),
            args,
        }
    }

    pub fn runtime(name: impl Into<Ident>, args: Vec<Expr>) -> Self {
        Self {
            kind: CallKind::Runtime,
            receiver: None,
            name: name.into(),
            args,
        }
    }

    pub fn method(receiver: impl Into<Ident>, name: impl Into<Ident>) -> Self {
        Self {
            kind: CallKind::Runtime,
            receiver: Some(receiver.into()),
            name: name.into(),
            args: Vec::new(),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AssignOp {
    Set,
    Add,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Condition {
    Expr(Expr),
    Defined(Ident),
    NotDefined(Ident),
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Stmt {
    For(ForLoop),
    Block {
        body: Body,
        pragma: Option<Pragma>,
    },
    Call(Call),
    Assign {
        target: Ident,
        op: AssignOp,
        value: Expr,
    },
    Decl(VarDecl),
    /// Verbatim code fragment such as a comment or a lock guard.
    Raw(String),
    If {
        cond: Condition,
        then_body: Body,
        else_body: Body,
    },
}

impl Stmt {
    pub fn assign(target: impl Into<Ident>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            op: AssignOp::Set,
            value,
        }
    }

    pub fn add_assign(target: impl Into<Ident>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            op: AssignOp::Add,
            value,
        }
    }

    pub fn block(body: Body, pragma: Option<Pragma>) -> Self {
        Stmt::Block { body, pragma }
    }

    pub fn raw(code: impl Into<String>) -> Self {
        Stmt::Raw(code.into())
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Stmt::For(_))
    }

    pub fn is_nt_call(&self) -> bool {
        matches!(
            self,
            Stmt::Call(Call {
                kind: CallKind::NonTerminal,
                ..
            })
        )
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        match self {
            Stmt::For(for_loop) => Some(&mut for_loop.body),
            Stmt::Block { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Expressions evaluated by the statement itself, children excluded.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Stmt::For(ForLoop {
                var, cond, step, ..
            }) => {
                let mut exprs = var.init.iter().collect::<Vec<_>>();
                exprs.push(cond);
                if let Step::Add(expr) = step {
                    exprs.push(expr);
                }
                exprs
            }
            Stmt::Call(call) => call.args.iter().collect(),
            Stmt::Assign { value, .. } => vec![value],
            Stmt::Decl(decl) => decl.init.iter().collect(),
            Stmt::If {
                cond: Condition::Expr(expr),
                ..
            } => vec![expr],
            Stmt::If { .. } | Stmt::Block { .. } | Stmt::Raw(_) => Vec::new(),
        }
    }

    /// Every direct child, including both branches of a conditional.
    pub fn children(&self) -> Vec<StmtId> {
        match self {
            Stmt::For(ForLoop { body, .. }) | Stmt::Block { body, .. } => body.clone(),
            Stmt::If {
                then_body,
                else_body,
                ..
            } => then_body.iter().chain(else_body.iter()).copied().collect(),
            Stmt::Call(_) | Stmt::Assign { .. } | Stmt::Decl(_) | Stmt::Raw(_) => Vec::new(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub stmt: Stmt,
    pub parent: Option<StmtId>,
}
