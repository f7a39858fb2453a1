pub mod node;
pub mod pool;

pub use node::{
    AssignOp, BinaryOp, Body, Call, CallKind, Condition, Expr, ForLoop, Ident, Node, Pragma, Step,
    Stmt, StmtId, VarDecl, VarType,
};
pub use pool::{Procedure, StmtPool};
