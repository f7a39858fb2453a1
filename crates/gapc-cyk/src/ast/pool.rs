use smol_str::SmolStr;

use crate::arena::Arena;

use super::node::{Body, Expr, ForLoop, Node, Stmt, StmtId};

/// Arena of statement nodes forming one procedure.
///
/// Children are stored as ids inside their parent statement; every node keeps
/// the id of the statement that owns it, so a statement is never linked into
/// two bodies at once.
#[derive(Debug, Clone, Default)]
pub struct StmtPool {
    nodes: Arena<Node>,
}

impl StmtPool {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(256),
        }
    }

    /// Allocates a statement and adopts every child it already refers to.
    pub fn alloc(&mut self, stmt: Stmt) -> StmtId {
        let children = stmt.children();
        let id = self.nodes.alloc(Node { stmt, parent: None });
        for child in children {
            self.nodes[child].parent = Some(id);
        }
        id
    }

    pub fn get(&self, id: StmtId) -> &Stmt {
        &self.nodes[id].stmt
    }

    pub fn get_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.nodes[id].stmt
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the loop statement stored at `id`, if it is one.
    pub fn as_loop(&self, id: StmtId) -> Option<&ForLoop> {
        match self.get(id) {
            Stmt::For(for_loop) => Some(for_loop),
            _ => None,
        }
    }

    /// Appends `child` to the body of the loop or block `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is neither a loop nor a block.
    pub fn push_child(&mut self, parent: StmtId, child: StmtId) {
        self.extend_children(parent, [child]);
    }

    /// Appends `children` to the body of the loop or block `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is neither a loop nor a block.
    pub fn extend_children(&mut self, parent: StmtId, children: impl IntoIterator<Item = StmtId>) {
        let children = children.into_iter().collect::<Vec<_>>();
        for &child in &children {
            debug_assert!(
                self.nodes[child].parent.is_none(),
                "statement {:?} already belongs to {:?}",
                child,
                self.nodes[child].parent
            );
            self.nodes[child].parent = Some(parent);
        }

        match self.nodes[parent].stmt.body_mut() {
            Some(body) => body.extend(children),
            None => panic!("statement {:?} has no body", parent),
        }
    }

    pub fn children(&self, id: StmtId) -> Vec<StmtId> {
        self.get(id).children()
    }

    /// Removes and returns the body of a loop or block, leaving it empty.
    pub fn take_children(&mut self, id: StmtId) -> Body {
        let body = self.nodes[id]
            .stmt
            .body_mut()
            .map(std::mem::take)
            .unwrap_or_default();
        for &child in &body {
            self.nodes[child].parent = None;
        }
        body
    }

    /// Replaces the body of a loop or block. Statements dropped from the body
    /// lose their parent link.
    pub fn replace_children(&mut self, id: StmtId, children: Body) {
        self.take_children(id);
        for &child in &children {
            self.nodes[child].parent = Some(id);
        }
        if let Some(body) = self.nodes[id].stmt.body_mut() {
            *body = children;
        }
    }

    /// Copies the subtree rooted at `id`; the copy has fresh ids throughout and
    /// no parent.
    pub fn deep_copy(&mut self, id: StmtId) -> StmtId {
        let stmt = match self.get(id).clone() {
            Stmt::For(mut for_loop) => {
                for_loop.body = self.deep_copy_all(&for_loop.body);
                Stmt::For(for_loop)
            }
            Stmt::Block { body, pragma } => Stmt::Block {
                body: self.deep_copy_all(&body),
                pragma,
            },
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => Stmt::If {
                cond,
                then_body: self.deep_copy_all(&then_body),
                else_body: self.deep_copy_all(&else_body),
            },
            stmt @ (Stmt::Call(_) | Stmt::Assign { .. } | Stmt::Decl(_) | Stmt::Raw(_)) => stmt,
        };
        self.alloc(stmt)
    }

    pub fn deep_copy_all(&mut self, ids: &[StmtId]) -> Body {
        ids.iter().map(|&id| self.deep_copy(id)).collect()
    }

    /// Whether any statement reachable from `ids` reads the variable `name`.
    pub fn reads(&self, ids: &[StmtId], name: &str) -> bool {
        ids.iter().any(|&id| {
            let stmt = self.get(id);
            stmt.expressions()
                .into_iter()
                .flat_map(Expr::variables)
                .any(|var| var == name)
                || self.reads(&stmt.children(), name)
        })
    }

    /// Number of statements reachable from `ids`, the roots included.
    pub fn subtree_size(&self, ids: &[StmtId]) -> usize {
        ids.iter()
            .map(|&id| 1 + self.subtree_size(&self.children(id)))
            .sum()
    }
}

/// An emitted procedure: a name and a top-level statement list over a pool.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: SmolStr,
    pub pool: StmtPool,
    pub body: Body,
}

impl Procedure {
    pub fn new(name: impl Into<SmolStr>, pool: StmtPool, body: Body) -> Self {
        Self {
            name: name.into(),
            pool,
            body,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Visits every reachable statement in pre-order together with its depth.
    pub fn walk(&self, mut visit: impl FnMut(StmtId, &Stmt, usize)) {
        fn go(pool: &StmtPool, ids: &[StmtId], depth: usize, visit: &mut impl FnMut(StmtId, &Stmt, usize)) {
            for &id in ids {
                let stmt = pool.get(id);
                visit(id, stmt, depth);
                go(pool, &stmt.children(), depth + 1, visit);
            }
        }

        go(&self.pool, &self.body, 0, &mut visit);
    }
}
