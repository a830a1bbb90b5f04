//! Dependency capture for memoized closures and values.
//!
//! `analyze` walks an expression and returns the externally bound names it
//! reads, in first-occurrence order, followed by the dot-only property chains
//! rooted at those names. Names bound inside the expression itself (closure
//! parameters, locals of nested closures) and globals are never captured.

use std::fmt;

use swc_core::{
    common::DUMMY_SP,
    ecma::{
        ast::*,
        atoms::Atom,
        visit::{Visit, VisitWith},
    },
};

use crate::scope::{
    block_bindings, catch_bindings, function_bindings, loop_head_bindings, Bindings, ScopeStack,
};

// -----------------------------------------------------------------------------
// Capture set
// -----------------------------------------------------------------------------

/// One dependency-list entry: a root identifier and an optional dot path.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub root: Ident,
    pub path: Vec<IdentName>,
}

impl Dependency {
    fn same_as(&self, other: &Dependency) -> bool {
        self.root.sym == other.root.sym
            && self.path.len() == other.path.len()
            && self.path.iter().zip(&other.path).all(|(a, b)| a.sym == b.sym)
    }

    /// Rebuild the access as an expression. The root keeps the syntax
    /// context of the source reference so hygiene still resolves it.
    pub fn to_expr(&self) -> Expr {
        let root = Expr::Ident(Ident::new(self.root.sym.clone(), DUMMY_SP, self.root.ctxt));
        self.path.iter().fold(root, |obj, seg| {
            Expr::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(obj),
                prop: MemberProp::Ident(IdentName::new(seg.sym.clone(), DUMMY_SP)),
            })
        })
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root.sym)?;
        for seg in &self.path {
            write!(f, ".{}", seg.sym)?;
        }
        Ok(())
    }
}

/// Ordered, duplicate-free dependency list.
#[derive(Debug, Clone, Default)]
pub struct CaptureSet {
    deps: Vec<Dependency>,
}

impl CaptureSet {
    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.deps.iter()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Dotted keys, e.g. `["history", "obj.field"]`.
    pub fn keys(&self) -> Vec<String> {
        self.deps.iter().map(ToString::to_string).collect()
    }

    /// `[a, b, obj.field]`
    pub fn to_array_lit(&self) -> ArrayLit {
        ArrayLit {
            span: DUMMY_SP,
            elems: self
                .deps
                .iter()
                .map(|dep| {
                    Some(ExprOrSpread {
                        spread: None,
                        expr: Box::new(dep.to_expr()),
                    })
                })
                .collect(),
        }
    }
}

// -----------------------------------------------------------------------------
// Analysis
// -----------------------------------------------------------------------------

/// Compute the capture set of `expr` against the `enclosing` scopes.
///
/// `excluded` names are never captured even when bound outside (the host
/// closure's own parameters, or the name a memoized binding declares).
pub fn analyze(expr: &Expr, enclosing: &ScopeStack, excluded: &[Atom]) -> CaptureSet {
    let mut analyzer = CaptureAnalyzer {
        enclosing,
        excluded,
        inner: vec![],
        roots: vec![],
        chains: vec![],
    };
    expr.visit_with(&mut analyzer);

    let mut deps = analyzer.roots;
    for chain in analyzer.chains {
        if !deps.iter().any(|d| d.same_as(&chain)) {
            deps.push(chain);
        }
    }
    CaptureSet { deps }
}

struct CaptureAnalyzer<'a> {
    enclosing: &'a ScopeStack,
    excluded: &'a [Atom],
    // Names bound by closures nested in the analyzed expression.
    inner: Vec<Bindings>,
    roots: Vec<Dependency>,
    chains: Vec<Dependency>,
}

impl CaptureAnalyzer<'_> {
    fn is_capturable(&self, sym: &Atom) -> bool {
        !self.excluded.contains(sym)
            && !self.inner.iter().any(|frame| frame.contains_key(sym))
            && self.enclosing.has_binding(sym)
    }

    fn reference(&mut self, ident: &Ident) {
        if !self.is_capturable(&ident.sym) {
            return;
        }
        if self.roots.iter().any(|d| d.root.sym == ident.sym) {
            return;
        }
        self.roots.push(Dependency {
            root: ident.clone(),
            path: vec![],
        });
    }

    fn reference_chain(&mut self, root: &Ident, path: Vec<IdentName>) {
        self.reference(root);
        if !self.is_capturable(&root.sym) {
            return;
        }
        let chain = Dependency {
            root: root.clone(),
            path,
        };
        if !self.chains.iter().any(|d| d.same_as(&chain)) {
            self.chains.push(chain);
        }
    }

    fn with_frame(&mut self, frame: Bindings, f: impl FnOnce(&mut Self)) {
        self.inner.push(frame);
        f(self);
        self.inner.pop();
    }
}

/// Split `a.b.c` into its root identifier and dot segments. `None` when the
/// chain has a computed or private segment, or is not rooted at an identifier.
pub(crate) fn dot_chain(member: &MemberExpr) -> Option<(&Ident, Vec<IdentName>)> {
    fn walk<'a>(e: &'a Expr, path: &mut Vec<IdentName>) -> Option<&'a Ident> {
        match e {
            Expr::Ident(i) => Some(i),
            Expr::Member(m) => {
                let root = walk(&m.obj, path)?;
                match &m.prop {
                    MemberProp::Ident(p) => {
                        path.push(p.clone());
                        Some(root)
                    }
                    MemberProp::Computed(_) | MemberProp::PrivateName(_) => None,
                }
            }
            _ => None,
        }
    }
    let mut path = vec![];
    let root = walk(&member.obj, &mut path)?;
    match &member.prop {
        MemberProp::Ident(p) => path.push(p.clone()),
        MemberProp::Computed(_) | MemberProp::PrivateName(_) => return None,
    }
    Some((root, path))
}

fn for_head_decl(head: &ForHead) -> Option<&VarDecl> {
    match head {
        ForHead::VarDecl(v) => Some(&**v),
        _ => None,
    }
}

impl Visit for CaptureAnalyzer<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(i) => self.reference(i),
            Expr::Member(m) => match dot_chain(m) {
                Some((root, path)) => self.reference_chain(root, path),
                // Computed access: keep the root, visit the key expression.
                None => m.visit_with(self),
            },
            _ => expr.visit_children_with(self),
        }
    }

    // `obj.method()` depends on `obj`, not on the detached method.
    fn visit_callee(&mut self, callee: &Callee) {
        if let Callee::Expr(e) = callee {
            if let Expr::Member(m) = &**e {
                if dot_chain(m).is_some() {
                    m.obj.visit_with(self);
                    return;
                }
            }
        }
        callee.visit_children_with(self);
    }

    fn visit_prop(&mut self, prop: &Prop) {
        match prop {
            Prop::Shorthand(i) => self.reference(i),
            _ => prop.visit_children_with(self),
        }
    }

    fn visit_simple_assign_target(&mut self, target: &SimpleAssignTarget) {
        match target {
            SimpleAssignTarget::Ident(b) => self.reference(&b.id),
            _ => target.visit_children_with(self),
        }
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        let body = match &*arrow.body {
            BlockStmtOrExpr::BlockStmt(b) => Some(&b.stmts[..]),
            BlockStmtOrExpr::Expr(_) => None,
        };
        let frame = function_bindings(&arrow.params, body);
        self.with_frame(frame, |this| arrow.visit_children_with(this));
    }

    fn visit_function(&mut self, function: &Function) {
        let body = function.body.as_ref().map(|b| &b.stmts[..]);
        let frame = function_bindings(function.params.iter().map(|p| &p.pat), body);
        self.with_frame(frame, |this| function.visit_children_with(this));
    }

    fn visit_fn_expr(&mut self, n: &FnExpr) {
        let mut frame = Bindings::default();
        if let Some(ident) = &n.ident {
            frame.insert(ident.sym.clone(), ident.ctxt);
        }
        self.with_frame(frame, |this| n.function.visit_with(this));
    }

    fn visit_class_expr(&mut self, n: &ClassExpr) {
        let mut frame = Bindings::default();
        if let Some(ident) = &n.ident {
            frame.insert(ident.sym.clone(), ident.ctxt);
        }
        self.with_frame(frame, |this| n.class.visit_with(this));
    }

    fn visit_catch_clause(&mut self, n: &CatchClause) {
        self.with_frame(catch_bindings(n), |this| n.body.visit_children_with(this));
    }

    fn visit_block_stmt(&mut self, n: &BlockStmt) {
        self.with_frame(block_bindings(&n.stmts), |this| n.visit_children_with(this));
    }

    fn visit_for_stmt(&mut self, n: &ForStmt) {
        let head = match &n.init {
            Some(VarDeclOrExpr::VarDecl(v)) => Some(&**v),
            _ => None,
        };
        self.with_frame(loop_head_bindings(head), |this| n.visit_children_with(this));
    }

    fn visit_for_in_stmt(&mut self, n: &ForInStmt) {
        self.with_frame(loop_head_bindings(for_head_decl(&n.left)), |this| {
            n.visit_children_with(this)
        });
    }

    fn visit_for_of_stmt(&mut self, n: &ForOfStmt) {
        self.with_frame(loop_head_bindings(for_head_decl(&n.left)), |this| {
            n.visit_children_with(this)
        });
    }
}
