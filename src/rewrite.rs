use std::collections::HashSet;

use swc_core::{
    common::{SyntaxContext, DUMMY_SP},
    ecma::{
        ast::*,
        atoms::Atom,
        utils::find_pat_ids,
        visit::{VisitMut, VisitMutWith},
    },
};
use tracing::{debug, trace};

use crate::{
    capture::{analyze, CaptureSet},
    classify::{classify, classify_attr_value, Binding, Eligibility, SkipReason},
    config::{Config, PrimitiveMatcher},
    lift::{self, is_ui_tree},
    scope::{
        block_bindings, catch_bindings, function_bindings, loop_head_bindings, module_bindings,
        script_bindings, Bindings, ScopeStack, UidGenerator,
    },
};

// -----------------------------------------------------------------------------
// Transform state
// -----------------------------------------------------------------------------

/// Where an inline handler found under the current node may be hoisted to.
enum HoistSite {
    /// Inside a function body, a nested container, or outside any return.
    Closed,
    /// Inside the argument of a terminal UI return; collects the
    /// declarations to splice in front of that return. `pending` holds the
    /// names the body declares after the return.
    Open {
        decls: Vec<Stmt>,
        pending: HashSet<Atom>,
    },
}

#[derive(Debug, Clone, Copy)]
enum MemoKind {
    Callback,
    Value,
}

pub struct PersistTransform {
    config: Config,
    primitives: PrimitiveMatcher,
    // Names the generated calls refer to (`React`, or the bare primitives).
    primitive_refs: Vec<Atom>,
    // Context for references to names with no binding (e.g. `React`).
    unresolved_ctxt: SyntaxContext,

    scopes: ScopeStack,
    uids: UidGenerator,
    sites: Vec<HoistSite>,
}

impl PersistTransform {
    pub fn new(config: Config) -> Self {
        let primitives = config.primitive_matcher();
        let primitive_refs = match config.namespace() {
            Some(ns) => vec![Atom::from(ns)],
            None => vec![
                Atom::from(config.callback_primitive.as_str()),
                Atom::from(config.value_primitive.as_str()),
            ],
        };
        Self {
            config,
            primitives,
            primitive_refs,
            unresolved_ctxt: SyntaxContext::empty(),
            scopes: ScopeStack::default(),
            uids: UidGenerator::default(),
            sites: vec![],
        }
    }

    pub fn with_unresolved_ctxt(mut self, ctxt: SyntaxContext) -> Self {
        self.unresolved_ctxt = ctxt;
        self
    }

    // ---------- builders ----------

    /// Reference to `name`, bound to its nearest declaration if there is one.
    fn scoped_ident(&self, name: &str) -> Ident {
        let sym: Atom = name.into();
        let ctxt = self.scopes.lookup(&sym).unwrap_or(self.unresolved_ctxt);
        Ident::new(sym, DUMMY_SP, ctxt)
    }

    fn primitive_callee(&self, primitive: &str) -> Callee {
        let callee = match self.config.namespace() {
            Some(ns) => Expr::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(Expr::Ident(self.scoped_ident(ns))),
                prop: MemberProp::Ident(IdentName::new(primitive.into(), DUMMY_SP)),
            }),
            None => Expr::Ident(self.scoped_ident(primitive)),
        };
        Callee::Expr(Box::new(callee))
    }

    /// `React.useCallback(body, [deps])` or `React.useMemo(() => body, [deps])`
    fn memo_call(&self, kind: MemoKind, body: Box<Expr>, deps: &CaptureSet) -> Expr {
        let body = lift::take_unparen(body);
        let (primitive, memoized) = match kind {
            MemoKind::Callback => (&self.config.callback_primitive, body),
            MemoKind::Value => (&self.config.value_primitive, Box::new(value_closure(body))),
        };
        Expr::Call(CallExpr {
            span: DUMMY_SP,
            callee: self.primitive_callee(primitive),
            args: vec![
                ExprOrSpread {
                    spread: None,
                    expr: memoized,
                },
                ExprOrSpread {
                    spread: None,
                    expr: Box::new(Expr::Array(deps.to_array_lit())),
                },
            ],
            type_args: None,
            ctxt: SyntaxContext::empty(),
        })
    }

    // ---------- traversal state ----------

    fn enter_function(&mut self, frame: Bindings) {
        self.scopes.push(frame);
        self.sites.push(HoistSite::Closed);
    }

    fn leave_function(&mut self) {
        self.sites.pop();
        self.scopes.pop();
    }

    fn hoisting(&self) -> bool {
        matches!(self.sites.last(), Some(HoistSite::Open { .. }))
    }

    fn site_pending(&self) -> Option<&HashSet<Atom>> {
        match self.sites.last() {
            Some(HoistSite::Open { pending, .. }) => Some(pending),
            _ => None,
        }
    }

    fn hoist(&mut self, decl: Stmt) {
        if let Some(HoistSite::Open { decls, .. }) = self.sites.last_mut() {
            decls.push(decl);
        }
    }

    fn with_frame(&mut self, frame: Bindings, f: impl FnOnce(&mut Self)) {
        self.scopes.push(frame);
        f(self);
        self.scopes.pop();
    }

    // ---------- view function bodies ----------

    /// Walk a function body whose frame has been entered. Every direct
    /// `return <ui tree>` first memoizes the const bindings above it, then
    /// receives the handlers hoisted out of its element attributes.
    fn rewrite_body(&mut self, body: &mut BlockStmt) {
        let mut i = 0;
        while i < body.stmts.len() {
            if !is_ui_return(&body.stmts[i]) {
                body.stmts[i].visit_mut_with(self);
                i += 1;
                continue;
            }

            self.memoize_own_bindings(&mut body.stmts, i);

            self.sites.push(HoistSite::Open {
                decls: vec![],
                pending: declared_names(&body.stmts[i + 1..]),
            });
            body.stmts[i].visit_mut_with(self);
            let hoisted = match self.sites.pop() {
                Some(HoistSite::Open { decls, .. }) => decls,
                _ => vec![],
            };

            let n = hoisted.len();
            body.stmts.splice(i..i, hoisted);
            i += n + 1;
        }
    }

    /// Memoize the declarations among the direct statements in front of
    /// `stmts[ret]`.
    fn memoize_own_bindings(&mut self, stmts: &mut [Stmt], ret: usize) {
        for k in 0..ret {
            let (head, tail) = stmts.split_at_mut(k + 1);
            let Stmt::Decl(Decl::Var(var)) = &mut head[k] else {
                continue;
            };
            // Names still uninitialized while this statement runs.
            let mut pending = declared_names(tail);
            let kind = var.kind;
            for d in var.decls.iter_mut().rev() {
                self.memoize_declarator(kind, d, &pending);
                pending.extend(find_pat_ids::<_, Id>(&d.name).into_iter().map(|(sym, _)| sym));
            }
        }
    }

    fn memoize_declarator(
        &mut self,
        kind: VarDeclKind,
        d: &mut VarDeclarator,
        pending: &HashSet<Atom>,
    ) {
        let Pat::Ident(name) = &d.name else {
            trace!("destructuring declaration left unmemoized");
            return;
        };
        let sym = name.id.sym.clone();

        let memo = match classify(&Binding::from_declarator(kind, d), &self.primitives) {
            Eligibility::MemoizeCallback => MemoKind::Callback,
            Eligibility::MemoizeValue => MemoKind::Value,
            Eligibility::Skip(reason) => {
                trace!(name = %sym, ?reason, "binding left unmemoized");
                return;
            }
        };
        let Some(init) = d.init.as_deref() else {
            return;
        };

        let mut excluded = self.primitive_refs.clone();
        excluded.push(sym.clone());
        let deps = analyze(init, &self.scopes, &excluded);
        if let Some(dep) = first_pending(&deps, pending) {
            trace!(
                name = %sym,
                reason = ?SkipReason::ForwardReference,
                %dep,
                "binding left unmemoized"
            );
            return;
        }

        let Some(init) = d.init.take() else {
            return;
        };
        debug!(name = %sym, ?memo, deps = ?deps.keys(), "memoizing binding");
        d.init = Some(Box::new(self.memo_call(memo, init, &deps)));
    }
}

/// Names declared by the direct statements of `stmts`, except function
/// declarations (those are initialized before the body runs).
fn declared_names(stmts: &[Stmt]) -> HashSet<Atom> {
    let mut out = HashSet::new();
    for stmt in stmts {
        match stmt {
            Stmt::Decl(Decl::Var(v)) => {
                for d in &v.decls {
                    out.extend(find_pat_ids::<_, Id>(&d.name).into_iter().map(|(sym, _)| sym));
                }
            }
            Stmt::Decl(Decl::Class(c)) => {
                out.insert(c.ident.sym.clone());
            }
            _ => {}
        }
    }
    out
}

/// First dependency that would be read before its declaration runs.
fn first_pending(deps: &CaptureSet, pending: &HashSet<Atom>) -> Option<String> {
    deps.iter()
        .find(|dep| pending.contains(&dep.root.sym))
        .map(ToString::to_string)
}

fn is_ui_return(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Return(ReturnStmt { arg: Some(arg), .. }) if is_ui_tree(arg))
}

/// `() => body`, parenthesizing bodies the printer would otherwise misread.
fn value_closure(body: Box<Expr>) -> Expr {
    let body = match *body {
        e @ (Expr::Object(_) | Expr::Seq(_)) => Box::new(Expr::Paren(ParenExpr {
            span: DUMMY_SP,
            expr: Box::new(e),
        })),
        e => Box::new(e),
    };
    Expr::Arrow(ArrowExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        params: vec![],
        body: Box::new(BlockStmtOrExpr::Expr(body)),
        is_async: false,
        is_generator: false,
        type_params: None,
        return_type: None,
    })
}

fn const_decl(name: Ident, init: Expr) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: name,
                type_ann: None,
            }),
            init: Some(Box::new(init)),
            definite: false,
        }],
        ctxt: SyntaxContext::empty(),
    })))
}

fn for_head_decl(head: &ForHead) -> Option<&VarDecl> {
    match head {
        ForHead::VarDecl(v) => Some(&**v),
        _ => None,
    }
}

fn attr_base_name(name: &JSXAttrName) -> String {
    match name {
        JSXAttrName::Ident(ident) => ident.sym.to_string(),
        JSXAttrName::JSXNamespacedName(n) => format!("{}-{}", n.ns.sym, n.name.sym),
    }
}

/// The attribute's value when it is an inline closure worth hoisting.
fn inline_closure(value: &mut Option<JSXAttrValue>) -> Option<&mut Box<Expr>> {
    let Some(JSXAttrValue::JSXExprContainer(JSXExprContainer {
        expr: JSXExpr::Expr(expr),
        ..
    })) = value
    else {
        return None;
    };
    match classify_attr_value(expr) {
        Eligibility::MemoizeCallback => Some(expr),
        Eligibility::Skip(reason) => {
            trace!(?reason, "attribute value left in place");
            None
        }
        Eligibility::MemoizeValue => None,
    }
}

// -----------------------------------------------------------------------------
// Traversal
// -----------------------------------------------------------------------------

impl VisitMut for PersistTransform {
    fn visit_mut_module(&mut self, m: &mut Module) {
        self.uids = UidGenerator::for_module(m);
        self.scopes.push(module_bindings(m));
        m.visit_mut_children_with(self);
        self.scopes.pop();
    }

    fn visit_mut_script(&mut self, s: &mut Script) {
        self.uids = UidGenerator::for_script(s);
        self.scopes.push(script_bindings(s));
        s.visit_mut_children_with(self);
        self.scopes.pop();
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        if lift::ensure_block_body(arrow) {
            trace!("expression-bodied view function given a block body");
        }
        let ArrowExpr { params, body, .. } = arrow;
        match &mut **body {
            BlockStmtOrExpr::BlockStmt(block) => {
                self.enter_function(function_bindings(params.iter(), Some(&block.stmts[..])));
                params.visit_mut_with(self);
                self.rewrite_body(block);
            }
            BlockStmtOrExpr::Expr(expr) => {
                self.enter_function(function_bindings(params.iter(), None));
                params.visit_mut_with(self);
                expr.visit_mut_with(self);
            }
        }
        self.leave_function();
    }

    fn visit_mut_fn_decl(&mut self, n: &mut FnDecl) {
        self.rewrite_function(&mut n.function, None);
    }

    fn visit_mut_fn_expr(&mut self, n: &mut FnExpr) {
        self.rewrite_function(&mut n.function, n.ident.as_ref());
    }

    // Object methods: traversed, never treated as view functions.
    fn visit_mut_function(&mut self, function: &mut Function) {
        let frame = function_bindings(
            function.params.iter().map(|p| &p.pat),
            function.body.as_ref().map(|b| &b.stmts[..]),
        );
        self.enter_function(frame);
        function.visit_mut_children_with(self);
        self.leave_function();
    }

    fn visit_mut_getter_prop(&mut self, n: &mut GetterProp) {
        self.enter_function(Bindings::default());
        n.visit_mut_children_with(self);
        self.leave_function();
    }

    fn visit_mut_setter_prop(&mut self, n: &mut SetterProp) {
        self.enter_function(function_bindings(std::iter::once(&*n.param), None));
        n.visit_mut_children_with(self);
        self.leave_function();
    }

    fn visit_mut_class(&mut self, _: &mut Class) {
        trace!("class body skipped");
    }

    fn visit_mut_block_stmt(&mut self, n: &mut BlockStmt) {
        self.with_frame(block_bindings(&n.stmts), |this| n.visit_mut_children_with(this));
    }

    fn visit_mut_for_stmt(&mut self, n: &mut ForStmt) {
        let frame = loop_head_bindings(match &n.init {
            Some(VarDeclOrExpr::VarDecl(v)) => Some(&**v),
            _ => None,
        });
        self.with_frame(frame, |this| n.visit_mut_children_with(this));
    }

    fn visit_mut_for_in_stmt(&mut self, n: &mut ForInStmt) {
        let frame = loop_head_bindings(for_head_decl(&n.left));
        self.with_frame(frame, |this| n.visit_mut_children_with(this));
    }

    fn visit_mut_for_of_stmt(&mut self, n: &mut ForOfStmt) {
        let frame = loop_head_bindings(for_head_decl(&n.left));
        self.with_frame(frame, |this| n.visit_mut_children_with(this));
    }

    fn visit_mut_catch_clause(&mut self, n: &mut CatchClause) {
        let frame = catch_bindings(n);
        self.with_frame(frame, |this| n.visit_mut_children_with(this));
    }

    fn visit_mut_jsx_expr_container(&mut self, n: &mut JSXExprContainer) {
        if lift::ensure_invocation_boundary(n) {
            trace!("UI tree in expression container wrapped in an invocation boundary");
        }
        self.sites.push(HoistSite::Closed);
        n.visit_mut_children_with(self);
        self.sites.pop();
    }

    fn visit_mut_jsx_attr(&mut self, attr: &mut JSXAttr) {
        if !self.hoisting() {
            attr.visit_mut_children_with(self);
            return;
        }
        let base = attr_base_name(&attr.name);
        let Some(value) = inline_closure(&mut attr.value) else {
            attr.visit_mut_children_with(self);
            return;
        };

        // Captured before the nested rewrites below add references of their own.
        let deps = analyze(&**value, &self.scopes, &self.primitive_refs);
        if let Some(dep) = self.site_pending().and_then(|p| first_pending(&deps, p)) {
            trace!(
                attr = %base,
                reason = ?SkipReason::ForwardReference,
                %dep,
                "inline handler left in place"
            );
            value.visit_mut_with(self);
            return;
        }

        let name = Ident::new(self.uids.generate(&base), DUMMY_SP, SyntaxContext::empty());
        // Handlers and UI trees nested in the closure are rewritten in place first.
        value.visit_mut_with(self);
        let callback = std::mem::replace(value, Box::new(Expr::Ident(name.clone())));

        debug!(
            name = %name.sym,
            deps = ?deps.keys(),
            depth = self.scopes.depth(),
            "hoisting inline handler"
        );
        let decl = const_decl(name.clone(), self.memo_call(MemoKind::Callback, callback, &deps));
        self.scopes.declare(&name);
        self.hoist(decl);
    }
}

impl PersistTransform {
    fn rewrite_function(&mut self, function: &mut Function, own_name: Option<&Ident>) {
        let mut frame = function_bindings(
            function.params.iter().map(|p| &p.pat),
            function.body.as_ref().map(|b| &b.stmts[..]),
        );
        if let Some(ident) = own_name {
            frame.entry(ident.sym.clone()).or_insert(ident.ctxt);
        }
        self.enter_function(frame);
        function.params.visit_mut_with(self);
        function.decorators.visit_mut_with(self);
        if let Some(body) = &mut function.body {
            self.rewrite_body(body);
        }
        self.leave_function();
    }
}
