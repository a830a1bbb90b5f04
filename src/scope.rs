use std::collections::{HashMap, HashSet};

use swc_core::{
    common::SyntaxContext,
    ecma::{
        ast::*,
        atoms::Atom,
        utils::find_pat_ids,
        visit::{Visit, VisitWith},
    },
};

// -----------------------------------------------------------------------------
// Declared names
// -----------------------------------------------------------------------------

/// Names declared by a function (or program) body, keyed by symbol.
pub type Bindings = HashMap<Atom, SyntaxContext>;

/// Collects the names a body declares without crossing into nested
/// functions or classes. `var` declarations count at any block depth;
/// `let`/`const`, function and class declarations only when they are direct
/// statements of the body, since nested blocks get frames of their own.
struct DeclCollector<'a> {
    out: &'a mut Bindings,
    nested: bool,
}

impl<'a> DeclCollector<'a> {
    fn new(out: &'a mut Bindings) -> Self {
        Self { out, nested: false }
    }

    fn add_pat(&mut self, pat: &Pat) {
        for (sym, ctxt) in find_pat_ids::<_, Id>(pat) {
            self.out.entry(sym).or_insert(ctxt);
        }
    }

    fn add_ident(&mut self, ident: &Ident) {
        self.out.entry(ident.sym.clone()).or_insert(ident.ctxt);
    }

    fn in_nested_block(&mut self, f: impl FnOnce(&mut Self)) {
        let was = std::mem::replace(&mut self.nested, true);
        f(self);
        self.nested = was;
    }
}

impl Visit for DeclCollector<'_> {
    fn visit_var_decl(&mut self, n: &VarDecl) {
        if self.nested && n.kind != VarDeclKind::Var {
            return;
        }
        for d in &n.decls {
            self.add_pat(&d.name);
        }
    }

    fn visit_fn_decl(&mut self, n: &FnDecl) {
        if !self.nested {
            self.add_ident(&n.ident);
        }
    }

    fn visit_class_decl(&mut self, n: &ClassDecl) {
        if !self.nested {
            self.add_ident(&n.ident);
        }
    }

    fn visit_block_stmt(&mut self, n: &BlockStmt) {
        self.in_nested_block(|this| n.visit_children_with(this));
    }

    fn visit_for_stmt(&mut self, n: &ForStmt) {
        self.in_nested_block(|this| n.visit_children_with(this));
    }

    fn visit_for_in_stmt(&mut self, n: &ForInStmt) {
        self.in_nested_block(|this| n.visit_children_with(this));
    }

    fn visit_for_of_stmt(&mut self, n: &ForOfStmt) {
        self.in_nested_block(|this| n.visit_children_with(this));
    }

    fn visit_switch_stmt(&mut self, n: &SwitchStmt) {
        self.in_nested_block(|this| n.visit_children_with(this));
    }

    // The parameter belongs to the handler block's frame.
    fn visit_catch_clause(&mut self, n: &CatchClause) {
        n.body.visit_with(self);
    }

    fn visit_import_decl(&mut self, n: &ImportDecl) {
        for s in &n.specifiers {
            match s {
                ImportSpecifier::Named(named) => self.add_ident(&named.local),
                ImportSpecifier::Default(def) => self.add_ident(&def.local),
                ImportSpecifier::Namespace(ns) => self.add_ident(&ns.local),
            }
        }
    }

    // Expressions only declare through nested functions, which own their names.
    fn visit_expr(&mut self, _: &Expr) {}
    fn visit_function(&mut self, _: &Function) {}
    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
    fn visit_class(&mut self, _: &Class) {}
}

pub(crate) fn declared_in_stmts(stmts: &[Stmt], out: &mut Bindings) {
    let mut collector = DeclCollector::new(out);
    for stmt in stmts {
        stmt.visit_with(&mut collector);
    }
}

pub(crate) fn declared_in_pats<'a>(pats: impl IntoIterator<Item = &'a Pat>, out: &mut Bindings) {
    let mut collector = DeclCollector::new(out);
    for pat in pats {
        collector.add_pat(pat);
    }
}

/// Bindings owned by a function: its parameters plus everything its body
/// declares.
pub(crate) fn function_bindings<'a>(
    params: impl IntoIterator<Item = &'a Pat>,
    body: Option<&[Stmt]>,
) -> Bindings {
    let mut out = Bindings::default();
    declared_in_pats(params, &mut out);
    if let Some(stmts) = body {
        declared_in_stmts(stmts, &mut out);
    }
    out
}

pub(crate) fn module_bindings(module: &Module) -> Bindings {
    let mut out = Bindings::default();
    module.visit_with(&mut DeclCollector::new(&mut out));
    out
}

pub(crate) fn script_bindings(script: &Script) -> Bindings {
    block_bindings(&script.body)
}

/// Frame of a nested block: its own lexical declarations (and any `var`s,
/// which the enclosing function frame already holds).
pub(crate) fn block_bindings(stmts: &[Stmt]) -> Bindings {
    let mut out = Bindings::default();
    declared_in_stmts(stmts, &mut out);
    out
}

/// Frame of a loop head: `for (let i = 0; ...)`, `for (const k in o)`.
pub(crate) fn loop_head_bindings(decl: Option<&VarDecl>) -> Bindings {
    let mut out = Bindings::default();
    if let Some(decl) = decl {
        declared_in_pats(decl.decls.iter().map(|d| &d.name), &mut out);
    }
    out
}

/// Frame of a catch handler: its parameter plus the handler block.
pub(crate) fn catch_bindings(n: &CatchClause) -> Bindings {
    let mut out = Bindings::default();
    declared_in_pats(n.param.iter(), &mut out);
    declared_in_stmts(&n.body.stmts, &mut out);
    out
}

// -----------------------------------------------------------------------------
// Scope stack
// -----------------------------------------------------------------------------

/// Lexical scopes from the program down to the function being rewritten.
///
/// Resolution is by name, the way the host's scope service answers
/// `hasBinding(name)`. Functions, nested blocks, loop heads and catch
/// handlers each contribute a frame.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Bindings>,
}

impl ScopeStack {
    pub fn push(&mut self, frame: Bindings) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Add a name to the innermost frame (used for generated declarations).
    pub fn declare(&mut self, ident: &Ident) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(ident.sym.clone(), ident.ctxt);
        }
    }

    pub fn has_binding(&self, sym: &Atom) -> bool {
        self.frames.iter().any(|frame| frame.contains_key(sym))
    }

    /// Syntax context of the nearest binding named `sym`.
    pub fn lookup(&self, sym: &Atom) -> Option<SyntaxContext> {
        self.frames.iter().rev().find_map(|frame| frame.get(sym).copied())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

// -----------------------------------------------------------------------------
// Unique names
// -----------------------------------------------------------------------------

/// Program-wide generator of fresh identifiers: `_onClick`, `_onClick2`, ...
#[derive(Debug, Default)]
pub struct UidGenerator {
    taken: HashSet<Atom>,
}

struct IdentCollector<'a> {
    out: &'a mut HashSet<Atom>,
}

impl Visit for IdentCollector<'_> {
    fn visit_ident(&mut self, n: &Ident) {
        self.out.insert(n.sym.clone());
    }
}

impl UidGenerator {
    /// Seed with every identifier already used in the module.
    pub fn for_module(module: &Module) -> Self {
        Self::seeded(|collector| module.visit_with(collector))
    }

    pub fn for_script(script: &Script) -> Self {
        Self::seeded(|collector| script.visit_with(collector))
    }

    fn seeded(walk: impl FnOnce(&mut IdentCollector<'_>)) -> Self {
        let mut gen = Self::default();
        walk(&mut IdentCollector { out: &mut gen.taken });
        gen
    }

    pub fn generate(&mut self, base: &str) -> Atom {
        let base = sanitize(base);
        let mut i = 1usize;
        loop {
            let candidate: Atom = if i > 1 {
                format!("_{base}{i}").into()
            } else {
                format!("_{base}").into()
            };
            i += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// `on-click` → `onClick`, `_handler2` → `handler`.
fn sanitize(base: &str) -> String {
    let mut out = String::with_capacity(base.len());
    let mut upper_next = false;
    for c in base.chars() {
        if c == '$' || c == '_' || c.is_ascii_alphanumeric() {
            if upper_next && !out.is_empty() {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            upper_next = false;
        } else {
            upper_next = true;
        }
    }
    let trimmed = out
        .trim_start_matches('_')
        .trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.is_empty() || trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("ref{trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_core::ecma::transforms::testing::Tester;

    fn parse(src: &str) -> Module {
        Tester::run(|tester| tester.parse_module("input.js", src))
    }

    #[test]
    fn uids_skip_existing_names() {
        let module = parse("const _onClick = 1; function f() { return _onClick2; }");
        let mut uids = UidGenerator::for_module(&module);
        assert_eq!(&*uids.generate("onClick"), "_onClick3");
        assert_eq!(&*uids.generate("onClick"), "_onClick4");
        assert_eq!(&*uids.generate("onChange"), "_onChange");
    }

    #[test]
    fn uid_bases_are_normalized() {
        let mut uids = UidGenerator::default();
        assert_eq!(&*uids.generate("on-mouse-enter"), "_onMouseEnter");
        assert_eq!(&*uids.generate("__handler12"), "_handler");
        assert_eq!(&*uids.generate("42"), "_ref");
        assert_eq!(&*uids.generate(""), "_ref2");
    }

    #[test]
    fn module_bindings_do_not_leak_from_functions() {
        let module = parse(
            "import React, { useState as useS } from 'react';
             import * as api from './api';
             const a = 1, { b, c: [d] } = obj;
             function outer(p) { const inner = p; }
             class Widget {}
             if (a) { var hoisted = 2; }
             try {} catch (err) {}",
        );
        let bindings = module_bindings(&module);
        let mut names: Vec<&str> = bindings.keys().map(|s| &**s).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            ["React", "Widget", "a", "api", "b", "d", "hoisted", "outer", "useS"]
        );
    }

    #[test]
    fn block_scoped_names_stay_in_their_block() {
        let module = parse(
            "function view(p) {
                 const top = 1;
                 if (p) { const inner = 2; let other; function helper() {} var lifted; }
                 for (let i = 0; i < 3; i++) { const step = i; }
                 for (const key in p) {}
                 switch (p) { case 1: let picked = p; }
                 try {} catch (err) { const reason = err; }
             }",
        );
        let ModuleItem::Stmt(Stmt::Decl(Decl::Fn(f))) = &module.body[0] else {
            panic!("fixture must be a function declaration");
        };
        let body = f.function.body.as_ref().expect("function has a body");
        let frame = function_bindings(f.function.params.iter().map(|p| &p.pat), Some(&body.stmts[..]));
        let mut names: Vec<&str> = frame.keys().map(|s| &**s).collect();
        names.sort_unstable();
        assert_eq!(names, ["lifted", "p", "top"]);

        let Stmt::Try(t) = &body.stmts[5] else {
            panic!("sixth statement must be a try statement");
        };
        let handler = t.handler.as_ref().expect("try has a catch clause");
        let mut names: Vec<String> = catch_bindings(handler).keys().map(|s| s.to_string()).collect();
        names.sort_unstable();
        assert_eq!(names, ["err", "reason"]);
    }

    #[test]
    fn scope_lookup_prefers_innermost_frame() {
        let mut scopes = ScopeStack::default();
        let outer = SyntaxContext::empty();
        let mut frame = Bindings::default();
        frame.insert("value".into(), outer);
        scopes.push(frame);
        assert!(scopes.has_binding(&"value".into()));
        assert!(!scopes.has_binding(&"other".into()));

        scopes.push(Bindings::default());
        scopes.declare(&Ident::new("other".into(), Default::default(), outer));
        assert!(scopes.has_binding(&"other".into()));
        assert_eq!(scopes.depth(), 2);

        scopes.pop();
        assert!(!scopes.has_binding(&"other".into()));
        assert_eq!(scopes.lookup(&"value".into()), Some(outer));
    }
}
