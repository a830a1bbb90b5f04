use swc_core::ecma::{
    ast::*,
    visit::{Visit, VisitWith},
};

use crate::config::PrimitiveMatcher;

/// A candidate declaration, as seen by the classifier.
///
/// Only direct statements of the view function body are ever turned into a
/// `Binding`; parameters, nested blocks and outer scopes never reach here.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub kind: VarDeclKind,
    pub init: Option<&'a Expr>,
}

impl<'a> Binding<'a> {
    pub fn from_declarator(kind: VarDeclKind, d: &'a VarDeclarator) -> Self {
        Self {
            kind,
            init: d.init.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Initializer already calls a stateful/memoization primitive.
    AlreadyMemoized,
    Reassignable,
    NoInitializer,
    /// Initializer awaits or yields; moving it into a closure would change
    /// which function suspends.
    Suspends,
    /// Dependencies name a binding declared further down the body, which is
    /// still uninitialized where the dependency list is evaluated.
    ForwardReference,
    /// Attribute value is a reference (identifier or member), not a closure.
    ExternalReference,
    /// Attribute value is neither a closure nor a reference.
    NotAClosure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Skip(SkipReason),
    MemoizeCallback,
    MemoizeValue,
}

pub(crate) fn unparen(mut e: &Expr) -> &Expr {
    while let Expr::Paren(p) = e {
        e = &p.expr;
    }
    e
}

pub(crate) fn is_function_expr(e: &Expr) -> bool {
    matches!(unparen(e), Expr::Arrow(_) | Expr::Fn(_))
}

struct SuspensionFinder {
    found: bool,
}

impl Visit for SuspensionFinder {
    fn visit_await_expr(&mut self, _: &AwaitExpr) {
        self.found = true;
    }

    fn visit_yield_expr(&mut self, _: &YieldExpr) {
        self.found = true;
    }

    // Nested functions suspend themselves, not the enclosing one.
    fn visit_function(&mut self, _: &Function) {}
    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
}

/// Whether evaluating `e` may suspend the enclosing async function or
/// generator (`await` / `yield` outside any nested function).
pub fn suspends(e: &Expr) -> bool {
    let mut finder = SuspensionFinder { found: false };
    e.visit_with(&mut finder);
    finder.found
}

/// `useFoo(...)`, `React.useFoo(...)`
pub fn calls_primitive(e: &Expr, primitives: &PrimitiveMatcher) -> bool {
    let Expr::Call(call) = unparen(e) else {
        return false;
    };
    let Callee::Expr(callee) = &call.callee else {
        return false;
    };
    match unparen(callee) {
        Expr::Ident(id) => primitives.is_match(&id.sym),
        Expr::Member(m) => match &m.prop {
            MemberProp::Ident(prop) => primitives.is_match(&prop.sym),
            _ => false,
        },
        _ => false,
    }
}

/// Decide how a local declaration feeding a returned UI tree is memoized.
pub fn classify(binding: &Binding<'_>, primitives: &PrimitiveMatcher) -> Eligibility {
    let Some(init) = binding.init else {
        return Eligibility::Skip(SkipReason::NoInitializer);
    };
    if calls_primitive(init, primitives) {
        return Eligibility::Skip(SkipReason::AlreadyMemoized);
    }
    if suspends(init) {
        return Eligibility::Skip(SkipReason::Suspends);
    }
    if binding.kind != VarDeclKind::Const {
        return Eligibility::Skip(SkipReason::Reassignable);
    }
    if is_function_expr(init) {
        Eligibility::MemoizeCallback
    } else {
        Eligibility::MemoizeValue
    }
}

/// Decide whether an element attribute value is an inline closure to hoist.
///
/// References (`onClick={handler}`, `onClick={props.onClose}`) are already
/// stable or owned elsewhere and stay as written.
pub fn classify_attr_value(value: &Expr) -> Eligibility {
    match unparen(value) {
        Expr::Arrow(_) | Expr::Fn(_) => Eligibility::MemoizeCallback,
        Expr::Ident(_) | Expr::Member(_) | Expr::OptChain(_) => {
            Eligibility::Skip(SkipReason::ExternalReference)
        }
        _ => Eligibility::Skip(SkipReason::NotAClosure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_core::ecma::transforms::testing::Tester;

    /// Classify every declarator of the first statement of `src`.
    fn classify_first(src: &str) -> Vec<Eligibility> {
        Tester::run(|tester| {
            let module = tester.parse_module("input.js", src)?;
            let ModuleItem::Stmt(Stmt::Decl(Decl::Var(v))) = &module.body[0] else {
                panic!("fixture must start with a variable declaration");
            };
            let primitives = PrimitiveMatcher::default();
            Ok(v.decls
                .iter()
                .map(|d| classify(&Binding::from_declarator(v.kind, d), &primitives))
                .collect())
        })
    }

    fn attr_value(src: &str) -> Eligibility {
        Tester::run(|tester| {
            let module = tester.parse_module("input.js", src)?;
            let ModuleItem::Stmt(Stmt::Expr(stmt)) = &module.body[0] else {
                panic!("fixture must be an expression statement");
            };
            Ok(classify_attr_value(&stmt.expr))
        })
    }

    #[test]
    fn function_initializers_become_callbacks() {
        assert_eq!(
            classify_first("const a = () => 1, b = function () {}, c = (() => 2);"),
            [Eligibility::MemoizeCallback; 3]
        );
    }

    #[test]
    fn other_initializers_become_values() {
        assert_eq!(
            classify_first("const a = list.filter(Boolean), b = { x: 1 }, c = 5;"),
            [Eligibility::MemoizeValue; 3]
        );
    }

    #[test]
    fn primitives_are_never_wrapped_twice() {
        assert_eq!(
            classify_first(
                "const a = useCallback(() => {}, []), b = React.useMemo(() => 1, []), \
                 [c, setC] = useState(0), d = useRef();"
            ),
            [Eligibility::Skip(SkipReason::AlreadyMemoized); 4]
        );
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        assert_eq!(
            classify_first("const a = User(), b = api.UseThing(), c = reuse();"),
            [Eligibility::MemoizeValue; 3]
        );
    }

    #[test]
    fn reassignable_bindings_are_skipped() {
        assert_eq!(
            classify_first("let a = data.map(f);"),
            [Eligibility::Skip(SkipReason::Reassignable)]
        );
        assert_eq!(
            classify_first("var b = () => 1;"),
            [Eligibility::Skip(SkipReason::Reassignable)]
        );
    }

    #[test]
    fn suspending_initializers_are_skipped() {
        let found = Tester::run(|tester| {
            let module = tester.parse_module(
                "input.js",
                "async function* view() {
                     const a = await load(), b = (yield) + 1, c = async () => await load(),
                         d = function* () { yield 1; };
                 }",
            )?;
            let ModuleItem::Stmt(Stmt::Decl(Decl::Fn(f))) = &module.body[0] else {
                panic!("fixture must be a function declaration");
            };
            let body = f.function.body.as_ref().expect("function has a body");
            let Stmt::Decl(Decl::Var(v)) = &body.stmts[0] else {
                panic!("body must start with a variable declaration");
            };
            let primitives = PrimitiveMatcher::default();
            Ok(v.decls
                .iter()
                .map(|d| classify(&Binding::from_declarator(v.kind, d), &primitives))
                .collect::<Vec<_>>())
        });
        assert_eq!(
            found,
            [
                Eligibility::Skip(SkipReason::Suspends),
                Eligibility::Skip(SkipReason::Suspends),
                Eligibility::MemoizeCallback,
                Eligibility::MemoizeCallback,
            ]
        );
    }

    #[test]
    fn let_without_initializer_is_skipped() {
        assert_eq!(
            classify_first("let pending;"),
            [Eligibility::Skip(SkipReason::NoInitializer)]
        );
    }

    #[test]
    fn attribute_values() {
        assert_eq!(attr_value("() => alert(text)"), Eligibility::MemoizeCallback);
        assert_eq!(attr_value("(function (e) {})"), Eligibility::MemoizeCallback);
        assert_eq!(
            attr_value("onClick"),
            Eligibility::Skip(SkipReason::ExternalReference)
        );
        assert_eq!(
            attr_value("props.onClose"),
            Eligibility::Skip(SkipReason::ExternalReference)
        );
        assert_eq!(
            attr_value("useCallback(() => {}, [])"),
            Eligibility::Skip(SkipReason::NotAClosure)
        );
    }
}
