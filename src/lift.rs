use swc_core::{
    common::{SyntaxContext, DUMMY_SP},
    ecma::ast::*,
};

use crate::classify::{suspends, unparen};

/// An expression that evaluates to a UI tree: a JSX element or fragment,
/// possibly behind parentheses, `?:` branches or `&&`/`||`/`??` operands.
pub fn is_ui_tree(e: &Expr) -> bool {
    match unparen(e) {
        Expr::JSXElement(_) | Expr::JSXFragment(_) => true,
        Expr::Cond(c) => is_ui_tree(&c.test) || is_ui_tree(&c.cons) || is_ui_tree(&c.alt),
        Expr::Bin(b) if is_logical(b.op) => is_ui_tree(&b.left) || is_ui_tree(&b.right),
        _ => false,
    }
}

fn is_logical(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing
    )
}

pub(crate) fn take_unparen(expr: Box<Expr>) -> Box<Expr> {
    match *expr {
        Expr::Paren(p) => take_unparen(p.expr),
        e => Box::new(e),
    }
}

fn return_block(tree: Box<Expr>) -> BlockStmt {
    BlockStmt {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        stmts: vec![Stmt::Return(ReturnStmt {
            span: DUMMY_SP,
            arg: Some(take_unparen(tree)),
        })],
    }
}

fn placeholder() -> Box<Expr> {
    Box::new(Expr::Invalid(Invalid { span: DUMMY_SP }))
}

/// `() => <el />` becomes `() => { return <el />; }` so memoization
/// statements can precede the return.
pub fn ensure_block_body(arrow: &mut ArrowExpr) -> bool {
    let BlockStmtOrExpr::Expr(body) = &mut *arrow.body else {
        return false;
    };
    if !is_ui_tree(body) {
        return false;
    }
    let tree = std::mem::replace(body, placeholder());
    *arrow.body = BlockStmtOrExpr::BlockStmt(return_block(tree));
    true
}

/// `{cond && <el />}` becomes `{(() => { return cond && <el />; })()}`.
///
/// The synthetic closure runs on every evaluation of the container, so
/// memoization calls placed in it execute unconditionally; the branching
/// stays inside its return expression. Trees that `await` or `yield` stay
/// put: the closure is neither async nor a generator.
pub fn ensure_invocation_boundary(container: &mut JSXExprContainer) -> bool {
    let JSXExpr::Expr(expr) = &mut container.expr else {
        return false;
    };
    if !is_ui_tree(expr) || suspends(expr) {
        return false;
    }
    let tree = std::mem::replace(expr, placeholder());
    *expr = Box::new(iife(return_block(tree)));
    true
}

fn iife(body: BlockStmt) -> Expr {
    let closure = Expr::Arrow(ArrowExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        params: vec![],
        body: Box::new(BlockStmtOrExpr::BlockStmt(body)),
        is_async: false,
        is_generator: false,
        type_params: None,
        return_type: None,
    });
    Expr::Call(CallExpr {
        span: DUMMY_SP,
        callee: Callee::Expr(Box::new(Expr::Paren(ParenExpr {
            span: DUMMY_SP,
            expr: Box::new(closure),
        }))),
        args: vec![],
        type_args: None,
        ctxt: SyntaxContext::empty(),
    })
}
