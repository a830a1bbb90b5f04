//! SWC plugin that memoizes closures and derived values inside React view
//! functions.
//!
//! Inline element handlers are hoisted into `React.useCallback` declarations,
//! `const` bindings feeding a returned JSX tree are wrapped in
//! `React.useCallback` / `React.useMemo`, and JSX produced in expression
//! positions is moved behind an invocation boundary so those calls always run
//! unconditionally and in the same order.

use swc_core::{
    common::SyntaxContext,
    ecma::{
        ast::{Pass, Program},
        visit::{visit_mut_pass, VisitMutWith},
    },
    plugin::{plugin_transform, proxies::TransformPluginProgramMetadata},
};

mod capture;
mod classify;
mod config;
mod lift;
mod rewrite;
mod scope;

pub use capture::{analyze, CaptureSet, Dependency};
pub use classify::{classify, classify_attr_value, suspends, Binding, Eligibility, SkipReason};
pub use config::{Config, PrimitiveMatcher};
pub use lift::{ensure_block_body, ensure_invocation_boundary, is_ui_tree};
pub use rewrite::PersistTransform;
pub use scope::{ScopeStack, UidGenerator};

/// The transform as a pass, for hosts that run it natively.
pub fn persist(config: Config) -> impl Pass {
    visit_mut_pass(PersistTransform::new(config))
}

// -----------------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------------

#[plugin_transform]
pub fn process_transform(mut program: Program, metadata: TransformPluginProgramMetadata) -> Program {
    let config = metadata
        .get_transform_plugin_config()
        .map(|raw| Config::from_json(&raw))
        .unwrap_or_default();

    // Globals such as `React` resolve like any other unbound reference.
    let unresolved = SyntaxContext::empty().apply_mark(metadata.unresolved_mark);

    let mut transform = PersistTransform::new(config).with_unresolved_ctxt(unresolved);
    program.visit_mut_with(&mut transform);

    program
}
