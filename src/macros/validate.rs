use crate::language::{
    ast::{Tree, TreeKind},
    errors::Reporter,
    symbols::{SymbolId, SymbolKind, SymbolTable},
};
use crate::macros::{
    compat::check_candidates, errors::MacroError, signature::derive_candidates, ImplRef,
    MacroDefinition,
};
use crate::typecheck::infer::InferState;
use tracing::debug;

/// Check a macro definition's body and resolve its implementation. On
/// success the definition carries its `resolved_impl` annotation; on any
/// failure it is flagged erroneous and deeper checks stop.
pub fn validate_definition(
    def: &mut MacroDefinition,
    table: &mut SymbolTable,
    infer: &mut InferState,
    reporter: &mut Reporter,
) -> bool {
    if def.erroneous {
        return false;
    }
    match validate_inner(def, table, infer) {
        Ok(impl_ref) => {
            def.resolved_impl = Some(impl_ref);
            debug!(
                def = table.get(def.sym).name.as_str(),
                impl_method = table.get(impl_ref.method).name.as_str(),
                "macro definition validated"
            );
            true
        }
        Err(error) => {
            reporter.report(error.to_compile_error());
            def.erroneous = true;
            table.get_mut(def.sym).erroneous = true;
            false
        }
    }
}

fn validate_inner(
    def: &MacroDefinition,
    table: &mut SymbolTable,
    infer: &mut InferState,
) -> Result<ImplRef, MacroError> {
    check_shape(&def.body)?;
    let method = resolve_body(&def.body, table)?;
    check_accessibility(&def.body, table)?;

    let method_sym = table.get(method);
    let Some(impl_sig) = method_sym.signature.clone() else {
        return Err(MacroError::Accessibility {
            path: def.body.canonical(),
            span: def.body.span,
        });
    };

    let candidates = derive_candidates(def);
    let chosen = check_candidates(&candidates, &impl_sig, infer, def.body.span)?;
    Ok(ImplRef {
        method,
        with_evidence: candidates.len() == 2 && chosen == 0,
    })
}

/// Before resolution the body must already look like a reference to a
/// separately compiled callable.
fn check_shape(body: &Tree) -> Result<(), MacroError> {
    match body.kind {
        TreeKind::Apply { .. }
        | TreeKind::TypeApply { .. }
        | TreeKind::Super
        | TreeKind::This
        | TreeKind::Ident(_)
        | TreeKind::Select { .. } => Ok(()),
        TreeKind::Literal(_) => Err(MacroError::Shape {
            found: body.shape_name().to_string(),
            span: body.span,
        }),
    }
}

fn resolve_body(body: &Tree, table: &SymbolTable) -> Result<SymbolId, MacroError> {
    let Some(method) = body.callee_sym() else {
        return Err(MacroError::Accessibility {
            path: body.canonical(),
            span: body.span,
        });
    };
    if !matches!(table.get(method).kind, SymbolKind::Method) {
        return Err(MacroError::Accessibility {
            path: body.canonical(),
            span: body.span,
        });
    }
    Ok(method)
}

/// After resolution, every qualifier short of the final member must denote
/// a statically accessible singleton, never an instance.
fn check_accessibility(body: &Tree, table: &SymbolTable) -> Result<(), MacroError> {
    let core = body.callee();
    match &core.kind {
        TreeKind::Select { qual, .. } => check_static_prefix(qual, table),
        // a bare reference is only legal when the resolved member lives in
        // a statically accessible singleton
        TreeKind::Ident(_) | TreeKind::This | TreeKind::Super => {
            let owner = core.sym.and_then(|sym| table.get(sym).owner);
            match owner {
                Some(owner)
                    if table.is_static_module(owner)
                        || table.get(owner).kind.is_package() =>
                {
                    Ok(())
                }
                _ => Err(MacroError::Accessibility {
                    path: body.canonical(),
                    span: body.span,
                }),
            }
        }
        _ => Err(MacroError::Shape {
            found: core.shape_name().to_string(),
            span: core.span,
        }),
    }
}

fn check_static_prefix(tree: &Tree, table: &SymbolTable) -> Result<(), MacroError> {
    let denotes_singleton = tree.sym.is_some_and(|sym| {
        table.is_static_module(sym) || table.get(sym).kind.is_package()
    });
    if !denotes_singleton {
        return Err(MacroError::Accessibility {
            path: tree.canonical(),
            span: tree.span,
        });
    }
    match &tree.kind {
        TreeKind::Select { qual, .. } => check_static_prefix(qual, table),
        _ => Ok(()),
    }
}
