use crate::language::{
    span::Span,
    symbols::{SymbolId, SymbolTable},
};
use crate::macros::{errors::MacroError, MacroDefinition};
use crate::runtime::registry::{CodeRepository, ImplFn};
use crate::session::Session;
use tracing::debug;

/// A located implementation: the callable plus the binary name it was
/// found under, kept for diagnostics.
pub struct LoadedImpl {
    pub call: ImplFn,
    pub binary_name: String,
}

/// The binary name of a class or module symbol. Walking stops at the first
/// top-level package member; nesting below that joins with the module
/// marker already carried by singleton parents.
pub fn binary_name(sym: SymbolId, table: &SymbolTable) -> String {
    let symbol = table.get(sym);
    let marker = if symbol.kind.is_module() { "$" } else { "" };
    if table.is_top_level(sym) {
        let pkg = table.package_path(sym);
        if pkg.is_empty() {
            format!("{}{}", symbol.name, marker)
        } else {
            format!("{}.{}{}", pkg, symbol.name, marker)
        }
    } else {
        // not top-level, so an owner exists
        let Some(parent) = symbol.owner else {
            return format!("{}{}", symbol.name, marker);
        };
        let parent_name = binary_name(parent, table);
        // a singleton parent's name already ends with the marker, so no
        // separator is needed below it
        let sep = if table.get(parent).kind.is_module() {
            ""
        } else {
            "$"
        };
        format!("{}{}{}{}", parent_name, sep, symbol.name, marker)
    }
}

/// Locate the callable backing a validated definition. Absence anywhere in
/// the four-step search is soft (`Ok(None)`); ambiguity and classpath
/// misconfiguration are hard errors.
pub fn load(
    session: &mut Session,
    def: &MacroDefinition,
) -> Result<Option<LoadedImpl>, MacroError> {
    let Some(impl_ref) = def.resolved_impl else {
        return Err(MacroError::Misconfiguration {
            entry: session.symbols.full_name(def.sym),
            span: def.span,
        });
    };
    let method = session.symbols.get(impl_ref.method);
    let method_name = method.name.clone();
    let Some(owner) = method.owner else {
        return Err(MacroError::Misconfiguration {
            entry: method_name,
            span: def.span,
        });
    };
    let binary = binary_name(owner, &session.symbols);

    let primary = session
        .primary_repository()
        .map_err(|unknown| misconfigured(&unknown, def.span))?;
    if let Some(call) = search(&primary, &binary, &method_name, def.span)? {
        return Ok(Some(LoadedImpl {
            call,
            binary_name: binary,
        }));
    }
    debug!(binary = binary.as_str(), "implementation not on primary classpath");

    let Some(fallback) = session
        .fallback_repository()
        .map_err(|unknown| misconfigured(&unknown, def.span))?
    else {
        return Ok(None);
    };
    match search(&fallback, &binary, &method_name, def.span)? {
        Some(call) => {
            debug!(binary = binary.as_str(), "implementation found on fallback classpath");
            Ok(Some(LoadedImpl {
                call,
                binary_name: binary,
            }))
        }
        None => Ok(None),
    }
}

/// The four-step search: class, companion singleton, live instance, member.
/// Every miss short of ambiguity is absence, not failure.
fn search(
    repo: &CodeRepository,
    binary: &str,
    method: &str,
    span: Span,
) -> Result<Option<ImplFn>, MacroError> {
    let Some(class) = repo.resolve_class(binary) else {
        return Ok(None);
    };
    let Some(companion) = repo.resolve_companion(class) else {
        return Ok(None);
    };
    let Some(instance) = repo.resolve_instance(companion) else {
        return Ok(None);
    };
    let members = repo.resolve_member(instance, method);
    match members.len() {
        0 => Ok(None),
        1 => Ok(Some(members[0].clone())),
        count => Err(MacroError::Overload {
            name: method.to_string(),
            count,
            span,
        }),
    }
}

fn misconfigured(unknown: &[String], span: Span) -> MacroError {
    MacroError::Misconfiguration {
        entry: unknown.join(", "),
        span,
    }
}
