pub mod arguments;
pub mod compat;
pub mod engine;
pub mod errors;
pub mod loader;
pub mod signature;
pub mod validate;

use crate::language::{
    ast::Tree,
    span::Span,
    symbols::{SymbolId, TypeParam},
    types::{ParamList, TypeExpr},
};

/// A checked macro definition: a callable whose body names a separately
/// compiled implementation. Immutable once validated, except for the
/// erroneous flag.
#[derive(Clone, Debug)]
pub struct MacroDefinition {
    pub sym: SymbolId,
    pub type_params: Vec<TypeParam>,
    pub param_lists: Vec<ParamList>,
    pub ret: TypeExpr,
    pub body: Tree,
    pub span: Span,
    pub resolved_impl: Option<ImplRef>,
    pub erroneous: bool,
}

impl MacroDefinition {
    pub fn new(
        sym: SymbolId,
        type_params: Vec<TypeParam>,
        param_lists: Vec<ParamList>,
        ret: TypeExpr,
        body: Tree,
        span: Span,
    ) -> Self {
        Self {
            sym,
            type_params,
            param_lists,
            ret,
            body,
            span,
            resolved_impl: None,
            erroneous: false,
        }
    }
}

/// The implementation a validated definition resolved to.
#[derive(Clone, Copy, Debug)]
pub struct ImplRef {
    /// The implementation method's symbol; its owner chain yields the
    /// binary name the loader searches for.
    pub method: SymbolId,
    /// Whether the matched signature shape carries the trailing type-tag
    /// evidence list.
    pub with_evidence: bool,
}
