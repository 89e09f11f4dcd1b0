use crate::language::{errors::CompileError, span::Span};
use thiserror::Error;

/// Everything that can go wrong while checking a macro definition or
/// expanding a call site. Only `Load` is soft: it routes through the
/// fallback repository and the overridden-symbol fallback before becoming
/// terminal. Every other category ends the current attempt.
#[derive(Clone, Debug, Error)]
pub enum MacroError {
    #[error("macro body has unsupported shape: {found}")]
    Shape { found: String, span: Span },

    #[error("macro implementation reference `{path}` is not statically accessible")]
    Accessibility { path: String, span: Span },

    #[error("ambiguous macro implementation `{name}`: {count} members share the name")]
    Overload {
        name: String,
        count: usize,
        span: Span,
    },

    #[error("macro implementation has incompatible shape")]
    SignatureMismatch {
        details: Vec<String>,
        internal: bool,
        span: Span,
    },

    #[error("macros cannot be partially applied")]
    Arity {
        required: usize,
        found: usize,
        span: Span,
    },

    #[error("macro implementation not found: {binary_name}")]
    Load { binary_name: String, span: Span },

    #[error("bad macro classpath entry `{entry}`")]
    Misconfiguration { entry: String, span: Span },

    #[error("exception during macro expansion: {message}")]
    Runtime {
        message: String,
        trace: Vec<String>,
        span: Span,
    },

    #[error("macro expansion contains free term variable `{name}`")]
    FreeTerm {
        name: String,
        origin: String,
        span: Span,
    },

    #[error("macro expansion contains free type variable `{name}`")]
    FreeType {
        name: String,
        origin: String,
        span: Span,
    },
}

impl MacroError {
    pub fn span(&self) -> Span {
        match self {
            MacroError::Shape { span, .. }
            | MacroError::Accessibility { span, .. }
            | MacroError::Overload { span, .. }
            | MacroError::SignatureMismatch { span, .. }
            | MacroError::Arity { span, .. }
            | MacroError::Load { span, .. }
            | MacroError::Misconfiguration { span, .. }
            | MacroError::Runtime { span, .. }
            | MacroError::FreeTerm { span, .. }
            | MacroError::FreeType { span, .. } => *span,
        }
    }

    /// Soft errors report absence rather than failure; the loader's search
    /// continues past them.
    pub fn is_soft(&self) -> bool {
        matches!(self, MacroError::Load { .. })
    }

    pub fn to_compile_error(&self) -> CompileError {
        let error = CompileError::new(self.to_string(), self.span());
        match self {
            MacroError::SignatureMismatch { details, internal, .. } => {
                let mut lines = details.clone();
                if *internal {
                    lines.push(
                        "this is an internal inconsistency in the macro engine".to_string(),
                    );
                }
                error.with_help(lines.join("\n"))
            }
            MacroError::Arity { required, found, .. } => error.with_help(format!(
                "the implementation expects {} argument list(s), the call supplies {}",
                required, found
            )),
            MacroError::Runtime { trace, .. } if !trace.is_empty() => {
                error.with_help(trace.join("\n"))
            }
            MacroError::FreeTerm { origin, .. } => error.with_help(format!(
                "{}: the reference is missing an evaluation at the call site",
                origin
            )),
            MacroError::FreeType { origin, .. } => error.with_help(format!(
                "{}: the reference is missing a type-tag annotation",
                origin
            )),
            _ => error,
        }
    }
}
