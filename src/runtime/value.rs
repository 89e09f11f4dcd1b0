use crate::language::{
    ast::{NodeId, Tree},
    errors::Reporter,
    span::Span,
    types::TypeExpr,
};
use thiserror::Error;

/// Identity of one compilation run. Reified trees are branded with it so
/// that values smuggled in from another run are rejected instead of being
/// spliced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunId(pub u32);

/// A value passed to or returned from a macro implementation.
#[derive(Clone, Debug)]
pub enum MacroValue {
    /// The expansion context: the reified call-site prefix and the identity
    /// of the expandee under expansion.
    Context {
        run: RunId,
        prefix: Option<Tree>,
        expandee: NodeId,
        depth: usize,
    },
    /// A reified call-site expression.
    Expr { run: RunId, tree: Tree },
    /// Type-tag evidence for one type parameter.
    Tag(TypeExpr),
    /// A collected vararg tail.
    Seq(Vec<MacroValue>),
}

impl MacroValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            MacroValue::Context { .. } => "context",
            MacroValue::Expr { .. } => "reified expression",
            MacroValue::Tag(_) => "type tag",
            MacroValue::Seq(_) => "sequence",
        }
    }

    pub fn expr_tree(&self) -> Option<&Tree> {
        match self {
            MacroValue::Expr { tree, .. } => Some(tree),
            _ => None,
        }
    }
}

/// A fault raised by a macro implementation. `Abort` is the implementation's
/// explicit bail-out signal: the implementation has already reported its own
/// diagnostic, so the engine records a bare failure. Any other fault carries
/// a backtrace that invocation machinery frames get stripped from before
/// reporting.
#[derive(Debug, Error)]
pub enum ImplFault {
    #[error("macro implementation aborted")]
    Abort,
    #[error("{message}")]
    Raise {
        message: String,
        backtrace: Vec<String>,
    },
}

impl ImplFault {
    pub fn raise(message: impl Into<String>) -> Self {
        ImplFault::Raise {
            message: message.into(),
            backtrace: Vec::new(),
        }
    }
}

/// What an implementation can touch while it runs: the run brand for the
/// trees it builds, fresh node ids, and the reporter (so an implementation
/// can publish its own diagnostic before aborting).
pub struct InvocationScope<'a> {
    pub run: RunId,
    pub reporter: &'a mut Reporter,
    next_node: &'a mut NodeId,
    errors_before: usize,
}

impl<'a> InvocationScope<'a> {
    pub fn new(run: RunId, reporter: &'a mut Reporter, next_node: &'a mut NodeId) -> Self {
        let errors_before = reporter.count();
        Self {
            run,
            reporter,
            next_node,
            errors_before,
        }
    }

    pub fn fresh_id(&mut self) -> NodeId {
        let id = *self.next_node;
        *self.next_node += 1;
        id
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.reporter.error(span, message);
    }

    /// Did the implementation report anything through this scope?
    pub fn reported_errors(&self) -> bool {
        self.reporter.count() > self.errors_before
    }
}
