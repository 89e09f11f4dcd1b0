use crate::language::span::Span;
use miette::SourceSpan;

/// A position-tagged diagnostic accumulated during checking or expansion.
#[derive(Clone, Debug)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn to_source_span(&self) -> SourceSpan {
        (self.span.start, self.span.len()).into()
    }
}

/// Collects diagnostics for one compilation run. Deeper checks consult
/// `count` snapshots to tell whether a callee reported anything.
#[derive(Default)]
pub struct Reporter {
    pub errors: Vec<CompileError>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(CompileError::new(message, span));
    }

    pub fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
