use crate::language::errors::CompileError;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct MacroDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl MacroDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: CompileError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            label: err.message.clone(),
            message: err.message,
        }
    }
}

pub fn emit_errors(path: &str, source: &str, errors: &[CompileError]) {
    let src = NamedSource::new(path, source.to_string());
    for err in errors {
        let diagnostic = MacroDiagnostic::from_error(src.clone(), err.clone());
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

/// Render diagnostics as plain position-tagged lines, for callers that do
/// not want the fancy report.
pub fn render_errors(errors: &[CompileError]) -> Vec<String> {
    errors
        .iter()
        .map(|err| format!("[{}..{}] {}", err.span.start, err.span.end, err.message))
        .collect()
}
