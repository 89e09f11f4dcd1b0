use crate::language::{
    ast::{NodeId, Tree, TreeKind},
    span::Span,
    symbols::SymbolId,
    types::{InferVar, TypeExpr},
};
use crate::macros::{
    arguments::{decompose, synthesize},
    errors::MacroError,
    loader, MacroDefinition,
};
use crate::runtime::{
    registry::{CodeRepository, MACHINERY_FRAMES},
    value::{ImplFault, InvocationScope, MacroValue},
};
use crate::session::{DelayEntry, Session};
use crate::typecheck;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One open expansion on the call stack. Frames exist for the whole
/// attempt, so nested expansions see their enclosing call sites.
#[derive(Clone, Debug)]
pub struct ContextFrame {
    pub expandee: NodeId,
    pub sym: SymbolId,
    pub span: Span,
}

/// A call site targeted for expansion: the macro application tree, the
/// type previously inferred for it, and the type its context expects.
#[derive(Clone, Debug)]
pub struct Expandee {
    pub tree: Tree,
    pub inferred: Option<TypeExpr>,
    pub expected: TypeExpr,
}

impl Expandee {
    pub fn new(tree: Tree) -> Self {
        let inferred = tree.tpe.clone();
        Self {
            tree,
            inferred,
            expected: TypeExpr::any(),
        }
    }

    pub fn with_expected(mut self, expected: TypeExpr) -> Self {
        self.expected = expected;
        self
    }

    pub fn id(&self) -> NodeId {
        self.tree.id
    }
}

#[derive(Clone, Debug)]
pub enum ExpansionResult {
    /// The implementation produced a tree; splice it at the call site.
    Success(Tree),
    /// No implementation was found, but the macro overrides another symbol;
    /// re-resolve the rebuilt tree as an ordinary call.
    Fallback(Tree),
    /// The expandee still references undetermined inference variables.
    Delayed,
    /// A formerly delayed expandee, now fully expanded including its
    /// nested delayed calls.
    Skipped(Tree),
    /// The expandee was already erroneous; nothing was attempted.
    Cancelled,
    Failure,
}

pub struct Expander<'s> {
    pub session: &'s mut Session,
}

impl<'s> Expander<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self { session }
    }

    /// Expand one call site. The open-call-stack depth after this returns
    /// always equals the depth before, whatever the outcome.
    pub fn expand(&mut self, expandee: &mut Expandee) -> ExpansionResult {
        let Some(sym) = expandee.tree.callee_sym() else {
            expandee.tree.erroneous = true;
            return ExpansionResult::Cancelled;
        };
        let def = match self.session.macro_defs.get(&sym) {
            Some(def) => def.clone(),
            None => {
                expandee.tree.erroneous = true;
                return ExpansionResult::Cancelled;
            }
        };
        if def.erroneous
            || self.session.symbols.get(sym).erroneous
            || expandee.tree.any_erroneous()
        {
            expandee.tree.erroneous = true;
            return ExpansionResult::Cancelled;
        }

        if let Some(entry) = self.session.delayed.get(&expandee.id()) {
            if !entry.pending.is_empty() {
                return ExpansionResult::Delayed;
            }
            self.session.delayed.remove(&expandee.id());
            return self.expand_skipped(expandee, &def, sym);
        }

        let pending = self.pending_vars(expandee);
        if !pending.is_empty() {
            debug!(
                expandee = expandee.tree.canonical().as_str(),
                pending = pending.len(),
                "delaying macro expansion until inference settles"
            );
            self.session
                .delayed
                .insert(expandee.id(), DelayEntry { pending });
            return ExpansionResult::Delayed;
        }

        self.expand_now(expandee, &def, sym)
    }

    /// A formerly delayed expandee whose pending set emptied: expand the
    /// delayed calls nested in its arguments innermost-first, then expand
    /// the call itself and wrap the fully expanded result.
    fn expand_skipped(
        &mut self,
        expandee: &mut Expandee,
        def: &MacroDefinition,
        sym: SymbolId,
    ) -> ExpansionResult {
        let rebuilt = self.expand_nested_delayed(expandee.tree.clone());
        let mut inner = Expandee {
            tree: rebuilt,
            inferred: expandee.inferred.clone(),
            expected: expandee.expected.clone(),
        };
        match self.expand_now(&mut inner, def, sym) {
            ExpansionResult::Success(tree) | ExpansionResult::Fallback(tree) => {
                ExpansionResult::Skipped(tree)
            }
            other => {
                if inner.tree.erroneous {
                    expandee.tree.erroneous = true;
                }
                other
            }
        }
    }

    fn expand_nested_delayed(&mut self, tree: Tree) -> Tree {
        let Tree {
            id,
            kind,
            span,
            sym,
            tpe,
            erroneous,
        } = tree;
        let kind = match kind {
            TreeKind::Apply { fun, args } => TreeKind::Apply {
                fun: Box::new(self.expand_nested_delayed(*fun)),
                args: args
                    .into_iter()
                    .map(|arg| self.expand_nested_delayed(arg))
                    .collect(),
            },
            TreeKind::TypeApply { fun, targs } => TreeKind::TypeApply {
                fun: Box::new(self.expand_nested_delayed(*fun)),
                targs,
            },
            TreeKind::Select { qual, name } => TreeKind::Select {
                qual: Box::new(self.expand_nested_delayed(*qual)),
                name,
            },
            other => other,
        };
        let tree = Tree {
            id,
            kind,
            span,
            sym,
            tpe,
            erroneous,
        };
        if self.session.delayed.contains_key(&tree.id) {
            let mut nested = Expandee::new(tree.clone());
            match self.expand(&mut nested) {
                ExpansionResult::Success(expanded)
                | ExpansionResult::Fallback(expanded)
                | ExpansionResult::Skipped(expanded) => expanded,
                _ => nested.tree,
            }
        } else {
            tree
        }
    }

    fn expand_now(
        &mut self,
        expandee: &mut Expandee,
        def: &MacroDefinition,
        sym: SymbolId,
    ) -> ExpansionResult {
        if self.session.open_macros.len() >= self.session.settings.max_expansion_depth {
            self.report(
                expandee.tree.span,
                format!(
                    "macro expansion exceeded the nesting limit of {}",
                    self.session.settings.max_expansion_depth
                ),
            );
            expandee.tree.erroneous = true;
            return ExpansionResult::Failure;
        }

        debug!(
            expandee = expandee.tree.canonical().as_str(),
            "expanding macro"
        );
        self.session.open_macros.push(ContextFrame {
            expandee: expandee.id(),
            sym,
            span: expandee.tree.span,
        });
        let result = self.expand_on_stack(expandee, def, sym);
        let popped = self.session.open_macros.pop();
        debug_assert!(popped.is_some(), "open-macro stack underflow");
        result
    }

    /// The attempt proper; runs with this expansion's frame on the stack.
    fn expand_on_stack(
        &mut self,
        expandee: &mut Expandee,
        def: &MacroDefinition,
        sym: SymbolId,
    ) -> ExpansionResult {
        let loaded = match loader::load(self.session, def) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                if let Some(overridden) = self.session.symbols.get(sym).overrides {
                    warn!(
                        sym = self.session.symbols.get(sym).name.as_str(),
                        "macro implementation not found, falling back to overridden symbol"
                    );
                    self.session.fallback_occurred = true;
                    let tree = retarget(
                        expandee.tree.clone(),
                        overridden,
                        self.session.symbols.get(overridden).name.clone(),
                    );
                    return self.finish(tree, expandee, ExpansionResult::Fallback);
                }
                let error = MacroError::Load {
                    binary_name: def
                        .resolved_impl
                        .map(|impl_ref| {
                            let method = self.session.symbols.get(impl_ref.method);
                            match method.owner {
                                Some(owner) => {
                                    loader::binary_name(owner, &self.session.symbols)
                                }
                                None => method.name.clone(),
                            }
                        })
                        .unwrap_or_else(|| self.session.symbols.full_name(def.sym)),
                    span: expandee.tree.span,
                };
                self.session.reporter.report(error.to_compile_error());
                expandee.tree.erroneous = true;
                return ExpansionResult::Failure;
            }
            Err(hard) => {
                self.session.reporter.report(hard.to_compile_error());
                expandee.tree.erroneous = true;
                return ExpansionResult::Failure;
            }
        };

        let with_evidence = def
            .resolved_impl
            .map(|impl_ref| impl_ref.with_evidence)
            .unwrap_or(false);
        let impl_sig = match def
            .resolved_impl
            .and_then(|impl_ref| self.session.symbols.get(impl_ref.method).signature.clone())
        {
            Some(sig) => sig,
            None => {
                self.report(
                    expandee.tree.span,
                    "macro implementation lost its signature between checking and expansion",
                );
                expandee.tree.erroneous = true;
                return ExpansionResult::Failure;
            }
        };
        let args = match synthesize(
            self.session.run,
            def,
            &impl_sig,
            with_evidence,
            &expandee.tree,
            expandee.id(),
            self.session.open_macros.len(),
        ) {
            Ok(args) => args,
            Err(error) => {
                self.session.reporter.report(error.to_compile_error());
                expandee.tree.erroneous = true;
                return ExpansionResult::Failure;
            }
        };

        let mut scope = InvocationScope::new(
            self.session.run,
            &mut self.session.reporter,
            &mut self.session.next_node,
        );
        let outcome = CodeRepository::invoke(&mut scope, &loaded.call, &args);
        let implementation_reported = scope.reported_errors();

        match outcome {
            Ok(MacroValue::Expr { run, tree }) if run == self.session.run => {
                if implementation_reported {
                    expandee.tree.erroneous = true;
                    return ExpansionResult::Failure;
                }
                if self.report_free_symbols(&tree) {
                    expandee.tree.erroneous = true;
                    return ExpansionResult::Failure;
                }
                let adopted = self.adopt(tree);
                self.finish(adopted, expandee, ExpansionResult::Success)
            }
            Ok(MacroValue::Expr { .. }) => {
                self.report(
                    expandee.tree.span,
                    "macro expansion returned a tree created by a different compilation run",
                );
                expandee.tree.erroneous = true;
                ExpansionResult::Failure
            }
            Ok(other) => {
                self.report(
                    expandee.tree.span,
                    format!(
                        "macro expansion must return a reified expression, found {}",
                        other.kind_name()
                    ),
                );
                expandee.tree.erroneous = true;
                ExpansionResult::Failure
            }
            Err(ImplFault::Abort) => {
                // the implementation already reported its own diagnostic
                expandee.tree.erroneous = true;
                ExpansionResult::Failure
            }
            Err(ImplFault::Raise { message, backtrace }) => {
                let span = self.enclosing_span(expandee.tree.span);
                let error = clean_fault(message, backtrace, span);
                self.session.reporter.report(error.to_compile_error());
                expandee.tree.erroneous = true;
                ExpansionResult::Failure
            }
        }
    }

    /// Re-type-check a produced tree, first against the expandee's
    /// previously inferred type, then against the ambient expected type.
    /// The caller pops the stack frame whatever happens here.
    fn finish(
        &mut self,
        tree: Tree,
        expandee: &mut Expandee,
        wrap: fn(Tree) -> ExpansionResult,
    ) -> ExpansionResult {
        let actual = typecheck::infer_tree_type(&tree, &self.session.symbols);
        let Some(actual) = actual else {
            return wrap(tree);
        };
        if let Some(inferred) = &expandee.inferred {
            let nullary_call = decompose(&expandee.tree).arg_lists.is_empty();
            let against = if nullary_call {
                typecheck::unwrap_nullary(inferred)
            } else {
                inferred.clone()
            };
            if !typecheck::conforms(&actual, &against) {
                self.report(
                    expandee.tree.span,
                    format!(
                        "macro expansion has type {} which does not conform to the inferred type {}",
                        actual.canonical_name(),
                        against.canonical_name()
                    ),
                );
                expandee.tree.erroneous = true;
                return ExpansionResult::Failure;
            }
        }
        if !typecheck::conforms(&actual, &expandee.expected) {
            self.report(
                expandee.tree.span,
                format!(
                    "macro expansion has type {} which does not conform to the expected type {}",
                    actual.canonical_name(),
                    expandee.expected.canonical_name()
                ),
            );
            expandee.tree.erroneous = true;
            return ExpansionResult::Failure;
        }
        wrap(tree)
    }

    /// Give the produced tree this run's node identities and inherit
    /// missing positions from the first position-bearing open frame.
    fn adopt(&mut self, mut tree: Tree) -> Tree {
        let span = self.enclosing_span(Span::dummy());
        let session = &mut *self.session;
        tree.walk_mut(&mut |node| {
            node.id = session.next_node;
            session.next_node += 1;
            if node.span.is_dummy() {
                node.span = span;
            }
        });
        tree
    }

    /// The first position-bearing frame, innermost first.
    fn enclosing_span(&self, fallback: Span) -> Span {
        self.session
            .open_macros
            .iter()
            .rev()
            .find(|frame| !frame.span.is_dummy())
            .map(|frame| frame.span)
            .unwrap_or(fallback)
    }

    fn pending_vars(&self, expandee: &Expandee) -> HashSet<InferVar> {
        let mut vars = HashSet::new();
        expandee.tree.walk(&mut |node| {
            if let Some(tpe) = &node.tpe {
                tpe.collect_vars(&mut vars);
            }
            if let TreeKind::TypeApply { targs, .. } = &node.kind {
                for targ in targs {
                    targ.collect_vars(&mut vars);
                }
            }
        });
        if let Some(inferred) = &expandee.inferred {
            inferred.collect_vars(&mut vars);
        }
        vars.retain(|var| self.session.infer.is_undetermined(*var));
        vars
    }

    /// Each free term or free type left in an expansion is reported as its
    /// own diagnostic.
    fn report_free_symbols(&mut self, tree: &Tree) -> bool {
        let mut offenders: Vec<MacroError> = Vec::new();
        let span = self.enclosing_span(Span::dummy());
        tree.walk(&mut |node| {
            let Some(sym) = node.sym else {
                return;
            };
            let at = if node.span.is_dummy() { span } else { node.span };
            match &self.session.symbols.get(sym).kind {
                crate::language::symbols::SymbolKind::FreeTerm { origin } => {
                    offenders.push(MacroError::FreeTerm {
                        name: self.session.symbols.get(sym).name.clone(),
                        origin: origin.clone(),
                        span: at,
                    });
                }
                crate::language::symbols::SymbolKind::FreeType { origin } => {
                    offenders.push(MacroError::FreeType {
                        name: self.session.symbols.get(sym).name.clone(),
                        origin: origin.clone(),
                        span: at,
                    });
                }
                _ => {}
            }
        });
        let found = !offenders.is_empty();
        for offender in offenders {
            self.session.reporter.report(offender.to_compile_error());
        }
        found
    }

    fn report(&mut self, span: Span, message: impl Into<String>) {
        self.session.reporter.error(span, message);
    }

    /// Expand every macro call in a tree, outermost spine roots first, and
    /// splice the produced fragments. Already-expanded trees pass through
    /// untouched.
    pub fn expand_all(&mut self, tree: Tree) -> Tree {
        self.expand_all_inner(tree, 0)
    }

    fn expand_all_inner(&mut self, tree: Tree, depth: usize) -> Tree {
        if depth >= self.session.settings.max_expansion_depth {
            self.report(tree.span, "macro expansion exceeded the nesting limit");
            return tree;
        }
        if self.is_macro_application(&tree) {
            let mut expandee = Expandee::new(tree);
            return match self.expand(&mut expandee) {
                ExpansionResult::Success(expanded)
                | ExpansionResult::Fallback(expanded)
                | ExpansionResult::Skipped(expanded) => {
                    self.expand_all_inner(expanded, depth + 1)
                }
                ExpansionResult::Delayed
                | ExpansionResult::Cancelled
                | ExpansionResult::Failure => expandee.tree,
            };
        }
        let Tree {
            id,
            kind,
            span,
            sym,
            tpe,
            erroneous,
        } = tree;
        let kind = match kind {
            TreeKind::Apply { fun, args } => TreeKind::Apply {
                fun: Box::new(self.expand_all_inner(*fun, depth)),
                args: args
                    .into_iter()
                    .map(|arg| self.expand_all_inner(arg, depth))
                    .collect(),
            },
            TreeKind::TypeApply { fun, targs } => TreeKind::TypeApply {
                fun: Box::new(self.expand_all_inner(*fun, depth)),
                targs,
            },
            TreeKind::Select { qual, name } => TreeKind::Select {
                qual: Box::new(self.expand_all_inner(*qual, depth)),
                name,
            },
            other => other,
        };
        Tree {
            id,
            kind,
            span,
            sym,
            tpe,
            erroneous,
        }
    }

    fn is_macro_application(&self, tree: &Tree) -> bool {
        tree.is_application()
            && tree
                .callee_sym()
                .is_some_and(|sym| self.session.symbols.get(sym).is_macro)
    }
}

/// Rebuild the call spine against the overridden symbol.
fn retarget(mut tree: Tree, overridden: SymbolId, name: String) -> Tree {
    match &mut tree.kind {
        TreeKind::Apply { fun, .. } | TreeKind::TypeApply { fun, .. } => {
            let inner = std::mem::replace(
                &mut **fun,
                Tree::new(0, TreeKind::Super, Span::dummy()),
            );
            **fun = retarget(inner, overridden, name);
        }
        TreeKind::Ident(ident) => {
            *ident = name;
            tree.sym = Some(overridden);
        }
        TreeKind::Select { name: member, .. } => {
            *member = name;
            tree.sym = Some(overridden);
        }
        _ => {}
    }
    tree
}

/// Strip invocation machinery from a fault's backtrace and wrap what is
/// left as a runtime diagnostic. Pure: everything shown comes from the
/// fault and the position passed in.
pub fn clean_fault(message: String, backtrace: Vec<String>, span: Span) -> MacroError {
    let trace: Vec<String> = backtrace
        .into_iter()
        .filter(|frame| {
            !MACHINERY_FRAMES
                .iter()
                .any(|machinery| frame.starts_with(machinery))
        })
        .collect();
    MacroError::Runtime {
        message,
        trace,
        span,
    }
}
