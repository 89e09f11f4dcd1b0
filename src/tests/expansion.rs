use crate::language::{
    ast::{Lit, Tree, TreeKind},
    span::Span,
    symbols::{MethodSig, SymbolId, SymbolKind, TypeParam},
    types::{Param, ParamList, TypeExpr},
};
use crate::macros::{
    engine::{Expandee, ExpansionResult, Expander},
    signature::context_type,
    validate::validate_definition,
    MacroDefinition,
};
use crate::runtime::{
    registry::{ImplFn, Library},
    value::{ImplFault, MacroValue, RunId},
};
use crate::session::{Session, Settings};
use std::rc::Rc;

struct Compiler {
    session: Session,
    library: Library,
    pkg: SymbolId,
    module: SymbolId,
    ready: bool,
}

impl Compiler {
    fn new() -> Self {
        Self::with_classpath(vec!["macros".into()])
    }

    fn with_classpath(macro_classpath: Vec<String>) -> Self {
        let mut session = Session::new(Settings {
            macro_classpath,
            ..Settings::default()
        });
        let pkg = session.symbols.define("demo", SymbolKind::Package, None);
        let module = session
            .symbols
            .define("Macros", SymbolKind::Module, Some(pkg));
        Self {
            session,
            library: Library::new("macros"),
            pkg,
            module,
            ready: false,
        }
    }

    fn impl_method(&mut self, name: &str, sig: MethodSig) -> SymbolId {
        let method = self
            .session
            .symbols
            .define(name, SymbolKind::Method, Some(self.module));
        self.session.symbols.get_mut(method).signature = Some(sig);
        method
    }

    fn register(&mut self, method: &str, call: ImplFn) {
        self.library.register("demo.Macros$", method, call);
    }

    fn define_macro(
        &mut self,
        name: &str,
        impl_method: SymbolId,
        type_params: Vec<TypeParam>,
        param_lists: Vec<ParamList>,
        ret: TypeExpr,
    ) -> SymbolId {
        let def_sym = self
            .session
            .symbols
            .define(name, SymbolKind::Method, Some(self.pkg));
        self.session.symbols.get_mut(def_sym).is_macro = true;
        let impl_name = self.session.symbols.get(impl_method).name.clone();
        let qual = Tree::new(
            self.session.fresh_node_id(),
            TreeKind::Ident("Macros".into()),
            Span::new(1, 7),
        )
        .with_sym(self.module);
        let body = Tree::new(
            self.session.fresh_node_id(),
            TreeKind::Select {
                qual: Box::new(qual),
                name: impl_name,
            },
            Span::new(1, 18),
        )
        .with_sym(impl_method);
        let mut def =
            MacroDefinition::new(def_sym, type_params, param_lists, ret, body, Span::new(1, 30));
        let ok = validate_definition(
            &mut def,
            &mut self.session.symbols,
            &mut self.session.infer,
            &mut self.session.reporter,
        );
        assert!(
            ok,
            "macro definition `{}` failed validation: {:?}",
            name,
            self.session
                .reporter
                .errors
                .iter()
                .map(|err| err.message.clone())
                .collect::<Vec<_>>()
        );
        self.session.define_macro(def);
        def_sym
    }

    fn lit_int(&mut self, value: i64, span: Span) -> Tree {
        Tree::new(
            self.session.fresh_node_id(),
            TreeKind::Literal(Lit::Int(value)),
            span,
        )
    }

    fn call(
        &mut self,
        sym: SymbolId,
        name: &str,
        targs: Vec<TypeExpr>,
        args: Vec<Tree>,
        span: Span,
    ) -> Tree {
        let mut tree = Tree::new(
            self.session.fresh_node_id(),
            TreeKind::Ident(name.into()),
            span,
        )
        .with_sym(sym);
        if !targs.is_empty() {
            tree = Tree::new(
                self.session.fresh_node_id(),
                TreeKind::TypeApply {
                    fun: Box::new(tree),
                    targs,
                },
                span,
            );
        }
        Tree::new(
            self.session.fresh_node_id(),
            TreeKind::Apply {
                fun: Box::new(tree),
                args,
            },
            span,
        )
    }

    fn expand(&mut self, expandee: &mut Expandee) -> ExpansionResult {
        self.install_library();
        Expander::new(&mut self.session).expand(expandee)
    }

    fn expand_all(&mut self, tree: Tree) -> Tree {
        self.install_library();
        Expander::new(&mut self.session).expand_all(tree)
    }

    fn install_library(&mut self) {
        if !self.ready {
            self.session.add_library(self.library.clone());
            self.ready = true;
        }
    }

    fn messages(&self) -> Vec<String> {
        self.session
            .reporter
            .errors
            .iter()
            .map(|err| err.message.clone())
            .collect()
    }
}

fn double_sig() -> MethodSig {
    MethodSig {
        type_params: vec![TypeParam::named("U")],
        param_lists: vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("U")))],
            vec![Param::synthetic("tag", TypeExpr::tag(TypeExpr::named("U")))],
        ],
        ret: TypeExpr::reified(TypeExpr::named("U")),
    }
}

fn int_impl_sig() -> MethodSig {
    MethodSig {
        type_params: Vec::new(),
        param_lists: vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("Int")))],
        ],
        ret: TypeExpr::reified(TypeExpr::named("Int")),
    }
}

/// `double` as an implementation would write it: return `x * 2`.
fn double_impl() -> ImplFn {
    Rc::new(|scope, args| {
        let Some(tree) = args.get(1).and_then(|arg| arg.expr_tree()).cloned() else {
            return Err(ImplFault::raise("expected a reified argument"));
        };
        let select = Tree::new(
            scope.fresh_id(),
            TreeKind::Select {
                qual: Box::new(tree),
                name: "*".into(),
            },
            Span::dummy(),
        );
        let two = Tree::new(scope.fresh_id(), TreeKind::Literal(Lit::Int(2)), Span::dummy());
        let call = Tree::new(
            scope.fresh_id(),
            TreeKind::Apply {
                fun: Box::new(select),
                args: vec![two],
            },
            Span::dummy(),
        );
        Ok(MacroValue::Expr {
            run: scope.run,
            tree: call,
        })
    })
}

/// A constant-folding evaluator for expansion results.
fn eval(tree: &Tree) -> i64 {
    match &tree.kind {
        TreeKind::Literal(Lit::Int(value)) => *value,
        TreeKind::Apply { fun, args } => match &fun.kind {
            TreeKind::Select { qual, name } => {
                let lhs = eval(qual);
                let rhs = eval(&args[0]);
                match name.as_str() {
                    "*" => lhs * rhs,
                    "+" => lhs + rhs,
                    "-" => lhs - rhs,
                    other => panic!("unevaluable operator `{}`", other),
                }
            }
            other => panic!("unevaluable callee: {:?}", other),
        },
        other => panic!("unevaluable tree: {:?}", other),
    }
}

fn setup_double(compiler: &mut Compiler) -> SymbolId {
    let method = compiler.impl_method("doubleImpl", double_sig());
    compiler.register("doubleImpl", double_impl());
    compiler.define_macro(
        "double",
        method,
        vec![TypeParam::named("T")],
        vec![vec![Param::new("x", TypeExpr::named("T"))]],
        TypeExpr::named("T"),
    )
}

#[test]
fn double_of_21_expands_to_21_times_2() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    let span = Span::new(100, 120);
    let arg = compiler.lit_int(21, Span::new(107, 109));
    let mut call = compiler.call(double, "double", vec![TypeExpr::named("Int")], vec![arg], span);
    call.tpe = Some(TypeExpr::named("Int"));
    let mut expandee = Expandee::new(call).with_expected(TypeExpr::named("Int"));

    let expanded = match compiler.expand(&mut expandee) {
        ExpansionResult::Success(expanded) => expanded,
        other => panic!("expected success, got {:?}: {:?}", other, compiler.messages()),
    };
    assert_eq!(expanded.canonical(), "21.*(2)");
    assert_eq!(eval(&expanded), 42);
    // synthetic nodes inherit the call-site position
    assert_eq!(expanded.span, span);
    assert!(compiler.session.open_macros.is_empty());
    assert!(compiler.messages().is_empty());
}

#[test]
fn expansion_is_idempotent_over_expanded_trees() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    let arg = compiler.lit_int(21, Span::new(7, 9));
    let call = compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![arg],
        Span::new(0, 10),
    );
    let expanded = compiler.expand_all(call);
    assert_eq!(expanded.canonical(), "21.*(2)");
    let errors_before = compiler.messages().len();
    let again = compiler.expand_all(expanded.clone());
    assert_eq!(again.canonical(), expanded.canonical());
    assert_eq!(compiler.messages().len(), errors_before);
}

#[test]
fn nested_macro_results_are_expanded_by_the_driver() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    // `twice` expands into a call of `double`
    let twice_method = compiler.impl_method("twiceImpl", int_impl_sig());
    let twice_impl: ImplFn = Rc::new(move |scope, args| {
        let Some(arg) = args.get(1).and_then(|value| value.expr_tree()).cloned() else {
            return Err(ImplFault::raise("expected a reified argument"));
        };
        let callee = Tree::new(
            scope.fresh_id(),
            TreeKind::Ident("double".into()),
            Span::dummy(),
        )
        .with_sym(double);
        let typed = Tree::new(
            scope.fresh_id(),
            TreeKind::TypeApply {
                fun: Box::new(callee),
                targs: vec![TypeExpr::named("Int")],
            },
            Span::dummy(),
        );
        let call = Tree::new(
            scope.fresh_id(),
            TreeKind::Apply {
                fun: Box::new(typed),
                args: vec![arg],
            },
            Span::dummy(),
        );
        Ok(MacroValue::Expr {
            run: scope.run,
            tree: call,
        })
    });
    compiler.register("twiceImpl", twice_impl);
    let twice = compiler.define_macro(
        "twice",
        twice_method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );

    let arg = compiler.lit_int(5, Span::new(6, 7));
    let call = compiler.call(twice, "twice", Vec::new(), vec![arg], Span::new(0, 8));
    let expanded = compiler.expand_all(call);
    assert_eq!(expanded.canonical(), "5.*(2)");
    assert_eq!(eval(&expanded), 10);
    assert!(compiler.session.open_macros.is_empty());
    assert!(compiler.messages().is_empty());
}

#[test]
fn undetermined_inference_variables_delay_expansion() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    let var = compiler.session.infer.fresh_undetermined();
    let mut arg = compiler.lit_int(21, Span::new(7, 9));
    arg.tpe = Some(TypeExpr::Var(var));
    let call = compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![arg],
        Span::new(0, 10),
    );
    let mut expandee = Expandee::new(call);

    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Delayed
    ));
    assert!(compiler.session.delayed.contains_key(&expandee.id()));
    // still pending: delayed again
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Delayed
    ));

    compiler.session.mark_determined(var);
    let expanded = match compiler.expand(&mut expandee) {
        ExpansionResult::Skipped(expanded) => expanded,
        other => panic!("expected skipped, got {:?}: {:?}", other, compiler.messages()),
    };
    assert_eq!(expanded.canonical(), "21.*(2)");
    assert!(compiler.session.delayed.is_empty());
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn delayed_nested_calls_expand_innermost_first() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    let var = compiler.session.infer.fresh_undetermined();
    let mut inner_arg = compiler.lit_int(3, Span::new(14, 15));
    inner_arg.tpe = Some(TypeExpr::Var(var));
    let inner = compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![inner_arg],
        Span::new(7, 16),
    );
    let mut inner_expandee = Expandee::new(inner.clone());
    assert!(matches!(
        compiler.expand(&mut inner_expandee),
        ExpansionResult::Delayed
    ));

    let outer = compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![inner],
        Span::new(0, 17),
    );
    let mut outer_expandee = Expandee::new(outer);
    assert!(matches!(
        compiler.expand(&mut outer_expandee),
        ExpansionResult::Delayed
    ));

    compiler.session.mark_determined(var);
    let expanded = match compiler.expand(&mut outer_expandee) {
        ExpansionResult::Skipped(expanded) => expanded,
        other => panic!("expected skipped, got {:?}: {:?}", other, compiler.messages()),
    };
    assert_eq!(expanded.canonical(), "3.*(2).*(2)");
    assert_eq!(eval(&expanded), 12);
    assert!(compiler.session.delayed.is_empty());
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn unlocatable_implementation_with_override_falls_back() {
    let mut compiler = Compiler::new();
    let method = compiler.impl_method("fasterImpl", int_impl_sig());
    // no callable registered for fasterImpl
    let faster = compiler.define_macro(
        "faster",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let slower = compiler
        .session
        .symbols
        .define("slower", SymbolKind::Method, Some(compiler.pkg));
    compiler.session.symbols.get_mut(slower).signature = Some(MethodSig {
        type_params: Vec::new(),
        param_lists: vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        ret: TypeExpr::named("Int"),
    });
    compiler.session.symbols.get_mut(faster).overrides = Some(slower);

    let arg = compiler.lit_int(21, Span::new(7, 9));
    let mut call = compiler.call(faster, "faster", Vec::new(), vec![arg], Span::new(0, 10));
    call.tpe = Some(TypeExpr::named("Int"));
    let mut expandee = Expandee::new(call);

    let rebuilt = match compiler.expand(&mut expandee) {
        ExpansionResult::Fallback(rebuilt) => rebuilt,
        other => panic!("expected fallback, got {:?}: {:?}", other, compiler.messages()),
    };
    assert_eq!(rebuilt.canonical(), "slower(21)");
    assert_eq!(rebuilt.callee_sym(), Some(slower));
    assert!(compiler.session.fallback_occurred);
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn raising_implementation_never_takes_the_fallback_path() {
    let mut compiler = Compiler::new();
    let method = compiler.impl_method("boomImpl", int_impl_sig());
    compiler.register(
        "boomImpl",
        Rc::new(|_scope, _args| Err(ImplFault::raise("division by zero"))),
    );
    let boom = compiler.define_macro(
        "boom",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let slower = compiler
        .session
        .symbols
        .define("slower", SymbolKind::Method, Some(compiler.pkg));
    compiler.session.symbols.get_mut(boom).overrides = Some(slower);

    let arg = compiler.lit_int(1, Span::new(5, 6));
    let mut expandee = Expandee::new(compiler.call(
        boom,
        "boom",
        Vec::new(),
        vec![arg],
        Span::new(0, 7),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(!compiler.session.fallback_occurred);
    assert!(expandee.tree.erroneous);
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("division by zero")));
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn aborting_implementation_fails_without_extra_diagnostics() {
    let mut compiler = Compiler::new();
    let method = compiler.impl_method("abortImpl", int_impl_sig());
    compiler.register(
        "abortImpl",
        Rc::new(|scope, _args| {
            scope.error(Span::new(0, 7), "unsupported literal");
            Err(ImplFault::Abort)
        }),
    );
    let aborting = compiler.define_macro(
        "aborting",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let arg = compiler.lit_int(1, Span::new(5, 6));
    let mut expandee = Expandee::new(compiler.call(
        aborting,
        "aborting",
        Vec::new(),
        vec![arg],
        Span::new(0, 7),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    // only the implementation's own diagnostic is present
    assert_eq!(compiler.messages(), vec!["unsupported literal".to_string()]);
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn two_argument_lists_cannot_be_partially_applied() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    let first = compiler.lit_int(21, Span::new(7, 9));
    let one_list = compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![first],
        Span::new(0, 10),
    );
    let second = compiler.lit_int(2, Span::new(11, 12));
    let two_lists = Tree::new(
        compiler.session.fresh_node_id(),
        TreeKind::Apply {
            fun: Box::new(one_list),
            args: vec![second],
        },
        Span::new(0, 13),
    );
    let mut expandee = Expandee::new(two_lists);
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("cannot be partially applied")));
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn free_term_references_are_rejected_by_name() {
    let mut compiler = Compiler::new();
    let free = compiler.session.symbols.define(
        "captured",
        SymbolKind::FreeTerm {
            origin: "reified from the definition scope".into(),
        },
        None,
    );
    let method = compiler.impl_method("leakImpl", int_impl_sig());
    compiler.register(
        "leakImpl",
        Rc::new(move |scope, _args| {
            let leaked = Tree::new(
                scope.fresh_id(),
                TreeKind::Ident("captured".into()),
                Span::dummy(),
            )
            .with_sym(free);
            Ok(MacroValue::Expr {
                run: scope.run,
                tree: leaked,
            })
        }),
    );
    let leak = compiler.define_macro(
        "leak",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let arg = compiler.lit_int(1, Span::new(5, 6));
    let mut expandee = Expandee::new(compiler.call(
        leak,
        "leak",
        Vec::new(),
        vec![arg],
        Span::new(0, 7),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("free term variable `captured`")));
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn trees_from_another_run_are_rejected() {
    let mut compiler = Compiler::new();
    let method = compiler.impl_method("alienImpl", int_impl_sig());
    compiler.register(
        "alienImpl",
        Rc::new(|scope, _args| {
            let tree = Tree::new(scope.fresh_id(), TreeKind::Literal(Lit::Int(1)), Span::dummy());
            Ok(MacroValue::Expr {
                run: RunId(u32::MAX),
                tree,
            })
        }),
    );
    let alien = compiler.define_macro(
        "alien",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let arg = compiler.lit_int(1, Span::new(6, 7));
    let mut expandee = Expandee::new(compiler.call(
        alien,
        "alien",
        Vec::new(),
        vec![arg],
        Span::new(0, 8),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("different compilation run")));
}

#[test]
fn non_tree_results_are_rejected() {
    let mut compiler = Compiler::new();
    let method = compiler.impl_method("tagImpl", int_impl_sig());
    compiler.register(
        "tagImpl",
        Rc::new(|_scope, _args| Ok(MacroValue::Tag(TypeExpr::named("Int")))),
    );
    let tagged = compiler.define_macro(
        "tagged",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let arg = compiler.lit_int(1, Span::new(7, 8));
    let mut expandee = Expandee::new(compiler.call(
        tagged,
        "tagged",
        Vec::new(),
        vec![arg],
        Span::new(0, 9),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("must return a reified expression")));
}

#[test]
fn erroneous_call_sites_are_cancelled() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    let mut arg = compiler.lit_int(21, Span::new(7, 9));
    arg.erroneous = true;
    let call = compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![arg],
        Span::new(0, 10),
    );
    let mut expandee = Expandee::new(call);
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Cancelled
    ));
    assert!(expandee.tree.erroneous);
    assert!(compiler.messages().is_empty());
}

#[test]
fn erroneous_definitions_are_never_expanded() {
    let mut compiler = Compiler::new();
    let double = setup_double(&mut compiler);
    compiler
        .session
        .macro_defs
        .get_mut(&double)
        .unwrap()
        .erroneous = true;
    let arg = compiler.lit_int(21, Span::new(7, 9));
    let mut expandee = Expandee::new(compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![arg],
        Span::new(0, 10),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Cancelled
    ));
    assert!(compiler.session.open_macros.is_empty());
}

#[test]
fn missing_implementation_without_override_fails() {
    let mut compiler = Compiler::new();
    let method = compiler.impl_method("ghostImpl", int_impl_sig());
    let ghost = compiler.define_macro(
        "ghost",
        method,
        Vec::new(),
        vec![vec![Param::new("x", TypeExpr::named("Int"))]],
        TypeExpr::named("Int"),
    );
    let arg = compiler.lit_int(1, Span::new(6, 7));
    let mut expandee = Expandee::new(compiler.call(
        ghost,
        "ghost",
        Vec::new(),
        vec![arg],
        Span::new(0, 8),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("not found: demo.Macros$")));
    assert!(!compiler.session.fallback_occurred);
}

#[test]
fn bad_classpath_entries_fail_expansion() {
    let mut compiler = Compiler::with_classpath(vec!["ghost-lib".into()]);
    let method = compiler.impl_method("doubleImpl", double_sig());
    let double = compiler.define_macro(
        "double",
        method,
        vec![TypeParam::named("T")],
        vec![vec![Param::new("x", TypeExpr::named("T"))]],
        TypeExpr::named("T"),
    );
    let arg = compiler.lit_int(21, Span::new(7, 9));
    let mut expandee = Expandee::new(compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![arg],
        Span::new(0, 10),
    ));
    assert!(matches!(
        compiler.expand(&mut expandee),
        ExpansionResult::Failure
    ));
    assert!(compiler
        .messages()
        .iter()
        .any(|message| message.contains("bad macro classpath entry")));
}

#[test]
fn fallback_repository_is_searched_after_primary() {
    let mut compiler = Compiler::new();
    compiler.session.settings.fallback_classpath = Some(vec!["extra".into()]);
    let mut extra = Library::new("extra");
    extra.register("demo.Macros$", "doubleImpl", double_impl());
    compiler.session.add_library(extra);

    let method = compiler.impl_method("doubleImpl", double_sig());
    // primary library intentionally left without the callable
    let double = compiler.define_macro(
        "double",
        method,
        vec![TypeParam::named("T")],
        vec![vec![Param::new("x", TypeExpr::named("T"))]],
        TypeExpr::named("T"),
    );
    let arg = compiler.lit_int(21, Span::new(7, 9));
    let mut expandee = Expandee::new(compiler.call(
        double,
        "double",
        vec![TypeExpr::named("Int")],
        vec![arg],
        Span::new(0, 10),
    ));
    let expanded = match compiler.expand(&mut expandee) {
        ExpansionResult::Success(expanded) => expanded,
        other => panic!("expected success, got {:?}: {:?}", other, compiler.messages()),
    };
    assert_eq!(eval(&expanded), 42);
}
