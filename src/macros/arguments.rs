use crate::language::{
    ast::{NodeId, Tree, TreeKind},
    symbols::{MethodSig, TypeParamOrigin},
    types::{ParamList, TypeExpr},
};
use crate::macros::{errors::MacroError, MacroDefinition};
use crate::runtime::value::{MacroValue, RunId};

/// An expandee pulled apart: the call-site prefix, the explicit type
/// arguments, and the argument lists in source order.
#[derive(Clone, Debug, Default)]
pub struct Decomposed {
    pub prefix: Option<Tree>,
    pub targs: Vec<TypeExpr>,
    pub arg_lists: Vec<Vec<Tree>>,
}

/// Peel the application spine innermost to outermost.
pub fn decompose(tree: &Tree) -> Decomposed {
    let mut decomposed = Decomposed::default();
    let mut current = tree;
    loop {
        match &current.kind {
            TreeKind::Apply { fun, args } => {
                decomposed.arg_lists.push(args.clone());
                current = fun;
            }
            TreeKind::TypeApply { fun, targs } => {
                decomposed.targs = targs.clone();
                current = fun;
            }
            TreeKind::Select { qual, .. } => {
                decomposed.prefix = Some((**qual).clone());
                break;
            }
            _ => break,
        }
    }
    decomposed.arg_lists.reverse();
    decomposed
}

/// Build the ordered runtime argument list for one expansion: the context,
/// the reified argument lists reconciled against the implementation's
/// declared shape, the type-tag evidence, and collected vararg tails.
pub fn synthesize(
    run: RunId,
    def: &MacroDefinition,
    impl_sig: &MethodSig,
    with_evidence: bool,
    expandee: &Tree,
    expandee_id: NodeId,
    depth: usize,
) -> Result<Vec<MacroValue>, MacroError> {
    let decomposed = decompose(expandee);
    let span = expandee.span;

    let context = MacroValue::Context {
        run,
        prefix: decomposed.prefix.clone(),
        expandee: expandee_id,
        depth,
    };
    let mut runtime_lists: Vec<Vec<MacroValue>> = Vec::with_capacity(
        decomposed.arg_lists.len() + 2,
    );
    runtime_lists.push(vec![context]);
    for list in &decomposed.arg_lists {
        runtime_lists.push(
            list.iter()
                .map(|tree| MacroValue::Expr {
                    run,
                    tree: tree.clone(),
                })
                .collect(),
        );
    }

    let declared: &[ParamList] = if with_evidence {
        &impl_sig.param_lists[..impl_sig.param_lists.len() - 1]
    } else {
        &impl_sig.param_lists
    };

    if declared.len() == runtime_lists.len() + 1
        && declared.last().is_some_and(|list| list.is_empty())
    {
        runtime_lists.push(Vec::new());
    }
    if declared.len() != runtime_lists.len() {
        return Err(MacroError::Arity {
            required: declared.len().saturating_sub(1),
            found: runtime_lists.len() - 1,
            span,
        });
    }

    for (values, params) in runtime_lists.iter_mut().zip(declared.iter()) {
        collect_vararg_tail(values, params);
    }

    if with_evidence {
        let mut evidence = Vec::with_capacity(def.type_params.len());
        for (index, tparam) in def.type_params.iter().enumerate() {
            let resolved = match &tparam.origin {
                TypeParamOrigin::Definition => decomposed.targs.get(index).cloned(),
                TypeParamOrigin::Enclosing { index, .. } => {
                    prefix_type_argument(&decomposed, *index)
                }
            };
            let Some(ty) = resolved else {
                return Err(MacroError::SignatureMismatch {
                    details: vec![format!(
                        "no type argument is available for type parameter `{}`",
                        tparam.name
                    )],
                    internal: true,
                    span,
                });
            };
            evidence.push(MacroValue::Tag(ty));
        }
        runtime_lists.push(evidence);
    }

    Ok(runtime_lists.into_iter().flatten().collect())
}

/// An inherited type parameter is read off the call-site prefix type, as
/// the prefix instantiates its enclosing type.
fn prefix_type_argument(decomposed: &Decomposed, index: usize) -> Option<TypeExpr> {
    let prefix = decomposed.prefix.as_ref()?;
    match prefix.tpe.as_ref()? {
        TypeExpr::Named(_, args) => args.get(index).cloned(),
        _ => None,
    }
}

fn collect_vararg_tail(values: &mut Vec<MacroValue>, params: &ParamList) {
    let Some(last) = params.last() else {
        return;
    };
    if !last.is_vararg {
        return;
    }
    let fixed = params.len() - 1;
    if values.len() < fixed {
        return;
    }
    let tail: Vec<MacroValue> = values.split_off(fixed);
    values.push(MacroValue::Seq(tail));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::Lit;
    use crate::language::span::Span;
    use crate::language::symbols::{SymbolId, TypeParam, TypeParamOrigin};
    use crate::language::types::Param;
    use crate::macros::signature::context_type;

    fn lit(id: NodeId, value: i64) -> Tree {
        Tree::new(id, TreeKind::Literal(Lit::Int(value)), Span::new(0, 2))
    }

    fn call(targs: Vec<TypeExpr>, arg_lists: Vec<Vec<Tree>>) -> Tree {
        let mut tree = Tree::new(1, TreeKind::Ident("double".into()), Span::new(0, 6));
        if !targs.is_empty() {
            tree = Tree::new(
                2,
                TreeKind::TypeApply {
                    fun: Box::new(tree),
                    targs,
                },
                Span::new(0, 11),
            );
        }
        for (offset, args) in arg_lists.into_iter().enumerate() {
            tree = Tree::new(
                10 + offset as NodeId,
                TreeKind::Apply {
                    fun: Box::new(tree),
                    args,
                },
                Span::new(0, 15),
            );
        }
        tree
    }

    fn definition(type_params: Vec<TypeParam>) -> MacroDefinition {
        MacroDefinition::new(
            SymbolId(0),
            type_params,
            vec![vec![Param::new("x", TypeExpr::named("Int"))]],
            TypeExpr::named("Int"),
            Tree::new(0, TreeKind::Ident("impl".into()), Span::dummy()),
            Span::dummy(),
        )
    }

    fn impl_sig(param_lists: Vec<ParamList>) -> MethodSig {
        MethodSig {
            type_params: Vec::new(),
            param_lists,
            ret: TypeExpr::reified(TypeExpr::named("Int")),
        }
    }

    #[test]
    fn decompose_recovers_prefix_targs_and_lists() {
        let qual = Tree::new(0, TreeKind::Ident("Nums".into()), Span::new(0, 4));
        let select = Tree::new(
            1,
            TreeKind::Select {
                qual: Box::new(qual),
                name: "double".into(),
            },
            Span::new(0, 11),
        );
        let typed = Tree::new(
            2,
            TreeKind::TypeApply {
                fun: Box::new(select),
                targs: vec![TypeExpr::named("Int")],
            },
            Span::new(0, 16),
        );
        let applied = Tree::new(
            3,
            TreeKind::Apply {
                fun: Box::new(typed),
                args: vec![lit(4, 21)],
            },
            Span::new(0, 20),
        );
        let decomposed = decompose(&applied);
        assert!(decomposed.prefix.is_some());
        assert_eq!(decomposed.targs, vec![TypeExpr::named("Int")]);
        assert_eq!(decomposed.arg_lists.len(), 1);
        assert_eq!(decomposed.arg_lists[0].len(), 1);
    }

    #[test]
    fn one_list_call_matches_context_plus_one_list() {
        let def = definition(Vec::new());
        let sig = impl_sig(vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("Int")))],
        ]);
        let tree = call(Vec::new(), vec![vec![lit(4, 21)]]);
        let args =
            synthesize(RunId(0), &def, &sig, false, &tree, tree.id, 1).expect("synthesized");
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0], MacroValue::Context { .. }));
        assert!(matches!(args[1], MacroValue::Expr { .. }));
    }

    #[test]
    fn extra_argument_lists_cannot_be_partially_applied() {
        let def = definition(Vec::new());
        let sig = impl_sig(vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("Int")))],
        ]);
        let tree = call(Vec::new(), vec![vec![lit(4, 21)], vec![lit(5, 2)]]);
        let err = synthesize(RunId(0), &def, &sig, false, &tree, tree.id, 1)
            .expect_err("partial application");
        match err {
            MacroError::Arity { required, found, .. } => {
                assert_eq!(required, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn trailing_empty_declared_list_is_appended() {
        let def = definition(Vec::new());
        let sig = impl_sig(vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("Int")))],
            Vec::new(),
        ]);
        let tree = call(Vec::new(), vec![vec![lit(4, 21)]]);
        let args =
            synthesize(RunId(0), &def, &sig, false, &tree, tree.id, 1).expect("synthesized");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn evidence_for_own_type_parameters_comes_from_explicit_targs() {
        let def = definition(vec![TypeParam::named("T")]);
        let sig = impl_sig(vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("U")))],
            vec![Param::synthetic("tag", TypeExpr::tag(TypeExpr::named("U")))],
        ]);
        let tree = call(vec![TypeExpr::named("Int")], vec![vec![lit(4, 21)]]);
        let args =
            synthesize(RunId(0), &def, &sig, true, &tree, tree.id, 1).expect("synthesized");
        assert_eq!(args.len(), 3);
        match &args[2] {
            MacroValue::Tag(ty) => assert_eq!(ty, &TypeExpr::named("Int")),
            other => panic!("unexpected value: {}", other.kind_name()),
        }
    }

    #[test]
    fn evidence_for_inherited_type_parameters_reads_the_prefix_type() {
        let mut tparam = TypeParam::named("E");
        tparam.origin = TypeParamOrigin::Enclosing {
            class: SymbolId(9),
            index: 0,
        };
        let def = definition(vec![tparam]);
        let sig = impl_sig(vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::new("x", TypeExpr::reified(TypeExpr::named("E")))],
            vec![Param::synthetic("tag", TypeExpr::tag(TypeExpr::named("E")))],
        ]);
        let qual = Tree::new(0, TreeKind::Ident("cell".into()), Span::new(0, 4))
            .with_tpe(TypeExpr::applied("Cell", vec![TypeExpr::named("Str")]));
        let select = Tree::new(
            1,
            TreeKind::Select {
                qual: Box::new(qual),
                name: "double".into(),
            },
            Span::new(0, 11),
        );
        let tree = Tree::new(
            3,
            TreeKind::Apply {
                fun: Box::new(select),
                args: vec![lit(4, 21)],
            },
            Span::new(0, 15),
        );
        let args =
            synthesize(RunId(0), &def, &sig, true, &tree, tree.id, 1).expect("synthesized");
        match &args[2] {
            MacroValue::Tag(ty) => assert_eq!(ty, &TypeExpr::named("Str")),
            other => panic!("unexpected value: {}", other.kind_name()),
        }
    }

    #[test]
    fn vararg_tails_collapse_into_one_sequence() {
        let def = definition(Vec::new());
        let sig = impl_sig(vec![
            vec![Param::synthetic("c", context_type())],
            vec![Param::vararg("xs", TypeExpr::reified(TypeExpr::named("Int")))],
        ]);
        let tree = call(Vec::new(), vec![vec![lit(4, 1), lit(5, 2), lit(6, 3)]]);
        let args =
            synthesize(RunId(0), &def, &sig, false, &tree, tree.id, 1).expect("synthesized");
        assert_eq!(args.len(), 2);
        match &args[1] {
            MacroValue::Seq(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected value: {}", other.kind_name()),
        }
    }
}
