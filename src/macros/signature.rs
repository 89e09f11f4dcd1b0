use crate::language::types::{Param, ParamList, TypeExpr};
use crate::macros::MacroDefinition;
use std::collections::HashSet;

/// One acceptable implementation shape for a macro definition. The first
/// parameter list is always the single context parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct SigCandidate {
    pub param_lists: Vec<ParamList>,
    pub ret: TypeExpr,
}

impl SigCandidate {
    pub fn render(&self) -> String {
        let lists: Vec<String> = self
            .param_lists
            .iter()
            .map(crate::language::types::render_param_list)
            .collect();
        format!("{}: {}", lists.join(""), self.ret.canonical_name())
    }
}

pub fn context_type() -> TypeExpr {
    TypeExpr::named("Context")
}

/// References to the enclosing type make sense at the implementation's
/// metalevel only through the context's call-site prefix.
pub fn rewrite_self_refs(ty: &TypeExpr) -> TypeExpr {
    match ty {
        TypeExpr::SelfType => TypeExpr::Prefix,
        TypeExpr::Named(name, args) => TypeExpr::Named(
            name.clone(),
            args.iter().map(rewrite_self_refs).collect(),
        ),
        TypeExpr::Reified(inner) => TypeExpr::Reified(Box::new(rewrite_self_refs(inner))),
        TypeExpr::Tag(inner) => TypeExpr::Tag(Box::new(rewrite_self_refs(inner))),
        TypeExpr::Nullary(inner) => TypeExpr::Nullary(Box::new(rewrite_self_refs(inner))),
        TypeExpr::Var(_)
        | TypeExpr::Singleton(_)
        | TypeExpr::Prefix
        | TypeExpr::Unit => ty.clone(),
    }
}

/// A singleton reference to one of the definition's own value parameters
/// denotes, at the implementation's metalevel, the payload of the reified
/// expression that stands in for that parameter.
pub fn rewrite_param_refs(ty: &TypeExpr, params: &HashSet<String>) -> TypeExpr {
    match ty {
        TypeExpr::Singleton(path) => match path.first() {
            Some(head) if params.contains(head) => {
                let mut rewritten = Vec::with_capacity(path.len() + 1);
                rewritten.push(head.clone());
                rewritten.push("value".to_string());
                rewritten.extend(path.iter().skip(1).cloned());
                TypeExpr::Singleton(rewritten)
            }
            _ => ty.clone(),
        },
        TypeExpr::Named(name, args) => TypeExpr::Named(
            name.clone(),
            args.iter()
                .map(|arg| rewrite_param_refs(arg, params))
                .collect(),
        ),
        TypeExpr::Reified(inner) => {
            TypeExpr::Reified(Box::new(rewrite_param_refs(inner, params)))
        }
        TypeExpr::Tag(inner) => TypeExpr::Tag(Box::new(rewrite_param_refs(inner, params))),
        TypeExpr::Nullary(inner) => {
            TypeExpr::Nullary(Box::new(rewrite_param_refs(inner, params)))
        }
        TypeExpr::Var(_)
        | TypeExpr::Prefix
        | TypeExpr::SelfType
        | TypeExpr::Unit => ty.clone(),
    }
}

/// Derive the acceptable implementation shapes for a definition, in
/// priority order. A definition with type parameters may back onto an
/// implementation that takes the trailing evidence list or onto one that
/// does not; a definition without them has exactly the canonical shape.
pub fn derive_candidates(def: &MacroDefinition) -> Vec<SigCandidate> {
    let param_names: HashSet<String> = def
        .param_lists
        .iter()
        .flatten()
        .map(|param| param.name.clone())
        .collect();
    let transform =
        |ty: &TypeExpr| rewrite_param_refs(&rewrite_self_refs(ty), &param_names);

    let mut value_lists: Vec<ParamList> = Vec::with_capacity(def.param_lists.len() + 1);
    value_lists.push(vec![Param::synthetic("context", context_type())]);
    for list in &def.param_lists {
        value_lists.push(
            list.iter()
                .map(|param| Param {
                    name: param.name.clone(),
                    ty: TypeExpr::reified(transform(&param.ty)),
                    // a vararg stays a vararg, wrapped per element
                    is_vararg: param.is_vararg,
                    is_synthetic: param.is_synthetic,
                })
                .collect(),
        );
    }
    let ret = TypeExpr::reified(transform(&def.ret));

    if def.type_params.is_empty() {
        return vec![SigCandidate {
            param_lists: value_lists,
            ret,
        }];
    }

    let evidence: ParamList = def
        .type_params
        .iter()
        .enumerate()
        .map(|(index, tparam)| {
            Param::synthetic(
                format!("evidence${}", index + 1),
                TypeExpr::tag(TypeExpr::named(tparam.name.clone())),
            )
        })
        .collect();
    let mut with_evidence = value_lists.clone();
    with_evidence.push(evidence);

    vec![
        SigCandidate {
            param_lists: with_evidence,
            ret: ret.clone(),
        },
        SigCandidate {
            param_lists: value_lists,
            ret,
        },
    ]
}
