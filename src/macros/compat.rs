use crate::language::{
    span::Span,
    symbols::MethodSig,
    types::{InferVar, TypeExpr},
};
use crate::macros::{errors::MacroError, signature::SigCandidate};
use crate::typecheck::{infer::InferState, solve, ConstraintSet};
use std::collections::HashMap;

/// Outcome of checking one definition against its implementation: the index
/// of the single compatible candidate.
pub fn check_candidates(
    candidates: &[SigCandidate],
    impl_sig: &MethodSig,
    infer: &mut InferState,
    span: Span,
) -> Result<usize, MacroError> {
    let mut matched: Vec<usize> = Vec::new();
    let mut reports: Vec<Vec<String>> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        match check_one(candidate, impl_sig, infer) {
            Ok(()) => {
                matched.push(index);
                reports.push(Vec::new());
            }
            Err(lines) => reports.push(lines),
        }
    }

    match matched.len() {
        1 => Ok(matched[0]),
        0 => {
            // surface the diagnostic of the candidate whose shape is closest
            // to what the implementation actually declares
            let chosen = candidates
                .iter()
                .position(|candidate| {
                    candidate.param_lists.len() == impl_sig.param_lists.len()
                })
                .unwrap_or(0);
            let mut details = reports[chosen].clone();
            details.push(format!("required: {}", candidates[chosen].render()));
            Err(MacroError::SignatureMismatch {
                details,
                internal: false,
                span,
            })
        }
        _ => Err(MacroError::SignatureMismatch {
            details: vec![format!(
                "{} required signatures are simultaneously compatible with the implementation",
                matched.len()
            )],
            internal: true,
            span,
        }),
    }
}

/// Check one required candidate against the implementation's declared
/// signature. Structural failures short-circuit; parameter and return
/// mismatches past that accumulate so the richest report survives.
fn check_one(
    candidate: &SigCandidate,
    impl_sig: &MethodSig,
    infer: &mut InferState,
) -> Result<(), Vec<String>> {
    let required_lists = &candidate.param_lists;
    let actual_lists = &impl_sig.param_lists;

    if required_lists.len() != actual_lists.len() {
        let line = if actual_lists.len() > required_lists.len() {
            format!(
                "the implementation declares {} parameter lists where {} are required: remove the extra list",
                actual_lists.len(),
                required_lists.len()
            )
        } else {
            format!(
                "the implementation declares {} parameter lists where {} are required: a required list is missing",
                actual_lists.len(),
                required_lists.len()
            )
        };
        return Err(vec![line]);
    }

    for (index, (required, actual)) in
        required_lists.iter().zip(actual_lists.iter()).enumerate()
    {
        if required.len() != actual.len() {
            let line = if actual.len() > required.len() {
                let extra = &actual[required.len()];
                format!(
                    "parameter list {} has an extra parameter `{}`",
                    index + 1,
                    extra.name
                )
            } else {
                let missing = &required[actual.len()];
                format!(
                    "parameter list {} is missing parameter `{}`",
                    index + 1,
                    missing.name
                )
            };
            return Err(vec![line]);
        }
    }

    // the implementation's own type parameters become fresh unification
    // variables; its formal names are lined up with the required ones
    let mut tparam_map: HashMap<String, TypeExpr> = HashMap::new();
    let mut fresh: Vec<InferVar> = Vec::new();
    for tparam in &impl_sig.type_params {
        let var = infer.fresh_var();
        fresh.push(var);
        tparam_map.insert(tparam.name.clone(), TypeExpr::Var(var));
    }
    let mut rename: HashMap<String, String> = HashMap::new();
    for (required, actual) in required_lists.iter().zip(actual_lists.iter()) {
        for (rparam, aparam) in required.iter().zip(actual.iter()) {
            if rparam.name != aparam.name {
                rename.insert(aparam.name.clone(), rparam.name.clone());
            }
        }
    }
    let instantiate = |ty: &TypeExpr| {
        ty.substitute(&tparam_map).rename_singleton_heads(&rename)
    };

    let mut mismatches: Vec<String> = Vec::new();
    let mut constraints = ConstraintSet::new(fresh);

    for (required, actual) in required_lists.iter().zip(actual_lists.iter()) {
        for (rparam, aparam) in required.iter().zip(actual.iter()) {
            if !rparam.is_synthetic && rparam.name != aparam.name {
                mismatches.push(format!(
                    "parameter name mismatch: required `{}`, found `{}`",
                    rparam.name, aparam.name
                ));
            }
            if rparam.is_vararg != aparam.is_vararg {
                mismatches.push(format!(
                    "parameter `{}` {} variadic",
                    aparam.name,
                    if rparam.is_vararg {
                        "must be"
                    } else {
                        "must not be"
                    }
                ));
            }
            let actual_ty = instantiate(&aparam.ty);
            if !constraints.conforms(&rparam.ty, &actual_ty) {
                mismatches.push(format!(
                    "parameter `{}`: required {}, found {}",
                    rparam.name,
                    rparam.ty.canonical_name(),
                    actual_ty.canonical_name()
                ));
            }
        }
    }

    let actual_ret = instantiate(&impl_sig.ret);
    if !constraints.conforms(&actual_ret, &candidate.ret) {
        mismatches.push(format!(
            "return type: required {}, found {}",
            candidate.ret.canonical_name(),
            actual_ret.canonical_name()
        ));
    }

    match solve(&constraints) {
        Ok(solution) => {
            for (tparam, var) in impl_sig.type_params.iter().zip(constraints.vars()) {
                let Some(bound) = &tparam.upper_bound else {
                    continue;
                };
                let bound = bound.substitute(&tparam_map).substitute_vars(&solution);
                let solved = solution
                    .get(var)
                    .cloned()
                    .unwrap_or_else(TypeExpr::nothing);
                if !crate::typecheck::conforms(&solved, &bound) {
                    mismatches.push(format!(
                        "inferred {} for type parameter `{}` does not conform to its bound {}",
                        solved.canonical_name(),
                        tparam.name,
                        bound.canonical_name()
                    ));
                }
            }
        }
        Err(failure) => {
            mismatches.push(format!(
                "could not infer type parameter {}: {}",
                TypeExpr::Var(failure.var).canonical_name(),
                failure.detail
            ));
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(mismatches)
    }
}
