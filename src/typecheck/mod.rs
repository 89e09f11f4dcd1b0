pub mod infer;

use crate::language::{
    ast::{Tree, TreeKind},
    symbols::SymbolTable,
    types::{InferVar, TypeExpr},
};
use std::collections::HashMap;

/// Subtype conformance with no inference variables in play. Variables that
/// do appear are compared by identity only.
pub fn conforms(lhs: &TypeExpr, rhs: &TypeExpr) -> bool {
    ConstraintSet::new(Vec::new()).conforms(lhs, rhs)
}

/// Records bounds on a fixed set of unification variables while checking
/// conformance. Constraints on untracked variables degrade to identity.
pub struct ConstraintSet {
    vars: Vec<InferVar>,
    lower: HashMap<InferVar, Vec<TypeExpr>>,
    upper: HashMap<InferVar, Vec<TypeExpr>>,
}

impl ConstraintSet {
    pub fn new(vars: Vec<InferVar>) -> Self {
        Self {
            vars,
            lower: HashMap::new(),
            upper: HashMap::new(),
        }
    }

    pub fn vars(&self) -> &[InferVar] {
        &self.vars
    }

    fn tracks(&self, var: InferVar) -> bool {
        self.vars.contains(&var)
    }

    /// Does `lhs` conform to (is a subtype of) `rhs`? Bounds on tracked
    /// variables are recorded instead of decided.
    pub fn conforms(&mut self, lhs: &TypeExpr, rhs: &TypeExpr) -> bool {
        match (lhs, rhs) {
            (TypeExpr::Var(a), TypeExpr::Var(b)) if a == b => true,
            (TypeExpr::Var(var), hi) if self.tracks(*var) => {
                self.upper.entry(*var).or_default().push(hi.clone());
                true
            }
            (lo, TypeExpr::Var(var)) if self.tracks(*var) => {
                self.lower.entry(*var).or_default().push(lo.clone());
                true
            }
            _ if lhs == rhs => true,
            _ if lhs.is_nothing() || rhs.is_any() => true,
            (TypeExpr::Named(lname, largs), TypeExpr::Named(rname, rargs)) => {
                lname == rname
                    && largs.len() == rargs.len()
                    && largs
                        .iter()
                        .zip(rargs.iter())
                        .all(|(l, r)| self.conforms(l, r))
            }
            (TypeExpr::Reified(l), TypeExpr::Reified(r)) => self.conforms(l, r),
            (TypeExpr::Tag(l), TypeExpr::Tag(r)) => self.conforms(l, r),
            (TypeExpr::Nullary(l), TypeExpr::Nullary(r)) => self.conforms(l, r),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SolveFailure {
    pub var: InferVar,
    pub detail: String,
}

/// Solve each tracked variable from its recorded bounds: the greatest lower
/// bound wins when present, otherwise the least upper bound, otherwise
/// Nothing. Earlier solutions substitute into later bounds, so variables
/// are resolved in declaration order.
pub fn solve(constraints: &ConstraintSet) -> Result<HashMap<InferVar, TypeExpr>, SolveFailure> {
    let mut solution: HashMap<InferVar, TypeExpr> = HashMap::new();
    for var in constraints.vars() {
        let lowers: Vec<TypeExpr> = constraints
            .lower
            .get(var)
            .map(|bounds| bounds.iter().map(|ty| ty.substitute_vars(&solution)).collect())
            .unwrap_or_default();
        let uppers: Vec<TypeExpr> = constraints
            .upper
            .get(var)
            .map(|bounds| bounds.iter().map(|ty| ty.substitute_vars(&solution)).collect())
            .unwrap_or_default();

        let solved = if !lowers.is_empty() {
            pick_maximal(&lowers).ok_or_else(|| SolveFailure {
                var: *var,
                detail: format!(
                    "incompatible lower bounds: {}",
                    render_bounds(&lowers)
                ),
            })?
        } else if !uppers.is_empty() {
            pick_minimal(&uppers).ok_or_else(|| SolveFailure {
                var: *var,
                detail: format!(
                    "incompatible upper bounds: {}",
                    render_bounds(&uppers)
                ),
            })?
        } else {
            TypeExpr::nothing()
        };

        for upper in &uppers {
            if !conforms(&solved, upper) {
                return Err(SolveFailure {
                    var: *var,
                    detail: format!(
                        "{} does not conform to upper bound {}",
                        solved.canonical_name(),
                        upper.canonical_name()
                    ),
                });
            }
        }
        solution.insert(*var, solved);
    }
    Ok(solution)
}

fn pick_maximal(bounds: &[TypeExpr]) -> Option<TypeExpr> {
    bounds
        .iter()
        .find(|candidate| bounds.iter().all(|other| conforms(other, candidate)))
        .cloned()
}

fn pick_minimal(bounds: &[TypeExpr]) -> Option<TypeExpr> {
    bounds
        .iter()
        .find(|candidate| bounds.iter().all(|other| conforms(candidate, other)))
        .cloned()
}

fn render_bounds(bounds: &[TypeExpr]) -> String {
    let rendered: Vec<String> = bounds.iter().map(|ty| ty.canonical_name()).collect();
    rendered.join(", ")
}

/// A zero-argument method type re-checks against its result type when the
/// call shape was nullary.
pub fn unwrap_nullary(ty: &TypeExpr) -> TypeExpr {
    match ty {
        TypeExpr::Nullary(inner) => (**inner).clone(),
        other => other.clone(),
    }
}

/// Best-effort type of an attributed tree. Falls back to the symbol table
/// for resolved references and to operand types for the arithmetic and
/// comparison selections test implementations produce.
pub fn infer_tree_type(tree: &Tree, table: &SymbolTable) -> Option<TypeExpr> {
    if let Some(tpe) = &tree.tpe {
        return Some(tpe.clone());
    }
    match &tree.kind {
        TreeKind::Literal(lit) => Some(TypeExpr::named(lit.type_name())),
        TreeKind::Apply { fun, .. } => match &fun.kind {
            TreeKind::Select { qual, name } if is_arithmetic_op(name) => {
                infer_tree_type(qual, table)
            }
            TreeKind::Select { qual, name } if is_comparison_op(name) => {
                infer_tree_type(qual, table).map(|_| TypeExpr::named("Bool"))
            }
            _ => applied_result_type(fun, table),
        },
        TreeKind::TypeApply { fun, .. } => applied_result_type(fun, table),
        TreeKind::Ident(_) | TreeKind::Select { .. } => tree
            .sym
            .and_then(|sym| table.get(sym).signature.as_ref())
            .map(|sig| sig.ret.clone()),
        TreeKind::This | TreeKind::Super => None,
    }
}

fn applied_result_type(fun: &Tree, table: &SymbolTable) -> Option<TypeExpr> {
    fun.callee_sym()
        .and_then(|sym| table.get(sym).signature.as_ref())
        .map(|sig| unwrap_nullary(&sig.ret))
}

fn is_arithmetic_op(name: &str) -> bool {
    matches!(name, "*" | "+" | "-" | "/" | "%")
}

fn is_comparison_op(name: &str) -> bool {
    matches!(name, "==" | "!=" | "<" | "<=" | ">" | ">=")
}
