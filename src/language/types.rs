use std::collections::{HashMap, HashSet};

/// An inference variable introduced by the type checker. Variables still
/// listed in the run's undetermined registry delay macro expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InferVar(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Named(String, Vec<TypeExpr>),
    Var(InferVar),
    /// A path-dependent singleton type, e.g. `x.type` or `x.value.type`.
    Singleton(Vec<String>),
    /// A reified call-site expression of the payload type, as seen through
    /// the expansion context.
    Reified(Box<TypeExpr>),
    /// Type-tag evidence of the payload type through the expansion context.
    Tag(Box<TypeExpr>),
    /// The call-site prefix type reached through the expansion context.
    Prefix,
    SelfType,
    /// A zero-argument method type wrapping its result.
    Nullary(Box<TypeExpr>),
    Unit,
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into(), Vec::new())
    }

    pub fn applied(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named(name.into(), args)
    }

    pub fn reified(of: TypeExpr) -> Self {
        TypeExpr::Reified(Box::new(of))
    }

    pub fn tag(of: TypeExpr) -> Self {
        TypeExpr::Tag(Box::new(of))
    }

    pub fn any() -> Self {
        TypeExpr::named("Any")
    }

    pub fn nothing() -> Self {
        TypeExpr::named("Nothing")
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TypeExpr::Named(name, args) if name == "Any" && args.is_empty())
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, TypeExpr::Named(name, args) if name == "Nothing" && args.is_empty())
    }

    /// Substitute named type references, recursing through every position.
    pub fn substitute(&self, map: &HashMap<String, TypeExpr>) -> TypeExpr {
        match self {
            TypeExpr::Named(name, args) => {
                if args.is_empty() {
                    map.get(name)
                        .cloned()
                        .unwrap_or_else(|| TypeExpr::Named(name.clone(), Vec::new()))
                } else {
                    TypeExpr::Named(
                        name.clone(),
                        args.iter().map(|ty| ty.substitute(map)).collect(),
                    )
                }
            }
            TypeExpr::Reified(inner) => TypeExpr::Reified(Box::new(inner.substitute(map))),
            TypeExpr::Tag(inner) => TypeExpr::Tag(Box::new(inner.substitute(map))),
            TypeExpr::Nullary(inner) => TypeExpr::Nullary(Box::new(inner.substitute(map))),
            TypeExpr::Var(_)
            | TypeExpr::Singleton(_)
            | TypeExpr::Prefix
            | TypeExpr::SelfType
            | TypeExpr::Unit => self.clone(),
        }
    }

    /// Substitute solved inference variables.
    pub fn substitute_vars(&self, map: &HashMap<InferVar, TypeExpr>) -> TypeExpr {
        match self {
            TypeExpr::Var(var) => map.get(var).cloned().unwrap_or(TypeExpr::Var(*var)),
            TypeExpr::Named(name, args) => TypeExpr::Named(
                name.clone(),
                args.iter().map(|ty| ty.substitute_vars(map)).collect(),
            ),
            TypeExpr::Reified(inner) => TypeExpr::Reified(Box::new(inner.substitute_vars(map))),
            TypeExpr::Tag(inner) => TypeExpr::Tag(Box::new(inner.substitute_vars(map))),
            TypeExpr::Nullary(inner) => TypeExpr::Nullary(Box::new(inner.substitute_vars(map))),
            TypeExpr::Singleton(_)
            | TypeExpr::Prefix
            | TypeExpr::SelfType
            | TypeExpr::Unit => self.clone(),
        }
    }

    /// Rename the head segment of singleton paths, used when lining up an
    /// implementation's dependent parameter references with the required
    /// signature's parameter names.
    pub fn rename_singleton_heads(&self, map: &HashMap<String, String>) -> TypeExpr {
        match self {
            TypeExpr::Singleton(path) => {
                let mut path = path.clone();
                if let Some(head) = path.first_mut() {
                    if let Some(renamed) = map.get(head) {
                        *head = renamed.clone();
                    }
                }
                TypeExpr::Singleton(path)
            }
            TypeExpr::Named(name, args) => TypeExpr::Named(
                name.clone(),
                args.iter()
                    .map(|ty| ty.rename_singleton_heads(map))
                    .collect(),
            ),
            TypeExpr::Reified(inner) => {
                TypeExpr::Reified(Box::new(inner.rename_singleton_heads(map)))
            }
            TypeExpr::Tag(inner) => TypeExpr::Tag(Box::new(inner.rename_singleton_heads(map))),
            TypeExpr::Nullary(inner) => {
                TypeExpr::Nullary(Box::new(inner.rename_singleton_heads(map)))
            }
            TypeExpr::Var(_)
            | TypeExpr::Prefix
            | TypeExpr::SelfType
            | TypeExpr::Unit => self.clone(),
        }
    }

    pub fn collect_vars(&self, out: &mut HashSet<InferVar>) {
        match self {
            TypeExpr::Var(var) => {
                out.insert(*var);
            }
            TypeExpr::Named(_, args) => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
            TypeExpr::Reified(inner) | TypeExpr::Tag(inner) | TypeExpr::Nullary(inner) => {
                inner.collect_vars(out);
            }
            TypeExpr::Singleton(_)
            | TypeExpr::Prefix
            | TypeExpr::SelfType
            | TypeExpr::Unit => {}
        }
    }

    pub fn canonical_name(&self) -> String {
        match self {
            TypeExpr::Named(name, args) => {
                if args.is_empty() {
                    name.clone()
                } else {
                    let rendered: Vec<String> =
                        args.iter().map(|ty| ty.canonical_name()).collect();
                    format!("{}[{}]", name, rendered.join(","))
                }
            }
            TypeExpr::Var(var) => format!("?{}", var.0),
            TypeExpr::Singleton(path) => format!("{}.type", path.join(".")),
            TypeExpr::Reified(inner) => format!("Expr[{}]", inner.canonical_name()),
            TypeExpr::Tag(inner) => format!("Tag[{}]", inner.canonical_name()),
            TypeExpr::Prefix => "context.Prefix".into(),
            TypeExpr::SelfType => "Self".into(),
            TypeExpr::Nullary(inner) => format!("=> {}", inner.canonical_name()),
            TypeExpr::Unit => "()".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub is_vararg: bool,
    /// Synthetic parameters (the context, evidence slots) are matched by
    /// position only, never by name.
    pub is_synthetic: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            is_vararg: false,
            is_synthetic: false,
        }
    }

    pub fn vararg(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            is_vararg: true,
            is_synthetic: false,
        }
    }

    pub fn synthetic(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            is_vararg: false,
            is_synthetic: true,
        }
    }
}

pub type ParamList = Vec<Param>;

pub fn render_param_list(params: &ParamList) -> String {
    let rendered: Vec<String> = params
        .iter()
        .map(|param| {
            let suffix = if param.is_vararg { "*" } else { "" };
            format!("{}: {}{}", param.name, param.ty.canonical_name(), suffix)
        })
        .collect();
    format!("({})", rendered.join(", "))
}
