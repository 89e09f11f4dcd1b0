use crate::language::{span::Span, symbols::SymbolId, types::TypeExpr};

pub type NodeId = u32;

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    Int(i64),
    Bool(bool),
    Str(String),
    Unit,
}

impl Lit {
    pub fn type_name(&self) -> &'static str {
        match self {
            Lit::Int(_) => "Int",
            Lit::Bool(_) => "Bool",
            Lit::Str(_) => "String",
            Lit::Unit => "Unit",
        }
    }
}

/// An attributed syntax tree. Nodes carry the identity the delay table keys
/// on, plus the symbol and type slots filled in by earlier type checking.
#[derive(Clone, Debug)]
pub struct Tree {
    pub id: NodeId,
    pub kind: TreeKind,
    pub span: Span,
    pub sym: Option<SymbolId>,
    pub tpe: Option<TypeExpr>,
    pub erroneous: bool,
}

#[derive(Clone, Debug)]
pub enum TreeKind {
    Ident(String),
    Select { qual: Box<Tree>, name: String },
    Apply { fun: Box<Tree>, args: Vec<Tree> },
    TypeApply { fun: Box<Tree>, targs: Vec<TypeExpr> },
    This,
    Super,
    Literal(Lit),
}

impl Tree {
    pub fn new(id: NodeId, kind: TreeKind, span: Span) -> Self {
        Self {
            id,
            kind,
            span,
            sym: None,
            tpe: None,
            erroneous: false,
        }
    }

    pub fn with_sym(mut self, sym: SymbolId) -> Self {
        self.sym = Some(sym);
        self
    }

    pub fn with_tpe(mut self, tpe: TypeExpr) -> Self {
        self.tpe = Some(tpe);
        self
    }

    /// The symbol of the applied callee: peels Apply/TypeApply wrappers down
    /// to the underlying Ident/Select and returns its symbol.
    pub fn callee_sym(&self) -> Option<SymbolId> {
        match &self.kind {
            TreeKind::Apply { fun, .. } | TreeKind::TypeApply { fun, .. } => fun.callee_sym(),
            _ => self.sym,
        }
    }

    /// The underlying callee tree of an application spine.
    pub fn callee(&self) -> &Tree {
        match &self.kind {
            TreeKind::Apply { fun, .. } | TreeKind::TypeApply { fun, .. } => fun.callee(),
            _ => self,
        }
    }

    pub fn is_application(&self) -> bool {
        matches!(
            self.kind,
            TreeKind::Apply { .. } | TreeKind::TypeApply { .. }
        )
    }

    pub fn any_erroneous(&self) -> bool {
        let mut found = false;
        self.walk(&mut |tree| {
            if tree.erroneous {
                found = true;
            }
        });
        found
    }

    pub fn walk(&self, f: &mut impl FnMut(&Tree)) {
        f(self);
        match &self.kind {
            TreeKind::Select { qual, .. } => qual.walk(f),
            TreeKind::Apply { fun, args } => {
                fun.walk(f);
                for arg in args {
                    arg.walk(f);
                }
            }
            TreeKind::TypeApply { fun, .. } => fun.walk(f),
            TreeKind::Ident(_)
            | TreeKind::This
            | TreeKind::Super
            | TreeKind::Literal(_) => {}
        }
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Tree)) {
        f(self);
        match &mut self.kind {
            TreeKind::Select { qual, .. } => qual.walk_mut(f),
            TreeKind::Apply { fun, args } => {
                fun.walk_mut(f);
                for arg in args {
                    arg.walk_mut(f);
                }
            }
            TreeKind::TypeApply { fun, .. } => fun.walk_mut(f),
            TreeKind::Ident(_)
            | TreeKind::This
            | TreeKind::Super
            | TreeKind::Literal(_) => {}
        }
    }

    pub fn canonical(&self) -> String {
        match &self.kind {
            TreeKind::Ident(name) => name.clone(),
            TreeKind::Select { qual, name } => format!("{}.{}", qual.canonical(), name),
            TreeKind::Apply { fun, args } => {
                let rendered: Vec<String> = args.iter().map(|arg| arg.canonical()).collect();
                format!("{}({})", fun.canonical(), rendered.join(", "))
            }
            TreeKind::TypeApply { fun, targs } => {
                let rendered: Vec<String> =
                    targs.iter().map(|ty| ty.canonical_name()).collect();
                format!("{}[{}]", fun.canonical(), rendered.join(", "))
            }
            TreeKind::This => "this".into(),
            TreeKind::Super => "super".into(),
            TreeKind::Literal(lit) => match lit {
                Lit::Int(value) => value.to_string(),
                Lit::Bool(value) => value.to_string(),
                Lit::Str(value) => format!("{:?}", value),
                Lit::Unit => "()".into(),
            },
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match &self.kind {
            TreeKind::Ident(_) => "identifier",
            TreeKind::Select { .. } => "member selection",
            TreeKind::Apply { .. } => "application",
            TreeKind::TypeApply { .. } => "type application",
            TreeKind::This => "self reference",
            TreeKind::Super => "super reference",
            TreeKind::Literal(_) => "literal",
        }
    }
}
