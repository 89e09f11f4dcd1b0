use crate::language::{
    span::Span,
    types::{ParamList, TypeExpr},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Package,
    /// A statically accessible singleton object.
    Module,
    Class,
    Method,
    Term,
    TypeParam,
    /// A term reference that escaped its defining expansion; `origin`
    /// records where the reification introduced it.
    FreeTerm { origin: String },
    FreeType { origin: String },
}

impl SymbolKind {
    pub fn is_module(&self) -> bool {
        matches!(self, SymbolKind::Module)
    }

    pub fn is_package(&self) -> bool {
        matches!(self, SymbolKind::Package)
    }
}

/// Where a type parameter visible inside a macro definition was introduced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeParamOrigin {
    /// Declared on the macro definition itself.
    Definition,
    /// Inherited from an enclosing type; `index` is its position among the
    /// enclosing type's parameters.
    Enclosing { class: SymbolId, index: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub upper_bound: Option<TypeExpr>,
    pub origin: TypeParamOrigin,
}

impl TypeParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upper_bound: None,
            origin: TypeParamOrigin::Definition,
        }
    }

    pub fn bounded(name: impl Into<String>, bound: TypeExpr) -> Self {
        Self {
            name: name.into(),
            upper_bound: Some(bound),
            origin: TypeParamOrigin::Definition,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MethodSig {
    pub type_params: Vec<TypeParam>,
    pub param_lists: Vec<ParamList>,
    pub ret: TypeExpr,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub owner: Option<SymbolId>,
    pub span: Span,
    pub is_macro: bool,
    pub erroneous: bool,
    /// The symbol this one structurally overrides, if any.
    pub overrides: Option<SymbolId>,
    pub signature: Option<MethodSig>,
}

impl Symbol {
    fn new(name: impl Into<String>, kind: SymbolKind, owner: Option<SymbolId>) -> Self {
        Self {
            name: name.into(),
            kind,
            owner,
            span: Span::dummy(),
            is_macro: false,
            erroneous: false,
            overrides: None,
            signature: None,
        }
    }
}

#[derive(Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn define(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        owner: Option<SymbolId>,
    ) -> SymbolId {
        self.insert(Symbol::new(name, kind, owner))
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Owner chain from the symbol's immediate owner outward to the root.
    pub fn owner_chain(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).owner;
        while let Some(owner) = current {
            chain.push(owner);
            current = self.get(owner).owner;
        }
        chain
    }

    /// A symbol is a top-level package member when its owner is a package.
    pub fn is_top_level(&self, id: SymbolId) -> bool {
        match self.get(id).owner {
            Some(owner) => self.get(owner).kind.is_package(),
            None => true,
        }
    }

    /// Dotted path of the owning packages, innermost last.
    pub fn package_path(&self, id: SymbolId) -> String {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = self.get(id).owner;
        while let Some(owner) = current {
            let sym = self.get(owner);
            if sym.kind.is_package() && !sym.name.is_empty() {
                segments.push(&sym.name);
            }
            current = sym.owner;
        }
        segments.reverse();
        segments.join(".")
    }

    /// A module is statically accessible when every enclosing owner up to
    /// the root is itself a module or a package.
    pub fn is_static_module(&self, id: SymbolId) -> bool {
        if !self.get(id).kind.is_module() {
            return false;
        }
        self.owner_chain(id)
            .iter()
            .all(|owner| {
                let kind = &self.get(*owner).kind;
                kind.is_module() || kind.is_package()
            })
    }

    pub fn full_name(&self, id: SymbolId) -> String {
        let mut segments = vec![self.get(id).name.clone()];
        let mut current = self.get(id).owner;
        while let Some(owner) = current {
            let sym = self.get(owner);
            if !sym.name.is_empty() {
                segments.push(sym.name.clone());
            }
            current = sym.owner;
        }
        segments.reverse();
        segments.join(".")
    }
}
