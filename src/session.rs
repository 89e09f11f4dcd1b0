use crate::language::{
    ast::NodeId,
    errors::Reporter,
    symbols::{SymbolId, SymbolTable},
    types::InferVar,
};
use crate::macros::{engine::ContextFrame, MacroDefinition};
use crate::runtime::{
    registry::{CodeRepository, Library},
    value::RunId,
};
use crate::typecheck::infer::InferState;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_RUN: AtomicU32 = AtomicU32::new(0);

#[derive(Clone, Debug)]
pub struct Settings {
    /// Names of the libraries searched for macro implementations.
    pub macro_classpath: Vec<String>,
    /// When set, a second repository searched after the primary misses.
    /// Unset disables the fallback attempt entirely.
    pub fallback_classpath: Option<Vec<String>>,
    pub max_expansion_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            macro_classpath: Vec::new(),
            fallback_classpath: None,
            max_expansion_depth: 32,
        }
    }
}

/// A delayed expandee's record: the inference variables that must resolve
/// before the expansion can be retried.
#[derive(Clone, Debug, Default)]
pub struct DelayEntry {
    pub pending: HashSet<InferVar>,
}

/// One compilation run. Owns every cache and all run-scoped expansion
/// state; a fresh run starts with fresh caches.
pub struct Session {
    pub run: RunId,
    pub settings: Settings,
    pub symbols: SymbolTable,
    pub infer: InferState,
    pub reporter: Reporter,
    pub macro_defs: HashMap<SymbolId, MacroDefinition>,
    pub delayed: HashMap<NodeId, DelayEntry>,
    pub open_macros: Vec<ContextFrame>,
    /// Set when any expansion in this run fell back to an overridden symbol.
    pub fallback_occurred: bool,
    pub(crate) next_node: NodeId,
    libraries: HashMap<String, Library>,
    primary_repo: Option<Rc<CodeRepository>>,
    fallback_repo: Option<Option<Rc<CodeRepository>>>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            run: RunId(NEXT_RUN.fetch_add(1, Ordering::Relaxed)),
            settings,
            symbols: SymbolTable::new(),
            infer: InferState::new(),
            reporter: Reporter::new(),
            macro_defs: HashMap::new(),
            delayed: HashMap::new(),
            open_macros: Vec::new(),
            fallback_occurred: false,
            next_node: 0,
            libraries: HashMap::new(),
            primary_repo: None,
            fallback_repo: None,
        }
    }

    pub fn add_library(&mut self, library: Library) {
        self.libraries.insert(library.name.clone(), library);
    }

    pub fn define_macro(&mut self, def: MacroDefinition) {
        self.symbols.get_mut(def.sym).is_macro = true;
        self.macro_defs.insert(def.sym, def);
    }

    pub fn fresh_node_id(&mut self) -> NodeId {
        let id = self.next_node;
        self.next_node += 1;
        id
    }

    /// The primary repository, built from the macro classpath at most once
    /// per run.
    pub fn primary_repository(&mut self) -> Result<Rc<CodeRepository>, Vec<String>> {
        if let Some(repo) = &self.primary_repo {
            return Ok(repo.clone());
        }
        let repo = Rc::new(Self::build_repository(
            &self.libraries,
            &self.settings.macro_classpath,
        )?);
        self.primary_repo = Some(repo.clone());
        Ok(repo)
    }

    /// The fallback repository, or None when no fallback classpath is
    /// configured. Built and cached on first use like the primary.
    pub fn fallback_repository(&mut self) -> Result<Option<Rc<CodeRepository>>, Vec<String>> {
        if let Some(repo) = &self.fallback_repo {
            return Ok(repo.clone());
        }
        let built = match &self.settings.fallback_classpath {
            Some(entries) => Some(Rc::new(Self::build_repository(&self.libraries, entries)?)),
            None => None,
        };
        self.fallback_repo = Some(built.clone());
        Ok(built)
    }

    fn build_repository(
        libraries: &HashMap<String, Library>,
        entries: &[String],
    ) -> Result<CodeRepository, Vec<String>> {
        let mut resolved = Vec::with_capacity(entries.len());
        let mut unknown = Vec::new();
        for entry in entries {
            match libraries.get(entry) {
                Some(library) => resolved.push(library),
                None => unknown.push(entry.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(unknown);
        }
        Ok(CodeRepository::from_libraries(resolved))
    }

    /// Notification from the inference collaborator that a variable has
    /// been solved: prune it from every pending delay entry. Entries whose
    /// pending set empties stay recorded until the engine revisits them.
    pub fn mark_determined(&mut self, var: InferVar) {
        if self.infer.mark_determined(var) {
            for entry in self.delayed.values_mut() {
                entry.pending.remove(&var);
            }
        }
    }
}
