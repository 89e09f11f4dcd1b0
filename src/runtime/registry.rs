use crate::runtime::value::{ImplFault, InvocationScope, MacroValue};
use std::collections::HashMap;
use std::rc::Rc;

/// A dynamically loadable macro implementation bound to an ordered argument
/// list. Implementations run on the compilation thread and signal faults as
/// values, never by unwinding.
pub type ImplFn =
    Rc<dyn Fn(&mut InvocationScope<'_>, &[MacroValue]) -> Result<MacroValue, ImplFault>>;

/// Frames the invocation machinery contributes to a fault's backtrace.
/// Diagnostics strip these before showing the trace.
pub const MACHINERY_FRAMES: [&str; 3] = [
    "runtime::registry::invoke",
    "runtime::registry::dispatch",
    "macros::engine::expand_runtime",
];

#[derive(Clone, Default)]
pub struct InstanceEntry {
    methods: HashMap<String, Vec<ImplFn>>,
}

impl InstanceEntry {
    pub fn methods(&self, name: &str) -> &[ImplFn] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Default)]
pub struct CompanionEntry {
    /// The singleton's live instance; absent when initialization failed.
    pub instance: Option<InstanceEntry>,
}

#[derive(Clone, Default)]
pub struct ClassEntry {
    pub companion: Option<CompanionEntry>,
}

/// One separately compiled library of macro implementations, keyed by the
/// binary names of its classes.
#[derive(Clone)]
pub struct Library {
    pub name: String,
    classes: HashMap<String, ClassEntry>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: HashMap::new(),
        }
    }

    /// Register a callable under `binary_name.method`, creating the class,
    /// companion and instance entries on the way. Registering a second
    /// callable under the same member surfaces as an ambiguity at lookup.
    pub fn register(&mut self, binary_name: &str, method: &str, call: ImplFn) {
        let class = self.classes.entry(binary_name.to_string()).or_default();
        let companion = class.companion.get_or_insert_with(CompanionEntry::default);
        let instance = companion.instance.get_or_insert_with(InstanceEntry::default);
        instance
            .methods
            .entry(method.to_string())
            .or_default()
            .push(call);
    }

    /// A class visible on the classpath without a usable companion.
    pub fn register_bare_class(&mut self, binary_name: &str) {
        self.classes.entry(binary_name.to_string()).or_default();
    }
}

/// The merged view of every library on one classpath. Constructed at most
/// once per session and cached there.
pub struct CodeRepository {
    classes: HashMap<String, ClassEntry>,
}

impl CodeRepository {
    pub fn from_libraries<'a>(libraries: impl IntoIterator<Item = &'a Library>) -> Self {
        let mut classes: HashMap<String, ClassEntry> = HashMap::new();
        for library in libraries {
            for (name, entry) in &library.classes {
                let merged = classes.entry(name.clone()).or_default();
                if let Some(companion) = &entry.companion {
                    let target = merged.companion.get_or_insert_with(CompanionEntry::default);
                    if let Some(instance) = &companion.instance {
                        let methods = target
                            .instance
                            .get_or_insert_with(InstanceEntry::default);
                        for (method, calls) in &instance.methods {
                            methods
                                .methods
                                .entry(method.clone())
                                .or_default()
                                .extend(calls.iter().cloned());
                        }
                    }
                }
            }
        }
        Self { classes }
    }

    pub fn resolve_class(&self, binary_name: &str) -> Option<&ClassEntry> {
        self.classes.get(binary_name)
    }

    pub fn resolve_companion<'a>(&self, class: &'a ClassEntry) -> Option<&'a CompanionEntry> {
        class.companion.as_ref()
    }

    pub fn resolve_instance<'a>(
        &self,
        companion: &'a CompanionEntry,
    ) -> Option<&'a InstanceEntry> {
        companion.instance.as_ref()
    }

    pub fn resolve_member<'a>(&self, instance: &'a InstanceEntry, name: &str) -> &'a [ImplFn] {
        instance.methods(name)
    }

    /// Invoke a resolved callable. Machinery frames are appended to raised
    /// faults so callers see where dispatch ended and user code began.
    pub fn invoke(
        scope: &mut InvocationScope<'_>,
        call: &ImplFn,
        args: &[MacroValue],
    ) -> Result<MacroValue, ImplFault> {
        match call(scope, args) {
            Err(ImplFault::Raise {
                message,
                mut backtrace,
            }) => {
                backtrace.extend(MACHINERY_FRAMES.iter().map(|frame| frame.to_string()));
                Err(ImplFault::Raise { message, backtrace })
            }
            other => other,
        }
    }
}
