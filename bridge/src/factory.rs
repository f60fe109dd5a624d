//! One execution context per script file, multiplexed onto a master state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use moonbridge_core::{State, Status};

use crate::error::{BridgeError, Result};

/// How a context is prepared before its file runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    pub load_std: bool,
    /// Files run, in order, before the script itself.
    pub dependencies: Vec<PathBuf>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_std(mut self, load_std: bool) -> Self {
        self.load_std = load_std;
        self
    }

    pub fn dependency(mut self, path: impl Into<PathBuf>) -> Self {
        self.dependencies.push(path.into());
        self
    }
}

struct Slot {
    state: State,
    anchor: i64,
    leases: usize,
    generation: u64,
}

/// Creates and tracks the contexts of this thread.
pub struct ContextFactory {
    master: State,
    contexts: RefCell<HashMap<String, Slot>>,
    generation: Cell<u64>,
}

thread_local! {
    static FACTORY: ContextFactory = ContextFactory::new();
}

/// A lease on the context of one script file.
///
/// Clones share the lease count; when the last handle is dropped the context
/// is forgotten by the factory.
pub struct Context {
    state: State,
    file_name: Rc<str>,
    generation: u64,
}

impl Context {
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("file_name", &self.file_name)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        let _ = FACTORY.try_with(|factory| factory.lease(&self.file_name, self.generation));
        Context {
            state: self.state.clone(),
            file_name: self.file_name.clone(),
            generation: self.generation,
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // the thread-local may already be gone during thread teardown
        let _ = FACTORY.try_with(|factory| factory.unlease(&self.file_name, self.generation));
    }
}

fn run_file(state: &State, file: &Path) -> std::result::Result<(), String> {
    let depth = state.top();
    let status = state.do_file(file);
    let outcome = match status {
        Status::Ok => Ok(()),
        _ => Err(state
            .to_str(-1)
            .unwrap_or_else(|| format!("({} error object)", state.type_name(-1)))),
    };
    state.set_top(depth);
    outcome
}

impl ContextFactory {
    fn new() -> Self {
        ContextFactory {
            master: State::new(),
            contexts: RefCell::new(HashMap::new()),
            generation: Cell::new(0),
        }
    }

    /// Runs `f` with this thread's factory.
    pub fn with<R>(f: impl FnOnce(&ContextFactory) -> R) -> R {
        FACTORY.with(f)
    }

    pub fn get_context(&self, file_name: &str, load_std: bool) -> Result<Context> {
        self.open(file_name, &ContextOptions::new().with_std(load_std))
    }

    /// Returns the context of `file_name`, creating and running it first if the
    /// file is not loaded yet. Options only apply when the context is created.
    pub fn open(&self, file_name: &str, options: &ContextOptions) -> Result<Context> {
        if let Some(slot) = self.contexts.borrow_mut().get_mut(file_name) {
            slot.leases += 1;
            tracing::trace!(target: "moonbridge::factory", file = file_name, leases = slot.leases, "context reused");
            return Ok(Context {
                state: slot.state.clone(),
                file_name: Rc::from(file_name),
                generation: slot.generation,
            });
        }

        let state = self.master.new_thread();
        let anchor = self.master.create_ref();
        if let Err(message) = Self::prepare(&state, file_name, options) {
            self.master.release_ref(anchor);
            tracing::debug!(target: "moonbridge::factory", file = file_name, %message, "context creation failed");
            return Err(BridgeError::ScriptLoad {
                file: file_name.to_string(),
                message,
            });
        }

        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.contexts.borrow_mut().insert(
            file_name.to_string(),
            Slot {
                state: state.clone(),
                anchor,
                leases: 1,
                generation,
            },
        );
        tracing::debug!(target: "moonbridge::factory", file = file_name, anchor, load_std = options.load_std, "context created");
        Ok(Context {
            state,
            file_name: Rc::from(file_name),
            generation,
        })
    }

    fn prepare(state: &State, file_name: &str, options: &ContextOptions) -> std::result::Result<(), String> {
        state.new_table();
        state.set_globals().map_err(|e| e.to_string())?;
        if options.load_std {
            moonbridge_stdlib::open_libs(state).map_err(|e| e.to_string())?;
        }
        for dependency in &options.dependencies {
            run_file(state, dependency)?;
        }
        run_file(state, Path::new(file_name))
    }

    /// Loads the standard library into the already-open context of `file_name`.
    pub fn open_standard_library(&self, file_name: &str) -> Result<()> {
        let state = self
            .contexts
            .borrow()
            .get(file_name)
            .map(|slot| slot.state.clone())
            .ok_or_else(|| BridgeError::unresolved(file_name))?;
        moonbridge_stdlib::open_libs(&state).map_err(|e| BridgeError::ScriptLoad {
            file: file_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Forgets `file_name` regardless of outstanding leases. Existing handles
    /// stay usable; the next open creates a fresh context.
    pub fn release(&self, file_name: &str) -> bool {
        let removed = self.contexts.borrow_mut().remove(file_name);
        match removed {
            Some(slot) => {
                self.master.release_ref(slot.anchor);
                tracing::debug!(target: "moonbridge::factory", file = file_name, "context released");
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self, file_name: &str) -> bool {
        self.contexts.borrow().contains_key(file_name)
    }

    pub fn loaded_count(&self) -> usize {
        self.contexts.borrow().len()
    }

    /// Outstanding leases on `file_name`'s context.
    pub fn leases(&self, file_name: &str) -> usize {
        self.contexts.borrow().get(file_name).map_or(0, |slot| slot.leases)
    }

    fn lease(&self, file_name: &str, generation: u64) {
        if let Some(slot) = self.contexts.borrow_mut().get_mut(file_name) {
            if slot.generation == generation {
                slot.leases += 1;
            }
        }
    }

    fn unlease(&self, file_name: &str, generation: u64) {
        let last = {
            let Ok(mut contexts) = self.contexts.try_borrow_mut() else {
                return;
            };
            match contexts.get_mut(file_name) {
                Some(slot) if slot.generation == generation => {
                    slot.leases = slot.leases.saturating_sub(1);
                    slot.leases == 0
                }
                _ => false,
            }
        };
        if last {
            self.release(file_name);
        }
    }
}
