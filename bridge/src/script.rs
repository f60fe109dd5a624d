use std::path::PathBuf;

use moonbridge_core::{State, Status, ValueType};

use crate::error::{BridgeError, Result};
use crate::factory::{Context, ContextFactory, ContextOptions};
use crate::function::{Args, Returns, ScriptFunction, invoke};
use crate::path::DottedPath;
use crate::registry::{self, HostFunction};
use crate::stack::{FromStack, ToStack};
use crate::value_ref::ValueRef;

/// How [`Script::open_with`] prepares a new context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOptions {
    load_std: bool,
    dependencies: Vec<PathBuf>,
}

impl ScriptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard_library(mut self, load: bool) -> Self {
        self.load_std = load;
        self
    }

    pub fn dependency(mut self, path: impl Into<PathBuf>) -> Self {
        self.dependencies.push(path.into());
        self
    }

    pub fn dependencies<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dependencies.extend(paths.into_iter().map(Into::into));
        self
    }

    fn context_options(&self) -> ContextOptions {
        ContextOptions {
            load_std: self.load_std,
            dependencies: self.dependencies.clone(),
        }
    }
}

/// Host-side handle to a script file and its context.
///
/// Two scripts opened on the same file name in one thread share a context and
/// see each other's changes.
#[derive(Debug, Default)]
pub struct Script {
    context: Option<Context>,
    options: ScriptOptions,
}

impl Script {
    /// A script with no file open; every access fails with `ScriptClosed`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(file_name: &str) -> Result<Self> {
        Self::open_with(file_name, ScriptOptions::new())
    }

    pub fn open_with(file_name: &str, options: ScriptOptions) -> Result<Self> {
        let context = ContextFactory::with(|factory| factory.open(file_name, &options.context_options()))?;
        Ok(Script {
            context: Some(context),
            options,
        })
    }

    /// Switches to `file_name` with the current options. On failure the
    /// previous file stays open.
    pub fn change(&mut self, file_name: &str) -> Result<()> {
        let options = self.options.context_options();
        let context = ContextFactory::with(|factory| factory.open(file_name, &options))?;
        self.context = Some(context);
        Ok(())
    }

    pub fn close(&mut self) {
        self.context = None;
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.context.as_ref().map(Context::file_name)
    }

    pub fn state(&self) -> Result<&State> {
        self.context.as_ref().map(Context::state).ok_or(BridgeError::ScriptClosed)
    }

    pub fn value(&self, path: &str) -> Result<ValueRef> {
        Ok(ValueRef::new(self.state()?.clone(), DottedPath::parse(path)?))
    }

    pub fn get<T: FromStack>(&self, path: &str) -> Result<T> {
        self.value(path)?.get()
    }

    pub fn set<T: ToStack>(&self, path: &str, value: T) -> Result<()> {
        self.value(path)?.set(value)
    }

    pub fn is_nil(&self, path: &str) -> Result<bool> {
        self.value(path)?.is_nil()
    }

    pub fn value_type(&self, path: &str) -> Result<ValueType> {
        self.value(path)?.value_type()
    }

    pub fn fields(&self, path: &str) -> Result<Vec<(String, ValueType)>> {
        self.value(path)?.fields()
    }

    pub fn call<R: Returns, A: Args>(&self, function: &ScriptFunction, args: A) -> Result<R> {
        invoke(self.state()?, function, args)
    }

    pub fn register<M, F: HostFunction<M>>(&self, path: &str, f: F) -> Result<usize> {
        registry::register(self.state()?, &DottedPath::parse(path)?, f)
    }

    /// Runs a chunk of code in this script's context.
    pub fn run(&self, code: &str) -> Result<()> {
        let state = self.state()?;
        let depth = state.top();
        let status = state.do_string(code);
        let outcome = match status {
            Status::Ok => Ok(()),
            status => {
                let message = state
                    .to_str(-1)
                    .unwrap_or_else(|| format!("({} error object)", state.type_name(-1)));
                match status {
                    Status::Syntax => Err(BridgeError::ScriptLoad {
                        file: self.file_name().unwrap_or_default().to_string(),
                        message,
                    }),
                    _ => Err(BridgeError::ScriptRuntime {
                        function: "<chunk>".to_string(),
                        message,
                    }),
                }
            }
        };
        state.set_top(depth);
        outcome
    }

    pub fn open_standard_library(&self) -> Result<()> {
        let context = self.context.as_ref().ok_or(BridgeError::ScriptClosed)?;
        ContextFactory::with(|factory| match factory.is_loaded(context.file_name()) {
            true => factory.open_standard_library(context.file_name()),
            // released from the factory while this handle kept it alive
            false => moonbridge_stdlib::open_libs(context.state()).map_err(|e| BridgeError::ScriptLoad {
                file: context.file_name().to_string(),
                message: e.to_string(),
            }),
        })
    }

    /// Current depth of the context's stack; zero between operations.
    pub fn stack_depth(&self) -> Result<i32> {
        Ok(self.state()?.top())
    }
}
