pub mod base;
pub mod math;
pub mod os;
pub mod string;
pub mod table;

mod args;

#[cfg(test)]
mod math_test;
#[cfg(test)]
mod string_test;

use anyhow::Result;
use moonbridge_core::{State, Table, Val, val::NativeFn};

/// A library of native functions that can be opened into a state.
pub trait Library {
    /// Global name the library is installed under.
    fn name(&self) -> &'static str;

    fn functions(&self) -> &'static [(&'static str, NativeFn)];

    /// Non-function members such as `math.pi`.
    fn constants(&self) -> Vec<(&'static str, Val)> {
        Vec::new()
    }

    fn build(&self) -> Table {
        let mut table = Table::new();
        for (name, func) in self.functions() {
            table.set_str(name, Val::native(*func));
        }
        for (name, value) in self.constants() {
            table.set_str(name, value);
        }
        table
    }

    /// Installs the library into the globals of `state`.
    fn open(&self, state: &State) -> Result<()> {
        state.push(Val::table(self.build()));
        state.set_global(self.name());
        Ok(())
    }
}

/// Libraries opened by [`open_libs`], in order.
pub fn standard_libraries() -> Vec<Box<dyn Library>> {
    vec![
        Box::new(base::BaseLibrary),
        Box::new(math::MathLibrary),
        Box::new(string::StringLibrary),
        Box::new(table::TableLibrary),
        Box::new(os::OsLibrary),
    ]
}

/// Opens every standard library into `state`.
pub fn open_libs(state: &State) -> Result<()> {
    for lib in standard_libraries() {
        lib.open(state)?;
        tracing::trace!(target: "moonbridge_stdlib", library = lib.name(), "library opened");
    }
    Ok(())
}
