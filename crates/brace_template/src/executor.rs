//! Execution strategies for transformed templates.
//!
//! Both executors compile the lowered source unit with the same compiler and
//! run it with the same interpreter, so successful output is identical. They
//! differ in how a fault is reported:
//!
//! - [`ScratchFileExecutor`] materializes the unit as a named scratch file and
//!   reports faults against that file and line.
//! - [`InMemoryExecutor`] runs the unit from memory and reports only the
//!   fault message.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{ExecutionError, TemplateResult};
use crate::script::{self, Fault, Scope};

/// A transformed template, ready to execute.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Template name used in diagnostics (usually its path)
    pub name: String,
    /// Lowered directive source
    pub code: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// Runs a source unit against a scope and captures its output.
///
/// Implementations must return either the complete output or an error,
/// never partial output.
pub trait Executor {
    fn execute(&self, unit: &SourceUnit, scope: Scope) -> TemplateResult<String>;
}

fn compile_and_run(code: &str, scope: Scope) -> Result<String, Fault> {
    let program = script::compile(code)?;
    script::run(&program, scope)
}

/// Deployment-mode executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryExecutor;

impl Executor for InMemoryExecutor {
    fn execute(&self, unit: &SourceUnit, scope: Scope) -> TemplateResult<String> {
        compile_and_run(&unit.code, scope).map_err(|fault| {
            debug!("Template {} failed: {}", unit.name, fault);
            ExecutionError::new(fault.message).into()
        })
    }
}

/// Development-mode executor.
#[derive(Debug, Clone, Default)]
pub struct ScratchFileExecutor {
    dir: Option<PathBuf>,
}

impl ScratchFileExecutor {
    /// Scratch files go to the system temp directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scratch files go to `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl Executor for ScratchFileExecutor {
    fn execute(&self, unit: &SourceUnit, scope: Scope) -> TemplateResult<String> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tpl_").suffix(".tpl");
        // Dropping the handle removes the file on every early return below.
        let mut scratch = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        scratch.write_all(unit.code.as_bytes())?;
        scratch.flush()?;

        let scratch_path = scratch.path().to_path_buf();
        debug!("Rendering {} via scratch file {:?}", unit.name, scratch_path);

        let code = fs::read_to_string(&scratch_path)?;
        let result: TemplateResult<String> = compile_and_run(&code, scope).map_err(|fault| {
            ExecutionError::located(&unit.name, fault.message, &scratch_path, fault.line).into()
        });

        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch file {:?}: {}", scratch_path, e);
        }

        result
    }
}
