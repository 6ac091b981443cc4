//! Render command - Render a template with variables.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use tracing::{debug, info};

use brace_template::{TemplateError, TemplateRenderer};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template file to render
    pub template: PathBuf,

    /// JSON file holding an object of variables (repeatable, later files win)
    #[arg(long = "vars", value_name = "FILE")]
    pub vars: Vec<PathBuf>,

    /// Set a single variable; the value is parsed as JSON, else taken as a string
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    /// Render in deployment mode (in memory, terse errors)
    #[arg(long, env = "BRACE_DEPLOY")]
    pub deploy: bool,

    /// Directory for development-mode scratch files
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn execute(args: RenderArgs) -> Result<()> {
    let mut renderer = TemplateRenderer::new(!args.deploy);
    if let Some(dir) = &args.scratch_dir {
        renderer = renderer.scratch_dir(dir);
    }

    for path in &args.vars {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read variables file {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse variables file {}", path.display()))?;
        renderer
            .set_many(&value)
            .with_context(|| format!("Variables file {} must hold a JSON object", path.display()))?;
        debug!("Loaded variables from {}", path.display());
    }

    for assignment in &args.set {
        let (name, value) = parse_assignment(assignment)?;
        renderer.set(name, value);
    }

    info!(
        "Rendering {} ({:?} mode, {} variable(s))",
        args.template.display(),
        renderer.mode(),
        renderer.variables().len()
    );
    let output = renderer.fetch(&args.template)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &output)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Wrote {} bytes to {}", output.len(), path.display());
        }
        None => print!("{}", output),
    }

    Ok(())
}

/// Split `name=value`; the value is JSON if it parses, else a plain string.
fn parse_assignment(assignment: &str) -> Result<(String, Value), TemplateError> {
    let (name, raw) = assignment.split_once('=').ok_or_else(|| {
        TemplateError::InvalidArgument(format!("expected NAME=VALUE, got '{assignment}'"))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(TemplateError::InvalidArgument(format!(
            "missing variable name in '{assignment}'"
        )));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}
