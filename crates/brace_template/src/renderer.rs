//! The template renderer.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ExecutionError, TemplateError, TemplateResult};
use crate::executor::{Executor, InMemoryExecutor, ScratchFileExecutor, SourceUnit};
use crate::script;
use crate::script::value::type_name;
use crate::transform::{self, Fragment, Transformer};

/// Variables available to a template, by name.
pub type VariableSet = HashMap<String, Value>;

/// How a renderer executes templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Execute from a scratch file; faults report file and line.
    #[default]
    Development,
    /// Execute from memory; faults report only the message.
    Deployment,
}

/// Renders moustache templates against a set of variables.
///
/// ```rust,no_run
/// use brace_template::TemplateRenderer;
///
/// let mut renderer = TemplateRenderer::new(true);
/// renderer.set("name", "World");
/// let html = renderer.fetch("hello.tpl").unwrap();
/// ```
///
/// A renderer holds mutable state; use one instance per concurrent render.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    vars: VariableSet,
    mode: RenderMode,
    scratch_dir: Option<PathBuf>,
    transformer: Transformer,
}

impl TemplateRenderer {
    /// Create a renderer in development (`true`) or deployment (`false`) mode.
    pub fn new(development: bool) -> Self {
        Self::with_mode(if development {
            RenderMode::Development
        } else {
            RenderMode::Deployment
        })
    }

    pub fn with_mode(mode: RenderMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Place development-mode scratch files in `dir` instead of the system
    /// temp directory.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Set a single variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Set a single variable from any serializable value, such as a struct.
    ///
    /// Fails with [`TemplateError::InvalidArgument`] if `value` cannot be
    /// serialized; no variable is changed then.
    pub fn set_serialized<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> TemplateResult<()> {
        let name = name.into();
        let value = serde_json::to_value(value).map_err(|e| {
            TemplateError::InvalidArgument(format!("variable '{name}' could not be serialized: {e}"))
        })?;
        self.set(name, value);
        Ok(())
    }

    /// Set every key/value pair of a mapping.
    ///
    /// `data` is serialized with serde; it must serialize to a map (a
    /// `HashMap`, a struct, a `serde_json` object, ...). Anything else is
    /// rejected with [`TemplateError::InvalidArgument`] and no variable is
    /// changed.
    pub fn set_many<T: Serialize + ?Sized>(&mut self, data: &T) -> TemplateResult<()> {
        let value = serde_json::to_value(data).map_err(|e| {
            TemplateError::InvalidArgument(format!("variables could not be serialized: {e}"))
        })?;
        match value {
            Value::Object(map) => {
                for (name, value) in map {
                    self.set(name, value);
                }
                Ok(())
            }
            other => Err(TemplateError::InvalidArgument(format!(
                "expected a key/value mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn variables(&self) -> &VariableSet {
        &self.vars
    }

    /// Remove all variables.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Render the template file at `path`.
    pub fn fetch(&self, path: impl AsRef<Path>) -> TemplateResult<String> {
        let path = path.as_ref();
        let content = load_template(path)?;
        self.fetch_source(&path.display().to_string(), &content)
    }

    /// Render template `content` already in memory; `name` identifies it in
    /// diagnostics.
    pub fn fetch_source(&self, name: &str, content: &str) -> TemplateResult<String> {
        let unit = self.lower(name, content);
        match self.mode {
            RenderMode::Development => {
                let executor = match &self.scratch_dir {
                    Some(dir) => ScratchFileExecutor::in_dir(dir),
                    None => ScratchFileExecutor::new(),
                };
                executor.execute(&unit, self.vars.clone())
            }
            RenderMode::Deployment => InMemoryExecutor.execute(&unit, self.vars.clone()),
        }
    }

    /// Load, transform and compile the template at `path` without running it.
    ///
    /// Syntax faults are reported against the template file itself.
    pub fn check(&self, path: impl AsRef<Path>) -> TemplateResult<()> {
        let path = path.as_ref();
        let content = load_template(path)?;
        let name = path.display().to_string();
        let unit = self.lower(&name, &content);
        script::compile(&unit.code)
            .map(|_| ())
            .map_err(|fault| ExecutionError::located(name, fault.message, path, fault.line).into())
    }

    fn lower(&self, name: &str, content: &str) -> SourceUnit {
        let fragments = self.transformer.fragments(content);
        let (code, echoes) = fragments.iter().fold((0, 0), |(code, echo), f| match f {
            Fragment::Code(_) => (code + 1, echo),
            Fragment::Echo(_) => (code, echo + 1),
            Fragment::Text(_) => (code, echo),
        });
        debug!(
            "Transformed {}: {} code span(s), {} output span(s)",
            name, code, echoes
        );
        SourceUnit::new(name, transform::lower(&fragments))
    }
}

/// Read a template file.
///
/// Missing paths, non-files and permission failures are `NotFound`; any
/// other read failure is `ReadFailed`.
fn load_template(path: &Path) -> TemplateResult<String> {
    if !path.is_file() {
        return Err(TemplateError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            TemplateError::NotFound(path.to_path_buf())
        }
        _ => TemplateError::ReadFailed {
            path: path.to_path_buf(),
            source,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_set_overwrites() {
        let mut renderer = TemplateRenderer::default();
        renderer.set("name", "first");
        renderer.set("name", "second");
        assert_eq!(renderer.get("name"), Some(&json!("second")));
        assert_eq!(renderer.variables().len(), 1);
    }

    #[test]
    fn test_set_many_accepts_maps_and_structs() {
        #[derive(Serialize)]
        struct User {
            id: u32,
            name: String,
        }

        let mut renderer = TemplateRenderer::default();
        renderer
            .set_many(&User {
                id: 7,
                name: "Ann".to_string(),
            })
            .unwrap();
        let mut extra = HashMap::new();
        extra.insert("name", "Bob");
        renderer.set_many(&extra).unwrap();

        assert_eq!(renderer.get("id"), Some(&json!(7)));
        assert_eq!(renderer.get("name"), Some(&json!("Bob")));
    }

    #[test]
    fn test_set_serialized_struct() {
        #[derive(Serialize)]
        struct Product {
            name: String,
            price: f64,
        }

        let mut renderer = TemplateRenderer::new(false);
        renderer
            .set_serialized(
                "product",
                &Product {
                    name: "Tea".to_string(),
                    price: 4.5,
                },
            )
            .unwrap();
        assert_eq!(
            renderer.get("product"),
            Some(&json!({"name": "Tea", "price": 4.5}))
        );
        assert_eq!(
            renderer
                .fetch_source("product", "{{ $product->name }}: {{ $product->price }}")
                .unwrap(),
            "Tea: 4.5"
        );
    }

    #[test]
    fn test_set_serialized_failure_leaves_variables() {
        let mut renderer = TemplateRenderer::default();
        renderer.set("keep", 1);

        // Non-string map keys cannot become JSON object keys.
        let mut bad = HashMap::new();
        bad.insert((1, 2), "pair");
        let err = renderer.set_serialized("bad", &bad).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidArgument(_)), "{err:?}");
        assert_eq!(renderer.variables().len(), 1);
        assert!(renderer.get("bad").is_none());
    }

    #[test]
    fn test_set_many_rejects_non_mappings() {
        let mut renderer = TemplateRenderer::default();
        renderer.set("keep", 1);

        for bad in [json!("plain"), json!([1, 2, 3]), json!(5), json!(null)] {
            let err = renderer.set_many(&bad).unwrap_err();
            assert!(matches!(err, TemplateError::InvalidArgument(_)), "{err:?}");
        }
        assert!(renderer.set_many(&vec!["a", "b"]).is_err());
        assert_eq!(renderer.variables().len(), 1);
        assert_eq!(renderer.get("keep"), Some(&json!(1)));
    }

    #[test]
    fn test_clear() {
        let mut renderer = TemplateRenderer::new(false);
        renderer.set("a", 1);
        renderer.clear();
        assert!(renderer.variables().is_empty());
    }

    #[test]
    fn test_modes() {
        assert_eq!(TemplateRenderer::default().mode(), RenderMode::Development);
        assert_eq!(TemplateRenderer::new(true).mode(), RenderMode::Development);
        assert_eq!(TemplateRenderer::new(false).mode(), RenderMode::Deployment);
    }

    #[test]
    fn test_fetch_source() {
        let temp = tempdir().unwrap();
        let mut renderer = TemplateRenderer::new(true).scratch_dir(temp.path());
        renderer.set("name", "World");
        assert_eq!(
            renderer.fetch_source("inline", "Hello {{ $name }}!").unwrap(),
            "Hello World!"
        );
    }

    #[test]
    fn test_load_template_missing() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("missing.tpl");
        assert!(matches!(
            load_template(&missing),
            Err(TemplateError::NotFound(p)) if p == missing
        ));
        // A directory is not a template file.
        assert!(matches!(
            load_template(temp.path()),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_template_invalid_utf8() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("binary.tpl");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            load_template(&path),
            Err(TemplateError::ReadFailed { .. })
        ));
    }

    #[test]
    fn test_check_reports_template_line() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("broken.tpl");
        fs::write(&path, "<ul>\n{{{ foreach ($items as $item): }}}\n<li>{{ $item }}</li>\n</ul>\n").unwrap();

        let renderer = TemplateRenderer::default();
        let err = renderer.check(&path).unwrap_err();
        let exec = err.as_execution().expect("execution error");
        assert!(exec.message().contains("endforeach"), "{}", exec.message());
        assert_eq!(exec.location().map(|l| l.file.as_path()), Some(path.as_path()));
    }
}
