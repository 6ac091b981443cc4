//! # brace_template
//!
//! A small moustache-style template renderer.
//!
//! Templates are ordinary text with two kinds of embedded directives:
//!
//! - `{{ expr }}` outputs the value of an expression
//! - `{{{ code }}}` runs directive code (loops, conditionals, assignments)
//!   and outputs nothing by itself
//!
//! A template is transformed into a source unit of the directive language
//! and executed against the variables set on a [`TemplateRenderer`].
//! In development mode execution goes through a scratch file so faults name
//! a file and line; in deployment mode it stays in memory.
//!
//! ## Example
//!
//! ```rust
//! use brace_template::TemplateRenderer;
//! use serde_json::json;
//!
//! let mut renderer = TemplateRenderer::new(false);
//! renderer.set("title", "Products");
//! renderer.set("items", json!(["Apple", "Pear"]));
//!
//! let html = renderer
//!     .fetch_source(
//!         "products",
//!         "<h1>{{ $title }}</h1>{{{ foreach ($items as $item): }}}<p>{{ $item }}</p>{{{ endforeach; }}}",
//!     )
//!     .unwrap();
//! assert_eq!(html, "<h1>Products</h1><p>Apple</p><p>Pear</p>");
//! ```

pub mod error;
pub mod executor;
pub mod renderer;
pub mod script;
pub mod transform;

pub use error::{ExecutionError, SourceLocation, TemplateError, TemplateResult};
pub use executor::{Executor, InMemoryExecutor, ScratchFileExecutor, SourceUnit};
pub use renderer::{RenderMode, TemplateRenderer, VariableSet};
pub use serde_json::Value;
pub use transform::{Fragment, Transformer};
