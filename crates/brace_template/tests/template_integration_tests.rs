//! Integration tests for template rendering.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use brace_template::{RenderMode, TemplateError, TemplateRenderer};
use serde::Serialize;
use serde_json::json;
use tempfile::{tempdir, TempDir};

fn write_template(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// A development renderer whose scratch files land in their own directory.
fn dev_renderer() -> (TemplateRenderer, TempDir) {
    let scratch = tempdir().unwrap();
    let renderer = TemplateRenderer::new(true).scratch_dir(scratch.path());
    (renderer, scratch)
}

fn scratch_is_empty(scratch: &TempDir) -> bool {
    fs::read_dir(scratch.path()).unwrap().next().is_none()
}

const PRODUCTS: &str = r#"<h1>{{ $title }}</h1>
{{{ if (count($products) > 0): }}}
<ul>
{{{ foreach ($products as $product): }}}
  <li>{{ escape($product->name) }}: ${{ $product->price }}</li>
{{{ endforeach; }}}
</ul>
{{{ else: }}}
<p>No products.</p>
{{{ endif; }}}
"#;

const PRODUCTS_HTML: &str = "<h1>Catalog</h1>

<ul>

  <li>Tea &amp; Biscuits: $4.5</li>

  <li>Coffee: $3</li>

</ul>

";

fn set_products(renderer: &mut TemplateRenderer) {
    renderer.set("title", "Catalog");
    renderer.set(
        "products",
        json!([
            {"name": "Tea & Biscuits", "price": 4.5},
            {"name": "Coffee", "price": 3}
        ]),
    );
}

#[test]
fn test_hello_world() {
    let dir = tempdir().unwrap();
    let path = write_template(dir.path(), "hello.tpl", "Hello {{ $name }}!");

    let (mut renderer, scratch) = dev_renderer();
    renderer.set("name", "World");

    assert_eq!(renderer.fetch(&path).unwrap(), "Hello World!");
    assert!(scratch_is_empty(&scratch));
}

#[test]
fn test_code_block_loop() {
    let dir = tempdir().unwrap();
    let path = write_template(
        dir.path(),
        "loop.tpl",
        "{{{ for ($i = 0; $i < 3; $i++): }}}{{ $i }},{{{ endfor; }}}",
    );

    let renderer = TemplateRenderer::new(false);
    assert_eq!(renderer.fetch(&path).unwrap(), "0,1,2,");
}

#[test]
fn test_plain_text_passes_through() {
    let dir = tempdir().unwrap();
    let content = "No directives here.\n{ single braces } stay put.\n";
    let path = write_template(dir.path(), "plain.tpl", content);

    let renderer = TemplateRenderer::new(false);
    assert_eq!(renderer.fetch(&path).unwrap(), content);
}

#[test]
fn test_modes_render_identically() {
    let dir = tempdir().unwrap();
    let path = write_template(dir.path(), "products.tpl", PRODUCTS);

    let (mut dev, scratch) = dev_renderer();
    let mut deploy = TemplateRenderer::with_mode(RenderMode::Deployment);
    set_products(&mut dev);
    set_products(&mut deploy);

    let dev_html = dev.fetch(&path).unwrap();
    let deploy_html = deploy.fetch(&path).unwrap();

    assert_eq!(dev_html, PRODUCTS_HTML);
    assert_eq!(dev_html, deploy_html);
    assert!(scratch_is_empty(&scratch));
}

#[test]
fn test_fetch_is_repeatable() {
    let dir = tempdir().unwrap();
    let path = write_template(
        dir.path(),
        "counter.tpl",
        "{{{ $total = 0; foreach ($numbers as $n) { $total += $n; } }}}{{ $total }}",
    );

    let (mut renderer, _scratch) = dev_renderer();
    renderer.set("numbers", json!([1, 2, 3]));

    let first = renderer.fetch(&path).unwrap();
    let second = renderer.fetch(&path).unwrap();
    assert_eq!(first, "6");
    assert_eq!(first, second);
    // Assignments inside the template never leak into the renderer.
    assert!(renderer.get("total").is_none());
}

#[test]
fn test_empty_product_list() {
    let dir = tempdir().unwrap();
    let path = write_template(dir.path(), "products.tpl", PRODUCTS);

    let mut renderer = TemplateRenderer::new(false);
    renderer.set("title", "Catalog");
    renderer.set("products", json!([]));

    let html = renderer.fetch(&path).unwrap();
    assert!(html.contains("<p>No products.</p>"));
    assert!(!html.contains("<ul>"));
}

#[test]
fn test_user_form_from_struct() {
    #[derive(Serialize)]
    struct User {
        id: u32,
        name: String,
        roles: Vec<String>,
        admin: bool,
    }

    let dir = tempdir().unwrap();
    let path = write_template(
        dir.path(),
        "user.tpl",
        r#"<form action="/users/{{ $id }}">
<input name="name" value="{{ escape($name) }}">
{{{ foreach ($roles as $i => $role) { }}}<label>{{ $i }}:{{ $role }}</label>{{{ } }}}
{{ $admin ? 'admin' : 'member' }}
</form>"#,
    );

    let mut renderer = TemplateRenderer::new(false);
    renderer
        .set_many(&User {
            id: 42,
            name: "O'Neil".to_string(),
            roles: vec!["editor".to_string(), "viewer".to_string()],
            admin: false,
        })
        .unwrap();

    let html = renderer.fetch(&path).unwrap();
    assert_eq!(
        html,
        r#"<form action="/users/42">
<input name="name" value="O&#039;Neil">
<label>0:editor</label><label>1:viewer</label>
member
</form>"#
    );
}

#[test]
fn test_triple_braces_take_precedence() {
    let renderer = TemplateRenderer::new(false);
    // `{{{ $x = 5; }}}` is code, not an echo of `{ $x = 5; }`.
    let html = renderer
        .fetch_source("precedence", "[{{{ $x = 5; }}}]{{ $x }}")
        .unwrap();
    assert_eq!(html, "[]5");

    let html = renderer
        .fetch_source("nested", "{{{ if (true) { }}}X{{{ } }}}")
        .unwrap();
    assert_eq!(html, "X");
}

#[test]
fn test_brace_else_in_following_line() {
    let template = "{{{ if ($c) { }}}A{{{ } }}}\n{{{ else { }}}B{{{ } }}}";
    let mut renderer = TemplateRenderer::new(false);

    renderer.set("c", true);
    assert_eq!(renderer.fetch_source("branch", template).unwrap(), "A");
    renderer.set("c", false);
    assert_eq!(renderer.fetch_source("branch", template).unwrap(), "B");
}

#[test]
fn test_sigil_free_loop() {
    let (renderer, scratch) = dev_renderer();
    let html = renderer
        .fetch_source("bare", "{{{ for (i=0;i<3;i++): }}}{{ i }},{{{ end }}}")
        .unwrap();
    assert_eq!(html, "0,1,2,");
    assert!(scratch_is_empty(&scratch));
}

#[test]
fn test_missing_template() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.tpl");

    for renderer in [TemplateRenderer::new(true), TemplateRenderer::new(false)] {
        let err = renderer.fetch(&missing).unwrap_err();
        assert!(matches!(&err, TemplateError::NotFound(p) if p == &missing), "{err:?}");
        assert_eq!(
            err.to_string(),
            format!("Template file '{}' not found or not readable.", missing.display())
        );
    }
}

#[test]
fn test_set_many_invalid_argument_leaves_variables() {
    let mut renderer = TemplateRenderer::new(false);
    renderer.set("name", "World");

    let err = renderer.set_many(&json!(["not", "a", "mapping"])).unwrap_err();
    assert!(matches!(err, TemplateError::InvalidArgument(_)));
    assert_eq!(renderer.variables().len(), 1);

    let mut data = HashMap::new();
    data.insert("greeting", json!("Hi"));
    renderer.set_many(&data).unwrap();
    assert_eq!(
        renderer.fetch_source("greet", "{{ $greeting }} {{ $name }}").unwrap(),
        "Hi World"
    );
}

#[test]
fn test_development_error_names_scratch_line() {
    let dir = tempdir().unwrap();
    let path = write_template(
        dir.path(),
        "broken.tpl",
        "<p>first</p>\n<p>second</p>\n<p>{{ $undefined }}</p>\n",
    );

    let (renderer, scratch) = dev_renderer();
    let err = renderer.fetch(&path).unwrap_err();
    let exec = err.as_execution().expect("execution error");

    assert_eq!(exec.message(), "Undefined variable $undefined");
    let location = exec.location().expect("location");
    assert_eq!(location.line, 3);
    assert!(location.file.starts_with(scratch.path()));

    let message = err.to_string();
    assert!(message.starts_with(&format!("Error in template '{}': ", path.display())));
    assert!(message.ends_with(" on line 3"), "{message}");
    assert!(scratch_is_empty(&scratch));
}

#[test]
fn test_development_error_inside_multiline_expression() {
    let (renderer, scratch) = dev_renderer();
    let err = renderer
        .fetch_source("joined", "{{ 'a' .\n'b' .\n$missing }}")
        .unwrap_err();

    let exec = err.as_execution().expect("execution error");
    assert_eq!(exec.message(), "Undefined variable $missing");
    assert_eq!(exec.location().map(|l| l.line), Some(3));
    assert!(err.to_string().ends_with(" on line 3"), "{err}");
    assert!(scratch_is_empty(&scratch));
}

#[cfg(unix)]
#[test]
fn test_unreadable_template_is_not_found() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = write_template(dir.path(), "secret.tpl", "Hello {{ $name }}!");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

    // Root reads through file permissions; nothing to check there.
    if fs::read(&path).is_ok() {
        return;
    }

    for renderer in [TemplateRenderer::new(true), TemplateRenderer::new(false)] {
        let err = renderer.fetch(&path).unwrap_err();
        assert!(matches!(&err, TemplateError::NotFound(p) if p == &path), "{err:?}");
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
}

#[test]
fn test_deployment_error_is_terse() {
    let mut renderer = TemplateRenderer::new(false);
    renderer.set("n", 0);

    let err = renderer
        .fetch_source("division", "{{ 10 / $n }}")
        .unwrap_err();
    assert_eq!(err.to_string(), "Error in template: Division by zero");
}

#[test]
fn test_syntax_error_renders_nothing() {
    let (renderer, scratch) = dev_renderer();
    let err = renderer
        .fetch_source("unclosed", "before\n{{{ if ($x): }}}\ninside\n")
        .unwrap_err();

    assert!(err.as_execution().is_some());
    assert!(scratch_is_empty(&scratch));
}

#[test]
fn test_check_accepts_valid_template() {
    let dir = tempdir().unwrap();
    let path = write_template(dir.path(), "products.tpl", PRODUCTS);

    // Compiling does not need any variables.
    TemplateRenderer::new(true).check(&path).unwrap();
}
