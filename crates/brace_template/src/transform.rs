//! Moustache directive recognition and lowering.
//!
//! Raw content is split in two passes. Triple-brace spans (`{{{ code }}}`)
//! are matched first; only the literal text left between them is scanned
//! for double-brace spans (`{{ expr }}`). The fragments are then lowered into
//! a single source unit for the directive compiler:
//!
//! - literal text is copied verbatim
//! - `{{{ code }}}` becomes `<?tpl code ?>`
//! - `{{ expr }}` becomes `<?tpl= expr ?>`
//!
//! Directive bodies are copied verbatim, so line numbers in the lowered unit
//! are line numbers in the template.
//!
//! Both patterns are non-greedy: a `}}}` inside a code string literal ends the
//! span early.

use regex::Regex;

/// Opens a directive in a lowered source unit.
pub(crate) const OPEN_TAG: &str = "<?tpl";
/// Marks an output directive when it directly follows [`OPEN_TAG`].
pub(crate) const ECHO_MARK: char = '=';
/// Closes a directive in a lowered source unit.
pub(crate) const CLOSE_TAG: &str = "?>";

/// A piece of template content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    /// Literal markup, emitted as-is
    Text(&'a str),
    /// Body of a `{{{ ... }}}` span
    Code(&'a str),
    /// Body of a `{{ ... }}` span
    Echo(&'a str),
}

/// Splits template content into fragments and lowers them.
#[derive(Debug, Clone)]
pub struct Transformer {
    code_pattern: Regex,
    echo_pattern: Regex,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    /// Create a new transformer.
    pub fn new() -> Self {
        Self {
            code_pattern: Regex::new(r"(?s)\{\{\{(.*?)\}\}\}").unwrap(),
            echo_pattern: Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap(),
        }
    }

    /// Split content into text, code and echo fragments, in source order.
    pub fn fragments<'a>(&self, content: &'a str) -> Vec<Fragment<'a>> {
        let mut fragments = Vec::new();
        let mut last = 0;

        for caps in self.code_pattern.captures_iter(content) {
            let span = caps.get(0).unwrap();
            self.split_echoes(&content[last..span.start()], &mut fragments);
            fragments.push(Fragment::Code(caps.get(1).map_or("", |m| m.as_str())));
            last = span.end();
        }
        self.split_echoes(&content[last..], &mut fragments);

        fragments
    }

    fn split_echoes<'a>(&self, text: &'a str, fragments: &mut Vec<Fragment<'a>>) {
        let mut last = 0;
        for caps in self.echo_pattern.captures_iter(text) {
            let span = caps.get(0).unwrap();
            if span.start() > last {
                fragments.push(Fragment::Text(&text[last..span.start()]));
            }
            fragments.push(Fragment::Echo(caps.get(1).map_or("", |m| m.as_str())));
            last = span.end();
        }
        if last < text.len() {
            fragments.push(Fragment::Text(&text[last..]));
        }
    }

    /// Lower template content into a directive source unit.
    pub fn transform(&self, content: &str) -> String {
        lower(&self.fragments(content))
    }
}

/// Lower fragments into a directive source unit.
pub fn lower(fragments: &[Fragment<'_>]) -> String {
    let mut unit = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Text(text) => unit.push_str(text),
            Fragment::Code(code) => {
                unit.push_str(OPEN_TAG);
                unit.push(' ');
                unit.push_str(code);
                unit.push(' ');
                unit.push_str(CLOSE_TAG);
            }
            Fragment::Echo(expr) => {
                unit.push_str(OPEN_TAG);
                unit.push(ECHO_MARK);
                unit.push(' ');
                unit.push_str(expr);
                unit.push(' ');
                unit.push_str(CLOSE_TAG);
            }
        }
    }
    unit
}
