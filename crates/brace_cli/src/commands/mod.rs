//! CLI command definitions.
//!
//! Each subcommand maps to one renderer operation.

use clap::{Parser, Subcommand};

pub mod check;
pub mod render;

/// brace - moustache template renderer
#[derive(Parser, Debug)]
#[command(name = "brace")]
#[command(version, about = "brace - moustache template renderer")]
#[command(long_about = r#"
brace renders text templates with embedded directives:

  {{ expr }}    output the value of an expression
  {{{ code }}}  run directive code (if, for, foreach, while, assignments)

COMMANDS:
  render  → Render a template with variables from JSON files and --set
  check   → Compile a template without rendering it

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  4 - Template error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a template to stdout or a file
    Render(render::RenderArgs),

    /// Check that a template compiles
    Check(check::CheckArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_render() {
        let cli = Cli::try_parse_from([
            "brace",
            "render",
            "page.tpl",
            "--vars",
            "a.json",
            "--vars",
            "b.json",
            "--set",
            "name=World",
            "--deploy",
            "-o",
            "out.html",
        ])
        .unwrap();

        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.template, PathBuf::from("page.tpl"));
        assert_eq!(args.vars, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
        assert_eq!(args.set, vec!["name=World".to_string()]);
        assert!(args.deploy);
        assert_eq!(args.output, Some(PathBuf::from("out.html")));
        assert!(args.scratch_dir.is_none());
    }

    #[test]
    fn test_parse_check_with_global_flag() {
        let cli = Cli::try_parse_from(["brace", "check", "page.tpl", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Check(_)));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["brace", "-v", "-q", "check", "page.tpl"]).is_err());
    }

    #[test]
    fn test_template_is_required() {
        assert!(Cli::try_parse_from(["brace", "render"]).is_err());
    }
}
