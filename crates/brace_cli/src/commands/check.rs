//! Check command - Compile a template without rendering it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use brace_template::TemplateRenderer;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Template file to check
    pub template: PathBuf,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    info!("Checking template: {}", args.template.display());

    TemplateRenderer::default().check(&args.template)?;

    println!("✅ {} compiles", args.template.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brace_template::TemplateError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_check_valid_and_broken() {
        let temp = tempdir().unwrap();
        let good = temp.path().join("good.tpl");
        let bad = temp.path().join("bad.tpl");
        fs::write(&good, "{{{ if ($x): }}}yes{{{ endif; }}}").unwrap();
        fs::write(&bad, "{{{ if ($x): }}}yes").unwrap();

        execute(CheckArgs { template: good }).unwrap();

        let err = execute(CheckArgs { template: bad }).unwrap_err();
        let template_err = err.downcast_ref::<TemplateError>().expect("template error");
        assert!(template_err.as_execution().is_some());
    }
}
