use anyhow::{Context, Error, Result};
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub stderr_is_tty: bool,
    pub quiet: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "Error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "Caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "Next:");
    let _ = writeln!(
        stderr,
        "  - re-run with `-v` or `-vv` to see what the analyzers logged"
    );
    let _ = writeln!(
        stderr,
        "  - see `vzanalyze --help` for the available commands and options"
    );
}

/// Writes a rendered report to `report_file`, or to stdout when none is given.
///
/// A closed stdout pipe is not an error.
pub fn write_report(report: &str, report_file: Option<&Path>, cfg: &UiConfig) -> Result<()> {
    if let Some(path) = report_file {
        std::fs::write(path, report)
            .with_context(|| format!("failed to write report file {}", path.display()))?;
        if !cfg.quiet {
            let _ = writeln!(io::stderr().lock(), "Report written to {}", path.display());
        }
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    match stdout.write_all(report.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}
