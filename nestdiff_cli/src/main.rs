use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use nestdiff_common::{default_work_dir, load_config, AppConfig};
use nestdiff_core::{render_text, ChangeSummary, ComparisonReport, RecursionDriver};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nestdiff")]
#[command(author = "nestdiff Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Recursive diff of APKs, archives and the filesystem images nested inside them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two artifacts (files or directories) recursively
    Compare {
        /// Old artifact; may be missing, in which case everything is reported as added
        old: PathBuf,

        /// New artifact
        new: PathBuf,

        #[command(flatten)]
        options: CommonArgs,
    },

    /// List the contents of a single artifact recursively
    Analyze {
        /// Artifact to inspect
        artifact: PathBuf,

        #[command(flatten)]
        options: CommonArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct CommonArgs {
    /// Staging directory holding extracted artifacts
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Preview line limit for added text files
    #[arg(short, long)]
    limit: Option<usize>,

    /// Maximum nesting depth of recursive comparisons
    #[arg(long)]
    max_depth: Option<usize>,

    /// Dump symbol tables of native objects (nm)
    #[arg(long)]
    nm: bool,

    /// Dump headers of native objects (objdump -x)
    #[arg(long)]
    objdump: bool,

    /// Disassemble the .text section of native objects
    #[arg(long)]
    disassemble: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    summary: ChangeSummary,
    report: &'a ComparisonReport,
}

fn main() {
    // Initialize tracing to stderr (so the report can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compare { old, new, options } => run(Some(old), new, &options),
        Commands::Analyze { artifact, options } => run(None, artifact, &options),
    };

    if let Err(e) = result {
        error!("nestdiff failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(old: Option<PathBuf>, new: PathBuf, options: &CommonArgs) -> anyhow::Result<()> {
    let new = absolutize(&new)?;
    if !new.exists() {
        bail!("New artifact does not exist: {}", new.display());
    }
    let old = old.map(|path| absolutize(&path)).transpose()?;

    let loaded = load_config(false)?;
    let mut config = loaded.config;
    apply_overrides(&mut config, options);

    let work_dir = match config.working_dir.clone() {
        Some(path) => absolutize(&path)?,
        None => default_work_dir(loaded.portable, &loaded.path)?,
    };
    info!("Using working directory: {}", work_dir.display());

    let driver = RecursionDriver::new(&config, work_dir)?;
    let report = driver
        .compare(old.as_deref(), &new)
        .with_context(|| format!("Could not stage {}", new.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if options.json {
        let output = JsonOutput {
            summary: report.summary(),
            report: &report,
        };
        serde_json::to_writer_pretty(&mut out, &output)?;
        writeln!(out)?;
    } else {
        render_text(&report, &mut out)?;
        print_summary(&report.summary(), &mut out)?;
    }
    out.flush()?;

    Ok(())
}

/// Command-line flags win over values from the config file
fn apply_overrides(config: &mut AppConfig, options: &CommonArgs) {
    if let Some(dir) = &options.working_dir {
        config.working_dir = Some(dir.clone());
    }
    if let Some(limit) = options.limit {
        config.preview_lines = limit;
    }
    if let Some(depth) = options.max_depth {
        config.max_depth = depth;
    }
    config.inspect.nm |= options.nm;
    config.inspect.objdump |= options.objdump;
    config.inspect.disassemble |= options.disassemble;
}

fn print_summary<W: Write>(summary: &ChangeSummary, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Summary:")?;
    writeln!(out, "  Added:   {}", summary.added)?;
    writeln!(out, "  Changed: {}", summary.changed)?;
    writeln!(out, "  Deleted: {}", summary.deleted)?;
    Ok(())
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_compare() {
        let cli = Cli::try_parse_from([
            "nestdiff",
            "compare",
            "old.apk",
            "new.apk",
            "--nm",
            "-l",
            "7",
            "--max-depth",
            "2",
        ])
        .unwrap();

        let Commands::Compare { old, new, options } = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(old, PathBuf::from("old.apk"));
        assert_eq!(new, PathBuf::from("new.apk"));
        assert!(options.nm);
        assert!(!options.objdump);
        assert_eq!(options.limit, Some(7));
        assert_eq!(options.max_depth, Some(2));
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from(["nestdiff", "analyze", "app.apk", "--json", "-w", "/tmp/w"]).unwrap();
        let Commands::Analyze { artifact, options } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(artifact, PathBuf::from("app.apk"));
        assert!(options.json);
        assert_eq!(options.working_dir, Some(PathBuf::from("/tmp/w")));
    }

    #[test]
    fn test_cli_requires_new_artifact() {
        assert!(Cli::try_parse_from(["nestdiff", "compare", "old.apk"]).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::default();
        config.inspect.objdump = true;

        let options = CommonArgs {
            working_dir: Some(PathBuf::from("/work")),
            limit: Some(3),
            disassemble: true,
            ..CommonArgs::default()
        };
        apply_overrides(&mut config, &options);

        assert_eq!(config.working_dir, Some(PathBuf::from("/work")));
        assert_eq!(config.preview_lines, 3);
        assert_eq!(config.source_preview_lines, 5000);
        assert_eq!(config.max_depth, 8);
        assert!(config.inspect.objdump);
        assert!(config.inspect.disassemble);
        assert!(!config.inspect.nm);
    }

    #[test]
    fn test_print_summary() {
        let mut out = Vec::new();
        let summary = ChangeSummary {
            added: 2,
            changed: 1,
            deleted: 0,
        };
        print_summary(&summary, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Summary:\n  Added:   2\n  Changed: 1\n  Deleted: 0\n"));
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize(Path::new("/a/b")).unwrap(), PathBuf::from("/a/b"));
        assert!(absolutize(Path::new("rel")).unwrap().is_absolute());
    }
}
