use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use cli::TractSet;
use color_eyre::eyre::Result;
use pipeline::plan::reference_stages;
use pipeline::tracts::default_tracts;
use pipeline::Pipeline;
use std::path::PathBuf;
use std::process::exit;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};
use tract_kit_common::{ArtifactStore, Subject, ToolConfig};

#[derive(Parser)]
#[command(name = "tract-kit", author, version, about = "Segment the dentato-rubro-thalamic tract and its neighbours from diffusion MRI", long_about = None)]
struct Cli {
    /// Subject identifier, the name of the per-subject working directory
    #[arg(short, long)]
    subject: Option<String>,

    /// Worker-count hint forwarded to the external tools
    #[arg(short = 'j', long)]
    nthreads: Option<usize>,

    /// Verbose output, including the external tools' own chatter
    #[arg(short, long)]
    verbose: bool,

    /// Base directory containing the per-subject working directories
    #[arg(short = 'd', long, default_value = ".")]
    base_dir: PathBuf,

    /// TOML or JSON tract-set file overriding the built-in definitions
    #[arg(short, long)]
    tracts: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.print()?;
            return Ok(());
        }
        // Unknown flag or a flag missing its value.
        Err(err) => {
            err.print()?;
            exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(if cli.verbose { "debug" } else { "info" })
            }),
        )
        .init();

    let Some(subject) = cli.subject else {
        eprintln!("{}", Cli::command().render_usage());
        eprintln!("error: a subject identifier is required (--subject)");
        exit(2);
    };
    let subject = Subject::new(subject)?;

    let definitions = match &cli.tracts {
        Some(path) => {
            let set = TractSet::from_file(path)?;
            info!(file = %path.display(), tracts = set.tracts.len(), "loaded tract set");
            set.definitions()?
        }
        None => default_tracts(),
    };
    let stages = reference_stages(&definitions)?;

    let store = ArtifactStore::new(&cli.base_dir, &subject);
    let config = ToolConfig {
        nthreads: cli.nthreads,
        quiet: !cli.verbose,
    };

    info!(%subject, stages = stages.len(), root = %store.root().display(), "starting pipeline");
    let pipeline = Pipeline::system(config, store);
    let summary = pipeline.run(&stages)?;
    info!(
        completed = summary.completed,
        skipped = summary.skipped,
        "pipeline finished"
    );

    Ok(())
}
