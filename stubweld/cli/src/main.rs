use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stubweld_lib::{ManagerRegistry, Pipeline, PipelineConfig, Profile};

#[derive(Parser, Debug)]
#[command(
    name = "stubweld",
    version,
    about = "Rewrites generated Python type stubs into the SDK's runtime interface"
)]
struct Cli {
    /// Source tree that receives the finished stubs
    #[arg(long, value_name = "DIR", default_value = "src")]
    source_dir: PathBuf,

    /// Test tree that receives stubs generated for tests/ paths
    #[arg(long, value_name = "DIR", default_value = "tests")]
    test_dir: PathBuf,

    /// Scratch directory the stub generator populates
    #[arg(long, value_name = "DIR", default_value = "stubs")]
    scratch_dir: PathBuf,

    /// Scratch-relative file to rewrite even when pruning would drop it
    #[arg(long = "process-file", value_name = "PATH")]
    process_files: Vec<String>,

    /// Class name the controller rewriter leaves untouched
    #[arg(long = "exclude-class", value_name = "NAME")]
    exclude_classes: Vec<String>,

    /// Stub generator command to run before rewriting (program plus arguments)
    #[arg(long, value_name = "CMD", num_args = 1.., allow_hyphen_values = true)]
    stubgen: Option<Vec<String>>,

    /// JSON file overriding the built-in domain-name profile
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Stub file describing the request-manager class, replacing the
    /// built-in registry
    #[arg(long, value_name = "FILE")]
    registry: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run(Cli::parse()) {
        tracing::error!("{error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let profile: Profile = match &cli.profile {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Profile::default(),
    };

    let registry = match &cli.registry {
        Some(path) => ManagerRegistry::from_stub_file(
            path,
            profile.controller_class.clone(),
            profile.manager_class.clone(),
        )?,
        None => ManagerRegistry::default(),
    };

    let defaults = PipelineConfig::default();
    let config = PipelineConfig {
        source_dir: cli.source_dir,
        test_dir: cli.test_dir,
        scratch_dir: cli.scratch_dir,
        process_files: if cli.process_files.is_empty() {
            defaults.process_files
        } else {
            cli.process_files
        },
        exclude_classes: if cli.exclude_classes.is_empty() {
            vec![profile.controller_class.clone()]
        } else {
            cli.exclude_classes
        },
        stubgen_command: cli.stubgen,
        profile,
    };

    Pipeline::new(config, registry).run()?;
    Ok(())
}
