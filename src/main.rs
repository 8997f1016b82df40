//! gitsync CLI - job workspace synchronization

use clap::{Args, Parser, Subcommand};
use gitsync::{CommitRequest, Engine, EngineConfig, Identity, JobId, JobSpec};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gitsync")]
#[command(about = "Keep per-job git workspaces in sync and detect branch changes", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace root (overrides the configuration file)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Clone/fetch depth, 0 for full history (overrides the configuration file)
    #[arg(long)]
    depth: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one job and report whether its branch moved
    Sync {
        job: JobId,
        url: String,
        branch: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sync every job listed in a YAML manifest
    SyncAll {
        manifest: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Commit and push one file to a job's tracked branch
    Update(UpdateArgs),

    /// Print a file as committed on a job's branch
    Show {
        job: JobId,
        branch: String,
        path: String,
    },

    /// List jobs that have a workspace
    List,

    /// Print the workspace directory of a job
    Path { job: JobId },
}

#[derive(Args)]
struct UpdateArgs {
    job: JobId,
    branch: String,
    path: String,

    /// New file content
    #[arg(long, conflicts_with = "from_file", required_unless_present = "from_file")]
    content: Option<String>,

    /// Read the new file content from this file
    #[arg(long)]
    from_file: Option<PathBuf>,

    #[arg(short, long)]
    message: Option<String>,

    #[arg(long, requires = "author_email")]
    author_name: Option<String>,
    #[arg(long, requires = "author_name")]
    author_email: Option<String>,

    #[arg(long, requires = "committer_email")]
    committer_name: Option<String>,
    #[arg(long, requires = "committer_name")]
    committer_email: Option<String>,

    /// Blob id the file must currently have on the branch
    #[arg(long)]
    expected_sha: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = Engine::new(load_config(&cli)?)?;

    match cli.command {
        Commands::Sync { job, url, branch, json } => sync_job(&engine, job, &url, &branch, json).await,
        Commands::SyncAll { manifest, json } => sync_all(&engine, &manifest, json).await,
        Commands::Update(args) => update_content(&engine, args).await,
        Commands::Show { job, branch, path } => show_content(&engine, &job, &branch, &path).await,
        Commands::List => list_workspaces(&engine),
        Commands::Path { job } => {
            println!("{}", engine.location_for(&job).display());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.workspace_root = root.clone();
    }
    if let Some(depth) = cli.depth {
        config.clone_depth = depth;
    }
    Ok(config)
}

async fn sync_job(engine: &Engine, job: JobId, url: &str, branch: &str, json: bool) -> anyhow::Result<()> {
    let result = engine.sync(&job, url, branch).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.changed {
        println!("Refs changed for job {}: now at {}.", job, result.after);
    } else {
        println!("No refs changed for job {}, nothing to build.", job);
    }
    Ok(())
}

async fn sync_all(engine: &Engine, manifest: &PathBuf, json: bool) -> anyhow::Result<()> {
    let jobs = JobSpec::load_manifest(manifest)?;
    let summary = engine.sync_all(&jobs).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", summary.message());
    for job in summary.changed() {
        println!("  changed: {}", job);
    }
    for failure in &summary.failures {
        println!("  failed:  {} ({})", failure.job_id, failure.error);
    }
    Ok(())
}

async fn update_content(engine: &Engine, args: UpdateArgs) -> anyhow::Result<()> {
    let content = match (&args.content, &args.from_file) {
        (Some(content), _) => content.clone().into_bytes(),
        (None, Some(path)) => tokio::fs::read(path).await?,
        (None, None) => anyhow::bail!("either --content or --from-file is required"),
    };

    let mut request = CommitRequest::new(args.branch, args.path, content);
    request.message = args.message;
    request.expected_sha = args.expected_sha;
    if let (Some(name), Some(email)) = (args.author_name, args.author_email) {
        request = request.author(Identity::new(name, email));
    }
    if let (Some(name), Some(email)) = (args.committer_name, args.committer_email) {
        request = request.committer(Identity::new(name, email));
    }

    match engine.update(&args.job, request).await {
        Ok(url) => {
            println!("Pushed to {}", url);
            Ok(())
        }
        Err(e) => {
            if let Some(hint) = e.suggestion() {
                eprintln!("hint: {}", hint);
            }
            Err(e.into())
        }
    }
}

async fn show_content(engine: &Engine, job: &JobId, branch: &str, path: &str) -> anyhow::Result<()> {
    let content = engine.read_content(job, branch, path).await?;
    std::io::stdout().write_all(&content)?;
    Ok(())
}

fn list_workspaces(engine: &Engine) -> anyhow::Result<()> {
    let jobs = engine.workspaces().list();
    if jobs.is_empty() {
        println!("No workspaces found in {}.", engine.workspaces().root().display());
        return Ok(());
    }

    println!("Workspaces:");
    for job in jobs {
        println!("  {}", job);
    }
    Ok(())
}
