use agentcanvas_core::{
    telemetry, ApiSettings, AuthenticatedFetcher, Connection, CredentialStore, MockBackend,
    MockRoute, Position, ProjectSync, RefreshPolicy, SessionController,
};
use anyhow::{bail, ensure, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Agentcanvas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the login, edit, save and reload flow against the in-memory backend.
    Smoke {
        #[arg(long, value_enum, default_value = "independent")]
        policy: PolicyArg,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Independent,
    SingleFlight,
}

impl From<PolicyArg> for RefreshPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Independent => RefreshPolicy::Independent,
            PolicyArg::SingleFlight => RefreshPolicy::SingleFlight,
        }
    }
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke { policy } => smoke_test(policy.into()),
    }
}

fn smoke_test(policy: RefreshPolicy) -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let api = ApiSettings::default();
    let backend = MockBackend::new(&api);

    let session = SessionController::new(CredentialStore::new(temp_dir.path().to_path_buf()));
    session.init();
    let pair = backend.register_user("smoke@example.com", "smoke");
    let Some((access, refresh)) = pair.tokens() else {
        bail!("mock backend returned an incomplete credential pair");
    };
    session.login(access, refresh);

    let fetcher =
        AuthenticatedFetcher::new(Arc::new(backend.clone()), session.clone(), api.refresh_url()?)
            .with_policy(policy);
    let mut sync = ProjectSync::new(fetcher, api.projects_url()?);

    runtime.block_on(async {
        let project = sync.create_project("SmokeProject", "xtask smoke run").await?;
        sync.open(&project.id).await?;
        let model = sync.model_mut();
        model.add_node("source");
        model.add_node_at("sink", Position::new(200.0, 0.0));
        model.connect(Connection::new("node-1", "node-2"))?;
        sync.save_active().await?;

        backend.expire_access_tokens();
        let reloaded = sync.load(&project.id).await?;
        ensure!(
            reloaded.nodes.len() == 2 && reloaded.edges.len() == 1,
            "reloaded graph does not match what was saved"
        );
        ensure!(session.is_logged_in(), "session dropped during refresh");
        info!(
            project = %project.id,
            nodes = reloaded.nodes.len(),
            edges = reloaded.edges.len(),
            refreshes = backend.hits(MockRoute::Refresh),
            "smoke test graph saved and reloaded"
        );
        Ok::<(), anyhow::Error>(())
    })
}
