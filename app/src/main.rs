use agentcanvas::{load_cli_settings, Client, Scope};
use agentcanvas_core::config::ApiSettings;
use agentcanvas_core::{telemetry, ClientSettings, CredentialStore, Position, ReqwestTransport};
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "agentcanvas", version, about = "Agentcanvas command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Read settings from this YAML file instead of the default locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the backend base url.
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and log in.
    Signup {
        email: String,
        #[arg(long)]
        password: String,
    },
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Status,
    #[command(subcommand)]
    Projects(ProjectsCommand),
    #[command(subcommand)]
    Graph(GraphCommand),
}

#[derive(Subcommand, Debug)]
enum ProjectsCommand {
    List,
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Select the project that graph commands operate on.
    Use { id: String },
}

#[derive(Subcommand, Debug)]
enum GraphCommand {
    Show {
        #[arg(long)]
        json: bool,
    },
    AddNode {
        label: String,
        #[arg(long, requires = "y")]
        x: Option<f64>,
        #[arg(long, requires = "x")]
        y: Option<f64>,
    },
    Connect { source: String, target: String },
    #[command(allow_negative_numbers = true)]
    Move { id: String, x: f64, y: f64 },
    /// Remove a node (and its edges) or an edge.
    Remove { id: String },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::env_filter("warn"))?;
    let cli = Cli::parse();

    let runtime = Runtime::new()?;
    let output = runtime.block_on(run(cli))?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let mut settings = match &cli.config {
        Some(path) => ClientSettings::load_from(path),
        None => ClientSettings::load(),
    }
    .map_err(|err| anyhow!(err.user_message()))?;
    if let Some(url) = &cli.api_url {
        let overridden =
            ApiSettings::with_base_url(url).map_err(|err| anyhow!(err.user_message()))?;
        settings.api.base_url = overridden.base_url;
    }

    let transport = ReqwestTransport::new(settings.api.request_timeout)
        .map_err(|err| anyhow!("failed to build http client: {err}"))?;
    let credentials = CredentialStore::new(settings.credentials_dir.clone());
    let scope = Scope::User;
    let cli_settings = load_cli_settings(&scope).await?;
    let mut client = Client::new(&settings, Arc::new(transport), credentials, scope, cli_settings)?;

    match cli.command {
        Command::Signup { email, password } => client.signup(&email, &password).await,
        Command::Login { email, password } => client.login(&email, &password).await,
        Command::Logout => Ok(client.logout()),
        Command::Status => Ok(client.status()),
        Command::Projects(ProjectsCommand::List) => client.list_projects().await,
        Command::Projects(ProjectsCommand::Create { name, description }) => {
            client.create_project(&name, &description).await
        }
        Command::Projects(ProjectsCommand::Use { id }) => client.use_project(&id).await,
        Command::Graph(GraphCommand::Show { json }) => client.show_graph(json).await,
        Command::Graph(GraphCommand::AddNode { label, x, y }) => {
            let position = x.zip(y).map(|(x, y)| Position::new(x, y));
            client.add_node(&label, position).await
        }
        Command::Graph(GraphCommand::Connect { source, target }) => {
            client.connect(&source, &target).await
        }
        Command::Graph(GraphCommand::Move { id, x, y }) => {
            client.move_node(&id, Position::new(x, y)).await
        }
        Command::Graph(GraphCommand::Remove { id }) => client.remove(&id).await,
    }
}
