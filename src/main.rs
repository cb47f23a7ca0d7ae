use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fleet_orchestrator::cluster::AggregateResult;
use fleet_orchestrator::db::{self, AuditRepo, NodeRepo};
use fleet_orchestrator::device::Attributes;
use fleet_orchestrator::{
    AuditRetention, ClusterEngine, Config, HealthMonitor, HttpDeviceClient, NewNode,
    NodeDirectory, ResourceKind, TargetRequest,
};

/// Fleet - cluster-wide configuration for independently managed devices
#[derive(Parser)]
#[command(name = "fleet", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Name recorded as the actor in the audit log
    #[arg(long, env = "FLEET_ACTOR", global = true)]
    actor: Option<String>,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct TargetArgs {
    /// Target every active node
    #[arg(long, global = true, conflicts_with = "node")]
    all: bool,

    /// Target a node by id or name (repeatable)
    #[arg(long, global = true)]
    node: Vec<String>,
}

impl TargetArgs {
    fn request(&self) -> TargetRequest {
        if self.all {
            TargetRequest::cluster_wide()
        } else {
            TargetRequest::nodes(self.node.iter().cloned())
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Manage the node directory
    #[command(subcommand)]
    Node(NodeCommand),
    /// Static DNS records
    #[command(subcommand)]
    Dns(DnsCommand),
    /// Local device users
    #[command(subcommand)]
    User(UserCommand),
    /// WireGuard peers
    #[command(subcommand)]
    Peer(PeerCommand),
    /// WireGuard interfaces with a shared private key
    #[command(subcommand)]
    Tunnel(TunnelCommand),
    /// Inspect the audit log
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Run the health monitor and audit retention until interrupted
    Serve,
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Register a node
    Add {
        /// Unique node name
        #[arg(long)]
        name: String,
        /// Hostname or IP address
        #[arg(long)]
        host: String,
        /// API port
        #[arg(long, default_value = "443")]
        port: u16,
        /// API username
        #[arg(long, default_value = "admin")]
        username: String,
        /// API password
        #[arg(long, env = "FLEET_NODE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List registered nodes
    List,
    /// Remove a node by id or name
    Remove {
        node: String,
    },
    /// Probe every node once and record its status
    Check,
}

#[derive(Subcommand)]
enum DnsCommand {
    /// Show static records on each node
    List,
    /// Create a static record
    Add {
        name: String,
        /// IPv4 address the name resolves to
        #[arg(long)]
        address: String,
        /// Record TTL, e.g. "1d"
        #[arg(long)]
        ttl: Option<String>,
    },
    /// Delete a static record by name
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a device user
    Add {
        name: String,
        /// Permission group
        #[arg(long, default_value = "read")]
        group: String,
        #[arg(long, env = "FLEET_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Change a device user's password
    Passwd {
        name: String,
        #[arg(long, env = "FLEET_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete a device user by name
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum PeerCommand {
    /// Delete a peer by public key
    Delete {
        public_key: String,
    },
}

#[derive(Subcommand)]
enum TunnelCommand {
    /// Create an interface with one private key shared by every target
    Create {
        name: String,
        #[arg(long, default_value = "13231")]
        listen_port: u16,
    },
    /// Delete an interface by name
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Show the most recent entries
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,fleet_orchestrator=info",
        1 => "info,fleet_orchestrator=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Collaborators shared by every subcommand
struct App {
    config: Config,
    nodes: Arc<NodeRepo>,
    audit: AuditRepo,
    client: Arc<HttpDeviceClient>,
}

impl App {
    fn open() -> anyhow::Result<Self> {
        let config = Config::load()?;
        let pool = db::init(&config.database_path)?;
        let client = HttpDeviceClient::new(&config.device)?;

        Ok(Self {
            nodes: Arc::new(NodeRepo::new(pool.clone())),
            audit: AuditRepo::new(pool),
            client: Arc::new(client),
            config,
        })
    }

    fn engine(&self) -> ClusterEngine {
        ClusterEngine::new(
            self.nodes.clone(),
            self.client.clone(),
            Arc::new(self.audit.clone()),
            self.config.dispatch,
        )
    }

    fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.nodes.clone(), self.client.clone(), self.config.health)
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::open()?;
    let target = cli.target.request();
    let actor = cli.actor.as_deref();

    match cli.command {
        Command::Node(cmd) => node_command(&app, cmd).await,
        Command::Dns(cmd) => dns_command(&app, cmd, &target, actor).await,
        Command::User(cmd) => user_command(&app, cmd, &target, actor).await,
        Command::Peer(PeerCommand::Delete { public_key }) => {
            let result = app
                .engine()
                .delete_by_name(ResourceKind::WireguardPeer, &public_key, &target, actor)
                .await?;
            report(&result, "deleted")
        }
        Command::Tunnel(cmd) => tunnel_command(&app, cmd, &target, actor).await,
        Command::Audit(AuditCommand::List { limit }) => audit_list(&app, limit),
        Command::Serve => serve(&app).await,
    }
}

async fn node_command(app: &App, cmd: NodeCommand) -> anyhow::Result<()> {
    match cmd {
        NodeCommand::Add {
            name,
            host,
            port,
            username,
            password,
        } => {
            let node = app.nodes.create(&NewNode {
                name,
                host,
                port,
                username,
                password: SecretString::from(password),
            })?;
            println!("Registered {} ({}) as {}", node.name, node.address(), node.id);
        }
        NodeCommand::List => {
            let nodes = app.nodes.list_all()?;
            if nodes.is_empty() {
                println!("No nodes registered.");
            }
            for node in nodes {
                let seen = node
                    .last_seen
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                println!(
                    "{:<20} {:<24} {:<8} last seen {seen}  [{}]",
                    node.name,
                    node.address(),
                    node.status,
                    node.id
                );
            }
        }
        NodeCommand::Remove { node } => {
            let found = match app.nodes.get_by_id(&node)? {
                Some(found) => Some(found),
                None => app.nodes.get_by_name(&node)?,
            };
            let Some(found) = found else {
                anyhow::bail!("unknown node: {node}");
            };
            app.nodes.delete(&found.id)?;
            println!("Removed {}", found.name);
        }
        NodeCommand::Check => {
            let report = app.health_monitor().check_once().await?;
            for name in &report.online {
                println!("  ✓ {name}");
            }
            for name in &report.offline {
                println!("  ✗ {name}");
            }
            println!(
                "{} online, {} offline",
                report.online.len(),
                report.offline.len()
            );
        }
    }
    Ok(())
}

async fn dns_command(
    app: &App,
    cmd: DnsCommand,
    target: &TargetRequest,
    actor: Option<&str>,
) -> anyhow::Result<()> {
    let kind = ResourceKind::DnsRecord;
    let engine = app.engine();

    match cmd {
        DnsCommand::List => {
            let result = engine.list(kind, target).await?;
            for (node, entries) in &result.successes {
                println!("{} ({} records)", node.name, entries.len());
                for entry in entries {
                    println!(
                        "  {:<40} {}",
                        field(entry, "name"),
                        field(entry, "address")
                    );
                }
            }
            report(&result, "listed")
        }
        DnsCommand::Add { name, address, ttl } => {
            let mut attributes = Attributes::new();
            attributes.insert("name".to_string(), json!(name));
            attributes.insert("address".to_string(), json!(address));
            if let Some(ttl) = ttl {
                attributes.insert("ttl".to_string(), json!(ttl));
            }
            let result = engine.create(kind, attributes, target, actor).await?;
            report(&result, "created")
        }
        DnsCommand::Delete { name } => {
            let result = engine.delete_by_name(kind, &name, target, actor).await?;
            report(&result, "deleted")
        }
    }
}

async fn user_command(
    app: &App,
    cmd: UserCommand,
    target: &TargetRequest,
    actor: Option<&str>,
) -> anyhow::Result<()> {
    let kind = ResourceKind::User;
    let engine = app.engine();

    match cmd {
        UserCommand::Add {
            name,
            group,
            password,
        } => {
            let password = SecretString::from(password);
            let mut attributes = Attributes::new();
            attributes.insert("name".to_string(), json!(name));
            attributes.insert("group".to_string(), json!(group));
            attributes.insert("password".to_string(), json!(password.expose_secret()));
            let result = engine.create(kind, attributes, target, actor).await?;
            report(&result, "created")
        }
        UserCommand::Passwd { name, password } => {
            let password = SecretString::from(password);
            let mut attributes = Attributes::new();
            attributes.insert("password".to_string(), json!(password.expose_secret()));
            let result = engine
                .update_by_name(kind, &name, attributes, target, actor)
                .await?;
            report(&result, "updated")
        }
        UserCommand::Delete { name } => {
            let result = engine.delete_by_name(kind, &name, target, actor).await?;
            report(&result, "deleted")
        }
    }
}

async fn tunnel_command(
    app: &App,
    cmd: TunnelCommand,
    target: &TargetRequest,
    actor: Option<&str>,
) -> anyhow::Result<()> {
    let engine = app.engine();

    match cmd {
        TunnelCommand::Create { name, listen_port } => {
            let result = engine
                .create_synchronized_tunnel(&name, listen_port, target, actor)
                .await?;
            report(&result, "created")
        }
        TunnelCommand::Delete { name } => {
            let result = engine
                .delete_by_name(ResourceKind::WireguardInterface, &name, target, actor)
                .await?;
            report(&result, "deleted")
        }
    }
}

fn audit_list(app: &App, limit: usize) -> anyhow::Result<()> {
    for entry in app.audit.recent(limit)? {
        let status = entry
            .details
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("-");
        println!(
            "{}  {:<36} {:<30} {:<16} by {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            entry.resource_id,
            status,
            entry.actor_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn serve(app: &App) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let mut workers = Vec::new();

    if app.config.health.enabled {
        workers.push(app.health_monitor().spawn(shutdown.clone()));
    }
    workers.push(AuditRetention::new(app.audit.clone(), app.config.audit).spawn(shutdown.clone()));

    tracing::info!(
        database = %app.config.database_path.display(),
        health = app.config.health.enabled,
        "background workers running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown.cancel();

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "worker ended abnormally");
        }
    }
    Ok(())
}

/// Print the summary line and one line per failed node
///
/// Fails the process when any node failed so scripts can react.
fn report<T>(result: &AggregateResult<T>, verb: &str) -> anyhow::Result<()> {
    println!("{}", result.headline(verb));
    for (node, reason) in &result.failures {
        println!("  ✗ {} ({}): {reason}", node.name, node.address());
    }

    if result.all_succeeded() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} nodes failed", result.failures.len(), result.total())
    }
}

fn field<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("-")
}
