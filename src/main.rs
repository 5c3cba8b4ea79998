use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use hashbin::inventory::list_inventory;
use hashbin::{
    Config, ContentStore, Metadata, PeerServer, Router, Submission, SyncResult, SyncStatus, Syncer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hashbin",
    version,
    about = "Content-addressed file bin with peer-to-peer replication"
)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true, env = "HASHBIN_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root holding data/, owners/ and metadata/
    #[arg(long, global = true, env = "HASHBIN_ROOT")]
    root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the peer protocol
    Serve {
        /// Listen address
        #[arg(long, env = "HASHBIN_LISTEN")]
        listen: Option<String>,
    },
    /// Store a file
    Put {
        file: PathBuf,
        #[command(flatten)]
        opts: StoreOpts,
    },
    /// Store a text note
    Note {
        text: String,
        #[command(flatten)]
        opts: StoreOpts,
    },
    /// Synchronize with peers (defaults to the configured peer list)
    Sync {
        peers: Vec<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the local inventory
    List,
    /// Find the index page of a category or content hash
    Find {
        /// Category label or hash; with --title, a title search term
        query: String,
        /// Search metadata titles instead
        #[arg(long)]
        title: bool,
    },
}

#[derive(Args, Debug)]
struct StoreOpts {
    /// Category label or bucket hash
    #[arg(long)]
    category: String,
    /// Owner info (e.g. a payment address)
    #[arg(long)]
    owner: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    url: Option<String>,
}

impl StoreOpts {
    fn apply(self, mut submission: Submission) -> Submission {
        if let Some(owner) = self.owner {
            submission = submission.with_owner(owner);
        }
        let metadata = Metadata {
            user: self.user.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
        };
        submission.with_metadata(metadata)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "hashbin=debug" } else { "hashbin=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = hashbin::config::expand_tilde(&root);
    }

    let store = ContentStore::open(&config.root)
        .with_context(|| format!("Failed to open store at {}", config.root.display()))?;

    match cli.command {
        Command::Serve { listen } => {
            let addr = listen.unwrap_or_else(|| config.listen.clone());
            let router = Router::new(store).with_guard(config.put_guard());
            let server = PeerServer::bind(addr.as_str(), router)
                .await?
                .with_max_connections(config.max_connections);

            tokio::select! {
                res = server.run() => res?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
            }
        }
        Command::Put { file, opts } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("File has no name")?;
            let submission = Submission::from_file(&name, content, &opts.category)?;
            print_stored(&store, opts.apply(submission)).await?;
        }
        Command::Note { text, opts } => {
            let submission = Submission::from_text(&text, &opts.category)?;
            print_stored(&store, opts.apply(submission)).await?;
        }
        Command::Sync { peers, json } => {
            let peers = if peers.is_empty() { config.peers.clone() } else { peers };
            if peers.is_empty() {
                anyhow::bail!("No peers given and none configured");
            }

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
            spinner.set_message(format!("Synchronizing with {} peer(s)", peers.len()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let results = Syncer::new(store)
                .with_max_peer_tasks(config.max_peer_tasks)
                .sync_all(&peers)
                .await;
            spinner.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    print_result(result);
                }
            }
        }
        Command::List => {
            for path in list_inventory(store.layout())? {
                println!("{}", path);
            }
        }
        Command::Find { query, title: true } => {
            let found = store.search_titles(&query)?;
            if found.is_empty() {
                anyhow::bail!("No titles match {:?}", query);
            }
            for m in found {
                println!("{}  {}", m.hash, m.metadata.title);
            }
        }
        Command::Find { query, title: false } => match store.lookup(&query)? {
            Some(page) => println!("{}", page),
            None => anyhow::bail!("Nothing stored under {:?}", query),
        },
    }

    Ok(())
}

async fn print_stored(store: &ContentStore, submission: Submission) -> Result<()> {
    let store = store.clone();
    let stored = tokio::task::spawn_blocking(move || store.store(&submission)).await??;
    println!("{} {}", "Stored".green().bold(), stored.hash);
    println!("  {}", stored.category_index);
    Ok(())
}

fn print_result(result: &SyncResult) {
    let status = match result.status {
        SyncStatus::Success => result.status.as_str().green(),
        SyncStatus::Partial => result.status.as_str().yellow(),
        SyncStatus::Error => result.status.as_str().red(),
    };
    println!("{} [{}] {:?}", result.server.bold(), status, result.elapsed);

    print_list("Downloaded", &result.downloaded);
    print_list("Uploaded", &result.uploaded);
    if !result.errors.is_empty() {
        println!("  {}:", "Errors".red());
        for e in &result.errors {
            println!("    {}", e);
        }
    }
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        println!("  {}: none", title);
    } else {
        println!("  {} ({}):", title, items.len());
        for item in items {
            println!("    {}", item);
        }
    }
}
