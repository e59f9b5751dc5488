use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chat_tree_engine::{
    config::Config,
    engine::ChatEngine,
    provider::GeminiClient,
    storage::SqliteStorage,
    tree::ActiveVersions,
};

#[derive(Parser)]
#[command(name = "chat-tree-engine", version, about = "Branching conversation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new conversation
    New {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
    },
    /// Send a message at the active-path leaf and print the exchange
    Send {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        user: String,
        content: String,
    },
    /// Edit a message into a new version (fork)
    Edit {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        message: String,
        content: String,
    },
    /// Regenerate an assistant reply as a new version
    Regenerate {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        message: String,
    },
    /// Show the conversation view (active path, fork points, tree)
    Show {
        #[arg(long)]
        conversation: String,
    },
    /// Print the active-path transcript
    Transcript {
        #[arg(long)]
        conversation: String,
    },
    /// Show a message's position among its siblings
    Siblings {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        message: String,
    },
    /// Resolve the path through the nth branch under a parent message
    Switch {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        parent: String,
        #[arg(long)]
        index: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize the provider client
    let provider = match GeminiClient::new(&config.provider, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.provider.base_url, model = %config.provider.model, "Provider client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize provider client");
            return Err(e.into());
        }
    };

    let engine = ChatEngine::new(storage, provider, config.engine.clone());

    run_command(&engine, cli.command).await
}

async fn run_command(
    engine: &ChatEngine<SqliteStorage, GeminiClient>,
    command: Command,
) -> anyhow::Result<()> {
    // The CLI is stateless between invocations: no override map persists, so
    // every command sees the default (highest-version) selections.
    let overrides = ActiveVersions::new();

    match command {
        Command::New { user, title } => {
            let conversation = engine.create_conversation(&user, &title).await?;
            println!("{}", serde_json::to_string_pretty(&conversation)?);
        }
        Command::Send {
            conversation,
            user,
            content,
        } => {
            let exchange = engine
                .send_message(&conversation, &user, &content, &overrides)
                .await?;
            println!("{}", serde_json::to_string_pretty(&exchange)?);
        }
        Command::Edit {
            conversation,
            user,
            message,
            content,
        } => {
            let forked = engine
                .fork_message(&conversation, &user, &message, &content, None)
                .await?;
            println!("{}", serde_json::to_string_pretty(&forked)?);
        }
        Command::Regenerate {
            conversation,
            user,
            message,
        } => {
            let regenerated = engine.regenerate(&conversation, &user, &message).await?;
            println!("{}", serde_json::to_string_pretty(&regenerated)?);
        }
        Command::Show { conversation } => {
            let view = engine.view(&conversation, &overrides).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Transcript { conversation } => {
            let transcript = engine.transcript(&conversation, &overrides).await?;
            println!("{}", transcript);
        }
        Command::Siblings {
            conversation,
            message,
        } => {
            let info = engine.sibling_info(&conversation, &message).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Switch {
            conversation,
            parent,
            index,
        } => {
            let (versions, resolution) = engine
                .switch_branch(&conversation, &overrides, &parent, index)
                .await?;
            let payload = serde_json::json!({
                "path": resolution.ids(),
                "active_versions": versions,
                "integrity_warning": resolution.violation.as_ref().map(|v| v.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        chat_tree_engine::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        chat_tree_engine::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
