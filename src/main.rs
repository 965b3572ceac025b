//! Gardenbook chat entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gardenbook_chat::chat::{ChatPipeline, ChatRequest, ChatTurn};
use gardenbook_chat::config::{self, Config};

#[derive(Parser)]
#[command(name = "gardenbook-chat")]
#[command(about = "Gardenbook AI gardening assistant")]
#[command(version)]
struct Cli {
    /// Optional JSON config file (environment variables still override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message through the pipeline and print the reply
    Chat {
        /// Message to send to the assistant
        #[arg(short, long)]
        message: String,

        /// User whose encyclopedia should be used
        #[arg(short, long)]
        user_id: Option<String>,

        /// IANA timezone, e.g. America/New_York
        #[arg(short, long)]
        timezone: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config: Config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            gardenbook_chat::server::serve(&config).await?;
        }

        Commands::Chat { message, user_id, timezone } => {
            let pipeline = ChatPipeline::from_config(&config)?;
            let mut request = ChatRequest::new(vec![ChatTurn::new("user", &message)]);
            request.user_id = user_id;
            request.user_timezone = timezone;

            let response = pipeline.handle(request).await?;
            println!("{}", response.response);
        }
    }

    Ok(())
}
