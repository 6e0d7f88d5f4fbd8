use capture_sdk::CaptureClient;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "capture-cli")]
#[command(about = "Inspect requests recorded by a traffic-capture service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List captured requests, most recent first
    List {
        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(short, long)]
        offset: Option<u64>,
    },
    /// Show one captured request in full
    Show {
        /// Correlation id (the x-request-id assigned at capture)
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = CaptureClient::new(&cli.url);

    match cli.command {
        Commands::List { limit, offset } => {
            let page = client.list(limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Show { id } => match client.get(&id).await? {
            Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
            None => {
                eprintln!("Error: no captured request with id {}", id);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
