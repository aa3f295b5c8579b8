//! line-tally interactive client
//!
//! Prompts for lines on stdin, sends them to the server and prints each
//! reply. Type `exit` to leave.

use clap::Parser;
use line_tally::client::{Client, ClientOptions};
use line_tally::config::ClientArgs;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();

    // Logs go to stderr so stdout only carries the conversation
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    println!("Connecting to server at {}...", args.server);
    let options = ClientOptions {
        exit_grace: args.exit_grace(),
    };
    let client = Client::connect(&args.server, options)
        .await
        .inspect_err(|e| error!(server = %args.server, error = %e, "Could not connect to server"))?;
    println!("Connected to server!\n");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let outcome = client.run(stdin, tokio::io::stdout()).await?;
    debug!(?outcome, "Client finished");
    Ok(())
}
