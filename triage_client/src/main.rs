use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::TimestampPrecision;
use triage_client::{check_health, format_prediction, triage_file};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the triage server to connect to
    #[clap(long, default_value = "127.0.0.1:8000")]
    address: String,

    /// Only check that the server is alive
    #[clap(long)]
    health: bool,

    /// Images to classify
    #[clap(required_unless_present = "health")]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = reqwest::Client::new();

    if args.health {
        let health = check_health(&client, &args.address).await?;
        println!("Server at {} is {}", &args.address, health.status);
        return Ok(());
    }

    for path in args.files.iter() {
        log::info!("Uploading {}", path.display());
        match triage_file(&client, &args.address, path).await {
            Ok(prediction) => println!("{}\n{}\n", path.display(), format_prediction(&prediction)),
            Err(e) => log::error!("{e:#}"),
        }
    }

    Ok(())
}
