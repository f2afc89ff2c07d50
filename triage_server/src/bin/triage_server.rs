//! Triage server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use env_logger::TimestampPrecision;
use triage_server::{
    config::{FallbackPolicy, LoaderConfig},
    inferer::Inferer,
    loader::{ArtifactFormat, ModelLoader},
    router::{build_router, DEFAULT_MAX_UPLOAD_BYTES},
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve HTTP on
    #[clap(long, default_value = "127.0.0.1:8000")]
    server_address: String,

    /// Directory relative model paths are resolved against [default: directory of this binary]
    #[clap(long)]
    model_dir: Option<PathBuf>,

    /// Weights artifact, a safetensors state dict or a full ONNX model
    #[clap(long, default_value = "model.onnx")]
    weights: PathBuf,

    /// ONNX architecture template that a state dict is loaded into
    #[clap(long, default_value = "efficientnet_b0.onnx")]
    architecture: PathBuf,

    /// Format of the weights artifact [default: detected from its content]
    #[clap(long, value_enum)]
    artifact_format: Option<ArtifactFormat>,

    /// Answer to failed predictions
    #[clap(long, value_enum, default_value_t = FallbackPolicy::Lenient)]
    fallback_policy: FallbackPolicy,

    /// Load the model on the first request instead of at startup
    #[clap(long)]
    lazy: bool,

    /// Largest accepted upload in bytes
    #[clap(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let loader_config = LoaderConfig {
        weights_path: args.weights,
        architecture_path: args.architecture,
        model_dir: args.model_dir,
        artifact_format: args.artifact_format,
        ..Default::default()
    };
    let inferer = Arc::new(Inferer::new(
        ModelLoader::new(loader_config),
        args.fallback_policy,
    ));

    // A missing model must not keep the server from coming up, requests will retry the load.
    if !args.lazy {
        match inferer.warm_up().await {
            Ok(()) => log::info!("Model loaded successfully"),
            Err(e) => log::error!("Error loading model: {e}"),
        }
    }

    let app = build_router(inferer, args.max_upload_bytes);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
