use clap::Parser;
use futures::prelude::*;
use sportcast_tg::content::{ChannelId, ContentEnvelope};
use sportcast_tg::distribution::{DistributionRequest, Trigger};
use sportcast_tg::tracing_err;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;

/// Distribution of the generated sports content to the Telegram channels
#[derive(Parser, Debug)]
enum Args {
    Distribute(Distribute),
}

/// Send a content envelope to the channels and print the report as JSON
#[derive(Parser, Debug)]
struct Distribute {
    /// Path to the JSON file with the content envelope
    #[clap(long)]
    envelope: PathBuf,

    /// Explicit target channels, may be repeated
    #[clap(long = "channel")]
    channels: Vec<ChannelId>,

    /// Language of the target channels, e.g. `en` or `pt-BR`
    #[clap(long)]
    language: Option<String>,

    /// Sub-key of the spam gate, e.g. a fixture id
    #[clap(long)]
    bucket: Option<String>,

    #[clap(long, value_enum, default_value_t = Trigger::Api)]
    trigger: Trigger,

    /// Don't attach any image to the content
    #[clap(long)]
    no_images: bool,

    /// Channels not started within this number of seconds are skipped
    #[clap(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if dotenvy::dotenv().is_err() {
        eprintln!("Dotenv config was not found, ignoring this...")
    }

    let logging_task = sportcast_tg::init_logging();

    sportcast_tg::init_metrics();

    let exit_code = AssertUnwindSafe(async {
        let result = try_main(args).await;

        result.map(|()| ExitCode::SUCCESS).unwrap_or_else(|err| {
            error!(err = tracing_err(&err), "Exitting with an error...");
            ExitCode::FAILURE
        })
    })
    .catch_unwind()
    .unwrap_or_else(|_| {
        error!("Exitting due to a panic...");
        ExitCode::FAILURE
    })
    .await;

    logging_task.shutdown().await;

    exit_code
}

async fn try_main(args: Args) -> sportcast_tg::Result {
    let config = sportcast_tg::Config::load_or_panic();

    let Args::Distribute(cmd) = args;

    let envelope = ContentEnvelope::from_file(&cmd.envelope).await?;

    let request = DistributionRequest {
        target_channels: (!cmd.channels.is_empty()).then_some(cmd.channels),
        language: cmd.language,
        trigger: cmd.trigger,
        bucket: cmd.bucket,
        include_images: !cmd.no_images,
        deadline: cmd
            .deadline_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs)),
        ..DistributionRequest::new(envelope)
    };

    let report = sportcast_tg::run(config, request).await?;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| sportcast_tg::ErrorKind::Fatal {
            message: "Failed to serialize the distribution report".to_owned(),
            source: Some(Box::new(err)),
        })?;

    println!("{json}");

    Ok(())
}
