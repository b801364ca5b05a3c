use std::{io::Read, path::Path, process, sync::Arc};

use pagefeed_app::cli::{Cli, Commands, NextSequenceArgs, ProcessArgs};
use pagefeed_app::config::{self, AppConfig};
use pagefeed_app::constants::TASK_PREFIX;
use pagefeed_app::error::AppError;
use pagefeed_app::pipeline::{QueueEvent, storage_event_record};
use pagefeed_app::server::{self, AppState};
use pagefeed_app::services::{
    BatchCoordinator, RecordDispatcher, SequenceAllocator, build_ingest_context,
};
use pagefeed_sync::{DisabledSyncTrigger, HttpSyncTrigger, SyncTrigger};
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    // stdout carries command output (batch results, sequence numbers).
    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Serve(_)) => {
            let config = config::load()?;
            let coordinator = build_coordinator(&config).await?;
            server::serve(config, AppState::new(coordinator)).await?;
        }
        Some(Commands::Process(args)) => {
            run_process(args).await?;
        }
        Some(Commands::NextSequence(args)) => {
            run_next_sequence(args).await?;
        }
        None => {
            Cli::print_help();
        }
    }

    Ok(())
}

async fn build_coordinator(config: &AppConfig) -> Result<BatchCoordinator, AppError> {
    let ctx = build_ingest_context(config).await?;
    let sync: Arc<dyn SyncTrigger> = match HttpSyncTrigger::from_config(&config.sync)? {
        Some(trigger) => {
            tracing::info!(endpoint = %trigger.endpoint(), "sync trigger enabled");
            Arc::new(trigger)
        }
        None => {
            tracing::info!("sync endpoint not configured; sync disabled");
            Arc::new(DisabledSyncTrigger)
        }
    };
    Ok(BatchCoordinator::new(RecordDispatcher::new(&ctx), sync))
}

async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let records = match (args.bucket, args.key, args.input) {
        (Some(bucket), Some(key), _) => vec![storage_event_record(&bucket, &key)],
        (_, _, Some(input)) => read_event(&input)?.records,
        _ => Vec::new(),
    };

    let config = config::load()?;
    let coordinator = build_coordinator(&config).await?;
    let result = coordinator.run(&records).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_next_sequence(args: NextSequenceArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let ctx = build_ingest_context(&config).await?;
    let next = SequenceAllocator::new(ctx.store)
        .next_sequence(&args.bucket, TASK_PREFIX)
        .await?;
    println!("{next}");
    Ok(())
}

fn read_event(input: &Path) -> Result<QueueEvent, AppError> {
    let raw = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(AppError::Stdin)?;
        buf
    } else {
        std::fs::read_to_string(input).map_err(|source| AppError::Io {
            path: input.to_path_buf(),
            source,
        })?
    };
    Ok(serde_json::from_str(&raw)?)
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::NextSequence(_)) => match cli.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Serve(_)) | Some(Commands::Process(_)) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        None => LevelFilter::WARN,
    }
}
