use annunciator::{
    AlarmEvent, AlarmService, CoreConfig, JsonLinesSink, LogSink, RotateOutcome, StatisticsSink,
};
use anyhow::{bail, Context};
use tracing::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::signal;

const USAGE: &str = "Usage: annunciator <config.yaml> [events.jsonl] [--stats-out <stats.jsonl>]
Events are read from stdin when no events file is given.";

struct Args {
    config: PathBuf,
    events: Option<PathBuf>,
    stats_out: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut stats_out = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stats-out" => {
                let path = args.next().context("--stats-out needs a path")?;
                stats_out = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let mut positional = positional.into_iter();
    let config = match positional.next() {
        Some(path) => path,
        None => bail!(USAGE),
    };
    Ok(Args {
        config,
        events: positional.next(),
        stats_out,
    })
}

async fn replay<R>(service: &AlarmService, reader: R) -> anyhow::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut applied = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: AlarmEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event {:?}: {}", line, e);
                continue;
            }
        };
        match service.ingest(event) {
            Ok(_) => applied += 1,
            Err(e) if e.is_recoverable() => warn!("Event rejected: {}", e),
            Err(e) => return Err(e).context("alarm table corrupted"),
        }
    }
    Ok(applied)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    annunciator::init_logging();
    info!("Annunciator v{} starting", annunciator::VERSION);

    let args = parse_args()?;
    let config = CoreConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let sink: Arc<dyn StatisticsSink> = match &args.stats_out {
        Some(path) => Arc::new(
            JsonLinesSink::create(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Arc::new(LogSink),
    };

    let service = Arc::new(AlarmService::new(config, sink)?);
    service.start()?;

    let rotation = if service.pipeline().is_enabled() {
        let service = service.clone();
        let period = service.pipeline().interval();
        Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            // The first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                if service.rotate() == RotateOutcome::Skipped {
                    break;
                }
            }
        }))
    } else {
        None
    };

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &args.events {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(None)
        }
        res = replay(&service, reader) => res.map(Some),
    };

    if let Some(rotation) = rotation {
        rotation.abort();
    }
    // Flush the partial interval before stopping
    service.rotate();

    let table = service.table();
    info!(
        "{} alarms in table, highest unacknowledged priority: {:?}",
        table.len(),
        table.highest_priority_unacknowledged()
    );

    let interrupted = matches!(result, Ok(None));
    match result {
        Ok(Some(applied)) => info!("Replayed {} events", applied),
        Ok(None) => {}
        Err(e) => {
            error!("Replay failed: {:#}", e);
            service.shutdown();
            return Err(e);
        }
    }

    // Let the aggregator drain what is queued, then stop it
    let drained = service.clone();
    tokio::task::spawn_blocking(move || {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while drained.pipeline().queued_snapshots() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        drained.shutdown();
        drained.pipeline().join()
    })
    .await??;

    let metrics = service.pipeline().metrics();
    info!(
        "Statistics: {} records, {} intervals, {} dropped, {} emitted",
        metrics.recorded, metrics.rotations, metrics.dropped_intervals, metrics.summaries_emitted
    );

    // A pending stdin read cannot be cancelled and would hold runtime
    // teardown until the next newline
    if interrupted && args.events.is_none() {
        std::process::exit(0);
    }
    Ok(())
}
