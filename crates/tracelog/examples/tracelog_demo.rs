use clap::Parser;
use opentelemetry::global;
use opentelemetry::trace::Tracer;
use tokio::time::{sleep, Duration};
use tracelog::{RemoteLoggerOptions, TraceLog};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Seconds between two batches of log lines
    #[arg(short, long, default_value_t = 60)]
    interval: u64,

    /// Service name reported to the tracer
    #[arg(short, long, default_value = "tracelog-demo")]
    service: String,

    /// Root log level
    #[arg(short, long, default_value = "WARNING")]
    level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut trace_log = TraceLog::new();
    tracing_subscriber::registry().with(trace_log.layer()).init();

    // LOGSTASH_HOST / OTEL_EXPORTER_JAEGER_AGENT_HOST 未设置时对应部分为空操作
    trace_log.init_remote_logger(RemoteLoggerOptions::default())?;
    trace_log.init_root_logger(args.level.as_str())?;
    trace_log.init_tracer(&args.service)?;
    trace_log.init_span_bridge_logger(args.level.as_str())?;
    trace_log.extend_log_record([("service", args.service.as_str())]);

    let tracer = global::tracer("tracelog-demo");
    let mut ticker = 0u64;

    loop {
        ticker += 1;
        tracer.in_span("tick", |_cx| {
            tracing::warn!(tick = ticker, "Mock warning for stdout");
            tracing::error!(tick = ticker, "Mock error for logstash");
        });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep(Duration::from_secs(args.interval)) => {}
        }
    }

    trace_log.shutdown();
    Ok(())
}
