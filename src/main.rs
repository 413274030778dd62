//! pipewright: line filter built on the pipeline
//!
//! Reads lines from stdin, keeps the ones containing every command-line
//! argument, and prints them in input order.
//!
//! ```text
//! $ dmesg | pipewright usb error
//! ```
//!
//! Set `PIPEWRIGHT_CONFIG` to load a specific config file; otherwise the
//! default config location is used.

use anyhow::Context as _;
use pipewright::{
    Collector, Context, FilterStage, LineSource, Pipeline, PipelineConfig,
};
use std::io::{self, BufReader, Write};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the matches.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,pipewright=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = match std::env::var_os("PIPEWRIGHT_CONFIG") {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => PipelineConfig::load_or_default(),
    };
    let terms: Vec<String> = std::env::args().skip(1).collect();
    tracing::info!(?terms, policy = %config.error_policy, "starting line filter");

    let capacity = config.channel_capacity;
    let pipeline: Pipeline<String> = Pipeline::with_config(config);
    let sink = Arc::new(Collector::<String>::new("output"));

    pipeline.set_source(Arc::new(
        LineSource::new("stdin", BufReader::new(io::stdin())).with_capacity(capacity),
    ));
    pipeline.add(Arc::new(
        FilterStage::new("match", move |line: &String| {
            terms.iter().all(|term| line.contains(term.as_str()))
        })
        .with_capacity(capacity),
    ));
    pipeline.set_destination(sink.clone());

    let summary = pipeline.run(&Context::new()).context("running pipeline")?;
    tracing::info!(
        matched = sink.len(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "line filter finished"
    );

    for err in sink.error_messages() {
        tracing::warn!("{}", err);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in sink.take_items() {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
