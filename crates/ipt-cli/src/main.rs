use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ipt_core::{AggregatedMetrics, ExporterConfig};
use ipt_metrics::{MetricsCollector, MetricsServer};
use ipt_save::SaveCommand;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "iptables-exporter")]
#[command(version, about = "Prometheus exporter for iptables rule counters", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long = "log.level", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve metrics over HTTP
    Serve {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address on which to expose metrics and web interface
        #[arg(long = "web.listen-address")]
        listen_address: Option<String>,

        /// Path under which to expose metrics
        #[arg(long = "web.telemetry-path")]
        telemetry_path: Option<String>,

        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Parse a saved iptables-save -c dump and print what would be exported
    Parse {
        /// Dump file, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        file: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Exposition)]
        format: OutputFormat,

        #[command(flatten)]
        capture: CaptureArgs,
    },
}

#[derive(Args)]
struct CaptureArgs {
    /// Regular expression used to export as 'rule' label desired bits from iptables rule
    #[arg(long = "iptables.capture-re")]
    capture_re: Option<String>,

    /// Joins capturing groups when the expression defines several
    #[arg(long = "iptables.capture-separator")]
    capture_separator: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Prometheus text exposition
    Exposition,
    /// Aggregated counters per chain
    Summary,
    /// Parsed ruleset as JSON
    Json,
}

impl CaptureArgs {
    fn apply(&self, config: &mut ExporterConfig) {
        if let Some(pattern) = &self.capture_re {
            config.capture.pattern = pattern.clone();
        }
        if let Some(separator) = &self.capture_separator {
            config.capture.separator = separator.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            config,
            listen_address,
            telemetry_path,
            capture,
        } => {
            let mut exporter_config = match config {
                Some(path) => ExporterConfig::from_file(&path)?,
                None => ExporterConfig::default(),
            };
            if let Some(addr) = listen_address {
                exporter_config.web.listen_address = addr;
            }
            if let Some(path) = telemetry_path {
                exporter_config.web.telemetry_path = path;
            }
            capture.apply(&mut exporter_config);
            exporter_config.validate()?;

            tokio::runtime::Runtime::new()?.block_on(async { serve(exporter_config).await })?;
        }
        Commands::Parse {
            file,
            format,
            capture,
        } => {
            let mut exporter_config = ExporterConfig::default();
            capture.apply(&mut exporter_config);
            handle_parse(&file, format, &exporter_config)?;
        }
    }

    Ok(())
}

async fn serve(config: ExporterConfig) -> anyhow::Result<()> {
    info!("Starting iptables-exporter {}", env!("CARGO_PKG_VERSION"));

    let capture = config
        .capture_pattern()
        .context("Refusing to start with an invalid capture expression")?;
    info!("Capture expression: {}", capture.as_str());

    let addr = config.listen_socket_addr()?;
    let source = SaveCommand::from_config(&config.source);
    info!(
        "Rule source: {} {} (timeout {}s)",
        source.program,
        source.args.join(" "),
        config.source.timeout_secs
    );

    let collector = MetricsCollector::new(capture)?;
    let server = MetricsServer::new(collector, source, addr, config.web.telemetry_path);
    server.serve().await
}

fn handle_parse(file: &str, format: OutputFormat, config: &ExporterConfig) -> anyhow::Result<()> {
    let raw = if file == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read dump from stdin")?
    } else {
        std::fs::read_to_string(file).context(format!("Failed to read dump from {}", file))?
    };

    let capture = config.capture_pattern()?;

    match format {
        OutputFormat::Json => {
            let ruleset = ipt_save::parse(&raw)?;
            println!("{}", serde_json::to_string_pretty(&ruleset)?);
        }
        OutputFormat::Summary => {
            let collector = MetricsCollector::new(capture)?;
            let metrics = collector.evaluate(&raw)?;
            print_summary(&metrics);
        }
        OutputFormat::Exposition => {
            let collector = MetricsCollector::new(capture)?;
            let outcome = collector.scrape_text(&raw);
            if let Err(e) = &outcome.result {
                anyhow::bail!("Failed to parse dump: {}", e);
            }
            print!("{}", collector.render(&outcome)?);
        }
    }

    Ok(())
}

fn print_summary(metrics: &AggregatedMetrics) {
    for chain in &metrics.chains {
        println!(
            "{}/{} policy={} packets={} bytes={}",
            chain.table, chain.chain, chain.policy, chain.default.packets, chain.default.bytes
        );

        let mut rules: Vec<_> = chain.rules.iter().collect();
        rules.sort_by(|a, b| a.0.cmp(b.0));
        for (rule, counters) in rules {
            println!(
                "  {:>12} {:>14}  {}",
                counters.packets, counters.bytes, rule
            );
        }
    }
}
