pub mod server;

pub use server::*;

use anyhow::Result;
use ipt_core::{AggregatedMetrics, RuleIdentifier, aggregate};
use ipt_save::{ParseError, SaveCommand, SourceError, parse};
use prometheus::{CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

const DEFAULT_LABELS: &[&str] = &["table", "chain", "policy"];
const RULE_LABELS: &[&str] = &["table", "chain", "rule"];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Shapes of the exported metric families, built once at startup
#[derive(Debug, Clone)]
pub struct MetricDescriptors {
    scrape_duration: Opts,
    scrape_success: Opts,
    default_packets: Opts,
    default_bytes: Opts,
    rule_packets: Opts,
    rule_bytes: Opts,
}

/// Fresh metric instances for a single scrape
struct ScrapeFamilies {
    registry: Registry,
    scrape_duration: Gauge,
    scrape_success: Gauge,
    default_packets: CounterVec,
    default_bytes: CounterVec,
    rule_packets: CounterVec,
    rule_bytes: CounterVec,
}

impl MetricDescriptors {
    pub fn new() -> Result<Self> {
        let descriptors = Self {
            scrape_duration: Opts::new(
                "iptables_scrape_duration_seconds",
                "iptables_exporter: Duration of scraping iptables.",
            ),
            scrape_success: Opts::new(
                "iptables_scrape_success",
                "iptables_exporter: Whether scraping iptables succeeded.",
            ),
            default_packets: Opts::new(
                "iptables_default_packets_total",
                "iptables_exporter: Total packets matching a chain's default policy.",
            ),
            default_bytes: Opts::new(
                "iptables_default_bytes_total",
                "iptables_exporter: Total bytes matching a chain's default policy.",
            ),
            rule_packets: Opts::new(
                "iptables_rule_packets_total",
                "iptables_exporter: Total packets matching a rule.",
            ),
            rule_bytes: Opts::new(
                "iptables_rule_bytes_total",
                "iptables_exporter: Total bytes matching a rule.",
            ),
        };

        // Surface bad names or label sets at startup instead of on the first scrape
        descriptors.instantiate()?;
        Ok(descriptors)
    }

    /// Metric names in exposition order
    pub fn names(&self) -> Vec<&str> {
        [
            &self.scrape_duration,
            &self.scrape_success,
            &self.default_packets,
            &self.default_bytes,
            &self.rule_packets,
            &self.rule_bytes,
        ]
        .into_iter()
        .map(|opts| opts.name.as_str())
        .collect()
    }

    fn instantiate(&self) -> Result<ScrapeFamilies> {
        let registry = Registry::new();

        let scrape_duration = Gauge::with_opts(self.scrape_duration.clone())?;
        registry.register(Box::new(scrape_duration.clone()))?;

        let scrape_success = Gauge::with_opts(self.scrape_success.clone())?;
        registry.register(Box::new(scrape_success.clone()))?;

        let default_packets = CounterVec::new(self.default_packets.clone(), DEFAULT_LABELS)?;
        registry.register(Box::new(default_packets.clone()))?;

        let default_bytes = CounterVec::new(self.default_bytes.clone(), DEFAULT_LABELS)?;
        registry.register(Box::new(default_bytes.clone()))?;

        let rule_packets = CounterVec::new(self.rule_packets.clone(), RULE_LABELS)?;
        registry.register(Box::new(rule_packets.clone()))?;

        let rule_bytes = CounterVec::new(self.rule_bytes.clone(), RULE_LABELS)?;
        registry.register(Box::new(rule_bytes.clone()))?;

        Ok(ScrapeFamilies {
            registry,
            scrape_duration,
            scrape_success,
            default_packets,
            default_bytes,
            rule_packets,
            rule_bytes,
        })
    }
}

/// Result of one scrape, ready to be rendered
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub duration: Duration,
    pub result: Result<AggregatedMetrics, ScrapeError>,
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Turns iptables-save dumps into Prometheus exposition text
pub struct MetricsCollector {
    descriptors: MetricDescriptors,
    identifier: Box<dyn RuleIdentifier>,
}

impl MetricsCollector {
    pub fn new(identifier: impl RuleIdentifier + 'static) -> Result<Self> {
        Ok(Self {
            descriptors: MetricDescriptors::new()?,
            identifier: Box::new(identifier),
        })
    }

    pub fn descriptors(&self) -> &MetricDescriptors {
        &self.descriptors
    }

    /// Parse and aggregate one dump
    pub fn evaluate(&self, raw: &str) -> Result<AggregatedMetrics, ScrapeError> {
        let ruleset = parse(raw)?;
        Ok(aggregate(&ruleset, self.identifier.as_ref()))
    }

    /// Run the rule source and evaluate its output
    pub async fn scrape(&self, source: &SaveCommand) -> ScrapeOutcome {
        let start = Instant::now();
        let result = match source.capture().await {
            Ok(raw) => self.evaluate(&raw),
            Err(e) => Err(e.into()),
        };
        Self::finish(start, result)
    }

    /// Evaluate an already captured dump
    pub fn scrape_text(&self, raw: &str) -> ScrapeOutcome {
        let start = Instant::now();
        let result = self.evaluate(raw);
        Self::finish(start, result)
    }

    fn finish(start: Instant, result: Result<AggregatedMetrics, ScrapeError>) -> ScrapeOutcome {
        let duration = start.elapsed();
        match &result {
            Ok(metrics) => debug!(
                "Scraped {} chains, {} rule series in {:?}",
                metrics.chains.len(),
                metrics.rule_series(),
                duration
            ),
            Err(e) => error!("Scrape failed: {}", e),
        }
        ScrapeOutcome { duration, result }
    }

    /// Render a scrape in Prometheus text format. A failed scrape only
    /// reports its duration and `iptables_scrape_success 0`.
    pub fn render(&self, outcome: &ScrapeOutcome) -> Result<String> {
        let families = self.descriptors.instantiate()?;

        families
            .scrape_duration
            .set(outcome.duration.as_secs_f64());

        match &outcome.result {
            Ok(metrics) => {
                families.scrape_success.set(1.0);
                record_counters(&families, metrics);
            }
            Err(_) => families.scrape_success.set(0.0),
        }

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = families.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn record_counters(families: &ScrapeFamilies, metrics: &AggregatedMetrics) {
    for chain in &metrics.chains {
        let labels = [
            chain.table.as_str(),
            chain.chain.as_str(),
            chain.policy.as_str(),
        ];
        families
            .default_packets
            .with_label_values(&labels)
            .inc_by(chain.default.packets_f64());
        families
            .default_bytes
            .with_label_values(&labels)
            .inc_by(chain.default.bytes_f64());

        for (rule, counters) in &chain.rules {
            let labels = [chain.table.as_str(), chain.chain.as_str(), rule.as_str()];
            families
                .rule_packets
                .with_label_values(&labels)
                .inc_by(counters.packets_f64());
            families
                .rule_bytes
                .with_label_values(&labels)
                .inc_by(counters.bytes_f64());
        }
    }
}
