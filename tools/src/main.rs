//! risk-runner: headless provider fraud-risk runner.
//!
//! Usage:
//!   risk-runner --db claims.db --load dataset.json
//!   risk-runner --db claims.db --mode score --provider 42
//!   risk-runner --db claims.db --mode batch --min-score 40 --limit 25
//!   risk-runner --db claims.db --mode insights --config engine.json
//!   risk-runner --db claims.db --mode ego --provider 42 --depth 2
//!   risk-runner --db claims.db --mode scan --as-of 2024-12-31
//!   risk-runner --db claims.db --ipc-mode

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use provider_risk_core::{
    anomaly::AnomalyScanner,
    cache::{get_or_compute, MemoryCache, ResultCache},
    config::EngineConfig,
    error::{RiskError, RiskResult},
    graph::ProviderGraph,
    graph_builder::GraphBuilder,
    insights::{FraudRingReport, NetworkContext, NetworkInsights, NetworkInsightsReporter},
    model::RiskScoreResult,
    scoring::RiskScoreAggregator,
    store::{ClaimStore, Dataset, SqliteClaimStore},
    types::{DateRange, ProviderId},
};
use std::env;
use std::io::{self, BufRead, Write};

const CACHE_TTL_SECONDS: u64 = 300;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    Score {
        provider_id: ProviderId,
        #[serde(default)]
        lookback_days: Option<u32>,
    },
    Batch {
        #[serde(default)]
        provider_ids: Option<Vec<ProviderId>>,
        #[serde(default)]
        min_score: u8,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Insights,
    Rings,
    Ego {
        provider_id: ProviderId,
        #[serde(default = "default_depth")]
        depth: u32,
    },
    Quit,
}

fn default_limit() -> usize {
    100
}

fn default_depth() -> u32 {
    2
}

#[derive(serde::Serialize)]
struct Envelope<'a> {
    run_id:       &'a str,
    mode:         &'a str,
    as_of:        NaiveDate,
    generated_at: chrono::DateTime<Utc>,
    result:       serde_json::Value,
}

/// One runner invocation: an open store, a validated config and a cache.
struct Session {
    run_id: String,
    store:  SqliteClaimStore,
    config: EngineConfig,
    as_of:  NaiveDate,
    cache:  Box<dyn ResultCache>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let mode = string_arg(&args, "--mode").unwrap_or("insights");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");

    let config = match string_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let store = SqliteClaimStore::open(db)?;
    store.migrate()?;

    if let Some(path) = string_arg(&args, "--load") {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let dataset: Dataset = serde_json::from_str(&content)?;
        let (providers, claims) = store.load_dataset(&dataset)?;
        log::info!("Loaded {providers} providers and {claims} claims from {path}");
    }

    let as_of = match args.windows(2).find(|w| w[0] == "--as-of") {
        Some(w) => w[1].parse::<NaiveDate>()?,
        None => store
            .latest_service_date()?
            .unwrap_or_else(|| Utc::now().date_naive()),
    };

    let session = Session {
        run_id: format!("run-{}", uuid::Uuid::new_v4()),
        store,
        config,
        as_of,
        cache: Box::new(MemoryCache::new()),
    };
    log::info!("{} started (db {db}, as of {as_of})", session.run_id);

    if ipc_mode {
        return run_ipc_loop(&session);
    }

    let result = match mode {
        "score" => {
            let Some(id) = args.windows(2).find(|w| w[0] == "--provider") else {
                bail!("--mode score requires --provider <id>");
            };
            session.score(id[1].parse()?, None)?
        }
        "batch" => session.batch(
            None,
            parse_arg(&args, "--min-score", 0u8),
            parse_arg(&args, "--limit", 100usize),
        )?,
        "insights" => session.insights()?,
        "rings" => session.rings()?,
        "ego" => {
            let Some(id) = args.windows(2).find(|w| w[0] == "--provider") else {
                bail!("--mode ego requires --provider <id>");
            };
            session.ego(id[1].parse()?, parse_arg(&args, "--depth", 2u32))?
        }
        "scan" => session.scan()?,
        other => bail!("Unknown mode '{other}' (score, batch, insights, rings, ego, scan)"),
    };

    println!("{}", serde_json::to_string_pretty(&session.envelope(mode, result))?);
    Ok(())
}

fn run_ipc_loop(session: &Session) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if handle.read_line(&mut buffer)? == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let (mode, outcome) = match request {
            IpcRequest::Quit => break,
            IpcRequest::Score { provider_id, lookback_days } => {
                ("score", session.score(provider_id, lookback_days))
            }
            IpcRequest::Batch { provider_ids, min_score, limit } => {
                ("batch", session.batch(provider_ids.as_deref(), min_score, limit))
            }
            IpcRequest::Insights => ("insights", session.insights()),
            IpcRequest::Rings => ("rings", session.rings()),
            IpcRequest::Ego { provider_id, depth } => ("ego", session.ego(provider_id, depth)),
        };

        // A failed request is reported on the wire; the loop keeps serving.
        let line = match outcome {
            Ok(result) => serde_json::to_string(&session.envelope(mode, result))?,
            Err(e) => {
                log::warn!("{mode} request failed: {e}");
                serde_json::json!({ "error": e.to_string(), "mode": mode }).to_string()
            }
        };
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }
    Ok(())
}

impl Session {
    fn envelope<'a>(&'a self, mode: &'a str, result: serde_json::Value) -> Envelope<'a> {
        Envelope {
            run_id: &self.run_id,
            mode,
            as_of: self.as_of,
            generated_at: Utc::now(),
            result,
        }
    }

    fn window(&self, lookback_days: u32) -> DateRange {
        DateRange::lookback(self.as_of, lookback_days)
    }

    fn graph(&self) -> RiskResult<ProviderGraph> {
        GraphBuilder::new(&self.config)?
            .with_window(self.window(self.config.scoring.lookback_days))
            .build(&self.store)
    }

    /// Network context over the same window the scores will use.
    fn aggregator(&self, lookback_days: u32) -> RiskResult<RiskScoreAggregator<'_>> {
        let context =
            NetworkContext::build(&self.store, &self.config, Some(self.window(lookback_days)))?;
        Ok(RiskScoreAggregator::new(&self.store, &self.config)?
            .with_as_of(self.as_of)
            .with_network_context(context))
    }

    /// A cache hit skips the graph build as well as the signals.
    fn score(&self, provider_id: ProviderId, lookback_days: Option<u32>) -> Result<serde_json::Value> {
        let lookback = lookback_days.unwrap_or(self.config.scoring.lookback_days);
        let key = score_key(provider_id, lookback, self.as_of);
        let result: RiskScoreResult =
            get_or_compute(self.cache.as_ref(), &key, CACHE_TTL_SECONDS, || {
                self.aggregator(lookback)?.score(provider_id, lookback)
            })?;
        Ok(serde_json::to_value(result)?)
    }

    fn batch(
        &self,
        provider_ids: Option<&[ProviderId]>,
        min_score: u8,
        limit: usize,
    ) -> Result<serde_json::Value> {
        let results = self
            .aggregator(self.config.scoring.lookback_days)?
            .batch_score(provider_ids, min_score, limit)?;
        Ok(serde_json::to_value(results)?)
    }

    fn insights(&self) -> Result<serde_json::Value> {
        let key = format!("insights:{}", self.as_of);
        let insights: NetworkInsights =
            get_or_compute(self.cache.as_ref(), &key, CACHE_TTL_SECONDS, || {
                let graph = self.graph()?;
                NetworkInsightsReporter::new(&self.config)?.generate_insights(&self.store, &graph)
            })?;
        Ok(serde_json::to_value(insights)?)
    }

    fn rings(&self) -> Result<serde_json::Value> {
        let graph = self.graph()?;
        let reporter = NetworkInsightsReporter::new(&self.config)?;
        let reports = reporter
            .analyze(&graph)
            .rings
            .iter()
            .map(|ring| reporter.ring_report(&self.store, &graph, ring))
            .collect::<Result<Vec<FraudRingReport>, _>>()?;
        Ok(serde_json::to_value(reports)?)
    }

    fn ego(&self, provider_id: ProviderId, depth: u32) -> Result<serde_json::Value> {
        if self.store.provider(provider_id)?.is_none() {
            return Err(RiskError::ProviderNotFound { provider_id }.into());
        }
        let graph = self.graph()?;
        match graph.ego_network(provider_id, depth) {
            Some(ego) => Ok(serde_json::to_value(ego)?),
            None => Ok(serde_json::json!({
                "center_provider_id": provider_id,
                "depth": depth,
                "nodes": [],
                "edges": [],
                "error": format!("Provider {provider_id} has no shared-patient connections"),
            })),
        }
    }

    fn scan(&self) -> Result<serde_json::Value> {
        let anomalies = AnomalyScanner::new(&self.config)?.scan(&self.store, self.as_of)?;
        let recorded = self.store.insert_anomalies(&anomalies)?;
        log::info!("Recorded {recorded} anomalies");
        Ok(serde_json::json!({ "recorded": recorded, "anomalies": anomalies }))
    }
}

fn score_key(provider_id: ProviderId, lookback_days: u32, as_of: NaiveDate) -> String {
    format!("score:{provider_id}:{lookback_days}:{as_of}")
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(store: SqliteClaimStore, as_of: NaiveDate) -> Session {
        Session {
            run_id: "run-test".into(),
            store,
            config: EngineConfig::default(),
            as_of,
            cache: Box::new(MemoryCache::new()),
        }
    }

    #[test]
    fn cached_score_skips_graph_and_store() {
        // No schema applied: every store read fails.
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let session = session(SqliteClaimStore::in_memory().unwrap(), as_of);
        assert!(session.score(7, None).is_err());

        let cached = RiskScoreResult::not_found(7, 365);
        session.cache.set(
            &score_key(7, 365, as_of),
            serde_json::to_string(&cached).unwrap(),
            CACHE_TTL_SECONDS,
        );
        let value = session.score(7, None).unwrap();
        assert_eq!(value["provider_id"], 7);
        assert_eq!(value["risk_level"], "UNKNOWN");
    }

    #[test]
    fn huge_lookback_request_is_served() {
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let store = SqliteClaimStore::in_memory().unwrap();
        store.migrate().unwrap();
        let session = session(store, as_of);

        let value = session.score(7, Some(u32::MAX)).unwrap();
        assert_eq!(value["risk_level"], "UNKNOWN");
        assert_eq!(value["lookback_days"], u32::MAX);
    }
}
