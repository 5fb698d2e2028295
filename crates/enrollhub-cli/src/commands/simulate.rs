//! Concurrency scenarios run against an in-memory admission core.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::Barrier;
use tracing::info;

use crate::output::{self, OutputFormat};
use enrollhub_admission::collaborator::{MemoryCatalog, MemoryDirectory};
use enrollhub_admission::lock::{LockKey, LockManager};
use enrollhub_admission::metrics::percentiles;
use enrollhub_admission::{Admission, AdmissionError, AdmissionService};
use enrollhub_core::config::{AppConfig, LockPolicy};
use enrollhub_core::error::AppError;
use enrollhub_core::types::{ConsumerId, Credits, ResourceId, Season, TermKey};
use enrollhub_entity::consumer::Consumer;
use enrollhub_entity::resource::CatalogResource;

const TERM: TermKey = TermKey::new(2025, Season::Fall);

/// Scenario to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// N consumers race for a resource with capacity C
    CapacityRace,
    /// Consumers at 17.5 credits request 0.5 and 1.0 at once
    QuotaBoundary,
    /// Two transactions lock {A,B} and {B,A} under the unordered policy
    Deadlock,
    /// Many consumers spread randomly over several resources
    MassiveLoad,
    /// Fill a resource, cancel one allocation, admit a newcomer
    CancelRecovery,
}

/// Arguments for the simulate command
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Scenario to run
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// Number of concurrent requests or rounds
    #[arg(short = 'n', long)]
    pub requests: Option<usize>,

    /// Capacity of each simulated resource
    #[arg(long)]
    pub capacity: Option<u32>,

    /// Number of resources for massive-load
    #[arg(long, default_value = "10")]
    pub resources: u64,

    /// Random seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Retry contention failures with backoff
    #[arg(long)]
    pub retry: bool,
}

/// Outcome tally row
#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    /// Outcome code
    outcome: String,
    /// Number of requests
    count: u64,
}

/// Summary of one run
#[derive(Debug, Serialize)]
struct SimulationSummary {
    scenario: String,
    requests: usize,
    elapsed_ms: u64,
    outcomes: BTreeMap<String, u64>,
    latency_p50_ms: Option<f64>,
    latency_p95_ms: Option<f64>,
    latency_p99_ms: Option<f64>,
    consistent: Option<bool>,
    notes: Vec<String>,
}

impl SimulationSummary {
    fn new(scenario: Scenario, requests: usize) -> Self {
        Self {
            scenario: scenario_name(scenario).to_string(),
            requests,
            elapsed_ms: 0,
            outcomes: BTreeMap::new(),
            latency_p50_ms: None,
            latency_p95_ms: None,
            latency_p99_ms: None,
            consistent: None,
            notes: Vec::new(),
        }
    }

    fn tally<T>(&mut self, results: &[Result<T, AdmissionError>]) {
        for result in results {
            let code = match result {
                Ok(_) => "admitted",
                Err(e) => e.code(),
            };
            *self.outcomes.entry(code.to_string()).or_insert(0) += 1;
        }
    }

    fn count(&self, code: &str) -> u64 {
        self.outcomes.get(code).copied().unwrap_or(0)
    }

    fn set_latencies(&mut self, p50: Option<Duration>, p95: Option<Duration>, p99: Option<Duration>) {
        let ms = |d: Option<Duration>| d.map(|d| d.as_micros() as f64 / 1000.0);
        self.latency_p50_ms = ms(p50);
        self.latency_p95_ms = ms(p95);
        self.latency_p99_ms = ms(p99);
    }

    async fn audit(&mut self, service: &AdmissionService) -> Result<(), AppError> {
        let report = service.verify().await?;
        if !report.is_consistent() {
            self.notes.push(format!("consistency audit failed: {report:?}"));
        }
        self.consistent = Some(report.is_consistent());
        Ok(())
    }

    fn print(&self, format: OutputFormat) {
        if format == OutputFormat::Json {
            output::print_json(self);
            return;
        }

        output::print_heading(&format!("Scenario: {}", self.scenario));
        output::print_kv("Requests", &self.requests.to_string());
        output::print_kv("Elapsed", &format!("{} ms", self.elapsed_ms));
        let fmt_ms = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v:.3} ms"));
        output::print_kv("Latency p50", &fmt_ms(self.latency_p50_ms));
        output::print_kv("Latency p95", &fmt_ms(self.latency_p95_ms));
        output::print_kv("Latency p99", &fmt_ms(self.latency_p99_ms));

        let rows: Vec<OutcomeRow> = self
            .outcomes
            .iter()
            .map(|(outcome, count)| OutcomeRow {
                outcome: outcome.clone(),
                count: *count,
            })
            .collect();
        output::print_list(&rows, format);

        match self.consistent {
            Some(true) => output::print_success("State is consistent"),
            Some(false) => output::print_warning("State is inconsistent"),
            None => {}
        }
        for note in &self.notes {
            output::print_kv("Note", note);
        }
    }
}

fn scenario_name(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::CapacityRace => "capacity-race",
        Scenario::QuotaBoundary => "quota-boundary",
        Scenario::Deadlock => "deadlock",
        Scenario::MassiveLoad => "massive-load",
        Scenario::CancelRecovery => "cancel-recovery",
    }
}

fn catalog_resource(id: u64, capacity: u32, weight: Credits) -> CatalogResource {
    CatalogResource {
        id: ResourceId::new(id),
        capacity,
        credit_weight: weight,
        canceled: false,
        term: TERM,
        course_code: Some(format!("SIM{id:03}")),
        title: None,
    }
}

fn consumers(count: usize) -> Vec<Consumer> {
    (1..=count)
        .map(|i| Consumer::eligible(format!("S{i:05}")))
        .collect()
}

fn build(
    config: &AppConfig,
    resources: Vec<CatalogResource>,
    consumers: Vec<Consumer>,
) -> Result<AdmissionService, AppError> {
    AdmissionService::with_memory_store(
        config,
        Arc::new(MemoryCatalog::with_resources(resources)),
        Arc::new(MemoryDirectory::with_consumers(consumers)),
    )
}

/// Run every request concurrently, each on its own task.
async fn admit_concurrently(
    service: &AdmissionService,
    requests: Vec<(ConsumerId, ResourceId)>,
    retry: bool,
) -> Result<Vec<Result<Admission, AdmissionError>>, AppError> {
    let start = Arc::new(Barrier::new(requests.len()));
    let handles = requests.into_iter().map(|(consumer_id, resource_id)| {
        let service = service.clone();
        let start = Arc::clone(&start);
        tokio::spawn(async move {
            start.wait().await;
            if retry {
                service.admit_with_retry(&consumer_id, resource_id).await
            } else {
                service.admit(&consumer_id, resource_id).await
            }
        })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|e| AppError::internal(format!("Simulation task failed: {e}"))))
        .collect()
}

/// Execute the simulate command
pub async fn execute(
    args: &SimulateArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let started = Instant::now();
    info!(
        scenario = scenario_name(args.scenario),
        lock_policy = %config.admission.lock_policy,
        lease_pool_size = config.lease_pool.size,
        "Running simulation"
    );

    let mut summary = match args.scenario {
        Scenario::CapacityRace => capacity_race(args, &config).await?,
        Scenario::QuotaBoundary => quota_boundary(args, &config).await?,
        Scenario::Deadlock => deadlock(args, &config).await?,
        Scenario::MassiveLoad => massive_load(args, &config).await?,
        Scenario::CancelRecovery => cancel_recovery(args, &config).await?,
    };
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        scenario = %summary.scenario,
        elapsed_ms = summary.elapsed_ms,
        consistent = ?summary.consistent,
        "Simulation finished"
    );
    summary.print(format);
    Ok(())
}

fn record_service_latencies(summary: &mut SimulationSummary, service: &AdmissionService) {
    let metrics = service.metrics().admission;
    summary.set_latencies(metrics.latency_p50, metrics.latency_p95, metrics.latency_p99);
}

async fn capacity_race(args: &SimulateArgs, config: &AppConfig) -> Result<SimulationSummary, AppError> {
    let n = args.requests.unwrap_or(100);
    let capacity = args.capacity.unwrap_or(30);
    let service = build(
        config,
        vec![catalog_resource(1, capacity, Credits::from_hundredths(300))],
        consumers(n),
    )?;

    let requests = consumers(n)
        .into_iter()
        .map(|c| (c.id, ResourceId::new(1)))
        .collect();
    let results = admit_concurrently(&service, requests, args.retry).await?;

    let mut summary = SimulationSummary::new(args.scenario, n);
    summary.tally(&results);
    record_service_latencies(&mut summary, &service);

    let held = service.query_resource(ResourceId::new(1)).await?.held;
    let expected = capacity.min(n as u32);
    summary.notes.push(format!(
        "held {held}/{capacity}, expected {expected} admissions, got {}",
        summary.count("admitted")
    ));
    summary.audit(&service).await?;
    Ok(summary)
}

async fn quota_boundary(args: &SimulateArgs, config: &AppConfig) -> Result<SimulationSummary, AppError> {
    let rounds = args.requests.unwrap_or(20);
    let capacity = args.capacity.unwrap_or(u32::try_from(rounds).unwrap_or(u32::MAX));
    let service = build(
        config,
        vec![
            catalog_resource(1, capacity, Credits::from_hundredths(1750)),
            catalog_resource(2, capacity, Credits::from_hundredths(50)),
            catalog_resource(3, capacity, Credits::from_hundredths(100)),
        ],
        consumers(rounds),
    )?;

    for consumer in consumers(rounds) {
        service
            .admit(&consumer.id, ResourceId::new(1))
            .await
            .map_err(AppError::from)?;
    }

    let requests = consumers(rounds)
        .into_iter()
        .flat_map(|c| {
            [
                (c.id.clone(), ResourceId::new(2)),
                (c.id, ResourceId::new(3)),
            ]
        })
        .collect();
    let results = admit_concurrently(&service, requests, args.retry).await?;

    let mut summary = SimulationSummary::new(args.scenario, results.len());
    summary.tally(&results);
    record_service_latencies(&mut summary, &service);

    let half = service.query_resource(ResourceId::new(2)).await?.held;
    let full = service.query_resource(ResourceId::new(3)).await?.held;
    summary.notes.push(format!(
        "0.5-credit admissions {half}, 1.0-credit admissions {full}"
    ));
    summary.audit(&service).await?;
    Ok(summary)
}

async fn deadlock(args: &SimulateArgs, config: &AppConfig) -> Result<SimulationSummary, AppError> {
    let rounds = args.requests.unwrap_or(50);
    let timeout = Duration::from_millis(config.admission.lock_timeout_ms);
    let manager = LockManager::new(LockPolicy::Unordered);

    let mut results: Vec<Result<(), AdmissionError>> = Vec::with_capacity(rounds * 2);
    let mut samples = Vec::with_capacity(rounds * 2);
    for round in 0..rounds as u64 {
        let a = LockKey::resource(ResourceId::new(round * 2 + 1));
        let b = LockKey::resource(ResourceId::new(round * 2 + 2));
        let barrier = Arc::new(Barrier::new(2));

        let handles = [(a.clone(), b.clone()), (b, a)].map(|(first, second)| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                let started = Instant::now();
                let deadline = started + timeout;
                let mut set = manager.begin();
                let outcome = match set.acquire(first, deadline).await {
                    Ok(()) => {
                        barrier.wait().await;
                        set.acquire(second, deadline).await
                    }
                    Err(e) => {
                        barrier.wait().await;
                        Err(e)
                    }
                };
                if outcome.is_ok() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                set.release();
                (outcome.map_err(AdmissionError::from), started.elapsed())
            })
        });

        for joined in join_all(handles).await {
            let (outcome, elapsed) =
                joined.map_err(|e| AppError::internal(format!("Simulation task failed: {e}")))?;
            results.push(outcome);
            samples.push(elapsed);
        }
    }

    let mut summary = SimulationSummary::new(args.scenario, results.len());
    summary.tally(&results);
    let (p50, p95, p99) = percentiles(&samples);
    summary.set_latencies(p50, p95, p99);

    let locks = manager.metrics();
    summary.notes.push(format!(
        "rounds {rounds}, deadlocks detected {}, timeouts {}",
        locks.deadlocks, locks.timeouts
    ));
    Ok(summary)
}

async fn massive_load(args: &SimulateArgs, config: &AppConfig) -> Result<SimulationSummary, AppError> {
    let n = args.requests.unwrap_or(1000);
    let capacity = args.capacity.unwrap_or(30);
    let resource_count = args.resources.max(1);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let resources = (1..=resource_count)
        .map(|id| catalog_resource(id, capacity, Credits::from_hundredths(300)))
        .collect();
    let service = build(config, resources, consumers(n))?;

    let requests = consumers(n)
        .into_iter()
        .map(|c| (c.id, ResourceId::new(rng.gen_range(1..=resource_count))))
        .collect();
    let results = admit_concurrently(&service, requests, args.retry).await?;

    let mut summary = SimulationSummary::new(args.scenario, n);
    summary.tally(&results);
    record_service_latencies(&mut summary, &service);

    let metrics = service.metrics();
    summary.notes.push(format!(
        "lease pool size {}, contended locks {}, retries {}",
        metrics.lease_pool.size, metrics.locks.contended, metrics.admission.retries
    ));
    summary.audit(&service).await?;
    Ok(summary)
}

async fn cancel_recovery(args: &SimulateArgs, config: &AppConfig) -> Result<SimulationSummary, AppError> {
    let capacity = args.capacity.unwrap_or(30);
    let n = args.requests.unwrap_or(capacity as usize + 1).max(capacity as usize + 1);
    let service = build(
        config,
        vec![catalog_resource(1, capacity, Credits::from_hundredths(300))],
        consumers(n),
    )?;

    let all = consumers(n);
    let (fill, waiting) = all.split_at(capacity as usize);
    let mut results = Vec::with_capacity(n + 1);
    let mut admitted = Vec::with_capacity(fill.len());
    for consumer in fill {
        let result = service.admit(&consumer.id, ResourceId::new(1)).await;
        if let Ok(admission) = &result {
            admitted.push(admission.allocation.id);
        }
        results.push(result.map(|_| ()));
    }

    let newcomer = &waiting[0].id;
    results.push(service.admit(newcomer, ResourceId::new(1)).await.map(|_| ()));
    let held_full = service.query_resource(ResourceId::new(1)).await?.held;

    let mut notes = Vec::new();
    if let Some(first) = admitted.first() {
        let cancellation = service.cancel(*first).await.map_err(AppError::from)?;
        notes.push(format!(
            "held {held_full} before cancel, {} after",
            cancellation.resource.map_or(0, |r| r.held)
        ));
        results.push(service.admit(newcomer, ResourceId::new(1)).await.map(|_| ()));
    }

    let mut summary = SimulationSummary::new(args.scenario, results.len());
    summary.notes = notes;
    summary.tally(&results);
    record_service_latencies(&mut summary, &service);
    summary.audit(&service).await?;
    Ok(summary)
}
