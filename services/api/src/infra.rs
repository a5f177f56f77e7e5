use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use mpesewa::config::LendingConfig;
use mpesewa::error::AppError;
use mpesewa::lending::{
    InMemoryLendingRepository, LendingService, ReferenceData, SeedData, SystemClock,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ApiService = LendingService<InMemoryLendingRepository, SystemClock>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Read users, groups, loans and blacklist entries from a JSON seed file.
pub(crate) fn load_seed(path: &Path) -> Result<SeedData, AppError> {
    let file = File::open(path)?;
    let seed = SeedData::from_json_reader(BufReader::new(file))?;
    info!(
        path = %path.display(),
        users = seed.users.len(),
        groups = seed.groups.len(),
        loans = seed.loans.len(),
        "seed data loaded"
    );
    Ok(seed)
}

/// Lending service over an in-memory store, optionally pre-populated.
pub(crate) fn build_service(
    lending: &LendingConfig,
    seed: Option<SeedData>,
) -> ApiService {
    let repository = match seed {
        Some(seed) => InMemoryLendingRepository::from_seed(seed),
        None => InMemoryLendingRepository::new(),
    };
    LendingService::new(
        Arc::new(repository),
        Arc::new(SystemClock),
        ReferenceData::standard(),
    )
    .with_rates(lending.rate_card())
    .with_blacklist_after_days(lending.blacklist_after_days)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
