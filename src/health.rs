use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::midtrans::SnapClient;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// A critical dependency being down makes the whole service unhealthy.
    fn is_critical(&self) -> bool {
        false
    }

    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn is_critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the payment gateway as down while its circuit breaker is open.
pub struct SnapChecker {
    client: Arc<SnapClient>,
}

impl SnapChecker {
    pub fn new(client: Arc<SnapClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for SnapChecker {
    fn name(&self) -> &'static str {
        "midtrans"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.circuit_state().as_str() {
            "closed" => DependencyStatus::healthy(start),
            state => DependencyStatus::unhealthy(format!("circuit breaker {state}")),
        }
    }
}

pub async fn check_health(
    checkers: &[Arc<dyn DependencyChecker>],
    start_time: Instant,
) -> HealthResponse {
    let results = run_checks(checkers).await;

    let mut dependencies = HashMap::new();
    let mut critical = Vec::new();
    for (checker, status) in checkers.iter().zip(results) {
        if checker.is_critical() {
            critical.push(checker.name());
        }
        dependencies.insert(checker.name().to_string(), status);
    }

    HealthResponse {
        status: determine_overall_status(&dependencies, &critical),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

async fn run_checks(checkers: &[Arc<dyn DependencyChecker>]) -> Vec<DependencyStatus> {
    let mut handles = Vec::with_capacity(checkers.len());
    for checker in checkers {
        let checker = Arc::clone(checker);
        handles.push(tokio::spawn(async move {
            timeout(CHECK_TIMEOUT, checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"))
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .await
                .unwrap_or_else(|e| DependencyStatus::unhealthy(e.to_string())),
        );
    }
    results
}

fn determine_overall_status(
    dependencies: &HashMap<String, DependencyStatus>,
    critical: &[&str],
) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        critical: bool,
        up: bool,
    }

    #[async_trait]
    impl DependencyChecker for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_critical(&self) -> bool {
            self.critical
        }

        async fn check(&self) -> DependencyStatus {
            if self.up {
                DependencyStatus::healthy(Instant::now())
            } else {
                DependencyStatus::unhealthy("down")
            }
        }
    }

    fn checker(name: &'static str, critical: bool, up: bool) -> Arc<dyn DependencyChecker> {
        Arc::new(Fixed {
            name,
            critical,
            up,
        })
    }

    #[tokio::test]
    async fn all_up_is_healthy() {
        let checkers = vec![checker("postgres", true, true), checker("midtrans", false, true)];
        let health = check_health(&checkers, Instant::now()).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.dependencies.len(), 2);
    }

    #[tokio::test]
    async fn non_critical_failure_is_degraded() {
        let checkers = vec![checker("postgres", true, true), checker("midtrans", false, false)];
        let health = check_health(&checkers, Instant::now()).await;
        assert_eq!(health.status, "degraded");
        assert!(!health.is_unhealthy());
    }

    #[tokio::test]
    async fn critical_failure_is_unhealthy() {
        let checkers = vec![checker("postgres", true, false), checker("midtrans", false, true)];
        let health = check_health(&checkers, Instant::now()).await;
        assert!(health.is_unhealthy());
    }

    #[tokio::test]
    async fn snap_checker_follows_circuit_state() {
        let client = Arc::new(SnapClient::new(
            "http://127.0.0.1:9".to_string(),
            "key".to_string(),
        ));
        let status = SnapChecker::new(client).check().await;
        assert!(matches!(status, DependencyStatus::Healthy { .. }));
    }
}
