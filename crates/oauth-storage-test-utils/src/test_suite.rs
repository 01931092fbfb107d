// Conformance suite runner.
//
// A `TestSuite` runs checks one after another against a single backend,
// logs each result through `tracing`, and tracks count and duration.

use std::future::Future;
use std::time::Instant;

use oauth_storage_core::error::StorageResult;

use crate::conformance::{self, FullStorage};

/// Statistics for a completed suite.
#[derive(Debug, Clone)]
pub struct SuiteStats {
    pub suite_name: String,
    pub test_count: usize,
    pub suite_duration_ms: f64,
}

/// Simple test logger.
pub struct TestLogger {
    pub backend_name: String,
}

impl TestLogger {
    pub fn new(backend_name: &str) -> Self {
        Self {
            backend_name: backend_name.to_string(),
        }
    }

    pub fn info(&self, msg: &str) {
        tracing::info!("[{}] {}", self.backend_name, msg);
    }

    pub fn success(&self, msg: &str) {
        tracing::info!("[{}] ✓ {}", self.backend_name, msg);
    }

    pub fn error(&self, msg: &str) {
        tracing::error!("[{}] {}", self.backend_name, msg);
    }
}

/// A named sequence of checks against one backend.
pub struct TestSuite {
    log: TestLogger,
    name: String,
    test_count: usize,
    started: Instant,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            log: TestLogger::new(name),
            name: name.to_string(),
            test_count: 0,
            started: Instant::now(),
        }
    }

    /// Run one check, logging its outcome. Errors are returned unchanged.
    pub async fn run<F>(&mut self, test_name: &str, check: F) -> StorageResult<()>
    where
        F: Future<Output = StorageResult<()>>,
    {
        let start = Instant::now();
        let result = check.await;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        self.test_count += 1;

        match &result {
            Ok(()) => self.log.success(&format!("{test_name} ({elapsed:.3}ms)")),
            Err(e) => self.log.error(&format!("✗ {test_name}: {e}")),
        }
        result
    }

    pub fn finish(self) -> SuiteStats {
        let stats = SuiteStats {
            suite_name: self.name,
            test_count: self.test_count,
            suite_duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };
        self.log.info(&format!(
            "{} checks passed in {:.3}ms",
            stats.test_count, stats.suite_duration_ms
        ));
        stats
    }
}

/// Run every conformance check against a fresh backend instance.
pub async fn run_conformance<S: FullStorage>(storage: &S, name: &str) -> StorageResult<SuiteStats> {
    let mut suite = TestSuite::new(name);

    suite
        .run(
            "missing records are not errors",
            conformance::missing_records_are_not_errors(storage),
        )
        .await?;
    suite
        .run(
            "signing key fallback",
            conformance::signing_key_fallback(storage),
        )
        .await?;
    suite
        .run(
            "scope membership and defaults",
            conformance::scope_membership_and_defaults(storage),
        )
        .await?;
    suite
        .run(
            "client upsert is idempotent",
            conformance::client_upsert_is_idempotent(storage),
        )
        .await?;
    suite
        .run(
            "public client detection",
            conformance::public_client_detection(storage),
        )
        .await?;
    suite
        .run(
            "grant type restriction",
            conformance::grant_type_restriction(storage),
        )
        .await?;
    suite
        .run(
            "access token reissue overwrites",
            conformance::access_token_reissue_overwrites(storage),
        )
        .await?;
    suite
        .run("token revocation", conformance::token_revocation(storage))
        .await?;
    suite
        .run("user credentials", conformance::user_credentials(storage))
        .await?;
    suite
        .run("client key lookup", conformance::client_key_lookup(storage))
        .await?;
    suite
        .run(
            "jti is unimplemented",
            conformance::jti_is_unimplemented(storage),
        )
        .await?;

    Ok(suite.finish())
}
