//! Gateway request pipeline
//!
//! admit -> cache -> intent rules -> generator -> sanitize -> validate -> execute
//!
//! A failed generation is recovered locally with a conservative default query
//! and its rate limit slot is handed back. Nothing reaches the executor
//! without passing the allowlist validator, and only validated SQL is cached.

use crate::application::use_cases::allowlist_validator::AllowlistValidator;
use crate::application::use_cases::intent_matcher::IntentMatcher;
use crate::application::use_cases::prompt_builder::build_sql_prompt;
use crate::application::use_cases::rate_limiter::{RateLimitResult, RateLimiter, Reservation};
use crate::application::use_cases::response_cache::ResponseCache;
use crate::domain::error::{AppError, Result};
use crate::domain::query::{GeneratedQuery, Identity, QueryResult, QuerySource};
use crate::domain::schema::WhitelistSchema;
use crate::infrastructure::db::QueryExecutor;
use crate::infrastructure::llm_clients::SqlGenerator;
use crate::infrastructure::response::clean_sql_response;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Serialize)]
pub struct GatewayResponse {
    pub source: QuerySource,
    pub sql: String,
    pub result: QueryResult,
}

pub struct GatewayUseCase {
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    intent_matcher: IntentMatcher,
    generator: Option<Arc<dyn SqlGenerator>>,
    validator: AllowlistValidator,
    executor: Arc<dyn QueryExecutor>,
}

impl GatewayUseCase {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        generator: Option<Arc<dyn SqlGenerator>>,
        executor: Arc<dyn QueryExecutor>,
        schema: Arc<WhitelistSchema>,
    ) -> Self {
        if generator.is_none() {
            warn!("No SQL generator configured; serving intent rules and fallback queries only");
        }
        Self {
            rate_limiter,
            cache,
            intent_matcher: IntentMatcher::new(),
            generator,
            validator: AllowlistValidator::new(schema),
            executor,
        }
    }

    pub fn with_intent_matcher(mut self, intent_matcher: IntentMatcher) -> Self {
        self.intent_matcher = intent_matcher;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Turns a free-text request into validated SQL and runs it.
    pub async fn submit_request(&self, identity: &Identity, text: &str) -> Result<GatewayResponse> {
        let span = info_span!("gateway_request", identity = %identity);
        self.process(identity, text).instrument(span).await
    }

    async fn process(&self, identity: &Identity, text: &str) -> Result<GatewayResponse> {
        let reservation = match self.rate_limiter.admit(identity).await {
            RateLimitResult::Allowed(reservation) => reservation,
            RateLimitResult::Exceeded {
                retry_after_seconds,
            } => {
                return Err(AppError::RateLimited {
                    retry_after_seconds,
                })
            }
        };

        let (source, candidate) = self.resolve_query(identity, text, &reservation).await;

        let sql = clean_sql_response(&candidate.sql);
        let verdict = self.validator.validate(&sql);
        if !verdict.valid {
            warn!(
                %source,
                prompt = %text,
                sql = %sql,
                reason = %verdict.reason,
                "SQL rejected by allowlist"
            );
            return Err(AppError::ValidationRejected(verdict.reason));
        }
        debug!(%source, sql = %sql, "SQL accepted");

        let query = GeneratedQuery::new(sql, candidate.params);
        if matches!(source, QuerySource::Pattern | QuerySource::Generator) {
            self.cache.put(identity, text, query.clone()).await;
        }

        let result = self
            .executor
            .execute(&query.sql, &query.params)
            .await
            .map_err(|e| {
                error!(%source, sql = %query.sql, error = %e, "Query execution failed");
                e
            })?;

        info!(%source, row_count = result.row_count, "Request served");
        Ok(GatewayResponse {
            source,
            sql: query.sql,
            result,
        })
    }

    /// Picks the candidate query: cache, then intent rules, then generator,
    /// then the default query when generation fails.
    async fn resolve_query(
        &self,
        identity: &Identity,
        text: &str,
        reservation: &Reservation,
    ) -> (QuerySource, GeneratedQuery) {
        if let Some(query) = self.cache.get(identity, text).await {
            debug!("Cache hit");
            return (QuerySource::Cache, query);
        }

        if let Some(matched) = self.intent_matcher.match_prompt(text, identity) {
            debug!(intent = matched.intent, "Intent rule matched");
            return (QuerySource::Pattern, matched.query);
        }

        let Some(generator) = &self.generator else {
            debug!("No generator configured, using default query");
            return (QuerySource::Fallback, IntentMatcher::default_query(identity));
        };

        let prompt = build_sql_prompt(text, identity, self.validator.schema());
        match generator.generate(&prompt).await {
            Ok(raw) => {
                let sql = clean_sql_response(&raw);
                info!(generator = generator.name(), prompt = %text, sql = %sql, "Generator produced SQL");
                (QuerySource::Generator, GeneratedQuery::scoped_to(sql, identity))
            }
            Err(e) => {
                // Intent rules already missed for this prompt.
                warn!(
                    generator = generator.name(),
                    prompt = %text,
                    error = %e,
                    "Generation failed, falling back to default query"
                );
                self.rate_limiter.rollback(reservation).await;
                (QuerySource::Fallback, IntentMatcher::default_query(identity))
            }
        }
    }

    /// Starts the periodic cache sweep and idle rate-window purge.
    pub fn start_maintenance(&self) -> MaintenanceHandle {
        let cache = self.cache.clone();
        let rate_limiter = self.rate_limiter.clone();
        let period = cache.sweep_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let swept = cache.sweep().await;
                        let purged = rate_limiter.purge_idle().await;
                        debug!(swept, purged, "Maintenance sweep finished");
                    }
                }
            }
            debug!("Maintenance task stopped");
        });

        info!(interval_secs = period.as_secs(), "Started maintenance task");
        MaintenanceHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of the background sweep; [`MaintenanceHandle::stop`] ends it.
pub struct MaintenanceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::allowlist_validator::REASON_NOT_SELECT;
    use crate::application::use_cases::intent_matcher::{
        IntentCues, IntentRule, DEFAULT_ORDERS_SQL, DUAL_SALES_SQL, PRODUCT_LIST_SQL,
    };
    use crate::application::use_cases::rate_limiter::RateLimitConfig;
    use crate::application::use_cases::response_cache::CacheConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    enum Behavior {
        Respond(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct StubGenerator {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubGenerator {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SqlGenerator for StubGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Respond(text) => Ok(text.to_string()),
                Behavior::Fail(msg) => Err(AppError::GeneratorError(msg.to_string())),
                Behavior::Hang => {
                    let hang = tokio::time::sleep(Duration::from_secs(60));
                    match tokio::time::timeout(Duration::from_millis(50), hang).await {
                        Ok(()) => Ok(String::new()),
                        Err(_) => Err(AppError::GeneratorError("Timed out after 50ms".into())),
                    }
                }
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, Vec<serde_json::Value>)>>,
        fail: bool,
    }

    impl RecordingExecutor {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<(String, Vec<serde_json::Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(&self, sql: &str, params: &[serde_json::Value]) -> Result<QueryResult> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            if self.fail {
                return Err(AppError::ExecutionError("connection reset".into()));
            }
            let row = HashMap::from([("id".to_string(), serde_json::json!(1))]);
            Ok(QueryResult {
                columns: vec!["id".to_string()],
                rows: vec![row],
                row_count: 1,
            })
        }
    }

    fn gateway_with(
        generator: Option<Arc<dyn SqlGenerator>>,
        executor: Arc<RecordingExecutor>,
        limits: RateLimitConfig,
    ) -> GatewayUseCase {
        GatewayUseCase::new(
            Arc::new(RateLimiter::with_config(limits)),
            Arc::new(ResponseCache::default()),
            generator,
            executor,
            Arc::new(WhitelistSchema::default()),
        )
    }

    fn gateway(
        generator: Option<Arc<dyn SqlGenerator>>,
        executor: Arc<RecordingExecutor>,
    ) -> GatewayUseCase {
        gateway_with(generator, executor, RateLimitConfig::default())
    }

    #[tokio::test]
    async fn test_intent_rule_answers_without_generator() {
        let generator = StubGenerator::new(Behavior::Respond("SELECT * FROM orders"));
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(Some(generator.clone()), executor.clone());

        let response = gw
            .submit_request(&Identity::new("42"), "show me this month's and this week's sales")
            .await
            .unwrap();

        assert_eq!(response.source, QuerySource::Pattern);
        assert_eq!(response.sql, DUAL_SALES_SQL);
        assert_eq!(
            executor.calls(),
            vec![(DUAL_SALES_SQL.to_string(), vec![serde_json::json!(42)])]
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_intent_rule_is_consulted() {
        fn today_without_orders(c: &IntentCues) -> bool {
            c.today && !c.order
        }

        let generator = StubGenerator::new(Behavior::Respond("SELECT * FROM orders"));
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(Some(generator.clone()), executor.clone()).with_intent_matcher(
            IntentMatcher::new().with_rule(IntentRule {
                name: "new_today",
                applies: today_without_orders,
                sql: PRODUCT_LIST_SQL,
            }),
        );

        let response = gw
            .submit_request(&Identity::new("42"), "what is new today")
            .await
            .unwrap();

        assert_eq!(response.source, QuerySource::Pattern);
        assert_eq!(response.sql, PRODUCT_LIST_SQL);
        assert_eq!(generator.calls(), 0);
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_destructive_generator_output_is_never_executed() {
        let generator = StubGenerator::new(Behavior::Respond("DROP TABLE orders"));
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(Some(generator.clone()), executor.clone());

        let err = gw
            .submit_request(&Identity::new("42"), "remove everything")
            .await
            .unwrap_err();

        match err {
            AppError::ValidationRejected(reason) => assert_eq!(reason, REASON_NOT_SELECT),
            other => panic!("unexpected error: {}", other),
        }
        assert!(executor.calls().is_empty());
        assert!(gw.cache().is_empty().await);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_generator_timeout_falls_back_to_default_query() {
        let generator = StubGenerator::new(Behavior::Hang);
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(Some(generator.clone()), executor.clone());
        let id = Identity::new("42");

        let response = gw
            .submit_request(&id, "which customer spent the most")
            .await
            .unwrap();

        assert_eq!(response.source, QuerySource::Fallback);
        assert_eq!(response.sql, DEFAULT_ORDERS_SQL);
        assert_eq!(response.result.row_count, 1);
        assert_eq!(
            executor.calls(),
            vec![(DEFAULT_ORDERS_SQL.to_string(), vec![serde_json::json!(42)])]
        );
        // fallback answers are not cached and the failed attempt costs no quota
        assert!(gw.cache().is_empty().await);
        assert_eq!(gw.rate_limiter().status(&id).await.hour_count, 0);
    }

    #[tokio::test]
    async fn test_generator_failure_does_not_consume_quota() {
        let generator = StubGenerator::new(Behavior::Fail("503 upstream"));
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway_with(
            Some(generator.clone()),
            executor.clone(),
            RateLimitConfig {
                max_requests_per_minute: 1,
                max_requests_per_hour: 10,
            },
        );
        let id = Identity::new("42");

        for _ in 0..3 {
            let response = gw.submit_request(&id, "top spenders").await.unwrap();
            assert_eq!(response.source, QuerySource::Fallback);
        }
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_generated_sql_is_sanitized_scoped_and_cached() {
        let generator = StubGenerator::new(Behavior::Respond(
            "```sql\nSELECT id, total_price\nFROM orders\nWHERE customer_id = $1;\n```",
        ));
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(Some(generator.clone()), executor.clone());
        let id = Identity::new("42");

        let first = gw.submit_request(&id, "Biggest   purchases").await.unwrap();
        assert_eq!(first.source, QuerySource::Generator);
        assert_eq!(
            first.sql,
            "SELECT id, total_price FROM orders WHERE customer_id = $1"
        );

        let second = gw.submit_request(&id, "biggest purchases").await.unwrap();
        assert_eq!(second.source, QuerySource::Cache);
        assert_eq!(second.sql, first.sql);
        assert_eq!(generator.calls(), 1);

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, params)| params == &vec![serde_json::json!(42)]));
    }

    #[tokio::test]
    async fn test_disallowed_column_from_generator_is_rejected() {
        let generator =
            StubGenerator::new(Behavior::Respond("SELECT email, password FROM customers"));
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(Some(generator), executor.clone());

        let err = gw
            .submit_request(&Identity::new("7"), "customer login details")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationRejected(ref r) if r == "Column password not in whitelist"));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_with_retry_hint() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway_with(
            None,
            executor.clone(),
            RateLimitConfig {
                max_requests_per_minute: 2,
                max_requests_per_hour: 10,
            },
        );
        let id = Identity::new("42");

        gw.submit_request(&id, "my orders").await.unwrap();
        gw.submit_request(&id, "my orders").await.unwrap();
        let err = gw.submit_request(&id, "my orders").await.unwrap_err();

        match err {
            AppError::RateLimited {
                retry_after_seconds,
            } => assert!(retry_after_seconds > 0),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_without_generator_unmatched_requests_use_default() {
        let executor = Arc::new(RecordingExecutor::default());
        let gw = gateway(None, executor.clone());

        let response = gw
            .submit_request(&Identity::new("user-9"), "anything interesting?")
            .await
            .unwrap();
        assert_eq!(response.source, QuerySource::Fallback);
        assert_eq!(
            executor.calls(),
            vec![(DEFAULT_ORDERS_SQL.to_string(), vec![serde_json::json!("user-9")])]
        );
    }

    #[tokio::test]
    async fn test_execution_error_is_surfaced() {
        let executor = RecordingExecutor::failing();
        let gw = gateway(None, executor.clone());

        let err = gw
            .submit_request(&Identity::new("42"), "my orders")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExecutionError(_)));
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_maintenance_sweeps_expired_entries() {
        let cache = Arc::new(ResponseCache::new(&CacheConfig {
            ttl_secs: 1,
            sweep_interval_secs: 1,
            ..Default::default()
        }));
        let gw = GatewayUseCase::new(
            Arc::new(RateLimiter::new()),
            cache.clone(),
            None,
            Arc::new(RecordingExecutor::default()),
            Arc::new(WhitelistSchema::default()),
        );
        let id = Identity::new("42");
        gw.submit_request(&id, "my orders").await.unwrap();
        assert_eq!(cache.len().await, 1);

        let handle = gw.start_maintenance();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(cache.len().await, 0);
        assert!(!handle.is_finished());

        handle.stop().await;
    }
}
