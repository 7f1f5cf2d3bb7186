// 🧭 Normalization Service
// Canonical operations over whichever backend serves an entity type:
// resolve the backend, call it under the resilience policy, convert.

use crate::adapter::{Adapter, FetchRequest, SendOperation};
use crate::config::{AdapterRouting, Settings};
use crate::converter::EntityConverter;
use crate::error::{NormalizeError, Result};
use crate::filters::StandardFilters;
use crate::registry::ConverterRegistry;
use crate::resilience::ResiliencePolicy;
use crate::schema::{EntityType, RawRecord, StandardRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// One page of canonical search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    /// Matches across all pages
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub records: Vec<StandardRecord>,
}

/// Converter and adapter resolved for one request.
struct Target {
    entity_type: EntityType,
    source_system: String,
    converter: Arc<dyn EntityConverter>,
    adapter: Arc<dyn Adapter>,
}

#[derive(Clone)]
pub struct NormalizationService {
    registry: Arc<ConverterRegistry>,
    adapters: Arc<HashMap<String, Arc<dyn Adapter>>>,
    routing: AdapterRouting,
    policy: ResiliencePolicy,
    source_policies: Arc<HashMap<String, ResiliencePolicy>>,
    request_timeout: Option<Duration>,
}

impl NormalizationService {
    pub fn builder(registry: Arc<ConverterRegistry>) -> NormalizationServiceBuilder {
        NormalizationServiceBuilder::new(registry)
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn routing(&self) -> &AdapterRouting {
        &self.routing
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    pub async fn get(&self, entity_type: &str, id: &str, source: Option<&str>) -> Result<StandardRecord> {
        let target = self.target(entity_type, source)?;
        let span = request_span("get", &target);

        traced(span, async {
            let request = FetchRequest::ById(id.to_string());
            let (adapter, request_ref) = (&target.adapter, &request);
            let fetched = self
                .call(&target, "fetch", move || adapter.fetch(target.entity_type, request_ref))
                .await?;

            let raw = fetched.into_one(&target.source_system, target.entity_type, id)?;
            let record = target.converter.external_to_standard(&target.source_system, &raw)?;
            info!(id, "Record retrieved");
            Ok(record)
        })
        .await
    }

    /// Search with canonical filters. `page` is 1-based; zero values are
    /// treated as 1.
    pub async fn search(
        &self,
        entity_type: &str,
        filters: &StandardFilters,
        page: usize,
        page_size: usize,
        source: Option<&str>,
    ) -> Result<RecordPage> {
        let target = self.target(entity_type, source)?;
        let span = request_span("search", &target);
        let (page, page_size) = (page.max(1), page_size.max(1));

        traced(span, async {
            let external = target
                .converter
                .convert_filters(&target.source_system, target.entity_type, filters)?;
            let request = FetchRequest::Search {
                filters: external,
                page,
                page_size,
            };
            let (adapter, request_ref) = (&target.adapter, &request);
            let fetched = self
                .call(&target, "search", move || adapter.fetch(target.entity_type, request_ref))
                .await?;

            let (total, raw_records) = fetched.into_page();
            let records = raw_records
                .iter()
                .map(|raw| target.converter.external_to_standard(&target.source_system, raw))
                .collect::<Result<Vec<_>>>()?;

            info!(total, returned = records.len(), "Search completed");
            Ok(RecordPage {
                total,
                page,
                page_size,
                records,
            })
        })
        .await
    }

    pub async fn create(&self, entity_type: &str, record: &StandardRecord, source: Option<&str>) -> Result<StandardRecord> {
        let target = self.target(entity_type, source)?;
        let span = request_span("create", &target);

        traced(span, async {
            let payload = target.converter.standard_to_external(&target.source_system, record)?;
            let created = self.send(&target, SendOperation::Create, payload).await?;
            let record = target.converter.external_to_standard(&target.source_system, &created)?;
            info!(id = record.id().unwrap_or_default(), "Record created");
            Ok(record)
        })
        .await
    }

    pub async fn update(
        &self,
        entity_type: &str,
        id: &str,
        record: &StandardRecord,
        source: Option<&str>,
    ) -> Result<StandardRecord> {
        let target = self.target(entity_type, source)?;
        let span = request_span("update", &target);

        traced(span, async {
            let payload = target.converter.standard_to_external(&target.source_system, record)?;
            let operation = SendOperation::Update { id: id.to_string() };
            let updated = self.send(&target, operation, payload).await?;
            let record = target.converter.external_to_standard(&target.source_system, &updated)?;
            info!(id, "Record updated");
            Ok(record)
        })
        .await
    }

    pub async fn delete(&self, entity_type: &str, id: &str, source: Option<&str>) -> Result<()> {
        let target = self.target(entity_type, source)?;
        let span = request_span("delete", &target);

        traced(span, async {
            let operation = SendOperation::Delete { id: id.to_string() };
            self.send(&target, operation, Default::default()).await?;
            info!(id, "Record deleted");
            Ok(())
        })
        .await
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    fn target(&self, entity_type: &str, source: Option<&str>) -> Result<Target> {
        let converter = self.registry.get_converter(entity_type)?;
        let entity_type = converter.entity_type();
        let source_system = self.routing.resolve(entity_type, source).to_string();

        let unknown = || NormalizeError::UnknownSourceSystem {
            entity_type: entity_type.to_string(),
            source_system: source_system.clone(),
        };
        if converter.field_mapping(&source_system).is_none() {
            return Err(unknown());
        }
        let adapter = self.adapters.get(&source_system).cloned().ok_or_else(unknown)?;

        Ok(Target {
            entity_type,
            source_system,
            converter,
            adapter,
        })
    }

    fn policy_for(&self, source_system: &str) -> &ResiliencePolicy {
        self.source_policies.get(source_system).unwrap_or(&self.policy)
    }

    /// Backend call under the source's policy and the request deadline.
    async fn call<F, Fut, T>(&self, target: &Target, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.policy_for(&target.source_system)
            .execute_with_timeout(operation, self.request_timeout, f)
            .await
    }

    async fn send(&self, target: &Target, operation: SendOperation, payload: RawRecord) -> Result<RawRecord> {
        let (adapter, operation_ref, payload_ref) = (&target.adapter, &operation, &payload);
        self.call(target, operation.as_str(), move || {
            adapter.send(target.entity_type, operation_ref, payload_ref.clone())
        })
        .await
    }
}

fn request_span(operation: &'static str, target: &Target) -> Span {
    info_span!(
        "request",
        operation,
        request_id = %Uuid::new_v4(),
        entity_type = %target.entity_type,
        source_system = %target.source_system,
    )
}

async fn traced<T, Fut>(span: Span, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    async move {
        let result = fut.await;
        if let Err(error) = &result {
            warn!(kind = %error.root_kind(), error = %error, "Request failed");
        }
        result
    }
    .instrument(span)
    .await
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct NormalizationServiceBuilder {
    registry: Arc<ConverterRegistry>,
    adapters: HashMap<String, Arc<dyn Adapter>>,
    routing: AdapterRouting,
    policy: ResiliencePolicy,
    source_policies: HashMap<String, ResiliencePolicy>,
    request_timeout: Option<Duration>,
}

impl NormalizationServiceBuilder {
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        NormalizationServiceBuilder {
            registry,
            adapters: HashMap::new(),
            routing: AdapterRouting::default(),
            policy: ResiliencePolicy::default(),
            source_policies: HashMap::new(),
            request_timeout: None,
        }
    }

    /// Apply routing, retry policy and deadline from settings.
    pub fn settings(mut self, settings: &Settings) -> Result<Self> {
        self.routing = settings.routing.clone();
        self.policy = ResiliencePolicy::new(settings.retry.clone())?;
        self.request_timeout = settings.request_timeout;
        Ok(self)
    }

    /// Register the adapter of its source system.
    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.insert(adapter.source_system().to_string(), adapter);
        self
    }

    pub fn routing(mut self, routing: AdapterRouting) -> Self {
        self.routing = routing;
        self
    }

    pub fn policy(mut self, policy: ResiliencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the policy for one backend.
    pub fn source_policy(mut self, source_system: impl Into<String>, policy: ResiliencePolicy) -> Self {
        self.source_policies.insert(source_system.into(), policy);
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> NormalizationService {
        NormalizationService {
            registry: self.registry,
            adapters: Arc::new(self.adapters),
            routing: self.routing,
            policy: self.policy,
            source_policies: Arc::new(self.source_policies),
            request_timeout: self.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Fetched, InMemoryAdapter};
    use crate::error::ErrorKind;
    use crate::filters::FilterOp;
    use crate::mapping::{CLOUD_ERP, ERP_NEXT};
    use crate::resilience::RetryConfig;
    use crate::schema::Customer;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that throttles the first `failures` fetches.
    struct ThrottledAdapter {
        inner: InMemoryAdapter,
        failures: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Adapter for ThrottledAdapter {
        fn source_system(&self) -> &str {
            self.inner.source_system()
        }

        async fn fetch(&self, entity_type: EntityType, request: &FetchRequest) -> Result<Fetched> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(NormalizeError::RateLimited {
                    source_system: self.source_system().to_string(),
                    entity_type,
                    retry_after: None,
                });
            }
            self.inner.fetch(entity_type, request).await
        }

        async fn send(&self, entity_type: EntityType, operation: &SendOperation, payload: RawRecord) -> Result<RawRecord> {
            self.inner.send(entity_type, operation, payload).await
        }
    }

    fn registry() -> Arc<ConverterRegistry> {
        Arc::new(ConverterRegistry::new().unwrap())
    }

    fn erp_next_backend(registry: &ConverterRegistry) -> InMemoryAdapter {
        InMemoryAdapter::from_fixture(
            ERP_NEXT,
            &json!({
                "customer": [
                    {"name": "CUST-1", "customer_name": "Acme", "credit_limit": 1000, "city": "Lyon"},
                    {"name": "CUST-2", "customer_name": "Globex", "credit_limit": 5000},
                    {"name": "CUST-3", "customer_name": "Acme Europe", "credit_limit": 2500},
                    {"customer_name": "No Identifier"}
                ],
                "invoice": [
                    {"name": "SINV-1", "customer": "CUST-1", "grand_total": 10}
                ]
            }),
        )
        .unwrap()
        .with_id_fields_from(registry)
    }

    fn cloud_backend(registry: &ConverterRegistry) -> InMemoryAdapter {
        InMemoryAdapter::from_fixture(
            CLOUD_ERP,
            &json!({
                "invoice": [
                    {"invoice_id": "inv-1", "invoice_number": "2024-0001", "total_amount": 99.5}
                ]
            }),
        )
        .unwrap()
        .with_id_fields_from(registry)
    }

    fn fast_policy(attempts: u32) -> ResiliencePolicy {
        ResiliencePolicy::new(
            RetryConfig::default()
                .with_max_attempts(attempts)
                .with_waits(Duration::from_millis(100), Duration::from_secs(1))
                .with_rate_limit_min_wait(Duration::from_millis(100)),
        )
        .unwrap()
    }

    fn service() -> NormalizationService {
        let registry = registry();
        NormalizationService::builder(registry.clone())
            .adapter(Arc::new(erp_next_backend(&registry)))
            .adapter(Arc::new(cloud_backend(&registry)))
            .routing(AdapterRouting::new(ERP_NEXT).with_override(EntityType::Invoice, CLOUD_ERP))
            .policy(fast_policy(3))
            .build()
    }

    #[tokio::test]
    async fn test_get_converts_backend_record() {
        let record = service().get("customer", "CUST-1", None).await.unwrap();

        match record {
            StandardRecord::Customer(c) => {
                assert_eq!(c.name.as_deref(), Some("Acme"));
                assert_eq!(c.contact_info.address.unwrap().city.as_deref(), Some("Lyon"));
                assert_eq!(c.metadata.unwrap().source_system(), ERP_NEXT);
            }
            other => panic!("expected customer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_routing_override_and_explicit_source() {
        let service = service();

        let invoice = service.get("invoice", "inv-1", None).await.unwrap();
        assert_eq!(invoice.metadata().unwrap().source_system(), CLOUD_ERP);

        let invoice = service.get("invoice", "SINV-1", Some(ERP_NEXT)).await.unwrap();
        assert_eq!(invoice.metadata().unwrap().source_system(), ERP_NEXT);
    }

    #[tokio::test]
    async fn test_unknown_entity_and_source() {
        let service = service();

        let err = service.get("nonexistent", "1", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEntity);

        let err = service.get("customer", "1", Some("sap")).await.unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownSourceSystem { ref source_system, .. } if source_system == "sap"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let err = service().get("customer", "CUST-404", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_search_with_filters() {
        let filters = StandardFilters::new()
            .op("name", FilterOp::Like, "acme%")
            .op("credit_limit", FilterOp::Gte, 2000);
        let page = service().search("customer", &filters, 1, 10, None).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].id(), Some("CUST-3"));
    }

    #[tokio::test]
    async fn test_search_fails_on_record_without_identifier() {
        let filters = StandardFilters::new().eq("name", "No Identifier");
        let err = service().search("customer", &filters, 1, 10, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[tokio::test]
    async fn test_unmapped_filter_is_rejected_before_backend_call() {
        let filters = StandardFilters::new().eq("shoe_size", 42);
        let err = service().search("customer", &filters, 1, 10, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[tokio::test]
    async fn test_create_update_delete_through_canonical_records() {
        let service = service();
        let new_customer = StandardRecord::Customer(Customer {
            name: Some("Initech".to_string()),
            credit_limit: Some(300.0),
            ..Default::default()
        });

        let created = service.create("customer", &new_customer, None).await.unwrap();
        let id = created.id().unwrap().to_string();
        assert_eq!(created.metadata().unwrap().raw_data().get("doctype"), Some(&json!("Customer")));

        let patch = StandardRecord::Customer(Customer {
            credit_limit: Some(900.0),
            ..Default::default()
        });
        let updated = service.update("customer", &id, &patch, None).await.unwrap();
        match updated {
            StandardRecord::Customer(c) => {
                assert_eq!(c.name.as_deref(), Some("Initech"));
                assert_eq!(c.credit_limit, Some(900.0));
            }
            other => panic!("expected customer, got {:?}", other),
        }

        service.delete("customer", &id, None).await.unwrap();
        let err = service.get("customer", &id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_backend_is_retried() {
        let registry = registry();
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = ThrottledAdapter {
            inner: erp_next_backend(&registry),
            failures: AtomicU32::new(2),
            calls: calls.clone(),
        };
        let service = NormalizationService::builder(registry)
            .adapter(Arc::new(adapter))
            .policy(fast_policy(3))
            .build();

        let record = service.get("customer", "CUST-2", None).await.unwrap();
        assert_eq!(record.id(), Some("CUST-2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_throttling_exhausts_retries() {
        let registry = registry();
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = ThrottledAdapter {
            inner: erp_next_backend(&registry),
            failures: AtomicU32::new(u32::MAX),
            calls: calls.clone(),
        };
        let service = NormalizationService::builder(registry)
            .adapter(Arc::new(adapter))
            .policy(fast_policy(3))
            .build();

        let err = service.get("customer", "CUST-2", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert_eq!(err.root_kind(), ErrorKind::RateLimit);
        assert_eq!(err.source_system(), Some(ERP_NEXT));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_policy_override() {
        let registry = registry();
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = ThrottledAdapter {
            inner: erp_next_backend(&registry),
            failures: AtomicU32::new(u32::MAX),
            calls: calls.clone(),
        };
        let service = NormalizationService::builder(registry)
            .adapter(Arc::new(adapter))
            .policy(fast_policy(3))
            .source_policy(ERP_NEXT, fast_policy(1))
            .build();

        let err = service.get("customer", "CUST-2", None).await.unwrap_err();
        assert_eq!(err.attempts(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_deadline() {
        let registry = registry();
        let adapter = ThrottledAdapter {
            inner: erp_next_backend(&registry),
            failures: AtomicU32::new(u32::MAX),
            calls: Arc::new(AtomicU32::new(0)),
        };
        let service = NormalizationService::builder(registry)
            .adapter(Arc::new(adapter))
            .policy(
                ResiliencePolicy::new(
                    RetryConfig::default()
                        .with_max_attempts(10)
                        .with_waits(Duration::from_secs(5), Duration::from_secs(5))
                        .with_rate_limit_min_wait(Duration::from_secs(5)),
                )
                .unwrap(),
            )
            .request_timeout(Some(Duration::from_secs(12)))
            .build();

        let err = service.get("customer", "CUST-2", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.attempts(), Some(3));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_service() {
        let service = service();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = service.clone();
                let id = if i % 2 == 0 { "CUST-1" } else { "CUST-2" };
                tokio::spawn(async move { service.get("customer", id, None).await })
            })
            .collect();

        for handle in handles {
            let record = handle.await.unwrap().unwrap();
            assert!(matches!(record.id(), Some("CUST-1") | Some("CUST-2")));
        }
    }
}
