//! Test doubles and common utilities for architecture contract tests
//!
//! Each double keeps its state behind `Arc`s so a test can hand one copy to
//! the engine and keep a `handle()` to inspect calls afterwards.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tunnelsync_core::error::{Error, Result};
use tunnelsync_core::model::{
    CurrentDnsRecord, DesiredRecord, IngressRule, RecordType, RouterRecord, Zone,
};
use tunnelsync_core::traits::{DnsProvider, RouterSource, TunnelProvider};
use tunnelsync_core::{RetryConfig, SyncConfig};

pub const TUNNEL_ID: &str = "abc123";
pub const SERVICE_ENDPOINT: &str = "http://192.168.1.10:8080";

/// Configuration with millisecond retries and a one second poll interval
pub fn minimal_config() -> SyncConfig {
    let mut config = SyncConfig::new(TUNNEL_ID, SERVICE_ENDPOINT);
    config.engine.poll_interval_secs = 1;
    config.engine.poll_jitter_secs = 0;
    config.engine.failure_backoff_max_secs = 1;
    config.retry = RetryConfig {
        base_delay_ms: 1,
        max_delay_ms: 4,
        max_attempts: 3,
        jitter_factor: 0.0,
    };
    config
}

pub fn router(name: &str, rule: &str, entrypoints: &[&str], tls: bool) -> RouterRecord {
    RouterRecord::new(name, rule, entrypoints.iter().copied(), tls)
}

/// A router source returning a fixed, replaceable list
#[derive(Clone)]
pub struct MockRouterSource {
    routers: Arc<Mutex<Vec<RouterRecord>>>,
    unavailable: Arc<AtomicBool>,
    call_count: Arc<AtomicUsize>,
}

impl MockRouterSource {
    pub fn new(routers: Vec<RouterRecord>) -> Self {
        Self {
            routers: Arc::new(Mutex::new(routers)),
            unavailable: Arc::new(AtomicBool::new(false)),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Another handle onto the same state
    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn set_routers(&self, routers: Vec<RouterRecord>) {
        *self.routers.lock().unwrap() = routers;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RouterSource for MockRouterSource {
    async fn routers(&self) -> Result<Vec<RouterRecord>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::discovery("connection refused"));
        }
        Ok(self.routers.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "mock"
    }
}

/// An in-memory tunnel that counts reads and replaces
#[derive(Clone)]
pub struct MockTunnelProvider {
    ingress: Arc<Mutex<Vec<IngressRule>>>,
    get_count: Arc<AtomicUsize>,
    put_count: Arc<AtomicUsize>,
    /// Remaining put attempts that fail with a transient error
    transient_put_failures: Arc<AtomicUsize>,
    reject_puts: Arc<AtomicBool>,
}

impl MockTunnelProvider {
    pub fn new(ingress: Vec<IngressRule>) -> Self {
        Self {
            ingress: Arc::new(Mutex::new(ingress)),
            get_count: Arc::new(AtomicUsize::new(0)),
            put_count: Arc::new(AtomicUsize::new(0)),
            transient_put_failures: Arc::new(AtomicUsize::new(0)),
            reject_puts: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn ingress(&self) -> Vec<IngressRule> {
        self.ingress.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    /// Number of put attempts, failed ones included
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn fail_puts_transiently(&self, times: usize) {
        self.transient_put_failures.store(times, Ordering::SeqCst);
    }

    pub fn reject_puts(&self) {
        self.reject_puts.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TunnelProvider for MockTunnelProvider {
    async fn get_ingress(&self) -> Result<Vec<IngressRule>> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.ingress.lock().unwrap().clone())
    }

    async fn put_ingress(&self, rules: &[IngressRule]) -> Result<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.reject_puts.load(Ordering::SeqCst) {
            return Err(Error::rejected("mock-tunnel", Some(400), "invalid ingress"));
        }
        let remaining = self.transient_put_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_put_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::transient("mock-tunnel", "503 Service Unavailable"));
        }
        *self.ingress.lock().unwrap() = rules.to_vec();
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock-tunnel"
    }
}

/// An in-memory DNS zone set that counts mutations
///
/// It has no delete operation at all; tests assert that stray records
/// survive untouched.
#[derive(Clone)]
pub struct MockDnsProvider {
    zones: Vec<Zone>,
    records: Arc<Mutex<Vec<CurrentDnsRecord>>>,
    next_id: Arc<AtomicUsize>,
    create_count: Arc<AtomicUsize>,
    update_count: Arc<AtomicUsize>,
    rejected_hosts: Arc<Mutex<HashSet<String>>>,
    /// Remaining create attempts that fail with a transient error
    transient_create_failures: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    pub fn new(zone_names: &[&str]) -> Self {
        Self {
            zones: zone_names
                .iter()
                .enumerate()
                .map(|(i, name)| Zone {
                    id: format!("zone-{}", i),
                    name: name.to_string(),
                })
                .collect(),
            records: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            create_count: Arc::new(AtomicUsize::new(0)),
            update_count: Arc::new(AtomicUsize::new(0)),
            rejected_hosts: Arc::new(Mutex::new(HashSet::new())),
            transient_create_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Seed a pre-existing record
    pub fn seed(&self, name: &str, record_type: RecordType, content: &str, proxied: bool) {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().push(CurrentDnsRecord {
            id,
            name: name.to_string(),
            record_type,
            content: content.to_string(),
            proxied,
            ttl: Some(300),
        });
    }

    pub fn records(&self) -> Vec<CurrentDnsRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record(&self, name: &str) -> Option<CurrentDnsRecord> {
        self.records().into_iter().find(|r| r.name == name)
    }

    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    pub fn mutation_count(&self) -> usize {
        self.create_count() + self.update_count()
    }

    /// Make every create/update for `hostname` fail with a 400
    pub fn reject_host(&self, hostname: &str) {
        self.rejected_hosts.lock().unwrap().insert(hostname.to_string());
    }

    pub fn fail_creates_transiently(&self, times: usize) {
        self.transient_create_failures.store(times, Ordering::SeqCst);
    }

    fn check_rejected(&self, hostname: &str) -> Result<()> {
        if self.rejected_hosts.lock().unwrap().contains(hostname) {
            return Err(Error::rejected("mock-dns", Some(400), "Content for A record is invalid"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        Ok(self.zones.clone())
    }

    async fn find_records(&self, _zone: &Zone, hostname: &str) -> Result<Vec<CurrentDnsRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == hostname)
            .cloned()
            .collect())
    }

    async fn create_record(&self, _zone: &Zone, desired: &DesiredRecord) -> Result<()> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        self.check_rejected(&desired.hostname)?;
        let remaining = self.transient_create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::transient("mock-dns", "429 Too Many Requests"));
        }

        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().push(CurrentDnsRecord {
            id,
            name: desired.hostname.clone(),
            record_type: desired.record_type,
            content: desired.target.clone(),
            proxied: desired.proxied,
            ttl: Some(1),
        });
        Ok(())
    }

    async fn update_record(
        &self,
        _zone: &Zone,
        current: &CurrentDnsRecord,
        desired: &DesiredRecord,
    ) -> Result<()> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        self.check_rejected(&desired.hostname)?;

        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == current.id)
            .ok_or_else(|| Error::rejected("mock-dns", Some(404), "Record not found"))?;
        record.record_type = desired.record_type;
        record.content = desired.target.clone();
        record.proxied = desired.proxied;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock-dns"
    }
}
