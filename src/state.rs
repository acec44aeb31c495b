//! # Application State Management
//!
//! Shared state accessed by every HTTP handler and every call actor.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers and call actors hold a reference
//! - **RwLock**: metrics are read by the health endpoints and written on every request
//!
//! Per-call state is NOT kept here: each call's bridge is owned by its
//! stream actor. The only cross-call data are counters and the shared
//! collaborator clients in [`BridgeServices`].

use crate::bridge::setup::BridgeServices;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup; never changes while running
    pub config: Arc<AppConfig>,

    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Collaborators shared by every call
    pub services: Arc<BridgeServices>,

    /// Whether a real memory service is configured (reported by health)
    pub memory_enabled: bool,

    pub start_time: Instant,
}

/// Counters collected across all requests and calls.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,

    /// Calls with an open media stream right now
    pub active_calls: u32,

    /// Media streams accepted since start
    pub total_calls: u64,

    /// Media streams refused because capacity was reached
    pub rejected_calls: u64,

    /// Key: route pattern with method (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// A reserved call slot, held by the call's stream actor.
pub struct CallSlot {
    state: AppState,
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        self.state.release_call();
    }
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, services: Arc<BridgeServices>, memory_enabled: bool) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            services,
            memory_enabled,
            start_time: Instant::now(),
        }
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a call slot. Returns `false` when `max_concurrent_calls` are active.
    ///
    /// Check and increment happen under one write lock so two streams can
    /// never both take the last slot.
    pub fn try_acquire_call(&self) -> bool {
        let mut metrics = self.write_metrics();
        if metrics.active_calls as usize >= self.config.performance.max_concurrent_calls {
            metrics.rejected_calls += 1;
            return false;
        }
        metrics.active_calls += 1;
        metrics.total_calls += 1;
        true
    }

    /// Release a slot taken by `try_acquire_call`.
    pub fn release_call(&self) {
        let mut metrics = self.write_metrics();
        if metrics.active_calls > 0 {
            metrics.active_calls -= 1;
        }
    }

    /// Like `try_acquire_call`, but the slot is released when the guard drops.
    pub fn acquire_call_slot(&self) -> Option<CallSlot> {
        if self.try_acquire_call() {
            Some(CallSlot { state: self.clone() })
        } else {
            None
        }
    }

    pub fn active_calls(&self) -> u32 {
        self.read_metrics().active_calls
    }

    /// Snapshot so the lock isn't held while serializing responses.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.read_metrics();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_calls: metrics.active_calls,
            total_calls: metrics.total_calls,
            rejected_calls: metrics.rejected_calls,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builds an `AppState` wired to in-memory fakes.

    use super::*;
    use crate::ai::session::testing::FakeConnector;
    use crate::bridge::setup::testing::services;
    use crate::memory::testing::FakeMemoryStore;

    pub fn test_state(config: AppConfig) -> AppState {
        let services = services(
            Arc::new(FakeMemoryStore::default()),
            Arc::new(FakeConnector::default()),
        );
        AppState::new(config, services, false)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::test_state;
    use super::*;

    #[test]
    fn test_call_capacity() {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_calls = 2;
        let state = test_state(config);

        assert!(state.try_acquire_call());
        assert!(state.try_acquire_call());
        assert!(!state.try_acquire_call());
        assert_eq!(state.active_calls(), 2);

        state.release_call();
        assert!(state.try_acquire_call());

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.rejected_calls, 1);
    }

    #[test]
    fn test_call_slot_released_on_drop() {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_calls = 1;
        let state = test_state(config);

        let slot = state.acquire_call_slot();
        assert!(slot.is_some());
        assert!(state.acquire_call_slot().is_none());
        assert_eq!(state.active_calls(), 1);

        drop(slot);
        assert_eq!(state.active_calls(), 0);
        assert!(state.acquire_call_slot().is_some());
        assert_eq!(state.active_calls(), 0);
    }

    #[test]
    fn test_release_never_underflows() {
        let state = test_state(AppConfig::default());
        state.release_call();
        assert_eq!(state.active_calls(), 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = test_state(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
