//! In-process metrics for AI-backed operations
//!
//! Tracks per-tool performance (response times, error rates, cache hit
//! rates) and raises threshold alerts. Standalone by design: neither the
//! cache nor the orchestrator depends on it — the caller that composes
//! them records events around each call.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Kind of a recorded metric event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    ApiCall,
    CacheHit,
    CacheMiss,
    Error,
    ToolInvoked,
}

/// One recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Unique event id
    pub id: Uuid,
    /// Event kind
    pub kind: MetricKind,
    /// Tool the event concerns
    pub tool: String,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Call duration, for api-call events
    pub duration_ms: Option<u64>,
    /// Whether the underlying operation succeeded
    pub success: bool,
    /// Free-form detail, e.g. an error message
    pub detail: Option<String>,
}

/// Aggregated metrics for one tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub tool_name: String,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub average_response_ms: f64,
    pub p95_response_ms: u64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    pub last_used: DateTime<Utc>,
}

/// Aggregated metrics across all tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_api_calls: u64,
    pub total_errors: u64,
    pub overall_cache_hit_rate: f64,
    pub average_response_ms: f64,
    pub active_tools: usize,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// What a performance alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    HighErrorRate,
    SlowResponse,
}

/// A threshold crossing observed while recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub tool: String,
    pub message: String,
    pub threshold: f64,
    pub current_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Thresholds that trigger performance alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    pub response_time_warning_ms: u64,
    pub response_time_critical_ms: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate_warning: 0.05,
            error_rate_critical: 0.15,
            response_time_warning_ms: 2_000,
            response_time_critical_ms: 5_000,
        }
    }
}

/// Collector configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Record nothing when false
    pub enabled: bool,
    /// Maximum retained events
    pub event_capacity: usize,
    /// Response-time window per tool, used for percentile calculations
    pub response_window: usize,
    /// Maximum retained alerts
    pub alert_capacity: usize,
    /// Alert thresholds
    pub thresholds: AlertThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_capacity: 5_000,
            response_window: 1_000,
            alert_capacity: 100,
            thresholds: AlertThresholds::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ToolAccumulator {
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    total_duration_ms: u64,
    response_times: VecDeque<u64>,
    cache_hits: u64,
    cache_misses: u64,
    last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    events: VecDeque<MetricEvent>,
    tools: HashMap<String, ToolAccumulator>,
    alerts: VecDeque<PerformanceAlert>,
}

/// Collects and aggregates metric events
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    period_start: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl MetricsCollector {
    /// Create a collector with the given configuration
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            period_start: Utc::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create a collector with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default())
    }

    /// Record a completed call to a tool
    pub fn record_api_call(&self, tool: &str, duration_ms: u64, success: bool) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        self.push_event(
            &mut inner,
            MetricKind::ApiCall,
            tool,
            Some(duration_ms),
            success,
            None,
        );

        let window = self.config.response_window;
        let acc = inner.tools.entry(tool.to_string()).or_default();
        acc.total_calls += 1;
        if success {
            acc.successful_calls += 1;
        } else {
            acc.failed_calls += 1;
        }
        acc.total_duration_ms += duration_ms;
        acc.response_times.push_back(duration_ms);
        while acc.response_times.len() > window {
            acc.response_times.pop_front();
        }
        acc.last_used = Some(Utc::now());

        let error_rate = acc.failed_calls as f64 / acc.total_calls as f64;
        let sample = acc.total_calls;
        drop(inner);

        self.check_response_time(tool, duration_ms);
        // Rate alerts need a minimal sample before they mean anything
        if sample >= 20 {
            self.check_error_rate(tool, error_rate);
        }
    }

    /// Record a cache hit or miss attributed to a tool
    pub fn record_cache_event(&self, tool: &str, hit: bool) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        let kind = if hit {
            MetricKind::CacheHit
        } else {
            MetricKind::CacheMiss
        };
        self.push_event(&mut inner, kind, tool, None, true, None);
        let acc = inner.tools.entry(tool.to_string()).or_default();
        if hit {
            acc.cache_hits += 1;
        } else {
            acc.cache_misses += 1;
        }
    }

    /// Record an error attributed to a tool
    pub fn record_error(&self, tool: &str, message: impl Into<String>) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        self.push_event(
            &mut inner,
            MetricKind::Error,
            tool,
            None,
            false,
            Some(message.into()),
        );
    }

    /// Record a tool invocation without timing information
    pub fn record_tool_invoked(&self, tool: &str) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        self.push_event(&mut inner, MetricKind::ToolInvoked, tool, None, true, None);
        let acc = inner.tools.entry(tool.to_string()).or_default();
        acc.last_used = Some(Utc::now());
    }

    /// Aggregated metrics for one tool, if it was ever recorded
    pub fn tool_metrics(&self, tool: &str) -> Option<ToolMetrics> {
        let inner = self.inner.lock();
        let acc = inner.tools.get(tool)?;
        Some(Self::aggregate(tool, acc))
    }

    /// Aggregated metrics for every recorded tool
    pub fn all_tool_metrics(&self) -> Vec<ToolMetrics> {
        let inner = self.inner.lock();
        inner
            .tools
            .iter()
            .map(|(name, acc)| Self::aggregate(name, acc))
            .collect()
    }

    /// Aggregated metrics across all tools
    pub fn system_metrics(&self) -> SystemMetrics {
        let inner = self.inner.lock();
        let total_api_calls: u64 = inner.tools.values().map(|acc| acc.total_calls).sum();
        let total_errors: u64 = inner.tools.values().map(|acc| acc.failed_calls).sum();
        let total_duration: u64 = inner.tools.values().map(|acc| acc.total_duration_ms).sum();
        let hits: u64 = inner.tools.values().map(|acc| acc.cache_hits).sum();
        let misses: u64 = inner.tools.values().map(|acc| acc.cache_misses).sum();
        SystemMetrics {
            total_api_calls,
            total_errors,
            overall_cache_hit_rate: ratio(hits, hits + misses),
            average_response_ms: if total_api_calls == 0 {
                0.0
            } else {
                total_duration as f64 / total_api_calls as f64
            },
            active_tools: inner.tools.len(),
            period_start: self.period_start,
            period_end: Utc::now(),
        }
    }

    /// Most recent events, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<MetricEvent> {
        let inner = self.inner.lock();
        inner.events.iter().rev().take(limit).cloned().collect()
    }

    /// Alerts raised so far, oldest first
    pub fn alerts(&self) -> Vec<PerformanceAlert> {
        self.inner.lock().alerts.iter().cloned().collect()
    }

    /// Drop all events, aggregates, and alerts
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::default();
    }

    fn aggregate(name: &str, acc: &ToolAccumulator) -> ToolMetrics {
        let mut sorted: Vec<u64> = acc.response_times.iter().copied().collect();
        sorted.sort_unstable();
        ToolMetrics {
            tool_name: name.to_string(),
            total_calls: acc.total_calls,
            successful_calls: acc.successful_calls,
            failed_calls: acc.failed_calls,
            average_response_ms: if acc.total_calls == 0 {
                0.0
            } else {
                acc.total_duration_ms as f64 / acc.total_calls as f64
            },
            p95_response_ms: percentile(&sorted, 0.95),
            cache_hit_rate: ratio(acc.cache_hits, acc.cache_hits + acc.cache_misses),
            error_rate: ratio(acc.failed_calls, acc.total_calls),
            last_used: acc.last_used.unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    fn push_event(
        &self,
        inner: &mut Inner,
        kind: MetricKind,
        tool: &str,
        duration_ms: Option<u64>,
        success: bool,
        detail: Option<String>,
    ) {
        inner.events.push_back(MetricEvent {
            id: Uuid::new_v4(),
            kind,
            tool: tool.to_string(),
            timestamp: Utc::now(),
            duration_ms,
            success,
            detail,
        });
        while inner.events.len() > self.config.event_capacity {
            inner.events.pop_front();
        }
    }

    fn check_response_time(&self, tool: &str, duration_ms: u64) {
        let thresholds = &self.config.thresholds;
        let (severity, threshold) = if duration_ms >= thresholds.response_time_critical_ms {
            (AlertSeverity::Critical, thresholds.response_time_critical_ms)
        } else if duration_ms >= thresholds.response_time_warning_ms {
            (AlertSeverity::Warning, thresholds.response_time_warning_ms)
        } else {
            return;
        };
        self.raise_alert(PerformanceAlert {
            id: Uuid::new_v4(),
            kind: AlertKind::SlowResponse,
            severity,
            tool: tool.to_string(),
            message: format!("slow response from '{tool}': {duration_ms} ms"),
            threshold: threshold as f64,
            current_value: duration_ms as f64,
            timestamp: Utc::now(),
        });
    }

    fn check_error_rate(&self, tool: &str, error_rate: f64) {
        let thresholds = &self.config.thresholds;
        let (severity, threshold) = if error_rate >= thresholds.error_rate_critical {
            (AlertSeverity::Critical, thresholds.error_rate_critical)
        } else if error_rate >= thresholds.error_rate_warning {
            (AlertSeverity::Warning, thresholds.error_rate_warning)
        } else {
            return;
        };
        self.raise_alert(PerformanceAlert {
            id: Uuid::new_v4(),
            kind: AlertKind::HighErrorRate,
            severity,
            tool: tool.to_string(),
            message: format!("high error rate for '{tool}': {:.1}%", error_rate * 100.0),
            threshold,
            current_value: error_rate,
            timestamp: Utc::now(),
        });
    }

    fn raise_alert(&self, alert: PerformanceAlert) {
        let mut inner = self.inner.lock();
        inner.alerts.push_back(alert);
        while inner.alerts.len() > self.config.alert_capacity {
            inner.alerts.pop_front();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * pct).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
