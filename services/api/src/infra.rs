use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use shift_cover::workflows::coverage::{
    ContactAddress, NotificationTransport, TransportError, TransportReceipt, UserRole,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Transport that writes outbound messages to the log instead of an SMS or e-mail vendor.
#[derive(Debug, Default)]
pub(crate) struct LoggingTransport {
    sent: AtomicU64,
}

impl LoggingTransport {
    pub(crate) fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl NotificationTransport for LoggingTransport {
    fn send(&self, to: &ContactAddress, body: &str) -> Result<TransportReceipt, TransportError> {
        let sequence = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(channel = ?to.channel, address = %to.address, body, "outbound message");
        Ok(TransportReceipt {
            external_id: format!("log-{sequence:06}"),
        })
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Midday UTC on `date`, used as the ranking clock for CLI runs.
pub(crate) fn noon_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

pub(crate) fn parse_role(raw: &str) -> Result<UserRole, String> {
    UserRole::parse(raw).ok_or_else(|| format!("'{raw}' is not one of staff, manager, admin"))
}
