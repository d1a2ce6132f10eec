//! Compliance gate: suppression list, per-number rate limit, consent check.
//!
//! Every send passes [`ComplianceGate::check`] first. Suppression and rate
//! limiting are hard stops; missing consent evidence only warns. All
//! rejections are logged under the `compliance` target.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use leadflow_core::{ComplianceReason, EngineError, EngineResult, Lead};

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Verified,
    Unverifiable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRecord {
    pub number: String,
    pub channel: Channel,
    pub reason: String,
    pub suppressed_at: DateTime<Utc>,
}

/// Canonical form of a phone number: digits only, keeping a leading `+`.
pub fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}

/// Suppression list, send log and failure counters.
///
/// Implementations normalize numbers themselves; callers may pass them as
/// entered.
pub trait ComplianceService: Send + Sync {
    fn is_suppressed(&self, number: &str, channel: Channel) -> Result<bool, StoreError>;

    /// `true` while fewer than `max` sends went to `number` in the window
    /// ending at `now`.
    fn check_rate_limit(
        &self,
        number: &str,
        window: Duration,
        max: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn enforce_consent(&self, lead: &Lead, channel: Channel) -> Result<ConsentStatus, StoreError>;

    fn record_send(&self, number: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Count a delivery failure; returns the consecutive failure count.
    fn record_failure(&self, number: &str) -> Result<u32, StoreError>;

    fn reset_failures(&self, number: &str) -> Result<(), StoreError>;

    fn suppress(
        &self,
        number: &str,
        channel: Channel,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Ledger {
    suppressed: HashMap<(String, Channel), SuppressionRecord>,
    sends: HashMap<String, Vec<DateTime<Utc>>>,
    failures: HashMap<String, u32>,
}

/// In-memory compliance service for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryComplianceService {
    ledger: RwLock<Ledger>,
}

impl InMemoryComplianceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppression(&self, number: &str, channel: Channel) -> Option<SuppressionRecord> {
        self.ledger
            .read()
            .ok()?
            .suppressed
            .get(&(normalize_number(number), channel))
            .cloned()
    }
}

impl ComplianceService for InMemoryComplianceService {
    fn is_suppressed(&self, number: &str, channel: Channel) -> Result<bool, StoreError> {
        let ledger = self.ledger.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger
            .suppressed
            .contains_key(&(normalize_number(number), channel)))
    }

    fn check_rate_limit(
        &self,
        number: &str,
        window: Duration,
        max: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let ledger = self.ledger.read().map_err(|_| StoreError::Poisoned)?;
        let since = now - window;
        let recent = ledger
            .sends
            .get(&normalize_number(number))
            .map(|sends| sends.iter().filter(|at| **at > since && **at <= now).count())
            .unwrap_or(0);
        Ok((recent as u64) < u64::from(max))
    }

    fn enforce_consent(&self, lead: &Lead, _channel: Channel) -> Result<ConsentStatus, StoreError> {
        Ok(if lead.ai_opt_in {
            ConsentStatus::Verified
        } else {
            ConsentStatus::Unverifiable
        })
    }

    fn record_send(&self, number: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut ledger = self.ledger.write().map_err(|_| StoreError::Poisoned)?;
        ledger
            .sends
            .entry(normalize_number(number))
            .or_default()
            .push(at);
        Ok(())
    }

    fn record_failure(&self, number: &str) -> Result<u32, StoreError> {
        let mut ledger = self.ledger.write().map_err(|_| StoreError::Poisoned)?;
        let count = ledger.failures.entry(normalize_number(number)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn reset_failures(&self, number: &str) -> Result<(), StoreError> {
        let mut ledger = self.ledger.write().map_err(|_| StoreError::Poisoned)?;
        ledger.failures.remove(&normalize_number(number));
        Ok(())
    }

    fn suppress(
        &self,
        number: &str,
        channel: Channel,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut ledger = self.ledger.write().map_err(|_| StoreError::Poisoned)?;
        let number = normalize_number(number);
        ledger
            .suppressed
            .entry((number.clone(), channel))
            .or_insert_with(|| SuppressionRecord {
                number,
                channel,
                reason: reason.to_string(),
                suppressed_at: at,
            });
        Ok(())
    }
}

/// Policy wrapper around a [`ComplianceService`].
#[derive(Clone)]
pub struct ComplianceGate {
    service: Arc<dyn ComplianceService>,
    rate_limit_window: Duration,
    rate_limit_max_sends: u32,
    auto_suppress_after: u32,
}

impl std::fmt::Debug for ComplianceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceGate")
            .field("rate_limit_window", &self.rate_limit_window)
            .field("rate_limit_max_sends", &self.rate_limit_max_sends)
            .field("auto_suppress_after", &self.auto_suppress_after)
            .finish_non_exhaustive()
    }
}

impl ComplianceGate {
    pub fn new(
        service: Arc<dyn ComplianceService>,
        rate_limit_window: Duration,
        rate_limit_max_sends: u32,
        auto_suppress_after: u32,
    ) -> Self {
        Self {
            service,
            rate_limit_window,
            rate_limit_max_sends,
            auto_suppress_after,
        }
    }

    pub fn service(&self) -> &Arc<dyn ComplianceService> {
        &self.service
    }

    /// Gate a send to `number`.
    pub fn check(&self, lead: &Lead, number: &str, now: DateTime<Utc>) -> EngineResult<()> {
        let channel = Channel::Sms;

        if self.service.is_suppressed(number, channel)? {
            tracing::warn!(
                target: "compliance",
                lead_id = %lead.id,
                number = %number,
                reason = "suppressed",
                "send blocked"
            );
            return Err(EngineError::compliance(number, ComplianceReason::Suppressed));
        }

        let allowed = self.service.check_rate_limit(
            number,
            self.rate_limit_window,
            self.rate_limit_max_sends,
            now,
        )?;
        if !allowed {
            tracing::warn!(
                target: "compliance",
                lead_id = %lead.id,
                number = %number,
                reason = "rate_limited",
                max_sends = self.rate_limit_max_sends,
                window_secs = self.rate_limit_window.num_seconds(),
                "send blocked"
            );
            return Err(EngineError::compliance(number, ComplianceReason::RateLimited));
        }

        if self.service.enforce_consent(lead, channel)? == ConsentStatus::Unverifiable {
            tracing::warn!(
                target: "compliance",
                lead_id = %lead.id,
                number = %number,
                "consent could not be verified; continuing"
            );
        }
        Ok(())
    }

    pub fn delivered(&self, number: &str, at: DateTime<Utc>) -> EngineResult<()> {
        self.service.record_send(number, at)?;
        self.service.reset_failures(number)?;
        Ok(())
    }

    /// Count a failed delivery. Returns `true` when the number was
    /// auto-suppressed as a result.
    pub fn delivery_failed(&self, number: &str, at: DateTime<Utc>) -> EngineResult<bool> {
        let failures = self.service.record_failure(number)?;
        if failures < self.auto_suppress_after {
            return Ok(false);
        }
        self.service.suppress(
            number,
            Channel::Sms,
            &format!("{failures} consecutive delivery failures"),
            at,
        )?;
        tracing::warn!(
            target: "compliance",
            number = %number,
            failures,
            "number auto-suppressed"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn gate() -> (Arc<InMemoryComplianceService>, ComplianceGate) {
        let service = Arc::new(InMemoryComplianceService::new());
        let gate = ComplianceGate::new(service.clone(), Duration::minutes(10), 3, 3);
        (service, gate)
    }

    #[test]
    fn numbers_are_normalized() {
        assert_eq!(normalize_number(" +1 (555) 010-0101 "), "+15550100101");
        assert_eq!(normalize_number("555.010.0101"), "5550100101");
    }

    #[test]
    fn suppressed_numbers_are_blocked_in_any_format() {
        let (service, gate) = gate();
        let lead = Lead::new("Ana", t0()).opted_in();
        service
            .suppress("+15550100101", Channel::Sms, "STOP", t0())
            .unwrap();
        let err = gate.check(&lead, "+1 555 010 0101", t0()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ComplianceBlocked {
                reason: ComplianceReason::Suppressed,
                ..
            }
        ));
    }

    #[test]
    fn fourth_send_in_window_is_rate_limited() {
        let (service, gate) = gate();
        let lead = Lead::new("Ana", t0()).opted_in();
        for i in 0..3 {
            let at = t0() + Duration::minutes(i);
            gate.check(&lead, "+15550100101", at).unwrap();
            service.record_send("+15550100101", at).unwrap();
        }
        let err = gate
            .check(&lead, "+15550100101", t0() + Duration::minutes(4))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ComplianceBlocked {
                reason: ComplianceReason::RateLimited,
                ..
            }
        ));
        // The first send leaves the window after ten minutes.
        assert!(gate
            .check(&lead, "+15550100101", t0() + Duration::minutes(10))
            .is_ok());
    }

    #[test]
    fn unverifiable_consent_is_a_soft_gate() {
        let (_, gate) = gate();
        let lead = Lead::new("Ana", t0());
        assert!(gate.check(&lead, "+15550100101", t0()).is_ok());
    }

    #[test]
    fn consecutive_failures_auto_suppress() {
        let (service, gate) = gate();
        assert!(!gate.delivery_failed("+15550100101", t0()).unwrap());
        assert!(!gate.delivery_failed("+15550100101", t0()).unwrap());
        assert!(gate.delivery_failed("+15550100101", t0()).unwrap());
        assert!(service.is_suppressed("+15550100101", Channel::Sms).unwrap());
        let record = service.suppression("+15550100101", Channel::Sms).unwrap();
        assert!(record.reason.contains("3 consecutive"));
    }

    #[test]
    fn a_success_resets_the_failure_streak() {
        let (service, gate) = gate();
        gate.delivery_failed("+15550100101", t0()).unwrap();
        gate.delivery_failed("+15550100101", t0()).unwrap();
        gate.delivered("+15550100101", t0()).unwrap();
        assert!(!gate.delivery_failed("+15550100101", t0()).unwrap());
        assert!(!service.is_suppressed("+15550100101", Channel::Sms).unwrap());
    }
}
