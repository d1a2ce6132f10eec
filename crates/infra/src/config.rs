//! Engine configuration.
//!
//! Defaults match a single-dealership deployment. Every field can be
//! overridden with a `LEADFLOW_*` environment variable; durations are given
//! in whole seconds (`LEADFLOW_SEND_PACING_SECS=0`).

use std::time::Duration;

use anyhow::Context;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "LEADFLOW_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Dealership offset from UTC, in minutes. Fixed: no DST transitions.
    pub local_utc_offset_minutes: i32,

    /// How long an inbound message may go unanswered before advancement.
    pub advancement_threshold: Duration,
    /// Jitter bounds for the follow-up after initial contact.
    pub initial_follow_up_min: Duration,
    pub initial_follow_up_max: Duration,
    /// Inbound within this window pauses the aggressive sequence.
    pub inbound_pause_window: Duration,

    pub max_ai_messages_per_24h: u32,
    pub rate_limit_max_sends: u32,
    pub rate_limit_window: Duration,
    pub auto_suppress_after_failures: u32,

    pub learning_batch_size: usize,
    pub prediction_confidence_gate: f64,
    /// Per (lead, trigger type) quiet period; `None` disables de-duplication.
    pub trigger_cooldown: Option<Duration>,

    pub send_pacing: Duration,
    pub claim_lease: Duration,
    /// Fall back to the template draft when generation fails.
    pub template_fallback: bool,

    /// Interval of the optional background sweep runner.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_utc_offset_minutes: -5 * 60,
            advancement_threshold: Duration::from_secs(2 * 3600),
            initial_follow_up_min: Duration::from_secs(2 * 3600),
            initial_follow_up_max: Duration::from_secs(3 * 3600),
            inbound_pause_window: Duration::from_secs(24 * 3600),
            max_ai_messages_per_24h: 2,
            rate_limit_max_sends: 3,
            rate_limit_window: Duration::from_secs(10 * 60),
            auto_suppress_after_failures: 3,
            learning_batch_size: 3,
            prediction_confidence_gate: 0.5,
            trigger_cooldown: None,
            send_pacing: Duration::from_secs(2),
            claim_lease: Duration::from_secs(10 * 60),
            template_fallback: true,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Defaults with no pacing, for tests and batch tools.
    pub fn unpaced() -> Self {
        Self {
            send_pacing: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Load from the process environment. Unparsable values are logged and
    /// replaced by their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), false).unwrap_or_default()
    }

    /// Like [`from_env`](Self::from_env), but any unparsable value is an error.
    pub fn try_from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), true)
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.local_utc_offset_minutes * 60).unwrap_or_else(|| {
            tracing::warn!(
                offset_minutes = self.local_utc_offset_minutes,
                "local offset out of range; using UTC"
            );
            Utc.fix()
        })
    }

    pub(crate) fn from_lookup<F>(lookup: F, strict: bool) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let mut loader = Loader {
            lookup: &lookup,
            strict,
        };

        loader.parse("LOCAL_UTC_OFFSET_MINUTES", &mut cfg.local_utc_offset_minutes)?;
        loader.secs("ADVANCEMENT_THRESHOLD_SECS", &mut cfg.advancement_threshold)?;
        loader.secs("INITIAL_FOLLOW_UP_MIN_SECS", &mut cfg.initial_follow_up_min)?;
        loader.secs("INITIAL_FOLLOW_UP_MAX_SECS", &mut cfg.initial_follow_up_max)?;
        loader.secs("INBOUND_PAUSE_WINDOW_SECS", &mut cfg.inbound_pause_window)?;
        loader.parse("MAX_AI_MESSAGES_PER_24H", &mut cfg.max_ai_messages_per_24h)?;
        loader.parse("RATE_LIMIT_MAX_SENDS", &mut cfg.rate_limit_max_sends)?;
        loader.secs("RATE_LIMIT_WINDOW_SECS", &mut cfg.rate_limit_window)?;
        loader.parse(
            "AUTO_SUPPRESS_AFTER_FAILURES",
            &mut cfg.auto_suppress_after_failures,
        )?;
        loader.parse("LEARNING_BATCH_SIZE", &mut cfg.learning_batch_size)?;
        loader.parse(
            "PREDICTION_CONFIDENCE_GATE",
            &mut cfg.prediction_confidence_gate,
        )?;
        loader.optional_secs("TRIGGER_COOLDOWN_SECS", &mut cfg.trigger_cooldown)?;
        loader.secs("SEND_PACING_SECS", &mut cfg.send_pacing)?;
        loader.secs("CLAIM_LEASE_SECS", &mut cfg.claim_lease)?;
        loader.parse("TEMPLATE_FALLBACK", &mut cfg.template_fallback)?;
        loader.secs("SWEEP_INTERVAL_SECS", &mut cfg.sweep_interval)?;

        if cfg.initial_follow_up_max < cfg.initial_follow_up_min {
            tracing::warn!("initial follow-up bounds reversed; swapping");
            std::mem::swap(&mut cfg.initial_follow_up_min, &mut cfg.initial_follow_up_max);
        }
        cfg.learning_batch_size = cfg.learning_batch_size.max(1);

        Ok(cfg)
    }
}

struct Loader<'a, F> {
    lookup: &'a F,
    strict: bool,
}

impl<F> Loader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{ENV_PREFIX}{name}");
        (self.lookup)(&key).map(|v| (key, v.trim().to_string()))
    }

    fn parse<T>(&mut self, name: &str, slot: &mut T) -> anyhow::Result<()>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let Some((key, value)) = self.raw(name) else {
            return Ok(());
        };
        match value.parse::<T>() {
            Ok(v) => *slot = v,
            Err(e) if self.strict => {
                return Err(e).with_context(|| format!("invalid value {value:?} for {key}"));
            }
            Err(e) => {
                tracing::warn!(key = %key, value = %value, error = %e, "ignoring invalid config value");
            }
        }
        Ok(())
    }

    fn secs(&mut self, name: &str, slot: &mut Duration) -> anyhow::Result<()> {
        let mut secs = slot.as_secs();
        self.parse(name, &mut secs)?;
        *slot = Duration::from_secs(secs);
        Ok(())
    }

    /// Unset or "off" leaves the value disabled.
    fn optional_secs(&mut self, name: &str, slot: &mut Option<Duration>) -> anyhow::Result<()> {
        match self.raw(name) {
            Some((_, v)) if v.eq_ignore_ascii_case("off") || v.is_empty() => {
                *slot = None;
                Ok(())
            }
            Some(_) => {
                let mut secs = slot.map(|d| d.as_secs()).unwrap_or(0);
                self.parse(name, &mut secs)?;
                *slot = (secs > 0).then(|| Duration::from_secs(secs));
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_ai_messages_per_24h, 2);
        assert_eq!(cfg.rate_limit_max_sends, 3);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(600));
        assert_eq!(cfg.learning_batch_size, 3);
        assert_eq!(cfg.send_pacing, Duration::from_secs(2));
        assert_eq!(cfg.trigger_cooldown, None);
        assert_eq!(cfg.local_offset(), FixedOffset::west_opt(5 * 3600).unwrap());
    }

    #[test]
    fn env_overrides_are_applied() {
        let cfg = EngineConfig::from_lookup(
            lookup(&[
                ("LEADFLOW_SEND_PACING_SECS", "0"),
                ("LEADFLOW_MAX_AI_MESSAGES_PER_24H", "4"),
                ("LEADFLOW_TRIGGER_COOLDOWN_SECS", "3600"),
                ("LEADFLOW_TEMPLATE_FALLBACK", "false"),
            ]),
            true,
        )
        .unwrap();
        assert_eq!(cfg.send_pacing, Duration::ZERO);
        assert_eq!(cfg.max_ai_messages_per_24h, 4);
        assert_eq!(cfg.trigger_cooldown, Some(Duration::from_secs(3600)));
        assert!(!cfg.template_fallback);
    }

    #[test]
    fn lenient_loading_keeps_defaults_for_garbage() {
        let cfg = EngineConfig::from_lookup(
            lookup(&[("LEADFLOW_RATE_LIMIT_MAX_SENDS", "lots")]),
            false,
        )
        .unwrap();
        assert_eq!(cfg.rate_limit_max_sends, 3);
    }

    #[test]
    fn strict_loading_reports_the_key() {
        let err = EngineConfig::from_lookup(
            lookup(&[("LEADFLOW_RATE_LIMIT_MAX_SENDS", "lots")]),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("LEADFLOW_RATE_LIMIT_MAX_SENDS"));
    }

    #[test]
    fn cooldown_can_be_switched_off() {
        let cfg = EngineConfig::from_lookup(
            lookup(&[("LEADFLOW_TRIGGER_COOLDOWN_SECS", "off")]),
            true,
        )
        .unwrap();
        assert_eq!(cfg.trigger_cooldown, None);
    }
}
