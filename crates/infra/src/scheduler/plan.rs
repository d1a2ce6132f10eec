//! Fourteen-day aggressive sequence plan.
//!
//! Days 1-7: three sends at 09:00, 13:00 and 17:00 local with
//! features/benefits, urgency/scarcity and incentives.
//! Days 8-14: two sends at 10:00 and 16:00 local rotating
//! incentives, final push and gentle follow-up.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};

use leadflow_core::{LeadId, ScheduledEntry, StrategyTag};

const INTENSIVE_DAYS: u8 = 7;
const TOTAL_DAYS: u8 = 14;
const INTENSIVE_HOURS: [u32; 3] = [9, 13, 17];
const INTENSIVE_STRATEGIES: [StrategyTag; 3] = [
    StrategyTag::FeaturesBenefits,
    StrategyTag::UrgencyScarcity,
    StrategyTag::IncentivesDeals,
];
const TAPER_HOURS: [u32; 2] = [10, 16];
const TAPER_ROTATION: [StrategyTag; 3] = [
    StrategyTag::IncentivesDeals,
    StrategyTag::FinalPush,
    StrategyTag::GentleFollowup,
];

fn local_at(date: NaiveDate, hour: u32, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First local date whose first slot is still ahead of `now`.
fn first_day(now: DateTime<Utc>, offset: FixedOffset) -> Option<NaiveDate> {
    let today = now.with_timezone(&offset).date_naive();
    match local_at(today, INTENSIVE_HOURS[0], offset) {
        Some(first_slot) if first_slot > now => Some(today),
        _ => today.checked_add_days(Days::new(1)),
    }
}

/// Materialize every entry of the plan for `lead_id`, earliest first.
pub fn aggressive_plan(
    lead_id: LeadId,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<ScheduledEntry> {
    let Some(start) = first_day(now, offset) else {
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(35);
    let mut taper_slot = 0usize;
    for day in 1..=TOTAL_DAYS {
        let Some(date) = start.checked_add_days(Days::new(u64::from(day - 1))) else {
            break;
        };
        if day <= INTENSIVE_DAYS {
            for (index, (hour, strategy)) in
                INTENSIVE_HOURS.iter().zip(INTENSIVE_STRATEGIES).enumerate()
            {
                if let Some(at) = local_at(date, *hour, offset) {
                    entries.push(ScheduledEntry::new(lead_id, day, index as u8, at, strategy));
                }
            }
        } else {
            for (index, hour) in TAPER_HOURS.iter().enumerate() {
                let strategy = TAPER_ROTATION[taper_slot % TAPER_ROTATION.len()];
                taper_slot += 1;
                if let Some(at) = local_at(date, *hour, offset) {
                    entries.push(ScheduledEntry::new(lead_id, day, index as u8, at, strategy));
                }
            }
        }
    }
    entries
}
