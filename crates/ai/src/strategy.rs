//! Content strategies for the aggressive multi-day sequence.
//!
//! Each [`StrategyTag`] has exactly one [`MessageStrategy`]; the registry is
//! built from an exhaustive match so a new tag cannot ship without content.

use std::collections::BTreeMap;

use leadflow_core::StrategyTag;

/// What a strategy needs to draft a message.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub first_name: &'a str,
    pub vehicle: Option<&'a str>,
    /// 1..=14
    pub day: u8,
    pub message_index: u8,
}

impl StrategyContext<'_> {
    fn vehicle(&self) -> &str {
        self.vehicle.unwrap_or("your next vehicle")
    }

    fn name(&self) -> &str {
        let n = self.first_name.trim();
        if n.is_empty() { "there" } else { n }
    }
}

pub trait MessageStrategy: Send + Sync {
    fn tag(&self) -> StrategyTag;

    /// Instruction handed to the text generator.
    fn prompt_hint(&self) -> &'static str;

    /// Deterministic template draft.
    fn compose(&self, ctx: &StrategyContext<'_>) -> String;
}

struct FeaturesBenefits;
struct UrgencyScarcity;
struct IncentivesDeals;
struct FinalPush;
struct GentleFollowup;

impl MessageStrategy for FeaturesBenefits {
    fn tag(&self) -> StrategyTag {
        StrategyTag::FeaturesBenefits
    }

    fn prompt_hint(&self) -> &'static str {
        "Highlight one concrete feature and the everyday benefit it brings."
    }

    fn compose(&self, ctx: &StrategyContext<'_>) -> String {
        let angle = match (ctx.day + ctx.message_index) % 3 {
            0 => "the tech package",
            1 => "the comfort and cargo space",
            _ => "the safety features",
        };
        format!(
            "Hi {}, one thing owners love about {} is {}. Want me to send a quick walkaround video?",
            ctx.name(),
            ctx.vehicle(),
            angle
        )
    }
}

impl MessageStrategy for UrgencyScarcity {
    fn tag(&self) -> StrategyTag {
        StrategyTag::UrgencyScarcity
    }

    fn prompt_hint(&self) -> &'static str {
        "Mention limited availability without inventing numbers."
    }

    fn compose(&self, ctx: &StrategyContext<'_>) -> String {
        format!(
            "Hi {}, heads up: {} in this configuration has been moving fast this week. Want me to hold one for a look?",
            ctx.name(),
            ctx.vehicle()
        )
    }
}

impl MessageStrategy for IncentivesDeals {
    fn tag(&self) -> StrategyTag {
        StrategyTag::IncentivesDeals
    }

    fn prompt_hint(&self) -> &'static str {
        "Point to current incentives and offer a personalized quote."
    }

    fn compose(&self, ctx: &StrategyContext<'_>) -> String {
        format!(
            "Hi {}, there are current incentives on {}. I can put together a personalized quote. Should I send it over?",
            ctx.name(),
            ctx.vehicle()
        )
    }
}

impl MessageStrategy for FinalPush {
    fn tag(&self) -> StrategyTag {
        StrategyTag::FinalPush
    }

    fn prompt_hint(&self) -> &'static str {
        "Make a clear, friendly last offer with a single call to action."
    }

    fn compose(&self, ctx: &StrategyContext<'_>) -> String {
        format!(
            "Hi {}, I'd still love to help you into {}. If you reply YES I'll line up the best numbers we can do.",
            ctx.name(),
            ctx.vehicle()
        )
    }
}

impl MessageStrategy for GentleFollowup {
    fn tag(&self) -> StrategyTag {
        StrategyTag::GentleFollowup
    }

    fn prompt_hint(&self) -> &'static str {
        "Low-pressure check-in; make it easy to reply later."
    }

    fn compose(&self, ctx: &StrategyContext<'_>) -> String {
        format!(
            "Hi {}, no pressure at all. Whenever you're ready to look at {}, I'm here.",
            ctx.name(),
            ctx.vehicle()
        )
    }
}

fn strategy_for(tag: StrategyTag) -> Box<dyn MessageStrategy> {
    match tag {
        StrategyTag::FeaturesBenefits => Box::new(FeaturesBenefits),
        StrategyTag::UrgencyScarcity => Box::new(UrgencyScarcity),
        StrategyTag::IncentivesDeals => Box::new(IncentivesDeals),
        StrategyTag::FinalPush => Box::new(FinalPush),
        StrategyTag::GentleFollowup => Box::new(GentleFollowup),
    }
}

/// Strategies keyed by tag.
pub struct StrategyRegistry {
    strategies: BTreeMap<StrategyTag, Box<dyn MessageStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// One built-in strategy per tag.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for tag in StrategyTag::ALL {
            registry.register(strategy_for(tag));
        }
        registry
    }

    /// Replaces any strategy already registered for the same tag.
    pub fn register(&mut self, strategy: Box<dyn MessageStrategy>) {
        self.strategies.insert(strategy.tag(), strategy);
    }

    pub fn get(&self, tag: StrategyTag) -> Option<&dyn MessageStrategy> {
        self.strategies.get(&tag).map(|s| s.as_ref())
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.strategies.keys()).finish()
    }
}
