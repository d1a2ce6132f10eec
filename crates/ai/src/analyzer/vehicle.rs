//! Vehicle-interest extraction: year, make, model, trim, features, use case.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{contains_any, contains_term, count_term, normalize, sentences};

/// A make in the lexicon, with its models and a base price used for value
/// estimates.
#[derive(Debug)]
pub struct MakeEntry {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// (lowercase match term, display name)
    pub models: &'static [(&'static str, &'static str)],
    pub base_price: f64,
}

pub static MAKES: &[MakeEntry] = &[
    MakeEntry {
        name: "Chevrolet",
        aliases: &["chevrolet", "chevy"],
        models: &[
            ("silverado", "Silverado"),
            ("colorado", "Colorado"),
            ("tahoe", "Tahoe"),
            ("suburban", "Suburban"),
            ("equinox", "Equinox"),
            ("traverse", "Traverse"),
            ("malibu", "Malibu"),
            ("camaro", "Camaro"),
            ("corvette", "Corvette"),
            ("blazer", "Blazer"),
        ],
        base_price: 42_000.0,
    },
    MakeEntry {
        name: "Ford",
        aliases: &["ford"],
        models: &[
            ("f-150", "F-150"),
            ("f150", "F-150"),
            ("f-250", "F-250"),
            ("ranger", "Ranger"),
            ("explorer", "Explorer"),
            ("escape", "Escape"),
            ("bronco", "Bronco"),
            ("mustang", "Mustang"),
            ("expedition", "Expedition"),
            ("maverick", "Maverick"),
        ],
        base_price: 45_000.0,
    },
    MakeEntry {
        name: "Toyota",
        aliases: &["toyota"],
        models: &[
            ("camry", "Camry"),
            ("corolla", "Corolla"),
            ("rav4", "RAV4"),
            ("tacoma", "Tacoma"),
            ("tundra", "Tundra"),
            ("highlander", "Highlander"),
            ("4runner", "4Runner"),
            ("prius", "Prius"),
            ("sienna", "Sienna"),
        ],
        base_price: 36_000.0,
    },
    MakeEntry {
        name: "Honda",
        aliases: &["honda"],
        models: &[
            ("civic", "Civic"),
            ("accord", "Accord"),
            ("cr-v", "CR-V"),
            ("crv", "CR-V"),
            ("pilot", "Pilot"),
            ("odyssey", "Odyssey"),
            ("ridgeline", "Ridgeline"),
            ("hr-v", "HR-V"),
        ],
        base_price: 33_000.0,
    },
    MakeEntry {
        name: "Ram",
        aliases: &["ram", "dodge ram"],
        models: &[("1500", "1500"), ("2500", "2500"), ("promaster", "ProMaster")],
        base_price: 48_000.0,
    },
    MakeEntry {
        name: "GMC",
        aliases: &["gmc"],
        models: &[
            ("sierra", "Sierra"),
            ("canyon", "Canyon"),
            ("yukon", "Yukon"),
            ("acadia", "Acadia"),
            ("terrain", "Terrain"),
        ],
        base_price: 50_000.0,
    },
    MakeEntry {
        name: "Jeep",
        aliases: &["jeep"],
        models: &[
            ("wrangler", "Wrangler"),
            ("grand cherokee", "Grand Cherokee"),
            ("cherokee", "Cherokee"),
            ("gladiator", "Gladiator"),
            ("compass", "Compass"),
        ],
        base_price: 40_000.0,
    },
    MakeEntry {
        name: "Nissan",
        aliases: &["nissan"],
        models: &[
            ("altima", "Altima"),
            ("rogue", "Rogue"),
            ("frontier", "Frontier"),
            ("pathfinder", "Pathfinder"),
            ("titan", "Titan"),
        ],
        base_price: 32_000.0,
    },
];

/// Base price used when the make is unknown.
pub const DEFAULT_BASE_PRICE: f64 = 35_000.0;

pub fn base_price_for(make: Option<&str>) -> f64 {
    make.and_then(|m| MAKES.iter().find(|e| e.name.eq_ignore_ascii_case(m)))
        .map(|e| e.base_price)
        .unwrap_or(DEFAULT_BASE_PRICE)
}

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19[89]\d|20[0-3]\d)\b").expect("year pattern"));

/// Trims in canonical casing, longer names first so "LTZ" wins over "LT".
/// Ambiguous trims that are also plain words only match as written.
const TRIMS: &[(&str, bool)] = &[
    ("High Country", false),
    ("King Ranch", false),
    ("TRD Pro", false),
    ("Big Horn", false),
    ("EX-L", false),
    ("LTZ", false),
    ("RST", false),
    ("Z71", false),
    ("ZR2", false),
    ("XLT", false),
    ("Lariat", false),
    ("Raptor", false),
    ("Denali", false),
    ("AT4", false),
    ("SLT", false),
    ("SLE", false),
    ("Laramie", false),
    ("Rubicon", false),
    ("Sahara", false),
    ("SR5", false),
    ("TRD", false),
    ("XLE", false),
    ("Platinum", true),
    ("Limited", true),
    ("Touring", true),
    ("LT", true),
    ("LS", true),
    ("EX", true),
    ("SE", true),
];

static TRIM: Lazy<Regex> = Lazy::new(|| {
    let alternation = |exact: bool| {
        TRIMS
            .iter()
            .filter(|(_, e)| *e == exact)
            .map(|(t, _)| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|")
    };
    let pattern = format!(r"\b((?i:{})|{})\b", alternation(false), alternation(true));
    Regex::new(&pattern).expect("trim pattern")
});

/// First trim named in `raw`, in canonical casing.
pub(crate) fn find_trim(raw: &str) -> Option<String> {
    let found = TRIM.captures(raw)?.get(1)?.as_str();
    TRIMS
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(found))
        .map(|(t, _)| (*t).to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Towing,
    Drivetrain,
    CabStyle,
    FuelType,
}

const FEATURE_TERMS: &[(FeatureKind, &[&str])] = &[
    (
        FeatureKind::Towing,
        &["towing", "tow", "hitch", "trailer", "haul", "hauling"],
    ),
    (
        FeatureKind::Drivetrain,
        &[
            "all-wheel drive",
            "all wheel drive",
            "four wheel drive",
            "4x4",
            "4wd",
            "awd",
        ],
    ),
    (
        FeatureKind::CabStyle,
        &[
            "crew cab",
            "double cab",
            "extended cab",
            "regular cab",
            "quad cab",
            "supercrew",
        ],
    ),
    (
        FeatureKind::FuelType,
        &["plug-in", "diesel", "hybrid", "electric", "ev"],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

// Low qualifiers are checked first: "not required" must not read as "required".
const LOW_QUALIFIERS: &[&str] = &[
    "nice to have",
    "would be nice",
    "not required",
    "don't need",
    "dont need",
    "optional",
    "maybe",
    "possibly",
    "might",
];
const HIGH_QUALIFIERS: &[&str] = &[
    "need", "must", "have to", "has to", "required", "essential", "definitely", "important",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMention {
    pub kind: FeatureKind,
    /// Lexicon term that matched.
    pub term: String,
    pub importance: Importance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    Work,
    Family,
    Personal,
    Unknown,
}

const USE_CASE_TERMS: &[(UseCase, &[&str])] = &[
    (
        UseCase::Work,
        &[
            "work", "job site", "jobsite", "contractor", "business", "fleet", "construction",
            "farm",
        ],
    ),
    (
        UseCase::Family,
        &[
            "family", "kids", "children", "car seat", "third row", "3rd row", "wife", "husband",
        ],
    ),
    (
        UseCase::Personal,
        &["commute", "commuting", "myself", "personal", "weekend", "daily driver", "fun"],
    ),
];

pub const BUDGET_TERMS: &[&str] = &[
    "budget",
    "price",
    "payment",
    "payments",
    "monthly",
    "afford",
    "financing",
    "finance",
    "interest rate",
    "apr",
    "down payment",
    "trade-in",
    "trade in",
    "lease",
    "$",
];

pub const TIMELINE_TERMS: &[&str] = &[
    "today",
    "tomorrow",
    "this week",
    "this weekend",
    "next week",
    "next month",
    "asap",
    "soon",
    "right away",
    "end of the month",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInterest {
    pub year: Option<u16>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub features: Vec<FeatureMention>,
    pub use_case: UseCase,
    /// Budget keywords found, in lexicon order.
    pub budget_mentions: Vec<String>,
    pub timeline_mentions: Vec<String>,
    /// 0.2·year + 0.4·make + 0.4·model
    pub confidence: f64,
}

impl VehicleInterest {
    pub fn has_budget(&self) -> bool {
        !self.budget_mentions.is_empty()
    }

    /// "2024 Chevrolet Silverado LTZ", or `None` if nothing was identified.
    pub fn label(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.year.map(|y| y.to_string()),
            self.make.clone(),
            self.model.clone(),
            self.trim.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Extract vehicle interest from raw customer text.
pub fn extract(raw: &str) -> VehicleInterest {
    let norm = normalize(raw);

    let year = YEAR
        .captures(&norm)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok());

    let (make, model) = detect_make_model(&norm);
    let trim = find_trim(raw);

    let features = detect_features(raw);
    let use_case = detect_use_case(&norm);

    let budget_mentions = matched_terms(&norm, BUDGET_TERMS);
    let timeline_mentions = matched_terms(&norm, TIMELINE_TERMS);

    let confidence = 0.2 * f64::from(u8::from(year.is_some()))
        + 0.4 * f64::from(u8::from(make.is_some()))
        + 0.4 * f64::from(u8::from(model.is_some()));

    VehicleInterest {
        year,
        make,
        model,
        trim,
        features,
        use_case,
        budget_mentions,
        timeline_mentions,
        confidence,
    }
}

fn matched_terms(norm: &str, terms: &[&str]) -> Vec<String> {
    terms
        .iter()
        .filter(|t| contains_term(norm, t))
        .map(|t| (*t).to_string())
        .collect()
}

fn detect_make_model(norm: &str) -> (Option<String>, Option<String>) {
    let explicit_make = MAKES
        .iter()
        .find(|e| e.aliases.iter().any(|a| contains_term(norm, a)));

    // A model implies its make; prefer models of the explicit make if one was named.
    let candidates: Vec<&MakeEntry> = match explicit_make {
        Some(e) => std::iter::once(e)
            .chain(MAKES.iter().filter(|m| m.name != e.name))
            .collect(),
        None => MAKES.iter().collect(),
    };

    for entry in candidates {
        // Bare numeric models ("1500") only count when their make is named.
        let make_named = explicit_make.is_some_and(|e| e.name == entry.name);
        for (term, display) in entry.models {
            let numeric = term.chars().all(|c| c.is_ascii_digit());
            if numeric && !make_named {
                continue;
            }
            if contains_term(norm, term) {
                return (Some(entry.name.to_string()), Some((*display).to_string()));
            }
        }
    }

    (explicit_make.map(|e| e.name.to_string()), None)
}

fn detect_features(raw: &str) -> Vec<FeatureMention> {
    let norm = normalize(raw);
    let mut out = Vec::new();

    for (kind, terms) in FEATURE_TERMS {
        let Some(term) = terms.iter().find(|t| contains_term(&norm, t)) else {
            continue;
        };
        let importance = sentences(&norm)
            .find(|s| contains_term(s, term))
            .map(importance_of)
            .unwrap_or(Importance::Medium);

        out.push(FeatureMention {
            kind: *kind,
            term: (*term).to_string(),
            importance,
        });
    }

    out
}

fn importance_of(sentence: &str) -> Importance {
    if contains_any(sentence, LOW_QUALIFIERS) {
        Importance::Low
    } else if contains_any(sentence, HIGH_QUALIFIERS) {
        Importance::High
    } else {
        Importance::Medium
    }
}

fn detect_use_case(norm: &str) -> UseCase {
    let mut best = (UseCase::Unknown, 0usize);
    for (case, terms) in USE_CASE_TERMS {
        let hits: usize = terms.iter().map(|t| count_term(norm, t)).sum();
        // Strictly greater keeps the earlier (higher priority) case on ties.
        if hits > best.1 {
            best = (*case, hits);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_identification_has_full_confidence() {
        let v = extract("Looking at a 2024 Chevy Silverado LTZ");
        assert_eq!(v.year, Some(2024));
        assert_eq!(v.make.as_deref(), Some("Chevrolet"));
        assert_eq!(v.model.as_deref(), Some("Silverado"));
        assert_eq!(v.trim.as_deref(), Some("LTZ"));
        assert!((v.confidence - 1.0).abs() < 1e-9);
        assert_eq!(v.label().as_deref(), Some("2024 Chevrolet Silverado LTZ"));
    }

    #[test]
    fn model_implies_make() {
        let v = extract("is the tacoma still there?");
        assert_eq!(v.make.as_deref(), Some("Toyota"));
        assert_eq!(v.model.as_deref(), Some("Tacoma"));
        assert!((v.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn years_outside_range_are_ignored() {
        assert_eq!(extract("back in 1975").year, None);
        assert_eq!(extract("a 2041 model").year, None);
        assert_eq!(extract("a 1999 ford").year, Some(1999));
    }

    #[test]
    fn numeric_models_need_their_make() {
        assert_eq!(extract("I can pay 1500 down").model, None);
        assert_eq!(extract("ram 1500 please").model.as_deref(), Some("1500"));
    }

    #[test]
    fn trim_is_longest_first_and_word_trims_match_as_written() {
        assert_eq!(extract("the LTZ").trim.as_deref(), Some("LTZ"));
        assert_eq!(extract("the LT").trim.as_deref(), Some("LT"));
        assert_eq!(extract("limited time").trim, None);
        assert_eq!(extract("se habla espanol").trim, None);
    }

    #[test]
    fn trim_codes_match_in_any_case() {
        assert_eq!(extract("what about the ltz").trim.as_deref(), Some("LTZ"));
        assert_eq!(extract("is the trd pro in stock").trim.as_deref(), Some("TRD Pro"));
        assert_eq!(extract("a high country or a denali").trim.as_deref(), Some("High Country"));
        assert_eq!(extract("the ex-l").trim.as_deref(), Some("EX-L"));
    }

    #[test]
    fn feature_importance_comes_from_the_same_sentence() {
        let v = extract("I need to tow a boat. AWD would be nice. Diesel.");
        let by_kind = |k: FeatureKind| v.features.iter().find(|f| f.kind == k).unwrap();
        assert_eq!(by_kind(FeatureKind::Towing).importance, Importance::High);
        assert_eq!(by_kind(FeatureKind::Drivetrain).importance, Importance::Low);
        assert_eq!(by_kind(FeatureKind::FuelType).importance, Importance::Medium);
    }

    #[test]
    fn use_case_prefers_work_on_ties() {
        assert_eq!(extract("for work and family").use_case, UseCase::Work);
        assert_eq!(extract("kids and car seat").use_case, UseCase::Family);
        assert_eq!(extract("hello").use_case, UseCase::Unknown);
    }

    #[test]
    fn budget_and_timeline_keywords() {
        let v = extract("what's the interest rate? want it this week");
        assert_eq!(v.budget_mentions, vec!["interest rate".to_string()]);
        assert_eq!(v.timeline_mentions, vec!["this week".to_string()]);
    }

    #[test]
    fn base_price_falls_back() {
        assert_eq!(base_price_for(Some("Ford")), 45_000.0);
        assert_eq!(base_price_for(None), DEFAULT_BASE_PRICE);
    }
}
