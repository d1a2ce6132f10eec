//! Fallback message templates.
//!
//! Used when the text generator returns nothing usable. Every template is a
//! plain function of the lead's name and vehicle so fallbacks stay
//! reproducible.

pub const INITIAL_CONTACT: &str = "initial_contact";
pub const FOLLOW_UP: &str = "follow_up";
pub const TAKEOVER: &str = "takeover";

fn vehicle_phrase(vehicle: Option<&str>) -> String {
    match vehicle {
        Some(v) if !v.trim().is_empty() => format!("the {v}"),
        _ => "the vehicle you were looking at".to_string(),
    }
}

fn greeting(first_name: &str) -> String {
    let name = first_name.trim();
    if name.is_empty() {
        "Hi there".to_string()
    } else {
        format!("Hi {name}")
    }
}

pub fn initial_contact(first_name: &str, vehicle: Option<&str>) -> String {
    format!(
        "{}, thanks for your interest in {}! I'm happy to answer questions or set up a time to see it. What would be most helpful?",
        greeting(first_name),
        vehicle_phrase(vehicle)
    )
}

pub fn follow_up(first_name: &str, vehicle: Option<&str>) -> String {
    format!(
        "{}, just following up on {}. Is there anything I can look into for you, like pricing, availability, or a test drive?",
        greeting(first_name),
        vehicle_phrase(vehicle)
    )
}

pub fn takeover(first_name: &str, vehicle: Option<&str>) -> String {
    format!(
        "{}, sorry for the wait! I can help with {} right now. What questions can I answer?",
        greeting(first_name),
        vehicle_phrase(vehicle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_use_name_and_vehicle() {
        let body = initial_contact("Dana", Some("2024 Ford F-150"));
        assert!(body.starts_with("Hi Dana,"));
        assert!(body.contains("the 2024 Ford F-150"));
    }

    #[test]
    fn missing_details_fall_back_to_generic_phrases() {
        let body = follow_up("  ", None);
        assert!(body.starts_with("Hi there,"));
        assert!(body.contains("the vehicle you were looking at"));
    }
}
