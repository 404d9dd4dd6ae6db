use regex::Regex;

pub const MEDICAL_EMERGENCY: &str = "medical_emergency";
pub const APPOINTMENT_BOOKING: &str = "appointment_booking";
pub const APPOINTMENT_MODIFY: &str = "appointment_modify";
pub const POST_DISCHARGE: &str = "post_discharge";
pub const PRE_ADMISSION: &str = "pre_admission";
pub const GENERAL_INFO: &str = "general_info";

/// The closed intent vocabulary an LLM classification is validated against (§4.4).
pub const VOCABULARY: &[&str] = &[
    MEDICAL_EMERGENCY,
    APPOINTMENT_BOOKING,
    APPOINTMENT_MODIFY,
    POST_DISCHARGE,
    PRE_ADMISSION,
    GENERAL_INFO,
];

/// One pattern-pass rule: fires on a keyword substring match (word-boundary)
/// or an optional regex match (§4.4).
pub struct PatternRule {
    pub intent: &'static str,
    pub keywords: Vec<&'static str>,
    pub regex: Option<Regex>,
}

impl PatternRule {
    fn keyword_matches(&self, lowercased: &str) -> bool {
        self.keywords.iter().any(|keyword| {
            let pattern = format!(r"\b{}\b", regex::escape(keyword));
            Regex::new(&pattern)
                .map(|re| re.is_match(lowercased))
                .unwrap_or(false)
        })
    }

    pub fn matches(&self, lowercased: &str) -> bool {
        self.keyword_matches(lowercased)
            || self.regex.as_ref().is_some_and(|re| re.is_match(lowercased))
    }
}

/// Default, ordered pattern rules. Emergency rules are listed first so a
/// message mentioning both a symptom and a booking request (e.g.
/// "chest pain — please book") classifies as an emergency (§4.4).
pub fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule {
            intent: MEDICAL_EMERGENCY,
            keywords: vec![
                "chest pain",
                "can't breathe",
                "cannot breathe",
                "severe bleeding",
                "unconscious",
                "stroke",
                "heart attack",
                "emergency",
            ],
            regex: Some(Regex::new(r"\b911\b").unwrap()),
        },
        PatternRule {
            intent: APPOINTMENT_MODIFY,
            keywords: vec!["reschedule", "cancel my appointment", "change my appointment", "move my appointment"],
            regex: None,
        },
        PatternRule {
            intent: APPOINTMENT_BOOKING,
            keywords: vec!["book an appointment", "book appointment", "schedule a visit", "make an appointment", "see a doctor"],
            regex: None,
        },
        PatternRule {
            intent: POST_DISCHARGE,
            keywords: vec!["after discharge", "discharge instructions", "just got discharged", "post discharge"],
            regex: None,
        },
        PatternRule {
            intent: PRE_ADMISSION,
            keywords: vec!["before admission", "pre admission", "what to bring", "admission requirements"],
            regex: None,
        },
    ]
}

/// Pattern pass: lowercase the message, try each rule in order, first match wins.
pub fn match_pattern(rules: &[PatternRule], message: &str) -> Option<&'static str> {
    let lowercased = message.to_lowercase();
    rules.iter().find(|rule| rule.matches(&lowercased)).map(|rule| rule.intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_ordered_above_booking() {
        let rules = default_rules();
        let result = match_pattern(&rules, "chest pain — please book an appointment");
        assert_eq!(result, Some(MEDICAL_EMERGENCY));
    }

    #[test]
    fn plain_booking_request_matches_booking() {
        let rules = default_rules();
        let result = match_pattern(&rules, "I want to book an appointment with cardiology");
        assert_eq!(result, Some(APPOINTMENT_BOOKING));
    }

    #[test]
    fn unmatched_message_returns_none() {
        let rules = default_rules();
        assert_eq!(match_pattern(&rules, "what are your visiting hours?"), None);
    }

    #[test]
    fn word_boundary_prevents_substring_false_positive() {
        let rules = vec![PatternRule {
            intent: APPOINTMENT_BOOKING,
            keywords: vec!["book"],
            regex: None,
        }];
        assert_eq!(match_pattern(&rules, "notebook recommendations"), None);
    }
}
