use regex::Regex;

use crate::config::SenderProfile;
use crate::error::RelayError;

/// A sender profile with its rule patterns compiled once at startup.
#[derive(Debug)]
pub struct CompiledProfile {
    pub name: String,
    address_patterns: Vec<String>,
    pub strip_rules: Vec<(Regex, String)>,
    pub field_rules: Vec<(String, Regex)>,
}

impl CompiledProfile {
    fn compile(profile: &SenderProfile) -> Result<Self, RelayError> {
        let compile_one = |pattern: &str| {
            Regex::new(pattern).map_err(|source| RelayError::InvalidProfile {
                profile: profile.name.clone(),
                pattern: pattern.to_string(),
                source,
            })
        };

        let mut strip_rules = Vec::with_capacity(profile.strip_rules.len());
        for rule in &profile.strip_rules {
            strip_rules.push((compile_one(&rule.pattern)?, rule.replacement.clone()));
        }

        let mut field_rules = Vec::with_capacity(profile.field_rules.len());
        for rule in &profile.field_rules {
            field_rules.push((rule.label.clone(), compile_one(&rule.pattern)?));
        }

        Ok(CompiledProfile {
            name: profile.name.clone(),
            address_patterns: profile
                .address_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            strip_rules,
            field_rules,
        })
    }

    fn matches_address(&self, from_lower: &str) -> bool {
        self.address_patterns.iter().any(|p| from_lower.contains(p))
    }
}

/// Decides, per message, whether it is a system notification, whether it came
/// from a recognized contractor, and which cleaning profile applies.
#[derive(Debug)]
pub struct Classifier {
    ignore_senders: Vec<String>,
    contractors: Vec<String>,
    system_subject_patterns: Vec<Regex>,
    profiles: Vec<CompiledProfile>,
}

// Subjects that mark automated traffic we never forward. These are fixed
// because they describe machine senders, not any particular contractor.
const SYSTEM_SUBJECT_PATTERNS: &[&str] = &[
    r"(?i)\bbuild\b.*\b(?:failed|failure|succeeded)\b",
    r"(?i)\bdeploy(?:ment)?\b.*\b(?:failed|failure|complete)\b",
    r"(?i)\bunsubscribe[d]?\b",
    r"(?i)\bautomat(?:ed|ic)\b.*\b(?:message|reply|response|notification)\b",
    r"(?i)\bauto[- ]?reply\b",
    r"(?i)\bout of (?:the )?office\b",
    r"(?i)\bdelivery status notification\b",
    r"(?i)\bundeliverable\b",
    r"(?i)\bmailer-daemon\b",
];

impl Classifier {
    pub fn new(
        ignore_senders: &[String],
        contractors: &[String],
        profiles: &[SenderProfile],
    ) -> Result<Self, RelayError> {
        let compiled = profiles
            .iter()
            .map(CompiledProfile::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Classifier {
            ignore_senders: ignore_senders.iter().map(|s| s.to_lowercase()).collect(),
            contractors: contractors.iter().map(|s| s.to_lowercase()).collect(),
            system_subject_patterns: SYSTEM_SUBJECT_PATTERNS
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
            profiles: compiled,
        })
    }

    /// True for automated traffic: a sender containing any configured ignore
    /// fragment, or a subject matching a system-notification pattern. The
    /// sender check runs first; either match short-circuits.
    pub fn is_system_email(&self, from_address: &str, subject: &str) -> bool {
        let from_lower = from_address.to_lowercase();
        if self.ignore_senders.iter().any(|s| from_lower.contains(s)) {
            return true;
        }
        self.system_subject_patterns
            .iter()
            .any(|re| re.is_match(subject))
    }

    pub fn is_from_known_contractor(&self, from_address: &str) -> bool {
        let from_lower = from_address.to_lowercase();
        self.contractors.iter().any(|c| from_lower.contains(c))
    }

    /// First profile whose address patterns match wins; no match means the
    /// message gets only the generic cleaning pass.
    pub fn select_profile(&self, from_address: &str) -> Option<&CompiledProfile> {
        let from_lower = from_address.to_lowercase();
        self.profiles.iter().find(|p| p.matches_address(&from_lower))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_profiles, FieldRule, StripRule};

    fn test_classifier() -> Classifier {
        Classifier::new(
            &["jenkins@".to_string(), "noreply.example.com".to_string()],
            &["talentpathllc.com".to_string(), "zenithinfosys.com".to_string()],
            &default_profiles(),
        )
        .unwrap()
    }

    #[test]
    fn test_ignored_sender_is_system_email() {
        let c = test_classifier();
        assert!(c.is_system_email("Jenkins@ci.example.com", "nightly results"));
        assert!(c.is_system_email("alerts@NoReply.Example.Com", "anything"));
        assert!(!c.is_system_email("raj@talentpathllc.com", "New opening"));
    }

    #[test]
    fn test_system_subject_patterns() {
        let c = test_classifier();
        assert!(c.is_system_email("someone@example.com", "Build #42 failed"));
        assert!(c.is_system_email("someone@example.com", "Deployment failed on prod"));
        assert!(c.is_system_email("someone@example.com", "You have been unsubscribed"));
        assert!(c.is_system_email("someone@example.com", "Automated reply: vacation"));
        assert!(c.is_system_email("someone@example.com", "Out of Office until Monday"));
        assert!(!c.is_system_email("someone@example.com", "Need: Java Developer"));
    }

    #[test]
    fn test_contractor_match_is_case_insensitive() {
        let c = test_classifier();
        assert!(c.is_from_known_contractor("Raj Kumar <raj@TalentPathLLC.com>"));
        assert!(c.is_from_known_contractor("jobs@zenithinfosys.com"));
        assert!(!c.is_from_known_contractor("friend@gmail.com"));
    }

    #[test]
    fn test_profile_selection_first_match_wins() {
        let c = test_classifier();
        assert_eq!(
            c.select_profile("raj@talentpathllc.com").map(|p| p.name.as_str()),
            Some("talentpath")
        );
        assert_eq!(
            c.select_profile("jobs@ZENITHINFOSYS.COM").map(|p| p.name.as_str()),
            Some("zenith")
        );
        assert!(c.select_profile("stranger@example.com").is_none());
    }

    #[test]
    fn test_invalid_profile_pattern_is_rejected() {
        let profile = SenderProfile {
            name: "broken".to_string(),
            address_patterns: vec!["broken.example".to_string()],
            strip_rules: vec![StripRule {
                pattern: "(unclosed".to_string(),
                replacement: String::new(),
            }],
            field_rules: vec![],
        };
        let err = Classifier::new(&[], &[], &[profile]).unwrap_err();
        match err {
            RelayError::InvalidProfile { profile, .. } => assert_eq!(profile, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_field_rules_keep_declared_order() {
        let profile = SenderProfile {
            name: "ordered".to_string(),
            address_patterns: vec!["ordered.example".to_string()],
            strip_rules: vec![],
            field_rules: vec![
                FieldRule {
                    label: "B".to_string(),
                    pattern: "b:(.*)".to_string(),
                },
                FieldRule {
                    label: "A".to_string(),
                    pattern: "a:(.*)".to_string(),
                },
            ],
        };
        let c = Classifier::new(&[], &[], &[profile]).unwrap();
        let compiled = c.select_profile("x@ordered.example").unwrap();
        let labels: Vec<&str> = compiled.field_rules.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["B", "A"]);
    }
}
