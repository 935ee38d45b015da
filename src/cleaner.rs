use regex::Regex;

use crate::classifier::CompiledProfile;
use crate::config::TruncationStrategy;

/// Job-posting start markers, in priority order. Under the default
/// `ListPriority` strategy the first marker in THIS list that occurs anywhere
/// in the body wins, and the body is truncated to start at that marker's
/// first occurrence. A marker later in the list is only considered when every
/// earlier one is absent, even if it sits closer to the top of the document.
pub const START_MARKERS: &[&str] = &[
    "DUE DATE:",
    "POSITION:",
    "JOB TITLE:",
    "LOCATION:",
    "Duration of engagement:",
    "Job Description:",
    "Position Description:",
    "Position Title:",
    "Need:",
    "Role:",
];

/// Legal/unsubscribe footer markers, same priority policy as `START_MARKERS`.
/// Everything from the chosen marker onward is discarded.
pub const FOOTER_MARKERS: &[&str] = &[
    "CONFIDENTIALITY NOTICE",
    "Confidentiality Notice",
    "This e-mail and any files transmitted with it are confidential",
    "This email and any attachments are confidential",
    "IRS Circular 230",
    "Circular 230 Disclosure",
    "Please consider the environment before printing",
    "If you do not wish to receive",
    "To unsubscribe",
    "click here to unsubscribe",
    "To be removed from our mailing list",
];

/// Deterministic, profile-aware body cleaner.
///
/// The steps run in a fixed order because later ones assume earlier ones
/// already removed structural noise: profile strip rules, generic forwarded
/// headers and separators, whitespace collapsing, start truncation, footer
/// truncation, final collapse. Each step is heuristic text surgery on its own
/// region and leaves the rest of the document alone.
pub struct BodyCleaner {
    strategy: TruncationStrategy,
    header_line: Regex,
    separator_line: Regex,
    forwarded_marker: Regex,
    whitespace_line: Regex,
    blank_run: Regex,
}

impl BodyCleaner {
    pub fn new(strategy: TruncationStrategy) -> Self {
        BodyCleaner {
            strategy,
            header_line: Regex::new(r"(?m)^(?:From|Sent|To|Subject|Cc|Date):[^\n]*\n?").unwrap(),
            separator_line: Regex::new(r"(?m)^[ \t]*(?:-{2,}|_{2,})[ \t]*$").unwrap(),
            forwarded_marker: Regex::new(
                r"(?mi)^[ \t>-]*(?:begin[ \t]+)?forwarded[ \t]+message[: \t-]*$",
            )
            .unwrap(),
            whitespace_line: Regex::new(r"(?m)^[ \t]+$").unwrap(),
            blank_run: Regex::new(r"\n{3,}").unwrap(),
        }
    }

    /// Produce the cleaned body. The original is never modified.
    pub fn clean(&self, body: &str, profile: Option<&CompiledProfile>) -> String {
        let mut text = body.replace("\r\n", "\n");

        if let Some(profile) = profile {
            for (pattern, replacement) in &profile.strip_rules {
                text = pattern.replace_all(&text, replacement.as_str()).into_owned();
            }
        }

        text = self.header_line.replace_all(&text, "").into_owned();
        text = self.forwarded_marker.replace_all(&text, "").into_owned();
        text = self.separator_line.replace_all(&text, "").into_owned();
        text = self.collapse(&text);

        if let Some(pos) = self.marker_position(&text, START_MARKERS) {
            text = text[pos..].to_string();
        }
        if let Some(pos) = self.marker_position(&text, FOOTER_MARKERS) {
            text.truncate(pos);
        }

        self.collapse(&text)
    }

    fn collapse(&self, text: &str) -> String {
        let text = self.whitespace_line.replace_all(text, "");
        let text = self.blank_run.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    fn marker_position(&self, text: &str, markers: &[&str]) -> Option<usize> {
        match self.strategy {
            TruncationStrategy::ListPriority => {
                markers.iter().find_map(|marker| text.find(marker))
            }
            TruncationStrategy::EarliestOccurrence => {
                markers.iter().filter_map(|marker| text.find(marker)).min()
            }
        }
    }
}

impl Default for BodyCleaner {
    fn default() -> Self {
        Self::new(TruncationStrategy::ListPriority)
    }
}
