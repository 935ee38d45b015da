use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// How the cleaner picks the truncation point when several markers occur.
///
/// `ListPriority` replicates the legacy behavior real sender templates depend
/// on: markers are tried in their configured order and the first one that
/// occurs anywhere in the body wins, even if another marker appears earlier in
/// the document. `EarliestOccurrence` picks the marker closest to the top of
/// the document instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationStrategy {
    #[default]
    ListPriority,
    EarliestOccurrence,
}

/// One boilerplate-removal rule: a regex and its replacement (usually empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

/// One key-field extraction rule. Capture group 1 becomes the field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub label: String,
    pub pattern: String,
}

/// Sender-specific cleaning and extraction rules, selected by address match.
///
/// Adding support for a new sender is a registry entry, not new code: list the
/// address fragments that identify them, the strip rules for their template,
/// and the field rules for their posting format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderProfile {
    pub name: String,
    /// Case-insensitive substrings matched against the sender address.
    pub address_patterns: Vec<String>,
    /// Applied in order before any generic cleaning.
    #[serde(default)]
    pub strip_rules: Vec<StripRule>,
    /// Run against the original (uncleaned) body, in declared order.
    #[serde(default)]
    pub field_rules: Vec<FieldRule>,
}

/// On-disk form of the profile registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRegistry {
    pub profiles: Vec<SenderProfile>,
}

impl ProfileRegistry {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry: ProfileRegistry = serde_yaml::from_str(&content)?;
        Ok(registry)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mailbox: MailboxConfig,
    pub smtp: SmtpConfig,
    /// Forward destinations. Must be non-empty; the process refuses to start
    /// without somewhere to deliver.
    pub recruiters: Vec<String>,
    /// Address fragments identifying known contractor senders.
    pub contractors: Vec<String>,
    /// Address fragments that mark a sender as ignorable (CI, mailing lists).
    pub ignore_senders: Vec<String>,
    /// Present only when a completion-service credential is configured.
    pub completion: Option<CompletionConfig>,
    pub batch_size: u32,
    pub scan_interval_secs: u64,
    pub store_path: PathBuf,
    pub subject_tag: String,
    pub truncation: TruncationStrategy,
    pub profiles: Vec<SenderProfile>,
}

const DEFAULT_BATCH_SIZE: u32 = 30;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;
const DEFAULT_STORE_PATH: &str = "forwarded.json";
const DEFAULT_SUBJECT_TAG: &str = "JobRelay";
const DEFAULT_COMPLETION_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 512;

impl RelayConfig {
    /// Load all configuration from `JOBRELAY_*` environment variables.
    ///
    /// Fails fast on anything the process cannot run without: the recruiter
    /// list and the mailbox/SMTP coordinates. Everything else has a default.
    pub fn from_env() -> Result<Self, RelayError> {
        let recruiters = env_list("JOBRELAY_RECRUITERS");
        if recruiters.is_empty() {
            return Err(RelayError::MissingConfig(
                "JOBRELAY_RECRUITERS (comma-separated recruiter addresses)".to_string(),
            ));
        }

        let contractors = env_list("JOBRELAY_CONTRACTORS");
        if contractors.is_empty() {
            log::warn!("JOBRELAY_CONTRACTORS is empty; every message will be skipped as not-from-contractor");
        }

        let mailbox = MailboxConfig {
            host: required_env("JOBRELAY_IMAP_HOST")?,
            port: env_parsed("JOBRELAY_IMAP_PORT", 993),
            user: required_env("JOBRELAY_IMAP_USER")?,
            password: required_env("JOBRELAY_IMAP_PASSWORD")?,
        };

        let smtp_user = required_env("JOBRELAY_SMTP_USER")?;
        let smtp = SmtpConfig {
            host: required_env("JOBRELAY_SMTP_HOST")?,
            from_address: env_or("JOBRELAY_FROM", &smtp_user),
            password: required_env("JOBRELAY_SMTP_PASSWORD")?,
            user: smtp_user,
        };

        let completion = std::env::var("JOBRELAY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| CompletionConfig {
                api_key,
                endpoint: env_or("JOBRELAY_COMPLETION_URL", DEFAULT_COMPLETION_ENDPOINT),
                model: env_or("JOBRELAY_MODEL", DEFAULT_COMPLETION_MODEL),
                max_tokens: env_parsed("JOBRELAY_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            });

        let profiles = match std::env::var("JOBRELAY_PROFILES") {
            Ok(path) => {
                let registry = ProfileRegistry::from_file(&path).map_err(|e| {
                    RelayError::MissingConfig(format!("JOBRELAY_PROFILES ({path}): {e}"))
                })?;
                log::info!(
                    "loaded {} sender profile(s) from {path}",
                    registry.profiles.len()
                );
                registry.profiles
            }
            Err(_) => default_profiles(),
        };

        Ok(RelayConfig {
            mailbox,
            smtp,
            recruiters,
            contractors,
            ignore_senders: env_list("JOBRELAY_IGNORE_SENDERS"),
            completion,
            batch_size: env_parsed("JOBRELAY_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            scan_interval_secs: env_parsed("JOBRELAY_SCAN_INTERVAL", DEFAULT_SCAN_INTERVAL_SECS),
            store_path: PathBuf::from(env_or("JOBRELAY_STORE", DEFAULT_STORE_PATH)),
            subject_tag: env_or("JOBRELAY_TAG", DEFAULT_SUBJECT_TAG),
            truncation: parse_truncation(&env_or("JOBRELAY_TRUNCATION", "priority")),
            profiles,
        })
    }
}

fn required_env(key: &str) -> Result<String, RelayError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RelayError::MissingConfig(key.to_string()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| parse_list(&v))
        .unwrap_or_default()
}

fn parse_truncation(raw: &str) -> TruncationStrategy {
    match raw.trim().to_lowercase().as_str() {
        "earliest" | "earliest-occurrence" => TruncationStrategy::EarliestOccurrence,
        "priority" | "list-priority" => TruncationStrategy::ListPriority,
        other => {
            log::warn!("unknown truncation strategy {other:?}, using list-priority");
            TruncationStrategy::ListPriority
        }
    }
}

/// Built-in registry covering the two staffing vendors the relay started
/// with. Replaced wholesale when `JOBRELAY_PROFILES` points at a YAML file.
pub fn default_profiles() -> Vec<SenderProfile> {
    vec![
        SenderProfile {
            name: "talentpath".to_string(),
            address_patterns: vec![
                "talentpathllc.com".to_string(),
                "talentpath-jobs".to_string(),
            ],
            strip_rules: vec![
                StripRule {
                    pattern: r"(?ms)^Thanks\s*&\s*Regards.*\z".to_string(),
                    replacement: String::new(),
                },
                StripRule {
                    pattern: r"(?m)^(?:Direct|Desk|Phone|Fax|Gtalk|Hangout)\s*:.*$".to_string(),
                    replacement: String::new(),
                },
                StripRule {
                    pattern: r"(?i)TalentPath Staffing(?:, LLC)? is an E-Verified company\.?"
                        .to_string(),
                    replacement: String::new(),
                },
                StripRule {
                    pattern: r"(?m)^(?:Hi|Hello|Dear)\s+[A-Za-z ]{1,40},?\s*$".to_string(),
                    replacement: String::new(),
                },
            ],
            field_rules: vec![
                FieldRule {
                    label: "Role".to_string(),
                    pattern: r"(?im)^(?:Role|Position(?:\s+Title)?|Job Title)\s*:\s*(.+)$"
                        .to_string(),
                },
                FieldRule {
                    label: "Location".to_string(),
                    pattern: r"(?im)^(?:Location|Work Location)\s*:\s*(.+)$".to_string(),
                },
                FieldRule {
                    label: "Duration".to_string(),
                    pattern: r"(?im)^(?:Duration|Contract Length)\s*:\s*(.+)$".to_string(),
                },
                FieldRule {
                    label: "Due Date".to_string(),
                    pattern: r"(?im)^Due Date\s*:\s*(.+)$".to_string(),
                },
                FieldRule {
                    label: "Job ID".to_string(),
                    pattern: r"(?im)^(?:Job\s*ID|Req(?:uisition)?\s*(?:#|No\.?)?)\s*:\s*(.+)$"
                        .to_string(),
                },
                FieldRule {
                    label: "Category".to_string(),
                    pattern: r"(?im)^(?:Category|Practice Area)\s*:\s*(.+)$".to_string(),
                },
            ],
        },
        SenderProfile {
            name: "zenith".to_string(),
            address_patterns: vec![
                "zenithinfosys.com".to_string(),
                "zenith-staffing".to_string(),
            ],
            strip_rules: vec![
                StripRule {
                    pattern: r"(?ms)^Why Zenith\?.*\z".to_string(),
                    replacement: String::new(),
                },
                StripRule {
                    pattern: r"(?m)^(?:Tel|Cell|Web|USA|India)\s*:.*$".to_string(),
                    replacement: String::new(),
                },
                StripRule {
                    pattern: r"(?i)A Certified Minority Business Enterprise \(MBE\)\.?"
                        .to_string(),
                    replacement: String::new(),
                },
            ],
            field_rules: vec![
                FieldRule {
                    label: "Role".to_string(),
                    pattern: r"(?im)^(?:Need|Role|Position)\s*:\s*(.+)$".to_string(),
                },
                FieldRule {
                    label: "Location".to_string(),
                    pattern: r"(?im)^Location\s*:\s*(.+)$".to_string(),
                },
                FieldRule {
                    label: "Duration".to_string(),
                    pattern: r"(?im)^Duration(?:\s+of\s+engagement)?\s*:\s*(.+)$".to_string(),
                },
                FieldRule {
                    label: "Due Date".to_string(),
                    pattern: r"(?im)^Due Date\s*:\s*(.+)$".to_string(),
                },
            ],
        },
    ]
}
