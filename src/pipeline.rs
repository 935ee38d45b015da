use std::fmt;

use crate::classifier::Classifier;
use crate::cleaner::BodyCleaner;
use crate::config::RelayConfig;
use crate::enrich::JobExtractor;
use crate::error::RelayError;
use crate::fields;
use crate::mailbox::FetchedMessage;
use crate::store::ForwardedStore;
use crate::transport::{MailTransport, OutgoingEmail};

/// First line of every forwarded body, ahead of the key-field block.
const FORWARD_BANNER: &str = "[Forwarded contractor job posting]";

/// Per-scan counters, logged when the batch finishes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub fetched: usize,
    pub forwarded: usize,
    pub already_forwarded: usize,
    pub system: usize,
    pub unknown_sender: usize,
    pub send_failures: usize,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scan complete: {} fetched, {} forwarded, {} already forwarded, \
             {} system, {} non-contractor, {} send failure(s)",
            self.fetched,
            self.forwarded,
            self.already_forwarded,
            self.system,
            self.unknown_sender,
            self.send_failures
        )
    }
}

/// Drives the per-message pipeline: dedup check, classification, cleaning,
/// key-field extraction, best-effort enrichment, composition, send, record.
///
/// Messages are processed strictly in batch order. Every skip point logs and
/// moves on; nothing aborts the batch. A send failure leaves the message
/// unrecorded so the next scheduled scan retries it; the durable ledger is
/// the only retry mechanism.
pub struct Forwarder {
    recruiters: Vec<String>,
    from_address: String,
    subject_tag: String,
    classifier: Classifier,
    cleaner: BodyCleaner,
    enricher: Option<JobExtractor>,
    transport: Box<dyn MailTransport>,
    store: ForwardedStore,
}

impl Forwarder {
    pub fn new(
        config: &RelayConfig,
        transport: Box<dyn MailTransport>,
        enricher: Option<JobExtractor>,
        store: ForwardedStore,
    ) -> Result<Self, RelayError> {
        let classifier = Classifier::new(
            &config.ignore_senders,
            &config.contractors,
            &config.profiles,
        )?;
        Ok(Forwarder {
            recruiters: config.recruiters.clone(),
            from_address: config.smtp.from_address.clone(),
            subject_tag: config.subject_tag.clone(),
            classifier,
            cleaner: BodyCleaner::new(config.truncation),
            enricher,
            transport,
            store,
        })
    }

    pub async fn process_batch(&mut self, batch: &[FetchedMessage]) -> ScanSummary {
        let mut summary = ScanSummary {
            fetched: batch.len(),
            ..Default::default()
        };

        for message in batch {
            if self.store.contains(&message.id) {
                log::debug!("skipping {}: already forwarded", message.id);
                summary.already_forwarded += 1;
                continue;
            }
            if self
                .classifier
                .is_system_email(&message.sender, &message.subject)
            {
                log::debug!("skipping {}: system notification", message.id);
                summary.system += 1;
                continue;
            }
            if !self.classifier.is_from_known_contractor(&message.sender) {
                log::debug!(
                    "skipping {}: not from a known contractor ({})",
                    message.id,
                    message.sender
                );
                summary.unknown_sender += 1;
                continue;
            }

            match self.forward(message).await {
                Ok(()) => {
                    log::info!(
                        "forwarded {} ({:?}) to {} recipient(s)",
                        message.id,
                        message.subject,
                        self.recruiters.len()
                    );
                    summary.forwarded += 1;
                    self.store.record(&message.id);
                }
                Err(e) => {
                    log::error!(
                        "forwarding {} failed, eligible again next scan: {e:#}",
                        message.id
                    );
                    summary.send_failures += 1;
                }
            }
        }

        log::info!("{summary}");
        summary
    }

    async fn forward(&self, message: &FetchedMessage) -> anyhow::Result<()> {
        let profile = self.classifier.select_profile(&message.sender);
        if let Some(profile) = profile {
            log::debug!("{}: using profile '{}'", message.id, profile.name);
        }

        let cleaned = self.cleaner.clean(&message.body, profile);
        let block = profile
            .map(|p| fields::summary_block(&message.body, p))
            .unwrap_or_default();

        if let Some(enricher) = &self.enricher {
            if let Some(posting) = enricher.extract(&cleaned, &message.subject).await {
                log::info!(
                    "{}: enriched as {:?} (confidence {:.2})",
                    message.id,
                    posting.title.as_deref().unwrap_or("untitled"),
                    posting.confidence
                );
            }
        }

        let mail = OutgoingEmail {
            from: self.from_address.clone(),
            to: self.recruiters.clone(),
            subject: compose_subject(&message.subject, &self.subject_tag),
            body: compose_body(&block, &cleaned),
        };
        self.transport.send(&mail).await
    }
}

/// Outgoing subject: the original with the literal `Fwd:` and `Need:` labels
/// removed and whitespace trimmed, behind the program tag.
pub fn compose_subject(subject: &str, tag: &str) -> String {
    let stripped = subject.replace("Fwd:", "").replace("Need:", "");
    format!("{tag} - {}", stripped.trim())
}

fn compose_body(field_block: &str, cleaned: &str) -> String {
    let mut body = String::with_capacity(
        FORWARD_BANNER.len() + field_block.len() + cleaned.len() + 4,
    );
    body.push_str(FORWARD_BANNER);
    body.push_str("\n\n");
    body.push_str(field_block);
    body.push_str(cleaned);
    body.push('\n');
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::config::{
        default_profiles, MailboxConfig, RelayConfig, SmtpConfig, TruncationStrategy,
    };

    struct MockTransport {
        sent: Arc<Mutex<Vec<OutgoingEmail>>>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MailTransport for MockTransport {
        async fn send(&self, mail: &OutgoingEmail) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated SMTP failure");
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct TestRig {
        sent: Arc<Mutex<Vec<OutgoingEmail>>>,
        fail: Arc<AtomicBool>,
        config: RelayConfig,
    }

    impl TestRig {
        fn new(store_path: &Path) -> Self {
            TestRig {
                sent: Arc::new(Mutex::new(Vec::new())),
                fail: Arc::new(AtomicBool::new(false)),
                config: RelayConfig {
                    mailbox: MailboxConfig {
                        host: "imap.example.com".to_string(),
                        port: 993,
                        user: "relay@example.com".to_string(),
                        password: "secret".to_string(),
                    },
                    smtp: SmtpConfig {
                        host: "smtp.example.com".to_string(),
                        user: "relay@example.com".to_string(),
                        password: "secret".to_string(),
                        from_address: "relay@example.com".to_string(),
                    },
                    recruiters: vec![
                        "first@agency.example".to_string(),
                        "second@agency.example".to_string(),
                    ],
                    contractors: vec!["talentpathllc.com".to_string()],
                    ignore_senders: vec!["jenkins@".to_string()],
                    completion: None,
                    batch_size: 30,
                    scan_interval_secs: 300,
                    store_path: store_path.to_path_buf(),
                    subject_tag: "JobRelay".to_string(),
                    truncation: TruncationStrategy::ListPriority,
                    profiles: default_profiles(),
                },
            }
        }

        fn forwarder(&self) -> Forwarder {
            let transport = Box::new(MockTransport {
                sent: self.sent.clone(),
                fail: self.fail.clone(),
            });
            let store = ForwardedStore::load(&self.config.store_path);
            Forwarder::new(&self.config, transport, None, store).unwrap()
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    fn message(id: &str, sender: &str, subject: &str, body: &str) -> FetchedMessage {
        FetchedMessage {
            id: id.to_string(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            received: Utc::now(),
            body: body.to_string(),
        }
    }

    fn posting(id: &str) -> FetchedMessage {
        message(
            id,
            "raj@talentpathllc.com",
            "Fwd: Need: Senior Java Dev",
            "Hi Team,\nRole: Senior Java Developer\nLocation: Austin, TX\nGreat role.\n",
        )
    }

    #[tokio::test]
    async fn test_eligible_message_is_forwarded_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let mut forwarder = rig.forwarder();

        let summary = forwarder.process_batch(&[posting("uid-1")]).await;
        assert_eq!(summary.forwarded, 1);
        assert_eq!(rig.sent_count(), 1);

        let sent = rig.sent.lock().unwrap();
        let mail = &sent[0];
        assert_eq!(mail.subject, "JobRelay - Senior Java Dev");
        assert_eq!(mail.to.len(), 2);
        assert!(mail.body.starts_with(FORWARD_BANNER));
        assert!(mail.body.contains("Role: Senior Java Developer"));
        drop(sent);

        assert!(ForwardedStore::load(&rig.config.store_path).contains("uid-1"));
    }

    #[tokio::test]
    async fn test_second_run_forwards_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let batch = vec![posting("uid-1"), posting("uid-2")];

        let first = rig.forwarder().process_batch(&batch).await;
        assert_eq!(first.forwarded, 2);

        // Fresh forwarder, same persisted store: the identical batch is a
        // no-op.
        let second = rig.forwarder().process_batch(&batch).await;
        assert_eq!(second.forwarded, 0);
        assert_eq!(second.already_forwarded, 2);
        assert_eq!(rig.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_system_email_never_reaches_transport() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let mut forwarder = rig.forwarder();

        let batch = vec![
            message("uid-1", "jenkins@ci.example.com", "nightly", "Role: x"),
            message(
                "uid-2",
                "raj@talentpathllc.com",
                "Build #17 failed",
                "Role: x",
            ),
        ];
        let summary = forwarder.process_batch(&batch).await;
        assert_eq!(summary.system, 2);
        assert_eq!(rig.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_sender_never_reaches_transport() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let mut forwarder = rig.forwarder();

        let batch = vec![message(
            "uid-1",
            "someone@random.example",
            "Need: Java Developer",
            "Role: Java Developer\nDUE DATE: 5/1",
        )];
        let summary = forwarder.process_batch(&batch).await;
        assert_eq!(summary.unknown_sender, 1);
        assert_eq!(rig.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_message_eligible_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let batch = vec![posting("uid-1")];

        rig.fail.store(true, Ordering::SeqCst);
        let summary = rig.forwarder().process_batch(&batch).await;
        assert_eq!(summary.send_failures, 1);
        assert_eq!(summary.forwarded, 0);
        assert!(!ForwardedStore::load(&rig.config.store_path).contains("uid-1"));

        // Next scheduled scan: transport recovered, message goes out.
        rig.fail.store(false, Ordering::SeqCst);
        let summary = rig.forwarder().process_batch(&batch).await;
        assert_eq!(summary.forwarded, 1);
        assert!(ForwardedStore::load(&rig.config.store_path).contains("uid-1"));
    }

    #[tokio::test]
    async fn test_batch_continues_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let mut forwarder = rig.forwarder();

        let batch = vec![
            message("uid-1", "jenkins@ci.example.com", "noise", "x"),
            posting("uid-2"),
            message("uid-3", "stranger@example.com", "hello", "x"),
            posting("uid-4"),
        ];
        let summary = forwarder.process_batch(&batch).await;
        assert_eq!(summary.forwarded, 2);
        assert_eq!(summary.system, 1);
        assert_eq!(summary.unknown_sender, 1);
    }

    #[tokio::test]
    async fn test_no_enricher_still_forwards_and_records() {
        // The rig never configures a completion credential, so this is the
        // no-credential path end to end.
        let dir = tempfile::tempdir().unwrap();
        let rig = TestRig::new(&dir.path().join("forwarded.json"));
        let summary = rig.forwarder().process_batch(&[posting("uid-9")]).await;
        assert_eq!(summary.forwarded, 1);
        assert!(ForwardedStore::load(&rig.config.store_path).contains("uid-9"));
    }

    #[tokio::test]
    async fn test_corrupt_store_file_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("forwarded.json");
        std::fs::write(&store_path, "][ not json").unwrap();

        let rig = TestRig::new(&store_path);
        let summary = rig.forwarder().process_batch(&[posting("uid-1")]).await;
        assert_eq!(summary.forwarded, 1);
    }

    #[tokio::test]
    async fn test_message_without_profile_gets_generic_cleaning_only() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("forwarded.json");
        let mut rig = TestRig::new(&store_path);
        rig.config.contractors.push("freelance.example".to_string());

        let batch = vec![message(
            "uid-1",
            "indie@freelance.example",
            "Opening",
            "From: someone\nJob Description:\nShip software\n",
        )];
        let summary = rig.forwarder().process_batch(&batch).await;
        assert_eq!(summary.forwarded, 1);

        let sent = rig.sent.lock().unwrap();
        let body = &sent[0].body;
        assert!(body.contains("Job Description:"));
        // No profile matched, so no key-field block borders.
        assert!(!body.contains(crate::fields::BLOCK_BORDER));
    }

    #[test]
    fn test_compose_subject_strips_labels_and_trims() {
        assert_eq!(
            compose_subject("Fwd: Need: Senior Java Dev", "JobRelay"),
            "JobRelay - Senior Java Dev"
        );
        assert_eq!(compose_subject("Plain subject", "JobRelay"), "JobRelay - Plain subject");
        assert_eq!(compose_subject("Need:Need: x", "Tag"), "Tag - x");
    }
}
