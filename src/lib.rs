pub mod classifier;
pub mod cleaner;
pub mod config;
pub mod enrich;
pub mod error;
pub mod fields;
pub mod mailbox;
pub mod pipeline;
pub mod store;
pub mod transport;

pub use classifier::Classifier;
pub use cleaner::BodyCleaner;
pub use config::{RelayConfig, SenderProfile, TruncationStrategy};
pub use enrich::{JobExtractor, JobPosting};
pub use error::RelayError;
pub use mailbox::{FetchedMessage, ImapMailbox};
pub use pipeline::{Forwarder, ScanSummary};
pub use store::ForwardedStore;
pub use transport::{MailTransport, OutgoingEmail, SmtpSender};
