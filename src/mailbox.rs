use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::config::MailboxConfig;
use crate::error::RelayError;

/// One fetched mailbox entry. Immutable once built; the pipeline never
/// mutates it.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// Stable across re-fetch: the IMAP UID when the server provides one,
    /// otherwise a composite of sequence number and internal date.
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub received: DateTime<Utc>,
    pub body: String,
}

/// Thin IMAP-over-TLS wrapper. Connects, selects INBOX, and materializes the
/// most recent N messages in full before the pipeline sees any of them.
/// All calls are blocking; the caller runs them off the async executor.
pub struct ImapMailbox {
    session: imap::Session<native_tls::TlsStream<std::net::TcpStream>>,
}

impl ImapMailbox {
    pub fn connect(config: &MailboxConfig) -> Result<Self, RelayError> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| RelayError::Session(format!("building TLS connector: {e}")))?;

        let client = imap::connect((config.host.as_str(), config.port), &config.host, &tls)
            .map_err(|e| {
                RelayError::Session(format!(
                    "connecting to {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        let session = client
            .login(&config.user, &config.password)
            .map_err(|(e, _)| RelayError::Session(format!("login as {}: {e}", config.user)))?;

        log::debug!("IMAP session established with {}", config.host);
        Ok(ImapMailbox { session })
    }

    /// Fetch up to `limit` of the most recent messages, in mailbox order.
    /// Messages that cannot be parsed are logged and dropped from the batch.
    pub fn fetch_recent(&mut self, limit: u32) -> Result<Vec<FetchedMessage>, RelayError> {
        let inbox = self
            .session
            .select("INBOX")
            .map_err(|e| RelayError::Session(format!("selecting INBOX: {e}")))?;

        if inbox.exists == 0 {
            return Ok(Vec::new());
        }

        let first = inbox.exists.saturating_sub(limit.saturating_sub(1)).max(1);
        let range = format!("{first}:{}", inbox.exists);
        let fetches = self
            .session
            .fetch(&range, "(UID INTERNALDATE RFC822)")
            .map_err(|e| RelayError::Session(format!("fetching {range}: {e}")))?;

        let mut batch = Vec::with_capacity(fetches.len());
        for fetch in fetches.iter() {
            match parse_fetch(fetch) {
                Some(message) => batch.push(message),
                None => log::warn!("dropping unparseable message (seq {})", fetch.message),
            }
        }
        Ok(batch)
    }

    pub fn logout(mut self) {
        if let Err(e) = self.session.logout() {
            log::debug!("IMAP logout failed: {e}");
        }
    }
}

fn parse_fetch(fetch: &imap::types::Fetch) -> Option<FetchedMessage> {
    let raw = fetch.body()?;
    let parsed = MessageParser::default().parse(raw)?;

    let sender = parsed
        .from()
        .and_then(|address| address.first())
        .and_then(|addr| addr.address.as_deref())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let subject = parsed.subject().unwrap_or_default().to_string();

    let received = fetch
        .internal_date()
        .map(|date| date.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let id = match fetch.uid {
        Some(uid) => format!("uid-{uid}"),
        None => format!("seq-{}-{}", fetch.message, received.timestamp()),
    };

    let body = parsed
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default();

    Some(FetchedMessage {
        id,
        sender,
        subject,
        received,
        body,
    })
}
