//! Mailbox poller: builds per-sender queries, fetches unseen messages and
//! records them in the processed-id ledger.
//!
//! The lookback window is a fixed safety margin, not a "since last run"
//! cursor: the ledger alone decides what is new. Ids are marked seen as
//! soon as their content is fetched, before extraction or delivery, so a
//! failed delivery is dropped rather than retried (at-most-once).

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::mailbox::Mailbox;
use crate::pipeline::types::RawEmail;
use crate::store::ProcessedLedger;

/// Default lookback window for searches.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

/// One poll cycle's search criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollQuery {
    pub senders: Vec<String>,
    pub subject_filter: Option<String>,
    pub since: NaiveDate,
}

impl PollQuery {
    /// Criteria for a search run today, looking back `lookback_days`.
    pub fn new(senders: &[String], subject_filter: Option<&str>, lookback_days: u64) -> Self {
        let today = Utc::now().date_naive();
        Self::at(senders, subject_filter, today, lookback_days)
    }

    /// Criteria relative to a given date.
    pub fn at(
        senders: &[String],
        subject_filter: Option<&str>,
        today: NaiveDate,
        lookback_days: u64,
    ) -> Self {
        let since = today
            .checked_sub_days(Days::new(lookback_days))
            .unwrap_or(NaiveDate::MIN);

        Self {
            senders: senders.to_vec(),
            subject_filter: subject_filter
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            since,
        }
    }

    /// Query string for one sender:
    /// `from:<sender> [subject:"<filter>"] after:<YYYY/MM/DD>`.
    pub fn query_for(&self, sender: &str) -> String {
        let mut query = format!("from:{sender}");
        if let Some(subject) = &self.subject_filter {
            query.push_str(&format!(" subject:\"{subject}\""));
        }
        query.push_str(&format!(" after:{}", self.since.format("%Y/%m/%d")));
        query
    }

    /// `(sender, query)` pairs in configured sender order.
    pub fn queries(&self) -> Vec<(&str, String)> {
        self.senders
            .iter()
            .map(|s| (s.as_str(), self.query_for(s)))
            .collect()
    }
}

/// Fetches unseen emails and owns the dedup ledger.
pub struct MailboxPoller {
    mailbox: Arc<dyn Mailbox>,
    ledger: ProcessedLedger,
}

impl MailboxPoller {
    pub fn new(mailbox: Arc<dyn Mailbox>, ledger: ProcessedLedger) -> Self {
        Self { mailbox, ledger }
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    /// Run every sender query and return the messages not seen before.
    ///
    /// Never fails: search and fetch errors are logged and the pass
    /// continues with the next sender or message. Messages that fail to
    /// fetch are left unmarked so the next cycle retries them.
    pub async fn poll(&mut self, query: &PollQuery) -> Vec<RawEmail> {
        let mut fresh = Vec::new();

        for (sender, q) in query.queries() {
            info!(query = %q, "Searching mailbox");

            let ids = match self.mailbox.search(&q).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!(sender, error = %e, "Mailbox search failed");
                    continue;
                }
            };

            if ids.is_empty() {
                info!(sender, "No new emails found");
                continue;
            }

            for id in ids {
                if self.ledger.has_seen(&id) {
                    debug!(id = %id, "Skipping already processed email");
                    continue;
                }

                let email = match self.mailbox.fetch(&id).await {
                    Ok(email) => email,
                    Err(e) => {
                        error!(id = %id, error = %e, "Failed to fetch email");
                        continue;
                    }
                };

                if let Err(e) = self.ledger.mark_seen(&id).await {
                    warn!(id = %id, error = %e, "Failed to persist processed email id");
                }

                info!(
                    id = %email.id,
                    sender = %email.sender,
                    subject = %email.subject,
                    date = %email.date_header,
                    "Fetched new email"
                );
                fresh.push(email);
            }
        }

        fresh
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::MailboxError;

    fn senders(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── Query construction ──────────────────────────────────────────

    #[test]
    fn query_with_subject() {
        let q = PollQuery::at(
            &senders(&["no.reply.inreach@garmin.com"]),
            Some("inReach message from Sam"),
            day(2024, 3, 10),
            7,
        );
        assert_eq!(
            q.query_for("no.reply.inreach@garmin.com"),
            "from:no.reply.inreach@garmin.com subject:\"inReach message from Sam\" after:2024/03/03"
        );
    }

    #[test]
    fn query_without_subject() {
        let q = PollQuery::at(&senders(&["a@b.c"]), None, day(2024, 1, 3), 7);
        assert_eq!(q.query_for("a@b.c"), "from:a@b.c after:2023/12/27");
    }

    #[test]
    fn blank_subject_is_no_filter() {
        let q = PollQuery::at(&senders(&["a@b.c"]), Some("  "), day(2024, 1, 3), 7);
        assert_eq!(q.subject_filter, None);
    }

    #[test]
    fn one_query_per_sender_in_order() {
        let q = PollQuery::at(&senders(&["x@a.com", "y@b.com"]), None, day(2024, 5, 20), 7);
        let queries = q.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].0, "x@a.com");
        assert_eq!(queries[1].1, "from:y@b.com after:2024/05/13");
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// In-memory mailbox: query → ids, plus the set of fetchable messages.
    #[derive(Default)]
    struct FakeMailbox {
        results: Vec<(String, Vec<String>)>,
        failing_fetch: Vec<String>,
        failing_search: bool,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailbox for FakeMailbox {
        async fn search(&self, query: &str) -> Result<Vec<String>, MailboxError> {
            if self.failing_search {
                return Err(MailboxError::RateLimited { retry_after: None });
            }
            Ok(self
                .results
                .iter()
                .filter(|(prefix, _)| query.starts_with(prefix.as_str()))
                .flat_map(|(_, ids)| ids.clone())
                .collect())
        }

        async fn fetch(&self, id: &str) -> Result<RawEmail, MailboxError> {
            if self.failing_fetch.iter().any(|f| f == id) {
                return Err(MailboxError::RequestFailed {
                    operation: "messages.get".into(),
                    reason: "boom".into(),
                });
            }
            self.fetched.lock().unwrap().push(id.to_string());
            Ok(RawEmail {
                id: id.to_string(),
                sender: "a@b.c".into(),
                subject: "s".into(),
                date_header: String::new(),
                received_at: Utc::now(),
                body: format!("body of {id}"),
            })
        }
    }

    async fn ledger(dir: &tempfile::TempDir) -> ProcessedLedger {
        ProcessedLedger::load(dir.path().join("ids.txt")).await.unwrap()
    }

    #[tokio::test]
    async fn second_poll_returns_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Arc::new(FakeMailbox {
            results: vec![("from:a@b.c".into(), vec!["1".into(), "2".into()])],
            ..Default::default()
        });
        let mut poller = MailboxPoller::new(mailbox.clone(), ledger(&dir).await);
        let query = PollQuery::new(&senders(&["a@b.c"]), None, 7);

        let first = poller.poll(&query).await;
        assert_eq!(first.len(), 2);

        let second = poller.poll(&query).await;
        assert!(second.is_empty());
        // Full content fetched only once per id.
        assert_eq!(*mailbox.fetched.lock().unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn ids_seen_in_previous_run_are_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ids.txt"), "1\n").unwrap();

        let mailbox = Arc::new(FakeMailbox {
            results: vec![("from:a@b.c".into(), vec!["1".into(), "2".into()])],
            ..Default::default()
        });
        let mut poller = MailboxPoller::new(mailbox.clone(), ledger(&dir).await);

        let emails = poller.poll(&PollQuery::new(&senders(&["a@b.c"]), None, 7)).await;
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, "2");
        assert_eq!(*mailbox.fetched.lock().unwrap(), vec!["2"]);
    }

    #[tokio::test]
    async fn fetch_failure_is_skipped_and_retried_later() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Arc::new(FakeMailbox {
            results: vec![("from:a@b.c".into(), vec!["1".into(), "2".into()])],
            failing_fetch: vec!["1".into()],
            ..Default::default()
        });
        let mut poller = MailboxPoller::new(mailbox, ledger(&dir).await);

        let emails = poller.poll(&PollQuery::new(&senders(&["a@b.c"]), None, 7)).await;
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, "2");
        assert!(!poller.ledger().has_seen("1"));
        assert!(poller.ledger().has_seen("2"));
    }

    #[tokio::test]
    async fn search_failure_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Arc::new(FakeMailbox {
            failing_search: true,
            ..Default::default()
        });
        let mut poller = MailboxPoller::new(mailbox, ledger(&dir).await);

        let emails = poller.poll(&PollQuery::new(&senders(&["a@b.c"]), None, 7)).await;
        assert!(emails.is_empty());
    }

    #[tokio::test]
    async fn same_id_from_two_senders_returned_once() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Arc::new(FakeMailbox {
            results: vec![
                ("from:a@b.c".into(), vec!["7".into()]),
                ("from:d@e.f".into(), vec!["7".into()]),
            ],
            ..Default::default()
        });
        let mut poller = MailboxPoller::new(mailbox, ledger(&dir).await);

        let emails = poller
            .poll(&PollQuery::new(&senders(&["a@b.c", "d@e.f"]), None, 7))
            .await;
        assert_eq!(emails.len(), 1);
    }
}
