//! Per-message sender aggregation.
//!
//! [`HistoryAggregator`] consumes messages one at a time in newest-first order
//! and decides for each whether to stop, skip, or tally it. It never performs
//! I/O and never fails: messages without a sender, without a username, or
//! without a date are skipped, not rejected.

use std::collections::HashMap;
use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::config::{LAST_MESSAGE_DATE_FORMAT, UNKNOWN_DATE};
use crate::session::{MessageRecord, SenderRef};

/// One unique sender seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderRecord {
    /// Lower-cased username; identity within one scan
    #[serde(skip)]
    pub username_key: String,
    /// Username as first observed
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub id: i64,
    pub message_count: u64,
    #[serde(serialize_with = "serialize_last_message_date")]
    pub last_message_date: Option<DateTime<Utc>>,
}

impl SenderRecord {
    fn first_sighting(
        username_key: String,
        username: &str,
        sender: &SenderRef,
        date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            username_key,
            username: username.to_string(),
            first_name: sender.first_name.clone().unwrap_or_default(),
            last_name: sender.last_name.clone().unwrap_or_default(),
            id: sender.id,
            message_count: 1,
            last_message_date: date,
        }
    }
}

fn serialize_last_message_date<S: Serializer>(
    date: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => serializer.collect_str(&date.format(LAST_MESSAGE_DATE_FORMAT)),
        None => serializer.serialize_str(UNKNOWN_DATE),
    }
}

/// Outcome of feeding one message to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Pull the next message
    Continue,
    /// Stop scanning; the message was older than the cutoff
    Stop,
}

/// Streaming sender tally for a single scan.
#[derive(Debug)]
pub struct HistoryAggregator {
    message_limit: NonZeroU64,
    cutoff: Option<DateTime<Utc>>,
    messages_scanned: u64,
    /// Records in first-discovery order
    senders: Vec<SenderRecord>,
    /// username_key -> index into `senders`
    index: HashMap<String, usize>,
}

impl HistoryAggregator {
    /// Create an aggregator pulling at most `message_limit` messages and
    /// stopping at the first message dated strictly before `cutoff`.
    pub fn new(message_limit: NonZeroU64, cutoff: Option<DateTime<Utc>>) -> Self {
        Self {
            message_limit,
            cutoff,
            messages_scanned: 0,
            senders: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Whether another message may be pulled without exceeding the limit
    pub fn wants_more(&self) -> bool {
        self.messages_scanned < self.message_limit.get()
    }

    pub fn messages_scanned(&self) -> u64 {
        self.messages_scanned
    }

    pub fn unique_senders(&self) -> usize {
        self.senders.len()
    }

    /// Feed the next message of the newest-first history.
    pub fn observe(&mut self, message: &MessageRecord) -> Step {
        self.messages_scanned += 1;

        if let (Some(cutoff), Some(date)) = (self.cutoff, message.date) {
            if date < cutoff {
                return Step::Stop;
            }
        }

        let Some(sender) = message.sender.as_ref() else {
            return Step::Continue;
        };
        let Some(username) = sender.username() else {
            return Step::Continue;
        };

        let username_key = username.to_lowercase();
        match self.index.get(&username_key) {
            Some(&slot) => {
                let record = &mut self.senders[slot];
                record.message_count += 1;
                if message.date.is_some() {
                    record.last_message_date = message.date;
                }
            }
            None => {
                self.index.insert(username_key.clone(), self.senders.len());
                self.senders.push(SenderRecord::first_sighting(
                    username_key,
                    username,
                    sender,
                    message.date,
                ));
            }
        }

        Step::Continue
    }

    /// Senders ordered by message count, most active first. Equal counts keep
    /// discovery order.
    pub fn finish(self) -> Vec<SenderRecord> {
        let mut senders = self.senders;
        // sort_by is stable
        senders.sort_by(|a, b| b.message_count.cmp(&a.message_count));
        senders
    }
}
