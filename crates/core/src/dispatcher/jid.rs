//! Job id allocation.

use chrono::{DateTime, Utc};

/// Hands out timestamp-shaped job ids (`YYYYMMDDhhmmssffffff`).
///
/// Ids from one generator are strictly increasing even when several are
/// requested within the same microsecond.
#[derive(Debug, Default)]
pub struct JidGenerator {
    last: Option<u128>,
}

impl JidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_jid(&mut self) -> String {
        self.next_at(Utc::now())
    }

    fn next_at(&mut self, now: DateTime<Utc>) -> String {
        let stamp: u128 = now
            .format("%Y%m%d%H%M%S%6f")
            .to_string()
            .parse()
            .unwrap_or_default();

        let jid = match self.last {
            Some(last) if stamp <= last => last + 1,
            _ => stamp,
        };
        self.last = Some(jid);
        format!("{:020}", jid)
    }
}
