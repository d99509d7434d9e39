use crate::atom::retry::{RetryPolicy, with_retry};
use crate::atom::transport::SourceTransport;
use crate::sync::source::{Page, PendingRecord, RecordSource, SourceRecord};
use anyhow::{Context, Result};
use serde_json::Value;

/// Paginated reader over the source API's information objects.
pub struct AtomSource<T: SourceTransport> {
    transport: T,
    api_url: String,
    query: String,
    retry: RetryPolicy,
}

fn slug_of(entry: &Value) -> Option<String> {
    ["slug", "url_identifier", "id"].iter().find_map(|field| {
        match entry.get(*field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

fn parse_listing(body: &Value) -> Result<(Vec<Value>, u64)> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .context("listing response missing `results` array")?
        .clone();
    let total = body.get("total").and_then(Value::as_u64).unwrap_or(0);
    Ok((results, total))
}

impl<T: SourceTransport> AtomSource<T> {
    pub fn new(transport: T, api_url: &str, query: &str, retry: RetryPolicy) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            query: query.trim_start_matches('?').to_string(),
            retry,
        }
    }

    fn listing_url(&self, offset: u64, limit: u64) -> String {
        format!(
            "{}/informationobjects?{}&limit={limit}&skip={offset}",
            self.api_url, self.query
        )
    }

    /// Fetch one listing page; after the retry ceiling an empty, exhausted page.
    pub fn fetch_page(&self, offset: u64, limit: u64) -> (Vec<Value>, u64, bool) {
        let url = self.listing_url(offset, limit);
        let listing = with_retry(&self.retry, "information object listing", || {
            self.transport.get_json(&url).and_then(|body| parse_listing(&body))
        });
        match listing {
            Some((results, total)) => (results, total, false),
            None => (Vec::new(), 0, true),
        }
    }

    /// Fetch one detail record; after the retry ceiling `None`.
    pub fn fetch_detail(&self, slug: &str) -> Option<Value> {
        let url = format!("{}/informationobjects/{slug}", self.api_url);
        with_retry(&self.retry, &format!("detail for slug `{slug}`"), || {
            self.transport.get_json(&url)
        })
        .filter(|detail| detail.as_object().is_some_and(|obj| !obj.is_empty()))
    }
}

impl<T: SourceTransport> RecordSource for AtomSource<T> {
    fn name(&self) -> &'static str {
        "atom"
    }

    fn next_page(&mut self, offset: u64, limit: u64) -> Result<Page> {
        let (results, total, exhausted) = self.fetch_page(offset, limit);
        let mut entries = Vec::with_capacity(results.len());
        for (idx, entry) in results.iter().enumerate() {
            let position = offset + idx as u64 + 1;
            match slug_of(entry) {
                Some(label) => entries.push(PendingRecord { position, label }),
                None => tracing::warn!(position, "listing entry has no slug; skipping"),
            }
        }
        Ok(Page {
            entries,
            listed: results.len() as u64,
            total,
            exhausted,
        })
    }

    fn resolve(&mut self, entry: &PendingRecord) -> Option<SourceRecord> {
        let detail = self.fetch_detail(&entry.label)?;
        Some(SourceRecord::Atom {
            slug: entry.label.clone(),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted responses in order and records requested URLs.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: RefCell<VecDeque<Result<Value>>>,
        urls: RefCell<Vec<String>>,
    }

    impl ScriptedTransport {
        fn push_ok(&self, body: Value) {
            self.responses.borrow_mut().push_back(Ok(body));
        }

        fn push_err(&self, msg: &str) {
            self.responses
                .borrow_mut()
                .push_back(Err(anyhow::anyhow!(msg.to_string())));
        }
    }

    impl SourceTransport for &ScriptedTransport {
        fn get_json(&self, url: &str) -> Result<Value> {
            self.urls.borrow_mut().push(url.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response")))
        }
    }

    fn reader(transport: &ScriptedTransport, attempts: u32) -> AtomSource<&ScriptedTransport> {
        AtomSource::new(
            transport,
            "https://atom.example/api/",
            "sq0=GR*&sf0=referenceCode",
            RetryPolicy {
                max_attempts: attempts,
                interval: Duration::ZERO,
            },
        )
    }

    #[test]
    fn page_request_carries_query_limit_and_skip() {
        let transport = ScriptedTransport::default();
        transport.push_ok(json!({
            "results": [{"slug": "gr-0001"}, {"slug": "gr-0002"}],
            "total": 42
        }));

        let mut source = reader(&transport, 3);
        let page = source.next_page(30, 30).expect("page");

        assert_eq!(
            transport.urls.borrow()[0],
            "https://atom.example/api/informationobjects?sq0=GR*&sf0=referenceCode&limit=30&skip=30"
        );
        assert_eq!(page.total, 42);
        assert!(!page.exhausted);
        assert_eq!(page.listed, 2);
        assert_eq!(page.entries[0], PendingRecord { position: 31, label: "gr-0001".to_string() });
    }

    #[test]
    fn slugless_listing_entry_is_skipped_but_still_advances_skip() {
        let transport = ScriptedTransport::default();
        transport.push_ok(json!({
            "results": [{"reference_code": "GR-0001"}, {"slug": "gr-0002"}],
            "total": 2
        }));

        let mut source = reader(&transport, 3);
        let page = source.next_page(0, 30).expect("page");

        assert_eq!(page.listed, 2);
        assert_eq!(
            page.entries,
            vec![PendingRecord { position: 2, label: "gr-0002".to_string() }]
        );
    }

    #[test]
    fn page_recovers_after_transient_failures() {
        let transport = ScriptedTransport::default();
        transport.push_err("connection reset");
        transport.push_err("connection reset");
        transport.push_err("certificate verify failed");
        transport.push_ok(json!({"results": [{"slug": "gr-0001"}], "total": 1}));

        let mut source = reader(&transport, 288);
        let page = source.next_page(0, 30).expect("page");

        assert!(!page.exhausted);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(transport.urls.borrow().len(), 4);
    }

    #[test]
    fn page_is_empty_and_exhausted_after_ceiling() {
        let transport = ScriptedTransport::default();
        for _ in 0..3 {
            transport.push_err("service unavailable");
        }

        let mut source = reader(&transport, 3);
        let page = source.next_page(0, 30).expect("page");

        assert!(page.exhausted);
        assert_eq!(page.total, 0);
        assert!(page.entries.is_empty());
    }

    #[test]
    fn detail_failure_after_ceiling_resolves_to_none() {
        let transport = ScriptedTransport::default();
        transport.push_err("timeout");
        transport.push_err("timeout");

        let mut source = reader(&transport, 2);
        let entry = PendingRecord {
            position: 1,
            label: "gr-0001".to_string(),
        };
        assert!(source.resolve(&entry).is_none());
    }

    #[test]
    fn detail_resolves_with_slug() {
        let transport = ScriptedTransport::default();
        transport.push_ok(json!({"reference_code": "GR-0001", "title": "Fisheries"}));

        let mut source = reader(&transport, 2);
        let entry = PendingRecord {
            position: 1,
            label: "gr-0001".to_string(),
        };
        let Some(SourceRecord::Atom { slug, detail }) = source.resolve(&entry) else {
            panic!("expected atom record");
        };
        assert_eq!(slug, "gr-0001");
        assert_eq!(detail["reference_code"], "GR-0001");
        assert_eq!(
            transport.urls.borrow()[0],
            "https://atom.example/api/informationobjects/gr-0001"
        );
    }
}
