// ── Projection filter ──
//
// Derives the visible client list from the mirror and a live query
// string. Pure: the result keeps the mirror's order restricted to the
// matches, and is recomputed whenever either input changes.

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::CustomerRecord;
use crate::sync::Records;

/// Filter predicate for customer records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFilter {
    All,
    /// Case-insensitive substring match on name or any tag.
    Search(String),
    /// Exact tag membership (campaign segments).
    Segment(String),
}

impl ClientFilter {
    /// Build a search filter; a blank query matches everything.
    pub fn search(query: &str) -> Self {
        let query = query.trim();
        if query.is_empty() {
            Self::All
        } else {
            Self::Search(query.to_lowercase())
        }
    }

    pub fn matches(&self, client: &CustomerRecord) -> bool {
        match self {
            Self::All => true,
            Self::Search(needle) => {
                client.name.to_lowercase().contains(needle.as_str())
                    || client
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(needle.as_str()))
            }
            Self::Segment(tag) => client.has_tag(tag),
        }
    }
}

/// Project `items` through a search query, preserving order.
pub fn project(items: &[Arc<CustomerRecord>], query: &str) -> Vec<Arc<CustomerRecord>> {
    let filter = ClientFilter::search(query);
    items
        .iter()
        .filter(|c| filter.matches(c))
        .map(Arc::clone)
        .collect()
}

/// Reactive filtered view over the client mirror.
///
/// Recomputes on every change of the mirror or the query; `changed()`
/// only yields when the projected result differs from the last one.
pub struct FilteredView {
    source: watch::Receiver<Records<CustomerRecord>>,
    query: watch::Receiver<String>,
    current: Records<CustomerRecord>,
}

impl FilteredView {
    pub(crate) fn new(
        mut source: watch::Receiver<Records<CustomerRecord>>,
        mut query: watch::Receiver<String>,
    ) -> Self {
        let current = Arc::new(project(
            &source.borrow_and_update(),
            &query.borrow_and_update(),
        ));
        Self {
            source,
            query,
            current,
        }
    }

    /// The projection as of the last recomputation.
    pub fn current(&self) -> &Records<CustomerRecord> {
        &self.current
    }

    /// The query string currently applied.
    pub fn query(&self) -> String {
        self.query.borrow().clone()
    }

    /// Wait until the projection changes. `None` once the inputs are gone.
    pub async fn changed(&mut self) -> Option<Records<CustomerRecord>> {
        loop {
            tokio::select! {
                r = self.source.changed() => r.ok()?,
                r = self.query.changed() => r.ok()?,
            }
            let next = project(
                &self.source.borrow_and_update(),
                &self.query.borrow_and_update(),
            );
            if !same_records(&next, &self.current) {
                self.current = Arc::new(next);
                return Some(Arc::clone(&self.current));
            }
        }
    }
}

/// Structural equality short-circuit.
fn same_records(a: &[Arc<CustomerRecord>], b: &[Arc<CustomerRecord>]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| Arc::ptr_eq(x, y) || x == y)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::ClientId;

    fn client(id: &str, name: &str, tags: &[&str]) -> Arc<CustomerRecord> {
        Arc::new(CustomerRecord {
            id: ClientId::from(id),
            name: name.into(),
            email: String::new(),
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            score: 0,
            status_tags: BTreeSet::new(),
            quick_note: String::new(),
        })
    }

    fn names(items: &[Arc<CustomerRecord>]) -> Vec<&str> {
        items.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn tag_match_is_case_insensitive() {
        let items = vec![client("1", "Ana", &["VIP"]), client("2", "Bob", &["New"])];
        assert_eq!(names(&project(&items, "vip")), ["Ana"]);
    }

    #[test]
    fn blank_query_is_identity() {
        let items = vec![client("1", "Ana", &["VIP"]), client("2", "Bob", &["New"])];
        assert_eq!(names(&project(&items, "")), ["Ana", "Bob"]);
        assert_eq!(names(&project(&items, "   ")), ["Ana", "Bob"]);
    }

    #[test]
    fn name_substring_matches_and_order_is_kept() {
        let items = vec![
            client("1", "Roberta", &[]),
            client("2", "Ana", &[]),
            client("3", "Bob", &[]),
        ];
        assert_eq!(names(&project(&items, "OB")), ["Roberta", "Bob"]);
    }

    #[test]
    fn segment_requires_exact_tag() {
        let c = client("1", "Ana", &["VIP"]);
        assert!(ClientFilter::Segment("VIP".into()).matches(&c));
        assert!(!ClientFilter::Segment("vip".into()).matches(&c));
    }

    #[tokio::test]
    async fn view_recomputes_on_query_change() {
        let (source_tx, source_rx) = watch::channel(Arc::new(vec![
            client("1", "Ana", &["VIP"]),
            client("2", "Bob", &["New"]),
        ]));
        let (query_tx, query_rx) = watch::channel(String::new());
        let mut view = FilteredView::new(source_rx, query_rx);
        assert_eq!(view.current().len(), 2);

        query_tx.send_replace("new".into());
        let next = view.changed().await.unwrap();
        assert_eq!(names(&next), ["Bob"]);

        // A mirror change that leaves the projection intact does not
        // surface; the next real difference does.
        source_tx.send_replace(Arc::new(vec![
            client("1", "Ana", &["VIP"]),
            client("2", "Bob", &["New"]),
            client("3", "Cid", &[]),
        ]));
        source_tx.send_replace(Arc::new(vec![client("4", "Newton", &[])]));
        let next = view.changed().await.unwrap();
        assert_eq!(names(&next), ["Newton"]);
    }
}
