//! Cursor Pager
//!
//! Lazy, resumable pagination over an ordered range query. Each page
//! re-issues the base query with a `start_after` bound equal to the cursor of
//! the last item returned; iteration ends on the first page shorter than the
//! page size.
//!
//! The pager itself only tracks position. Pages are fetched through a
//! caller-supplied function, so the same pager drives both transactional
//! reads ([`CursorPager::next_page`]) and plain store scans
//! ([`CursorPager::pages`]).

use strata_core::{Cursor, Document, DocumentStore, Query, Result};

/// Extracts the resume position of an item.
pub type CursorExtractor = Box<dyn Fn(&Document) -> Cursor + Send + Sync>;

/// Extractor reading the query's own order-by fields plus the path tie-break.
pub fn default_extractor(query: &Query) -> CursorExtractor {
    let query = query.clone();
    Box::new(move |doc| query.cursor_for(doc))
}

pub struct CursorPager {
    query: Query,
    page_size: usize,
    extractor: CursorExtractor,
    cursor: Option<Cursor>,
    exhausted: bool,
    pages_fetched: usize,
}

impl CursorPager {
    /// Page through `query`. Any cursor or limit already on the query is
    /// replaced by the pager's own.
    pub fn new(query: Query, page_size: usize) -> Self {
        let mut query = query;
        query.start_after = None;
        query.limit = None;
        let extractor = default_extractor(&query);
        Self {
            query,
            page_size: page_size.max(1),
            extractor,
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    pub fn with_extractor(mut self, extractor: CursorExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Continue after a previously observed cursor.
    pub fn resume(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Position after the last item returned, if any.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// The query that fetches the next page.
    pub fn page_query(&self) -> Query {
        let query = self.query.clone().limit(self.page_size);
        match &self.cursor {
            Some(cursor) => query.start_after(cursor.clone()),
            None => query,
        }
    }

    /// Fetch the next page with `fetch`.
    ///
    /// Returns `None` once the range is exhausted. An empty page is never
    /// returned.
    pub fn next_page<F>(&mut self, fetch: F) -> Result<Option<Vec<Document>>>
    where
        F: FnOnce(&Query) -> Result<Vec<Document>>,
    {
        if self.exhausted {
            return Ok(None);
        }

        let page = fetch(&self.page_query())?;
        self.pages_fetched += 1;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => {
                self.cursor = Some((self.extractor)(last));
                tracing::trace!(items = page.len(), page = self.pages_fetched, "Fetched page");
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    /// Iterate pages read directly from `store`.
    pub fn pages<S: DocumentStore>(self, store: &S) -> Pages<'_, S> {
        Pages { pager: self, store }
    }
}

/// Iterator over pages of committed documents.
///
/// Stops after the first error.
pub struct Pages<'s, S: DocumentStore> {
    pager: CursorPager,
    store: &'s S,
}

impl<'s, S: DocumentStore> Pages<'s, S> {
    pub fn pager(&self) -> &CursorPager {
        &self.pager
    }

    /// Flatten into individual items.
    pub fn items(self) -> Items<'s, S> {
        Items {
            pages: self,
            buffer: Vec::new().into_iter(),
        }
    }

    /// Flatten, transform and filter items in one pass.
    pub fn filter_map_items<T, F>(self, mut f: F) -> impl Iterator<Item = Result<T>> + 's
    where
        F: FnMut(Document) -> Option<T> + 's,
        T: 's,
    {
        self.items().filter_map(move |item| match item {
            Ok(doc) => f(doc).map(Ok),
            Err(e) => Some(Err(e)),
        })
    }
}

impl<'s, S: DocumentStore> Iterator for Pages<'s, S> {
    type Item = Result<Vec<Document>>;

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.store;
        match self.pager.next_page(|q| store.query(q)) {
            Ok(page) => page.map(Ok),
            Err(e) => {
                self.pager.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

pub struct Items<'s, S: DocumentStore> {
    pages: Pages<'s, S>,
    buffer: std::vec::IntoIter<Document>,
}

impl<'s, S: DocumentStore> Iterator for Items<'s, S> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.buffer.next() {
                return Some(Ok(doc));
            }
            match self.pages.next()? {
                Ok(page) => self.buffer = page.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{Direction, DocPath, StrataError};

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| {
                Document::new(
                    DocPath::parse(format!("events/e{:03}", i)).unwrap(),
                    json!({"t": (i / 3) as i64}),
                    1,
                )
            })
            .collect()
    }

    fn query() -> Query {
        Query::collection("events").order_by("t", Direction::Asc)
    }

    #[test]
    fn test_pages_until_short_page() {
        let data = docs(7);
        let mut pager = CursorPager::new(query(), 3);
        let mut sizes = Vec::new();
        while let Some(page) = pager.next_page(|q| Ok(q.evaluate(data.clone()))).unwrap() {
            sizes.push(page.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(pager.is_exhausted());
        assert_eq!(pager.pages_fetched(), 3);
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_fetch() {
        let data = docs(6);
        let mut pager = CursorPager::new(query(), 3);
        assert_eq!(pager.next_page(|q| Ok(q.evaluate(data.clone()))).unwrap().unwrap().len(), 3);
        assert_eq!(pager.next_page(|q| Ok(q.evaluate(data.clone()))).unwrap().unwrap().len(), 3);
        assert!(!pager.is_exhausted());
        assert!(pager.next_page(|q| Ok(q.evaluate(data.clone()))).unwrap().is_none());
        assert!(pager.is_exhausted());
    }

    #[test]
    fn test_resume_from_cursor() {
        let data = docs(5);
        let mut first = CursorPager::new(query(), 2);
        first.next_page(|q| Ok(q.evaluate(data.clone()))).unwrap();
        let cursor = first.cursor().cloned().unwrap();

        let mut resumed = CursorPager::new(query(), 10).resume(cursor);
        let rest = resumed
            .next_page(|q| Ok(q.evaluate(data.clone())))
            .unwrap()
            .unwrap();
        let ids: Vec<_> = rest.iter().map(|d| d.path.id().to_string()).collect();
        assert_eq!(ids, vec!["e002", "e003", "e004"]);
    }

    #[test]
    fn test_fetch_error_propagates() {
        let mut pager = CursorPager::new(query(), 2);
        let result = pager.next_page(|_| Err(StrataError::Unavailable("down".into())));
        assert!(result.is_err());
        assert!(pager.cursor().is_none());
    }
}
