//! Lazy, marker-paginated enumeration of a bucket prefix.
//!
//! A [`Catalog`] turns the bounded-page `list_bucket` primitive into a
//! single-pass sequence of [`ListEntry`] values.  Pages are fetched on
//! demand and dropped once consumed; only the current page is held.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::errors::TransferError;
use crate::storage::backend::{ListEntry, ObjectStoreClient};

/// Cursor over every entry under (`bucket`, `prefix`).
///
/// Not restartable: once exhausted (or after an error) a new cursor must
/// be created to list again.
pub struct Catalog<'a> {
    client: &'a dyn ObjectStoreClient,
    bucket: String,
    prefix: String,
    page_size: u32,
    /// Last key of the most recently fetched page.
    marker: String,
    /// Entries of the current page not yet yielded.
    pending: VecDeque<ListEntry>,
    pages_fetched: usize,
    exhausted: bool,
}

impl<'a> Catalog<'a> {
    /// Create a cursor.  No request is made until the first page is needed.
    pub fn new(
        client: &'a dyn ObjectStoreClient,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            page_size: page_size.max(1),
            marker: String::new(),
            pending: VecDeque::new(),
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// The continuation marker that the next page request will carry.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Number of `list_bucket` calls issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Whether the store has signalled the final page.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page from the store.
    ///
    /// Returns `Ok(None)` once the previous page was the last one.  Any
    /// entries still pending from the previous page are discarded, so mix
    /// this with [`Catalog::next`] only at page boundaries.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListEntry>>, TransferError> {
        self.pending.clear();
        if self.exhausted {
            return Ok(None);
        }

        debug!(
            "listing {}/{}* after '{}' (page {})",
            self.bucket,
            self.prefix,
            self.marker,
            self.pages_fetched + 1
        );

        let page = match self
            .client
            .list_bucket(&self.bucket, &self.prefix, &self.marker, self.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(TransferError::Transport(e));
            }
        };
        self.pages_fetched += 1;

        match page.entries.last() {
            Some(last) if page.is_truncated => self.marker = last.key.clone(),
            Some(_) => self.exhausted = true,
            None => {
                if page.is_truncated {
                    warn!(
                        "store reported a truncated but empty page for {}/{}; ending listing",
                        self.bucket, self.prefix
                    );
                }
                self.exhausted = true;
            }
        }

        Ok(Some(page.entries))
    }

    /// Yield the next entry, fetching a new page when the current one is
    /// used up.  Returns `Ok(None)` at the end of the listing.
    pub async fn next(&mut self) -> Result<Option<ListEntry>, TransferError> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }
            match self.next_page().await? {
                Some(entries) => self.pending.extend(entries),
                None => return Ok(None),
            }
        }
    }

    /// Drain the remaining entries, keeping only their keys.
    pub async fn keys(mut self) -> Result<Vec<String>, TransferError> {
        let mut keys = Vec::new();
        while let Some(entry) = self.next().await? {
            keys.push(entry.key);
        }
        Ok(keys)
    }
}
