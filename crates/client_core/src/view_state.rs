//! Search, filter, sort and pagination over an already-fetched collection.
//!
//! [`derive_view`] is a pure function of the raw items and a [`ViewQuery`];
//! [`ViewState`] owns both and enforces the page-reset rule on every input
//! change.

use std::{cmp::Ordering, fmt};

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Comparable projection of a record for one sort field.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Text(String),
    /// Epoch milliseconds; records without a timestamp sort first.
    Timestamp(Option<i64>),
    Number(f64),
}

impl SortKey {
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Text(a), SortKey::Text(b)) => collation_key(a)
                .cmp(&collation_key(b))
                .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
                .then_with(|| a.cmp(b)),
            (SortKey::Timestamp(a), SortKey::Timestamp(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Primary collation weights: accents and case are ignored, `đ` is its own
/// letter right after `d`. Ties fall back to case and then raw text.
fn collation_key(text: &str) -> Vec<(char, bool)> {
    text.nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            'đ' => ('d', true),
            other => (other, false),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// A record that can be listed on a screen.
pub trait ViewRecord: Clone + fmt::Debug + PartialEq {
    type Key: Clone + Eq + fmt::Debug;
    type SearchField: Copy + Eq + fmt::Debug + 'static;
    type SortField: Copy + Eq + fmt::Debug;
    /// The one enumerated field a categorical filter applies to. Records
    /// without one use [`std::convert::Infallible`].
    type Category: Copy + Eq + fmt::Debug;

    /// Fields an `All` search ORs across.
    const SEARCH_FIELDS: &'static [Self::SearchField];
    const DEFAULT_SORT: Self::SortField;

    fn key(&self) -> Self::Key;
    fn search_value(&self, field: Self::SearchField) -> Option<String>;
    fn category(&self) -> Option<Self::Category>;
    fn sort_key(&self, field: Self::SortField) -> SortKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope<F> {
    All,
    Field(F),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery<R: ViewRecord> {
    pub search_term: String,
    pub search_scope: SearchScope<R::SearchField>,
    pub category: Option<R::Category>,
    pub sort_field: R::SortField,
    pub sort_order: SortOrder,
    /// One-based.
    pub page: usize,
    pub page_size: usize,
}

impl<R: ViewRecord> Default for ViewQuery<R> {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            search_scope: SearchScope::All,
            category: None,
            sort_field: R::DEFAULT_SORT,
            sort_order: SortOrder::Asc,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl<R: ViewRecord> ViewQuery<R> {
    fn matches(&self, record: &R, needle: &str) -> bool {
        if let Some(category) = self.category {
            if record.category() != Some(category) {
                return false;
            }
        }
        if needle.is_empty() {
            return true;
        }
        let hit = |field: R::SearchField| {
            record
                .search_value(field)
                .is_some_and(|value| value.to_lowercase().contains(needle))
        };
        match self.search_scope {
            SearchScope::All => R::SEARCH_FIELDS.iter().copied().any(hit),
            SearchScope::Field(field) => hit(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSlice<R> {
    pub visible: Vec<R>,
    pub total_filtered: usize,
    /// Zero when nothing matches.
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<R> ViewSlice<R> {
    /// Pagination controls are hidden for zero or one page.
    pub fn show_pager(&self) -> bool {
        self.total_pages > 1
    }

    /// One-based position of the first visible item, 0 when empty.
    pub fn first_index(&self) -> usize {
        if self.visible.is_empty() {
            0
        } else {
            (self.page - 1) * self.page_size + 1
        }
    }
}

pub fn total_pages(filtered: usize, page_size: usize) -> usize {
    filtered.div_ceil(page_size.max(1))
}

pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

/// Filtered and sorted, before pagination. The sort is stable.
pub fn filter_and_sort<R: ViewRecord>(items: &[R], query: &ViewQuery<R>) -> Vec<R> {
    let needle = query.search_term.trim().to_lowercase();
    let mut filtered: Vec<R> = items
        .iter()
        .filter(|record| query.matches(record, &needle))
        .cloned()
        .collect();
    filtered.sort_by(|a, b| {
        query.sort_order.apply(
            a.sort_key(query.sort_field)
                .compare(&b.sort_key(query.sort_field)),
        )
    });
    filtered
}

pub fn derive_view<R: ViewRecord>(items: &[R], query: &ViewQuery<R>) -> ViewSlice<R> {
    let sorted = filter_and_sort(items, query);
    let page_size = query.page_size.max(1);
    let total_filtered = sorted.len();
    let total_pages = total_pages(total_filtered, page_size);
    let page = clamp_page(query.page, total_pages);
    let visible = sorted
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();
    ViewSlice {
        visible,
        total_filtered,
        total_pages,
        page,
        page_size,
    }
}

/// Raw collection plus query. Every input change except an explicit page
/// move resets the page to 1.
#[derive(Debug, Clone)]
pub struct ViewState<R: ViewRecord> {
    items: Vec<R>,
    query: ViewQuery<R>,
}

impl<R: ViewRecord> Default for ViewState<R> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            query: ViewQuery::default(),
        }
    }
}

impl<R: ViewRecord> ViewState<R> {
    pub fn new(items: Vec<R>) -> Self {
        Self {
            items,
            query: ViewQuery::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.query.page_size = page_size.max(1);
        self
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.query.sort_order = order;
        self
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn query(&self) -> &ViewQuery<R> {
        &self.query
    }

    pub fn page(&self) -> usize {
        self.query.page
    }

    pub fn view(&self) -> ViewSlice<R> {
        derive_view(&self.items, &self.query)
    }

    pub fn replace_items(&mut self, items: Vec<R>) {
        self.items = items;
        self.query.page = 1;
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.query.search_term = term.into();
        self.query.page = 1;
    }

    pub fn set_search_scope(&mut self, scope: SearchScope<R::SearchField>) {
        self.query.search_scope = scope;
        self.query.page = 1;
    }

    pub fn set_category(&mut self, category: Option<R::Category>) {
        self.query.category = category;
        self.query.page = 1;
    }

    pub fn set_sort_field(&mut self, field: R::SortField) {
        self.query.sort_field = field;
        self.query.page = 1;
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.query.sort_order = order;
        self.query.page = 1;
    }

    /// Column-header behavior: the active field flips direction, another
    /// field starts ascending.
    pub fn toggle_sort(&mut self, field: R::SortField) {
        if self.query.sort_field == field {
            self.query.sort_order = self.query.sort_order.flipped();
        } else {
            self.query.sort_field = field;
            self.query.sort_order = SortOrder::Asc;
        }
        self.query.page = 1;
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.query.page_size = page_size.max(1);
        self.query.page = 1;
    }

    /// Moves to `page`, clamped to the pages that exist.
    pub fn set_page(&mut self, page: usize) -> usize {
        let filtered = filter_and_sort(&self.items, &self.query).len();
        self.query.page = clamp_page(page, total_pages(filtered, self.query.page_size));
        self.query.page
    }

    pub fn next_page(&mut self) -> usize {
        self.set_page(self.query.page + 1)
    }

    pub fn previous_page(&mut self) -> usize {
        self.set_page(self.query.page.saturating_sub(1))
    }

    pub fn find(&self, key: &R::Key) -> Option<&R> {
        self.items.iter().find(|record| record.key() == *key)
    }

    pub fn remove(&mut self, key: &R::Key) -> bool {
        let before = self.items.len();
        self.items.retain(|record| record.key() != *key);
        self.items.len() != before
    }

    /// Replaces the record with the same key in place, or appends it.
    pub fn upsert(&mut self, record: R) {
        let key = record.key();
        match self.items.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = record,
            None => self.items.push(record),
        }
    }
}

#[cfg(test)]
#[path = "tests/view_state_tests.rs"]
mod tests;
