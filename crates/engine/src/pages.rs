//! Ordered page sequence of one query signature.

use api_types::expense::ExpenseRecord;

use crate::normalize::{DEFAULT_LIMIT, DEFAULT_PAGE, DEFAULT_TOTAL, ExpensesPage};

/// Largest integer an `f64` page number holds exactly.
const MAX_PAGE: f64 = 9_007_199_254_740_992.0;

/// Pages in fetch order. Forward pagination only ever appends; a refetch
/// replaces the whole sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageSequence {
    pages: Vec<ExpensesPage>,
}

/// Pagination metadata shown to the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageMeta {
    pub total: f64,
    pub page: f64,
    pub limit: f64,
    pub page_count: f64,
}

impl PageSequence {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn last(&self) -> Option<&ExpensesPage> {
        self.pages.last()
    }

    pub fn pages(&self) -> &[ExpensesPage] {
        &self.pages
    }

    /// Starts over from a freshly fetched first page.
    pub fn replace(&mut self, first: ExpensesPage) {
        self.pages = vec![first];
    }

    pub fn append(&mut self, page: ExpensesPage) {
        self.pages.push(page);
    }

    /// Every record, page after page. Derived on each call.
    pub fn items(&self) -> Vec<ExpenseRecord> {
        self.pages
            .iter()
            .flat_map(|page| page.items.iter().cloned())
            .collect()
    }

    /// Uses the last page's own triple: `total` may have moved since page 1.
    pub fn has_next_page(&self) -> bool {
        self.last()
            .is_some_and(|last| last.page * last.limit < last.total)
    }

    /// Page index to request next, if any. A page number that is not a whole
    /// number between 1 and 2^53 has no successor.
    pub fn next_page(&self) -> Option<u64> {
        if !self.has_next_page() {
            return None;
        }
        let page = self.last()?.page;
        if !(1.0..MAX_PAGE).contains(&page) || page.fract() != 0.0 {
            return None;
        }
        (page as u64).checked_add(1)
    }

    /// Metadata of the last page, or defaults before anything loaded.
    pub fn meta(&self, requested_limit: Option<u32>) -> PageMeta {
        let (total, page, limit) = match self.last() {
            Some(last) => (last.total, last.page, last.limit),
            None => (
                DEFAULT_TOTAL,
                DEFAULT_PAGE,
                requested_limit.map_or(DEFAULT_LIMIT, f64::from),
            ),
        };
        let page_count = if limit > 0.0 {
            (total / limit).ceil()
        } else {
            0.0
        };
        PageMeta {
            total,
            page,
            limit,
            page_count,
        }
    }
}
