use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub pages_number: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// Create a new page with items and page info
    pub fn new(items: Vec<T>, page_info: PageInfo) -> Self {
        Self { items, page_info }
    }

    /// Create an empty page for the given page size
    pub fn empty(page_size: u64) -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo {
                page: 1,
                page_size,
                total_items: 0,
                pages_number: 0,
            },
        }
    }

    /// Map items while preserving page_info (Domain->DTO mapping convenience)
    pub fn map_items<U>(self, mut f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(&mut f).collect(),
            page_info: self.page_info,
        }
    }
}

/// Offset pagination arithmetic over a known result count.
///
/// Pages are 1-based. `pages_number` is derived on every read, so
/// [`Paginator::set_total_items`] never leaves the paginator inconsistent;
/// the current page is clamped lazily when read.
///
/// Navigation mutates in place: one paginator belongs to one view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paginator {
    total_items: u64,
    page_size: u64,
    current_page: u64,
}

impl Paginator {
    pub fn new(total_items: u64, page_size: u64, initial_page: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize);
        }
        let mut p = Self {
            total_items,
            page_size,
            current_page: 1,
        };
        p.set_page(initial_page);
        Ok(p)
    }

    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn set_total_items(&mut self, total_items: u64) {
        self.total_items = total_items;
    }

    /// `ceil(total_items / page_size)`
    pub fn pages_number(&self) -> u64 {
        self.total_items.div_ceil(self.page_size)
    }

    /// Current 1-based page, clamped into `[1, pages_number]` (1 when there are no pages).
    pub fn page(&self) -> u64 {
        self.current_page.clamp(1, self.pages_number().max(1))
    }

    /// Zero-based offset of the first row on the current page.
    pub fn first_result(&self) -> u64 {
        (self.page() - 1) * self.page_size
    }

    pub fn has_next(&self) -> bool {
        self.page() < self.pages_number()
    }

    pub fn has_prev(&self) -> bool {
        self.page() > 1
    }

    pub fn next_page(&mut self) -> u64 {
        self.current_page = (self.page() + 1).min(self.pages_number().max(1));
        self.current_page
    }

    pub fn prev_page(&mut self) -> u64 {
        self.current_page = self.page().saturating_sub(1).max(1);
        self.current_page
    }

    pub fn set_page(&mut self, page: u64) -> u64 {
        self.current_page = page.clamp(1, self.pages_number().max(1));
        self.current_page
    }

    /// Move to the page holding the zero-based absolute row `index` and
    /// return the row's zero-based offset within that page, so that
    /// `(page - 1) * page_size + offset == index`.
    pub fn scroll_to_index(&mut self, index: i64) -> Result<u64> {
        let out_of_range = Error::OutOfRange {
            index,
            total: self.total_items,
        };
        let i = u64::try_from(index).map_err(|_| out_of_range.clone())?;
        if i >= self.total_items {
            return Err(out_of_range);
        }
        self.current_page = i / self.page_size + 1;
        Ok(i % self.page_size)
    }

    /// Window of `all` covered by the current page.
    pub fn slice<'a, T>(&self, all: &'a [T]) -> &'a [T] {
        let start = usize::try_from(self.first_result())
            .unwrap_or(usize::MAX)
            .min(all.len());
        let end = start
            .saturating_add(usize::try_from(self.page_size).unwrap_or(usize::MAX))
            .min(all.len());
        &all[start..end]
    }

    pub fn page_info(&self) -> PageInfo {
        PageInfo {
            page: self.page(),
            page_size: self.page_size,
            total_items: self.total_items,
            pages_number: self.pages_number(),
        }
    }
}
