use serde::Serialize;

pub const QUESTIONS_PER_PAGE: u32 = 12;
pub const SEARCH_RESULTS_PER_PAGE: u32 = 10;
pub const TASKS_PER_PAGE: u32 = 20;

/// Requested page. Raw query values that are missing or not positive
/// integers fall back to the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page: page.max(1), per_page: per_page.max(1) }
    }

    pub fn parse(raw: Option<&str>, per_page: u32) -> Self {
        let page = raw.and_then(|p| p.trim().parse::<u32>().ok()).unwrap_or(1);
        Self::new(page, per_page)
    }

    /// Clamp against `total` rows; returns the effective page and the row
    /// offset. Pages past the end resolve to the last page.
    pub fn resolve(&self, total: u64) -> (u32, u64) {
        let pages = num_pages(total, self.per_page);
        let page = self.page.min(pages).max(1);
        (page, u64::from(page - 1) * u64::from(self.per_page))
    }
}

pub fn num_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.max(1));
    (total.div_ceil(per_page)).max(1) as u32
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub num_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        let num_pages = num_pages(total, per_page);
        Self {
            items,
            page,
            per_page,
            total,
            num_pages,
            has_next: page < num_pages,
            has_previous: page > 1,
        }
    }

    /// Page an already materialised, already ordered list.
    pub fn from_vec(all: Vec<T>, req: PageRequest) -> Self {
        let total = all.len() as u64;
        let (page, offset) = req.resolve(total);
        let items = all
            .into_iter()
            .skip(offset as usize)
            .take(req.per_page as usize)
            .collect();
        Self::new(items, page, req.per_page, total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            num_pages: self.num_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}
