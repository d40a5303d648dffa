use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// One page of a listing. Pages start at 1, pages past the end are simply empty.
#[derive(Debug, Clone)]
pub struct Pagination<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Pagination<T> {
    pub fn pages_for(total: i64, per_page: i64) -> i64 {
        if per_page <= 0 || total <= 0 {
            return 0;
        }
        (total + per_page - 1) / per_page
    }

    /// Maps a requested page number to a valid one. `-1` selects the last page.
    pub fn resolve_page(requested: Option<i64>, total: i64, per_page: i64) -> i64 {
        match requested {
            Some(-1) => Self::pages_for(total, per_page).max(1),
            Some(page) if page >= 1 => page,
            _ => 1,
        }
    }

    /// Saturates instead of overflowing, so absurd page numbers land past the end.
    pub fn offset(page: i64, per_page: i64) -> i64 {
        page.saturating_sub(1).max(0).saturating_mul(per_page)
    }

    pub fn pages(&self) -> i64 {
        Self::pages_for(self.total, self.per_page)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }

    pub fn prev_num(&self) -> i64 {
        (self.page - 1).max(1)
    }

    pub fn next_num(&self) -> i64 {
        self.page.saturating_add(1)
    }

    /// Previous and next links for the listing served at `path`.
    pub fn pager(&self, path: &str) -> Pager {
        Pager {
            page: self.page,
            pages: self.pages(),
            prev_url: self
                .has_prev()
                .then(|| format!("{path}?page={}", self.prev_num())),
            next_url: self
                .has_next()
                .then(|| format!("{path}?page={}", self.next_num())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pager {
    pub page: i64,
    pub pages: i64,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}
