use crate::model::total_pages;
use crate::render::Action;

/// Numbered links shown at once.
pub const PAGE_WINDOW: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageControl {
    /// `None` when the control is disabled.
    pub target: Option<u32>,
}

impl PageControl {
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn action(&self) -> Option<Action> {
        self.target.map(Action::GoToPage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLink {
    pub number: u32,
    pub current: bool,
}

impl PageLink {
    pub fn action(&self) -> Action {
        Action::GoToPage(self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub previous: PageControl,
    pub pages: Vec<PageLink>,
    pub next: PageControl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    current: u32,
    total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current: 1,
            total_pages: 1,
        }
    }
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Clamps `page` into range and makes it current.
    pub fn go_to(&mut self, page: u32) -> u32 {
        self.current = page.clamp(1, self.total_pages.max(1));
        self.current
    }

    pub fn next_page(&self) -> Option<u32> {
        (self.current < self.total_pages).then(|| self.current + 1)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.current > 1).then(|| self.current - 1)
    }

    /// Applies the totals reported by a list load.
    pub fn update(&mut self, page: u32, total_items: u64, page_size: u32) {
        self.total_pages = total_pages(total_items, page_size);
        self.current = page.clamp(1, self.total_pages);
    }

    pub fn reset(&mut self) {
        self.current = 1;
    }

    pub fn window(&self) -> Option<PageWindow> {
        if self.total_pages <= 1 {
            return None;
        }
        let start = self.current.saturating_sub(2).max(1);
        let end = (start + PAGE_WINDOW - 1).min(self.total_pages);
        let pages = (start..=end)
            .map(|number| PageLink {
                number,
                current: number == self.current,
            })
            .collect();
        Some(PageWindow {
            previous: PageControl {
                target: self.previous_page(),
            },
            pages,
            next: PageControl {
                target: self.next_page(),
            },
        })
    }
}
