/// Where a paginated list stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageState {
    #[default]
    MoreAvailable,
    LoadingMore,
    /// The last page came back short; no further requests are issued.
    Exhausted,
}

/// Pagination state machine shared by the chat feed and list screens.
///
/// `MoreAvailable -> LoadingMore -> (MoreAvailable | Exhausted)`. A failed
/// request drops back to `MoreAvailable` so the user can retry by scrolling.
#[derive(Debug, Clone, Default)]
pub struct Pager {
    state: PageState,
    pages_loaded: u32,
}

impl Pager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == PageState::Exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.state == PageState::LoadingMore
    }

    /// Try to start a page request. Returns false while a request is in
    /// flight or once the list is exhausted.
    pub fn begin(&mut self) -> bool {
        match self.state {
            PageState::MoreAvailable => {
                self.state = PageState::LoadingMore;
                true
            }
            PageState::LoadingMore | PageState::Exhausted => false,
        }
    }

    /// Record a page of `len` items requested with `page_size`.
    pub fn complete(&mut self, len: usize, page_size: u32) {
        self.pages_loaded += 1;
        self.state = if len < page_size as usize {
            PageState::Exhausted
        } else {
            PageState::MoreAvailable
        };
    }

    pub fn fail(&mut self) {
        if self.state == PageState::LoadingMore {
            self.state = PageState::MoreAvailable;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Scroll-proximity trigger: load more once the viewport is within
    /// `threshold` pixels of the unloaded edge.
    pub fn should_load_more(&self, distance_to_edge: f32, threshold: f32) -> bool {
        self.state == PageState::MoreAvailable && distance_to_edge <= threshold
    }
}
