use std::collections::{BTreeMap, BTreeSet};

use super::{PageRequest, PageResponse};

/// Result of merging one page into the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Merged {
    /// Indices that were not loaded before this page.
    pub(crate) newly_loaded: Vec<usize>,
    /// First page merged since creation or the last reset.
    pub(crate) first: bool,
}

/// Sparse cache of a paged collection.
///
/// Every index is unloaded, loading (its page is pending) or loaded. The
/// generation changes on every reset or refresh; completions carrying an
/// older generation are dropped.
#[derive(Debug)]
pub(crate) struct PageWindow<T> {
    page_size: usize,
    total_count: Option<usize>,
    loaded: BTreeMap<usize, T>,
    pending: BTreeSet<usize>,
    completed: BTreeSet<usize>,
    generation: u64,
}

impl<T> PageWindow<T> {
    /// A zero page size is treated as 1.
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            total_count: None,
            loaded: BTreeMap::new(),
            pending: BTreeSet::new(),
            completed: BTreeSet::new(),
            generation: 0,
        }
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn total_count(&self) -> Option<usize> {
        self.total_count
    }

    pub(crate) fn loaded(&self) -> &BTreeMap<usize, T> {
        &self.loaded
    }

    /// 1-based page holding `index`.
    pub(crate) fn page_of(&self, index: usize) -> usize {
        index.div_euclid(self.page_size) + 1
    }

    fn request(&self, page: usize) -> PageRequest {
        PageRequest {
            page,
            page_size: self.page_size,
        }
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.loaded.get(&index)
    }

    pub(crate) fn is_loading(&self, index: usize) -> bool {
        !self.loaded.contains_key(&index) && self.pending.contains(&self.page_of(index))
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// No page has completed since creation or the last reset.
    pub(crate) fn needs_fetching(&self) -> bool {
        self.completed.is_empty()
    }

    /// Known total, else one past the highest loaded index.
    pub(crate) fn count(&self) -> usize {
        self.total_count
            .unwrap_or_else(|| self.loaded.keys().next_back().map_or(0, |last| last + 1))
    }

    fn beyond_end(&self, index: usize) -> bool {
        self.total_count.is_some_and(|total| index >= total)
    }

    /// Pages to fetch for `indices`, each marked pending. Loaded indices,
    /// pending pages and indices past a known total are skipped.
    pub(crate) fn plan(&mut self, indices: impl IntoIterator<Item = usize>) -> Vec<PageRequest> {
        let mut requests = Vec::new();
        for index in indices {
            if self.loaded.contains_key(&index) || self.beyond_end(index) {
                continue;
            }
            let page = self.page_of(index);
            if self.pending.insert(page) {
                requests.push(self.request(page));
            }
        }
        requests
    }

    /// Lowest page that has neither completed nor been requested, if the
    /// collection may still have items there. Marks it pending.
    pub(crate) fn plan_next(&mut self) -> Option<PageRequest> {
        let page = (1..)
            .find(|page| !self.completed.contains(page))
            .unwrap_or(1);
        let request = self.request(page);
        let exhausted = !self.needs_fetching() && self.beyond_end(request.offset());
        if exhausted || self.pending.contains(&page) {
            return None;
        }
        self.pending.insert(page);
        Some(request)
    }

    /// Merge a page by absolute offset.
    ///
    /// Returns `None` when `generation` is stale.
    pub(crate) fn complete(
        &mut self,
        generation: u64,
        request: PageRequest,
        response: PageResponse<T>,
    ) -> Option<Merged> {
        if generation != self.generation {
            return None;
        }
        self.pending.remove(&request.page);
        let first = self.completed.is_empty();
        self.completed.insert(request.page);

        let offset = request.offset();
        let received = response.items.len();
        let mut newly_loaded = Vec::with_capacity(received);
        for (i, item) in response.items.into_iter().enumerate() {
            let index = offset + i;
            if self.loaded.insert(index, item).is_none() {
                newly_loaded.push(index);
            }
        }

        let total = match response.total_count {
            Some(total) => Some(total),
            None if received < self.page_size => Some(offset + received),
            None => self.total_count,
        };
        if let Some(total) = total {
            self.total_count = Some(total);
            // The collection shrank: drop what no longer exists
            let stale = self.loaded.split_off(&total);
            newly_loaded.retain(|index| !stale.contains_key(index));
        }

        Some(Merged {
            newly_loaded,
            first,
        })
    }

    /// Forget a failed page so it can be requested again. `false` when
    /// `generation` is stale.
    pub(crate) fn fail(&mut self, generation: u64, request: PageRequest) -> bool {
        if generation != self.generation {
            return false;
        }
        self.pending.remove(&request.page);
        true
    }

    /// Drop everything and invalidate in-flight fetches.
    pub(crate) fn reset(&mut self) {
        self.generation += 1;
        self.total_count = None;
        self.loaded.clear();
        self.pending.clear();
        self.completed.clear();
    }

    /// Invalidate in-flight fetches but keep the content until page 1
    /// arrives again; see [`replace`](Self::replace).
    pub(crate) fn begin_refresh(&mut self) -> (u64, PageRequest) {
        self.generation += 1;
        self.pending.clear();
        self.pending.insert(1);
        (self.generation, self.request(1))
    }

    /// Replace the whole content with a freshly fetched first page.
    pub(crate) fn replace(&mut self, generation: u64, response: PageResponse<T>) -> Option<Merged> {
        if generation != self.generation {
            return None;
        }
        self.total_count = None;
        self.loaded.clear();
        self.completed.clear();
        self.complete(generation, self.request(1), response)
    }
}
