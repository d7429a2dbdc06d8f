use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;

use super::window::PageWindow;
use super::{PageRequest, PageSource, PaginationDelegate};

/// Flat-index windowed loader.
///
/// Cheap to clone; clones share the same window, so a fetch started from
/// one clone is visible through all of them.
pub struct PaginationEngine<T> {
    window: Arc<Mutex<PageWindow<T>>>,
    source: Arc<dyn PageSource<T>>,
    delegate: Option<Arc<dyn PaginationDelegate>>,
}

impl<T> Clone for PaginationEngine<T> {
    fn clone(&self) -> Self {
        Self {
            window: Arc::clone(&self.window),
            source: Arc::clone(&self.source),
            delegate: self.delegate.clone(),
        }
    }
}

impl<T> fmt::Debug for PaginationEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = self.window.lock();
        f.debug_struct("PaginationEngine")
            .field("page_size", &window.page_size())
            .field("loaded", &window.loaded().len())
            .field("total_count", &window.total_count())
            .field("generation", &window.generation())
            .finish_non_exhaustive()
    }
}

impl<T> PaginationEngine<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `page_size` of zero is treated as 1.
    #[must_use]
    pub fn new(source: impl PageSource<T>, page_size: usize) -> Self {
        Self {
            window: Arc::new(Mutex::new(PageWindow::new(page_size))),
            source: Arc::new(source),
            delegate: None,
        }
    }

    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn PaginationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.window.lock().page_size()
    }

    #[must_use]
    pub fn value(&self, index: usize) -> Option<T> {
        self.window.lock().get(index).cloned()
    }

    /// `true` while the page holding `index` is in flight.
    #[must_use]
    pub fn is_loading_value(&self, index: usize) -> bool {
        self.window.lock().is_loading(index)
    }

    /// `true` until the first page has been merged.
    #[must_use]
    pub fn needs_fetching(&self) -> bool {
        self.window.lock().needs_fetching()
    }

    #[must_use]
    pub fn total_count(&self) -> Option<usize> {
        self.window.lock().total_count()
    }

    /// Number of addressable items: the server total when known, otherwise
    /// one past the highest loaded index.
    #[must_use]
    pub fn count(&self) -> usize {
        self.window.lock().count()
    }

    /// Load the pages covering `indices`.
    ///
    /// Pages are fetched concurrently and merged as they arrive; the
    /// delegate hears about each one separately. Pages already loaded or in
    /// flight (from this call or a concurrent one) are not requested again.
    /// Returns once every page this call started has completed or failed.
    ///
    /// Each page loads in its own task: dropping the returned future stops
    /// the wait, not the load, and the page still lands in the cache.
    pub async fn fetch_values(&self, indices: &[usize]) {
        let (generation, requests) = {
            let mut window = self.window.lock();
            let requests = window.plan(indices.iter().copied());
            (window.generation(), requests)
        };
        if requests.is_empty() {
            return;
        }
        tracing::debug!(
            pages = ?requests.iter().map(|r| r.page).collect::<Vec<_>>(),
            generation,
            "fetching pages"
        );
        let loads: Vec<_> = requests
            .into_iter()
            .map(|request| tokio::spawn(self.clone().load(generation, request)))
            .collect();
        for joined in join_all(loads).await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "page load task failed");
            }
        }
    }

    async fn load(self, generation: u64, request: PageRequest) {
        match self.source.fetch_page(request).await {
            Ok(response) => {
                let merged = self.window.lock().complete(generation, request, response);
                let Some(merged) = merged else {
                    tracing::debug!(page = request.page, generation, "dropping stale page");
                    return;
                };
                tracing::debug!(
                    page = request.page,
                    loaded = merged.newly_loaded.len(),
                    "page merged"
                );
                if let Some(delegate) = &self.delegate {
                    if merged.first {
                        delegate.on_fetch_completed(None);
                    } else {
                        delegate.on_fetch_completed(Some(&merged.newly_loaded));
                    }
                }
            }
            Err(err) => {
                let current = self.window.lock().fail(generation, request);
                if !current {
                    tracing::debug!(page = request.page, generation, "dropping stale failure");
                    return;
                }
                tracing::warn!(page = request.page, error = %err, "page fetch failed");
                if let Some(delegate) = &self.delegate {
                    delegate.on_fetch_failed(&err);
                }
            }
        }
    }

    /// Forget everything, e.g. when the query behind the listing changed.
    /// Fetches still in flight complete into the void.
    pub fn reset(&self) {
        self.window.lock().reset();
    }

    /// Entries of `visible` that are also in `newly_loaded`, in `visible`
    /// order.
    #[must_use]
    pub fn visible_indices_to_reload(visible: &[usize], newly_loaded: &[usize]) -> Vec<usize> {
        let fresh: HashSet<usize> = newly_loaded.iter().copied().collect();
        visible
            .iter()
            .copied()
            .filter(|index| fresh.contains(index))
            .collect()
    }
}
