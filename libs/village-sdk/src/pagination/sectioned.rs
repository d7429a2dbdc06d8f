use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use super::window::{Merged, PageWindow};
use super::{PageRequest, PageSource, SectionedPaginationDelegate};
use crate::error::ApiError;

/// How loaded items are grouped into sections.
pub trait Sectioning<T>: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Section the item belongs to.
    fn key(&self, item: &T) -> Self::Key;

    /// Header shown for a section.
    fn title(&self, key: &Self::Key) -> String;

    /// Section order. Sections comparing equal keep the order in which
    /// their first rows appear.
    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering;
}

/// Position of a row in the sectioned view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    #[must_use]
    pub const fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

/// Changes between two layouts of a sectioned listing.
///
/// Deletions use the coordinates of the old layout, insertions those of the
/// new one. Rows of inserted or deleted sections are listed too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionDiff {
    pub delete_rows: Vec<IndexPath>,
    pub insert_rows: Vec<IndexPath>,
    pub delete_sections: BTreeSet<usize>,
    pub insert_sections: BTreeSet<usize>,
}

impl SectionDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delete_rows.is_empty()
            && self.insert_rows.is_empty()
            && self.delete_sections.is_empty()
            && self.insert_sections.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Section<K> {
    key: K,
    title: String,
    /// Absolute indices, ascending
    rows: Vec<usize>,
}

struct State<T, K> {
    window: PageWindow<T>,
    sections: Vec<Section<K>>,
}

fn layout<T, S: Sectioning<T>>(
    loaded: &BTreeMap<usize, T>,
    sectioning: &S,
) -> Vec<Section<S::Key>> {
    let mut sections: Vec<Section<S::Key>> = Vec::new();
    let mut by_key: HashMap<S::Key, usize> = HashMap::new();
    for (&index, item) in loaded {
        let key = sectioning.key(item);
        let slot = *by_key.entry(key.clone()).or_insert_with(|| {
            sections.push(Section {
                title: sectioning.title(&key),
                key,
                rows: Vec::new(),
            });
            sections.len() - 1
        });
        sections[slot].rows.push(index);
    }
    sections.sort_by(|a, b| sectioning.compare(&a.key, &b.key));
    sections
}

/// Row identity is the absolute index together with its section key.
fn rows_by_index<K>(sections: &[Section<K>]) -> HashMap<usize, (&K, IndexPath)> {
    sections
        .iter()
        .enumerate()
        .flat_map(|(s, section)| {
            section
                .rows
                .iter()
                .enumerate()
                .map(move |(r, &index)| (index, (&section.key, IndexPath::new(s, r))))
        })
        .collect()
}

fn diff<K: Eq + Hash>(old: &[Section<K>], new: &[Section<K>]) -> SectionDiff {
    let old_keys: HashMap<&K, usize> = old.iter().enumerate().map(|(i, s)| (&s.key, i)).collect();
    let new_keys: HashMap<&K, usize> = new.iter().enumerate().map(|(i, s)| (&s.key, i)).collect();
    let old_rows = rows_by_index(old);
    let new_rows = rows_by_index(new);

    let mut out = SectionDiff {
        delete_sections: old_keys
            .iter()
            .filter(|(key, _)| !new_keys.contains_key(*key))
            .map(|(_, &i)| i)
            .collect(),
        insert_sections: new_keys
            .iter()
            .filter(|(key, _)| !old_keys.contains_key(*key))
            .map(|(_, &i)| i)
            .collect(),
        ..SectionDiff::default()
    };
    out.delete_rows = old_rows
        .iter()
        .filter(|(index, (key, _))| new_rows.get(*index).is_none_or(|(k, _)| k != key))
        .map(|(_, (_, path))| *path)
        .collect();
    out.insert_rows = new_rows
        .iter()
        .filter(|(index, (key, _))| old_rows.get(*index).is_none_or(|(k, _)| k != key))
        .map(|(_, (_, path))| *path)
        .collect();
    out.delete_rows.sort_unstable();
    out.insert_rows.sort_unstable();
    out
}

#[derive(Debug, Clone, Copy)]
enum Merge {
    /// Add the page to what is loaded.
    Append,
    /// Page 1 of a refresh: drop everything else.
    Replace,
}

/// Windowed loader presenting its items grouped into ordered sections.
///
/// Pages are fetched one after another from the top of the listing. After
/// every merged page the layout is rebuilt and the delegate receives the
/// [`SectionDiff`] from the previous layout.
pub struct SectionedPaginationEngine<T, S: Sectioning<T>> {
    state: Arc<Mutex<State<T, S::Key>>>,
    source: Arc<dyn PageSource<T>>,
    sectioning: Arc<S>,
    delegate: Option<Arc<dyn SectionedPaginationDelegate>>,
}

impl<T, S: Sectioning<T>> Clone for SectionedPaginationEngine<T, S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            source: Arc::clone(&self.source),
            sectioning: Arc::clone(&self.sectioning),
            delegate: self.delegate.clone(),
        }
    }
}

impl<T, S: Sectioning<T>> fmt::Debug for SectionedPaginationEngine<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SectionedPaginationEngine")
            .field("sections", &state.sections.len())
            .field("loaded", &state.window.loaded().len())
            .field("total_count", &state.window.total_count())
            .finish_non_exhaustive()
    }
}

impl<T, S> SectionedPaginationEngine<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Sectioning<T>,
{
    #[must_use]
    pub fn new(source: impl PageSource<T>, sectioning: S, page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                window: PageWindow::new(page_size),
                sections: Vec::new(),
            })),
            source: Arc::new(source),
            sectioning: Arc::new(sectioning),
            delegate: None,
        }
    }

    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn SectionedPaginationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    #[must_use]
    pub fn number_of_sections(&self) -> usize {
        self.state.lock().sections.len()
    }

    /// Zero for a section that does not exist.
    #[must_use]
    pub fn number_of_rows(&self, section: usize) -> usize {
        self.state
            .lock()
            .sections
            .get(section)
            .map_or(0, |s| s.rows.len())
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.state.lock().sections.iter().map(|s| s.rows.len()).sum()
    }

    #[must_use]
    pub fn value(&self, path: IndexPath) -> Option<T> {
        let state = self.state.lock();
        let index = *state.sections.get(path.section)?.rows.get(path.row)?;
        state.window.get(index).cloned()
    }

    /// Key and title of a section.
    #[must_use]
    pub fn section(&self, section: usize) -> Option<(S::Key, String)> {
        self.state
            .lock()
            .sections
            .get(section)
            .map(|s| (s.key.clone(), s.title.clone()))
    }

    /// `true` while a page is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().window.has_pending()
    }

    #[must_use]
    pub fn needs_fetching(&self) -> bool {
        self.state.lock().window.needs_fetching()
    }

    #[must_use]
    pub fn total_count(&self) -> Option<usize> {
        self.state.lock().window.total_count()
    }

    /// Fetch the next page if any of `paths` reaches the last loaded row,
    /// or nothing has been loaded yet.
    pub async fn fetch_values(&self, paths: &[IndexPath]) {
        let reaches_end = {
            let state = self.state.lock();
            let last = state.sections.len().checked_sub(1).and_then(|s| {
                let rows = state.sections[s].rows.len();
                rows.checked_sub(1).map(|r| IndexPath::new(s, r))
            });
            match last {
                None => true,
                Some(last) => paths.iter().any(|path| *path >= last),
            }
        };
        if reaches_end {
            self.fetch_next_page().await;
        }
    }

    /// Fetch the first page not loaded yet. Does nothing while another page
    /// is in flight or once the end of the listing is known to be loaded.
    ///
    /// The page loads in its own task, so dropping the returned future
    /// does not stall the listing: the page is still merged (or released on
    /// failure) and the next call moves on.
    pub async fn fetch_next_page(&self) {
        let planned = {
            let mut state = self.state.lock();
            let generation = state.window.generation();
            state.window.plan_next().map(|request| (generation, request))
        };
        let Some((generation, request)) = planned else {
            return;
        };
        tracing::debug!(page = request.page, generation, "fetching next section page");
        self.load(generation, request, Merge::Append).await;
    }

    /// Refetch page 1 and replace everything loaded so far with it. Rows
    /// and sections missing from the fresh page are reported as deletions.
    /// On failure the current content is kept.
    pub async fn refresh(&self) {
        let (generation, request) = self.state.lock().window.begin_refresh();
        tracing::debug!(generation, "refreshing sectioned listing");
        self.load(generation, request, Merge::Replace).await;
    }

    async fn load(&self, generation: u64, request: PageRequest, merge: Merge) {
        let engine = self.clone();
        let task = tokio::spawn(async move {
            match engine.source.fetch_page(request).await {
                Ok(response) => engine.merge(
                    |window| match merge {
                        Merge::Append => window.complete(generation, request, response),
                        Merge::Replace => window.replace(generation, response),
                    },
                    request,
                ),
                Err(err) => engine.failed(generation, request, &err),
            }
        });
        if let Err(err) = task.await {
            tracing::error!(page = request.page, error = %err, "section page task failed");
        }
    }

    /// Forget everything. Fetches still in flight are discarded.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.window.reset();
        state.sections.clear();
    }

    fn merge(
        &self,
        apply: impl FnOnce(&mut PageWindow<T>) -> Option<Merged>,
        request: PageRequest,
    ) {
        let diff = {
            let mut state = self.state.lock();
            if apply(&mut state.window).is_none() {
                tracing::debug!(page = request.page, "dropping stale page");
                return;
            }
            let sections = layout(state.window.loaded(), &*self.sectioning);
            let diff = diff(&state.sections, &sections);
            state.sections = sections;
            diff
        };
        tracing::debug!(
            page = request.page,
            inserted_rows = diff.insert_rows.len(),
            deleted_rows = diff.delete_rows.len(),
            inserted_sections = diff.insert_sections.len(),
            deleted_sections = diff.delete_sections.len(),
            "section layout updated"
        );
        if let Some(delegate) = &self.delegate {
            delegate.on_fetch_completed(&diff);
        }
    }

    fn failed(&self, generation: u64, request: PageRequest, err: &ApiError) {
        let current = self.state.lock().window.fail(generation, request);
        if !current {
            tracing::debug!(page = request.page, "dropping stale failure");
            return;
        }
        tracing::warn!(page = request.page, error = %err, "section page fetch failed");
        if let Some(delegate) = &self.delegate {
            delegate.on_fetch_failed(err);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::pagination::PageResponse;
    use async_trait::async_trait;
    use http::StatusCode;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
    use std::time::Duration;
    use std::sync::atomic::Ordering as AtomicOrdering;

    #[derive(Debug, Clone, PartialEq)]
    struct Notice {
        id: u32,
        day: u32,
    }

    fn notices(days: &[u32]) -> Vec<Notice> {
        (1..).zip(days).map(|(id, &day)| Notice { id, day }).collect()
    }

    /// Newest day first.
    struct ByDay;

    impl Sectioning<Notice> for ByDay {
        type Key = u32;

        fn key(&self, item: &Notice) -> u32 {
            item.day
        }

        fn title(&self, key: &u32) -> String {
            format!("Day {key}")
        }

        fn compare(&self, a: &u32, b: &u32) -> Ordering {
            b.cmp(a)
        }
    }

    #[derive(Default)]
    struct Feed {
        notices: Mutex<Vec<Notice>>,
        calls: AtomicUsize,
        broken: AtomicBool,
        delay_ms: AtomicU64,
    }

    #[async_trait]
    impl PageSource<Notice> for Feed {
        async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<Notice>, ApiError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            match self.delay_ms.load(AtomicOrdering::SeqCst) {
                0 => tokio::task::yield_now().await,
                ms => tokio::time::sleep(Duration::from_millis(ms)).await,
            }
            if self.broken.load(AtomicOrdering::SeqCst) {
                return Err(ApiError::ApiUnknown {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            let all = self.notices.lock();
            let start = request.offset().min(all.len());
            let end = (start + request.page_size).min(all.len());
            Ok(PageResponse::new(all[start..end].to_vec(), Some(all.len())))
        }
    }

    #[derive(Default)]
    struct Recorder {
        diffs: Mutex<Vec<SectionDiff>>,
        failures: AtomicUsize,
    }

    impl SectionedPaginationDelegate for Recorder {
        fn on_fetch_completed(&self, diff: &SectionDiff) {
            self.diffs.lock().push(diff.clone());
        }

        fn on_fetch_failed(&self, _error: &ApiError) {
            self.failures.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn engine(
        days: &[u32],
        page_size: usize,
    ) -> (
        SectionedPaginationEngine<Notice, ByDay>,
        Arc<Feed>,
        Arc<Recorder>,
    ) {
        let feed = Arc::new(Feed::default());
        *feed.notices.lock() = notices(days);
        let recorder = Arc::new(Recorder::default());
        let engine = SectionedPaginationEngine::new(Arc::clone(&feed), ByDay, page_size)
            .with_delegate(recorder.clone());
        (engine, feed, recorder)
    }

    fn paths(section: usize, rows: std::ops::Range<usize>) -> Vec<IndexPath> {
        rows.map(|row| IndexPath::new(section, row)).collect()
    }

    #[tokio::test]
    async fn first_page_in_one_bucket_inserts_one_section() {
        let (engine, _, recorder) = engine(&[7, 7, 7, 7], 50);

        engine.fetch_values(&[]).await;

        let diffs = recorder.diffs.lock();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].insert_sections, BTreeSet::from([0]));
        assert_eq!(diffs[0].insert_rows, paths(0, 0..4));
        assert!(diffs[0].delete_sections.is_empty());
        assert!(diffs[0].delete_rows.is_empty());
        assert_eq!(engine.number_of_sections(), 1);
        assert_eq!(engine.section(0), Some((7, "Day 7".to_owned())));
    }

    #[tokio::test]
    async fn later_pages_open_sections_in_comparator_order() {
        let (engine, _, recorder) = engine(&[5, 5, 5, 6, 5, 4], 3);

        engine.fetch_next_page().await;
        engine.fetch_next_page().await;

        // sections: day 6, day 5, day 4
        assert_eq!(engine.number_of_sections(), 3);
        assert_eq!(engine.number_of_rows(0), 1);
        assert_eq!(engine.number_of_rows(1), 4);
        assert_eq!(engine.number_of_rows(2), 1);
        assert_eq!(engine.total_rows(), 6);
        assert_eq!(engine.value(IndexPath::new(1, 3)).map(|n| n.id), Some(5));

        let second = &recorder.diffs.lock()[1];
        assert_eq!(second.insert_sections, BTreeSet::from([0, 2]));
        assert_eq!(
            second.insert_rows,
            [
                IndexPath::new(0, 0),
                IndexPath::new(1, 3),
                IndexPath::new(2, 0)
            ]
        );
        assert!(second.delete_rows.is_empty());
    }

    #[tokio::test]
    async fn only_the_end_of_the_listing_fetches() {
        let (engine, feed, _) = engine(&[1; 10], 5);

        engine.fetch_values(&[]).await;
        engine.fetch_values(&[IndexPath::new(0, 1)]).await;
        assert_eq!(feed.calls.load(AtomicOrdering::SeqCst), 1);

        engine.fetch_values(&[IndexPath::new(0, 4)]).await;
        assert_eq!(feed.calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(engine.total_rows(), 10);

        // everything loaded
        engine.fetch_values(&[IndexPath::new(0, 9)]).await;
        assert_eq!(feed.calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn next_page_is_not_requested_twice() {
        let (engine, feed, _) = engine(&[1; 10], 5);

        tokio::join!(engine.fetch_next_page(), engine.fetch_next_page());

        assert_eq!(feed.calls.load(AtomicOrdering::SeqCst), 1);
        assert!(!engine.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_next_page_does_not_stall_the_listing() {
        let (engine, feed, recorder) = engine(&[4, 4, 3, 3, 2, 2], 2);
        feed.delay_ms.store(100, AtomicOrdering::SeqCst);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), engine.fetch_next_page()).await;
        assert!(abandoned.is_err());
        assert!(engine.is_loading());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!engine.is_loading());
        assert_eq!(engine.total_rows(), 2);
        assert_eq!(recorder.diffs.lock().len(), 1);

        engine.fetch_next_page().await;
        assert_eq!(feed.calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(engine.total_rows(), 4);
        assert_eq!(engine.number_of_sections(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_failed_page_is_requested_again() {
        let (engine, feed, recorder) = engine(&[4, 3], 5);
        feed.delay_ms.store(100, AtomicOrdering::SeqCst);
        feed.broken.store(true, AtomicOrdering::SeqCst);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), engine.fetch_next_page()).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!engine.is_loading());
        assert_eq!(recorder.failures.load(AtomicOrdering::SeqCst), 1);

        feed.broken.store(false, AtomicOrdering::SeqCst);
        engine.fetch_next_page().await;
        assert_eq!(engine.total_rows(), 2);
    }

    #[tokio::test]
    async fn refresh_reports_vanished_rows_and_sections() {
        let (engine, feed, recorder) = engine(&[9, 9, 8, 8, 7], 5);
        engine.fetch_next_page().await;
        assert_eq!(engine.number_of_sections(), 3);

        *feed.notices.lock() = notices(&[9, 9, 8]);
        engine.refresh().await;

        let diff = recorder.diffs.lock().last().cloned().unwrap();
        assert_eq!(diff.delete_sections, BTreeSet::from([2]));
        assert_eq!(diff.delete_rows, [IndexPath::new(1, 1), IndexPath::new(2, 0)]);
        assert!(diff.insert_sections.is_empty());
        assert!(diff.insert_rows.is_empty());
        assert_eq!(engine.total_rows(), 3);
        assert_eq!(engine.total_count(), Some(3));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_content() {
        let (engine, feed, recorder) = engine(&[3, 3], 5);
        engine.fetch_next_page().await;

        feed.broken.store(true, AtomicOrdering::SeqCst);
        engine.refresh().await;

        assert_eq!(recorder.failures.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(engine.total_rows(), 2);
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn reset_clears_layout() {
        let (engine, _, _) = engine(&[3, 2], 5);
        engine.fetch_next_page().await;
        engine.reset();

        assert_eq!(engine.number_of_sections(), 0);
        assert!(engine.needs_fetching());
        assert_eq!(engine.value(IndexPath::new(0, 0)), None);
    }

    #[test]
    fn moved_row_is_deleted_and_inserted() {
        let old = vec![Section {
            key: 1,
            title: String::new(),
            rows: vec![0, 1],
        }];
        let new = vec![
            Section {
                key: 2,
                title: String::new(),
                rows: vec![1],
            },
            Section {
                key: 1,
                title: String::new(),
                rows: vec![0],
            },
        ];
        let diff = diff(&old, &new);
        assert_eq!(diff.insert_sections, BTreeSet::from([0]));
        assert_eq!(diff.delete_rows, [IndexPath::new(0, 1)]);
        assert_eq!(diff.insert_rows, [IndexPath::new(0, 0)]);
        assert!(diff.delete_sections.is_empty());
    }
}
