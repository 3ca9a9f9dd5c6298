use std::sync::{Arc, Mutex};

use futures_lite::StreamExt;
use serde::Serialize;
use wayfind_core::{Searcher, Suggestion};

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct View {
    pub input: String,
    pub suggestions: Vec<Suggestion>,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Bumped by every search, short input and cancel. Settlements carrying
    /// an older value are dropped.
    pub request: u64,
}

/// Binds a [`Searcher`] to an input field.
///
/// Every input change issues a search; settlements of superseded searches
/// are ignored by comparing against the session's own request counter.
/// Changes are announced on [`changes`](Self::changes).
pub struct Session {
    executor: Arc<async_executor::Executor<'static>>,
    searcher: Arc<Searcher>,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    view: View,
    sender: async_broadcast::Sender<()>,
    /// Keeps the channel open while no receiver is listening.
    _keep_alive: async_broadcast::InactiveReceiver<()>,
}

impl Inner {
    fn notify(&self) {
        let _ = self.sender.try_broadcast(());
    }
}

impl Session {
    pub fn new(executor: Arc<async_executor::Executor<'static>>, searcher: Arc<Searcher>) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(64);
        sender.set_overflow(true);
        let keep_alive = receiver.deactivate();
        Self {
            executor,
            searcher,
            inner: Arc::new(Mutex::new(Inner {
                view: View::default(),
                sender,
                _keep_alive: keep_alive,
            })),
        }
    }

    /// Snapshot of the current view.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn view(&self) -> View {
        self.inner.lock().expect("poisoned").view.clone()
    }

    /// A receiver notified after every view change.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn changes(&self) -> async_broadcast::Receiver<()> {
        self.inner.lock().expect("poisoned").sender.new_receiver()
    }

    /// Replace the input text and search for it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_input(&self, text: &str) {
        let mut inner = self.inner.lock().expect("poisoned");
        inner.view.input = text.to_owned();

        if text.trim().chars().count() < self.searcher.options().min_chars {
            self.searcher.cancel();
            inner.view.request += 1;
            inner.view.suggestions.clear();
            inner.view.loading = false;
            inner.view.error = None;
            inner.notify();
            return;
        }

        inner.view.request += 1;
        let request = inner.view.request;
        inner.view.loading = true;
        inner.view.error = None;
        inner.notify();

        let search = self.searcher.search(text);
        drop(inner);

        let inner = Arc::clone(&self.inner);
        self.executor
            .spawn(async move {
                let outcome = search.await;
                let mut inner = inner.lock().expect("poisoned");
                if inner.view.request != request {
                    return;
                }
                match outcome {
                    Ok(suggestions) => inner.view.suggestions = suggestions,
                    Err(e) => {
                        tracing::warn!(request, ?e, "search failed");
                        inner.view.error = Some(format!("{e:?}"));
                    }
                }
                inner.view.loading = false;
                inner.notify();
            })
            .detach();
    }

    /// Search again for the current input. Cached results are still served.
    pub fn refetch(&self) {
        let input = self.view().input;
        self.set_input(&input);
    }

    /// Abandon the outstanding search, if any. Like a superseded search,
    /// a cancelled one leaves no suggestions behind.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn cancel(&self) {
        self.searcher.cancel();
        let mut inner = self.inner.lock().expect("poisoned");
        if inner.view.loading {
            inner.view.request += 1;
            inner.view.loading = false;
            inner.view.suggestions.clear();
            inner.notify();
        }
    }

    pub fn clear_cache(&self) {
        self.searcher.clear_cache();
    }

    /// Wait until no search is outstanding.
    pub async fn settled(&self) {
        let mut changes = self.changes();
        while self.view().loading {
            if changes.next().await.is_none() {
                return;
            }
        }
    }

    /// Cancel outstanding work and end the [`changes`](Self::changes)
    /// streams.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn close(&self) {
        self.searcher.cancel();
        self.inner.lock().expect("poisoned").sender.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.searcher.cancel();
    }
}
