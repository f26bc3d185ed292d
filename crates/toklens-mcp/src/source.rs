use crate::protocol::{InitializeResult, ListKind, Listable, Page};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use toklens_core::{ToklensError, ToklensResult};
use tracing::warn;

/// A connected MCP session that toklens can inspect.
///
/// Implementations must be usable from any task; all toklens calls go
/// through `&self`.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Result of the `initialize` handshake, or `None` if it never completed.
    fn initialize_result(&self) -> Option<&InitializeResult>;

    /// Fetch one page of a listing. `cursor` is `None` for the first page.
    async fn list_page(&self, kind: ListKind, cursor: Option<String>) -> ToklensResult<Page>;

    /// End the session and release its process or connection.
    async fn close(&self) -> ToklensResult<()>;
}

/// A session together with the name it was configured under.
///
/// The name is the config map key and may be empty for ad-hoc runs.
pub struct NamedSession {
    inner: Box<dyn CapabilitySource>,
    name: String,
}

impl NamedSession {
    /// Wrap `inner` under the configured `name`.
    pub fn new(inner: Box<dyn CapabilitySource>, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    /// Configured name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl CapabilitySource for NamedSession {
    fn initialize_result(&self) -> Option<&InitializeResult> {
        self.inner.initialize_result()
    }

    async fn list_page(&self, kind: ListKind, cursor: Option<String>) -> ToklensResult<Page> {
        self.inner.list_page(kind, cursor).await
    }

    async fn close(&self) -> ToklensResult<()> {
        self.inner.close().await
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

struct ListState {
    buffered: VecDeque<serde_json::Value>,
    cursor: Cursor,
    seen: HashSet<String>,
}

/// List every artifact of type `T`, one page at a time.
///
/// The stream is lazy and can be consumed once. It ends after yielding the
/// first error; a page that fails to fetch or decode ends the listing for
/// that category only. A cursor the server already handed out ends the
/// listing after the current page.
pub fn list<'a, T: Listable>(source: &'a dyn CapabilitySource) -> BoxStream<'a, ToklensResult<T>> {
    let state = ListState {
        buffered: VecDeque::new(),
        cursor: Cursor::Start,
        seen: HashSet::new(),
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(raw) = state.buffered.pop_front() {
                return match serde_json::from_value::<T>(raw) {
                    Ok(item) => Some((Ok(item), state)),
                    Err(e) => {
                        state.buffered.clear();
                        state.cursor = Cursor::Done;
                        let err = ToklensError::Listing(format!(
                            "{}: malformed item: {e}",
                            T::KIND.method()
                        ));
                        Some((Err(err), state))
                    }
                };
            }

            let cursor = match std::mem::replace(&mut state.cursor, Cursor::Done) {
                Cursor::Done => return None,
                Cursor::Start => None,
                Cursor::Next(cursor) => Some(cursor),
            };

            match source.list_page(T::KIND, cursor).await {
                Ok(page) => {
                    state.buffered = page.items.into();
                    if let Some(next) = page.next_cursor {
                        if state.seen.insert(next.clone()) {
                            state.cursor = Cursor::Next(next);
                        } else {
                            warn!(method = T::KIND.method(), cursor = %next, "repeated cursor, ending listing");
                        }
                    }
                }
                Err(e) => return Some((Err(e), state)),
            }
        }
    })
    .boxed()
}
