//! Lazy record sequences.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};

use cloudlydb_core::{Cursor, Item, ItemStore, Model, ModelError, ModelMeta, QueryRequest, Result};

type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Stream every item matching `request`, following `last_evaluated_key`
/// until the store reports no more pages.
///
/// Nothing is fetched until the stream is polled. A store error ends the
/// stream after being yielded.
pub(crate) fn item_stream(
    store: Arc<dyn ItemStore>,
    mut request: QueryRequest,
) -> impl Stream<Item = Result<Item>> + Send {
    async_stream::stream! {
        let mut pages = 0usize;
        loop {
            let page = match store.query(&request).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(ModelError::from(e));
                    break;
                }
            };
            pages += 1;
            tracing::trace!(
                table = %request.table.table_name,
                pk = %request.pk,
                page = pages,
                items = page.items.len(),
                "Fetched page"
            );

            for item in page.items {
                yield Ok(item);
            }

            match page.last_evaluated_key {
                Some(key) => request.exclusive_start_key = Some(key),
                None => break,
            }
        }
    }
}

/// Turn a stored item into a typed record.
pub(crate) fn materialize<M: Model>(item: &Item) -> Result<M> {
    let meta = M::meta();
    let data = meta.table().data_of(item).ok_or_else(|| {
        ModelError::Serialization(format!(
            "{}: stored item has no '{}' map",
            meta.name(),
            meta.table().data_attribute
        ))
    })?;
    let value = meta.marshaller().unmarshal(data)?;
    Ok(serde_json::from_value(value)?)
}

/// Typed records from a stored item, logging items that do not fit.
fn materialize_logged<M: Model>(meta: &ModelMeta, item: Result<Item>) -> Result<M> {
    let item = item?;
    materialize(&item).inspect_err(|e| {
        tracing::warn!(
            model = %meta.name(),
            key = ?meta.table().key_of(&item),
            error = %e,
            "Stored item does not match the model"
        );
    })
}

/// A lazy, finite sequence of records.
///
/// Pages are fetched on demand as the stream is polled. Each call that
/// returns a `Records` issues its own query, so a listing can be restarted
/// by asking for it again.
pub struct Records<M> {
    inner: BoxStream<Result<M>>,
}

impl<M: Model> Records<M> {
    pub(crate) fn new(store: Arc<dyn ItemStore>, request: QueryRequest) -> Self {
        let meta = M::meta();
        let inner = item_stream(store, request).map(move |item| materialize_logged::<M>(meta, item));
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Keep only the records matching `predicate`.
    pub fn filter<F>(self, mut predicate: F) -> Self
    where
        F: FnMut(&M) -> bool + Send + 'static,
    {
        let inner = self.inner.filter(move |record| {
            let keep = match record {
                Ok(record) => predicate(record),
                Err(_) => true,
            };
            std::future::ready(keep)
        });
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Drain the sequence, stopping at the first error.
    pub async fn try_collect(mut self) -> Result<Vec<M>> {
        let mut records = Vec::new();
        while let Some(record) = self.inner.next().await {
            records.push(record?);
        }
        Ok(records)
    }
}

impl<M> Stream for Records<M> {
    type Item = Result<M>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// One page of records and the cursor to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<M> {
    pub records: Vec<M>,
    /// `None` on the last page.
    pub cursor: Option<Cursor>,
}

impl<M> Page<M> {
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}
