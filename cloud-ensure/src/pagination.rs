use std::future::Future;

use futures::{stream, Stream, TryStreamExt};

use crate::error::ProviderError;

/// One page of a provider listing. `next` is the opaque cursor of the
/// following page (an offset or a marker, depending on the service).
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Page { items, next: None }
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Walks every page produced by `fetch`, starting from the first one, and
/// yields the items lazily. Pages are requested only as the stream is polled.
pub fn paginate<'a, T, F, Fut>(fetch: F) -> impl Stream<Item = Result<T, ProviderError>> + 'a
where
    T: 'a,
    F: Fn(Option<String>) -> Fut + 'a,
    Fut: Future<Output = Result<Page<T>, ProviderError>> + 'a,
{
    stream::try_unfold(Cursor::Start, move |cursor| {
        let pending = match cursor {
            Cursor::Start => Some(fetch(None)),
            Cursor::Next(token) => Some(fetch(Some(token))),
            Cursor::Done => None,
        };
        async move {
            let Some(pending) = pending else {
                return Ok::<_, ProviderError>(None);
            };
            let page = pending.await?;
            let next = page.next.map_or(Cursor::Done, Cursor::Next);
            let items = stream::iter(page.items.into_iter().map(Ok::<T, ProviderError>));
            Ok(Some((items, next)))
        }
    })
    .try_flatten()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::TryStreamExt;

    use super::*;

    fn numbers(cursor: Option<String>) -> Result<Page<u32>, ProviderError> {
        let offset: u32 = cursor.as_deref().unwrap_or("0").parse().map_err(anyhow::Error::from)?;
        let items: Vec<u32> = (offset..(offset + 2).min(5)).collect();
        let next = if offset + 2 < 5 {
            Some((offset + 2).to_string())
        } else {
            None
        };
        Ok(Page { items, next })
    }

    #[tokio::test]
    async fn follows_every_page() {
        let items: Vec<u32> = paginate(|cursor| async move { numbers(cursor) })
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn fetches_pages_only_when_polled() {
        let calls = AtomicUsize::new(0);
        let stream = paginate(|cursor| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { numbers(cursor) }
        });
        let mut stream = std::pin::pin!(stream);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.try_next().await.unwrap(), Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.try_next().await.unwrap(), Some(1));
        assert_eq!(stream.try_next().await.unwrap(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_at_first_error() {
        let result: Result<Vec<u32>, _> = paginate(|cursor| async move {
            match cursor {
                None => Ok(Page {
                    items: vec![1],
                    next: Some("1".to_string()),
                }),
                Some(_) => Err(ProviderError::Unavailable("boom".to_string())),
            }
        })
        .try_collect()
        .await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }
}
