//! Paginated asset listing exposed as one lazy sequence.

use std::vec;

use crate::core::types::Asset;
use crate::io::api::{ApiError, AssetApi, AssetQuery, AssetPage};

/// Restartable view over every asset matching a query.
///
/// Each call to [`AssetListing::iter`] starts again from page 1; pages are
/// fetched only as the iterator is advanced.
pub struct AssetListing<'a, A: AssetApi + ?Sized> {
    api: &'a A,
    query: AssetQuery,
}

impl<'a, A: AssetApi + ?Sized> AssetListing<'a, A> {
    pub fn new(api: &'a A, query: AssetQuery) -> Self {
        Self { api, query }
    }

    pub fn iter(&self) -> AssetStream<'a, A> {
        AssetStream {
            api: self.api,
            query: self.query,
            next_page: Some(1),
            buffer: Vec::new().into_iter(),
        }
    }
}

impl<'a, A: AssetApi + ?Sized> IntoIterator for &AssetListing<'a, A> {
    type Item = Result<Asset, ApiError>;
    type IntoIter = AssetStream<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator produced by [`AssetListing::iter`].
///
/// Yields at most one error, after which the stream is exhausted.
pub struct AssetStream<'a, A: AssetApi + ?Sized> {
    api: &'a A,
    query: AssetQuery,
    next_page: Option<u32>,
    buffer: vec::IntoIter<Asset>,
}

impl<A: AssetApi + ?Sized> AssetStream<'_, A> {
    fn load(&mut self, page: u32) -> Result<(), ApiError> {
        let AssetPage { items, next_page } = self.api.fetch_page(&self.query, page)?;
        if let Some(next) = next_page
            && next <= page
        {
            return Err(ApiError::Decode(format!(
                "listing did not advance: page {page} points to page {next}"
            )));
        }
        self.next_page = next_page;
        self.buffer = items.into_iter();
        Ok(())
    }
}

impl<A: AssetApi + ?Sized> Iterator for AssetStream<'_, A> {
    type Item = Result<Asset, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for asset in self.buffer.by_ref() {
                if self.query.unlinked_only && asset.is_linked() {
                    continue;
                }
                return Some(Ok(asset));
            }
            let page = self.next_page.take()?;
            if let Err(err) = self.load(page) {
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MediaKind;
    use crate::test_support::{FakeApi, linked_photo, photo, video};

    fn library() -> FakeApi {
        FakeApi::new(vec![
            photo("p1", "A.heic", "2022-06-03T21:02:35.000Z"),
            linked_photo("p2", "B.heic", "2022-06-03T21:02:35.000Z", "v2"),
            photo("p3", "C.heic", "2022-06-03T21:02:35.000Z"),
            video("v1", "A.mov", "2022-06-03T21:02:35.000Z"),
            photo("p4", "D.heic", "2022-06-03T21:02:35.000Z"),
            photo("p5", "E.heic", "2022-06-03T21:02:35.000Z"),
        ])
        .with_page_size(2)
    }

    fn ids(listing: &AssetListing<'_, FakeApi>) -> Vec<String> {
        listing
            .iter()
            .map(|asset| asset.expect("asset").id)
            .collect()
    }

    #[test]
    fn walks_every_page_in_order() {
        let api = library();
        let listing = AssetListing::new(&api, AssetQuery::all(MediaKind::Image));
        assert_eq!(ids(&listing), vec!["p1", "p2", "p3", "p4", "p5"]);
        assert_eq!(api.page_requests(), 3);
    }

    #[test]
    fn unlinked_filter_drops_linked_images() {
        let api = library();
        let listing = AssetListing::new(&api, AssetQuery::unlinked(MediaKind::Image));
        assert_eq!(ids(&listing), vec!["p1", "p3", "p4", "p5"]);
    }

    #[test]
    fn listing_restarts_from_first_page() {
        let api = library();
        let listing = AssetListing::new(&api, AssetQuery::all(MediaKind::Image));
        let first: Vec<_> = listing.iter().take(1).map(|a| a.expect("asset").id).collect();
        assert_eq!(first, vec!["p1"]);
        assert_eq!(api.page_requests(), 1);
        assert_eq!(ids(&listing).len(), 5);
    }

    #[test]
    fn error_ends_the_stream() {
        let api = library();
        api.fail_next_page(ApiError::Server {
            status: 503,
            message: "busy".to_string(),
        });
        let listing = AssetListing::new(&api, AssetQuery::all(MediaKind::Image));
        let items: Vec<_> = listing.iter().collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
