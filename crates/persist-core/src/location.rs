//! LocationStore trait abstraction over the page address bar.
//!
//! Implementations:
//! - `InMemoryLocation` - For testing, with `navigate` to simulate back/forward
//! - A `window.location` + `history.pushState` bridge on the browser side

use std::sync::RwLock;
use url::Url;

/// Read and rewrite query parameters of the current page address.
pub trait LocationStore: Send + Sync {
    /// First value of query parameter `name`, if present.
    fn query_param(&self, name: &str) -> Option<String>;

    /// Set query parameter `name` to `value`, keeping the other parameters.
    ///
    /// Must update the visible address without reloading the page.
    fn set_query_param(&self, name: &str, value: &str);
}

/// In-memory address bar for testing.
pub struct InMemoryLocation {
    url: RwLock<Url>,
    /// Number of address rewrites (pushState calls)
    pushes: RwLock<usize>,
}

impl InMemoryLocation {
    /// Create a location at `href`.
    pub fn new(href: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: RwLock::new(Url::parse(href)?),
            pushes: RwLock::new(0),
        })
    }

    /// Simulate a back/forward navigation to `href`.
    pub fn navigate(&self, href: &str) -> Result<(), url::ParseError> {
        let url = Url::parse(href)?;
        *self.url.write().unwrap_or_else(|e| e.into_inner()) = url;
        Ok(())
    }

    /// Current address.
    pub fn href(&self) -> String {
        self.url
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .to_string()
    }

    /// How many times the address was rewritten in place.
    pub fn push_count(&self) -> usize {
        *self.pushes.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocationStore for InMemoryLocation {
    fn query_param(&self, name: &str) -> Option<String> {
        let url = self.url.read().unwrap_or_else(|e| e.into_inner());
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn set_query_param(&self, name: &str, value: &str) {
        let mut url = self.url.write().unwrap_or_else(|e| e.into_inner());
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != name)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            pairs.append_pair(name, value);
        }

        *self.pushes.write().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}

impl<T: LocationStore + ?Sized> LocationStore for std::sync::Arc<T> {
    fn query_param(&self, name: &str) -> Option<String> {
        (**self).query_param(name)
    }

    fn set_query_param(&self, name: &str, value: &str) {
        (**self).set_query_param(name, value)
    }
}
