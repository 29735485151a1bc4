use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// A browser tab as reported by the host's tab query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: Option<i64>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub favicon: Option<String>,
    pub window_id: Option<i64>,
}

impl Tab {
    /// The tab's url, if it is present and parses as an absolute url.
    pub fn page_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty() && Url::parse(u).is_ok())
    }
}

/// Access to the active tab of the current window.
pub trait TabQuery {
    fn active_tab(&self) -> impl Future<Output = Result<Option<Tab>>> + Send;
}
