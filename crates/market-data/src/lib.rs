//! HTTP adapters behind the screener's data capabilities.
//!
//! - [`YahooFinanceClient`]: weekly chart history ([`HistoryProvider`])
//! - [`NasdaqListedSource`]: NASDAQ listed-securities directory ([`ListingSource`])
//! - [`IndexMembershipSource`]: index constituent tables on Wikipedia ([`ListingSource`])
//!
//! [`HistoryProvider`]: screener_core::HistoryProvider
//! [`ListingSource`]: screener_core::ListingSource

pub mod listings;
pub mod yahoo_finance;

pub use listings::*;
pub use yahoo_finance::*;

use std::time::Duration;

pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
