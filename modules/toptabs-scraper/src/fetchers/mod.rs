mod browserless;
mod chain;
mod chrome;
mod http;

pub use browserless::BrowserlessFetcher;
pub use chain::FetchChain;
pub use chrome::ChromeFetcher;
pub use http::HttpFetcher;

/// Desktop browser identity; the listing host rejects obvious bots.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
