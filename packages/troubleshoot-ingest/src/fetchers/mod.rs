//! Fetcher implementations.

pub mod http;
pub mod login;
pub mod robots;
pub mod session;

pub use http::HttpFetcher;
pub use login::{LoginForm, SubmitStrategy};
pub use robots::{RobotsCache, RobotsRules};
pub use session::SessionState;
