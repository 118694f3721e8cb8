/* 📖 # Why an API module in livedoc_engine?

The api module exposes the live-sync hub and the search engine over HTTP. The
service implements the `HttpService` trait from livedoc_base, so the same code
runs behind RealPal's tiny_http server and behind MockPal in tests.
*/

mod service;
pub mod sse;

pub use service::ApiService;
pub use sse::{SseStream, format_event};
