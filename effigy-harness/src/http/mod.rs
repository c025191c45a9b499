//! The HTTP test surface: request building, response capture,
//! subrequests and fake uploads.

pub mod fake;
pub mod files;
pub mod request;
pub mod response;

pub use fake::FakeHttp;
pub use files::FileFactory;
pub use request::TestRequestBuilder;
pub use response::TestResponse;
