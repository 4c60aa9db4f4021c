//! The zero-copy HTTP/1.1 wire codec: parsing, chunked transfer-coding,
//! content decompression and serialization.

pub mod chunked;
pub mod compress;
pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod serialize;
pub mod status;
pub mod url;

pub use self::headers::{HeaderList, RawHeader, MAX_HEADERS};
pub use self::method::Method;
pub use self::request::{Parsed, Request};
pub use self::response::Response;
pub use self::url::{Scheme, Url};
