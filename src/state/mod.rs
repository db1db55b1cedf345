//! Address lifecycle state
//!
//! `UrlStatus` is the status column of the durable store and the
//! transition rules between its values.

mod url_status;

pub use url_status::UrlStatus;
