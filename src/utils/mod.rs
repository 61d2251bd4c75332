pub mod address_validator;
pub mod url_utils;

pub use address_validator::AddressValidator;
pub use url_utils::{normalize_ipfs_url, normalize_opt};
