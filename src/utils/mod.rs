pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{host_of, is_valid_url, origin_of, origin_of_str, resolve_url, screenshot_path};
