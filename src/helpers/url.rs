//! URL helper functions

use crate::config::SiteConfig;

/// Directory holding article pages
pub const POST_DIR: &str = "post";

/// Directory holding the static listing pages fetched by "load more"
pub const LISTING_DIR: &str = "api/posts";

/// Generate a URL with the root path
///
/// # Examples
/// ```ignore
/// url_for(&config, "/css/style.css") // -> "/blog/css/style.css"
/// ```
pub fn url_for(config: &SiteConfig, path: &str) -> String {
    let root = config.root.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        format!("{}/", root)
    } else {
        format!("{}/{}", root, path)
    }
}

/// Generate a full URL including the domain
///
/// # Examples
/// ```ignore
/// full_url_for(&config, "/post/hello/") // -> "https://example.com/blog/post/hello/"
/// ```
pub fn full_url_for(config: &SiteConfig, path: &str) -> String {
    let base = config.url.trim_end_matches('/');
    format!("{}{}", base, url_for(config, path))
}

/// Site-relative path of an article page, e.g. `post/hello-world/`
pub fn post_path(uid: &str) -> String {
    format!("{}/{}/", POST_DIR, encode_url(uid))
}

/// Site-relative path of listing page `page` (2-based; page 1 is the home page)
pub fn listing_path(page: usize) -> String {
    format!("{}/{}.json", LISTING_DIR, page)
}

/// Whether a uid can be used as a single directory name below `public_dir`
pub fn is_safe_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid != "."
        && uid != ".."
        && !uid.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Article uid addressed by a request path such as `/blog/post/hello/`
pub fn uid_from_path(config: &SiteConfig, path: &str) -> Option<String> {
    let root = config.root.trim_matches('/');
    let path = path.trim_matches('/');
    let path = if root.is_empty() {
        path
    } else {
        path.strip_prefix(root)?.trim_start_matches('/')
    };

    let mut segments = path.split('/');
    if segments.next()? != POST_DIR {
        return None;
    }
    let uid = segments.next()?;
    let rest: Vec<&str> = segments.filter(|s| !s.is_empty() && *s != "index.html").collect();
    if !rest.is_empty() {
        return None;
    }

    let uid = percent_encoding::percent_decode_str(uid)
        .decode_utf8()
        .ok()?
        .into_owned();
    is_safe_uid(&uid).then_some(uid)
}

/// Encode a URL path segment
pub fn encode_url(path: &str) -> String {
    percent_encoding::utf8_percent_encode(path, percent_encoding::NON_ALPHANUMERIC)
        .to_string()
        .replace("%2D", "-")
        .replace("%5F", "_")
}
