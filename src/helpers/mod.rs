//! Helper functions for rendering
//!
//! Date formatting, URL generation and HTML snippets shared by the
//! generator, the templates and the server.

mod date;
mod html;
mod url;

pub use date::*;
pub use html::*;
pub use url::*;
