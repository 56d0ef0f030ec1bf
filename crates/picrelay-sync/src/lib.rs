//! WebDAV history mirror
//!
//! Pushes the full history snapshot to a WebDAV server as one JSON document,
//! overwriting the previous upload. The mirror is strictly best-effort: every
//! failure is logged and swallowed, and nothing ever flows back into local
//! state.

mod webdav;

pub use webdav::WebDavSync;
