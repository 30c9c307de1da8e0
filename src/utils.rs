use std::path::Path;

use regex::Regex;

/// Maps a file extension to its `Content-Type` value.
///
/// The comparison is case-insensitive. Unknown extensions fall back to
/// `application/text`.
pub fn mime_type(file_path: &Path) -> &'static str {
    let ext = file_path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("htm") | Some("html") | Some("php") => "text/html",
        Some("css") => "text/css",
        Some("txt") => "text/plain",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("swf") => "application/x-shockwave-flash",
        Some("flv") => "video/x-flv",
        Some("png") => "image/png",
        Some("jpe") | Some("jpeg") | Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/vnd.microsoft.icon",
        Some("tiff") | Some("tif") => "image/tiff",
        Some("svg") | Some("svgz") => "image/svg+xml",
        _ => "application/text",
    }
}

/// Matches `pattern` against the beginning of `path`.
///
/// Returns the length of the match only when it starts at offset zero,
/// `None` otherwise.
pub fn prefix_match(path: &str, pattern: &Regex) -> Option<usize> {
    match pattern.find(path) {
        Some(m) if m.start() == 0 => Some(m.end()),
        _ => None,
    }
}

/// Runs a closure when the guard leaves scope, on every exit path.
pub struct Defer<F: FnOnce()> {
    on_exit: Option<F>,
}

impl<F: FnOnce()> Defer<F> {
    pub fn new(on_exit: F) -> Self {
        Self { on_exit: Some(on_exit) }
    }

    /// Disarms the guard; the closure will not run.
    pub fn cancel(mut self) {
        self.on_exit.take();
    }
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
    }
}
