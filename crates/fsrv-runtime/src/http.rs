//! Minimal, shared HTTP/1.x request-line parsing and resolution helpers.
//!
//! Used by both the acceptor (peek + estimate) and the request handler so
//! the two pre-parse paths stay in lockstep. This is a restricted subset
//! of HTTP/1.1: request line only, no header map — `Connection:` is found
//! by a textual scan over the raw buffer rather than a line-oriented
//! header parse.

const MAX_METHOD_LEN: usize = 15;
const MAX_PATH_LEN: usize = 1023;
const MAX_VERSION_LEN: usize = 15;

#[derive(Debug, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a [u8],
    pub path: &'a [u8],
    pub version: Option<&'a [u8]>,
}

/// Parse whitespace-delimited tokens off the first line of `buf`:
/// `METHOD SP PATH [SP VERSION]`. Returns `None` if method or path is
/// missing, or if any token exceeds its bounded width.
pub fn parse_request_line(buf: &[u8]) -> Option<RequestLine<'_>> {
    let line_end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
    let mut line = &buf[..line_end];
    if let Some(&last) = line.last() {
        if last == b'\r' {
            line = &line[..line.len() - 1];
        }
    }

    let mut tokens = line.splitn(3, |&b| b == b' ').filter(|t| !t.is_empty());
    let method = tokens.next()?;
    let path = tokens.next()?;
    let version = tokens.next();

    if method.is_empty() || method.len() > MAX_METHOD_LEN {
        return None;
    }
    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return None;
    }
    if let Some(v) = version {
        if v.len() > MAX_VERSION_LEN {
            return None;
        }
    }

    Some(RequestLine {
        method,
        path,
        version,
    })
}

/// Case-insensitive substring scan for `Connection: close` / `Connection:
/// keep-alive` over the whole buffer. Returns the override if found, else
/// `None` meaning "use the version default".
pub fn connection_header_override(buf: &[u8]) -> Option<bool> {
    let hay = to_ascii_lower(buf);
    let close_needle = b"connection: close";
    let keep_needle = b"connection: keep-alive";
    if contains(&hay, close_needle) {
        Some(false)
    } else if contains(&hay, keep_needle) {
        Some(true)
    } else {
        None
    }
}

/// HTTP/1.0 defaults to close; anything else (effectively HTTP/1.1)
/// defaults to keep-alive.
pub fn default_keep_alive(version: Option<&[u8]>) -> bool {
    !matches!(version, Some(v) if v.eq_ignore_ascii_case(b"HTTP/1.0"))
}

/// Resolve the negotiated keep-alive decision for a request.
pub fn keep_alive_decision(buf: &[u8], version: Option<&[u8]>) -> bool {
    connection_header_override(buf).unwrap_or_else(|| default_keep_alive(version))
}

/// Reject any path containing `..`.
pub fn has_traversal(path: &[u8]) -> bool {
    contains(path, b"..")
}

/// Map a request path onto a filesystem path under `docroot`: empty or
/// `/` resolves to `<docroot>/index.html`; else
/// `<docroot>/<path-minus-leading-slash>`.
///
/// Strips *all* leading slashes, not just one: `PathBuf::push` treats a
/// component that still starts with `/` as absolute and replaces the
/// whole path with it, so a request for `//etc/passwd` would otherwise
/// resolve outside `docroot` without ever containing `..`.
pub fn resolve_fs_path(docroot: &str, path: &[u8]) -> Option<std::path::PathBuf> {
    let path_str = std::str::from_utf8(path).ok()?;
    let trimmed = path_str.trim_start_matches('/');
    let mut full = std::path::PathBuf::from(docroot);
    if trimmed.is_empty() {
        full.push("index.html");
    } else {
        full.push(trimmed);
    }
    Some(full)
}

fn to_ascii_lower(buf: &[u8]) -> Vec<u8> {
    buf.iter().map(|b| b.to_ascii_lowercase()).collect()
}

fn contains(hay: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || hay.len() < needle.len() {
        return needle.is_empty();
    }
    hay.windows(needle.len()).any(|w| w == needle)
}
