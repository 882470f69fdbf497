//! Small parsing helpers shared by the discovery and control channels.

/// Extracts the text of the first `<tag>...</tag>` element in an XML body.
///
/// The camera replies are small, flat documents; this deliberately avoids a
/// full XML parser. Returns `None` if the tag is absent or unterminated.
pub(crate) fn xml_field<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

/// Extracts the host portion of an HTTP URL, dropping scheme, port, and
/// path. Returns `None` for non-HTTP URLs.
pub(crate) fn host_from_url(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let host_port = rest.split('/').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() { None } else { Some(host) }
}
