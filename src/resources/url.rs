//! URL classification and local path handling for the asset fetcher.

use std::path::{Path, PathBuf};

/// Where a request is served from after resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetLocation {
    Network(String),
    File(PathBuf),
}

pub fn is_http_url(url: &str) -> bool {
    has_scheme(url, "http://") || has_scheme(url, "https://")
}

pub fn is_file_url(url: &str) -> bool {
    has_scheme(url, "file://")
}

fn has_scheme(url: &str, scheme: &str) -> bool {
    url.as_bytes()
        .get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme.as_bytes()))
}

/// `C:`, `C:/..` or `C:\..`
pub fn is_drive_letter_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Absolute filesystem paths on any of the platforms tiles are authored on.
pub fn is_absolute_local_path(path: &str) -> bool {
    path.starts_with('/') || path.starts_with("\\\\") || is_drive_letter_path(path)
}

/**
 * Decides how `url` is served.
 *
 * Network URLs win, then explicit file URLs and absolute local paths. Anything
 * else is joined onto `base` (the directory of the last network request, or a
 * configured seed) and classified again. With no base, or if the join fails,
 * the input is used as a relative filesystem path.
 */
pub fn classify(url: &str, base: Option<&reqwest::Url>) -> AssetLocation {
    if is_http_url(url) {
        return AssetLocation::Network(url.to_string());
    }
    if is_file_url(url) {
        return AssetLocation::File(file_url_to_path(url));
    }
    if is_absolute_local_path(url) {
        return AssetLocation::File(PathBuf::from(url));
    }
    if let Some((base, resolved)) = base.and_then(|base| Some((base, base.join(url).ok()?))) {
        log::trace!("Resolved '{}' against '{}' to '{}'", url, base, resolved);
        let resolved = resolved.as_str();
        if is_http_url(resolved) {
            return AssetLocation::Network(resolved.to_string());
        }
        if is_file_url(resolved) {
            return AssetLocation::File(file_url_to_path(resolved));
        }
    }
    AssetLocation::File(PathBuf::from(url))
}

/// The directory part of a network URL, used as the base for later relative requests.
pub fn directory_of(url: &str) -> Option<reqwest::Url> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if parsed.cannot_be_a_base() {
        return None;
    }
    parsed.join("./").ok()
}

/// Turns `file://` URLs into paths, decoding percent escapes and dropping the
/// leading slash in front of a drive letter (`file:///C:/x` becomes `C:/x`).
pub fn file_url_to_path(url: &str) -> PathBuf {
    let rest = url.get("file://".len()..).unwrap_or_default();
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let decoded = percent_decode(rest);
    let normalized = match decoded.strip_prefix('/') {
        Some(tail) if is_drive_letter_path(tail) => tail.to_string(),
        _ => decoded,
    };
    PathBuf::from(normalized)
}

/// Builds the `file://` form of an absolute path. Backslashes become forward
/// slashes and characters that would end or escape a URL path are encoded.
pub fn path_to_file_url(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut encoded = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            ' ' => encoded.push_str("%20"),
            '#' => encoded.push_str("%23"),
            '?' => encoded.push_str("%3F"),
            _ => encoded.push(c),
        }
    }
    if is_drive_letter_path(&encoded) {
        format!("file:///{}", encoded)
    } else {
        format!("file://{}", encoded)
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept verbatim and invalid
/// UTF-8 is replaced.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Content type of a local file, judged by extension.
pub fn content_type_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_urls_are_recognized_case_insensitively() {
        assert!(is_http_url("http://example.com/a.b3dm"));
        assert!(is_http_url("HTTPS://example.com/"));
        assert!(!is_http_url("file:///tmp/a"));
        assert!(!is_http_url("tiles/http.json"));
    }

    #[test]
    fn drive_letters() {
        assert!(is_drive_letter_path("C:/data/tileset.json"));
        assert!(is_drive_letter_path("d:\\tiles"));
        assert!(is_drive_letter_path("E:"));
        assert!(!is_drive_letter_path("C:data"));
        assert!(!is_drive_letter_path("1:/x"));
    }

    #[test]
    fn file_urls_decode_and_normalize() {
        assert_eq!(
            file_url_to_path("file:///tmp/my%20tiles/0.b3dm"),
            PathBuf::from("/tmp/my tiles/0.b3dm")
        );
        assert_eq!(
            file_url_to_path("file:///C:/Data/t%C3%BCle.glb"),
            PathBuf::from("C:/Data/tüle.glb")
        );
        assert_eq!(
            file_url_to_path("file://localhost/srv/a.glb"),
            PathBuf::from("/srv/a.glb")
        );
    }

    #[test]
    fn malformed_escapes_are_kept() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("%41%42"), "AB");
        assert_eq!(percent_decode("%4"), "%4");
    }

    #[test]
    fn relative_urls_follow_the_base() {
        let base = directory_of("https://tiles.example.com/city/tileset.json").unwrap();
        assert_eq!(base.as_str(), "https://tiles.example.com/city/");
        assert_eq!(
            classify("0/1.b3dm", Some(&base)),
            AssetLocation::Network("https://tiles.example.com/city/0/1.b3dm".to_string())
        );
        assert_eq!(
            classify("0/1.b3dm", None),
            AssetLocation::File(PathBuf::from("0/1.b3dm"))
        );
        assert_eq!(
            classify("D:\\tiles\\0.b3dm", Some(&base)),
            AssetLocation::File(PathBuf::from("D:\\tiles\\0.b3dm"))
        );
    }

    #[test]
    fn file_base_resolves_to_local_paths() {
        let base = reqwest::Url::parse("file:///srv/tiles/").unwrap();
        assert_eq!(
            classify("child%20a.glb", Some(&base)),
            AssetLocation::File(PathBuf::from("/srv/tiles/child a.glb"))
        );
    }

    #[test]
    fn paths_round_trip_through_file_urls() {
        let url = path_to_file_url(Path::new("/tmp/a b#1.glb"));
        assert_eq!(url, "file:///tmp/a%20b%231.glb");
        assert_eq!(file_url_to_path(&url), PathBuf::from("/tmp/a b#1.glb"));
        assert_eq!(path_to_file_url(Path::new("C:\\m.glb")), "file:///C:/m.glb");
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for_path(Path::new("tileset.JSON")), "application/json");
        assert_eq!(content_type_for_path(Path::new("0.b3dm")), "application/octet-stream");
        assert_eq!(content_type_for_path(Path::new("noext")), "application/octet-stream");
    }
}
