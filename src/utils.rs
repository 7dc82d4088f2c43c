//! Utility functions for output filenames, path collisions and bounded HTTP waits

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::ZoneLink;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For `Rename` this may return a path with a ` (n)` suffix. For `Skip` an
/// existing file is an error. For `Overwrite` the path is returned unchanged.
///
/// # Examples
///
/// ```
/// use czds_dl::utils::get_unique_path;
/// use czds_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/com.txt");
/// let unique = get_unique_path(path, FileCollisionAction::Overwrite).unwrap();
/// assert_eq!(unique, path);
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "{} already exists and collision action is skip",
                        path.display()
                    ),
                )));
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let invalid = |reason: &str| Error::Other(format!("{}: {reason}", path.display()));
            let file_name = path
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| invalid("cannot extract file name"))?;
            let parent = path
                .parent()
                .ok_or_else(|| invalid("cannot extract parent directory"))?;

            // "com.txt.gz" keeps its compound extension: "com (1).txt.gz"
            let (stem, extension) = match file_name.split_once('.') {
                Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
                _ => (file_name, None),
            };

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{stem} ({i}).{ext}"),
                    None => format!("{stem} ({i})"),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(invalid("could not find unique filename after 9999 attempts"))
        }
    }
}

/// Extract the suggested filename from a `Content-Disposition` header value.
///
/// Accepts `filename="com.txt.gz"`, unquoted `filename=com.txt.gz`, and the
/// RFC 5987 form `filename*=UTF-8''com.txt.gz`. Parameter names are matched
/// case-sensitively. Directory components are stripped from the result.
///
/// ```
/// use czds_dl::utils::filename_from_content_disposition;
///
/// assert_eq!(
///     filename_from_content_disposition("attachment;filename=\"com.txt.gz\""),
///     Some("com.txt.gz".to_string())
/// );
/// assert_eq!(filename_from_content_disposition("inline"), None);
/// ```
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(raw) = part.strip_prefix("filename=") {
            return sanitize_filename(raw.trim().trim_matches('"'));
        } else if let Some(raw) = part.strip_prefix("filename*=") {
            // charset'lang'percent-encoded
            let encoded = raw.rsplit('\'').next().unwrap_or(raw);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return sanitize_filename(&decoded);
            }
        }
    }
    None
}

/// Strip any directory components so a suggested name cannot escape the output directory
fn sanitize_filename(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Decide the output filename for a zone link.
///
/// Prefers the `Content-Disposition` suggestion, falling back to
/// `<zone-name>.txt`. When the body is written decompressed (`decoded`),
/// a trailing `.gz` is dropped from the suggested name.
pub fn output_filename(link: &ZoneLink, content_disposition: Option<&str>, decoded: bool) -> String {
    let suggested = content_disposition.and_then(filename_from_content_disposition);
    match suggested {
        Some(name) if decoded => match name.strip_suffix(".gz") {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => name,
        },
        Some(name) => name,
        None => {
            let zone = link.zone_name();
            if zone.is_empty() {
                "zone.txt".to_string()
            } else {
                format!("{zone}.txt")
            }
        }
    }
}

/// Send a request, waiting at most `timeout` for the response headers.
///
/// Expiry surfaces as [`Error::TransientServer`] so an unresponsive host
/// cannot stall a worker indefinitely.
pub(crate) async fn send_with_timeout(
    request: reqwest::RequestBuilder,
    timeout: Duration,
    url: &str,
) -> Result<reqwest::Response> {
    tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| Error::timeout("response headers", url))?
        .map_err(Error::from)
}

/// Read a small response body whole, bounded by `timeout`.
pub(crate) async fn read_body_with_timeout(
    response: reqwest::Response,
    timeout: Duration,
    url: &str,
) -> Result<bytes::Bytes> {
    tokio::time::timeout(timeout, response.bytes())
        .await
        .map_err(|_| Error::timeout("response body", url))?
        .map_err(Error::from)
}
