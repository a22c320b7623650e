//! Xtream Codes URL Detection
//!
//! Recognizes `get.php` playlist URLs so a source can be synced through the
//! Player API instead of the (much larger) M3U export.

use tracing::debug;
use url::Url;

use super::types::XtreamCredentials;
use crate::models::SourceDescriptor;
use crate::services::credentials::CredentialCipher;

/// Extract Xtream credentials from an M3U URL
///
/// Supported URL patterns:
/// - `http://server:port/get.php?username=X&password=Y&...`
/// - `http://server:port/get.php?username=X&password=Y&type=m3u_plus&output=ts`
pub fn extract_credentials(m3u_url: &str) -> Option<XtreamCredentials> {
    let parsed = match Url::parse(m3u_url.trim()) {
        Ok(url) => url,
        Err(e) => {
            debug!("Failed to parse URL: {}", e);
            return None;
        }
    };

    let path = parsed.path().to_lowercase();
    if !path.ends_with("/get.php") {
        return None;
    }

    let mut username = None;
    let mut password = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "username" => username = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            _ => {}
        }
    }
    let username = username.filter(|u| !u.is_empty())?;
    let password = password.filter(|p| !p.is_empty())?;

    // Reconstruct server base URL (panels may live under a path prefix)
    let host = parsed.host_str()?;
    let port_suffix = parsed
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    let prefix = &parsed.path()[..parsed.path().len() - "/get.php".len()];
    let server = format!("{}://{}{}{}", parsed.scheme(), host, port_suffix, prefix);

    debug!(server = %server, username = %username, "Extracted Xtream credentials");

    Some(XtreamCredentials::new(&server, &username, &password))
}

/// Turns an Xtream-shaped playlist URL into an Xtream source descriptor,
/// encrypting the password. `None` for any other URL.
pub fn detect_xtream_source(
    name: &str,
    m3u_url: &str,
    cipher: &dyn CredentialCipher,
) -> Option<SourceDescriptor> {
    let creds = extract_credentials(m3u_url)?;
    let blob = cipher.encrypt(&creds.password);
    Some(SourceDescriptor::xtream(
        name,
        &creds.server,
        &creds.username,
        &blob,
    ))
}
