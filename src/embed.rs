#![forbid(unsafe_code)]

//! Turns content-author supplied video links into iframe-embeddable URLs.
//!
//! Lesson and feed records store whatever link the author pasted. Before the
//! frontend can place it in an iframe `src` we map it onto the provider's
//! embed endpoint. When no safe embed can be derived the caller renders the
//! static fallback (thumbnail plus external link) instead, so every failure
//! mode here collapses into `None` rather than an error.

use url::Url;

/// Providers with a known page-URL-to-embed-URL convention, keyed off the
/// exact hostname. Adding a provider means one new variant plus its transform
/// below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedProvider {
    YouTube,
    TikTok,
    GoogleDrive,
}

impl EmbedProvider {
    fn from_host(host: &str) -> Option<Self> {
        match host {
            "www.youtube.com" | "youtu.be" => Some(Self::YouTube),
            "www.tiktok.com" => Some(Self::TikTok),
            "drive.google.com" => Some(Self::GoogleDrive),
            _ => None,
        }
    }
}

/// Maps a raw video URL to an embeddable one, or `None` when the input is
/// missing, malformed, or not a recognized provider link shape.
///
/// Pure and infallible: identical input always yields identical output and no
/// input panics or errors. Already-embeddable TikTok/Drive URLs are returned
/// byte-for-byte, so re-applying the function to its own output is a no-op
/// for those providers.
pub fn normalize_embed_url(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() || !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    let provider = EmbedProvider::from_host(url.host_str()?)?;

    match provider {
        EmbedProvider::YouTube => youtube_embed(&url),
        EmbedProvider::TikTok => tiktok_embed(raw, &url),
        EmbedProvider::GoogleDrive => drive_embed(raw, &url),
    }
}

/// Watch pages carry the id in the `v` query parameter; short links carry it
/// as the path. Both map onto the same embed endpoint.
fn youtube_embed(url: &Url) -> Option<String> {
    let id = if url.host_str() == Some("youtu.be") {
        let path = url.path().strip_prefix('/').unwrap_or(url.path());
        (!path.is_empty()).then(|| path.to_string())
    } else if url.path() == "/watch" {
        url.query_pairs()
            .find_map(|(key, value)| (key == "v").then(|| value.into_owned()))
            .filter(|id| !id.is_empty())
    } else {
        None
    };

    id.map(|id| format!("https://www.youtube.com/embed/{id}"))
}

/// Share links look like `/@username/video/{id}`. The username segment is
/// accepted as-is; only the `video/{id}` tail is checked.
fn tiktok_embed(raw: &str, url: &Url) -> Option<String> {
    if url.path().starts_with("/embed/") {
        return Some(raw.to_string());
    }

    // Splitting a leading-slash path yields an empty first element, so the
    // literal `video` lands at index 2 and the id at index 3.
    let segments: Vec<&str> = url.path().split('/').collect();
    match segments.as_slice() {
        [_, _, "video", id, ..] if !id.is_empty() => {
            Some(format!("https://www.tiktok.com/embed/v2/{id}"))
        }
        _ => None,
    }
}

/// File links (`/file/d/{id}/view`) and open links (`/open?id={id}`) both
/// resolve to the `/file/d/{id}/preview` embed form.
fn drive_embed(raw: &str, url: &Url) -> Option<String> {
    if url.path().contains("/preview") {
        return Some(raw.to_string());
    }

    let id = if url.path().starts_with("/file/d/") {
        url.path()
            .split('/')
            .nth(3)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    } else {
        url.query_pairs()
            .find_map(|(key, value)| (key == "id").then(|| value.into_owned()))
            .filter(|id| !id.is_empty())
    };

    id.map(|id| format!("https://drive.google.com/file/d/{id}/preview"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> Option<String> {
        normalize_embed_url(Some(raw))
    }

    #[test]
    fn absent_and_empty_inputs_yield_none() {
        assert_eq!(normalize_embed_url(None), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn non_http_schemes_yield_none() {
        assert_eq!(normalize("ftp://www.youtube.com/watch?v=abc"), None);
        assert_eq!(normalize("www.youtube.com/watch?v=abc"), None);
        assert_eq!(normalize("javascript:alert(1)"), None);
    }

    #[test]
    fn malformed_urls_yield_none_without_panicking() {
        assert_eq!(normalize("https://"), None);
        assert_eq!(normalize("http://"), None);
        assert_eq!(normalize("https://%"), None);
    }

    #[test]
    fn youtube_watch_page() {
        assert_eq!(
            normalize("https://www.youtube.com/watch?v=abc123"),
            Some("https://www.youtube.com/embed/abc123".to_string())
        );
    }

    #[test]
    fn youtube_watch_page_without_id_yields_none() {
        assert_eq!(normalize("https://www.youtube.com/watch"), None);
        assert_eq!(normalize("https://www.youtube.com/watch?v="), None);
    }

    #[test]
    fn youtube_watch_ignores_other_params() {
        assert_eq!(
            normalize("https://www.youtube.com/watch?t=42&v=abc123&list=PL9"),
            Some("https://www.youtube.com/embed/abc123".to_string())
        );
    }

    #[test]
    fn youtube_non_watch_paths_yield_none() {
        assert_eq!(normalize("https://www.youtube.com/shorts/abc123"), None);
        assert_eq!(normalize("https://www.youtube.com/"), None);
    }

    #[test]
    fn youtube_short_link() {
        assert_eq!(
            normalize("https://youtu.be/xyz789"),
            Some("https://www.youtube.com/embed/xyz789".to_string())
        );
    }

    #[test]
    fn youtube_short_link_with_empty_path_yields_none() {
        assert_eq!(normalize("https://youtu.be/"), None);
        assert_eq!(normalize("https://youtu.be"), None);
    }

    #[test]
    fn tiktok_share_link() {
        assert_eq!(
            normalize("https://www.tiktok.com/@someuser/video/1234567890"),
            Some("https://www.tiktok.com/embed/v2/1234567890".to_string())
        );
    }

    #[test]
    fn tiktok_embed_url_is_returned_unchanged() {
        let embed = "https://www.tiktok.com/embed/v2/1234567890";
        assert_eq!(normalize(embed), Some(embed.to_string()));
        // Re-applying to the output is a no-op.
        let reapplied = normalize(embed).as_deref().and_then(normalize);
        assert_eq!(reapplied, Some(embed.to_string()));
    }

    #[test]
    fn tiktok_unexpected_shapes_yield_none() {
        assert_eq!(normalize("https://www.tiktok.com/@someuser"), None);
        assert_eq!(normalize("https://www.tiktok.com/@someuser/video/"), None);
        assert_eq!(normalize("https://www.tiktok.com/discover/cats"), None);
    }

    #[test]
    fn drive_file_link() {
        assert_eq!(
            normalize("https://drive.google.com/file/d/FILE_ID/view"),
            Some("https://drive.google.com/file/d/FILE_ID/preview".to_string())
        );
    }

    #[test]
    fn drive_open_link_with_id_param() {
        assert_eq!(
            normalize("https://drive.google.com/open?id=FILE_ID"),
            Some("https://drive.google.com/file/d/FILE_ID/preview".to_string())
        );
    }

    #[test]
    fn drive_preview_url_is_returned_unchanged() {
        let embed = "https://drive.google.com/file/d/FILE_ID/preview";
        assert_eq!(normalize(embed), Some(embed.to_string()));
        let reapplied = normalize(embed).as_deref().and_then(normalize);
        assert_eq!(reapplied, Some(embed.to_string()));
    }

    #[test]
    fn drive_without_id_yields_none() {
        assert_eq!(normalize("https://drive.google.com/file/d/"), None);
        assert_eq!(normalize("https://drive.google.com/open"), None);
        assert_eq!(normalize("https://drive.google.com/open?id="), None);
    }

    #[test]
    fn unrecognized_hosts_yield_none() {
        assert_eq!(normalize("https://example.com/video/1"), None);
        // Lookalike hosts must match exactly, not by suffix.
        assert_eq!(normalize("https://m.youtube.com/watch?v=abc123"), None);
        assert_eq!(normalize("https://tiktok.com/@user/video/1"), None);
    }
}
