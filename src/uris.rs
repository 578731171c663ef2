// Address construction for published assets. Pure string work over the
// locator paths handed back by the service, so it is unit tested here.

use crate::api::{AssetFile, Locator};

const MANIFEST_SUFFIX: &str = ".ism";
const HLS_FORMAT: &str = "(format=m3u8-aapl)";
const DASH_FORMAT: &str = "(format=mpd-time-csf)";

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name
            .get(name.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

/// True for progressive-download renditions.
pub fn is_mp4(name: &str) -> bool {
    ends_with_ignore_case(name, ".mp4")
}

/// The streaming manifest of an encoded asset, if it has one.
pub fn manifest_file(files: &[AssetFile]) -> Option<&AssetFile> {
    files.iter().find(|f| ends_with_ignore_case(&f.name, MANIFEST_SUFFIX))
}

/// Smooth Streaming, HLS and MPEG-DASH addresses of one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingUris {
    pub smooth_streaming: String,
    pub hls: String,
    pub mpeg_dash: String,
}

pub fn smooth_streaming_uri(origin: &Locator, manifest: &AssetFile) -> String {
    let base = origin.path.trim_end_matches('/');
    format!("{}/{}/manifest", base, urlencoding::encode(&manifest.name))
}

pub fn hls_uri(origin: &Locator, manifest: &AssetFile) -> String {
    format!("{}{}", smooth_streaming_uri(origin, manifest), HLS_FORMAT)
}

pub fn mpeg_dash_uri(origin: &Locator, manifest: &AssetFile) -> String {
    format!("{}{}", smooth_streaming_uri(origin, manifest), DASH_FORMAT)
}

pub fn streaming_uris(origin: &Locator, manifest: &AssetFile) -> StreamingUris {
    StreamingUris {
        smooth_streaming: smooth_streaming_uri(origin, manifest),
        hls: hls_uri(origin, manifest),
        mpeg_dash: mpeg_dash_uri(origin, manifest),
    }
}

/// Address of one blob inside a SAS container path: the file name goes
/// between the container path and the signature query.
pub fn sas_file_uri(container: &str, file_name: &str) -> String {
    let (base, query) = match container.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (container, None),
    };
    let mut uri = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(file_name)
    );
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LocatorType;

    fn locator(path: &str, locator_type: LocatorType) -> Locator {
        Locator {
            id: "loc".into(),
            path: path.into(),
            locator_type,
            asset_id: "asset".into(),
            access_policy_id: "policy".into(),
            expiration_date_time: None,
        }
    }

    fn file(name: &str) -> AssetFile {
        AssetFile {
            id: format!("id-{}", name),
            name: name.into(),
            parent_asset_id: "asset".into(),
            content_file_size: None,
            is_primary: false,
            mime_type: None,
        }
    }

    #[test]
    fn mp4_match_ignores_case() {
        assert!(is_mp4("clip_1280x720.mp4"));
        assert!(is_mp4("CLIP.MP4"));
        assert!(!is_mp4("clip.mp4.ism"));
        assert!(!is_mp4("mp4"));
        assert!(!is_mp4("manifest.ismc"));
    }

    #[test]
    fn streaming_uris_hang_off_the_manifest() {
        let origin = locator("http://acct.streaming.mediaservices.windows.net/abc-123/", LocatorType::OnDemandOrigin);
        let files = vec![file("video_1280x720.mp4"), file("video.ism"), file("video.ismc")];
        let manifest = manifest_file(&files).unwrap();
        let uris = streaming_uris(&origin, manifest);
        assert_eq!(
            uris.smooth_streaming,
            "http://acct.streaming.mediaservices.windows.net/abc-123/video.ism/manifest"
        );
        assert_eq!(uris.hls, format!("{}(format=m3u8-aapl)", uris.smooth_streaming));
        assert_eq!(uris.mpeg_dash, format!("{}(format=mpd-time-csf)", uris.smooth_streaming));
    }

    #[test]
    fn no_manifest_without_ism() {
        assert!(manifest_file(&[file("a.mp4"), file("a.ismc")]).is_none());
    }

    #[test]
    fn sas_uri_inserts_name_before_query() {
        let container = "https://acct.blob.core.windows.net/asset-1?sv=2012-02-12&sr=c&sig=abc%3D";
        assert_eq!(
            sas_file_uri(container, "my clip.mp4"),
            "https://acct.blob.core.windows.net/asset-1/my%20clip.mp4?sv=2012-02-12&sr=c&sig=abc%3D"
        );
        assert_eq!(
            sas_file_uri("http://127.0.0.1/asset-1/", "a.mp4"),
            "http://127.0.0.1/asset-1/a.mp4"
        );
    }
}
