use url::Url;

/// Build the object path for an episode's audio
///
/// Format: `audio/<show-slug>/<episode-slug>-<id prefix>.<ext>`. The id
/// prefix keeps episodes that share a title apart.
pub fn object_path(
    show_slug: &str,
    episode_slug: &str,
    episode_id: &str,
    extension: &str,
) -> String {
    let id_prefix: String = episode_id.chars().take(8).collect();
    format!("audio/{show_slug}/{episode_slug}-{id_prefix}.{extension}")
}

/// Get the audio file extension for an enclosure
///
/// Attempts to extract from URL path or MIME type, defaults to "mp3"
pub fn audio_extension(url: &Url, mime_type: Option<&str>) -> String {
    // Try to get extension from URL path
    if let Some(ext) = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.').map(|(_, ext)| ext))
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(mime) = mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    "mp3".to_string()
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

/// Map MIME types to file extensions
fn mime_to_extension(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
