//! Maps a file extension to a mime tag and decides image-ness.
//!
//! Grounded on the teacher's use of `mime_guess` for attachment classification,
//! generalized beyond the original Python server's five-extension image table
//! to the crate's full registry.

/// Classify `path` by its extension. Falls back to `text/plain` when the
/// extension is unknown, matching the original server's default.
pub fn guess_mime_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("text/plain")
        .to_string()
}

/// True if `mime_type` names an image type we can return as base64.
pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_image_extensions() {
        for (name, expected) in [
            ("photo.png", "image/png"),
            ("photo.jpg", "image/jpeg"),
            ("photo.jpeg", "image/jpeg"),
            ("photo.gif", "image/gif"),
            ("photo.webp", "image/webp"),
        ] {
            let mime = guess_mime_type(name);
            assert_eq!(mime, expected, "for {name}");
            assert!(is_image_mime(&mime), "{name} should be classified as image");
        }
    }

    #[test]
    fn falls_back_to_text_plain_for_unknown_extension() {
        assert_eq!(guess_mime_type("README"), "text/plain");
        assert_eq!(guess_mime_type("notes.unknownext"), "text/plain");
    }

    #[test]
    fn text_extensions_are_not_images() {
        let mime = guess_mime_type("notes.txt");
        assert!(!is_image_mime(&mime));
    }
}
