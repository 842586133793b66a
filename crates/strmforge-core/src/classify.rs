//! Pure per-entry classification shared by the walk and webhook paths.

/// Category a remote file entry resolves to for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Media file; yields one `.strm` pointer.
    Main,
    /// Subtitle companion; fetched verbatim.
    Subtitle,
    /// Metadata companion; fetched verbatim.
    Metadata,
    /// No configured category matches; counted and skipped.
    Ignore,
}

/// Classify a remote file name against one task's extension settings.
///
/// `main_suffixes` are dot-less lowercase tokens compared against the
/// extension after the final dot. The companion lists are dot-prefixed
/// suffixes matched against the end of the file name. All comparisons are
/// case-insensitive. When an extension appears in several lists the
/// precedence is main, then subtitle, then metadata.
#[must_use]
pub fn classify(
    name: &str,
    main_suffixes: &[String],
    subtitle_suffixes: Option<&[String]>,
    metadata_suffixes: Option<&[String]>,
) -> Classification {
    let lowered = name.to_ascii_lowercase();

    if let Some(extension) = lowered.rsplit_once('.').map(|(_, ext)| ext)
        && !extension.is_empty()
        && main_suffixes.iter().any(|suffix| suffix == extension)
    {
        return Classification::Main;
    }

    if ends_with_any(&lowered, subtitle_suffixes) {
        return Classification::Subtitle;
    }

    if ends_with_any(&lowered, metadata_suffixes) {
        return Classification::Metadata;
    }

    Classification::Ignore
}

fn ends_with_any(lowered: &str, suffixes: Option<&[String]>) -> bool {
    suffixes.is_some_and(|suffixes| {
        suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && lowered.ends_with(suffix.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|token| (*token).to_string()).collect()
    }

    #[test]
    fn media_extensions_classify_as_main() {
        let mains = tokens(&["mp4", "mkv"]);
        assert_eq!(classify("a.mp4", &mains, None, None), Classification::Main);
        assert_eq!(classify("A.MKV", &mains, None, None), Classification::Main);
        assert_eq!(
            classify("a.avi", &mains, None, None),
            Classification::Ignore
        );
    }

    #[test]
    fn companions_match_by_trailing_suffix() {
        let mains = tokens(&["mp4"]);
        let subs = tokens(&[".srt", ".zh.ass"]);
        let meta = tokens(&[".nfo", ".jpg"]);

        assert_eq!(
            classify("movie.srt", &mains, Some(&subs), Some(&meta)),
            Classification::Subtitle
        );
        assert_eq!(
            classify("movie.zh.ass", &mains, Some(&subs), Some(&meta)),
            Classification::Subtitle
        );
        assert_eq!(
            classify("movie.nfo", &mains, Some(&subs), Some(&meta)),
            Classification::Metadata
        );
        assert_eq!(
            classify("movie.txt", &mains, Some(&subs), Some(&meta)),
            Classification::Ignore
        );
    }

    #[test]
    fn precedence_is_main_then_subtitle_then_metadata() {
        let mains = tokens(&["srt"]);
        let subs = tokens(&[".srt"]);
        let meta = tokens(&[".srt"]);
        assert_eq!(
            classify("movie.srt", &mains, Some(&subs), Some(&meta)),
            Classification::Main
        );

        let mains = tokens(&["mp4"]);
        assert_eq!(
            classify("movie.srt", &mains, Some(&subs), Some(&meta)),
            Classification::Subtitle
        );
    }

    #[test]
    fn disabled_companion_lists_never_match() {
        let mains = tokens(&["mp4"]);
        assert_eq!(
            classify("movie.srt", &mains, None, Some(&tokens(&[".srt"]))),
            Classification::Metadata
        );
        assert_eq!(
            classify("movie.srt", &mains, None, None),
            Classification::Ignore
        );
    }

    #[test]
    fn dotless_names_are_ignored() {
        let mains = tokens(&["mp4"]);
        assert_eq!(classify("README", &mains, None, None), Classification::Ignore);
        assert_eq!(classify(".hidden", &mains, None, None), Classification::Ignore);
    }
}
