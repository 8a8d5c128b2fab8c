//! Expansion des playlists M3U en liste de fichiers locaux
//!
//! Une ligne est retenue si, une fois débarrassée de ses espaces, elle
//! commence par un caractère alphanumérique, n'est pas un chemin Windows
//! absolu (`C:\...`) et n'est pas une URL HTTP. Les commentaires `#EXTINF`
//! et les lignes vides sont donc ignorés naturellement.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;

/// Extensions reconnues comme playlists
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8"];

/// Un fichier audio à jouer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    path: PathBuf,
}

impl PlaylistEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nom du fichier sans extension, utilisé comme titre par défaut
    pub fn title(&self) -> Option<String> {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
    }
}

pub struct PlaylistExpander;

impl PlaylistExpander {
    /// Vrai si le chemin porte une extension de playlist (insensible à la casse)
    pub fn is_playlist(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                PLAYLIST_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    /// Filtre une ligne de playlist, retourne l'entrée nettoyée si elle est retenue
    pub fn accept_line(line: &str) -> Option<&str> {
        let entry = line.trim_start_matches('\u{feff}').trim();

        let first = entry.chars().next()?;
        if !first.is_alphanumeric() {
            return None;
        }
        if is_drive_path(entry) {
            return None;
        }
        let lower = entry.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return None;
        }
        Some(entry)
    }

    /// Applique [`accept_line`](Self::accept_line) à chaque ligne, dans l'ordre
    ///
    /// Les chemins sont retournés tels qu'écrits dans la playlist.
    pub fn parse_lines<I, S>(lines: I) -> Vec<PlaylistEntry>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| Self::accept_line(line.as_ref()).map(PlaylistEntry::new))
            .collect()
    }

    /// Lit une playlist sur disque
    ///
    /// Les entrées relatives sont résolues par rapport au répertoire de la
    /// playlist. Une playlist sans entrée retenue donne une liste vide.
    pub async fn expand(path: &Path) -> Result<Vec<PlaylistEntry>> {
        let content = tokio::fs::read_to_string(path).await?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        let entries: Vec<PlaylistEntry> = Self::parse_lines(content.lines())
            .into_iter()
            .map(|entry| {
                if entry.path().is_absolute() {
                    entry
                } else {
                    PlaylistEntry::new(base.join(entry.path()))
                }
            })
            .collect();

        for entry in &entries {
            debug!(entry = %entry.path().display(), "Playlist entry");
        }
        info!(playlist = %path.display(), count = entries.len(), "Playlist expanded");
        Ok(entries)
    }
}

/// `X:\` : lettre de lecteur suivie de deux-points et d'un antislash
fn is_drive_path(entry: &str) -> bool {
    let mut chars = entry.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(letter), Some(':'), Some('\\')) if letter.is_ascii_alphabetic()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(entries: &[PlaylistEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.path().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_lines_filters_comments_urls_and_drives() {
        let lines = [
            "#EXTM3U",
            "song.mp3",
            "  ",
            "http://x/y.mp3",
            "C:\\music\\a.mp3",
            "another.mp3",
        ];
        let entries = PlaylistExpander::parse_lines(lines);
        assert_eq!(paths(&entries), vec!["song.mp3", "another.mp3"]);
    }

    #[test]
    fn test_underscore_rejected_and_padding_trimmed() {
        let lines = [
            "song.mp3",
            "http://x/y.mp3",
            "C:\\song.mp3",
            "  another.mp3  ",
            "_bad.mp3",
        ];
        let entries = PlaylistExpander::parse_lines(lines);
        assert_eq!(paths(&entries), vec!["song.mp3", "another.mp3"]);
        assert_eq!(PlaylistExpander::accept_line("_bad.mp3"), None);
    }

    #[test]
    fn test_accept_line_trims_whitespace() {
        assert_eq!(PlaylistExpander::accept_line("  track 01.flac \r"), Some("track 01.flac"));
        assert_eq!(PlaylistExpander::accept_line("#EXTINF:123,Artist - Title"), None);
        assert_eq!(PlaylistExpander::accept_line("/abs/path.mp3"), None);
        assert_eq!(PlaylistExpander::accept_line("HTTPS://host/a.mp3"), None);
        assert_eq!(PlaylistExpander::accept_line("\u{feff}first.mp3"), Some("first.mp3"));
    }

    #[test]
    fn test_drive_letter_without_backslash_is_kept() {
        assert_eq!(PlaylistExpander::accept_line("C:music.mp3"), Some("C:music.mp3"));
        assert!(is_drive_path("d:\\x"));
    }

    #[test]
    fn test_is_playlist() {
        assert!(PlaylistExpander::is_playlist(Path::new("/tmp/list.m3u")));
        assert!(PlaylistExpander::is_playlist(Path::new("list.M3U8")));
        assert!(!PlaylistExpander::is_playlist(Path::new("song.mp3")));
        assert!(!PlaylistExpander::is_playlist(Path::new("m3u")));
    }

    #[test]
    fn test_entry_title_is_file_stem() {
        let entry = PlaylistEntry::new("/music/01 - Intro.mp3");
        assert_eq!(entry.title().as_deref(), Some("01 - Intro"));
    }

    #[tokio::test]
    async fn test_expand_resolves_relative_entries() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("list.m3u");
        tokio::fs::write(&playlist, "#EXTM3U\nsong.mp3\n\nsub/other.mp3\n/abs/file.mp3\n")
            .await
            .unwrap();

        let entries = PlaylistExpander::expand(&playlist).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path(), dir.path().join("song.mp3"));
        assert_eq!(entries[1].path(), dir.path().join("sub/other.mp3"));
    }

    #[tokio::test]
    async fn test_expand_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PlaylistExpander::expand(&dir.path().join("absent.m3u")).await.is_err());
    }
}
