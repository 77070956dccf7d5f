//! Sample directory scanning
//!
//! A library root holds one folder per selector character:
//!
//! ```text
//! samples/
//!   x/lower/*.wav      selector 'x'
//!   x/upper/*.wav      selector 'X'
//!   _/equals/*.wav     selector '='
//! ```
//!
//! The rest selectors `-` and space have no folder.
//!
//! Files are taken in name order and numbered from buffer 1 upward.

use std::path::{Path, PathBuf};

use ostinato_core::{SampleBank, SampleMap};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SampleLibraryError {
    #[error("Sample directory not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Folder names for selectors that are not letters
const SYMBOLS: &[(char, &str)] = &[
    ('=', "equals"),
    ('*', "asterix"),
    ('+', "plus"),
    ('/', "forward_slash"),
    ('\\', "back_slash"),
    (':', "colon"),
    ('&', "ampersand"),
    ('~', "tilde"),
    ('#', "hash"),
    ('@', "at"),
    ('%', "percent"),
    ('!', "exclamation"),
    ('^', "caret"),
    ('?', "question_mark"),
    ('$', "dollar"),
    ('|', "bar"),
    ('<', "less_than"),
    ('>', "greater_than"),
];

/// Folder holding the samples for `selector`, relative to the library root
pub fn selector_dir(selector: char) -> Option<PathBuf> {
    if selector.is_ascii_alphabetic() {
        let case = if selector.is_ascii_lowercase() { "lower" } else { "upper" };
        let folder = selector.to_ascii_lowercase().to_string();
        return Some(PathBuf::from(folder).join(case));
    }
    SYMBOLS
        .iter()
        .find(|(c, _)| *c == selector)
        .map(|(_, name)| PathBuf::from("_").join(name))
}

fn selectors() -> impl Iterator<Item = char> {
    ('a'..='z')
        .chain('A'..='Z')
        .chain(SYMBOLS.iter().map(|(c, _)| *c))
}

/// Sample bank backed by WAV files on disk
#[derive(Debug, Clone, Default)]
pub struct SampleLibrary {
    root: PathBuf,
    map: SampleMap,
    paths: Vec<PathBuf>,
}

impl SampleLibrary {
    /// Scan `root`. Files that can't be read as WAV are skipped with a warning.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self, SampleLibraryError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SampleLibraryError::NotFound(root.to_path_buf()));
        }

        let mut library = Self {
            root: root.to_path_buf(),
            ..Default::default()
        };

        for selector in selectors() {
            let Some(rel) = selector_dir(selector) else { continue };
            let dir = root.join(rel);
            if !dir.is_dir() {
                continue;
            }

            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension()
                        .and_then(|s| s.to_str())
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
                })
                .collect();
            files.sort();

            for path in files {
                match hound::WavReader::open(&path) {
                    Ok(reader) => {
                        let channels = reader.spec().channels;
                        library.paths.push(path);
                        let buf = library.paths.len() as u32;
                        library.map.insert(selector, buf, channels);
                        debug!(%selector, buf, channels, "sample loaded");
                    }
                    Err(err) => warn!(path = %path.display(), "skipping sample: {err}"),
                }
            }
        }

        info!(root = %root.display(), samples = library.paths.len(), "Sample library scanned");
        Ok(library)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// File behind a buffer number
    pub fn path(&self, buf: u32) -> Option<&Path> {
        let index = (buf as usize).checked_sub(1)?;
        self.paths.get(index).map(PathBuf::as_path)
    }
}

impl SampleBank for SampleLibrary {
    fn bufnum(&self, selector: char, index: i64) -> u32 {
        self.map.bufnum(selector, index)
    }

    fn channels(&self, buf: u32) -> u16 {
        self.map.channels(buf)
    }
}
