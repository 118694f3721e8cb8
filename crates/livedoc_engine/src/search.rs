/* 📖 # Why three passes instead of a relevance score?

Search runs over the project tree on every query, without an index, and ranks in
three strict tiers:

1. **Filename**: every query word appears in the file name
2. **Title**: every query word appears in the first `# ` heading
3. **Content**: every query word appears somewhere in the body

A file appears at most once, in the first tier it qualifies for, and the result
list stops growing at the limit. A scored ranking would let a long page that
mentions a word thirty times outrank the page actually named after it. Tiers
keep the order explainable: if you typed the file name, that file comes first.

Each file is read at most once per query; the title and content passes share
the loaded text. Files that cannot be read are skipped.
*/

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use livedoc_base::{FilePath, Pal};

use crate::scanner::scan;

/// Result cap used when the caller does not supply one.
pub const DEFAULT_LIMIT: usize = 15;

/// Characters of context kept before the first match in a snippet.
const SNIPPET_BEFORE: usize = 50;
/// Characters of context kept after the start of the first match.
const SNIPPET_AFTER: usize = 80;
const ELLIPSIS: &str = "...";

static TITLE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(\S.*?)[ \t\r]*$").ok());

/// Which tier a result was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Filename,
    Title,
    Content,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: MatchKind,
    /// Path relative to the project root.
    #[serde(serialize_with = "serialize_path")]
    pub path: FilePath,
    /// Heading or file stem shown to the user.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// 1-based line of the first content match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

fn serialize_path<S: serde::Serializer>(path: &FilePath, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(path.as_str())
}

/// Extract the text of the first level-1 heading.
pub fn extract_title(content: &str) -> Option<&str> {
    let pattern = TITLE_PATTERN.as_ref()?;
    pattern
        .captures(content)
        .and_then(|captures| captures.get(1))
        .map(|title| title.as_str())
}

/// Search the Markdown files under `root` for `query`.
///
/// Returns at most `limit` results, filename matches first, then title
/// matches, then content matches. A blank query returns nothing without
/// touching the filesystem.
pub fn search(pal: &dyn Pal, root: &Path, query: &str, limit: usize) -> Vec<SearchResult> {
    let words = QueryWords::parse(query);
    if words.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Candidate> = scan(pal, root, &FilePath::from(""), true)
        .files()
        .map(Candidate::new)
        .collect();
    debug!(root = %root.display(), query, files = candidates.len(), "Searching project");

    let mut results = Vec::new();

    for candidate in &mut candidates {
        if results.len() >= limit {
            return results;
        }
        let file_name = candidate.path.file_name().unwrap_or_default().to_lowercase();
        if !words.all_in(&file_name) || candidate.content(pal, root).is_none() {
            continue;
        }
        candidate.matched = true;
        results.push(SearchResult {
            kind: MatchKind::Filename,
            path: candidate.path.clone(),
            name: candidate.stem(),
            snippet: None,
            line: None,
        });
    }

    for candidate in candidates.iter_mut().filter(|candidate| !candidate.matched) {
        if results.len() >= limit {
            return results;
        }
        let Some(title) = candidate.content(pal, root).and_then(extract_title) else {
            continue;
        };
        if !words.all_in(&title.to_lowercase()) {
            continue;
        }
        let name = title.to_string();
        candidate.matched = true;
        results.push(SearchResult {
            kind: MatchKind::Title,
            path: candidate.path.clone(),
            name,
            snippet: None,
            line: None,
        });
    }

    for candidate in candidates.iter_mut().filter(|candidate| !candidate.matched) {
        if results.len() >= limit {
            return results;
        }
        let path = candidate.path.clone();
        let stem = candidate.stem();
        let Some(content) = candidate.content(pal, root) else {
            continue;
        };
        let Some(hit) = ContentHit::find(content, &words) else {
            continue;
        };
        results.push(SearchResult {
            kind: MatchKind::Content,
            path,
            name: extract_title(content).map(str::to_string).unwrap_or(stem),
            snippet: Some(hit.snippet),
            line: Some(hit.line),
        });
    }

    results
}

/// Lowercased, whitespace-separated query words.
struct QueryWords(Vec<String>);

impl QueryWords {
    fn parse(query: &str) -> Self {
        Self(query.split_whitespace().map(str::to_lowercase).collect())
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn all_in(&self, lowercase_text: &str) -> bool {
        self.0.iter().all(|word| lowercase_text.contains(word.as_str()))
    }
}

enum Loaded {
    NotYet,
    Text(String),
    Unreadable,
}

struct Candidate {
    path: FilePath,
    loaded: Loaded,
    matched: bool,
}

impl Candidate {
    fn new(path: FilePath) -> Self {
        Self {
            path,
            loaded: Loaded::NotYet,
            matched: false,
        }
    }

    fn stem(&self) -> String {
        self.path.file_stem().unwrap_or_default().to_string()
    }

    /// File text, read on first use.
    fn content(&mut self, pal: &dyn Pal, root: &Path) -> Option<&str> {
        if let Loaded::NotYet = self.loaded {
            self.loaded = match pal.read_file_to_string(&self.path.to_path(root)) {
                Ok(text) => Loaded::Text(text),
                Err(error) => {
                    debug!(path = %self.path, %error, "Skipping unreadable file");
                    Loaded::Unreadable
                }
            };
        }
        match &self.loaded {
            Loaded::Text(text) => Some(text),
            Loaded::NotYet | Loaded::Unreadable => None,
        }
    }
}

struct ContentHit {
    snippet: String,
    line: usize,
}

impl ContentHit {
    fn find(content: &str, words: &QueryWords) -> Option<Self> {
        let folded = FoldedText::new(content);
        if !words.all_in(&folded.lowercase) {
            return None;
        }
        let first_offset = words
            .0
            .iter()
            .filter_map(|word| folded.lowercase.find(word.as_str()))
            .min()?;
        let match_char = folded.original_char_index(first_offset);

        let chars: Vec<char> = content.chars().collect();
        let start = match_char.saturating_sub(SNIPPET_BEFORE);
        let end = (match_char + SNIPPET_AFTER).min(chars.len());
        let window: String = chars[start..end].iter().collect();

        let mut snippet = window.split_whitespace().collect::<Vec<_>>().join(" ");
        if start > 0 {
            snippet.insert_str(0, ELLIPSIS);
        }
        if end < chars.len() {
            snippet.push_str(ELLIPSIS);
        }

        let line = chars[..match_char].iter().filter(|&&c| c == '\n').count() + 1;
        Some(Self { snippet, line })
    }
}

/// Lowercased text that remembers where each original character landed.
///
/// Lowercasing can change the length of a character (`İ` becomes two chars),
/// so offsets found in the lowercase text are mapped back through `starts`.
struct FoldedText {
    lowercase: String,
    /// Byte offset in `lowercase` at which each original character begins.
    starts: Vec<usize>,
}

impl FoldedText {
    fn new(text: &str) -> Self {
        let mut lowercase = String::with_capacity(text.len());
        let mut starts = Vec::with_capacity(text.len());
        for c in text.chars() {
            starts.push(lowercase.len());
            lowercase.extend(c.to_lowercase());
        }
        Self { lowercase, starts }
    }

    fn original_char_index(&self, lowercase_offset: usize) -> usize {
        self.starts
            .partition_point(|&start| start <= lowercase_offset)
            .saturating_sub(1)
    }
}
