use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::errors::{FqFilterError, Result};

/// Adapters longer than this are skipped when loading a list.
pub const MAX_ADAPTER_LEN: usize = 32;

const ALPHABET_SIZE: usize = 5;

#[inline]
fn base_index(b: u8) -> Option<usize> {
    match b {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        b'N' => Some(4),
        _ => None,
    }
}

/// De-duplicated adapter sequences in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSet {
    adapters: Vec<String>,
}

impl AdapterSet {
    /// Loads one adapter per line. Blank lines are ignored, bases are
    /// upper-cased, and adapters over [`MAX_ADAPTER_LEN`] are skipped.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FqFilterError::io(path, e))?;
        Self::parse(text.lines(), path)
    }

    pub fn from_sequences<I, S>(sequences: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse(sequences, Path::new("<adapters>"))
    }

    fn parse<I, S>(lines: I, path: &Path) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut adapters = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0usize;

        for (idx, raw) in lines.into_iter().enumerate() {
            let adapter = raw.as_ref().trim().to_ascii_uppercase();
            if adapter.is_empty() {
                continue;
            }
            if let Some(bad) = adapter.bytes().find(|&b| base_index(b).is_none()) {
                return Err(FqFilterError::InvalidAdapter {
                    path: PathBuf::from(path),
                    line: idx + 1,
                    reason: format!("unexpected character '{}'", bad as char),
                });
            }
            if adapter.len() > MAX_ADAPTER_LEN {
                warn!(
                    "Skipping adapter at {}:{} ({} bp exceeds the {MAX_ADAPTER_LEN} bp limit)",
                    path.display(),
                    idx + 1,
                    adapter.len()
                );
                skipped += 1;
                continue;
            }
            if seen.insert(adapter.clone()) {
                adapters.push(adapter);
            }
        }

        debug!("Parsed {} adapters from {} ({skipped} skipped)", adapters.len(), path.display());
        Ok(Self { adapters })
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.adapters.iter().map(String::as_str)
    }
}

#[derive(Debug)]
struct TrieNode {
    children: [Option<Box<TrieNode>>; ALPHABET_SIZE],
    terminal: bool,
    /// Bases from this node to the nearest adapter end below it.
    shortest: usize,
}

impl TrieNode {
    fn new() -> Self {
        Self { children: Default::default(), terminal: false, shortest: usize::MAX }
    }
}

/// Prefix trie over an [`AdapterSet`] for exact substring search.
///
/// Built once and only read afterwards, so a single instance is shared by
/// all worker threads.
#[derive(Debug)]
pub struct AdapterTrie {
    root: TrieNode,
    adapters: usize,
    nodes: usize,
}

impl AdapterTrie {
    pub fn new(set: &AdapterSet) -> Self {
        let mut trie = Self { root: TrieNode::new(), adapters: set.len(), nodes: 1 };
        for adapter in set.iter() {
            trie.insert(adapter.as_bytes());
        }
        trie
    }

    fn insert(&mut self, adapter: &[u8]) {
        let mut created = 0;
        let mut node = &mut self.root;
        node.shortest = node.shortest.min(adapter.len());
        for (depth, &b) in adapter.iter().enumerate() {
            // AdapterSet only admits bases with an index.
            let Some(idx) = base_index(b) else { return };
            let child = node.children[idx].get_or_insert_with(|| {
                created += 1;
                Box::new(TrieNode::new())
            });
            child.shortest = child.shortest.min(adapter.len() - depth - 1);
            node = child.as_mut();
        }
        node.terminal = true;
        self.nodes += created;
    }

    pub fn is_empty(&self) -> bool {
        self.adapters == 0
    }

    /// Number of adapters the trie was built from.
    pub fn adapter_count(&self) -> usize {
        self.adapters
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// True when any adapter occurs in `seq` as an exact substring.
    pub fn contains_adapter(&self, seq: &[u8]) -> bool {
        self.find_adapter(seq).is_some()
    }

    /// First match as `(offset, length)`: lowest offset, then shortest adapter.
    pub fn find_adapter(&self, seq: &[u8]) -> Option<(usize, usize)> {
        for start in 0..seq.len() {
            if seq.len() - start < self.root.shortest {
                break;
            }
            if let Some(len) = self.match_prefix(&seq[start..]) {
                return Some((start, len));
            }
        }
        None
    }

    /// Length of the shortest adapter that is a prefix of `text`.
    fn match_prefix(&self, text: &[u8]) -> Option<usize> {
        let mut node = &self.root;
        for (depth, &b) in text.iter().enumerate() {
            if text.len() - depth < node.shortest {
                return None;
            }
            node = node.children[base_index(b)?].as_deref()?;
            if node.terminal {
                return Some(depth + 1);
            }
        }
        None
    }
}
