use crate::errors::{FqFilterError, Result};

/// Longest homopolymer window tested by default.
pub const DEFAULT_POLY_X_LEN: usize = 15;
/// Substitutions tolerated inside one window by default.
pub const DEFAULT_POLY_X_MISMATCHES: usize = 1;

/// Scan order for the run base; fixed so results are reproducible.
const BASES: [u8; 4] = *b"ACGT";

/// The first window that qualified as a homopolymer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyXRun {
    pub base: u8,
    pub start: usize,
    pub len: usize,
    pub mismatches: usize,
}

/// Flags sequences containing a near-homopolymer window.
///
/// Windows are tried by ascending length (`min_len..=max_len`), then base in
/// `A, C, G, T` order, then ascending start offset. A window qualifies when at
/// most `max_mismatches` of its positions differ from the base. The first
/// qualifying window ends the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyXDetector {
    min_len: usize,
    max_len: usize,
    max_mismatches: usize,
}

impl Default for PolyXDetector {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_POLY_X_LEN,
            max_len: DEFAULT_POLY_X_LEN,
            max_mismatches: DEFAULT_POLY_X_MISMATCHES,
        }
    }
}

impl PolyXDetector {
    pub fn new(min_len: usize, max_len: usize, max_mismatches: usize) -> Result<Self> {
        if min_len == 0 {
            return Err(FqFilterError::invalid_parameter("poly_x_min_len", "must be >= 1"));
        }
        if min_len > max_len {
            return Err(FqFilterError::invalid_parameter(
                "poly_x_min_len",
                format!("{min_len} is greater than poly_x_len {max_len}"),
            ));
        }
        Ok(Self { min_len, max_len, max_mismatches })
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn max_mismatches(&self) -> usize {
        self.max_mismatches
    }

    pub fn is_contaminated(&self, seq: &[u8]) -> bool {
        self.find(seq).is_some()
    }

    pub fn find(&self, seq: &[u8]) -> Option<PolyXRun> {
        // Lengths the sequence cannot hold are skipped.
        let longest = self.max_len.min(seq.len());
        for len in self.min_len..=longest {
            for &base in &BASES {
                if let Some((start, mismatches)) =
                    first_window(seq, base, len, self.max_mismatches)
                {
                    return Some(PolyXRun { base, start, len, mismatches });
                }
            }
        }
        None
    }
}

/// Rolling mismatch count of a `len`-wide window against `base`.
fn first_window(
    seq: &[u8],
    base: u8,
    len: usize,
    max_mismatches: usize,
) -> Option<(usize, usize)> {
    debug_assert!(len >= 1 && len <= seq.len());
    let mut mismatches = seq[..len].iter().filter(|&&b| b != base).count();
    if mismatches <= max_mismatches {
        return Some((0, mismatches));
    }
    for start in 1..=seq.len() - len {
        if seq[start - 1] != base {
            mismatches -= 1;
        }
        if seq[start + len - 1] != base {
            mismatches += 1;
        }
        if mismatches <= max_mismatches {
            return Some((start, mismatches));
        }
    }
    None
}
