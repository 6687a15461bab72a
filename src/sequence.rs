use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ReelError, ReelResult};

/// Frame-number token styles recognized in an input pattern, in precedence
/// order: printf > dollar-letter > placeholder run > bare trailing numeral.
/// The first style that matches wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameToken {
    /// `render.%04d.exr`
    Printf { width: usize },
    /// `render.$F4.exr`
    DollarF { width: usize },
    /// `render.####.exr`
    Hashes { width: usize },
    /// `render.0001.exr` — the trailing run of digits varies.
    BareNumber { width: usize },
}

impl FrameToken {
    pub fn width(self) -> usize {
        match self {
            Self::Printf { width }
            | Self::DollarF { width }
            | Self::Hashes { width }
            | Self::BareNumber { width } => width,
        }
    }
}

/// A detected frame sequence: directory, the literal text around the frame
/// number, zero padding and the sorted unique frame numbers that exist on
/// disk. Immutable once detected.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    padding: usize,
    frame_numbers: Vec<i64>,
}

impl FrameSequence {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Sorted, unique, ascending.
    pub fn frame_numbers(&self) -> &[i64] {
        &self.frame_numbers
    }

    pub fn len(&self) -> usize {
        self.frame_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_numbers.is_empty()
    }

    pub fn file_name(&self, frame: i64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            frame,
            self.suffix,
            width = self.padding
        )
    }

    pub fn file_path(&self, frame: i64) -> PathBuf {
        self.dir.join(self.file_name(frame))
    }

    /// Whether `frame` has a backing file in the detected set.
    pub fn contains(&self, frame: i64) -> bool {
        self.frame_numbers.binary_search(&frame).is_ok()
    }
}

/// Locate the frame-number token in `file_name`, returning the token plus the
/// literal prefix/suffix around it.
fn locate_token(file_name: &str) -> Option<(FrameToken, String, String)> {
    // printf style: % digits d
    if let Some(pos) = file_name.find('%') {
        let rest = &file_name[pos + 1..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && rest[digits.len()..].starts_with('d') {
            let token_len = 1 + digits.len() + 1;
            return Some((
                FrameToken::Printf {
                    width: digits.parse().ok()?,
                },
                file_name[..pos].to_string(),
                file_name[pos + token_len..].to_string(),
            ));
        }
    }

    // dollar-letter style: $F digits
    if let Some(pos) = file_name.find("$F") {
        let rest = &file_name[pos + 2..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            let token_len = 2 + digits.len();
            return Some((
                FrameToken::DollarF {
                    width: digits.parse().ok()?,
                },
                file_name[..pos].to_string(),
                file_name[pos + token_len..].to_string(),
            ));
        }
    }

    // placeholder run: one or more '#'
    if let Some(pos) = file_name.find('#') {
        let width = file_name[pos..].chars().take_while(|c| *c == '#').count();
        return Some((
            FrameToken::Hashes { width },
            file_name[..pos].to_string(),
            file_name[pos + width..].to_string(),
        ));
    }

    // bare numeral: trailing run of digits in the stem
    let mut last_run: Option<(usize, usize)> = None;
    let bytes = file_name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            last_run = Some((start, i));
        } else {
            i += 1;
        }
    }
    let (start, end) = last_run?;
    Some((
        FrameToken::BareNumber { width: end - start },
        file_name[..start].to_string(),
        file_name[end..].to_string(),
    ))
}

/// Detect a frame sequence from a pattern string such as `shot/render.%04d.exr`,
/// `render.$F4.exr`, `render.####.exr` or `render.0001.exr`.
///
/// Repeated detection against an unchanged directory returns identical sorted
/// frame numbers.
pub fn detect_sequence(pattern: &str) -> ReelResult<FrameSequence> {
    let pattern_path = Path::new(pattern);
    let file_name = pattern_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReelError::detection(format!("pattern has no file name: {pattern}")))?;
    let dir = match pattern_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !dir.is_dir() {
        return Err(ReelError::detection(format!(
            "sequence directory does not exist: {}",
            dir.display()
        )));
    }

    let (token, prefix, suffix) = locate_token(file_name).ok_or_else(|| {
        ReelError::detection(format!(
            "no frame-number token (%0Nd, $FN, ####, or numeral) in pattern: {pattern}"
        ))
    })?;

    let mut frame_numbers = enumerate_frames(&dir, &prefix, &suffix)?;
    frame_numbers.sort_unstable();
    frame_numbers.dedup();

    if frame_numbers.is_empty() {
        return Err(ReelError::detection(format!(
            "no files matching pattern: {pattern}"
        )));
    }

    debug!(
        pattern,
        frames = frame_numbers.len(),
        first = frame_numbers[0],
        last = frame_numbers[frame_numbers.len() - 1],
        "detected sequence"
    );

    Ok(FrameSequence {
        dir,
        prefix,
        suffix,
        padding: token.width(),
        frame_numbers,
    })
}

fn enumerate_frames(dir: &Path, prefix: &str, suffix: &str) -> ReelResult<Vec<i64>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ReelError::detection(format!("cannot read directory {}: {e}", dir.display()))
    })?;

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            ReelError::detection(format!("cannot read directory {}: {e}", dir.display()))
        })?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let Some(digits) = rest.strip_suffix(suffix) else {
            continue;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(n) = digits.parse::<i64>() {
            frames.push(n);
        }
    }
    Ok(frames)
}

/// The contiguous range the orchestrator iterates, the subset of indices with
/// backing files, and the gap count. Missing indices are visited so the
/// freeze-frame step can fill them.
#[derive(Clone, Debug)]
pub struct ResolvedRange {
    pub start: i64,
    /// Inclusive.
    pub end: i64,
    /// Sorted ascending; subset of the iteration range with backing files.
    pub existing: Vec<i64>,
    pub gap_count: u64,
}

impl ResolvedRange {
    pub fn iter(&self) -> impl Iterator<Item = i64> + use<> {
        self.start..=self.end
    }

    pub fn len(&self) -> u64 {
        (self.end - self.start + 1) as u64
    }

    pub fn is_empty(&self) -> bool {
        false // construction guarantees at least one existing frame
    }
}

/// Intersect the detected frames with an optional explicit [start, end]
/// override (defaults to the detected min/max). Errors on an empty
/// intersection.
pub fn resolve_range(
    sequence: &FrameSequence,
    start_override: Option<i64>,
    end_override: Option<i64>,
) -> ReelResult<ResolvedRange> {
    let detected = sequence.frame_numbers();
    let start = start_override.unwrap_or(detected[0]);
    let end = end_override.unwrap_or(detected[detected.len() - 1]);

    let existing: Vec<i64> = detected
        .iter()
        .copied()
        .filter(|f| *f >= start && *f <= end)
        .collect();

    if existing.is_empty() {
        return Err(ReelError::detection(format!(
            "no frames found in range [{start}, {end}]"
        )));
    }

    let total = (end - start + 1) as u64;
    let gap_count = total - existing.len() as u64;
    Ok(ResolvedRange {
        start,
        end,
        existing,
        gap_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_precedence_is_fixed() {
        // printf wins over a bare numeral elsewhere in the name.
        let (t, pre, suf) = locate_token("shot3.%04d.exr").unwrap();
        assert_eq!(t, FrameToken::Printf { width: 4 });
        assert_eq!(pre, "shot3.");
        assert_eq!(suf, ".exr");

        let (t, ..) = locate_token("render.$F5.exr").unwrap();
        assert_eq!(t, FrameToken::DollarF { width: 5 });

        let (t, ..) = locate_token("render.###.exr").unwrap();
        assert_eq!(t, FrameToken::Hashes { width: 3 });

        // trailing numeral run wins over earlier ones
        let (t, pre, suf) = locate_token("v2_shot.0010.exr").unwrap();
        assert_eq!(t, FrameToken::BareNumber { width: 4 });
        assert_eq!(pre, "v2_shot.");
        assert_eq!(suf, ".exr");
    }

    #[test]
    fn token_absent_is_none() {
        assert!(locate_token("render.exr").is_none());
    }

    #[test]
    fn file_name_zero_pads() {
        let seq = FrameSequence {
            dir: PathBuf::from("."),
            prefix: "render.".into(),
            suffix: ".exr".into(),
            padding: 4,
            frame_numbers: vec![1, 2],
        };
        assert_eq!(seq.file_name(7), "render.0007.exr");
        assert_eq!(seq.file_name(12345), "render.12345.exr");
    }

    #[test]
    fn resolve_range_counts_gaps() {
        let seq = FrameSequence {
            dir: PathBuf::from("."),
            prefix: "f.".into(),
            suffix: ".exr".into(),
            padding: 4,
            frame_numbers: vec![1, 2, 3, 5],
        };
        let range = resolve_range(&seq, None, None).unwrap();
        assert_eq!((range.start, range.end), (1, 5));
        assert_eq!(range.existing, vec![1, 2, 3, 5]);
        assert_eq!(range.gap_count, 1);
        assert_eq!(range.len(), 5);
    }

    #[test]
    fn resolve_range_honors_override_and_rejects_empty() {
        let seq = FrameSequence {
            dir: PathBuf::from("."),
            prefix: "f.".into(),
            suffix: ".exr".into(),
            padding: 4,
            frame_numbers: vec![10, 11, 12],
        };
        let range = resolve_range(&seq, Some(11), Some(20)).unwrap();
        assert_eq!((range.start, range.end), (11, 20));
        assert_eq!(range.existing, vec![11, 12]);

        assert!(resolve_range(&seq, Some(100), Some(200)).is_err());
    }
}
