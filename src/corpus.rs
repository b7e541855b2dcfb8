//! Idiom discovery and example sampling.
//!
//! An examples folder holds one `<IDIOM>.txt` file per idiom, one sentence
//! per line, where every occurrence of the idiom has already been replaced
//! by its single-token form (e.g. `BITE*THE*BULLET`).

use crate::error::{EmbedError, Result};
use crate::utils;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Idioms need at least this many lines to get a vector.
pub const MIN_CONTEXT_LINES: usize = 2;

/// An idiom left out of the example set because its file had too few lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedIdiom {
    pub idiom: String,
    pub line_count: usize,
}

/// Result of [`sample_examples`].
#[derive(Debug, Default)]
pub struct SampledExamples {
    /// idiom -> sampled, normalized sentences
    pub examples: BTreeMap<String, Vec<String>>,
    pub skipped: Vec<SkippedIdiom>,
}

impl SampledExamples {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Lists the idioms in `examples_folder`: one per regular file, named by
/// the file name up to its first `.`.
pub fn discover_idioms<P: AsRef<Path>>(examples_folder: P) -> Result<BTreeSet<String>> {
    let dir = examples_folder.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| EmbedError::io(dir, e))?;

    let mut idioms = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| EmbedError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| EmbedError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name
            .to_str()
            .ok_or_else(|| EmbedError::InvalidFileName(entry.path()))?;
        let idiom = name.split('.').next().unwrap_or(name);
        idioms.insert(idiom.to_string());
    }

    Ok(idioms)
}

/// Normalizes one example line.
///
/// With `lower` set the line is lower-cased and `/` becomes a space, after
/// which the idiom is restored to its original casing. Whitespace is always
/// collapsed and trimmed.
pub fn normalize_line(line: &str, idiom: &str, lower: bool) -> String {
    if lower {
        let lowered = line.to_lowercase().replace('/', " ");
        let restored = lowered.replace(&idiom.to_lowercase(), idiom);
        utils::collapse_whitespace(&restored)
    } else {
        utils::collapse_whitespace(line)
    }
}

/// Reads and normalizes every line of `<examples_folder>/<idiom>.txt`.
///
/// Blank lines are kept and count toward [`MIN_CONTEXT_LINES`].
pub fn load_contexts<P: AsRef<Path>>(
    examples_folder: P,
    idiom: &str,
    lower: bool,
) -> Result<Vec<String>> {
    let path = examples_folder.as_ref().join(format!("{}.txt", idiom));
    let content = fs::read_to_string(&path).map_err(|e| EmbedError::io(&path, e))?;

    Ok(content
        .lines()
        .map(|line| normalize_line(line, idiom, lower))
        .collect())
}

/// Samples up to `n` example sentences for every idiom.
///
/// Idioms with fewer than [`MIN_CONTEXT_LINES`] lines are logged and
/// reported in [`SampledExamples::skipped`] instead of getting an entry.
pub fn sample_examples<'a, I, P, R>(
    idioms: I,
    examples_folder: P,
    n: usize,
    lower: bool,
    rng: &mut R,
) -> Result<SampledExamples>
where
    I: IntoIterator<Item = &'a String>,
    P: AsRef<Path>,
    R: Rng + ?Sized,
{
    let folder = examples_folder.as_ref();
    let mut sampled = SampledExamples::default();

    for idiom in idioms {
        let lines = load_contexts(folder, idiom, lower)?;
        if lines.len() < MIN_CONTEXT_LINES {
            log::warn!("{} has less than {} context lines", idiom, MIN_CONTEXT_LINES);
            sampled.skipped.push(SkippedIdiom {
                idiom: idiom.clone(),
                line_count: lines.len(),
            });
            continue;
        }

        let k = n.min(lines.len());
        let chosen: Vec<String> = lines.choose_multiple(rng, k).cloned().collect();
        sampled.examples.insert(idiom.clone(), chosen);
    }

    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    const BULLET: &str = "BITE*THE*BULLET";

    fn write_idiom(dir: &Path, idiom: &str, lines: &[&str]) {
        fs::write(dir.join(format!("{}.txt", idiom)), lines.join("\n")).unwrap();
    }

    #[test]
    fn test_discover_idioms_strips_extension_and_skips_dirs() {
        let tmp = tempdir().expect("create temp dir");
        write_idiom(tmp.path(), BULLET, &["a", "b"]);
        write_idiom(tmp.path(), "SPILL*THE*BEANS", &["a"]);
        fs::create_dir(tmp.path().join("nested")).unwrap();

        let idioms = discover_idioms(tmp.path()).unwrap();
        let idioms: Vec<_> = idioms.into_iter().collect();
        assert_eq!(idioms, vec![BULLET.to_string(), "SPILL*THE*BEANS".to_string()]);
    }

    #[test]
    fn test_discover_idioms_missing_folder() {
        let tmp = tempdir().expect("create temp dir");
        let err = discover_idioms(tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, EmbedError::Io { .. }));
    }

    #[test]
    fn test_normalize_line_keeps_idiom_casing() {
        let line = "  She had to   BITE*THE*BULLET and/or Finish  ";
        assert_eq!(
            normalize_line(line, BULLET, true),
            "she had to BITE*THE*BULLET and or finish"
        );
        assert_eq!(
            normalize_line(line, BULLET, false),
            "She had to BITE*THE*BULLET and/or Finish"
        );
    }

    #[test]
    fn test_normalize_line_restores_lowercase_occurrences() {
        let line = "they bite*the*bullet, then BITE*THE*BULLET again";
        assert_eq!(
            normalize_line(line, BULLET, true),
            "they BITE*THE*BULLET, then BITE*THE*BULLET again"
        );
    }

    #[test]
    fn test_bite_the_bullet_scenario() {
        let tmp = tempdir().expect("create temp dir");
        let source = [
            "She had to BITE*THE*BULLET and finish",
            "He will BITE*THE*BULLET eventually",
            "No other escape but to BITE*THE*BULLET",
        ];
        write_idiom(tmp.path(), BULLET, &source);

        let idioms = discover_idioms(tmp.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = sample_examples(&idioms, tmp.path(), 2, true, &mut rng).unwrap();

        assert!(sampled.skipped.is_empty());
        let lines = &sampled.examples[BULLET];
        assert_eq!(lines.len(), 2);

        let expected: Vec<String> = source
            .iter()
            .map(|s| s.to_lowercase().replace(&BULLET.to_lowercase(), BULLET))
            .collect();
        for line in lines {
            assert!(expected.contains(line), "unexpected line {:?}", line);
            assert!(line.contains(BULLET));
            let rest = line.replace(BULLET, "");
            assert_eq!(rest, rest.to_lowercase());
            assert_eq!(line.trim(), line);
            assert!(!line.contains("  "));
        }
        assert_ne!(lines[0], lines[1]);
    }

    #[test]
    fn test_single_line_idiom_is_skipped() {
        let tmp = tempdir().expect("create temp dir");
        write_idiom(tmp.path(), "LONE*IDIOM", &["only LONE*IDIOM here"]);
        write_idiom(tmp.path(), BULLET, &["one BITE*THE*BULLET", "two BITE*THE*BULLET"]);

        let idioms = discover_idioms(tmp.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sample_examples(&idioms, tmp.path(), 5, true, &mut rng).unwrap();

        assert!(!sampled.examples.contains_key("LONE*IDIOM"));
        assert!(sampled.examples.contains_key(BULLET));
        assert_eq!(
            sampled.skipped,
            vec![SkippedIdiom {
                idiom: "LONE*IDIOM".to_string(),
                line_count: 1,
            }]
        );
    }

    #[test]
    fn test_blank_lines_count_toward_minimum() {
        let tmp = tempdir().expect("create temp dir");
        fs::write(tmp.path().join("ODD*ONE.txt"), "ODD*ONE out\n\n").unwrap();

        let idioms = discover_idioms(tmp.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let sampled = sample_examples(&idioms, tmp.path(), 5, true, &mut rng).unwrap();

        assert!(sampled.skipped.is_empty());
        let mut lines = sampled.examples["ODD*ONE"].clone();
        lines.sort();
        assert_eq!(lines, vec!["".to_string(), "ODD*ONE out".to_string()]);
    }

    #[test]
    fn test_whitespace_only_lines_normalize_to_empty() {
        let tmp = tempdir().expect("create temp dir");
        write_idiom(tmp.path(), "ODD*ONE", &["ODD*ONE out", "   \t "]);

        let contexts = load_contexts(tmp.path(), "ODD*ONE", true).unwrap();
        assert_eq!(contexts, vec!["ODD*ONE out".to_string(), String::new()]);
    }

    #[test]
    fn test_sample_size_is_capped_by_available_lines() {
        let tmp = tempdir().expect("create temp dir");
        let many: Vec<String> = (0..20).map(|i| format!("line {} BITE*THE*BULLET", i)).collect();
        let many_refs: Vec<&str> = many.iter().map(String::as_str).collect();
        write_idiom(tmp.path(), BULLET, &many_refs);
        write_idiom(tmp.path(), "FEW*LINES", &["a FEW*LINES", "b FEW*LINES", "c FEW*LINES"]);

        let idioms = discover_idioms(tmp.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let sampled = sample_examples(&idioms, tmp.path(), 5, true, &mut rng).unwrap();

        assert_eq!(sampled.examples[BULLET].len(), 5);
        assert_eq!(sampled.examples["FEW*LINES"].len(), 3);
        for line in &sampled.examples[BULLET] {
            assert!(many.iter().any(|m| m.to_lowercase().replace("bite*the*bullet", BULLET) == *line));
            assert!(!line.contains("FEW*LINES"));
        }
        let unique: BTreeSet<_> = sampled.examples[BULLET].iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_missing_idiom_file_is_fatal() {
        let tmp = tempdir().expect("create temp dir");
        let idioms: BTreeSet<String> = ["GHOST*IDIOM".to_string()].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(0);
        let err = sample_examples(&idioms, tmp.path(), 2, true, &mut rng).unwrap_err();
        assert!(matches!(err, EmbedError::Io { .. }));
    }
}
