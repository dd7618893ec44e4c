use std::ops::Range;

/// The table of contents no longer looks the way the parser expects.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("TOC page {index} does not exist ({count} pages)")]
    TocPageMissing { index: usize, count: usize },
    #[error("No TOC line contains {0:?}")]
    HeadingNotFound(String),
    #[error("Expected at least two chapter entries after {marker:?}, found {found}")]
    TooFewEntries { marker: String, found: usize },
    #[error("Chapter entry {0:?} does not end in a page number")]
    BadPageNumber(String),
}

/// Page index range of the instruction chapter, read off the TOC text.
///
/// Entries are the non-blank lines after the first line containing `marker`.
/// The range starts at the first entry's page and ends (exclusive) at the
/// second-to-last entry's page, both shifted by `offset`.
pub fn locate(toc_text: &str, marker: &str, offset: usize) -> Result<Range<usize>, StructureError> {
    let lines: Vec<&str> = toc_text.lines().collect();
    let heading = lines
        .iter()
        .position(|l| l.contains(marker))
        .ok_or_else(|| StructureError::HeadingNotFound(marker.to_string()))?;

    let entries: Vec<&str> = lines[heading + 1..]
        .iter()
        .copied()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if entries.len() < 2 {
        return Err(StructureError::TooFewEntries {
            marker: marker.to_string(),
            found: entries.len(),
        });
    }

    let start = page_number(entries[0])? + offset;
    let end = page_number(entries[entries.len() - 2])? + offset;
    Ok(start..end)
}

/// Last `.`-delimited token of a TOC entry ("2.1. SOP2 ...... 37" -> 37).
fn page_number(entry: &str) -> Result<usize, StructureError> {
    entry
        .rsplit('.')
        .next()
        .and_then(|tok| tok.trim().parse().ok())
        .ok_or_else(|| StructureError::BadPageNumber(entry.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOC: &str = "\
Table of Contents
1. Introduction ........ 1
12. Instructions
12.1. SOP2 Instructions ........ 233

12.2. SOPK Instructions ........ 248
12.3. SOP1 Instructions ........ 252
13. Microcode Formats ........ 498
";

    #[test]
    fn range_from_first_and_second_to_last_entry() {
        assert_eq!(locate(TOC, "Instructions", 8).unwrap(), 241..260);
    }

    #[test]
    fn zero_offset() {
        assert_eq!(locate(TOC, "Instructions", 0).unwrap(), 233..252);
    }

    #[test]
    fn first_matching_line_wins() {
        // "SOP2 Instructions" also matches, but only after the chapter heading.
        let r = locate(TOC, "Instructions", 0).unwrap();
        assert_eq!(r.start, 233);
    }

    #[test]
    fn missing_heading() {
        let err = locate("Contents\n1. Intro ... 3\n", "Instructions", 8).unwrap_err();
        assert!(matches!(err, StructureError::HeadingNotFound(m) if m == "Instructions"));
    }

    #[test]
    fn single_entry_is_not_enough() {
        let err = locate("Instructions\n\n  \n1. Only ..... 4\n", "Instructions", 0).unwrap_err();
        assert!(matches!(err, StructureError::TooFewEntries { found: 1, .. }));
    }

    #[test]
    fn entry_without_page_number() {
        let err = locate("Instructions\nSOP2 ..... 12\nAppendix\nEnd ... 9\n", "Instructions", 0)
            .unwrap_err();
        assert!(matches!(err, StructureError::BadPageNumber(e) if e == "Appendix"));
    }

    #[test]
    fn page_number_is_trimmed() {
        assert_eq!(page_number("3.2. Scalar ALU ....  77  ").unwrap(), 77);
    }
}
