//! Pure per-line field extraction.
//!
//! A [`LineProcessor`] is configured once with a delimiter, a set of
//! 1-based field selectors and a suppress flag, and then maps one input
//! line to one output line (or to nothing, when suppression applies).
//! It holds no I/O and no mutable state, so the same processor can be
//! shared freely across concurrent task pullers.

use std::io::{BufRead, Write};
use thiserror::Error;

/// Errors from field-spec parsing and line processing.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("delimiter is empty")]
    EmptyDelimiter,

    #[error("fields list is empty")]
    EmptyFields,

    #[error("field index must be >= 1, got {0}")]
    InvalidFieldIndex(i32),

    #[error("invalid field token: {0:?}")]
    InvalidFieldToken(String),

    #[error("invalid range {0:?}: start > end")]
    InvalidRange(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a textual field spec like `"1,3-5,7"` into a sorted,
/// deduplicated list of 1-based field indices.
///
/// Comma-separated tokens are either single indices or inclusive
/// ranges. Malformed tokens and inverted ranges (`5-1`) are rejected.
pub fn parse_fields(spec: &str) -> Result<Vec<i32>, ProcessorError> {
    if spec.is_empty() {
        return Err(ProcessorError::EmptyFields);
    }

    let mut fields = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        if let Some((start, end)) = token.split_once('-') {
            let start: i32 = start
                .trim()
                .parse()
                .map_err(|_| ProcessorError::InvalidFieldToken(token.to_string()))?;
            let end: i32 = end
                .trim()
                .parse()
                .map_err(|_| ProcessorError::InvalidFieldToken(token.to_string()))?;
            if start > end {
                return Err(ProcessorError::InvalidRange(token.to_string()));
            }
            fields.extend(start..=end);
        } else {
            let field: i32 = token
                .parse()
                .map_err(|_| ProcessorError::InvalidFieldToken(token.to_string()))?;
            fields.push(field);
        }
    }

    fields.sort_unstable();
    fields.dedup();
    Ok(fields)
}

/// Stateless `cut`-style line transform.
#[derive(Debug, Clone)]
pub struct LineProcessor {
    delimiter: String,
    fields: Vec<i32>,
    suppress_no_delimiter: bool,
}

impl LineProcessor {
    /// Create a processor. The field list is sorted and deduplicated;
    /// an empty delimiter or an empty field list is a configuration
    /// error.
    pub fn new(
        delimiter: &str,
        mut fields: Vec<i32>,
        suppress_no_delimiter: bool,
    ) -> Result<Self, ProcessorError> {
        if delimiter.is_empty() {
            return Err(ProcessorError::EmptyDelimiter);
        }
        if fields.is_empty() {
            return Err(ProcessorError::EmptyFields);
        }

        fields.sort_unstable();
        fields.dedup();

        Ok(Self {
            delimiter: delimiter.to_string(),
            fields,
            suppress_no_delimiter,
        })
    }

    /// Transform a single line.
    ///
    /// Returns `Ok(None)` when the line contains no delimiter and
    /// suppression is enabled. Field indices past the end of the line
    /// are silently skipped; an index below 1 is an error.
    pub fn process_line(&self, line: &str) -> Result<Option<String>, ProcessorError> {
        let parts: Vec<&str> = line.split(&self.delimiter).collect();

        if parts.len() == 1 && self.suppress_no_delimiter {
            return Ok(None);
        }

        let mut kept = Vec::new();
        for &field in &self.fields {
            if field < 1 {
                return Err(ProcessorError::InvalidFieldIndex(field));
            }
            if let Some(part) = parts.get(field as usize - 1) {
                kept.push(*part);
            }
        }

        Ok(Some(kept.join(&self.delimiter)))
    }

    /// Apply [`Self::process_line`] to every line of `reader`, writing
    /// one output line per non-suppressed input line.
    ///
    /// This is the strict, single-process mode: the first per-line
    /// error aborts the stream and propagates to the caller. The
    /// distributed worker deliberately relaxes this to skip-and-log.
    pub fn process_stream<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> Result<(), ProcessorError> {
        for line in reader.lines() {
            let line = line?;
            if let Some(output) = self.process_line(&line)? {
                writeln!(writer, "{output}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_singles_and_ranges() {
        assert_eq!(parse_fields("1,3-5,7").unwrap(), vec![1, 3, 4, 5, 7]);
        assert_eq!(parse_fields("2").unwrap(), vec![2]);
        assert_eq!(parse_fields(" 1 , 2 ").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_parse_fields_sorts_and_dedups() {
        assert_eq!(parse_fields("5,1,3,1,3-4").unwrap(), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_parse_fields_rejects_empty_spec() {
        assert!(matches!(parse_fields(""), Err(ProcessorError::EmptyFields)));
    }

    #[test]
    fn test_parse_fields_rejects_inverted_range() {
        assert!(matches!(
            parse_fields("5-1"),
            Err(ProcessorError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_parse_fields_rejects_malformed_tokens() {
        assert!(parse_fields("a").is_err());
        assert!(parse_fields("1,x-3").is_err());
        assert!(parse_fields("1,,3").is_err());
    }

    #[test]
    fn test_new_rejects_empty_config() {
        assert!(matches!(
            LineProcessor::new("", vec![1], false),
            Err(ProcessorError::EmptyDelimiter)
        ));
        assert!(matches!(
            LineProcessor::new(",", vec![], false),
            Err(ProcessorError::EmptyFields)
        ));
    }

    #[test]
    fn test_process_line_basic() {
        let p = LineProcessor::new(",", vec![1, 3], false).unwrap();
        assert_eq!(p.process_line("a,b,c").unwrap().as_deref(), Some("a,c"));
    }

    #[test]
    fn test_process_line_preserves_field_order() {
        // Constructor sorts selectors, so output order follows line order.
        let p = LineProcessor::new(",", vec![3, 1], false).unwrap();
        assert_eq!(
            p.process_line("a,b,c,d").unwrap().as_deref(),
            Some("a,c")
        );
    }

    #[test]
    fn test_process_line_skips_out_of_range_fields() {
        let p = LineProcessor::new(",", vec![1, 9], false).unwrap();
        assert_eq!(p.process_line("a,b").unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_process_line_no_delimiter_suppressed() {
        let p = LineProcessor::new(",", vec![1], true).unwrap();
        assert_eq!(p.process_line("no-delimiter-here").unwrap(), None);
    }

    #[test]
    fn test_process_line_no_delimiter_kept_when_not_suppressing() {
        let p = LineProcessor::new(",", vec![1], false).unwrap();
        assert_eq!(
            p.process_line("plain").unwrap().as_deref(),
            Some("plain")
        );
    }

    #[test]
    fn test_process_line_invalid_field_index() {
        let p = LineProcessor::new(",", vec![0, 2], false).unwrap();
        assert!(matches!(
            p.process_line("a,b"),
            Err(ProcessorError::InvalidFieldIndex(0))
        ));
    }

    #[test]
    fn test_process_line_multichar_delimiter() {
        let p = LineProcessor::new("::", vec![2], false).unwrap();
        assert_eq!(p.process_line("a::b::c").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_process_stream_writes_one_line_per_input_line() {
        let p = LineProcessor::new(",", vec![1, 3], false).unwrap();
        let input = "a,b,c\n1,2,3\n";
        let mut out = Vec::new();
        p.process_stream(input.as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,c\n1,3\n");
    }

    #[test]
    fn test_process_stream_omits_suppressed_lines() {
        let p = LineProcessor::new(",", vec![1], true).unwrap();
        let input = "a,b\nnodelim\nc,d\n";
        let mut out = Vec::new();
        p.process_stream(input.as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\nc\n");
    }

    #[test]
    fn test_process_stream_keeps_empty_lines() {
        // An empty line splits into one empty part; without suppression
        // it is still written.
        let p = LineProcessor::new(",", vec![1], false).unwrap();
        let input = "a,b\n\nc,d\n";
        let mut out = Vec::new();
        p.process_stream(input.as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\n\nc\n");
    }

    #[test]
    fn test_process_stream_aborts_on_first_error() {
        let p = LineProcessor::new(",", vec![0], false).unwrap();
        let input = "a,b\nc,d\n";
        let mut out = Vec::new();
        assert!(p.process_stream(input.as_bytes(), &mut out).is_err());
        assert!(out.is_empty());
    }
}
