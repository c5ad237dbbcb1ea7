use crate::signal::Sample;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

fn parse_series<T: FromStr>(text: &str, what: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for token in trimmed.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let val: T = token
                .parse()
                .with_context(|| format!("line {} is not {}: {}", idx + 1, what, token))?;
            out.push(val);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no {} values found", what);
    }
    Ok(out)
}

/// Parse raw ADC samples, one or more per line, ignoring blank/comment lines.
pub fn parse_sample_series(text: &str) -> Result<Vec<Sample>> {
    parse_series(text, "a 16-bit sample")
}

/// Read raw ADC samples from disk.
pub fn read_sample_series(path: &Path) -> Result<Vec<Sample>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_sample_series(&text)
}

/// Parse pulse-to-pulse intervals in milliseconds.
pub fn parse_ppi_series(text: &str) -> Result<Vec<i32>> {
    parse_series(text, "an interval in ms")
}

pub fn read_ppi_series(path: &Path) -> Result<Vec<i32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_ppi_series(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_lines_commas_and_comments() {
        let text = "# ppg capture\n31000\n31010, 31020\n\n31030 31040\n";
        assert_eq!(
            parse_sample_series(text).unwrap(),
            vec![31000, 31010, 31020, 31030, 31040]
        );
    }

    #[test]
    fn reports_the_offending_line() {
        let err = parse_ppi_series("800\n8x0\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(parse_sample_series("70000").is_err());
        assert!(parse_ppi_series("# nothing\n").is_err());
    }

    #[test]
    fn reads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"812\n790\n805\n").unwrap();
        assert_eq!(read_ppi_series(file.path()).unwrap(), vec![812, 790, 805]);
        assert!(read_ppi_series(Path::new("/nonexistent/ppi.txt")).is_err());
    }
}
