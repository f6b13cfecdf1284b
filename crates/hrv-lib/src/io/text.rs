use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Parse a whitespace/comma separated series, ignoring blank and `#` comment lines.
pub fn parse_series<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
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
            let val = token
                .parse()
                .with_context(|| format!("line {} is not {}: {}", idx + 1, what, token))?;
            out.push(val);
        }
    }
    Ok(out)
}

/// Parse a floating point sample series. An empty series is an error.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let out = parse_series(text, "a number")?;
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    parse_f64_series(&read_text(Some(path))?)
}

/// Parse sample indices. An empty list is allowed (no beats).
pub fn parse_event_indices(text: &str) -> Result<Vec<usize>> {
    parse_series(text, "an integer index")
}

/// Read a whole file, or stdin when `path` is `None` or `-`.
pub fn read_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// One value per line.
pub fn format_series<T: std::fmt::Display>(values: &[T]) -> String {
    let mut out = String::new();
    for v in values {
        out.push_str(&v.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_commas_and_comments() {
        let text = "# lead II\n0.5\n\n1.0, -2.5\n3e-1 4\n";
        assert_eq!(parse_f64_series(text).unwrap(), vec![0.5, 1.0, -2.5, 0.3, 4.0]);
    }

    #[test]
    fn empty_sample_series_is_rejected() {
        assert!(parse_f64_series("# nothing\n\n").is_err());
    }

    #[test]
    fn bad_token_reports_line_number() {
        let err = parse_f64_series("1.0\nabc\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn event_indices_may_be_empty() {
        assert!(parse_event_indices("").unwrap().is_empty());
        assert_eq!(parse_event_indices("0\n250\n").unwrap(), vec![0, 250]);
        assert!(parse_event_indices("-1\n").is_err());
        assert!(parse_event_indices("2.5\n").is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, format_series(&[1.5, 2.0])).unwrap();
        assert_eq!(read_f64_series(&path).unwrap(), vec![1.5, 2.0]);
        assert!(read_f64_series(&dir.path().join("missing.txt")).is_err());
    }
}
