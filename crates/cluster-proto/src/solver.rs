use std::fmt;

/// A parsed solver file: an ordered list of patterns and a search depth.
///
/// `total_combinations = patterns.len() ^ depth`, per the grammar in
/// `pattern <token>` / `depth <n>` lines; unrecognized lines are ignored.
/// Mirrors the ground-truth `reset()`: `depth` defaults to `1` when no
/// `depth` line appears, and an empty pattern list is tolerated (yielding
/// `total_combinations = 0`) rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solver {
    pub text: String,
    pub patterns: Vec<String>,
    pub depth: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("invalid depth value {0:?}")]
    InvalidDepth(String),
}

impl Solver {
    /// Parse a solver file's text. Leading whitespace on each line is
    /// stripped before matching a directive; everything else is ignored.
    pub fn parse(text: &str) -> Result<Self, SolverError> {
        let mut patterns = Vec::new();
        let mut depth: u32 = 1;

        for line in text.lines() {
            let line = line.trim_start();
            if let Some(token) = line.strip_prefix("pattern ") {
                patterns.push(token.trim().to_string());
            } else if let Some(n) = line.strip_prefix("depth ") {
                let n = n.trim();
                depth = n
                    .parse()
                    .map_err(|_| SolverError::InvalidDepth(n.to_string()))?;
            }
        }

        Ok(Solver {
            text: text.to_string(),
            patterns,
            depth,
        })
    }

    /// `|patterns|^depth`, saturating so a pathological solver file can't
    /// panic the coordinator on overflow.
    pub fn total_combinations(&self) -> u64 {
        (self.patterns.len() as u64).saturating_pow(self.depth)
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_patterns_and_depth() {
        let solver = Solver::parse("pattern a\npattern b\ndepth 2\n").unwrap();
        assert_eq!(solver.patterns, vec!["a", "b"]);
        assert_eq!(solver.depth, 2);
        assert_eq!(solver.total_combinations(), 4);
    }

    #[test]
    fn ignores_unknown_lines() {
        let solver = Solver::parse("# comment\npattern a\nfoo bar\ndepth 1\n").unwrap();
        assert_eq!(solver.patterns, vec!["a"]);
        assert_eq!(solver.depth, 1);
    }

    #[test]
    fn strips_leading_whitespace() {
        let solver = Solver::parse("  pattern a\n  depth 3\n").unwrap();
        assert_eq!(solver.patterns, vec!["a"]);
        assert_eq!(solver.depth, 3);
    }

    #[test]
    fn missing_depth_defaults_to_one() {
        let solver = Solver::parse("pattern a\n").unwrap();
        assert_eq!(solver.depth, 1);
        assert_eq!(solver.total_combinations(), 1);
    }

    #[test]
    fn missing_patterns_yields_zero_combinations() {
        let solver = Solver::parse("depth 2\n").unwrap();
        assert!(solver.patterns.is_empty());
        assert_eq!(solver.total_combinations(), 0);
    }

    #[test]
    fn invalid_depth_is_an_error() {
        assert!(matches!(
            Solver::parse("pattern a\ndepth nope\n"),
            Err(SolverError::InvalidDepth(_))
        ));
    }

    /// R2: parsing then re-emitting a solver file preserves the derived
    /// `(patterns, depth)`, since `Display` returns the original text
    /// verbatim and re-parsing it is a fixed point.
    #[test]
    fn round_trip_preserves_patterns_and_depth() {
        let original = "pattern x\npattern y\npattern z\ndepth 3\n";
        let first = Solver::parse(original).unwrap();
        let reparsed = Solver::parse(&first.to_string()).unwrap();
        assert_eq!(first.patterns, reparsed.patterns);
        assert_eq!(first.depth, reparsed.depth);
    }
}
