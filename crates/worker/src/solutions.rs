use std::path::Path;

/// Read `<working_dir>/<combination>/solution.cold` if present and split it
/// into solution strings: records are separated by a line containing only
/// `---`, each trimmed, and empty records dropped. A missing file just
/// means no solutions were found for this combination.
pub fn scrape(working_dir: &Path, combination: u64) -> Vec<String> {
    let path = working_dir.join(combination.to_string()).join("solution.cold");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    parse(&text)
}

fn parse(text: &str) -> Vec<String> {
    text.split("---")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_delimiter_and_drops_empties() {
        let text = "sol one\n---\n\n---\nsol two\n";
        assert_eq!(parse(text), vec!["sol one", "sol two"]);
    }

    #[test]
    fn no_delimiter_is_a_single_solution() {
        assert_eq!(parse("only one"), vec!["only one"]);
    }

    #[test]
    fn blank_input_has_no_solutions() {
        assert!(parse("").is_empty());
        assert!(parse("   \n  ").is_empty());
    }
}
