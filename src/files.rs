//! File discovery by shell-style name pattern (`*` and `?` wildcards).
//!
//! Only the file name is matched, never the directory part, so a pattern
//! like `Breitbandmessung_*.csv` cannot escape the directory it is applied to.

use std::io;
use std::path::{Path, PathBuf};

/// Returns `true` if `name` matches `pattern` in full.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    // Last `*` seen and the name position it was tried at, for backtracking.
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((star_pi, star_ni)) = star {
            pi = star_pi + 1;
            ni = star_ni + 1;
            star = Some((star_pi, star_ni + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Regular files directly inside `dir` whose names match `pattern`, sorted
/// by path so runs process files in a stable order.
pub fn find_matching(dir: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if matches_pattern(pattern, name) {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_wildcard_patterns() {
        assert!(matches_pattern("data.csv", "data.csv"));
        assert!(!matches_pattern("data.csv", "data.csv.bak"));
        assert!(matches_pattern("Breitbandmessung_*.csv", "Breitbandmessung_05_01_2024_10_15_30.csv"));
        assert!(!matches_pattern("Breitbandmessung_*.csv", "data.csv"));
        assert!(matches_pattern("*Mi_Temp_Humid_*.sh", "read_Mi_Temp_Humid_Kitchen.sh"));
        assert!(!matches_pattern("*Mi_Temp_Humid_*.sh", "read_Mi_Temp_Humid_Kitchen.py"));
        assert!(matches_pattern("sensor_?.sh", "sensor_1.sh"));
        assert!(!matches_pattern("sensor_?.sh", "sensor_12.sh"));
    }

    #[test]
    fn test_star_backtracks() {
        assert!(matches_pattern("*a*b", "xaxxab"));
        assert!(matches_pattern("**", ""));
        assert!(!matches_pattern("*a*b", "xaxxa"));
    }

    #[test]
    fn test_find_matching_ignores_directories_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Breitbandmessung_2.csv"), "").unwrap();
        std::fs::write(dir.path().join("Breitbandmessung_1.csv"), "").unwrap();
        std::fs::write(dir.path().join("data.csv"), "").unwrap();
        std::fs::create_dir(dir.path().join("Breitbandmessung_dir.csv")).unwrap();

        let found = find_matching(dir.path(), "Breitbandmessung_*.csv").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Breitbandmessung_1.csv", "Breitbandmessung_2.csv"]);
    }
}
