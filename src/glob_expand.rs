//! Pathname expansion (spec.md §4.E step 7): `*`, `?`, `[...]` over fields
//! that originated from unquoted text. Grounded on the teacher's
//! `expander::expand_globs`, which already wraps the `glob` crate with the
//! "no match -> keep literal" fallback this spec also wants.

pub fn contains_glob_chars(s: &str) -> bool {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Expand one field as a glob pattern. Per spec.md §4.E step 7, a pattern
/// with no matches is kept literal (no `nullglob` option is modeled).
pub fn expand(pattern: &str) -> Vec<String> {
    if !contains_glob_chars(pattern) {
        return vec![pattern.to_string()];
    }

    match glob::glob(pattern) {
        Ok(paths) => {
            let mut matches: Vec<String> = paths
                .filter_map(|entry| entry.ok())
                .map(|path| path.to_string_lossy().into_owned())
                .collect();
            if matches.is_empty() {
                vec![pattern.to_string()]
            } else {
                matches.sort();
                matches
            }
        }
        Err(_) => vec![pattern.to_string()],
    }
}

/// Glob-style pattern match used by `case` arms and `${name#pattern}`
/// family expansions: `*`, `?`, `[...]` without filesystem access.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(text))
        .unwrap_or(pattern == text)
}

/// Length of the shortest (or longest) prefix of `text` matched by
/// `pattern`, used by `${name#pattern}` / `${name##pattern}`.
pub fn matching_prefix_len(pattern: &str, text: &str, longest: bool) -> Option<usize> {
    let indices: Vec<usize> = text.char_indices().map(|(i, _)| i).chain([text.len()]).collect();
    let range: Box<dyn Iterator<Item = &usize>> = if longest {
        Box::new(indices.iter().rev())
    } else {
        Box::new(indices.iter())
    };
    for &end in range {
        if end == 0 {
            if pattern.is_empty() {
                return Some(0);
            }
            continue;
        }
        if pattern_matches(pattern, &text[..end]) {
            return Some(end);
        }
    }
    None
}

/// Length of the shortest (or longest) suffix of `text` matched by
/// `pattern`, used by `${name%pattern}` / `${name%%pattern}`.
pub fn matching_suffix_len(pattern: &str, text: &str, longest: bool) -> Option<usize> {
    let indices: Vec<usize> = text.char_indices().map(|(i, _)| i).chain([text.len()]).collect();
    let range: Box<dyn Iterator<Item = &usize>> = if longest {
        Box::new(indices.iter())
    } else {
        Box::new(indices.iter().rev())
    };
    for &start in range {
        if pattern_matches(pattern, &text[start..]) {
            return Some(text.len() - start);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_keeps_literal() {
        assert_eq!(expand("*.definitely_not_a_real_ext_xyz"), vec!["*.definitely_not_a_real_ext_xyz"]);
    }

    #[test]
    fn detects_glob_chars() {
        assert!(contains_glob_chars("a*b"));
        assert!(!contains_glob_chars("a\\*b"));
    }

    #[test]
    fn prefix_and_suffix_matching() {
        assert_eq!(matching_prefix_len("a*", "abcabc", false), Some(1));
        assert_eq!(matching_prefix_len("a*", "abcabc", true), Some(6));
        assert_eq!(matching_suffix_len("*c", "abcabc", false), Some(1));
        assert_eq!(matching_suffix_len("*c", "abcabc", true), Some(6));
    }
}
