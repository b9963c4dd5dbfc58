//! Glob-style name patterns (`*`, `?`) compiled to anchored regular expressions.

use regex::Regex;

/// Translate one glob into a regex fragment. Everything except `*` and `?` is literal.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut literal = String::new();
    for c in glob.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}

/// Compile a list of globs into one anchored alternation. Empty entries are ignored;
/// returns None when nothing is left.
pub fn compile_globs(globs: &[String]) -> Option<Regex> {
    let parts: Vec<String> = globs
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(glob_to_regex)
        .collect();
    if parts.is_empty() {
        return None;
    }
    let pattern = format!("^(?:{})$", parts.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Invalid pattern list {:?} ({}). Value ignored.", globs, e);
            None
        }
    }
}

/// Inclusion/exclusion filter applied to file names. Exclusion wins; an inclusion list,
/// when present, must match.
#[derive(Clone, Debug, Default)]
pub struct ItemFilter {
    inclusion: Option<Regex>,
    exclusion: Option<Regex>,
}

impl ItemFilter {
    pub fn new(inclusion: &[String], exclusion: &[String]) -> Self {
        ItemFilter {
            inclusion: compile_globs(inclusion),
            exclusion: compile_globs(exclusion),
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        if let Some(ex) = &self.exclusion
            && ex.is_match(name)
        {
            return false;
        }
        match &self.inclusion {
            Some(inc) => inc.is_match(name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn glob_escapes_dots() {
        let re = compile_globs(&list(&["*.wav"])).unwrap();
        assert!(re.is_match("call.wav"));
        assert!(!re.is_match("callxwav"));
        assert!(!re.is_match("call.wav.tmp"));
    }

    #[test]
    fn question_mark_is_single_char() {
        let re = compile_globs(&list(&["rec?.xml"])).unwrap();
        assert!(re.is_match("rec1.xml"));
        assert!(!re.is_match("rec12.xml"));
    }

    #[test]
    fn empty_list_compiles_to_none() {
        assert!(compile_globs(&list(&["", "  "])).is_none());
    }

    #[test]
    fn exclusion_beats_inclusion() {
        let filter = ItemFilter::new(&list(&["*.wav"]), &list(&["tmp*"]));
        assert!(filter.accepts("a.wav"));
        assert!(!filter.accepts("tmp1.wav"));
        assert!(!filter.accepts("a.txt"));
    }

    #[test]
    fn no_lists_accepts_everything() {
        assert!(ItemFilter::default().accepts("anything"));
    }
}
