/// Split a script into its source lines.
///
/// Lines are split on `\n`; a trailing `\r` is dropped so CRLF scripts index
/// the same way. An empty script yields a single empty line, and a trailing
/// newline yields a trailing empty line.
pub fn lines_of(script: &str) -> Vec<String> {
    script
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// The immutable, 0-indexed lines of the script a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStore {
    lines: Vec<String>,
}

impl LineStore {
    pub fn new(script: &str) -> Self {
        Self {
            lines: lines_of(script),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false: even an empty script has one (empty) line.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + Clone {
        self.lines.iter().map(String::as_str)
    }
}
