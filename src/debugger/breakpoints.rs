use std::collections::HashSet;

/// Line indices at which a session pauses before executing the line.
///
/// Indices are not checked against the script: a breakpoint past the last
/// line is accepted and simply never triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    points: HashSet<usize>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self {
            points: HashSet::new(),
        }
    }

    /// Flip the breakpoint on `line`. Returns whether it is now set.
    pub fn toggle(&mut self, line: usize) -> bool {
        let now_set = if self.points.remove(&line) {
            false
        } else {
            self.points.insert(line);
            true
        };
        tracing::debug!(line, now_set, "toggled breakpoint");
        now_set
    }

    pub fn contains(&self, line: usize) -> bool {
        self.points.contains(&line)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Set lines in ascending order.
    pub fn lines(&self) -> Vec<usize> {
        let mut lines: Vec<_> = self.points.iter().copied().collect();
        lines.sort_unstable();
        lines
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl FromIterator<usize> for BreakpointSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_reports_new_state() {
        let mut bps = BreakpointSet::new();
        assert!(bps.toggle(3));
        assert!(bps.contains(3));
        assert!(!bps.toggle(3));
        assert!(!bps.contains(3));
    }

    #[test]
    fn toggling_twice_restores_the_original_set() {
        let original: BreakpointSet = [1, 4].into_iter().collect();
        for line in [0, 1, 4, 9, usize::MAX] {
            let mut bps = original.clone();
            bps.toggle(line);
            bps.toggle(line);
            assert_eq!(bps, original, "line {line}");
        }
    }

    #[test]
    fn out_of_range_lines_are_accepted() {
        let mut bps = BreakpointSet::new();
        assert!(bps.toggle(10_000));
        assert_eq!(bps.lines(), vec![10_000]);
        bps.clear();
        assert!(bps.is_empty());
    }
}
