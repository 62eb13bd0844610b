// Keep the first few non-noise lines of a region as the address block
pub const DEFAULT_MAX_LINES: usize = 6;

#[derive(Debug, Clone)]
pub struct LineSelector {
    denylist: Vec<String>,
    max_lines: usize,
}

impl LineSelector {
    pub fn new<S: AsRef<str>>(denylist: &[S], max_lines: usize) -> Self {
        Self {
            denylist: denylist.iter().map(|t| t.as_ref().to_uppercase()).collect(),
            max_lines,
        }
    }

    fn is_noise(&self, line: &str) -> bool {
        let upper = line.to_uppercase();
        self.denylist.iter().any(|term| upper.contains(term.as_str()))
    }

    /// Recorder boilerplate is dropped, order is kept, at most `max_lines` survive.
    pub fn select(&self, text_block: &str) -> String {
        text_block
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter(|l| !self.is_noise(l))
            .take(self.max_lines)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
