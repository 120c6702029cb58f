use std::fmt;

/// Syntactic shape of one cron field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualification {
    Simple,
    Multi,
    Range,
    Step,
}

impl Qualification {
    /// Finds the first qualification character present in `expression` and
    /// returns the matching qualification, or `Simple` if none is present.
    pub(crate) fn detect(expression: &str) -> Qualification {
        for ch in expression.chars() {
            match ch {
                ',' => return Qualification::Multi,
                '-' => return Qualification::Range,
                '/' => return Qualification::Step,
                _ => {}
            }
        }
        Qualification::Simple
    }
}

impl fmt::Display for Qualification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Qualification::Simple => "simple",
            Qualification::Multi => "multi",
            Qualification::Range => "range",
            Qualification::Step => "step",
        };
        f.write_str(s)
    }
}
