use std::fmt;

/// Index of a field within a canonicalized six-element cron expression
/// (second minute hour day month weekday), plus the optional year extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Weekday,
    Year,
}

impl Position {
    pub(crate) const ORDER: [Position; 7] = [
        Position::Second,
        Position::Minute,
        Position::Hour,
        Position::Day,
        Position::Month,
        Position::Weekday,
        Position::Year,
    ];

    pub(crate) fn at(index: usize) -> Position {
        Self::ORDER[index]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Position::Second => "second",
            Position::Minute => "minute",
            Position::Hour => "hour",
            Position::Day => "day",
            Position::Month => "month",
            Position::Weekday => "weekday",
            Position::Year => "year",
        };
        f.write_str(s)
    }
}
