use std::fmt;

/// Terminal or in-flight state of one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    None,
    Pending,
    Success,
    Canceled,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::None => "none",
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Canceled => "canceled",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}
