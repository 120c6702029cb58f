use crate::error::ScheduleError;
use crate::schedule::position::Position;
use crate::schedule::qualification::Qualification;

const SECOND_MINUTE_STEPS: &[u32] = &[2, 3, 4, 5, 6, 10, 12, 15, 20, 30];
const HOUR_STEPS: &[u32] = &[2, 3, 4, 6, 8, 12];

/// One parsed field of a [`crate::schedule::Schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    expression: String,
    position: Position,
    qualification: Qualification,
    values: Values,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Values {
    /// The `*` wildcard: matches unconditionally, no values to parse.
    Wildcard,
    Simple(i64),
    Multi(Vec<i64>),
    Range(i64, i64),
    Step(i64),
}

impl Element {
    /// Parses and validates `expression` for `position`, returning a fully
    /// validated element or the first applicable [`ScheduleError`].
    pub(crate) fn parse(expression: &str, position: Position) -> Result<Element, ScheduleError> {
        if expression == "*" {
            return Ok(Element {
                expression: expression.to_owned(),
                position,
                qualification: Qualification::Simple,
                values: Values::Wildcard,
            });
        }

        let qualification = Qualification::detect(expression);
        validate_for_position(expression, position, qualification)?;
        let values = parse_values(expression, position, qualification)?;

        Ok(Element {
            expression: expression.to_owned(),
            position,
            qualification,
            values,
        })
    }

    pub(crate) fn position(&self) -> Position {
        self.position
    }

    /// Returns true when `input` (the relevant component of an instant, e.g.
    /// its second or its weekday) matches this field.
    pub(crate) fn is_due(&self, input: i64) -> bool {
        match &self.values {
            Values::Wildcard => true,
            Values::Simple(v) => input == *v,
            Values::Multi(vs) => vs.contains(&input),
            Values::Range(lo, hi) => input >= *lo && input <= *hi,
            Values::Step(n) => *n != 0 && input % *n == 0,
        }
    }
}

fn bounds_for(position: Position) -> (i64, i64) {
    match position {
        Position::Second | Position::Minute => (0, 59),
        Position::Hour => (0, 23),
        Position::Day => (1, 31),
        Position::Month => (1, 12),
        Position::Weekday => (0, 6),
        Position::Year => (0, i64::MAX),
    }
}

fn valid_steps_for(position: Position) -> Option<&'static [u32]> {
    match position {
        Position::Second | Position::Minute => Some(SECOND_MINUTE_STEPS),
        Position::Hour => Some(HOUR_STEPS),
        // Day/month/weekday have no step form in this grammar; year accepts any positive step.
        Position::Year => None,
        _ => Some(&[]),
    }
}

fn validate_for_position(
    expression: &str,
    position: Position,
    qualification: Qualification,
) -> Result<(), ScheduleError> {
    let (lo, hi) = bounds_for(position);
    let in_bounds = |v: i64| -> bool { v >= lo && v <= hi };
    let invalid = || ScheduleError::InvalidField(position);

    match qualification {
        Qualification::Simple => {
            let v: i64 = expression.parse().map_err(|_| invalid())?;
            if !in_bounds(v) {
                return Err(invalid());
            }
        }
        Qualification::Multi => {
            if position == Position::Year {
                return Err(invalid());
            }
            let mut any = false;
            for part in expression.split(',') {
                any = true;
                let v: i64 = part.parse().map_err(|_| invalid())?;
                if !in_bounds(v) {
                    return Err(invalid());
                }
            }
            if !any {
                return Err(invalid());
            }
        }
        Qualification::Range => {
            let mut parts = expression.splitn(2, '-');
            let (a, b) = match (parts.next(), parts.next()) {
                (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => (a, b),
                _ => return Err(invalid()),
            };
            let a: i64 = a.parse().map_err(|_| invalid())?;
            let b: i64 = b.parse().map_err(|_| invalid())?;
            if !in_bounds(a) || !in_bounds(b) {
                return Err(invalid());
            }
        }
        Qualification::Step => {
            let rest = expression.strip_prefix("*/").ok_or_else(invalid)?;
            let n: u32 = rest.parse().map_err(|_| invalid())?;
            match valid_steps_for(position) {
                Some(allowed) if position != Position::Year => {
                    if !allowed.contains(&n) {
                        return Err(invalid());
                    }
                }
                None if position == Position::Year => {
                    if n == 0 {
                        return Err(invalid());
                    }
                }
                _ => return Err(invalid()),
            }
        }
    }
    Ok(())
}

fn parse_values(
    expression: &str,
    position: Position,
    qualification: Qualification,
) -> Result<Values, ScheduleError> {
    match qualification {
        Qualification::Simple => {
            let v: i64 = expression
                .parse()
                .map_err(|_| ScheduleError::InvalidField(position))?;
            Ok(Values::Simple(v))
        }
        Qualification::Multi => {
            let mut values = Vec::new();
            for part in expression.split(',') {
                values.push(
                    part.parse::<i64>()
                        .map_err(|_| ScheduleError::InvalidField(position))?,
                );
            }
            if !values.windows(2).all(|w| w[0] <= w[1]) {
                return Err(ScheduleError::NonAscendingList(position));
            }
            Ok(Values::Multi(values))
        }
        Qualification::Range => {
            let mut parts = expression.splitn(2, '-');
            let a: i64 = parts
                .next()
                .unwrap()
                .parse()
                .map_err(|_| ScheduleError::InvalidField(position))?;
            let b: i64 = parts
                .next()
                .unwrap()
                .parse()
                .map_err(|_| ScheduleError::InvalidField(position))?;
            if a > b {
                return Err(ScheduleError::NonAscendingList(position));
            }
            Ok(Values::Range(a, b))
        }
        Qualification::Step => {
            let rest = expression.strip_prefix("*/").unwrap();
            let n: i64 = rest
                .parse()
                .map_err(|_| ScheduleError::InvalidField(position))?;
            Ok(Values::Step(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_always_due() {
        let e = Element::parse("*", Position::Second).unwrap();
        assert!(e.is_due(0));
        assert!(e.is_due(59));
    }

    #[test]
    fn simple_matches_equality() {
        let e = Element::parse("5", Position::Minute).unwrap();
        assert!(e.is_due(5));
        assert!(!e.is_due(6));
    }

    #[test]
    fn multi_matches_membership() {
        let e = Element::parse("1,2,3", Position::Hour).unwrap();
        assert!(e.is_due(2));
        assert!(!e.is_due(4));
    }

    #[test]
    fn multi_rejects_non_ascending() {
        let err = Element::parse("3,2,1", Position::Hour).unwrap_err();
        assert_eq!(err, ScheduleError::NonAscendingList(Position::Hour));
    }

    #[test]
    fn range_is_inclusive() {
        let e = Element::parse("10-12", Position::Hour).unwrap();
        assert!(e.is_due(10));
        assert!(e.is_due(11));
        assert!(e.is_due(12));
        assert!(!e.is_due(13));
    }

    #[test]
    fn range_rejects_descending() {
        let err = Element::parse("5-3", Position::Hour).unwrap_err();
        assert_eq!(err, ScheduleError::NonAscendingList(Position::Hour));
    }

    #[test]
    fn step_matches_divisibility() {
        let e = Element::parse("*/15", Position::Second).unwrap();
        assert!(e.is_due(0));
        assert!(e.is_due(30));
        assert!(!e.is_due(20));
    }

    #[test]
    fn step_rejects_unsupported_divisor() {
        assert!(Element::parse("*/7", Position::Second).is_err());
        assert!(Element::parse("*/5", Position::Hour).is_err());
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        assert!(Element::parse("60", Position::Second).is_err());
        assert!(Element::parse("24", Position::Hour).is_err());
        assert!(Element::parse("32", Position::Day).is_err());
        assert!(Element::parse("13", Position::Month).is_err());
        assert!(Element::parse("7", Position::Weekday).is_err());
    }
}
