/// The closed set of condition operators. Codes come from the condition
/// editor; anything outside 1..=9 drops the row instead of erroring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Regex,
    StartsWith,
    EndsWith,
    ContainsCi,
    Eq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl Operator {
    pub fn from_code(code: u8) -> Option<Operator> {
        match code {
            1 => Some(Operator::Regex),
            2 => Some(Operator::StartsWith),
            3 => Some(Operator::EndsWith),
            4 => Some(Operator::ContainsCi),
            5 => Some(Operator::Eq),
            6 => Some(Operator::Gt),
            7 => Some(Operator::Lt),
            8 => Some(Operator::GtEq),
            9 => Some(Operator::LtEq),
            _ => None,
        }
    }

    /// Renders the comparison against a single bound parameter `key`.
    pub fn render(&self, expr: &str, key: &str) -> String {
        match self {
            Operator::Regex => format!("match({expr}, %({key})s)"),
            Operator::StartsWith => format!("startsWith({expr}, %({key})s)"),
            Operator::EndsWith => format!("endsWith({expr}, %({key})s)"),
            Operator::ContainsCi => format!("positionCaseInsensitive({expr}, %({key})s) > 0"),
            Operator::Eq => format!("{expr} = %({key})s"),
            Operator::Gt => format!("{expr} > %({key})s"),
            Operator::Lt => format!("{expr} < %({key})s"),
            Operator::GtEq => format!("{expr} >= %({key})s"),
            Operator::LtEq => format!("{expr} <= %({key})s"),
        }
    }
}
