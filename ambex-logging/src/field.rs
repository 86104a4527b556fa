use std::fmt::Write as _;

/// One CSV cell. Unset cells serialize to nothing.
///
/// Single-precision values keep their own variant so a diameter fed in as
/// `0.03f32` renders as `0.03` and not as its widened double expansion.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Float32(f32),
    Text(String),
}

impl Field {
    /// Appends the cell to a line under CSV rules: the decimal separator is
    /// always a point, text is quoted only when it contains a space or comma.
    pub(crate) fn render_into(&self, line: &mut String) {
        match self {
            Field::Empty => {}
            Field::Int(value) => {
                let _ = write!(line, "{value}");
            }
            Field::Float(value) => {
                let _ = write!(line, "{value}");
            }
            Field::Float32(value) => {
                let _ = write!(line, "{value}");
            }
            Field::Text(value) => {
                if value.contains(' ') || value.contains(',') {
                    line.push('"');
                    line.push_str(value);
                    line.push('"');
                } else {
                    line.push_str(value);
                }
            }
        }
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Int(value as i64)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Field::Int(value as i64)
    }
}

impl From<f32> for Field {
    fn from(value: f32) -> Self {
        Field::Float32(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Float(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Text(String::from(if value { "True" } else { "False" }))
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_owned())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}
