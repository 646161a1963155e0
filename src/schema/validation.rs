//! Value validators attached to schema attributes.

use serde_json::Value;

/// Constraint checked against a configured value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Validator {
    /// Integer within an inclusive range.
    IntBetween(i64, i64),
    /// Decimal string whose integer value lies within an inclusive range.
    IntStringBetween(i64, i64),
    /// String whose length in characters lies within an inclusive range.
    StringLenBetween(usize, usize),
    /// Integer TCP/UDP port number (1-65535).
    IsPortNumber,
    /// String equal to one of the listed values.
    OneOf(&'static [&'static str]),
}

impl Validator {
    /// Checks `value`, returning a message describing the violation.
    ///
    /// # Errors
    ///
    /// Returns the violation message when the value does not satisfy the
    /// constraint or has the wrong JSON type.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match *self {
            Self::IntBetween(min, max) => {
                let number = value
                    .as_i64()
                    .ok_or_else(|| String::from("expected an integer"))?;
                if (min..=max).contains(&number) {
                    Ok(())
                } else {
                    Err(format!("expected to be in the range ({min} - {max}), got {number}"))
                }
            }
            Self::IntStringBetween(min, max) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| String::from("expected a string"))?;
                match text.trim().parse::<i64>() {
                    Ok(number) if (min..=max).contains(&number) => Ok(()),
                    _ => Err(format!("must be between {min} and {max} inclusive, got {text:?}")),
                }
            }
            Self::StringLenBetween(min, max) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| String::from("expected a string"))?;
                let length = text.chars().count();
                if (min..=max).contains(&length) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected length to be in the range ({min} - {max}), got {length}"
                    ))
                }
            }
            Self::IsPortNumber => match value.as_i64() {
                Some(port) if (1..=65_535).contains(&port) => Ok(()),
                Some(port) => Err(format!("expected a valid port number, got {port}")),
                None => Err(String::from("expected an integer port number")),
            },
            Self::OneOf(allowed) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| String::from("expected a string"))?;
                if allowed.contains(&text) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected to be one of [{}], got {text}",
                        allowed.join(", ")
                    ))
                }
            }
        }
    }
}
