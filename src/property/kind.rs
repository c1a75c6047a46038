//! Property declarations

use crate::error::{Error, Result};

/// Property type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyKind {
    #[default]
    None = 0,
    Boolean = 1,
    Integer = 2,
    String = 4,
    Enum = 8,
}

impl PropertyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKind::None => "none",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Integer => "integer",
            PropertyKind::String => "string",
            PropertyKind::Enum => "enum",
        }
    }

    /// Whether the integer accessors apply
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PropertyKind::Boolean | PropertyKind::Integer | PropertyKind::Enum
        )
    }
}

/// Value written to a capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(i32),
    Str(String),
}

/// Declaration of a property, as passed to property creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub kind: PropertyKind,
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub default: i32,
    pub value: i32,
    pub string_value: String,
    pub choices: Vec<String>,
}

impl PropertySpec {
    pub fn boolean(name: impl Into<String>, default: bool, value: bool) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Boolean,
            min: 0,
            max: 1,
            step: 1,
            default: i32::from(default),
            value: i32::from(value),
            string_value: String::new(),
            choices: Vec::new(),
        }
    }

    pub fn integer(
        name: impl Into<String>,
        min: i32,
        max: i32,
        step: i32,
        default: i32,
        value: i32,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Integer,
            min,
            max,
            step,
            default,
            value,
            string_value: String::new(),
            choices: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::String,
            min: 0,
            max: 0,
            step: 0,
            default: 0,
            value: 0,
            string_value: value.into(),
            choices: Vec::new(),
        }
    }

    pub fn enumerated(name: impl Into<String>, choices: Vec<String>, default: i32, value: i32) -> Self {
        let max = (choices.len() as i32 - 1).max(0);
        Self {
            name: name.into(),
            kind: PropertyKind::Enum,
            min: 0,
            max,
            step: 1,
            default,
            value,
            string_value: String::new(),
            choices,
        }
    }

    /// Check the declaration is self-consistent
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::EmptyValue("property name"));
        }
        match self.kind {
            PropertyKind::None => Err(Error::InvalidParameter(format!(
                "property {} has no type",
                self.name
            ))),
            PropertyKind::String => Ok(()),
            PropertyKind::Boolean | PropertyKind::Enum | PropertyKind::Integer => {
                if self.min > self.max {
                    return Err(Error::InvalidParameter(format!(
                        "property {} min {} > max {}",
                        self.name, self.min, self.max
                    )));
                }
                if self.kind == PropertyKind::Integer && self.step <= 0 {
                    return Err(Error::InvalidParameter(format!(
                        "property {} step {} must be positive",
                        self.name, self.step
                    )));
                }
                let limits = Limits::of(self.kind, self.min, self.max, self.step, &self.choices);
                limits.check(self.default)?;
                limits.check(self.value)
            }
        }
    }
}

/// Numeric constraints of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Limits {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl Limits {
    pub(crate) fn of(kind: PropertyKind, min: i32, max: i32, step: i32, choices: &[String]) -> Self {
        match kind {
            PropertyKind::Boolean => Limits {
                min: 0,
                max: 1,
                step: 1,
            },
            PropertyKind::Enum if !choices.is_empty() => Limits {
                min: 0,
                max: choices.len() as i32 - 1,
                step: 1,
            },
            PropertyKind::Enum => Limits { min, max, step: 1 },
            _ => Limits { min, max, step },
        }
    }

    pub(crate) fn check(&self, value: i32) -> Result<()> {
        if value < self.min || value > self.max {
            return Err(Error::ValueOutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        if self.step > 1 && (i64::from(value) - i64::from(self.min)) % i64::from(self.step) != 0 {
            return Err(Error::ValueMisaligned {
                value,
                min: self.min,
                step: self.step,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_spec_validation() {
        assert!(PropertySpec::integer("gain", 0, 100, 5, 50, 10).validate().is_ok());

        let misaligned = PropertySpec::integer("gain", 0, 100, 5, 50, 12);
        assert!(matches!(
            misaligned.validate(),
            Err(Error::ValueMisaligned { value: 12, .. })
        ));

        let inverted = PropertySpec::integer("gain", 10, 0, 1, 5, 5);
        assert!(matches!(inverted.validate(), Err(Error::InvalidParameter(_))));

        let zero_step = PropertySpec::integer("gain", 0, 10, 0, 5, 5);
        assert!(matches!(zero_step.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let spec = PropertySpec::string("", "x");
        assert_eq!(spec.validate(), Err(Error::EmptyValue("property name")));
    }

    #[test]
    fn test_enum_limits_follow_choices() {
        let choices = vec!["auto".to_string(), "manual".to_string()];
        let limits = Limits::of(PropertyKind::Enum, 0, 0, 1, &choices);
        assert_eq!(limits, Limits { min: 0, max: 1, step: 1 });

        let spec = PropertySpec::enumerated("exposure_mode", choices, 0, 2);
        assert!(matches!(
            spec.validate(),
            Err(Error::ValueOutOfRange { value: 2, .. })
        ));
    }

    #[test]
    fn test_boolean_limits_ignore_declared_range() {
        let limits = Limits::of(PropertyKind::Boolean, -5, 5, 3, &[]);
        assert!(limits.check(1).is_ok());
        assert!(limits.check(2).is_err());
    }

    #[test]
    fn test_negative_range_alignment() {
        let limits = Limits {
            min: -10,
            max: 10,
            step: 5,
        };
        assert!(limits.check(-5).is_ok());
        assert!(limits.check(-4).is_err());
    }
}
