//! Per-source property storage
//!
//! A source owns one `PropertySet`. Entries are only ever appended, so the
//! index a property handle maps to stays valid for the source's lifetime.

use crate::error::{Error, Result};
use crate::registry::Handle;

use super::kind::{Limits, PropertyKind, PropertySpec};

/// Cached state of one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub handle: Handle,
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

impl Property {
    pub(crate) fn from_spec(handle: Handle, spec: PropertySpec) -> Self {
        Self {
            handle,
            name: spec.name,
            kind: spec.kind,
            min: spec.min,
            max: spec.max,
            step: spec.step,
            default: spec.default,
            value: spec.value,
            string_value: spec.string_value,
            choices: spec.choices,
        }
    }

    pub(crate) fn limits(&self) -> Limits {
        Limits::of(self.kind, self.min, self.max, self.step, &self.choices)
    }

    fn wrong_type(&self) -> Error {
        Error::WrongPropertyType {
            name: self.name.clone(),
            kind: self.kind.as_str(),
        }
    }

    pub(crate) fn require_numeric(&self) -> Result<()> {
        if self.kind.is_numeric() {
            Ok(())
        } else {
            Err(self.wrong_type())
        }
    }

    pub(crate) fn require_kind(&self, kind: PropertyKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(self.wrong_type())
        }
    }

    /// Validate an integer write without applying it
    pub(crate) fn check_int(&self, value: i32) -> Result<()> {
        self.require_numeric()?;
        self.limits().check(value)
    }

    pub(crate) fn set_int(&mut self, value: i32) -> Result<()> {
        self.check_int(value)?;
        self.value = value;
        Ok(())
    }

    pub(crate) fn set_string(&mut self, value: &str) -> Result<()> {
        self.require_kind(PropertyKind::String)?;
        self.string_value.clear();
        self.string_value.push_str(value);
        Ok(())
    }

    /// Replace the choice list; a selection past the new end is clamped to
    /// the last choice
    pub(crate) fn set_choices(&mut self, choices: Vec<String>) -> Result<()> {
        self.require_kind(PropertyKind::Enum)?;
        self.choices = choices;
        self.value = self.value.min(self.max()).max(self.min());
        Ok(())
    }

    pub fn min(&self) -> i32 {
        self.limits().min
    }

    pub fn max(&self) -> i32 {
        self.limits().max
    }

    pub fn step(&self) -> i32 {
        self.limits().step
    }

    /// String form carried in events: the text of a string property, the
    /// selected choice of an enum property, empty otherwise
    pub fn value_str(&self) -> String {
        match self.kind {
            PropertyKind::String => self.string_value.clone(),
            PropertyKind::Enum => usize::try_from(self.value)
                .ok()
                .and_then(|i| self.choices.get(i))
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PropertySet {
    props: Vec<Property>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|p| p.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&Property> {
        self.props.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Property> {
        self.props.get_mut(index)
    }

    /// Index the next pushed property will occupy
    pub(crate) fn next_index(&self) -> usize {
        self.props.len()
    }

    pub(crate) fn push(&mut self, property: Property) -> usize {
        self.props.push(property);
        self.props.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.props.iter()
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.props.iter().map(|p| p.handle).collect()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandleKind;

    fn handle(index: usize) -> Handle {
        Handle::new(HandleKind::Property, 0, index)
    }

    #[test]
    fn test_set_int_rejects_out_of_range() {
        let mut prop = Property::from_spec(handle(0), PropertySpec::integer("exposure", 1, 100, 1, 50, 50));

        assert!(matches!(
            prop.set_int(101),
            Err(Error::ValueOutOfRange { value: 101, min: 1, max: 100 })
        ));
        assert_eq!(prop.value, 50);

        prop.set_int(100).unwrap();
        assert_eq!(prop.value, 100);
    }

    #[test]
    fn test_string_property_rejects_int_access() {
        let mut prop = Property::from_spec(handle(0), PropertySpec::string("url", "http://cam"));

        assert!(matches!(
            prop.set_int(1),
            Err(Error::WrongPropertyType { .. })
        ));
        prop.set_string("http://other").unwrap();
        assert_eq!(prop.value_str(), "http://other");
    }

    #[test]
    fn test_enum_value_str_and_choices() {
        let choices = vec!["auto".to_string(), "manual".to_string()];
        let mut prop = Property::from_spec(
            handle(0),
            PropertySpec::enumerated("white_balance", choices, 0, 1),
        );

        assert_eq!(prop.value_str(), "manual");
        assert_eq!(prop.max(), 1);

        prop.set_choices(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(prop.max(), 2);
        prop.set_int(2).unwrap();
        assert_eq!(prop.value_str(), "c");
    }

    #[test]
    fn test_shrinking_choices_clamps_selection() {
        let choices = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut prop = Property::from_spec(handle(0), PropertySpec::enumerated("mode", choices, 0, 2));

        prop.set_choices(vec!["a".into()]).unwrap();
        assert_eq!(prop.max(), 0);
        assert_eq!(prop.value, 0);
        assert!(prop.check_int(prop.value).is_ok());
        assert_eq!(prop.value_str(), "a");
    }

    #[test]
    fn test_set_choices_on_integer_fails() {
        let mut prop = Property::from_spec(handle(0), PropertySpec::integer("gain", 0, 10, 1, 0, 0));
        assert!(prop.set_choices(vec!["x".into()]).is_err());
    }

    #[test]
    fn test_set_indices_are_stable() {
        let mut set = PropertySet::new();
        let a = set.push(Property::from_spec(handle(0), PropertySpec::boolean("a", false, false)));
        let b = set.push(Property::from_spec(handle(1), PropertySpec::boolean("b", true, true)));

        assert_eq!((a, b), (0, 1));
        assert_eq!(set.find("b").unwrap().handle, handle(1));
        assert_eq!(set.get(a).unwrap().name, "a");
        assert_eq!(set.handles(), vec![handle(0), handle(1)]);
        assert_eq!(set.next_index(), 2);
    }
}
