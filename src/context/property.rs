//! Property operations
//!
//! A property handle resolves to its owning source and slot; reads and writes
//! then go through the source's state lock.

use crate::error::Result;
use crate::property::{Property, PropertyKind};
use crate::registry::Handle;

use super::{fill, Context};

impl Context {
    fn read_property<R>(&self, handle: Handle, f: impl FnOnce(&Property) -> Result<R>) -> Result<R> {
        let target = self.registry.property(handle)?;
        target.source.with_property(handle, target.index, f)
    }

    fn read_numeric(&self, handle: Handle, f: impl FnOnce(&Property) -> i32) -> Result<i32> {
        self.read_property(handle, |p| {
            p.require_numeric()?;
            Ok(f(p))
        })
    }

    pub fn get_property_kind(&self, property: Handle) -> Result<PropertyKind> {
        self.read_property(property, |p| Ok(p.kind))
    }

    pub fn get_property_name(&self, property: Handle) -> Result<String> {
        self.read_property(property, |p| Ok(p.name.clone()))
    }

    pub fn get_property_name_into<'a>(
        &self,
        property: Handle,
        buf: &'a mut String,
    ) -> Result<&'a str> {
        self.read_property(property, |p| {
            fill(buf, &p.name);
            Ok(())
        })?;
        Ok(buf.as_str())
    }

    /// Integer value of a boolean, integer or enum property
    pub fn get_property(&self, property: Handle) -> Result<i32> {
        self.read_numeric(property, |p| p.value)
    }

    /// Write an integer value
    ///
    /// Out-of-range or misaligned values are rejected and leave the property
    /// unchanged. A successful write fires value-updated even when the value
    /// is unchanged, and is forwarded to the capture device if there is one.
    pub fn set_property(&self, property: Handle, value: i32) -> Result<()> {
        let target = self.registry.property(property)?;
        target
            .source
            .set_property(property, target.index, value, self.registry.notifier())
    }

    pub fn get_property_min(&self, property: Handle) -> Result<i32> {
        self.read_numeric(property, Property::min)
    }

    pub fn get_property_max(&self, property: Handle) -> Result<i32> {
        self.read_numeric(property, Property::max)
    }

    pub fn get_property_step(&self, property: Handle) -> Result<i32> {
        self.read_numeric(property, Property::step)
    }

    pub fn get_property_default(&self, property: Handle) -> Result<i32> {
        self.read_numeric(property, |p| p.default)
    }

    pub fn get_string_property(&self, property: Handle) -> Result<String> {
        self.read_property(property, |p| {
            p.require_kind(PropertyKind::String)?;
            Ok(p.string_value.clone())
        })
    }

    pub fn get_string_property_into<'a>(
        &self,
        property: Handle,
        buf: &'a mut String,
    ) -> Result<&'a str> {
        self.read_property(property, |p| {
            p.require_kind(PropertyKind::String)?;
            fill(buf, &p.string_value);
            Ok(())
        })?;
        Ok(buf.as_str())
    }

    pub fn set_string_property(&self, property: Handle, value: &str) -> Result<()> {
        let target = self.registry.property(property)?;
        target
            .source
            .set_string_property(property, target.index, value, self.registry.notifier())
    }

    pub fn get_enum_property_choices(&self, property: Handle) -> Result<Vec<String>> {
        self.read_property(property, |p| {
            p.require_kind(PropertyKind::Enum)?;
            Ok(p.choices.clone())
        })
    }
}
