// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for drover.
//!
//! This module defines the measurement model shared by the connection layer
//! and the polling engine: device identifiers, the four Modbus object
//! categories, measurement definitions, typed sample values, and the events
//! published after each poll cycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SampleTypeError};

// =============================================================================
// Identifiers
// =============================================================================

/// A unique identifier for a polled device.
///
/// Device IDs should be stable across restarts and unique within a scheduler.
///
/// # Examples
///
/// ```
/// use drover_core::types::DeviceId;
///
/// let id = DeviceId::new("plc-001");
/// assert_eq!(id.as_str(), "plc-001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device ID.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Measurement Categories
// =============================================================================

/// The four standard Modbus object categories.
///
/// Coils and discrete inputs carry booleans; holding and input registers
/// carry unsigned 16-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementCategory {
    /// Single-bit writable object (digital output).
    Coil,

    /// Single-bit read-only object (digital input).
    DiscreteInput,

    /// 16-bit read/write object (analog output / parameter).
    HoldingRegister,

    /// 16-bit read-only object (analog input).
    InputRegister,
}

impl MeasurementCategory {
    /// Returns the category name as used in transport tag strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use drover_core::types::MeasurementCategory;
    ///
    /// assert_eq!(MeasurementCategory::HoldingRegister.as_str(), "holding-register");
    /// assert_eq!(MeasurementCategory::Coil.as_str(), "coil");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementCategory::Coil => "coil",
            MeasurementCategory::DiscreteInput => "discrete-input",
            MeasurementCategory::HoldingRegister => "holding-register",
            MeasurementCategory::InputRegister => "input-register",
        }
    }

    /// Returns `true` if values of this category are booleans.
    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            MeasurementCategory::Coil | MeasurementCategory::DiscreteInput
        )
    }

    /// Returns `true` if values of this category are 16-bit registers.
    #[inline]
    pub fn is_register(&self) -> bool {
        !self.is_boolean()
    }

    /// Returns `true` if this category accepts writes.
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            MeasurementCategory::Coil | MeasurementCategory::HoldingRegister
        )
    }
}

impl fmt::Display for MeasurementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MeasurementCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coil" => Ok(MeasurementCategory::Coil),
            "discrete-input" => Ok(MeasurementCategory::DiscreteInput),
            "holding-register" => Ok(MeasurementCategory::HoldingRegister),
            "input-register" => Ok(MeasurementCategory::InputRegister),
            other => Err(ConfigError::invalid_address(
                other,
                "unknown measurement category",
            )),
        }
    }
}

// =============================================================================
// Measurement Definitions
// =============================================================================

/// Describes a Modbus data point that should be polled periodically.
///
/// A definition is immutable once constructed and covers the address range
/// `[address, address + count)` of one category.
///
/// # Examples
///
/// ```
/// use drover_core::types::MeasurementDefinition;
///
/// let def = MeasurementDefinition::holding_register_range("hr100", 100, 4).unwrap();
/// assert_eq!(def.address(), 100);
/// assert_eq!(def.count(), 4);
/// assert_eq!(def.end_exclusive(), 104);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementDefinition {
    id: String,
    category: MeasurementCategory,
    address: u16,
    count: u16,
}

impl MeasurementDefinition {
    /// Creates a new measurement definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `id` is blank, `count` is
    /// zero, or the range runs past the 16-bit address space.
    pub fn new(
        id: impl Into<String>,
        category: MeasurementCategory,
        address: u16,
        count: u16,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ConfigError::validation("id", "must not be blank"));
        }
        if count == 0 {
            return Err(ConfigError::validation("count", "must be >= 1"));
        }
        if u32::from(address) + u32::from(count) > 65_536 {
            return Err(ConfigError::validation(
                "count",
                "range runs past the end of the address space",
            ));
        }
        Ok(Self {
            id,
            category,
            address,
            count,
        })
    }

    /// Single coil at `address`.
    pub fn coil(id: impl Into<String>, address: u16) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::Coil, address, 1)
    }

    /// `count` coils starting at `address`.
    pub fn coil_range(id: impl Into<String>, address: u16, count: u16) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::Coil, address, count)
    }

    /// Single discrete input at `address`.
    pub fn discrete_input(id: impl Into<String>, address: u16) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::DiscreteInput, address, 1)
    }

    /// `count` discrete inputs starting at `address`.
    pub fn discrete_input_range(
        id: impl Into<String>,
        address: u16,
        count: u16,
    ) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::DiscreteInput, address, count)
    }

    /// Single holding register at `address`.
    pub fn holding_register(id: impl Into<String>, address: u16) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::HoldingRegister, address, 1)
    }

    /// `count` holding registers starting at `address`.
    pub fn holding_register_range(
        id: impl Into<String>,
        address: u16,
        count: u16,
    ) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::HoldingRegister, address, count)
    }

    /// Single input register at `address`.
    pub fn input_register(id: impl Into<String>, address: u16) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::InputRegister, address, 1)
    }

    /// `count` input registers starting at `address`.
    pub fn input_register_range(
        id: impl Into<String>,
        address: u16,
        count: u16,
    ) -> Result<Self, ConfigError> {
        Self::new(id, MeasurementCategory::InputRegister, address, count)
    }

    /// Returns the measurement ID, unique within a device.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the object category.
    #[inline]
    pub fn category(&self) -> MeasurementCategory {
        self.category
    }

    /// Returns the starting address.
    #[inline]
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Returns the number of elements covered.
    #[inline]
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Returns the exclusive end of the covered address range.
    #[inline]
    pub fn end_exclusive(&self) -> u32 {
        u32::from(self.address) + u32::from(self.count)
    }
}

impl fmt::Display for MeasurementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 1 {
            write!(f, "{} ({}:{})", self.id, self.category, self.address)
        } else {
            write!(
                f,
                "{} ({}:{}[{}])",
                self.id, self.category, self.address, self.count
            )
        }
    }
}

// =============================================================================
// Sample Values
// =============================================================================

/// A value captured for one measurement during a poll cycle.
///
/// The variant is fully determined by the definition: boolean categories
/// produce `Bool`/`Bools`, register categories produce `Word`/`Words`, and
/// the sequence variants appear exactly when `count > 1`.
///
/// # Examples
///
/// ```
/// use drover_core::types::SampleValue;
///
/// let value = SampleValue::Word(4660);
/// assert_eq!(value.as_word().unwrap(), 4660);
/// assert!(value.as_bool().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    /// Boolean scalar (`count == 1`, boolean category).
    Bool(bool),

    /// Boolean sequence of the definition's length (`count > 1`).
    Bools(Vec<bool>),

    /// Unsigned 16-bit scalar (`count == 1`, register category).
    Word(u16),

    /// Unsigned 16-bit sequence of the definition's length (`count > 1`).
    Words(Vec<u16>),
}

impl SampleValue {
    /// Returns the variant name for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            SampleValue::Bool(_) => "bool",
            SampleValue::Bools(_) => "bool sequence",
            SampleValue::Word(_) => "word",
            SampleValue::Words(_) => "word sequence",
        }
    }

    /// Returns `true` if this is a boolean scalar.
    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, SampleValue::Bool(_))
    }

    /// Returns `true` if this is a boolean sequence.
    #[inline]
    pub fn is_bools(&self) -> bool {
        matches!(self, SampleValue::Bools(_))
    }

    /// Returns `true` if this is a register scalar.
    #[inline]
    pub fn is_word(&self) -> bool {
        matches!(self, SampleValue::Word(_))
    }

    /// Returns `true` if this is a register sequence.
    #[inline]
    pub fn is_words(&self) -> bool {
        matches!(self, SampleValue::Words(_))
    }

    /// Returns the boolean scalar value.
    ///
    /// # Errors
    ///
    /// Returns [`SampleTypeError`] when the value is any other variant.
    pub fn as_bool(&self) -> Result<bool, SampleTypeError> {
        match self {
            SampleValue::Bool(v) => Ok(*v),
            other => Err(SampleTypeError::new("bool", other.variant_name())),
        }
    }

    /// Returns the boolean sequence.
    ///
    /// # Errors
    ///
    /// Returns [`SampleTypeError`] when the value is any other variant.
    pub fn as_bools(&self) -> Result<&[bool], SampleTypeError> {
        match self {
            SampleValue::Bools(v) => Ok(v),
            other => Err(SampleTypeError::new("bool sequence", other.variant_name())),
        }
    }

    /// Returns the register scalar value.
    ///
    /// # Errors
    ///
    /// Returns [`SampleTypeError`] when the value is any other variant.
    pub fn as_word(&self) -> Result<u16, SampleTypeError> {
        match self {
            SampleValue::Word(v) => Ok(*v),
            other => Err(SampleTypeError::new("word", other.variant_name())),
        }
    }

    /// Returns the register sequence.
    ///
    /// # Errors
    ///
    /// Returns [`SampleTypeError`] when the value is any other variant.
    pub fn as_words(&self) -> Result<&[u16], SampleTypeError> {
        match self {
            SampleValue::Words(v) => Ok(v),
            other => Err(SampleTypeError::new("word sequence", other.variant_name())),
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Bool(v) => write!(f, "{}", v),
            SampleValue::Bools(v) => write!(f, "[{} booleans]", v.len()),
            SampleValue::Word(v) => write!(f, "{}", v),
            SampleValue::Words(v) => write!(f, "[{} words]", v.len()),
        }
    }
}

impl From<bool> for SampleValue {
    fn from(v: bool) -> Self {
        SampleValue::Bool(v)
    }
}

impl From<Vec<bool>> for SampleValue {
    fn from(v: Vec<bool>) -> Self {
        SampleValue::Bools(v)
    }
}

impl From<u16> for SampleValue {
    fn from(v: u16) -> Self {
        SampleValue::Word(v)
    }
}

impl From<Vec<u16>> for SampleValue {
    fn from(v: Vec<u16>) -> Self {
        SampleValue::Words(v)
    }
}

// =============================================================================
// Measurement Samples
// =============================================================================

/// A single measurement captured from a device during a poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    definition: MeasurementDefinition,
    value: SampleValue,
}

impl MeasurementSample {
    /// Pairs a definition with the value read for it.
    pub fn new(definition: MeasurementDefinition, value: SampleValue) -> Self {
        Self { definition, value }
    }

    /// Returns the definition this sample was read for.
    #[inline]
    pub fn definition(&self) -> &MeasurementDefinition {
        &self.definition
    }

    /// Returns the captured value.
    #[inline]
    pub fn value(&self) -> &SampleValue {
        &self.value
    }

    /// Returns the measurement category.
    #[inline]
    pub fn category(&self) -> MeasurementCategory {
        self.definition.category()
    }
}

impl fmt::Display for MeasurementSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.definition.id(), self.value)
    }
}

// =============================================================================
// Measurement Events
// =============================================================================

/// Event published after a poll cycle completes.
///
/// Samples appear in the order the measurements were declared in the device's
/// polling configuration, not in batch order. The sample list is non-empty
/// for every event the scheduler publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEvent {
    device_id: DeviceId,
    timestamp: DateTime<Utc>,
    samples: Vec<MeasurementSample>,
}

impl MeasurementEvent {
    /// Creates a new event.
    pub fn new(
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
        samples: Vec<MeasurementSample>,
    ) -> Self {
        Self {
            device_id,
            timestamp,
            samples,
        }
    }

    /// Returns the device the samples were read from.
    #[inline]
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns when the cycle completed.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the samples in declared order.
    #[inline]
    pub fn samples(&self) -> &[MeasurementSample] {
        &self.samples
    }
}

impl fmt::Display for MeasurementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} samples @ {}",
            self.device_id,
            self.samples.len(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id() {
        let id = DeviceId::new("plc-001");
        assert_eq!(id.as_str(), "plc-001");
        assert_eq!(format!("{}", id), "plc-001");
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(MeasurementCategory::Coil.as_str(), "coil");
        assert_eq!(MeasurementCategory::DiscreteInput.as_str(), "discrete-input");
        assert_eq!(
            MeasurementCategory::HoldingRegister.as_str(),
            "holding-register"
        );
        assert_eq!(MeasurementCategory::InputRegister.as_str(), "input-register");

        assert_eq!(
            "holding-register".parse::<MeasurementCategory>().unwrap(),
            MeasurementCategory::HoldingRegister
        );
        assert!("registers".parse::<MeasurementCategory>().is_err());
    }

    #[test]
    fn test_category_predicates() {
        assert!(MeasurementCategory::Coil.is_boolean());
        assert!(MeasurementCategory::DiscreteInput.is_boolean());
        assert!(MeasurementCategory::HoldingRegister.is_register());
        assert!(MeasurementCategory::InputRegister.is_register());

        assert!(MeasurementCategory::Coil.is_writable());
        assert!(MeasurementCategory::HoldingRegister.is_writable());
        assert!(!MeasurementCategory::DiscreteInput.is_writable());
        assert!(!MeasurementCategory::InputRegister.is_writable());
    }

    #[test]
    fn test_definition_validation() {
        assert!(MeasurementDefinition::holding_register("hr", 100).is_ok());
        assert!(MeasurementDefinition::holding_register("", 100).is_err());
        assert!(MeasurementDefinition::holding_register("  ", 100).is_err());
        assert!(MeasurementDefinition::holding_register_range("hr", 100, 0).is_err());
        assert!(MeasurementDefinition::coil_range("c", 65_535, 1).is_ok());
        assert!(MeasurementDefinition::coil_range("c", 65_535, 2).is_err());
    }

    #[test]
    fn test_definition_end_exclusive() {
        let def = MeasurementDefinition::input_register_range("ir", 10, 4).unwrap();
        assert_eq!(def.end_exclusive(), 14);

        let def = MeasurementDefinition::coil("c", 65_535).unwrap();
        assert_eq!(def.end_exclusive(), 65_536);
    }

    #[test]
    fn test_sample_value_accessors() {
        let v = SampleValue::Bool(true);
        assert!(v.as_bool().unwrap());
        assert!(v.as_word().is_err());
        assert!(v.as_bools().is_err());

        let v = SampleValue::Words(vec![1, 2, 3]);
        assert_eq!(v.as_words().unwrap(), &[1, 2, 3]);
        let err = v.as_word().unwrap_err();
        assert!(err.to_string().contains("word"));
    }

    #[test]
    fn test_sample_value_from() {
        assert_eq!(SampleValue::from(true), SampleValue::Bool(true));
        assert_eq!(SampleValue::from(42u16), SampleValue::Word(42));
        assert_eq!(
            SampleValue::from(vec![true, false]),
            SampleValue::Bools(vec![true, false])
        );
    }

    #[test]
    fn test_measurement_event() {
        let def = MeasurementDefinition::holding_register("hr100", 100).unwrap();
        let sample = MeasurementSample::new(def, SampleValue::Word(42));
        let event = MeasurementEvent::new(DeviceId::new("plc-001"), Utc::now(), vec![sample]);

        assert_eq!(event.device_id().as_str(), "plc-001");
        assert_eq!(event.samples().len(), 1);
        assert_eq!(event.samples()[0].definition().id(), "hr100");
    }

    #[test]
    fn test_serde_round_trip() {
        let def = MeasurementDefinition::coil_range("flags", 8, 4).unwrap();
        let json = serde_json::to_string(&def).unwrap();
        let parsed: MeasurementDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, def);

        let value = SampleValue::Bools(vec![true, false, true, false]);
        let json = serde_json::to_string(&value).unwrap();
        let parsed: SampleValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }
}
