// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag address grammar for tagged transports.
//!
//! A tag address names a contiguous range of one Modbus object category:
//!
//! ```text
//! tag      = category ":" address ( "[" count "]" )?
//! category = "coil" | "discrete-input" | "holding-register" | "input-register"
//! ```
//!
//! Single-element reads and writes omit the bracketed count.
//!
//! # Examples
//!
//! ```
//! use drover_core::address::TagAddress;
//! use drover_core::types::MeasurementCategory;
//!
//! let tag = TagAddress::new(MeasurementCategory::HoldingRegister, 100, 2);
//! assert_eq!(tag.to_string(), "holding-register:100[2]");
//!
//! let parsed: TagAddress = "coil:7".parse().unwrap();
//! assert_eq!(parsed.category(), MeasurementCategory::Coil);
//! assert_eq!(parsed.count(), 1);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::MeasurementCategory;

// =============================================================================
// TagAddress
// =============================================================================

/// A category-typed address range, rendered in the tag string grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagAddress {
    category: MeasurementCategory,
    address: u16,
    count: u16,
}

impl TagAddress {
    /// Creates a tag address covering `count` elements from `address`.
    ///
    /// A `count` of zero is normalized to one element.
    pub fn new(category: MeasurementCategory, address: u16, count: u16) -> Self {
        Self {
            category,
            address,
            count: count.max(1),
        }
    }

    /// Creates a single-element tag address.
    pub fn single(category: MeasurementCategory, address: u16) -> Self {
        Self::new(category, address, 1)
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

    /// Returns `true` if this tag addresses a single element.
    #[inline]
    pub fn is_single(&self) -> bool {
        self.count == 1
    }
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count <= 1 {
            write!(f, "{}:{}", self.category, self.address)
        } else {
            write!(f, "{}:{}[{}]", self.category, self.address, self.count)
        }
    }
}

impl FromStr for TagAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category_str, rest) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::invalid_address(s, "expected 'category:address'"))?;
        let category = category_str.parse::<MeasurementCategory>()?;

        let (address_str, count_str) = match rest.split_once('[') {
            Some((address, bracketed)) => {
                let count = bracketed
                    .strip_suffix(']')
                    .ok_or_else(|| ConfigError::invalid_address(s, "unterminated count"))?;
                (address, Some(count))
            }
            None => (rest, None),
        };

        let address = address_str
            .parse::<u16>()
            .map_err(|_| ConfigError::invalid_address(s, "address must be a 16-bit integer"))?;

        let count = match count_str {
            Some(count) => count
                .parse::<u16>()
                .map_err(|_| ConfigError::invalid_address(s, "count must be a 16-bit integer"))?,
            None => 1,
        };
        if count == 0 {
            return Err(ConfigError::invalid_address(s, "count must be >= 1"));
        }

        Ok(Self {
            category,
            address,
            count,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_single_omits_count() {
        let tag = TagAddress::single(MeasurementCategory::Coil, 5);
        assert_eq!(tag.to_string(), "coil:5");

        let tag = TagAddress::new(MeasurementCategory::DiscreteInput, 0, 1);
        assert_eq!(tag.to_string(), "discrete-input:0");
    }

    #[test]
    fn test_display_ranged() {
        let tag = TagAddress::new(MeasurementCategory::InputRegister, 30, 12);
        assert_eq!(tag.to_string(), "input-register:30[12]");
    }

    #[test]
    fn test_parse_round_trip() {
        for text in [
            "coil:0",
            "coil:100[8]",
            "discrete-input:65535",
            "holding-register:4000[125]",
            "input-register:1[2]",
        ] {
            let tag: TagAddress = text.parse().unwrap();
            assert_eq!(tag.to_string(), text);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("holding-register".parse::<TagAddress>().is_err());
        assert!("register:1".parse::<TagAddress>().is_err());
        assert!("coil:-1".parse::<TagAddress>().is_err());
        assert!("coil:1[".parse::<TagAddress>().is_err());
        assert!("coil:1[0]".parse::<TagAddress>().is_err());
        assert!("coil:99999".parse::<TagAddress>().is_err());
    }

    #[test]
    fn test_zero_count_normalized() {
        let tag = TagAddress::new(MeasurementCategory::Coil, 1, 0);
        assert_eq!(tag.count(), 1);
        assert!(tag.is_single());
    }
}
