// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Batch planning.
//!
//! [`plan_batches`] turns a device's measurement list into the minimal set of
//! wire transactions: measurements of the same category whose address ranges
//! line up back-to-back are merged into one batch, and each measurement
//! records its offset into that batch for later slicing. A gap in the
//! address run starts a new batch.
//!
//! The planner is a pure function; the resulting plan is computed once per
//! device registration and shared by every poll cycle.

use drover_core::types::{MeasurementCategory, MeasurementDefinition};

// =============================================================================
// Slice
// =============================================================================

/// One measurement's position inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    definition: MeasurementDefinition,
    offset: u16,
}

impl Slice {
    /// Returns the measurement definition.
    #[inline]
    pub fn definition(&self) -> &MeasurementDefinition {
        &self.definition
    }

    /// Returns the offset of the definition's first element within the batch.
    #[inline]
    pub fn offset(&self) -> u16 {
        self.offset
    }
}

// =============================================================================
// Batch
// =============================================================================

/// A single wire transaction covering a contiguous address range of one
/// category.
///
/// Invariants: every slice shares the batch's category,
/// `slice.offset + slice.definition.count <= count`, and the slice ranges
/// exactly tile `[start_address, start_address + count)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    category: MeasurementCategory,
    start_address: u16,
    count: u16,
    slices: Vec<Slice>,
}

impl Batch {
    /// Returns the object category read by this batch.
    #[inline]
    pub fn category(&self) -> MeasurementCategory {
        self.category
    }

    /// Returns the first address covered.
    #[inline]
    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Returns the number of elements covered.
    #[inline]
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Returns the slices in ascending address order.
    #[inline]
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Partition order for categories; keeps plans deterministic.
const CATEGORIES: [MeasurementCategory; 4] = [
    MeasurementCategory::Coil,
    MeasurementCategory::DiscreteInput,
    MeasurementCategory::HoldingRegister,
    MeasurementCategory::InputRegister,
];

/// Plans the wire transactions for a measurement list.
///
/// Definitions are partitioned by category and sorted by address; runs of
/// definitions where each starts exactly where the previous one ended merge
/// into a single batch. The input order does not affect the plan.
///
/// Overlapping ranges within a category are not detected here; the
/// configuration builder rejects them up front.
pub fn plan_batches(definitions: &[MeasurementDefinition]) -> Vec<Batch> {
    let mut batches = Vec::new();

    for category in CATEGORIES {
        let mut sorted: Vec<&MeasurementDefinition> = definitions
            .iter()
            .filter(|d| d.category() == category)
            .collect();
        sorted.sort_by_key(|d| d.address());

        let mut index = 0;
        while index < sorted.len() {
            let head = sorted[index];
            let batch_start = head.address();
            let mut batch_end = head.end_exclusive();
            let mut slices = vec![Slice {
                definition: head.clone(),
                offset: 0,
            }];
            index += 1;

            while index < sorted.len() {
                let next = sorted[index];
                if u32::from(next.address()) != batch_end {
                    break;
                }
                slices.push(Slice {
                    definition: next.clone(),
                    offset: next.address() - batch_start,
                });
                batch_end = next.end_exclusive();
                index += 1;
            }

            batches.push(Batch {
                category,
                start_address: batch_start,
                count: (batch_end - u32::from(batch_start)) as u16,
                slices,
            });
        }
    }

    batches
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn holding(id: &str, address: u16, count: u16) -> MeasurementDefinition {
        MeasurementDefinition::holding_register_range(id, address, count).unwrap()
    }

    fn coil(id: &str, address: u16) -> MeasurementDefinition {
        MeasurementDefinition::coil(id, address).unwrap()
    }

    /// Every batch must be exactly tiled by its slices.
    fn assert_invariants(definitions: &[MeasurementDefinition], batches: &[Batch]) {
        let mut seen = BTreeSet::new();
        for batch in batches {
            let mut covered = BTreeSet::new();
            for slice in batch.slices() {
                let def = slice.definition();
                assert_eq!(def.category(), batch.category());
                assert!(u32::from(slice.offset()) + u32::from(def.count()) <= u32::from(batch.count()));
                assert_eq!(batch.start_address() + slice.offset(), def.address());
                for i in 0..def.count() {
                    assert!(covered.insert(slice.offset() + i), "overlap inside batch");
                }
                seen.insert(def.id().to_string());
            }
            let expected: BTreeSet<u16> = (0..batch.count()).collect();
            assert_eq!(covered, expected, "batch not contiguous");
        }
        let declared: BTreeSet<String> =
            definitions.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(seen, declared, "slices do not cover all definitions");
    }

    #[test]
    fn test_single_definition_single_batch() {
        let defs = vec![holding("hr100", 100, 1)];
        let batches = plan_batches(&defs);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].category(), MeasurementCategory::HoldingRegister);
        assert_eq!(batches[0].start_address(), 100);
        assert_eq!(batches[0].count(), 1);
        assert_invariants(&defs, &batches);
    }

    #[test]
    fn test_contiguous_definitions_merge() {
        let defs = vec![holding("hr100", 100, 1), holding("hr101", 101, 1)];
        let batches = plan_batches(&defs);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start_address(), 100);
        assert_eq!(batches[0].count(), 2);
        assert_eq!(batches[0].slices()[0].offset(), 0);
        assert_eq!(batches[0].slices()[1].offset(), 1);
        assert_invariants(&defs, &batches);
    }

    #[test]
    fn test_ranged_definitions_merge() {
        let defs = vec![holding("a", 100, 4), holding("b", 104, 2), holding("c", 106, 1)];
        let batches = plan_batches(&defs);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].count(), 7);
        assert_invariants(&defs, &batches);
    }

    #[test]
    fn test_gap_breaks_batch() {
        let defs = vec![holding("a", 100, 1), holding("b", 102, 1)];
        let batches = plan_batches(&defs);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].start_address(), 100);
        assert_eq!(batches[0].count(), 1);
        assert_eq!(batches[1].start_address(), 102);
        assert_eq!(batches[1].count(), 1);
        assert_invariants(&defs, &batches);
    }

    #[test]
    fn test_categories_do_not_merge() {
        let defs = vec![holding("hr100", 100, 1), coil("coil2", 2)];
        let batches = plan_batches(&defs);

        assert_eq!(batches.len(), 2);
        assert_invariants(&defs, &batches);
    }

    #[test]
    fn test_declaration_order_is_irrelevant() {
        let forward = vec![holding("a", 100, 1), holding("b", 101, 1)];
        let backward = vec![holding("b", 101, 1), holding("a", 100, 1)];

        assert_eq!(plan_batches(&forward), plan_batches(&backward));
    }

    #[test]
    fn test_adjacent_same_address_categories_stay_separate() {
        let defs = vec![
            MeasurementDefinition::coil("c5", 5).unwrap(),
            MeasurementDefinition::discrete_input("d5", 5).unwrap(),
        ];
        let batches = plan_batches(&defs);
        assert_eq!(batches.len(), 2);
        assert_invariants(&defs, &batches);
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        assert!(plan_batches(&[]).is_empty());
    }
}
