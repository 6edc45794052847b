//! Proptest strategies shared by property tests.

use common::ColumnUpdate;
use proptest::prelude::*;

/// Primary keys drawn from a small domain so collisions are common.
pub fn small_key() -> impl Strategy<Value = i64> {
    0i64..16
}

/// Column values small enough that sums never overflow in tests.
pub fn small_value() -> impl Strategy<Value = i64> {
    -1000i64..1000
}

/// An update patch of `columns` slots, each independently keep-or-set.
pub fn update_patch(columns: usize) -> impl Strategy<Value = Vec<ColumnUpdate>> {
    proptest::collection::vec(
        proptest::option::of(small_value()).prop_map(ColumnUpdate::from_option),
        columns,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn patches_have_requested_arity(patch in update_patch(4)) {
            prop_assert_eq!(patch.len(), 4);
        }
    }
}
