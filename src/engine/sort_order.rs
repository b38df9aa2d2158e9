//! Sort positions for referenced children, taken from the order the author
//! listed them in.

use std::collections::BTreeMap;

/// Maps each resolved identifier to the position of its name in `names`.
///
/// `resolved` pairs an identifier with the name it was resolved from.
/// Comparison is exact. With duplicate names the first position wins;
/// identifiers whose name is not in the list are left out.
pub fn compute_order<I, N>(names: &[String], resolved: &[(I, N)]) -> BTreeMap<String, usize>
where
    I: AsRef<str>,
    N: AsRef<str>,
{
    resolved
        .iter()
        .filter_map(|(id, name)| {
            names
                .iter()
                .position(|candidate| candidate == name.as_ref())
                .map(|index| (id.as_ref().to_string(), index))
        })
        .collect()
}
