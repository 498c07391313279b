//! Dictionary flattening.

/// Collect the values of a keyed mapping into a sequence.
///
/// Order follows the mapping's own iteration order: stable for an unchanged
/// snapshot, unspecified across mutations.
pub fn dictionary_to_table<'a, K, V, I>(dict: I) -> Vec<V>
where
    K: 'a,
    V: Clone + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    dict.into_iter().map(|(_, v)| v.clone()).collect()
}
