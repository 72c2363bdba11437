use std::{collections::BTreeMap, hash::Hash};

/// Invert a map by swapping keys and values
pub fn invert_map<K, V, MK, MV>(original: MK) -> MV
where
    K: Ord + Hash + Eq,
    V: Ord + Hash + Eq + Clone,
    MK: IntoIterator<Item = (K, V)>,
    MV: FromIterator<(V, K)>,
{
    original
        .into_iter()
        .map(|(key, value)| (value, key))
        .collect()
}

/// Resolve class ids to their names, falling back to the numeric id for unmapped classes
pub fn class_names(id2label: &BTreeMap<usize, String>, ids: &[usize]) -> Vec<String> {
    ids.iter()
        .map(|id| id2label.get(id).cloned().unwrap_or_else(|| id.to_string()))
        .collect()
}
