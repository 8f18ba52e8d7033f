use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Assessment, CandidatePair, CompositeKey, Episode, KeySpec, Keyed};

/// Result of partitioning two collections by the distinct values of a key.
///
/// Every input row lands in exactly one of `*_only` / `*_in_both` for its side.
#[derive(Debug, Clone)]
pub struct Partition<L, R> {
    pub key_spec: KeySpec,
    pub left_only: Vec<L>,
    pub right_only: Vec<R>,
    pub left_in_both: Vec<L>,
    pub right_in_both: Vec<R>,
}

/// Partition `left` and `right` by the composite key `key_spec`.
///
/// Set algebra runs over distinct key values; rows are then filtered into
/// the partition their key belongs to, preserving input order.
pub fn reconcile<L, R>(left: &[L], right: &[R], key_spec: &KeySpec) -> Partition<L, R>
where
    L: Keyed + Clone,
    R: Keyed + Clone,
{
    let left_keys: BTreeSet<CompositeKey> = left.iter().map(|r| r.composite_key(key_spec)).collect();
    let right_keys: BTreeSet<CompositeKey> =
        right.iter().map(|r| r.composite_key(key_spec)).collect();

    let mut partition = Partition {
        key_spec: key_spec.clone(),
        left_only: Vec::new(),
        right_only: Vec::new(),
        left_in_both: Vec::new(),
        right_in_both: Vec::new(),
    };

    for row in left {
        if right_keys.contains(&row.composite_key(key_spec)) {
            partition.left_in_both.push(row.clone());
        } else {
            partition.left_only.push(row.clone());
        }
    }
    for row in right {
        if left_keys.contains(&row.composite_key(key_spec)) {
            partition.right_in_both.push(row.clone());
        } else {
            partition.right_only.push(row.clone());
        }
    }

    let both = left_keys.intersection(&right_keys).count();
    log::info!(
        "(key: {key_spec}) keys only in left: {}, only in right: {}, in both: {both}",
        left_keys.len() - both,
        right_keys.len() - both,
    );

    partition
}

/// Inner join of episodes and assessments on `key_spec`, one candidate row
/// per (episode, assessment) pair sharing a key value.
pub fn inner_join(
    episodes: &[Episode],
    assessments: &[Assessment],
    key_spec: &KeySpec,
) -> Vec<CandidatePair> {
    let mut by_key: BTreeMap<CompositeKey, Vec<&Episode>> = BTreeMap::new();
    for ep in episodes {
        by_key.entry(ep.composite_key(key_spec)).or_default().push(ep);
    }

    let mut pairs = Vec::new();
    for asmt in assessments {
        let key = asmt.composite_key(key_spec);
        if let Some(eps) = by_key.get(&key) {
            for ep in eps {
                pairs.push(CandidatePair {
                    key: key.clone(),
                    episode: (*ep).clone(),
                    assessment: asmt.clone(),
                });
            }
        }
    }
    pairs
}
