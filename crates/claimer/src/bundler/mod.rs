//! Turns discovered reward items into claim bundles.
//!
//! Every step preserves input order so bundle ids, and with them idempotency,
//! are stable across runs that see the same discovery order.

use anyhow::Result;
use log::debug;
use shared::models::bundle::BundleKey;
use shared::models::{ClaimBundle, RewardItem};
use std::collections::HashMap;

/// One bundle per `(chain, protocol, claim_to)`, in order of first appearance.
pub fn group_by_contract(items: Vec<RewardItem>) -> Result<Vec<ClaimBundle>> {
    let mut order: Vec<BundleKey> = Vec::new();
    let mut groups: HashMap<BundleKey, Vec<RewardItem>> = HashMap::new();

    for item in items {
        let key = BundleKey::of(&item);
        match groups.get_mut(&key) {
            Some(group) => group.push(item),
            None => {
                order.push(key.clone());
                groups.insert(key, vec![item]);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(ClaimBundle::new)
        .collect()
}

/// Cuts bundles longer than `max_size` into consecutive chunks.
pub fn split_large_bundles(bundles: Vec<ClaimBundle>, max_size: usize) -> Result<Vec<ClaimBundle>> {
    let max_size = max_size.max(1);
    let mut out = Vec::with_capacity(bundles.len());

    for bundle in bundles {
        if bundle.len() <= max_size {
            out.push(bundle);
            continue;
        }
        debug!(
            "Splitting bundle {} ({} items) into chunks of {max_size}",
            bundle.id,
            bundle.len()
        );
        for chunk in bundle.items.chunks(max_size) {
            out.push(ClaimBundle::new(chunk.to_vec())?);
        }
    }
    Ok(out)
}

/// Concatenates undersized bundles that share a key, never past `max_size`.
/// Each undersized bundle joins the earliest accumulator for its key that
/// still has room.
///
/// A merged bundle takes the slot of its first constituent; bundles at or
/// above `min_size` keep their slot untouched. An undersized bundle with no
/// compatible partner passes through as-is.
pub fn merge_bundles(
    bundles: Vec<ClaimBundle>,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<ClaimBundle>> {
    let max_size = max_size.max(1);

    enum Slot {
        Ready(ClaimBundle),
        Merging(Vec<ClaimBundle>),
    }

    let mut slots: Vec<Slot> = Vec::with_capacity(bundles.len());
    // Every slot accumulating undersized bundles for a key, oldest first.
    let mut open: HashMap<BundleKey, Vec<usize>> = HashMap::new();

    for bundle in bundles {
        if bundle.len() >= min_size {
            slots.push(Slot::Ready(bundle));
            continue;
        }

        let candidates = open.entry(bundle.key()).or_default();
        let target = candidates.iter().copied().find(|&idx| match &slots[idx] {
            Slot::Merging(parts) => {
                parts.iter().map(ClaimBundle::len).sum::<usize>() + bundle.len() <= max_size
            }
            Slot::Ready(_) => false,
        });

        match target {
            Some(idx) => {
                if let Slot::Merging(parts) = &mut slots[idx] {
                    parts.push(bundle);
                }
            }
            None => {
                candidates.push(slots.len());
                slots.push(Slot::Merging(vec![bundle]));
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Ready(bundle) => Ok(bundle),
            Slot::Merging(mut parts) if parts.len() == 1 => Ok(parts.remove(0)),
            Slot::Merging(parts) => {
                let ids: Vec<String> = parts.iter().map(|p| p.id.clone()).collect();
                let merged =
                    ClaimBundle::new(parts.into_iter().flat_map(|p| p.items).collect())?;
                debug!("Merged bundles {ids:?} into {}", merged.id);
                Ok(merged)
            }
        })
        .collect()
}

/// Group, split to `max_size`, then merge undersized leftovers.
pub fn build_bundles(
    items: Vec<RewardItem>,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<ClaimBundle>> {
    let grouped = group_by_contract(items)?;
    let split = split_large_bundles(grouped, max_size)?;
    merge_bundles(split, min_size, max_size)
}
