//! Ordering engine: pure sequence transformations.
//!
//! Every function takes a block sequence plus a request and returns a new
//! sequence whose `order` values are exactly `0..N-1` by position. Nothing
//! here performs I/O or consults selection state on its own.
//!
//! # Group moves
//!
//! Drag libraries report the destination index against the list with only
//! the *dragged* block removed. When several selected blocks move together
//! that index no longer identifies a slot in the final list, so the group is
//! positioned relative to an **anchor**: the first non-selected block at or
//! after the destination in that dragged-removed list. The selected blocks
//! are spliced in front of the anchor (or appended when there is none),
//! keeping their relative order.

use std::collections::HashSet;

use folio_types::{Block, BlockId};
use tracing::debug;

use crate::error::DocError;
use crate::Result;

/// A structural change to a block sequence.
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Insert `block` so that it ends up at `index`.
    Insert { index: usize, block: Block },
    /// Remove the block with `id`.
    Delete { id: BlockId },
    /// Move one block from `source` to `destination` (final index).
    Move { source: usize, destination: usize },
    /// Move every block in `selected` as a contiguous group, positioned by
    /// where `dragged` was dropped.
    MoveGroup {
        dragged: BlockId,
        destination: usize,
        selected: Vec<BlockId>,
    },
}

/// Rewrite `order` to match position.
pub fn reindex(blocks: &mut [Block]) {
    for (i, block) in blocks.iter_mut().enumerate() {
        block.order = i as u32;
    }
}

/// Whether `order` values are exactly `{0, .., N-1}` with no duplicates.
///
/// Checks the *set* of values, independent of slice position.
pub fn is_dense(blocks: &[Block]) -> bool {
    let mut seen = vec![false; blocks.len()];
    for block in blocks {
        let Some(slot) = seen.get_mut(block.order as usize) else {
            return false;
        };
        if *slot {
            return false;
        }
        *slot = true;
    }
    true
}

/// `(id, order)` pairs for a bulk reorder call.
pub fn order_pairs(blocks: &[Block]) -> Vec<(BlockId, u32)> {
    blocks.iter().map(|b| (b.id, b.order)).collect()
}

/// Apply a mutation and return the reindexed sequence.
pub fn apply(blocks: &[Block], mutation: Mutation) -> Result<Vec<Block>> {
    match mutation {
        Mutation::Insert { index, block } => insert(blocks, index, block),
        Mutation::Delete { id } => delete(blocks, &id).map(|(seq, _, _)| seq),
        Mutation::Move {
            source,
            destination,
        } => move_single(blocks, source, destination),
        Mutation::MoveGroup {
            dragged,
            destination,
            selected,
        } => move_group(blocks, &dragged, destination, &selected),
    }
}

/// Insert `block` at `index`, shifting later blocks by one.
pub fn insert(blocks: &[Block], index: usize, block: Block) -> Result<Vec<Block>> {
    if index > blocks.len() {
        return Err(DocError::IndexOutOfRange {
            index,
            len: blocks.len(),
        });
    }
    if blocks.iter().any(|b| b.id == block.id) {
        return Err(DocError::DuplicateBlock(block.id));
    }
    let mut out = Vec::with_capacity(blocks.len() + 1);
    out.extend_from_slice(&blocks[..index]);
    out.push(block);
    out.extend_from_slice(&blocks[index..]);
    reindex(&mut out);
    Ok(out)
}

/// Remove the block with `id`. Returns the new sequence, the removed block's
/// former index, and the removed block.
pub fn delete(blocks: &[Block], id: &BlockId) -> Result<(Vec<Block>, usize, Block)> {
    let index = blocks
        .iter()
        .position(|b| &b.id == id)
        .ok_or(DocError::BlockNotFound(*id))?;
    let mut out = blocks.to_vec();
    let removed = out.remove(index);
    reindex(&mut out);
    Ok((out, index, removed))
}

/// Remove the block at `source` and insert it at `destination`.
///
/// `destination` is the block's final index; values past the end clamp to
/// the last slot.
pub fn move_single(blocks: &[Block], source: usize, destination: usize) -> Result<Vec<Block>> {
    if source >= blocks.len() {
        return Err(DocError::IndexOutOfRange {
            index: source,
            len: blocks.len(),
        });
    }
    let mut out = blocks.to_vec();
    let moved = out.remove(source);
    let destination = destination.min(out.len());
    out.insert(destination, moved);
    reindex(&mut out);
    Ok(out)
}

/// Move the selected blocks as one contiguous group.
///
/// `destination` is the drop index reported against the sequence with only
/// `dragged` removed. `dragged` is always treated as part of the group; ids
/// in `selected` that are not in the sequence are ignored.
pub fn move_group(
    blocks: &[Block],
    dragged: &BlockId,
    destination: usize,
    selected: &[BlockId],
) -> Result<Vec<Block>> {
    if !blocks.iter().any(|b| &b.id == dragged) {
        return Err(DocError::BlockNotFound(*dragged));
    }
    let mut group: HashSet<BlockId> = selected.iter().copied().collect();
    group.insert(*dragged);

    let anchor = blocks
        .iter()
        .filter(|b| &b.id != dragged)
        .skip(destination)
        .find(|b| !group.contains(&b.id))
        .map(|b| b.id);

    let (selected_items, mut remaining): (Vec<Block>, Vec<Block>) =
        blocks.iter().cloned().partition(|b| group.contains(&b.id));

    let splice_at = anchor
        .and_then(|a| remaining.iter().position(|b| b.id == a))
        .unwrap_or(remaining.len());

    debug!(
        dragged = %dragged,
        group = selected_items.len(),
        anchor = ?anchor,
        "group move"
    );

    remaining.splice(splice_at..splice_at, selected_items);
    reindex(&mut remaining);
    Ok(remaining)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::{BlockContent, BlockKind};
    use rand::{Rng, SeedableRng};

    fn seq(labels: &[&str]) -> Vec<Block> {
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| Block::with_content(BlockId::temp(), BlockContent::text(*l), i as u32))
            .collect()
    }

    fn labels(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .map(|b| b.content.as_text().unwrap().markup().to_string())
            .collect()
    }

    fn id_of(blocks: &[Block], label: &str) -> BlockId {
        blocks
            .iter()
            .find(|b| b.content.as_text().unwrap().markup() == label)
            .unwrap()
            .id
    }

    #[test]
    fn test_move_single_forward() {
        let blocks = seq(&["A", "B", "C", "D"]);
        let moved = move_single(&blocks, 0, 2).unwrap();
        assert_eq!(labels(&moved), ["B", "C", "A", "D"]);
        assert!(is_dense(&moved));
    }

    #[test]
    fn test_move_single_backward() {
        let blocks = seq(&["A", "B", "C", "D"]);
        let moved = move_single(&blocks, 3, 1).unwrap();
        assert_eq!(labels(&moved), ["A", "D", "B", "C"]);
    }

    #[test]
    fn test_move_single_out_of_range_source() {
        let blocks = seq(&["A"]);
        assert_eq!(
            move_single(&blocks, 4, 0).unwrap_err(),
            DocError::IndexOutOfRange { index: 4, len: 1 }
        );
    }

    #[test]
    fn test_group_move_preserves_relative_order() {
        let blocks = seq(&["A", "B", "C", "D", "E"]);
        let a = id_of(&blocks, "A");
        let c = id_of(&blocks, "C");

        // Dragging A to land just before D: D sits at index 2 once A is lifted.
        let moved = move_group(&blocks, &a, 2, &[a, c]).unwrap();
        assert_eq!(labels(&moved), ["B", "A", "C", "D", "E"]);
        assert!(is_dense(&moved));

        // Same drop, but the physically dragged block is C.
        let moved = move_group(&blocks, &c, 2, &[a, c]).unwrap();
        assert_eq!(labels(&moved), ["B", "A", "C", "D", "E"]);
    }

    #[test]
    fn test_group_move_anchor_skips_selected() {
        let blocks = seq(&["A", "B", "C", "D", "E"]);
        let a = id_of(&blocks, "A");
        let c = id_of(&blocks, "C");
        // Without A: [B, C, D, E]; index 1 is C (selected) so the anchor is D.
        let moved = move_group(&blocks, &a, 1, &[a, c]).unwrap();
        assert_eq!(labels(&moved), ["B", "A", "C", "D", "E"]);
    }

    #[test]
    fn test_group_move_past_end_appends() {
        let blocks = seq(&["A", "B", "C", "D", "E"]);
        let a = id_of(&blocks, "A");
        let b = id_of(&blocks, "B");
        let moved = move_group(&blocks, &a, 4, &[a, b]).unwrap();
        assert_eq!(labels(&moved), ["C", "D", "E", "A", "B"]);
    }

    #[test]
    fn test_group_move_to_front() {
        let blocks = seq(&["A", "B", "C", "D", "E"]);
        let d = id_of(&blocks, "D");
        let e = id_of(&blocks, "E");
        let moved = move_group(&blocks, &e, 0, &[d, e]).unwrap();
        assert_eq!(labels(&moved), ["D", "E", "A", "B", "C"]);
    }

    #[test]
    fn test_group_move_unknown_dragged() {
        let blocks = seq(&["A", "B"]);
        let stranger = BlockId::temp();
        assert_eq!(
            move_group(&blocks, &stranger, 0, &[]).unwrap_err(),
            DocError::BlockNotFound(stranger)
        );
    }

    #[test]
    fn test_insert_shifts_following_orders() {
        let blocks = seq(&["A", "B", "C"]);
        let new = Block::new(BlockId::temp(), BlockKind::Text, 0);
        let out = insert(&blocks, 2, new.clone()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[2].id, new.id);
        assert_eq!(out[2].order, 2);
        assert_eq!(out[3].order, 3);
        assert!(is_dense(&out));
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let blocks = seq(&["A"]);
        let dup = blocks[0].clone();
        assert!(matches!(insert(&blocks, 1, dup), Err(DocError::DuplicateBlock(_))));
    }

    #[test]
    fn test_delete_returns_former_index() {
        let blocks = seq(&["A", "B", "C"]);
        let b = id_of(&blocks, "B");
        let (out, index, removed) = delete(&blocks, &b).unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.id, b);
        assert_eq!(labels(&out), ["A", "C"]);
        assert!(is_dense(&out));
    }

    #[test]
    fn test_is_dense_detects_gaps_and_duplicates() {
        let mut blocks = seq(&["A", "B", "C"]);
        assert!(is_dense(&blocks));
        blocks[2].order = 5;
        assert!(!is_dense(&blocks));
        blocks[2].order = 1;
        assert!(!is_dense(&blocks));
    }

    #[test]
    fn test_dense_invariant_under_random_mutations() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut blocks = seq(&["A", "B", "C"]);

        for _ in 0..500 {
            let len = blocks.len();
            let mutation = match rng.gen_range(0..4) {
                0 => Mutation::Insert {
                    index: rng.gen_range(0..=len),
                    block: Block::new(BlockId::temp(), BlockKind::Text, 0),
                },
                1 if len > 1 => Mutation::Delete {
                    id: blocks[rng.gen_range(0..len)].id,
                },
                2 if len > 0 => Mutation::Move {
                    source: rng.gen_range(0..len),
                    destination: rng.gen_range(0..len),
                },
                _ if len > 0 => {
                    let selected: Vec<BlockId> = blocks
                        .iter()
                        .filter(|_| rng.gen_bool(0.3))
                        .map(|b| b.id)
                        .collect();
                    Mutation::MoveGroup {
                        dragged: blocks[rng.gen_range(0..len)].id,
                        destination: rng.gen_range(0..len),
                        selected,
                    }
                }
                _ => continue,
            };
            blocks = apply(&blocks, mutation).unwrap();
            assert!(is_dense(&blocks));
            for (i, b) in blocks.iter().enumerate() {
                assert_eq!(b.order as usize, i);
            }
        }
    }
}
