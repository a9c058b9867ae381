/*
* Copyright 2018-2020 TON DEV SOLUTIONS LTD.
*
* Licensed under the SOFTWARE EVALUATION License (the "License"); you may not use
* this file except in compliance with the License.
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific TON DEV software governing permissions and
* limitations under the License.
*/

use crate::{
    error::BlockError,
    Serializable, Deserializable,
};
use ton_types::{
    fail, Result,
    UInt256,
    BuilderData, Cell, CellType, IBitstring, LevelMask, SliceData,
};

/*
!merkle_update {X:Type} old_hash:uint256 new_hash:uint256
old:^X new:^X = MERKLE_UPDATE X;
*/
/// State update of a block. Only the root hashes are used here,
/// so the update trees are usually pruned right below the roots.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MerkleUpdate {
    pub old_hash: UInt256,
    pub new_hash: UInt256,
    pub old_depth: u16,
    pub new_depth: u16,
    pub old: Cell,
    pub new: Cell,
}

impl Default for MerkleUpdate {
    fn default() -> MerkleUpdate {
        let empty = Cell::default();
        MerkleUpdate {
            old_hash: empty.hash(0),
            new_hash: empty.hash(0),
            old_depth: 0,
            new_depth: 0,
            old: empty.clone(),
            new: empty,
        }
    }
}

// stored hash and depth must describe the level 0 of the referenced tree
fn check_update_side(side: &str, hash: &UInt256, depth: u16, cell: &Cell) -> Result<()> {
    if hash != &cell.hash(0) {
        fail!(BlockError::WrongMerkleUpdate(format!("stored {} hash {:x} differs from the tree", side, hash)))
    }
    if depth != cell.depth(0) {
        fail!(BlockError::WrongMerkleUpdate(format!("stored {} depth {} differs from the tree", side, depth)))
    }
    Ok(())
}

impl Deserializable for MerkleUpdate {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let cell_type = slice.get_next_byte()?;
        if cell_type != u8::from(CellType::MerkleUpdate) {
            fail!(BlockError::InvalidData(format!("cell type {} is not a Merkle update", cell_type)))
        }
        let update = MerkleUpdate {
            old_hash: UInt256::construct_from(slice)?,
            new_hash: UInt256::construct_from(slice)?,
            old_depth: slice.get_next_u16()?,
            new_depth: slice.get_next_u16()?,
            old: slice.checked_drain_reference()?,
            new: slice.checked_drain_reference()?,
        };
        check_update_side("old", &update.old_hash, update.old_depth, &update.old)?;
        check_update_side("new", &update.new_hash, update.new_depth, &update.new)?;
        Ok(update)
    }
}

impl Serializable for MerkleUpdate {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.set_type(CellType::MerkleUpdate);
        cell.append_u8(u8::from(CellType::MerkleUpdate))?;
        self.old_hash.write_to(cell)?;
        self.new_hash.write_to(cell)?;
        cell.append_u16(self.old_depth)?;
        cell.append_u16(self.new_depth)?;
        cell.checked_append_reference(self.old.clone())?;
        cell.checked_append_reference(self.new.clone())?;
        let children_mask = self.old.level_mask() | self.new.level_mask();
        cell.set_level_mask(LevelMask::for_merkle_cell(children_mask));
        Ok(())
    }
}

impl MerkleUpdate {
    /// Update which carries only the hashes of both state roots
    pub fn with_pruned_roots(old: &Cell, new: &Cell) -> Result<MerkleUpdate> {
        Ok(MerkleUpdate {
            old_hash: old.repr_hash(),
            new_hash: new.repr_hash(),
            old_depth: old.repr_depth(),
            new_depth: new.repr_depth(),
            old: pruned_branch(old, 0)?.into_cell()?,
            new: pruned_branch(new, 0)?.into_cell()?,
        })
    }
}

/// Replaces `cell` with a pruned branch keeping all its hashes and depths.
/// `merkle_depth` is the count of Merkle cells above the branch.
pub(crate) fn pruned_branch(cell: &Cell, merkle_depth: u8) -> Result<BuilderData> {
    if merkle_depth > 2 {
        fail!(BlockError::InvalidArg(format!("Merkle depth {} is too big", merkle_depth)))
    }
    let mask = cell.level_mask().mask();
    let level_bit = 1 << merkle_depth;
    if mask & level_bit != 0 {
        fail!(BlockError::InvalidOperation(
            format!("level {} is already present in mask {:03b}", merkle_depth, mask)
        ))
    }
    let level_mask = LevelMask::with_mask(mask | level_bit);
    let mut pruned = BuilderData::new();
    pruned.set_type(CellType::PrunedBranch);
    pruned.set_level_mask(level_mask);
    pruned.append_u8(u8::from(CellType::PrunedBranch))?;
    pruned.append_u8(level_mask.mask())?;
    for hash in cell.hashes() {
        pruned.append_raw(hash.as_slice(), 256)?;
    }
    for depth in cell.depths() {
        pruned.append_u16(depth)?;
    }
    Ok(pruned)
}

#[cfg(test)]
#[path = "tests/test_merkle_update.rs"]
mod tests;
