/*
* Copyright (C) 2019-2021 TON Labs. All Rights Reserved.
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
    blocks::{Block, BlockIdExt, BlockInfo},
    error::BlockError,
    merkle_update::pruned_branch,
    shard_state::ShardStateUnsplit,
    Serializable, Deserializable,
};
use std::collections::HashMap;
use ton_types::{
    error, fail, Result,
    Cell, CellType, BuilderData, IBitstring, LevelMask, SliceData, UInt256,
};

/*
!merkle_proof {X:Type} virtual_hash:bits256 depth:uint16 virtual_root:^X = MERKLE_PROOF X;
*/
/// Tree with pruned branches proving that some cells belong to a tree with the root `hash`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MerkleProof {
    pub hash: UInt256,
    pub depth: u16,
    pub proof: Cell,
}

impl Deserializable for MerkleProof {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        if slice.pos() != 0 {
            fail!(BlockError::InvalidData("Merkle proof must start at the beginning of a cell".to_string()))
        }
        let cell_type = slice.get_next_byte()?;
        if cell_type != u8::from(CellType::MerkleProof) {
            fail!(BlockError::InvalidData(format!("cell type {} is not a Merkle proof", cell_type)))
        }
        let proof = MerkleProof {
            hash: UInt256::construct_from(slice)?,
            depth: slice.get_next_u16()?,
            proof: slice.checked_drain_reference()?,
        };
        if proof.hash != proof.proof.hash(0) {
            fail!(BlockError::WrongMerkleProof(format!("stored hash {:x} differs from the tree", proof.hash)))
        }
        if proof.depth != proof.proof.depth(0) {
            fail!(BlockError::WrongMerkleProof(format!("stored depth {} differs from the tree", proof.depth)))
        }
        Ok(proof)
    }
}

impl Serializable for MerkleProof {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        if !cell.is_empty() {
            fail!(BlockError::InvalidOperation("Merkle proof must be written into an empty cell".to_string()))
        }
        cell.set_type(CellType::MerkleProof);
        cell.append_u8(u8::from(CellType::MerkleProof))?;
        self.hash.write_to(cell)?;
        cell.append_u16(self.depth)?;
        cell.checked_append_reference(self.proof.clone())?;
        cell.set_level_mask(LevelMask::for_merkle_cell(self.proof.level_mask()));
        Ok(())
    }
}

// Copies the tree replacing cells which are not needed with pruned branches
struct ProofBuilder<'a, F: Fn(&UInt256) -> bool, G: Fn(&UInt256) -> bool> {
    is_include: &'a F,
    is_include_subtree: &'a G,
    done: HashMap<UInt256, Cell>,
}

impl<'a, F: Fn(&UInt256) -> bool, G: Fn(&UInt256) -> bool> ProofBuilder<'a, F, G> {
    fn build(&mut self, cell: &Cell, merkle_depth: u8) -> Result<Cell> {
        let merkle_depth = merkle_depth + cell.is_merkle() as u8;
        let mut builder = BuilderData::from_cell(cell)?;
        let mut level_mask = cell.level_mask();
        for i in 0..cell.references_count() {
            let child = cell.reference(i)?;
            let hash = child.repr_hash();
            let child = match self.done.get(&hash) {
                Some(done) => done.clone(),
                None if (self.is_include_subtree)(&hash) => child,
                None if child.references_count() == 0 || (self.is_include)(&hash) => {
                    self.build(&child, merkle_depth)?
                }
                None => pruned_branch(&child, merkle_depth)?.into_cell()?
            };
            level_mask |= child.level_mask();
            builder.replace_reference_cell(i, child);
        }
        if cell.is_merkle() {
            level_mask = LevelMask::for_merkle_cell(level_mask);
        }
        builder.set_level_mask(level_mask);
        let result = builder.into_cell()?;
        self.done.insert(cell.repr_hash(), result.clone());
        Ok(result)
    }
}

impl MerkleProof {

    /// Proof which keeps the cells whose hashes satisfy `is_include`.
    /// Leaves are kept as is, other cells are pruned.
    pub fn create(root: &Cell, is_include: impl Fn(&UInt256) -> bool) -> Result<Self> {
        Self::create_with_subtrees(root, is_include, |_| false)
    }

    /// Same as `create` but whole subtrees of cells satisfying `is_include_subtree` are kept
    pub fn create_with_subtrees(
        root: &Cell,
        is_include: impl Fn(&UInt256) -> bool,
        is_include_subtree: impl Fn(&UInt256) -> bool,
    ) -> Result<Self> {
        let hash = root.repr_hash();
        if !is_include(&hash) && !is_include_subtree(&hash) {
            fail!(BlockError::InvalidArg(format!("root {:x} is not included into the proof", hash)))
        }
        let mut builder = ProofBuilder {
            is_include: &is_include,
            is_include_subtree: &is_include_subtree,
            done: HashMap::new(),
        };
        let proof = builder.build(root, 0)?;
        Ok(MerkleProof {
            hash,
            depth: root.repr_depth(),
            proof,
        })
    }

    pub fn virtualize<T: Deserializable>(&self) -> Result<T> {
        let virt_root = self.proof.clone().virtualize(1);
        T::construct_from_cell(virt_root)
    }

    /// Virtual root cell of the proof
    pub fn virtual_root(&self) -> Cell {
        self.proof.clone().virtualize(1)
    }

    /// Proof of a block header: fails unless the proof is built for `block_id`
    pub fn virtualize_block(&self, block_id: &BlockIdExt) -> Result<(Block, BlockInfo)> {
        if &self.hash != block_id.root_hash() {
            fail!(BlockError::WrongMerkleProof(format!(
                "proof is built for block with root hash {:x} but {} is expected",
                self.hash, block_id
            )))
        }
        self.check_virtual_root(block_id.root_hash())?;
        let block: Block = self.virtualize()
            .map_err(|err| error!(BlockError::WrongMerkleProof(
                format!("Error extracting block from proof of {}: {}", block_id, err)
            )))?;
        let info = block.read_info()
            .map_err(|err| error!(BlockError::WrongMerkleProof(
                format!("Error extracting block info from proof of {}: {}", block_id, err)
            )))?;
        Ok((block, info))
    }

    /// Proof of a shard state: fails unless its root is `state_hash`
    pub fn virtualize_state(&self, state_hash: &UInt256) -> Result<ShardStateUnsplit> {
        if &self.hash != state_hash {
            fail!(BlockError::WrongMerkleProof(format!(
                "state proof hash {:x} is not equal to expected state hash {:x}",
                self.hash, state_hash
            )))
        }
        self.check_virtual_root(state_hash)?;
        self.virtualize()
            .map_err(|err| error!(BlockError::WrongMerkleProof(
                format!("Error extracting shard state from proof: {}", err)
            )))
    }

    // stored hash of an in-memory proof is not checked on construction
    fn check_virtual_root(&self, expected: &UInt256) -> Result<()> {
        let found = self.virtual_root().repr_hash();
        if &found != expected {
            fail!(BlockError::WrongMerkleProof(format!(
                "virtual root hash {:x} is not equal to expected {:x}", found, expected
            )))
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/test_merkle_proof.rs"]
mod tests;
