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

use super::*;
use crate::{
    write_read_and_assert, BlkPrevInfo, BlockExtra, ExtBlkRef, ShardIdent, UnixTime32,
};

fn tree() -> Cell {
    let leaf = |n: u8| {
        let mut b = BuilderData::new();
        b.append_u8(n).unwrap();
        b.into_cell().unwrap()
    };
    let mut left = BuilderData::new();
    left.append_u8(0x10).unwrap();
    left.checked_append_reference(leaf(1)).unwrap();
    left.checked_append_reference(leaf(2)).unwrap();
    let mut right = BuilderData::new();
    right.append_u8(0x20).unwrap();
    right.checked_append_reference(leaf(3)).unwrap();
    let mut root = BuilderData::new();
    root.append_u32(0xdeadbeef).unwrap();
    root.checked_append_reference(left.into_cell().unwrap()).unwrap();
    root.checked_append_reference(right.into_cell().unwrap()).unwrap();
    root.into_cell().unwrap()
}

fn test_block(seq_no: u32) -> (BlockIdExt, Cell) {
    let mut info = BlockInfo::new();
    info.set_shard(ShardIdent::masterchain());
    info.set_seq_no(seq_no).unwrap();
    info.set_gen_utime(UnixTime32::new(1_600_000_000));
    info.set_prev_stuff(false, &BlkPrevInfo::new(vec![ExtBlkRef::default()]).unwrap()).unwrap();
    let block = Block::with_params(
        0, info, Cell::default(), MerkleUpdate::default(), BlockExtra::new()
    ).unwrap();
    let root = block.serialize().unwrap();
    let id = BlockIdExt::with_params(ShardIdent::masterchain(), seq_no, root.repr_hash(), UInt256::from([1; 32]));
    (id, root)
}

#[test]
fn test_create_merkle_proof() {
    let root = tree();
    let left_hash = root.reference(0).unwrap().repr_hash();
    let root_hash = root.repr_hash();

    let proof = MerkleProof::create(&root, |h| h == &root_hash || h == &left_hash).unwrap();
    assert_eq!(proof.hash, root_hash);
    assert_eq!(proof.depth, root.repr_depth());
    let proof = write_read_and_assert(proof);

    let virtual_root = proof.virtual_root();
    assert_eq!(virtual_root.repr_hash(), root_hash);
    // leaves without references are always included
    let left = virtual_root.reference(0).unwrap();
    assert_eq!(left.cell_type(), CellType::Ordinary);
    assert_eq!(left.reference(1).unwrap().cell_type(), CellType::Ordinary);
    let right = virtual_root.reference(1).unwrap();
    assert_eq!(right.cell_type(), CellType::PrunedBranch);
    assert_eq!(right.repr_hash(), root.reference(1).unwrap().repr_hash());

    // nothing to include
    assert!(MerkleProof::create(&root, |_| false).is_err());
}

#[test]
fn test_create_with_subtrees() {
    let root = tree();
    let root_hash = root.repr_hash();
    let right_hash = root.reference(1).unwrap().repr_hash();
    let proof = MerkleProof::create_with_subtrees(&root, |h| h == &root_hash, |h| h == &right_hash).unwrap();
    let virtual_root = proof.virtual_root();
    assert_eq!(virtual_root.reference(0).unwrap().cell_type(), CellType::PrunedBranch);
    assert_eq!(virtual_root.reference(1).unwrap().reference(0).unwrap().cell_type(), CellType::Ordinary);

    let full = MerkleProof::create_with_subtrees(&root, |_| true, |_| true).unwrap();
    assert_eq!(full.virtual_root().repr_hash(), root_hash);
}

#[test]
fn test_merkle_proof_corrupted() {
    let root = tree();
    let root_hash = root.repr_hash();
    let proof = MerkleProof::create(&root, |h| h == &root_hash).unwrap();

    let mut wrong = proof.clone();
    wrong.hash = UInt256::from([1; 32]);
    assert!(wrong.serialize().and_then(MerkleProof::construct_from_cell).is_err());

    let mut wrong = proof.clone();
    wrong.depth += 1;
    assert!(wrong.serialize().and_then(MerkleProof::construct_from_cell).is_err());

    // ordinary cell is not a proof
    assert!(MerkleProof::construct_from_cell(root).is_err());
}

#[test]
fn test_virtualize_block() {
    let (id, root) = test_block(10);
    let proof = MerkleProof::create_with_subtrees(&root, |_| true, |_| true).unwrap();
    let (block, info) = proof.virtualize_block(&id).unwrap();
    assert_eq!(info.seq_no(), 10);
    assert!(block.read_extra().is_ok());

    let mut other = id.clone();
    other.root_hash = UInt256::from([7; 32]);
    let err = proof.virtualize_block(&other).unwrap_err();
    assert!(matches!(err.downcast_ref::<BlockError>(), Some(BlockError::WrongMerkleProof(_))));

    // hash field is right but the tree belongs to another block
    let (_, another_root) = test_block(11);
    let mut forged = MerkleProof::create_with_subtrees(&another_root, |_| true, |_| true).unwrap();
    forged.hash = id.root_hash.clone();
    let err = forged.virtualize_block(&id).unwrap_err();
    assert!(matches!(err.downcast_ref::<BlockError>(), Some(BlockError::WrongMerkleProof(_))));
}

#[test]
fn test_virtualize_block_header_only() {
    let (id, root) = test_block(10);
    let root_hash = root.repr_hash();
    let info_hash = root.reference(0).unwrap().repr_hash();
    let proof = MerkleProof::create(&root, |h| h == &root_hash || h == &info_hash).unwrap();
    let (block, info) = proof.virtualize_block(&id).unwrap();
    assert_eq!(info.gen_utime().as_u32(), 1_600_000_000);

    let err = block.read_extra().unwrap_err();
    assert!(matches!(err.downcast_ref::<BlockError>(), Some(BlockError::PrunedCellAccess(_))));
    let err = block.read_state_update().unwrap_err();
    assert!(matches!(err.downcast_ref::<BlockError>(), Some(BlockError::PrunedCellAccess(_))));
}

#[test]
fn test_virtualize_state() {
    let mut state = ShardStateUnsplit::with_ident(ShardIdent::masterchain());
    state.set_seq_no(5);
    let root = state.serialize().unwrap();
    let hash = root.repr_hash();
    let proof = MerkleProof::create_with_subtrees(&root, |_| true, |_| true).unwrap();
    let restored = proof.virtualize_state(&hash).unwrap();
    assert_eq!(restored.seq_no(), 5);

    assert!(proof.virtualize_state(&UInt256::from([3; 32])).is_err());

    // a block proof does not hold a state
    let (id, block_root) = test_block(1);
    let block_proof = MerkleProof::create_with_subtrees(&block_root, |_| true, |_| true).unwrap();
    assert!(block_proof.virtualize_state(&id.root_hash).is_err());
}
