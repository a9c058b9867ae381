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
use crate::{write_read_and_assert, BASE_WORKCHAIN_ID};

#[test]
fn test_shard_descr() {
    let descr_none = ShardDescr::with_params(42, 17, 25, UInt256::from([70; 32]), FutureSplitMerge::None);
    let descr_split = ShardDescr::with_params(42, 17, 25, UInt256::from([70; 32]), FutureSplitMerge::Split{split_utime: 0x12345678, interval: 0x87654321});
    let descr_merge = ShardDescr::with_params(42, 17, 25, UInt256::from([70; 32]), FutureSplitMerge::Merge{merge_utime: 0x12345678, interval: 0x87654321});

    assert!(descr_none.is_fsm_none());
    assert!(descr_split.is_fsm_split());
    assert!(descr_merge.is_fsm_merge());
    assert_eq!(descr_merge.fsm_utime(), 0x12345678);
    assert_eq!(descr_merge.fsm_utime_end(), 0x9999_9999);

    write_read_and_assert(descr_none);
    write_read_and_assert(descr_split);
    write_read_and_assert(descr_merge);
}

#[test]
fn test_shard_descr_fsm_window() {
    let descr = ShardDescr::with_params(1, 0, 0, UInt256::default(), FutureSplitMerge::Split{split_utime: 1000, interval: 100});
    assert!(!descr.fsm_active_at(999));
    assert!(descr.fsm_active_at(1000));
    assert!(descr.fsm_active_at(1099));
    assert!(!descr.fsm_active_at(1100));

    let descr = ShardDescr::with_params(1, 0, 0, UInt256::default(), FutureSplitMerge::None);
    assert!(!descr.fsm_active_at(0));
}

fn shard_descr_cell(tag: usize, flags: u8) -> Cell {
    let mut cell = BuilderData::new();
    cell.append_bits(tag, 4).unwrap();
    cell.append_u32(10).unwrap();
    cell.append_u32(2).unwrap();
    cell.append_u64(100).unwrap();
    cell.append_u64(200).unwrap();
    UInt256::from([1; 32]).write_to(&mut cell).unwrap();
    UInt256::from([2; 32]).write_to(&mut cell).unwrap();
    cell.append_u8(flags).unwrap();
    cell.append_u32(3).unwrap();
    cell.append_u64(SHARD_FULL).unwrap();
    cell.append_u32(1).unwrap();
    cell.append_u32(1600000000).unwrap();
    FutureSplitMerge::None.write_to(&mut cell).unwrap();
    CurrencyCollection::with_grams(5).write_to(&mut cell).unwrap();
    CurrencyCollection::with_grams(6).write_to(&mut cell).unwrap();
    cell.into_cell().unwrap()
}

#[test]
fn test_shard_descr_inline_fees() {
    let descr = ShardDescr::construct_from_cell(shard_descr_cell(0xb, 0b1000_0000)).unwrap();
    assert_eq!(descr.seq_no, 10);
    assert!(descr.before_split);
    assert!(!descr.want_merge);
    assert_eq!(descr.fees_collected, CurrencyCollection::with_grams(5));
    assert_eq!(descr.funds_created, CurrencyCollection::with_grams(6));

    // reserved flag bits must be clear
    assert!(ShardDescr::construct_from_cell(shard_descr_cell(0xb, 0b1000_0001)).is_err());
    // unknown tag
    assert!(ShardDescr::construct_from_cell(shard_descr_cell(0xc, 0)).is_err());
}

#[test]
fn test_shard_descr_lt_range() {
    let descr = ShardDescr::with_params(42, 25, 25, UInt256::from([70; 32]), FutureSplitMerge::None);
    assert!(ShardDescr::construct_from_cell(descr.serialize().unwrap()).is_err());
    let descr = ShardDescr::with_params(42, 25, 17, UInt256::from([70; 32]), FutureSplitMerge::None);
    assert!(ShardDescr::construct_from_cell(descr.serialize().unwrap()).is_err());

    // registered zerostate has no blocks yet
    let zerostate = ShardDescr { next_validator_shard: SHARD_FULL, ..ShardDescr::default() };
    write_read_and_assert(zerostate);
}

fn test_ext_blk_ref(seq_no: u32) -> ExtBlkRef {
    ExtBlkRef {
        end_lt: seq_no as u64 * 1000 + 1,
        seq_no,
        root_hash: UInt256::from([seq_no as u8; 32]),
        file_hash: UInt256::from([seq_no as u8 + 1; 32])
    }
}

#[test]
fn test_mc_state_extra() {
    let mut extra = McStateExtra::default();
    let shard1 = ShardDescr::with_params(23, 77, 234, UInt256::from([131; 32]), FutureSplitMerge::None);
    let shard1_1 = ShardDescr::with_params(25, 177, 230, UInt256::from([131; 32]), FutureSplitMerge::None);
    let shard2 = ShardDescr::with_params(15, 78, 235, UInt256::from([77; 32]), FutureSplitMerge::Split{split_utime: 0x12345678, interval: 0x87654321});
    let shard2_2 = ShardDescr::with_params(115, 8, 35, UInt256::from([77; 32]), FutureSplitMerge::Split{split_utime: 0x12345678, interval: 0x87654321});
    let ident = extra.add_workchain(11, &shard1).unwrap();
    extra.shards.split_shard(&ident, |_| Ok((shard1, shard1_1))).unwrap();
    let ident = extra.add_workchain(22, &shard2).unwrap();
    extra.shards.split_shard(&ident, |_| Ok((shard2, shard2_2))).unwrap();

    let key = SliceData::load_builder(123u32.write_to_new_cell().unwrap()).unwrap();
    let mut value = BuilderData::new();
    value.checked_append_reference(0x11u8.serialize().unwrap()).unwrap();
    extra.config.config_params.set_builder(key, &value).unwrap();

    extra.prev_blocks.add(&KeyExtBlkRef { key: false, blk_ref: test_ext_blk_ref(999) }).unwrap();
    extra.prev_blocks.add(&KeyExtBlkRef { key: true, blk_ref: test_ext_blk_ref(1999) }).unwrap();
    extra.last_key_block = Some(test_ext_blk_ref(1999));
    extra.global_balance = CurrencyCollection::with_grams(5_000_000_000);

    let extra = write_read_and_assert(extra);
    assert_eq!(extra.prev_blocks.root_extra().max_end_lt, 1999001);
    assert!(extra.prev_blocks.root_extra().key);

    let left = ShardIdent::with_tagged_prefix(11, 0x4000_0000_0000_0000).unwrap();
    assert_eq!(extra.shard_seq_no(&left).unwrap(), Some(23));
    assert_eq!(extra.shard_seq_no(&ShardIdent::full(11)).unwrap(), None);

    let mut extra = extra;
    let mut stats = BlockCreateStats::default();
    stats.counters.set(&UInt256::from([3; 32]), &CreatorStats::default()).unwrap();
    extra.block_create_stats = Some(stats);
    write_read_and_assert(extra);
}

#[test]
fn test_mc_state_extra_bad_flags() {
    let extra = McStateExtra::default();
    let mut cell = BuilderData::new();
    cell.append_u16(0xcc26).unwrap();
    extra.shards.write_to(&mut cell).unwrap();
    extra.config.write_to(&mut cell).unwrap();
    let mut child = BuilderData::new();
    child.append_u16(2).unwrap();
    extra.validator_info.write_to(&mut child).unwrap();
    extra.prev_blocks.write_to(&mut child).unwrap();
    false.write_to(&mut child).unwrap();
    child.append_bit_zero().unwrap();
    cell.checked_append_reference(child.into_cell().unwrap()).unwrap();
    extra.global_balance.write_to(&mut cell).unwrap();

    assert!(McStateExtra::construct_from_cell(cell.into_cell().unwrap()).is_err());
}

fn build_mc_block_extra() -> McBlockExtra {
    let mut extra = McBlockExtra::default();
    let shard1 = ShardDescr::with_params(23, 77, 234, UInt256::from([131; 32]), FutureSplitMerge::None);
    let shard1_1 = ShardDescr::with_params(25, 177, 230, UInt256::from([131; 32]), FutureSplitMerge::None);
    let ident = ShardIdent::with_workchain_id(11).unwrap();
    extra.shards_mut().add_workchain(11, 134, UInt256::default(), UInt256::default()).unwrap();
    extra.fees_mut().store_shard_fees(&ident, CurrencyCollection::with_grams(1), CurrencyCollection::with_grams(1)).unwrap();
    extra.shards_mut().split_shard(&ident, |_| Ok((shard1, shard1_1))).unwrap();
    let ident = ShardIdent::with_workchain_id(22).unwrap();
    extra.shards_mut().add_workchain(22, 135, UInt256::default(), UInt256::default()).unwrap();
    extra.fees_mut().store_shard_fees(&ident, CurrencyCollection::with_grams(2), CurrencyCollection::with_grams(1)).unwrap();
    extra.prev_blk_signatures_mut().set(&0u16, &CryptoSignaturePair::default()).unwrap();
    extra.recover_create_msg = Some(0x77u32.serialize().unwrap());
    extra
}

#[test]
fn test_mc_block_extra() {
    let extra = write_read_and_assert(build_mc_block_extra());
    assert!(!extra.is_key_block());
    assert!(extra.config().is_none());
    assert!(extra.recover_create_msg_cell().is_some());
    assert!(extra.mint_msg_cell().is_none());
    assert_eq!(extra.total_fee(), &CurrencyCollection::with_grams(3));
    assert_eq!(extra.fee(&ShardIdent::full(22)).unwrap(), Some(CurrencyCollection::with_grams(2)));
    assert_eq!(extra.fee(&ShardIdent::full(33)).unwrap(), None);

    let mut extra = extra;
    extra.set_config(ConfigParams::default());
    let extra = write_read_and_assert(extra);
    assert!(extra.is_key_block());

    // add_workchain refuses duplicates
    let mut shards = extra.shards().clone();
    assert!(shards.add_workchain(22, 1, UInt256::default(), UInt256::default()).is_err());
}

#[test]
fn test_serialization_shard_hashes() {
    let mut shard_hashes = ShardHashes::default();

    for n in 0..12i32 {
        let descr = ShardDescr::with_params(42, 17, 25, UInt256::from([n as u8; 32]), FutureSplitMerge::None);
        let shards = BinTree::with_item(&descr).unwrap();
        shard_hashes.set(&n, &InRefValue(shards)).unwrap();
    }

    write_read_and_assert(shard_hashes);
}

fn two_shards_workchain() -> ShardHashes {
    let mut shards = ShardHashes::default();
    shards.add_workchain(BASE_WORKCHAIN_ID, 1, UInt256::from([1; 32]), UInt256::from([2; 32])).unwrap();
    shards.split_shard(&ShardIdent::full(BASE_WORKCHAIN_ID), |descr| {
        let mut left = descr.clone();
        left.seq_no = 10;
        left.next_catchain_seqno = 5;
        let mut right = descr;
        right.seq_no = 20;
        right.next_catchain_seqno = 7;
        Ok((left, right))
    }).unwrap();
    shards
}

#[test]
fn test_shard_hashes_lookup() {
    let shards = two_shards_workchain();
    let left = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0x4000_0000_0000_0000).unwrap();
    let right = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0xc000_0000_0000_0000).unwrap();

    assert!(shards.has_workchain(BASE_WORKCHAIN_ID).unwrap());
    assert!(!shards.has_workchain(1).unwrap());

    let record = shards.get_shard(&left).unwrap().unwrap();
    assert_eq!(record.shard(), &left);
    assert_eq!(record.block_id().seq_no(), 10);
    assert!(shards.get_shard(&ShardIdent::full(BASE_WORKCHAIN_ID)).unwrap().is_none());

    // descendant of a registered shard resolves to it
    let grandchild = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0xe000_0000_0000_0000).unwrap();
    let record = shards.find_shard(&grandchild).unwrap().unwrap();
    assert_eq!(record.shard(), &right);
    assert!(shards.find_shard(&ShardIdent::full(BASE_WORKCHAIN_ID)).unwrap().is_none());

    let record = shards.find_shard_by_prefix(
        &AccountIdPrefixFull::workchain(BASE_WORKCHAIN_ID, 0x9000_0000_0000_0000)
    ).unwrap().unwrap();
    assert_eq!(record.shard(), &right);

    let neighbours = shards.get_neighbours(&left).unwrap();
    assert_eq!(neighbours.len(), 1);
    assert_eq!(neighbours[0].shard(), &right);

    let intersecting = shards.get_intersecting(&ShardIdent::full(BASE_WORKCHAIN_ID)).unwrap();
    assert_eq!(intersecting.len(), 2);

    let mut count = 0;
    shards.iterate_shards(|shard, _descr| {
        assert_eq!(shard.workchain_id(), BASE_WORKCHAIN_ID);
        count += 1;
        Ok(true)
    }).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_calc_shard_cc_seqno() {
    let shards = two_shards_workchain();
    let left = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0x4000_0000_0000_0000).unwrap();
    let left_child = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0x2000_0000_0000_0000).unwrap();

    assert_eq!(shards.calc_shard_cc_seqno(&left).unwrap(), 5);
    assert_eq!(shards.calc_shard_cc_seqno(&left_child).unwrap(), 5);
    // merged shard continues after both of its children
    assert_eq!(shards.calc_shard_cc_seqno(&ShardIdent::full(BASE_WORKCHAIN_ID)).unwrap(), 8);
    assert!(shards.calc_shard_cc_seqno(&ShardIdent::masterchain()).is_err());
    assert!(shards.calc_shard_cc_seqno(&ShardIdent::full(5)).is_err());
}

#[test]
fn test_shard_hashes_merge_and_update() {
    let mut shards = two_shards_workchain();
    let full = ShardIdent::full(BASE_WORKCHAIN_ID);
    let right = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0xc000_0000_0000_0000).unwrap();

    shards.update_shard(&right, |mut descr| {
        descr.seq_no += 1;
        Ok(descr)
    }).unwrap();
    assert_eq!(shards.get_shard(&right).unwrap().unwrap().descr().seq_no, 21);
    assert!(shards.update_shard(&full, |descr| Ok(descr)).is_err());

    shards.merge_shards(&full, |left, right| {
        let mut descr = left;
        descr.seq_no = std::cmp::max(descr.seq_no, right.seq_no) + 1;
        Ok(descr)
    }).unwrap();
    assert_eq!(shards.get_shard(&full).unwrap().unwrap().descr().seq_no, 22);
    assert!(shards.merge_shards(&full, |left, _| Ok(left)).is_err());
    assert!(shards.split_shard(&ShardIdent::full(3), |descr| Ok((descr.clone(), descr))).is_err());
}

#[test]
fn test_serialization_shard_fees() {
    let mut shard_fees = ShardFees::default();

    for n in 1..12u32 {
        let shard = ShardIdent::full(n as i32);
        shard_fees.store_shard_fees(
            &shard,
            CurrencyCollection::with_grams(n as u64 * 100),
            CurrencyCollection::with_grams(n as u64)
        ).unwrap();
        assert!(!shard_fees.is_empty());
    }
    assert_eq!(shard_fees.root_extra().fees, CurrencyCollection::with_grams(6600));
    assert_eq!(shard_fees.root_extra().create, CurrencyCollection::with_grams(66));

    write_read_and_assert(shard_fees);
}

fn build_old_mc_blocks(key_blocks: &[u32]) -> OldMcBlocksInfo {
    let mut prev_blocks = OldMcBlocksInfo::default();
    for seq_no in 0..=20u32 {
        let id = KeyExtBlkRef {
            key: key_blocks.contains(&seq_no),
            blk_ref: test_ext_blk_ref(seq_no),
        };
        prev_blocks.add(&id).unwrap();
    }
    prev_blocks
}

#[test]
fn test_get_next_prev_key_block() {
    let prev_blocks = build_old_mc_blocks(&[0, 5, 12, 17]);

    let seqno = |id: Option<ExtBlkRef>| id.map(|id| id.seq_no);

    assert_eq!(seqno(prev_blocks.get_prev_key_block(4).unwrap()), Some(0));
    assert_eq!(seqno(prev_blocks.get_prev_key_block(5).unwrap()), Some(5));
    assert_eq!(seqno(prev_blocks.get_prev_key_block(11).unwrap()), Some(5));
    assert_eq!(seqno(prev_blocks.get_prev_key_block(100).unwrap()), Some(17));

    assert_eq!(seqno(prev_blocks.get_next_key_block(1).unwrap()), Some(5));
    assert_eq!(seqno(prev_blocks.get_next_key_block(6).unwrap()), Some(12));
    assert_eq!(seqno(prev_blocks.get_next_key_block(17).unwrap()), Some(17));
    assert_eq!(seqno(prev_blocks.get_next_key_block(18).unwrap()), None);

    // walk forward and backward over all key blocks
    let mut forward = vec!();
    let mut seqno_next = 0;
    while let Some(id) = prev_blocks.get_next_key_block(seqno_next).unwrap() {
        seqno_next = id.seq_no + 1;
        forward.push(id.seq_no);
    }
    assert_eq!(forward, vec![0, 5, 12, 17]);

    let no_keys = build_old_mc_blocks(&[]);
    assert!(no_keys.get_prev_key_block(20).unwrap().is_none());
    assert!(no_keys.get_next_key_block(0).unwrap().is_none());
    assert!(OldMcBlocksInfo::default().get_prev_key_block(1).unwrap().is_none());
}

#[test]
fn test_check_key_block() {
    let prev_blocks = build_old_mc_blocks(&[5]);

    let blk = test_ext_blk_ref(5);
    let id = BlockIdExt::with_params(ShardIdent::masterchain(), 5, blk.root_hash.clone(), blk.file_hash.clone());
    prev_blocks.check_block(&id).unwrap();
    prev_blocks.check_key_block(&id, Some(true)).unwrap();
    assert!(prev_blocks.check_key_block(&id, Some(false)).is_err());

    let mut fake_id = id.clone();
    fake_id.root_hash = UInt256::from([123; 32]);
    assert!(prev_blocks.check_block(&fake_id).is_err());

    let mut fake_id = id.clone();
    fake_id.file_hash = UInt256::from([123; 32]);
    assert!(prev_blocks.check_block(&fake_id).is_err());

    let mut fake_id = id.clone();
    fake_id.shard_id = ShardIdent::with_workchain_id(BASE_WORKCHAIN_ID).unwrap();
    assert!(prev_blocks.check_block(&fake_id).is_err());

    let mut fake_id = id;
    fake_id.seq_no = 21;
    assert!(prev_blocks.check_block(&fake_id).is_err());
}

#[test]
fn test_counters() {
    let mut cell = BuilderData::new();
    cell.append_u32(1600000000).unwrap();
    cell.append_u64(4).unwrap();
    cell.append_u64(3).unwrap();
    cell.append_u64(2).unwrap();
    let counters = Counters::construct_from_cell(cell.into_cell().unwrap()).unwrap();
    assert_eq!(counters.total(), 4);
    assert_eq!(counters.last_updated(), 1600000000);
    write_read_and_assert(counters);

    // non zero total must have update time
    let mut cell = BuilderData::new();
    cell.append_u32(0).unwrap();
    cell.append_u64(4).unwrap();
    cell.append_u64(0).unwrap();
    cell.append_u64(0).unwrap();
    assert!(Counters::construct_from_cell(cell.into_cell().unwrap()).is_err());

    write_read_and_assert(CreatorStats::default());
}
