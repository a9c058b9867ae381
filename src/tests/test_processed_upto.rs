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
use crate::{write_read_and_assert, MsgEnvelope, ShardDescr, SHARD_FULL};

const LEFT: u64 = 0x4000_0000_0000_0000;
const RIGHT: u64 = 0xc000_0000_0000_0000;

fn hash(byte: u8) -> UInt256 {
    UInt256::from([byte; 32])
}

fn entry(shard: u64, mc_seqno: u32, lt: u64, hash_byte: u8) -> MsgProcessedUpto {
    MsgProcessedUpto::with_params(shard, mc_seqno, lt, hash(hash_byte))
}

fn descr(
    src: AccountIdPrefixFull,
    cur: AccountIdPrefixFull,
    next: AccountIdPrefixFull,
    dst: AccountIdPrefixFull,
    created_lt: u64,
    enqueued_lt: u64,
    hash_byte: u8,
) -> EnqueuedMsgDescr {
    EnqueuedMsgDescr {
        src_prefix: src,
        dst_prefix: dst,
        cur_prefix: cur,
        next_prefix: next,
        created_lt,
        enqueued_lt,
        hash: hash(hash_byte),
        envelope: MsgEnvelope::default(),
    }
}

fn wc0(prefix: u64) -> AccountIdPrefixFull {
    AccountIdPrefixFull::workchain(0, prefix)
}

fn snapshots(mc_seqno: u32, mc_end_lt: u64, shard_end_lt: u64) -> McShardsSnapshots {
    let mut shards = ShardHashes::default();
    shards.add_workchain(0, 1, UInt256::default(), UInt256::default()).unwrap();
    shards.update_shard(&ShardIdent::full(0), |_| Ok(ShardDescr {
        seq_no: 15,
        end_lt: shard_end_lt,
        ..ShardDescr::default()
    })).unwrap();
    let mut snapshots = McShardsSnapshots::default();
    snapshots.add(mc_seqno, mc_end_lt, shards);
    snapshots
}

fn collection(owner: u64, list: Vec<MsgProcessedUpto>) -> MsgProcessedUptoCollection {
    MsgProcessedUptoCollection {
        owner: ShardIdent::with_tagged_prefix(0, owner).unwrap(),
        list,
    }
}

#[test]
fn test_processed_upto_contains() {
    let upper = entry(SHARD_FULL, 10, 100, 5);
    assert!(upper.contains(&upper));
    assert!(upper.contains(&entry(LEFT, 10, 100, 5)));
    assert!(upper.contains(&entry(LEFT, 9, 99, 7)));
    assert!(upper.contains(&entry(SHARD_FULL, 10, 100, 4)));
    assert!(!upper.contains(&entry(SHARD_FULL, 10, 100, 6)));
    assert!(!upper.contains(&entry(SHARD_FULL, 11, 90, 0)));
    assert!(!upper.contains(&entry(SHARD_FULL, 9, 101, 0)));
    assert!(!entry(LEFT, 10, 100, 5).contains(&entry(SHARD_FULL, 1, 1, 0)));
    assert!(!entry(LEFT, 10, 100, 5).contains(&entry(RIGHT, 1, 1, 0)));
}

#[test]
fn test_compactify_makes_antichain() {
    let mut c = collection(SHARD_FULL, vec![
        entry(LEFT, 3, 30, 1),
        entry(SHARD_FULL, 5, 50, 1),
        entry(SHARD_FULL, 4, 40, 9),
        entry(RIGHT, 7, 20, 1),
        entry(SHARD_FULL, 5, 50, 1),
        entry(0x2000_0000_0000_0000, 6, 45, 1),
        entry(SHARD_FULL, 2, 60, 1),
    ]);
    assert!(!c.is_reduced());
    assert!(c.compactify());
    assert!(c.is_reduced());
    for i in 0..c.list.len() {
        for j in 0..c.list.len() {
            if i != j {
                assert!(!c.list[i].contains(&c.list[j]), "{} contains {}", c.list[i], c.list[j]);
            }
        }
    }
    assert_eq!(c.list.len(), 4);
    assert!(c.contains_value(&entry(SHARD_FULL, 5, 50, 1)));
    assert!(c.contains_value(&entry(LEFT, 3, 30, 1)));

    // nothing more to remove
    assert!(!c.compactify());
    assert_eq!(c.list.len(), 4);
}

#[test]
fn test_insert_dominated_keeps_processed_set() {
    let snapshots = snapshots(10, 300, 500);
    let mut c = MsgProcessedUptoCollection::new(ShardIdent::full(0));
    assert!(c.insert(10, 100, hash(5)).unwrap());
    assert!(!c.insert(9, 90, hash(1)).unwrap());
    assert!(!c.insert(10, 100, hash(5)).unwrap());
    assert_eq!(c.list().len(), 1);

    let messages = vec![
        descr(wc0(0x11), wc0(0x11), wc0(0x22), wc0(0x22), 50, 50, 1),
        descr(wc0(0x11), wc0(0x11), wc0(0x22), wc0(0x22), 95, 95, 1),
        descr(wc0(0x11), wc0(0x11), wc0(0x22), wc0(0x22), 150, 150, 1),
        descr(wc0(0x11), wc0(0x11), wc0(0x22), wc0(0x22), 100, 100, 4),
        descr(wc0(0x11), wc0(0x11), wc0(0x22), wc0(0x22), 100, 100, 6),
    ];
    let before: Vec<bool> = messages.iter()
        .map(|m| c.already_processed(m, &snapshots).unwrap())
        .collect();
    assert_eq!(before, vec![true, true, false, true, false]);

    // forced dominated entry changes nothing and is dropped on compactify
    c.list.push(entry(SHARD_FULL, 9, 90, 1));
    let after: Vec<bool> = messages.iter()
        .map(|m| c.already_processed(m, &snapshots).unwrap())
        .collect();
    assert_eq!(before, after);
    assert!(c.compactify());
    assert_eq!(c.list().len(), 1);
}

#[test]
fn test_already_processed() {
    let snapshots = snapshots(10, 300, 500);
    let c = collection(SHARD_FULL, vec![entry(SHARD_FULL, 10, 100, 5)]);
    let mc = AccountIdPrefixFull::any_masterchain();

    // next hop is out of the owner shard
    let foreign = descr(wc0(0x11), wc0(0x11), mc, mc, 50, 50, 1);
    assert!(!c.already_processed(&foreign, &snapshots).unwrap());

    // from masterchain: checked against its end lt
    let from_mc = descr(mc, mc, wc0(0x22), wc0(0x22), 50, 250, 1);
    assert!(c.already_processed(&from_mc, &snapshots).unwrap());
    let late = descr(mc, mc, wc0(0x22), wc0(0x22), 50, 350, 1);
    assert!(!c.already_processed(&late, &snapshots).unwrap());

    // unknown masterchain block
    let c = collection(SHARD_FULL, vec![entry(SHARD_FULL, 11, 100, 5)]);
    assert!(c.already_processed(&from_mc, &snapshots).is_err());
    assert!(!c.can_check_processed(&snapshots));
}

#[test]
fn test_already_processed_by_shard_end_lt() {
    let snapshots = snapshots(10, 300, 500);
    let c = collection(LEFT, vec![entry(LEFT, 10, 1000, 5)]);
    assert!(c.can_check_processed(&snapshots));

    // current address is in the right half: the shard chain end lt decides
    let early = descr(wc0(RIGHT), wc0(RIGHT), wc0(0x11), wc0(0x11), 50, 400, 1);
    assert!(c.already_processed(&early, &snapshots).unwrap());
    let late = descr(wc0(RIGHT), wc0(RIGHT), wc0(0x11), wc0(0x11), 50, 600, 1);
    assert!(!c.already_processed(&late, &snapshots).unwrap());

    // same workchain and generated inside the watermark shard
    let local = descr(wc0(0x22), wc0(0x22), wc0(0x11), wc0(0x11), 50, 600, 1);
    assert!(c.already_processed(&local, &snapshots).unwrap());

    // cross-workchain message routed through the left half
    let cross = descr(
        AccountIdPrefixFull::workchain(-1, 0), wc0(0x22), wc0(0x11), wc0(0x11), 50, 600, 1
    );
    assert!(!c.already_processed(&cross, &snapshots).unwrap());
}

#[test]
fn test_split_and_combine() {
    let mut c = collection(SHARD_FULL, vec![
        entry(SHARD_FULL, 5, 50, 1),
        entry(RIGHT, 6, 70, 1),
        entry(0xe000_0000_0000_0000, 7, 80, 1),
    ]);
    let original = c.clone();

    let mut left = c.clone();
    left.split(ShardIdent::with_tagged_prefix(0, LEFT).unwrap()).unwrap();
    assert_eq!(left.list(), &[entry(LEFT, 5, 50, 1)][..]);

    c.split(ShardIdent::with_tagged_prefix(0, RIGHT).unwrap()).unwrap();
    // the narrowed full-shard entry is dominated by the right one
    assert_eq!(c.list(), &[entry(RIGHT, 6, 70, 1), entry(0xe000_0000_0000_0000, 7, 80, 1)][..]);
    assert_eq!(c.owner(), &ShardIdent::with_tagged_prefix(0, RIGHT).unwrap());

    // any descendant is accepted, not only a direct child
    let mut grandchild = original.clone();
    grandchild.split(ShardIdent::with_tagged_prefix(0, 0x2000_0000_0000_0000).unwrap()).unwrap();
    assert_eq!(grandchild.list(), &[entry(0x2000_0000_0000_0000, 5, 50, 1)][..]);
    assert_eq!(grandchild.owner(), &ShardIdent::with_tagged_prefix(0, 0x2000_0000_0000_0000).unwrap());

    // same owner leaves the collection as is
    let mut same = original.clone();
    same.split(ShardIdent::full(0)).unwrap();
    assert_eq!(same, original);

    let mut wrong = original.clone();
    assert!(wrong.split(ShardIdent::full(1)).is_err());
    assert!(wrong.split(ShardIdent::with_tagged_prefix(1, LEFT).unwrap()).is_err());
    assert_eq!(wrong, original);
    let mut from_left = left.clone();
    assert!(from_left.split(ShardIdent::full(0)).is_err());
    assert!(from_left.split(ShardIdent::with_tagged_prefix(0, 0xa000_0000_0000_0000).unwrap()).is_err());

    left.combine_with(&c).unwrap();
    assert_eq!(left.owner(), &ShardIdent::full(0));
    assert!(left.is_reduced());
    assert_eq!(left.list().len(), 3);
    assert!(left.contains(&c));
    assert!(left.contains_value(&entry(LEFT, 5, 50, 1)));

    let mut not_sibling = collection(LEFT, vec![]);
    assert!(not_sibling.combine_with(&original).is_err());
}

#[test]
fn test_simple_update() {
    let prev = collection(SHARD_FULL, vec![entry(LEFT, 5, 50, 1), entry(RIGHT, 6, 40, 1)]);

    assert_eq!(prev.is_simple_update_of(&prev), (true, None));

    let mut next = prev.clone();
    next.insert(7, 60, hash(2)).unwrap();
    next.compactify();
    assert_eq!(next.is_simple_update_of(&prev), (true, Some(entry(SHARD_FULL, 7, 60, 2))));

    let mut two_new = prev.clone();
    two_new.list.push(entry(LEFT, 8, 55, 1));
    two_new.list.push(entry(RIGHT, 8, 45, 1));
    assert!(!two_new.is_simple_update_of(&prev).0);

    let lost = collection(SHARD_FULL, vec![entry(LEFT, 5, 50, 1)]);
    assert_eq!(lost.is_simple_update_of(&prev), (false, None));
}

#[test]
fn test_for_each_mc_seqno() {
    let c = collection(SHARD_FULL, vec![
        entry(LEFT, 9, 50, 1),
        entry(RIGHT, 3, 60, 1),
        entry(0xe000_0000_0000_0000, 9, 40, 1),
    ]);
    let mut seqnos = Vec::new();
    assert!(c.for_each_mc_seqno(|mc_seqno| {
        seqnos.push(mc_seqno);
        Ok(true)
    }).unwrap());
    assert_eq!(seqnos, vec![3, 9]);
    assert_eq!(c.min_mc_seqno(), Some(3));
    assert!(!c.for_each_mc_seqno(|_| Ok(false)).unwrap());
}

#[test]
fn test_pack_unpack() {
    let c = collection(SHARD_FULL, vec![entry(LEFT, 5, 50, 1), entry(RIGHT, 6, 40, 2)]);
    let info = write_read_and_assert(c.pack().unwrap());
    assert_eq!(info.len().unwrap(), 2);
    let value = info.get(&ProcessedInfoKey::with_params(RIGHT, 6)).unwrap().unwrap();
    assert_eq!(value, ProcessedUpto::with_params(40, hash(2)));

    let unpacked = MsgProcessedUptoCollection::unpack(ShardIdent::full(0), &info).unwrap();
    assert_eq!(unpacked, c);

    let not_reduced = collection(SHARD_FULL, vec![entry(LEFT, 5, 50, 1), entry(SHARD_FULL, 6, 60, 2)]);
    assert!(not_reduced.pack().is_err());

    let mut bad = ProcessedInfo::default();
    bad.set(&ProcessedInfoKey::with_params(0, 1), &ProcessedUpto::default()).unwrap();
    assert!(MsgProcessedUptoCollection::unpack(ShardIdent::full(0), &bad).is_err());
}
