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
    write_read_and_assert, DepthBalanceInfo, EnqueuedMsg, IntermediateAddress, InternalMessageHeader,
    MsgEnvelope, ShardAccount, StdAddress,
};

fn enqueued(src: u8, dst: u8, lt: u64) -> EnqueuedMsg {
    let mut header = InternalMessageHeader::with_addresses(
        StdAddress::with_address(0, UInt256::from([src; 32])),
        StdAddress::with_address(0, UInt256::from([dst; 32])),
        CurrencyCollection::with_grams(1000),
    );
    header.created_lt = lt;
    let env = MsgEnvelope::with_routing(
        header.serialize_message().unwrap(),
        Grams::from(10),
        IntermediateAddress::full_src(),
        IntermediateAddress::full_dest(),
    );
    EnqueuedMsg::with_param(lt, &env).unwrap()
}

fn make_state(
    shard: ShardIdent,
    seq_no: u32,
    balances: &[(u8, u64)],
    messages: &[(u8, u8, u64)],
    fees: u64,
) -> ShardStateUnsplit {
    let mut accounts = ShardAccounts::default();
    for (id, balance) in balances {
        let mut b = BuilderData::new();
        b.append_u8(*id).unwrap();
        accounts.insert(
            &UInt256::from([*id; 32]),
            &ShardAccount::with_params(b.into_cell().unwrap(), UInt256::default(), 1),
            0,
            &CurrencyCollection::with_grams(*balance)
        ).unwrap();
    }
    let mut queue = OutMsgQueue::default();
    for (src, dst, lt) in messages {
        queue.insert(&enqueued(*src, *dst, *lt)).unwrap();
    }
    let mut processed = MsgProcessedUptoCollection::new(shard);
    processed.insert(5, 100, UInt256::from([1; 32])).unwrap();
    let info = OutMsgQueueInfo::with_params(queue, processed.pack().unwrap(), IhrPendingInfo::default());

    let mut state = ShardStateUnsplit::with_ident(shard);
    state.set_global_id(42);
    state.set_seq_no(seq_no);
    state.set_gen_time(1_600_000_000 + seq_no);
    state.set_gen_lt(seq_no as u64 * 1000);
    state.set_min_ref_mc_seqno(seq_no);
    state.set_overload_history(3);
    state.write_accounts(&accounts).unwrap();
    state.write_out_msg_queue_info(&info).unwrap();
    state.set_total_balance(accounts.full_balance().clone());
    state.set_total_validator_fees(CurrencyCollection::with_grams(fees));
    state
}

fn block_id(state: &ShardStateUnsplit) -> (BlockIdExt, Cell) {
    let root = state.serialize().unwrap();
    let id = BlockIdExt::with_params(*state.shard(), state.seq_no(), root.repr_hash(), UInt256::from([9; 32]));
    (id, root)
}

fn unpack(state: &ShardStateUnsplit) -> ShardStateSnapshot {
    let (id, root) = block_id(state);
    ShardStateSnapshot::unpack(&id, root).unwrap()
}

fn left() -> ShardIdent {
    ShardIdent::with_tagged_prefix(0, 0x4000_0000_0000_0000).unwrap()
}

fn right() -> ShardIdent {
    ShardIdent::with_tagged_prefix(0, 0xc000_0000_0000_0000).unwrap()
}

#[test]
fn test_shard_state_serialization() {
    let state = make_state(ShardIdent::full(0), 10, &[(0x11, 100), (0x99, 50)], &[(0x11, 0x99, 7)], 3);
    let state = write_read_and_assert(state);
    assert_eq!(state.read_accounts().unwrap().len().unwrap(), 2);
    assert_eq!(state.read_out_msg_queue_info().unwrap().out_queue().len().unwrap(), 1);
    assert!(!state.is_key_state());
    assert!(state.read_custom().unwrap().is_none());

    let mut b = BuilderData::new();
    b.append_u32(0x9023afe3).unwrap();
    assert!(ShardStateUnsplit::construct_from_cell(b.into_cell().unwrap()).is_err());
}

#[test]
fn test_unpack_state() {
    let state = make_state(ShardIdent::full(0), 10, &[(0x11, 100), (0x99, 50)], &[(0x11, 0x99, 7)], 3);
    let snapshot = unpack(&state);
    assert_eq!(snapshot.seq_no(), 10);
    assert_eq!(snapshot.global_id(), 42);
    assert_eq!(snapshot.total_balance(), &CurrencyCollection::with_grams(150));
    assert_eq!(snapshot.accounts().len().unwrap(), 2);
    assert_eq!(snapshot.out_queue().len().unwrap(), 1);
    assert_eq!(snapshot.processed_upto().list().len(), 1);
    assert!(snapshot.mc_extra().is_none());
    assert!(snapshot.global_balance().is_none());

    // back to the same record
    assert_eq!(snapshot.pack().unwrap(), state);
}

#[test]
fn test_unpack_state_inconsistent() {
    let state = make_state(ShardIdent::full(0), 10, &[(0x11, 100)], &[], 0);
    let (id, root) = block_id(&state);

    let mut wrong = id.clone();
    wrong.root_hash = UInt256::default();
    assert!(ShardStateSnapshot::unpack(&wrong, root.clone()).is_err());

    let mut wrong = id.clone();
    wrong.seq_no = 11;
    assert!(ShardStateSnapshot::unpack(&wrong, root.clone()).is_err());

    let mut wrong = id.clone();
    wrong.shard_id = left();
    assert!(ShardStateSnapshot::unpack(&wrong, root).is_err());

    // declared balance does not match the accounts
    let mut broken = state.clone();
    broken.set_total_balance(CurrencyCollection::with_grams(101));
    let (id, root) = block_id(&broken);
    assert!(ShardStateSnapshot::unpack(&id, root).is_err());

    // masterchain state must carry its extra
    let mc_state = make_state(ShardIdent::masterchain(), 1, &[], &[], 0);
    let (id, root) = block_id(&mc_state);
    assert!(ShardStateSnapshot::unpack(&id, root).is_err());
}

#[test]
fn test_unpack_state_forged_accounts_extra() {
    let mut state = make_state(ShardIdent::full(0), 10, &[(0x11, 100), (0x22, 50)], &[], 0);
    let accounts = state.read_accounts().unwrap();
    assert_eq!(accounts.full_balance(), &CurrencyCollection::with_grams(150));

    // outer extra and declared total agree with each other but not with the accounts
    let forged = CurrencyCollection::with_grams(1_000_000);
    let mut b = BuilderData::new();
    b.append_bit_one().unwrap();
    b.checked_append_reference(accounts.data().cloned().unwrap()).unwrap();
    DepthBalanceInfo::new(0, &forged).unwrap().write_to(&mut b).unwrap();
    state.accounts = ChildCell::with_cell(b.into_cell().unwrap());
    state.set_total_balance(forged);

    let (id, root) = block_id(&state);
    assert!(ShardStateSnapshot::unpack(&id, root).is_err());
    assert!(state.read_accounts().is_err());
}

#[test]
fn test_merge_sibling_states() {
    let mut left_state = unpack(&make_state(left(), 10, &[(0x11, 100)], &[(0x11, 0x99, 7)], 4));
    let mut right_state = unpack(&make_state(right(), 12, &[(0x99, 50)], &[(0x99, 0x11, 9)], 3));

    left_state.merge_with(&mut right_state).unwrap();

    assert_eq!(left_state.shard(), &ShardIdent::full(0));
    assert_eq!(left_state.seq_no(), 12);
    assert_eq!(left_state.id().root_hash, UInt256::default());
    assert_eq!(left_state.id().file_hash, UInt256::default());
    assert_eq!(left_state.total_balance().grams, Grams::from(150));
    assert_eq!(left_state.total_validator_fees(), &CurrencyCollection::with_grams(7));
    assert!(left_state.accounts().account(&UInt256::from([0x11; 32])).unwrap().is_some());
    assert!(left_state.accounts().account(&UInt256::from([0x99; 32])).unwrap().is_some());
    assert_eq!(left_state.out_queue().len().unwrap(), 2);
    assert_eq!(left_state.processed_upto().owner(), &ShardIdent::full(0));
    assert_eq!(left_state.processed_upto().list().len(), 2);
    assert_eq!(left_state.overload_history(), 0);
    assert_eq!(left_state.min_ref_mc_seqno(), 10);

    // the sibling is consumed
    assert!(!right_state.is_valid());
    assert!(right_state.pack().is_err());
    assert!(right_state.split(&right()).is_err());
    let mut another = unpack(&make_state(right(), 12, &[(0x99, 50)], &[], 0));
    assert!(right_state.merge_with(&mut another).is_err());
    assert!(another.is_valid());

    // the merged state can be stored again
    let merged = write_read_and_assert(left_state.pack().unwrap());
    assert_eq!(merged.total_balance(), &CurrencyCollection::with_grams(150));
}

#[test]
fn test_merge_not_siblings() {
    let mut left_state = unpack(&make_state(left(), 10, &[(0x11, 100)], &[], 0));
    let narrow = ShardIdent::with_tagged_prefix(0, 0xa000_0000_0000_0000).unwrap();
    let mut other = unpack(&make_state(narrow, 10, &[(0x99, 50)], &[], 0));
    let before = left_state.clone();

    assert!(left_state.merge_with(&mut other).is_err());
    assert_eq!(left_state, before);
    assert!(other.is_valid());

    // a shard is not a sibling of itself
    let mut twin = left_state.clone();
    assert!(twin.merge_with(&mut left_state.clone()).is_err());
    assert_eq!(twin, before);
}

#[test]
fn test_split_state() {
    let state = make_state(
        ShardIdent::full(0), 10,
        &[(0x11, 100), (0x33, 20), (0x99, 50), (0xee, 5)],
        &[(0x11, 0x99, 7), (0x33, 0xee, 9), (0x99, 0x11, 8)],
        7
    );
    let full = unpack(&state);

    let mut left_state = full.clone();
    left_state.split(&left()).unwrap();
    assert_eq!(left_state.shard(), &left());
    assert_eq!(left_state.seq_no(), 10);
    assert_eq!(left_state.id().root_hash, UInt256::default());
    assert_eq!(left_state.accounts().len().unwrap(), 2);
    assert_eq!(left_state.total_balance(), &CurrencyCollection::with_grams(120));
    assert_eq!(left_state.total_validator_fees(), &CurrencyCollection::with_grams(4));
    assert_eq!(left_state.out_queue().len().unwrap(), 2);
    assert_eq!(left_state.overload_history(), 0);
    assert_eq!(left_state.processed_upto().owner(), &left());
    assert_eq!(left_state.processed_upto().list()[0].shard, left().shard_prefix_with_tag());

    let mut right_state = full.clone();
    right_state.split(&right()).unwrap();
    assert_eq!(right_state.total_balance(), &CurrencyCollection::with_grams(55));
    assert_eq!(right_state.total_validator_fees(), &CurrencyCollection::with_grams(3));
    assert_eq!(right_state.out_queue().len().unwrap(), 1);

    // merging the halves restores the balances and accounts
    left_state.merge_with(&mut right_state).unwrap();
    assert_eq!(left_state.shard(), full.shard());
    assert_eq!(left_state.total_balance(), full.total_balance());
    assert_eq!(left_state.total_validator_fees(), full.total_validator_fees());
    assert_eq!(left_state.accounts(), full.accounts());
    assert_eq!(left_state.out_queue(), full.out_queue());

    let mut wrong = full.clone();
    let grandchild = ShardIdent::with_tagged_prefix(0, 0x2000_0000_0000_0000).unwrap();
    assert!(wrong.split(&grandchild).is_err());
    assert_eq!(wrong, full);
}

#[test]
fn test_split_fees_with_extra_currencies() {
    let mut fees = CurrencyCollection::with_grams(9);
    fees.set_other(7, 5).unwrap();
    fees.set_other(8, 1).unwrap();

    let left = split_fees(&fees, true).unwrap();
    let right = split_fees(&fees, false).unwrap();
    assert_eq!(left.grams, Grams::from(5));
    assert_eq!(right.grams, Grams::from(4));
    assert_eq!(left.get_other(7).unwrap(), Some(VarUInteger32::from_two_u128(0, 3).unwrap()));
    assert_eq!(right.get_other(7).unwrap(), Some(VarUInteger32::from_two_u128(0, 2).unwrap()));
    assert!(right.get_other(8).unwrap().is_none());
    assert_eq!(left.checked_add(&right), fees);
}
