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
use crate::{write_read_and_assert, BASE_WORKCHAIN_ID, MASTERCHAIN_ID, ShardIdent, SHARD_FULL};
use std::collections::HashSet;

fn descr(n: u8, weight: u64) -> ValidatorDescr {
    ValidatorDescr::with_params(
        SigPubKey::from_bytes(&[n; 32]).unwrap(),
        weight,
        Some(UInt256::from([n; 32]))
    )
}

fn vset(weights: &[u64], main: u16) -> ValidatorSet {
    let list = weights.iter().enumerate().map(|(i, w)| descr(i as u8 + 1, *w)).collect();
    ValidatorSet::new(100, 200, main, list).unwrap()
}

fn cc_config(shuffle: bool, isolate: bool, shard_validators_num: u32) -> CatchainConfig {
    CatchainConfig {
        isolate_mc_validators: isolate,
        shuffle_mc_validators: shuffle,
        mc_catchain_lifetime: 250,
        shard_catchain_lifetime: 250,
        shard_validators_lifetime: 1000,
        shard_validators_num,
    }
}

fn keys(subset: &[ValidatorDescr]) -> Vec<u8> {
    subset.iter().map(|vd| vd.public_key.key_bytes()[0]).collect()
}

#[test]
fn test_validator_info() {
    write_read_and_assert(ValidatorInfo::default());
    write_read_and_assert(ValidatorInfo::with_params(0xdeadbeef, 17, true));
    write_read_and_assert(ValidatorBaseInfo::with_params(0xdeadbeef, 17));
}

#[test]
fn test_validator_descr() {
    write_read_and_assert(descr(1, 100));
    let mut vd = descr(2, 7);
    vd.adnl_addr = None;
    let vd = write_read_and_assert(vd);
    assert!(vd.adnl_addr.is_none());

    // node id depends on the key only
    assert_eq!(descr(3, 1).compute_node_id_short(), descr(3, 2).compute_node_id_short());
    assert_ne!(descr(3, 1).compute_node_id_short(), descr(4, 1).compute_node_id_short());
}

#[test]
fn test_validator_set_new() {
    let set = vset(&[10, 20, 30], 2);
    assert_eq!(set.total(), 3);
    assert_eq!(set.main(), 2);
    assert_eq!(set.total_weight(), 60);
    assert_eq!(set.utime_since(), 100);
    assert_eq!(set.utime_until(), 200);
    let sums: Vec<u64> = set.list().iter().map(|vd| vd.prev_weight_sum).collect();
    assert_eq!(sums, vec![0, 10, 30]);
    assert!(set.validator_by_pub_key(&[2; 32]).is_some());
    assert!(set.validator_by_pub_key(&[9; 32]).is_none());

    let set = write_read_and_assert(set);
    assert_eq!(set.list()[2].prev_weight_sum, 30);

    assert!(ValidatorSet::new(0, 1, 1, vec![]).is_err());
    assert!(ValidatorSet::new(0, 1, 0, vec![descr(1, 1)]).is_err());
    assert!(ValidatorSet::new(0, 1, 2, vec![descr(1, 1)]).is_err());
    assert!(ValidatorSet::new(0, 1, 1, vec![descr(1, u64::MAX), descr(2, 1)]).is_err());
}

#[test]
fn test_at_weight() {
    let set = vset(&[10, 20, 30], 3);
    assert_eq!(set.at_weight(0).unwrap().weight, 10);
    assert_eq!(set.at_weight(9).unwrap().weight, 10);
    assert_eq!(set.at_weight(10).unwrap().weight, 20);
    assert_eq!(set.at_weight(29).unwrap().weight, 20);
    assert_eq!(set.at_weight(30).unwrap().weight, 30);
    assert_eq!(set.at_weight(59).unwrap().weight, 30);
    assert!(set.at_weight(60).is_err());
}

#[test]
fn test_calc_mc_subset() {
    let set = vset(&[5, 4, 3, 2, 1, 1], 4);
    let (subset, hash) = set.calc_subset(&cc_config(false, false, 3), SHARD_FULL, MASTERCHAIN_ID, 7).unwrap();
    assert_eq!(keys(&subset), vec![1, 2, 3, 4]);
    // masterchain keeps the real weights
    assert_eq!(subset[0].weight, 5);
    assert_eq!(hash, ValidatorSet::calc_subset_hash_short(&subset, 7).unwrap());
    assert_ne!(hash, ValidatorSet::calc_subset_hash_short(&subset, 8).unwrap());
}

#[test]
fn test_calc_mc_subset_shuffle() {
    let set = vset(&[1; 10], 6);
    let config = cc_config(true, false, 3);
    let (subset, _) = set.calc_subset(&config, SHARD_FULL, MASTERCHAIN_ID, 7).unwrap();
    let mut sorted = keys(&subset);
    sorted.sort();
    assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);

    let (again, _) = set.calc_subset(&config, SHARD_FULL, MASTERCHAIN_ID, 7).unwrap();
    assert_eq!(subset, again);

    // the order depends on the session
    let orders: HashSet<Vec<u8>> = (0..10)
        .map(|cc_seqno| keys(&set.calc_subset(&config, SHARD_FULL, MASTERCHAIN_ID, cc_seqno).unwrap().0))
        .collect();
    assert!(orders.len() > 1);
}

#[test]
fn test_calc_shard_subset() {
    let set = vset(&[100, 1, 50, 7, 1, 1, 30, 2], 2);
    let config = cc_config(false, false, 5);
    let shard = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, 0x6000_0000_0000_0000).unwrap();
    let (subset, hash) = set.calc_subset(&config, shard.shard_prefix_with_tag(), BASE_WORKCHAIN_ID, 11).unwrap();

    assert_eq!(subset.len(), 5);
    assert!(subset.iter().all(|vd| vd.weight == 1));
    let unique: HashSet<u8> = keys(&subset).into_iter().collect();
    assert_eq!(unique.len(), 5);
    assert_eq!(hash, ValidatorSet::calc_subset_hash_short(&subset, 11).unwrap());

    let (again, _) = set.calc_subset(&config, shard.shard_prefix_with_tag(), BASE_WORKCHAIN_ID, 11).unwrap();
    assert_eq!(subset, again);

    // subset can't be bigger than the whole set
    let (all, _) = set.calc_subset(&cc_config(false, false, 100), shard.shard_prefix_with_tag(), BASE_WORKCHAIN_ID, 11).unwrap();
    let mut all = keys(&all);
    all.sort();
    assert_eq!(all, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_isolate_mc_validators() {
    let set = vset(&[10, 10, 10, 1, 1, 1, 1, 1], 3);
    let config = cc_config(false, true, 4);
    let (main, _) = set.calc_subset(&config, SHARD_FULL, MASTERCHAIN_ID, 123).unwrap();
    assert_eq!(keys(&main), vec![1, 2, 3]);

    for n in 0..16u64 {
        let shard = ShardIdent::with_tagged_prefix(BASE_WORKCHAIN_ID, (n << 60) | (8 << 56)).unwrap();
        let (shard_validators, _) = set.calc_subset(
            &config, shard.shard_prefix_with_tag(), BASE_WORKCHAIN_ID, 123
        ).unwrap();
        assert_eq!(shard_validators.len(), 4);
        assert!(keys(&shard_validators).iter().all(|k| *k > 3));
    }

    let all_main = vset(&[1, 1], 2);
    assert!(all_main.calc_subset(&config, 0x8000_0000_0000_0000, BASE_WORKCHAIN_ID, 1).is_err());
}

#[test]
fn test_subset_hash_short() {
    let subset = vec![descr(1, 1), descr(2, 1)];
    let hash = ValidatorSet::calc_subset_hash_short(&subset, 1).unwrap();
    let reversed = vec![descr(2, 1), descr(1, 1)];
    assert_ne!(hash, ValidatorSet::calc_subset_hash_short(&reversed, 1).unwrap());
    let mut heavier = subset.clone();
    heavier[0].weight = 2;
    assert_ne!(hash, ValidatorSet::calc_subset_hash_short(&heavier, 1).unwrap());
    let mut no_addr = subset.clone();
    no_addr[0].adnl_addr = None;
    assert_ne!(hash, ValidatorSet::calc_subset_hash_short(&no_addr, 1).unwrap());
    assert_eq!(hash, ValidatorSet::calc_subset_hash_short(&subset, 1).unwrap());
}

#[test]
fn test_prng() {
    let mut a = ValidatorSetPRNG::new(SHARD_FULL, MASTERCHAIN_ID, 5);
    let mut b = ValidatorSetPRNG::new(SHARD_FULL, MASTERCHAIN_ID, 5);
    let mut c = ValidatorSetPRNG::new(SHARD_FULL, MASTERCHAIN_ID, 6);
    let first: Vec<u64> = (0..20).map(|_| a.next_u64()).collect();
    let second: Vec<u64> = (0..20).map(|_| b.next_u64()).collect();
    let third: Vec<u64> = (0..20).map(|_| c.next_u64()).collect();
    assert_eq!(first, second);
    assert_ne!(first, third);

    for range in [1u64, 2, 3, 10, 1000, u64::MAX].iter() {
        for _ in 0..50 {
            assert!(a.next_ranged(*range) < *range);
        }
    }
}
