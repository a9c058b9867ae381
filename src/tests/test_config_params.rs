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
    write_read_and_assert, CatchainConfig, ParamLimits, SigPubKey, BASE_WORKCHAIN_ID,
};

fn descr(n: u8, weight: u64) -> ValidatorDescr {
    ValidatorDescr::with_params(SigPubKey::from_bytes(&[n; 32]).unwrap(), weight, None)
}

fn vset(since: u32, until: u32, first_key: u8, count: u8) -> ValidatorSet {
    let list = (first_key..first_key + count).map(|n| descr(n, 10)).collect();
    ValidatorSet::new(since, until, count as u16, list).unwrap()
}

fn catchain_config(shard_validators_num: u32) -> CatchainConfig {
    CatchainConfig {
        isolate_mc_validators: false,
        shuffle_mc_validators: false,
        mc_catchain_lifetime: 250,
        shard_catchain_lifetime: 250,
        shard_validators_lifetime: 1000,
        shard_validators_num,
    }
}

fn gas_prices() -> GasLimitsPrices {
    let mut prices = GasLimitsPrices {
        gas_price: 655360000,
        gas_limit: 1000000,
        special_gas_limit: 100000000,
        gas_credit: 10000,
        block_gas_limit: 11000000,
        freeze_due_limit: 100000000,
        delete_due_limit: 1000000000,
        flat_gas_limit: 100,
        flat_gas_price: 1000000,
        max_gas_threshold: 0,
    };
    prices.max_gas_threshold = prices.calc_max_gas_threshold();
    prices
}

fn workchain() -> WorkchainDescr {
    let mut descr = WorkchainDescr {
        enabled_since: 1573821854,
        active: true,
        accept_msgs: true,
        zerostate_root_hash: UInt256::from([0x55; 32]),
        zerostate_file_hash: UInt256::from([0xee; 32]),
        version: 1,
        format: WorkchainFormat::Basic(WorkchainFormat1::with_params(0, 0)),
        ..Default::default()
    };
    descr.set_splits(0, 2, 8).unwrap();
    descr
}

#[test]
fn test_simple_params() {
    write_read_and_assert(ConfigParam0 { config_addr: UInt256::from([1; 32]) });
    write_read_and_assert(ConfigParam1 { elector_addr: UInt256::from([2; 32]) });
    write_read_and_assert(ConfigParam8 {
        global_version: GlobalVersion { version: 32, capabilities: 0x1ef }
    });
    write_read_and_assert(ConfigParam15 {
        validators_elected_for: 65536,
        elections_start_before: 32768,
        elections_end_before: 8192,
        stake_held_for: 32768,
    });
    write_read_and_assert(ConfigParam17 {
        min_stake: Grams::from(10_000_000_000_000),
        max_stake: Grams::from(10_000_000_000_000_000),
        min_total_stake: Grams::from(100_000_000_000_000),
        max_stake_factor: 196608,
    });
}

#[test]
fn test_config_param_16() {
    let param = write_read_and_assert(ConfigParam16::with_params(400, 100, 13).unwrap());
    assert_eq!(param.max_main_validators, 100);
    assert!(ConfigParam16::with_params(10, 11, 1).is_err());
    assert!(ConfigParam16::with_params(10, 5, 6).is_err());
    assert!(ConfigParam16::with_params(10, 5, 0).is_err());

    // inconsistent values are not accepted from the wire either
    let wrong = ConfigParam16 { max_validators: 1, max_main_validators: 2, min_validators: 1 };
    let cell = wrong.serialize().unwrap();
    assert!(ConfigParam16::construct_from_cell(cell).is_err());
}

#[test]
fn test_global_version() {
    let version = GlobalVersion { version: 5, capabilities: GlobalCapabilities::CapIhrEnabled as u64 };
    assert!(version.has_capability(GlobalCapabilities::CapIhrEnabled));
    let mut config = ConfigParams::new();
    assert!(!config.has_capability(GlobalCapabilities::CapIhrEnabled));
    assert_eq!(config.global_version(), 0);
    config.set_config(ConfigParamEnum::ConfigParam8(ConfigParam8 { global_version: version })).unwrap();
    assert!(config.has_capability(GlobalCapabilities::CapIhrEnabled));
    assert_eq!(config.global_version(), 5);
}

#[test]
fn test_workchains() {
    let descr = write_read_and_assert(workchain());
    assert!(descr.basic());
    assert_eq!(descr.min_split(), 2);

    let mut extended = workchain();
    extended.format = WorkchainFormat::Extended(WorkchainFormat0::with_params(64, 1023, 8, 2).unwrap());
    let extended = write_read_and_assert(extended);
    assert!(!extended.basic());

    assert!(WorkchainFormat0::with_params(63, 1023, 8, 2).is_err());
    assert!(WorkchainFormat0::with_params(64, 1024, 8, 2).is_err());
    assert!(WorkchainFormat0::with_params(64, 1023, 8, 0).is_err());

    let mut wrong = workchain();
    assert!(wrong.set_splits(3, 2, 8).is_err());
    assert!(wrong.set_splits(0, 9, 8).is_err());
    assert!(wrong.set_splits(0, 2, 61).is_err());

    let mut param = ConfigParam12::default();
    assert!(param.is_empty());
    param.insert(BASE_WORKCHAIN_ID, &descr).unwrap();
    param.insert(77, &extended).unwrap();
    let param = write_read_and_assert(param);
    assert_eq!(param.len().unwrap(), 2);
    assert_eq!(param.get(77).unwrap(), Some(extended));
    assert!(param.get(1).unwrap().is_none());
}

#[test]
fn test_gas_prices() {
    let prices = write_read_and_assert(gas_prices());
    assert_eq!(prices.get_real_gas_price(), 10000);
    assert_eq!(prices.calc_gas_fee(50), 1000000);
    assert_eq!(prices.calc_gas_fee(101), 1000000 + 10000);
    assert_eq!(prices.calc_gas(prices.max_gas_threshold), prices.gas_limit);
    assert_eq!(prices.calc_gas(999999), 0);
    assert_eq!(prices.calc_gas(1000000 + 10000), 101);

    // plain prefix without special limit and flat pricing
    let mut b = BuilderData::new();
    b.append_u8(0xdd).unwrap();
    for value in &[1u64 << 16, 100, 10, 1000, 7, 8] {
        b.append_u64(*value).unwrap();
    }
    let prices = GasLimitsPrices::construct_from_cell(b.into_cell().unwrap()).unwrap();
    assert_eq!(prices.gas_price, 1 << 16);
    assert_eq!(prices.special_gas_limit, 0);
    assert_eq!(prices.flat_gas_limit, 0);
    assert_eq!(prices.max_gas_threshold, 100);

    let mut b = BuilderData::new();
    b.append_u8(0xdf).unwrap();
    assert!(GasLimitsPrices::construct_from_cell(b.into_cell().unwrap()).is_err());
}

#[test]
fn test_forward_prices() {
    let prices = MsgForwardPrices {
        lump_price: 1000000,
        bit_price: 65536000,
        cell_price: 6553600000,
        ihr_price_factor: 98304,
        first_frac: 21845,
        next_frac: 21845,
    };
    let prices = write_read_and_assert(prices);
    assert_eq!(prices.fwd_fee(0, 0), 1000000);
    assert_eq!(prices.fwd_fee(10, 1), 1000000 + 10000 + 100000);
    assert_eq!(prices.first_frac_fee(65536), 21845);
}

#[test]
fn test_catchain_config() {
    let mut config = catchain_config(7);
    config.isolate_mc_validators = true;
    write_read_and_assert(config);

    // legacy constructor has no flags
    let mut b = BuilderData::new();
    b.append_u8(0xc1).unwrap();
    for value in &[250u32, 250, 1000, 7] {
        b.append_u32(*value).unwrap();
    }
    let config = CatchainConfig::construct_from_cell(b.into_cell().unwrap()).unwrap();
    assert_eq!(config, catchain_config(7));

    let mut b = BuilderData::new();
    b.append_u8(0xc2).unwrap();
    b.append_u8(0x04).unwrap();
    for value in &[250u32, 250, 1000, 7] {
        b.append_u32(*value).unwrap();
    }
    assert!(CatchainConfig::construct_from_cell(b.into_cell().unwrap()).is_err());
}

#[test]
fn test_fundamental_addresses() {
    let mut param = ConfigParam31::default();
    param.add_address(UInt256::from([1; 32])).unwrap();
    param.add_address(UInt256::from([2; 32])).unwrap();
    let param = write_read_and_assert(param);
    assert!(param.fundamental_smc_addr.contains(&UInt256::from([2; 32])).unwrap());
    assert!(!param.fundamental_smc_addr.contains(&UInt256::from([3; 32])).unwrap());
}

#[test]
fn test_config_params_access() {
    let mut config = ConfigParams::new();
    assert!(config.validator_set().is_err());
    assert!(config.catchain_config().is_err());
    assert!(config.config(34).unwrap().is_none());
    assert!(!config.next_validator_set_present().unwrap());
    assert_eq!(config.prev_validator_set().unwrap(), ValidatorSet::default());

    config.set_config(ConfigParamEnum::ConfigParam0(ConfigParam0 { config_addr: UInt256::from([5; 32]) })).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam28(catchain_config(3))).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam34(ConfigParam34 { cur_validators: vset(0, 100, 1, 4) })).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam20(gas_prices())).unwrap();

    let mut b = BuilderData::new();
    b.append_u32(0x12345678).unwrap();
    let unknown = ConfigParamEnum::ConfigParamAny(100, SliceData::load_builder(b).unwrap());
    config.set_config(unknown.clone()).unwrap();

    let config = write_read_and_assert(config);
    assert_eq!(config.config_address().unwrap(), UInt256::from([5; 32]));
    assert!(config.elector_address().is_err());
    assert_eq!(config.validator_set().unwrap().total(), 4);
    assert_eq!(config.catchain_config().unwrap().shard_validators_num, 3);
    assert_eq!(config.gas_prices(true).unwrap(), gas_prices());
    assert!(config.gas_prices(false).is_err());
    assert_eq!(config.config(100).unwrap().unwrap().index(), 100);
    assert!(config.config_present(34).unwrap());
    assert!(!config.config_present(35).unwrap());

    let (vset, ccc) = config.read_cur_validator_set_and_cc_conf().unwrap();
    assert_eq!(vset.total_weight(), 40);
    assert_eq!(ccc, catchain_config(3));

    // temporary set overrides the elected one
    let mut config = config;
    config.set_config(ConfigParamEnum::ConfigParam35(ConfigParam35 { cur_temp_validators: vset(0, 100, 50, 2) })).unwrap();
    assert_eq!(config.validator_set().unwrap().total(), 2);
}

#[test]
fn test_validator_set_at() {
    let mut config = ConfigParams::new();
    config.set_config(ConfigParamEnum::ConfigParam28(catchain_config(3))).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam34(ConfigParam34 { cur_validators: vset(100, 200, 1, 4) })).unwrap();
    assert_eq!(config.validator_set_at(150).unwrap(), vset(100, 200, 1, 4));
    // no next set, the current one stays in force
    assert_eq!(config.validator_set_at(500).unwrap(), vset(100, 200, 1, 4));

    config.set_config(ConfigParamEnum::ConfigParam36(ConfigParam36 { next_validators: vset(200, 300, 20, 5) })).unwrap();
    assert!(config.next_validator_set_present().unwrap());
    assert_eq!(config.validator_set_at(199).unwrap().total(), 4);
    assert_eq!(config.validator_set_at(200).unwrap().total(), 5);
    assert_eq!(config.validator_set_at(250).unwrap().total(), 5);
}

#[test]
fn test_compute_validator_set() {
    let mut config = ConfigParams::new();
    config.set_config(ConfigParamEnum::ConfigParam28(catchain_config(3))).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam34(ConfigParam34 { cur_validators: vset(0, 1000, 1, 6) })).unwrap();

    let (mc, hash) = config.compute_validator_set_and_hash(&ShardIdent::masterchain(), 10, 4).unwrap();
    assert_eq!(mc.len(), 6);
    assert_eq!(hash, ValidatorSet::calc_subset_hash_short(&mc, 4).unwrap());
    assert_eq!(config.compute_validator_set(&ShardIdent::masterchain(), 10, 4).unwrap(), mc);

    let shard = ShardIdent::full(BASE_WORKCHAIN_ID);
    let subset = config.compute_validator_set(&shard, 10, 4).unwrap();
    assert_eq!(subset.len(), 3);
    let (expected, _) = vset(0, 1000, 1, 6)
        .calc_subset(&catchain_config(3), shard.shard_prefix_with_tag(), BASE_WORKCHAIN_ID, 4)
        .unwrap();
    assert_eq!(subset, expected);

    assert!(ConfigParams::new().compute_validator_set(&shard, 10, 4).is_err());
}

#[test]
fn test_valid_config_data() {
    let addr = UInt256::from([9; 32]);
    let mut config = ConfigParams::with_address_and_params(addr.clone(), None);
    assert!(!config.valid_config_data(false).unwrap());
    assert!(!config.valid_config_data(true).unwrap());

    config.set_config(ConfigParamEnum::ConfigParam0(ConfigParam0 { config_addr: addr })).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam20(gas_prices())).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam21(gas_prices())).unwrap();
    let limits = BlockLimits::with_limits(
        ParamLimits::with_limits(1, 2, 3).unwrap(),
        ParamLimits::with_limits(1, 2, 3).unwrap(),
        ParamLimits::with_limits(1, 2, 3).unwrap(),
    );
    config.set_config(ConfigParamEnum::ConfigParam22(limits.clone())).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam23(limits)).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam24(MsgForwardPrices::default())).unwrap();
    config.set_config(ConfigParamEnum::ConfigParam25(MsgForwardPrices::default())).unwrap();
    assert_eq!(config.fwd_prices(false).unwrap(), MsgForwardPrices::default());
    config.set_config(ConfigParamEnum::ConfigParam28(catchain_config(3))).unwrap();
    assert!(!config.valid_config_data(false).unwrap());
    config.set_config(ConfigParamEnum::ConfigParam34(ConfigParam34 { cur_validators: vset(0, 1, 1, 1) })).unwrap();
    assert!(config.valid_config_data(false).unwrap());

    // config address must match param 0 unless relaxed
    config.config_addr = UInt256::from([8; 32]);
    assert!(!config.valid_config_data(false).unwrap());
    assert!(config.valid_config_data(true).unwrap());
}
