/*
* Copyright 2018-2020 TON DEV SOLUTIONS LTD.
*
* Licensed under the SOFTWARE EVALUATION License (the "License"); you may not use
* this file except in compliance with the License.  You may obtain a copy of the
* License at: https://ton.dev/licenses
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific TON DEV software governing permissions and
* limitations under the License.
*/

use crate::{
    config_params::CatchainConfig,
    define_HashmapE,
    error::BlockError,
    shard::{MASTERCHAIN_ID, SHARD_FULL},
    signature::SigPubKey,
    Serializable, Deserializable,
};
use crc::{Crc, CRC_32_ISCSI};
use sha2::{Digest, Sha256, Sha512};
use ton_types::{
    error, fail, Result,
    UInt256, BuilderData, IBitstring, SliceData,
};

/*
validator_info$_
  validator_list_hash_short:uint32
  catchain_seqno:uint32
  nx_cc_updated:Bool
= ValidatorInfo;
*/
/// Current masterchain validator session, stored in the masterchain state
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ValidatorInfo {
    pub validator_list_hash_short: u32,
    pub catchain_seqno: u32,
    pub nx_cc_updated: bool
}

impl ValidatorInfo {
    pub fn with_params(validator_list_hash_short: u32, catchain_seqno: u32, nx_cc_updated: bool) -> Self {
        Self { validator_list_hash_short, catchain_seqno, nx_cc_updated }
    }
}

impl Serializable for ValidatorInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(self.validator_list_hash_short)?;
        cell.append_u32(self.catchain_seqno)?;
        cell.append_bit_bool(self.nx_cc_updated)?;
        Ok(())
    }
}

impl Deserializable for ValidatorInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            validator_list_hash_short: slice.get_next_u32()?,
            catchain_seqno: slice.get_next_u32()?,
            nx_cc_updated: slice.get_next_bit()?,
        })
    }
}

/*
validator_base_info$_
  validator_list_hash_short:uint32
  catchain_seqno:uint32
= ValidatorBaseInfo;
*/
/// Session which produced a set of signatures
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ValidatorBaseInfo {
    pub validator_list_hash_short: u32,
    pub catchain_seqno: u32,
}

impl ValidatorBaseInfo {
    pub fn with_params(validator_list_hash_short: u32, catchain_seqno: u32) -> Self {
        Self { validator_list_hash_short, catchain_seqno }
    }
}

impl Serializable for ValidatorBaseInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(self.validator_list_hash_short)?;
        cell.append_u32(self.catchain_seqno)?;
        Ok(())
    }
}

impl Deserializable for ValidatorBaseInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            validator_list_hash_short: slice.get_next_u32()?,
            catchain_seqno: slice.get_next_u32()?,
        })
    }
}

/*
validator#53 public_key:SigPubKey weight:uint64 = ValidatorDescr;
validator_addr#73 public_key:SigPubKey weight:uint64 adnl_addr:bits256 = ValidatorDescr;
*/
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ValidatorDescr {
    pub public_key: SigPubKey,
    pub weight: u64,
    pub adnl_addr: Option<UInt256>,
    /// Sum of the weights of all validators before this one in the set, not serialized
    pub prev_weight_sum: u64,
}

// TL id of pub.ed25519 in little endian
const KEY_ED25519_MAGIC: [u8; 4] = [0xc6, 0xb4, 0x13, 0x48];

const VALIDATOR_DESCR_TAG: u8 = 0x53;
const VALIDATOR_DESCR_ADDR_TAG: u8 = 0x73;

impl ValidatorDescr {
    pub const fn with_params(public_key: SigPubKey, weight: u64, adnl_addr: Option<UInt256>) -> Self {
        Self { public_key, weight, adnl_addr, prev_weight_sum: 0 }
    }

    /// Short node id used to identify the signer of a block
    pub fn compute_node_id_short(&self) -> UInt256 {
        let mut hasher = Sha256::new();
        hasher.input(&KEY_ED25519_MAGIC);
        hasher.input(self.public_key.key_bytes());
        UInt256::from_slice(hasher.result().as_slice())
    }
}

impl Serializable for ValidatorDescr {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        match &self.adnl_addr {
            Some(adnl_addr) => {
                cell.append_u8(VALIDATOR_DESCR_ADDR_TAG)?;
                self.public_key.write_to(cell)?;
                cell.append_u64(self.weight)?;
                adnl_addr.write_to(cell)?;
            }
            None => {
                cell.append_u8(VALIDATOR_DESCR_TAG)?;
                self.public_key.write_to(cell)?;
                cell.append_u64(self.weight)?;
            }
        }
        Ok(())
    }
}

impl Deserializable for ValidatorDescr {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_byte()?;
        if tag != VALIDATOR_DESCR_TAG && tag != VALIDATOR_DESCR_ADDR_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "ValidatorDescr".to_string() })
        }
        let public_key = SigPubKey::construct_from(slice)?;
        let weight = slice.get_next_u64()?;
        let adnl_addr = match tag {
            VALIDATOR_DESCR_ADDR_TAG => Some(UInt256::construct_from(slice)?),
            _ => None
        };
        Ok(Self::with_params(public_key, weight, adnl_addr))
    }
}

define_HashmapE!{ValidatorDescriptions, 16, ValidatorDescr}

/*
validators#11 utime_since:uint32 utime_until:uint32
    total:(## 16) main:(## 16) { main <= total } { main >= 1 }
    list:(Hashmap 16 ValidatorDescr) = ValidatorSet;

validators_ext#12 utime_since:uint32 utime_until:uint32
    total:(## 16) main:(## 16) { main <= total } { main >= 1 }
    total_weight:uint64 list:(HashmapE 16 ValidatorDescr) = ValidatorSet;
*/
/// Validators elected for the period `utime_since..utime_until`.
/// The first `main` of them validate the masterchain.
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct ValidatorSet {
    utime_since: u32,
    utime_until: u32,
    main: u16,
    total_weight: u64,
    list: Vec<ValidatorDescr>,
}

const VALIDATOR_SET_TAG: u8 = 0x11;
const VALIDATOR_SET_EXT_TAG: u8 = 0x12;

// fills cumulative weights, returns the total one
fn accumulate_weights(list: &mut [ValidatorDescr]) -> Result<u64> {
    let mut total = 0u64;
    for descr in list.iter_mut() {
        descr.prev_weight_sum = total;
        total = total.checked_add(descr.weight)
            .ok_or_else(|| error!(BlockError::InvalidData("total weight of validators overflows 64 bits".to_string())))?;
    }
    Ok(total)
}

impl ValidatorSet {
    /// Recomputes cumulative weights and the total weight of `list`
    pub fn new(utime_since: u32, utime_until: u32, main: u16, mut list: Vec<ValidatorDescr>) -> Result<Self> {
        if list.is_empty() || list.len() > u16::MAX as usize {
            fail!(BlockError::InvalidArg(format!("wrong count of validators {}", list.len())))
        }
        if main == 0 || main as usize > list.len() {
            fail!(BlockError::InvalidArg(format!("`main` {} must be in range 1..={}", main, list.len())))
        }
        let total_weight = accumulate_weights(&mut list)?;
        Ok(Self { utime_since, utime_until, main, total_weight, list })
    }

    pub fn utime_since(&self) -> u32 { self.utime_since }
    pub fn utime_until(&self) -> u32 { self.utime_until }
    pub fn total(&self) -> u16 { self.list.len() as u16 }
    pub fn main(&self) -> u16 { self.main }
    pub fn total_weight(&self) -> u64 { self.total_weight }
    pub fn list(&self) -> &[ValidatorDescr] { &self.list }

    pub fn validator_by_pub_key(&self, pub_key: &[u8; 32]) -> Option<&ValidatorDescr> {
        self.list.iter().find(|descr| descr.public_key.key_bytes() == pub_key)
    }

    /// Validator whose cumulative weight bucket contains `weight_pos`
    pub fn at_weight(&self, weight_pos: u64) -> Result<&ValidatorDescr> {
        if weight_pos >= self.total_weight {
            fail!(BlockError::InvalidArg(format!("weight {} is out of total weight {}", weight_pos, self.total_weight)))
        }
        let next = self.list.partition_point(|descr| descr.prev_weight_sum <= weight_pos);
        self.list.get(next.wrapping_sub(1))
            .ok_or_else(|| error!(BlockError::InvalidData("validator list is empty".to_string())))
    }

    /// Validators of the session `cc_seqno` of the shard and the short hash of their list
    pub fn calc_subset(
        &self,
        cc_config: &CatchainConfig,
        shard_pfx: u64,
        workchain_id: i32,
        cc_seqno: u32,
    ) -> Result<(Vec<ValidatorDescr>, u32)> {
        let subset = if workchain_id == MASTERCHAIN_ID && shard_pfx == SHARD_FULL {
            self.calc_master_subset(cc_config, cc_seqno)
        } else {
            self.calc_shard_subset(cc_config, shard_pfx, workchain_id, cc_seqno)?
        };
        log::trace!(
            target: "validators",
            "subset for {}:{:016x} cc_seqno {}: {} validators",
            workchain_id, shard_pfx, cc_seqno, subset.len()
        );
        let hash_short = Self::calc_subset_hash_short(&subset, cc_seqno)?;
        Ok((subset, hash_short))
    }

    // first `main` validators, optionally shuffled
    fn calc_master_subset(&self, cc_config: &CatchainConfig, cc_seqno: u32) -> Vec<ValidatorDescr> {
        let count = self.main as usize;
        if !cc_config.shuffle_mc_validators {
            return self.list[..count].to_vec()
        }
        let mut prng = ValidatorSetPRNG::new(SHARD_FULL, MASTERCHAIN_ID, cc_seqno);
        let mut order = Vec::with_capacity(count);
        for i in 0..count {
            // inside-out Fisher-Yates
            let j = prng.next_ranged(i as u64 + 1) as usize;
            if j == i {
                order.push(i);
            } else {
                order.push(order[j]);
                order[j] = i;
            }
        }
        order.into_iter().map(|i| self.list[i].clone()).collect()
    }

    // weighted sampling without replacement, every chosen validator gets weight 1
    fn calc_shard_subset(
        &self,
        cc_config: &CatchainConfig,
        shard_pfx: u64,
        workchain_id: i32,
        cc_seqno: u32,
    ) -> Result<Vec<ValidatorDescr>> {
        let isolated;
        let candidates = if cc_config.isolate_mc_validators {
            if self.list.len() <= self.main as usize {
                fail!(BlockError::InvalidData(
                    "no validators left for shards while masterchain validators are isolated".to_string()
                ))
            }
            let rest = self.list[self.main as usize..].to_vec();
            isolated = Self::new(self.utime_since, self.utime_until, rest.len() as u16, rest)?;
            &isolated
        } else {
            self
        };
        let count = std::cmp::min(candidates.list.len(), cc_config.shard_validators_num as usize);
        let mut prng = ValidatorSetPRNG::new(shard_pfx, workchain_id, cc_seqno);
        let mut subset = Vec::with_capacity(count);
        // (prev_weight_sum, weight) of chosen validators sorted by position
        let mut holes: Vec<(u64, u64)> = Vec::with_capacity(count);
        let mut remaining = candidates.total_weight;
        while subset.len() < count && remaining > 0 {
            let mut pos = prng.next_ranged(remaining);
            for (start, weight) in holes.iter() {
                if pos < *start {
                    break
                }
                pos += weight;
            }
            let chosen = candidates.at_weight(pos)?;
            subset.push(ValidatorDescr::with_params(chosen.public_key, 1, chosen.adnl_addr.clone()));
            remaining = remaining.checked_sub(chosen.weight)
                .ok_or_else(|| error!(BlockError::FatalError("validator is heavier than the remaining weight".to_string())))?;
            let hole = (chosen.prev_weight_sum, chosen.weight);
            let index = holes.partition_point(|h| *h <= hole);
            holes.insert(index, hole);
        }
        Ok(subset)
    }

    const HASH_SHORT_MAGIC: u32 = 0x901660ED;

    /// CRC32C of the subset as it is stored in `gen_validator_list_hash_short` of blocks
    pub fn calc_subset_hash_short(subset: &[ValidatorDescr], cc_seqno: u32) -> Result<u32> {
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let mut digest = crc.digest();
        digest.update(&Self::HASH_SHORT_MAGIC.to_le_bytes());
        digest.update(&cc_seqno.to_le_bytes());
        digest.update(&(subset.len() as u32).to_le_bytes());
        let no_addr = UInt256::default();
        for descr in subset {
            digest.update(descr.public_key.key_bytes());
            digest.update(&descr.weight.to_le_bytes());
            digest.update(descr.adnl_addr.as_ref().unwrap_or(&no_addr).as_slice());
        }
        Ok(digest.finalize())
    }
}

impl Serializable for ValidatorSet {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        let mut list = ValidatorDescriptions::default();
        for (index, descr) in self.list.iter().enumerate() {
            list.set(&(index as u16), descr)?;
        }
        cell.append_u8(VALIDATOR_SET_EXT_TAG)?;
        cell.append_u32(self.utime_since)?;
        cell.append_u32(self.utime_until)?;
        cell.append_u16(self.total())?;
        cell.append_u16(self.main)?;
        cell.append_u64(self.total_weight)?;
        list.write_to(cell)
    }
}

impl Deserializable for ValidatorSet {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_byte()?;
        if tag != VALIDATOR_SET_TAG && tag != VALIDATOR_SET_EXT_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "ValidatorSet".to_string() })
        }
        let utime_since = slice.get_next_u32()?;
        let utime_until = slice.get_next_u32()?;
        let total = slice.get_next_u16()?;
        let main = slice.get_next_u16()?;
        let mut descriptions = ValidatorDescriptions::default();
        let declared_weight = if tag == VALIDATOR_SET_TAG {
            descriptions.read_hashmap_root(slice)?;
            None
        } else {
            let weight = slice.get_next_u64()?;
            descriptions.read_from(slice)?;
            Some(weight)
        };
        let mut list = Vec::with_capacity(total as usize);
        for index in 0..total {
            let descr = descriptions.get(&index)?
                .ok_or_else(|| error!(BlockError::InvalidData(format!("validator {} is absent in the set", index))))?;
            list.push(descr);
        }
        let set = Self::new(utime_since, utime_until, main, list)
            .map_err(|err| error!(BlockError::InvalidData(format!("wrong validator set: {}", err))))?;
        if let Some(weight) = declared_weight {
            if weight != set.total_weight {
                fail!(BlockError::InvalidData(format!(
                    "declared total weight {} of validators differs from the computed {}", weight, set.total_weight
                )))
            }
        }
        Ok(set)
    }
}

/// Deterministic stream of the SHA-512 hashes of
/// `seed:bits256 shard:uint64 workchain:int32 cc_seqno:uint32` (big endian).
/// The seed is incremented as a big endian number after every hash.
pub struct ValidatorSetPRNG {
    context: [u8; 48],
    words: [u64; 8],
    used: usize,
}

impl ValidatorSetPRNG {
    pub fn new(shard_pfx: u64, workchain_id: i32, cc_seqno: u32) -> Self {
        let mut context = [0; 48];
        context[32..40].copy_from_slice(&shard_pfx.to_be_bytes());
        context[40..44].copy_from_slice(&workchain_id.to_be_bytes());
        context[44..].copy_from_slice(&cc_seqno.to_be_bytes());
        Self { context, words: [0; 8], used: 8 }
    }

    fn refill(&mut self) {
        let mut hasher = Sha512::new();
        hasher.input(&self.context[..]);
        for (word, chunk) in self.words.iter_mut().zip(hasher.result().chunks(8)) {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_be_bytes(bytes);
        }
        for byte in self.context[..32].iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break
            }
        }
        self.used = 0;
    }

    pub fn next_u64(&mut self) -> u64 {
        if self.used == self.words.len() {
            self.refill();
        }
        self.used += 1;
        self.words[self.used - 1]
    }

    /// Uniform value in `0..range`
    pub fn next_ranged(&mut self, range: u64) -> u64 {
        ((range as u128 * self.next_u64() as u128) >> 64) as u64
    }
}

#[cfg(test)]
#[path = "tests/test_validators.rs"]
mod tests;
