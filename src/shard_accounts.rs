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
    define_HashmapAugE,
    error::BlockError,
    hashmapaug::Augmentable,
    shard::ShardIdent,
    types::CurrencyCollection,
    Serializable, Deserializable,
};
use ton_types::{
    fail, Result,
    BuilderData, Cell, IBitstring, SliceData, UInt256,
};

pub const MAX_ACCOUNT_SPLIT_DEPTH: u8 = 30;

/////////////////////////////////////////////////////////////////////////////////////////
// The combined state of all accounts in a shard:
// _ (HashmapAugE 256 ShardAccount DepthBalanceInfo) = ShardAccounts;
define_HashmapAugE!(ShardAccounts, 256, UInt256, ShardAccount, DepthBalanceInfo);

impl ShardAccounts {
    pub fn insert(
        &mut self,
        account_id: &UInt256,
        account: &ShardAccount,
        split_depth: u8,
        balance: &CurrencyCollection
    ) -> Result<()> {
        let depth_balance_info = DepthBalanceInfo::new(split_depth, balance)?;
        self.set(account_id, account, &depth_balance_info)
    }

    pub fn account(&self, account_id: &UInt256) -> Result<Option<ShardAccount>> {
        self.get(account_id)
    }

    pub fn balance(&self, account_id: &UInt256) -> Result<Option<DepthBalanceInfo>> {
        Ok(self.get_with_aug(account_id)?.map(|(_, aug)| aug))
    }

    /// Sum of all account balances kept at the dictionary root
    pub fn full_balance(&self) -> &CurrencyCollection {
        &self.root_extra().balance
    }

    /// Accounts whose ids start with the prefix of `shard`
    pub fn split_for(&self, shard: &ShardIdent) -> Result<Self> {
        Ok(Self(self.0.subtree_with_prefix(&shard.shard_key()?)?))
    }

    /// Unites accounts of two sibling shards, the key sets must not overlap
    pub fn merge_with(&mut self, other: &Self) -> Result<()> {
        let mut duplicate = None;
        other.iterate_slices_with_keys_and_aug(|mut key, _, _| {
            if self.get_serialized(key.clone())?.is_some() {
                duplicate = Some(UInt256::construct_from(&mut key)?);
                return Ok(false)
            }
            Ok(true)
        })?;
        if let Some(account_id) = duplicate {
            fail!(BlockError::InvalidData(
                format!("account {:x} is present in both merged dictionaries", account_id)
            ))
        }
        self.combine_with(other)
    }
}

/*
account_descr$_ account:^Account last_trans_hash:bits256
  last_trans_lt:uint64 = ShardAccount;
*/
/// The account itself is kept as an opaque cell
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShardAccount {
    account: Cell,
    last_trans_hash: UInt256,
    last_trans_lt: u64,
}

impl ShardAccount {
    pub fn with_params(account: Cell, last_trans_hash: UInt256, last_trans_lt: u64) -> Self {
        Self {
            account,
            last_trans_hash,
            last_trans_lt,
        }
    }

    pub fn account_cell(&self) -> &Cell {
        &self.account
    }

    pub fn last_trans_hash(&self) -> &UInt256 {
        &self.last_trans_hash
    }

    pub fn last_trans_lt(&self) -> u64 {
        self.last_trans_lt
    }
}

impl Serializable for ShardAccount {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.account.write_to(cell)?;
        self.last_trans_hash.write_to(cell)?;
        self.last_trans_lt.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for ShardAccount {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let account = slice.checked_drain_reference()?;
        let last_trans_hash = UInt256::construct_from(slice)?;
        let last_trans_lt = u64::construct_from(slice)?;
        Ok(Self { account, last_trans_hash, last_trans_lt })
    }
}

/// depth_balance$_ split_depth:(#<= 30) balance:CurrencyCollection = DepthBalanceInfo;
#[derive(Default, Clone, Debug, Eq, PartialEq)]
pub struct DepthBalanceInfo {
    split_depth: u8,
    pub balance: CurrencyCollection,
}

impl DepthBalanceInfo {
    pub fn new(split_depth: u8, balance: &CurrencyCollection) -> Result<Self> {
        if split_depth > MAX_ACCOUNT_SPLIT_DEPTH {
            fail!(BlockError::InvalidArg(
                format!("split depth {} is bigger than {}", split_depth, MAX_ACCOUNT_SPLIT_DEPTH)
            ))
        }
        Ok(Self {
            split_depth,
            balance: balance.clone(),
        })
    }

    pub fn split_depth(&self) -> u8 {
        self.split_depth
    }

    pub fn balance(&self) -> &CurrencyCollection {
        &self.balance
    }
}

impl Augmentable for DepthBalanceInfo {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        // split depth of a fork is not meaningful, only balances are summed
        self.balance.calc(&other.balance)
    }
}

impl Deserializable for DepthBalanceInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let split_depth = slice.get_next_int(5)? as u8;
        if split_depth > MAX_ACCOUNT_SPLIT_DEPTH {
            fail!(BlockError::InvalidData(format!("split depth {} is too big", split_depth)))
        }
        let balance = CurrencyCollection::construct_from(slice)?;
        Ok(Self { split_depth, balance })
    }
}

impl Serializable for DepthBalanceInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bits(self.split_depth as usize, 5)?;
        self.balance.write_to(cell)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/test_shard_accounts.rs"]
mod tests;
