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
    blocks::BlockIdExt,
    error::BlockError,
    master::{FutureSplitMerge, McShardRecord, ShardDescr, ShardHashes},
    shard::{AccountIdPrefixFull, ShardIdent, INVALID_WORKCHAIN_ID, MASTERCHAIN_ID},
    Deserializable, Serializable,
};
use std::{cmp::max, collections::HashSet};
use ton_types::{error, fail, BuilderData, Result, SliceData};

/// Shard topology of all workchains as published by the masterchain
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShardConfig {
    shard_hashes: ShardHashes,
}

impl ShardConfig {
    pub fn with_shard_hashes(shard_hashes: ShardHashes) -> Self {
        Self { shard_hashes }
    }

    pub fn shard_hashes(&self) -> &ShardHashes {
        &self.shard_hashes
    }

    pub fn has_workchain(&self, workchain_id: i32) -> Result<bool> {
        self.shard_hashes.has_workchain(workchain_id)
    }

    /// Returns the record of `shard` itself if `exact` is set,
    /// otherwise the record of the nearest registered ancestor
    pub fn get_shard_hash(&self, shard: &ShardIdent, exact: bool) -> Result<Option<McShardRecord>> {
        if exact {
            self.shard_hashes.get_shard(shard)
        } else {
            self.shard_hashes.find_shard(shard)
        }
    }

    pub fn get_shard_hash_by_prefix(&self, prefix: &AccountIdPrefixFull) -> Result<Option<McShardRecord>> {
        self.shard_hashes.find_shard_by_prefix(prefix)
    }

    pub fn neighbours(&self, shard: &ShardIdent) -> Result<Vec<McShardRecord>> {
        self.shard_hashes.get_neighbours(shard)
    }

    pub fn intersecting(&self, shard: &ShardIdent) -> Result<Vec<McShardRecord>> {
        self.shard_hashes.get_intersecting(shard)
    }

    pub fn iterate_shards<F>(&self, func: F) -> Result<bool>
    where F: FnMut(ShardIdent, ShardDescr) -> Result<bool> {
        self.shard_hashes.iterate_shards(func)
    }

    /// Checks that `new_info` may replace the shards of `old_blkids`.
    /// Returns false as the first item for a half of split, which must be applied in pair.
    /// The second item is the replaced record if neither split nor merge happens.
    pub fn may_update_shard_block_info(
        &self,
        new_info: &McShardRecord,
        old_blkids: &[BlockIdExt],
        lt_limit: u64,
        shards_updated: Option<&HashSet<ShardIdent>>,
    ) -> Result<(bool, Option<McShardRecord>)> {
        self.check_shard_block_info(new_info, old_blkids, lt_limit, shards_updated)
            .map_err(|err| {
                log::warn!(
                    target: "shard_config",
                    "top shard block update {} is rejected: {}",
                    new_info.block_id(), err
                );
                err
            })
    }

    fn check_shard_block_info(
        &self,
        new_info: &McShardRecord,
        old_blkids: &[BlockIdExt],
        lt_limit: u64,
        shards_updated: Option<&HashSet<ShardIdent>>,
    ) -> Result<(bool, Option<McShardRecord>)> {
        log::trace!(target: "shard_config", "may_update_shard_block_info {}", new_info.block_id());

        let wc = new_info.shard().workchain_id();
        if wc == INVALID_WORKCHAIN_ID || wc == MASTERCHAIN_ID {
            fail!("new top shard block description belongs to an invalid workchain {}", wc)
        }
        if !self.shard_hashes.has_workchain(wc)? {
            fail!("new top shard block belongs to an unknown or disabled workchain {}", wc)
        }
        if old_blkids.len() != 1 && old_blkids.len() != 2 {
            fail!("a top shard block update must have either one or two start blocks")
        }
        if new_info.descr.end_lt <= new_info.descr.start_lt {
            fail!(BlockError::InvalidData(format!(
                "new top shard block {} has end_lt {} not above its start_lt {}",
                new_info.block_id(), new_info.descr.end_lt, new_info.descr.start_lt
            )))
        }

        let before_split = old_blkids[0].shard().is_parent_for(new_info.shard());
        let before_merge = old_blkids.len() == 2;
        if before_merge {
            if old_blkids[0].shard().sibling() != *old_blkids[1].shard() {
                fail!("the two start blocks of a top shard block update must be siblings")
            }
            if !new_info.shard().is_parent_for(old_blkids[0].shard()) {
                fail!(
                    "the two start blocks of a top shard block update do not merge into \
                    expected final shard {}",
                    new_info.shard()
                )
            }
        } else if new_info.shard() != old_blkids[0].shard() && !before_split {
            fail!(
                "the start block of a top shard block update must either coincide with \
                the final shard or be its parent"
            )
        }

        let mut ancestor = None;
        let mut old_cc_seqno = 0;
        for ob in old_blkids {
            let odef = self.shard_hashes.get_shard(ob.shard())?
                .ok_or_else(|| error!(
                    "the start block's shard {} of a top shard block update is not contained \
                    in the previous shard configuration", ob
                ))?;
            if odef.block_id() != ob {
                fail!(
                    "the start block {} of a top shard block update is not contained \
                    in the previous shard configuration", ob
                )
            }
            old_cc_seqno = max(old_cc_seqno, odef.descr.next_catchain_seqno);

            if let Some(shards_updated) = shards_updated {
                if shards_updated.contains(ob.shard()) {
                    fail!(
                        "the shard of the start block {} of a top shard block update has been \
                        already updated in the current shard configuration", ob
                    )
                }
            }
            if odef.descr.before_split != before_split {
                fail!(
                    "the shard of the start block {} has before_split={} \
                    but the top shard block update is valid only if before_split={}",
                    ob, odef.descr.before_split, before_split
                )
            }
            if odef.descr.before_merge != before_merge {
                fail!(
                    "the shard of the start block {} has before_merge={} \
                    but the top shard block update is valid only if before_merge={}",
                    ob, odef.descr.before_merge, before_merge
                )
            }
            if new_info.descr.before_split {
                if before_merge || before_split {
                    fail!(
                        "cannot register a before-split block {} at the end of a chain that \
                        itself starts with a split/merge event", new_info.block_id()
                    )
                }
                if !odef.descr.is_fsm_split() {
                    fail!(
                        "cannot register a before-split block {} because fsm_split state \
                        was not set for this shard beforehand", new_info.block_id()
                    )
                }
                if !odef.descr.fsm_active_at(new_info.descr.gen_utime) {
                    fail!(
                        "cannot register a before-split block {} because fsm_split state was \
                        enabled for unixtime {} .. {} but the block is generated at {}",
                        new_info.block_id(), odef.descr.fsm_utime(),
                        odef.descr.fsm_utime_end(), new_info.descr.gen_utime
                    )
                }
            }
            if before_merge {
                if !odef.descr.is_fsm_merge() {
                    fail!(
                        "cannot register a merged block {} because fsm_merge state \
                        was not set for shard {} beforehand", new_info.block_id(), ob.shard()
                    )
                }
                if !odef.descr.fsm_active_at(new_info.descr.gen_utime) {
                    fail!(
                        "cannot register merged block {} because fsm_merge state was \
                        enabled for shard {} for unixtime {} .. {} but the block is generated at {}",
                        new_info.block_id(), ob.shard(), odef.descr.fsm_utime(),
                        odef.descr.fsm_utime_end(), new_info.descr.gen_utime
                    )
                }
            }
            if !before_merge && !before_split {
                ancestor = Some(odef);
            }
        }

        let expected_next_catchain_seqno = old_cc_seqno + before_merge as u32;
        if expected_next_catchain_seqno != new_info.descr.next_catchain_seqno {
            fail!(
                "the top shard block update is generated with catchain_seqno={} \
                but previous shard configuration expects {}",
                new_info.descr.next_catchain_seqno, expected_next_catchain_seqno
            )
        }
        if new_info.descr.end_lt >= lt_limit {
            fail!(
                "the top shard block update has end_lt {} which is larger than the current limit {}",
                new_info.descr.end_lt, lt_limit
            )
        }
        Ok((!before_split, ancestor))
    }

    /// Applies the update of one shard: plain continuation or merge of two siblings
    pub fn update_shard_block_info(
        &mut self,
        mut new_info: McShardRecord,
        old_blkids: &[BlockIdExt],
        shards_updated: Option<&mut HashSet<ShardIdent>>,
    ) -> Result<()> {
        let (res, ancestor) = self.may_update_shard_block_info(
            &new_info, old_blkids, u64::MAX, shards_updated.as_deref()
        )?;
        if !res {
            fail!(
                "cannot apply the after-split update for {} without a corresponding sibling update",
                new_info.block_id()
            )
        }
        if let Some(ancestor) = ancestor {
            if ancestor.descr.split_merge_at != FutureSplitMerge::None {
                new_info.descr.split_merge_at = ancestor.descr.split_merge_at;
            }
        }

        let shard = *new_info.shard();
        if old_blkids.len() == 2 {
            self.shard_hashes.merge_shards(&shard, |_, _| Ok(new_info.descr))?;
        } else {
            self.shard_hashes.update_shard(&shard, |_| Ok(new_info.descr))?;
        }
        log::debug!(target: "shard_config", "top block of shard {} is updated", shard);

        if let Some(shards_updated) = shards_updated {
            shards_updated.insert(shard);
        }
        Ok(())
    }

    /// Applies the pair of updates following a split of one shard
    pub fn update_shard_block_info2(
        &mut self,
        mut new_info1: McShardRecord,
        mut new_info2: McShardRecord,
        old_blkids: &[BlockIdExt],
        shards_updated: Option<&mut HashSet<ShardIdent>>,
    ) -> Result<()> {
        let (res1, _) = self.may_update_shard_block_info(
            &new_info1, old_blkids, u64::MAX, shards_updated.as_deref()
        )?;
        let (res2, _) = self.may_update_shard_block_info(
            &new_info2, old_blkids, u64::MAX, shards_updated.as_deref()
        )?;
        if res1 || res2 {
            fail!("the two updates in update_shard_block_info2 must follow a shard split event")
        }
        if !new_info1.shard().is_sibling_for(new_info2.shard()) {
            fail!(
                "the two updates {} and {} must describe sibling shards",
                new_info1.block_id(), new_info2.block_id()
            )
        }
        if new_info1.shard().shard_prefix_with_tag() > new_info2.shard().shard_prefix_with_tag() {
            std::mem::swap(&mut new_info1, &mut new_info2);
        }

        let shard1 = *new_info1.shard();
        let shard2 = *new_info2.shard();
        self.shard_hashes.split_shard(&shard1.merge()?, |_| Ok((new_info1.descr, new_info2.descr)))?;
        log::debug!(target: "shard_config", "shard {} is split into {} and {}", old_blkids[0].shard(), shard1, shard2);

        if let Some(shards_updated) = shards_updated {
            shards_updated.insert(shard1);
            shards_updated.insert(shard2);
        }
        Ok(())
    }
}

impl Serializable for ShardConfig {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.shard_hashes.write_to(cell)
    }
}

impl Deserializable for ShardConfig {
    fn read_from(&mut self, slice: &mut SliceData) -> Result<()> {
        self.shard_hashes.read_from(slice)
    }
}

#[cfg(test)]
#[path = "tests/test_shard_config.rs"]
mod tests;
