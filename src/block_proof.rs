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
    blocks::{Block, BlockIdExt, BlockInfo},
    config_params::ConfigParams,
    error::BlockError,
    merkle_proof::MerkleProof,
    signature::BlockSignatures,
};
use std::sync::atomic::{AtomicBool, Ordering};
use ton_types::{error, fail, Result};

///
/// One hop between two masterchain blocks.
///
/// A forward hop (`from.seq_no < to.seq_no`) proves `to` by the signatures of
/// the validators elected in the key block `from`. A backward hop proves `to`
/// by the index of previous blocks kept in the masterchain state after `from`.
///
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockProofLink {
    pub from: BlockIdExt,
    pub to: BlockIdExt,
    /// `to` is a key block
    pub is_key: bool,
    /// Header of `to`
    pub dest_proof: Option<MerkleProof>,
    /// Header of `from`, or the zerostate if `from` is the zerostate
    pub proof: Option<MerkleProof>,
    /// Masterchain state after `from`
    pub state_proof: Option<MerkleProof>,
    pub signatures: Option<BlockSignatures>,
}

impl BlockProofLink {
    pub fn forward(
        from: BlockIdExt,
        to: BlockIdExt,
        is_key: bool,
        proof: MerkleProof,
        dest_proof: MerkleProof,
        signatures: BlockSignatures,
    ) -> Self {
        Self {
            from,
            to,
            is_key,
            dest_proof: Some(dest_proof),
            proof: Some(proof),
            state_proof: None,
            signatures: Some(signatures),
        }
    }

    pub fn backward(
        from: BlockIdExt,
        to: BlockIdExt,
        is_key: bool,
        proof: MerkleProof,
        state_proof: MerkleProof,
        dest_proof: Option<MerkleProof>,
    ) -> Self {
        Self {
            from,
            to,
            is_key,
            dest_proof,
            proof: Some(proof),
            state_proof: Some(state_proof),
            signatures: None,
        }
    }

    pub fn is_forward(&self) -> bool {
        self.from.seq_no() < self.to.seq_no()
    }

    /// Checks the hop and returns generation time of `to` if its header is proven
    pub fn validate(&self) -> Result<Option<u32>> {
        if !self.from.is_masterchain() || !self.to.is_masterchain() {
            fail!(BlockError::InvalidArg(format!(
                "proof link {} -> {} must connect masterchain blocks", self.from, self.to
            )))
        }
        if self.from.seq_no() == self.to.seq_no() {
            fail!(BlockError::InvalidArg(format!(
                "proof link {} -> {} connects blocks with the same seq_no", self.from, self.to
            )))
        }
        let utime = if self.is_forward() {
            Some(self.validate_forward()?)
        } else {
            self.validate_backward()?
        };
        log::debug!(
            target: "block_proof",
            "{} proof link {} -> {} is valid{}",
            if self.is_forward() { "forward" } else { "backward" },
            self.from, self.to,
            if self.is_key { " (key block)" } else { "" }
        );
        Ok(utime)
    }

    fn validate_forward(&self) -> Result<u32> {
        let dest_proof = self.dest_proof.as_ref().ok_or_else(|| error!(BlockError::InvalidData(
            format!("forward proof link {} -> {} has no header of the destination", self.from, self.to)
        )))?;
        let signatures = self.signatures.as_ref().ok_or_else(|| error!(BlockError::InvalidData(
            format!("forward proof link {} -> {} has no signatures", self.from, self.to)
        )))?;

        let config = self.source_config()?;
        let (_, info) = check_header(dest_proof, &self.to)?;
        if info.key_block() != self.is_key {
            fail!(BlockError::InvalidData(format!(
                "proof link declares key flag {} but header of {} has {}",
                self.is_key, self.to, info.key_block()
            )))
        }
        if info.prev_key_block_seqno() != self.from.seq_no() {
            fail!(BlockError::InvalidData(format!(
                "block {} refers to previous key block {} instead of {}",
                self.to, info.prev_key_block_seqno(), self.from.seq_no()
            )))
        }

        let utime = info.gen_utime().as_u32();
        let cc_seqno = info.gen_catchain_seqno();
        let (subset, hash_short) = config.compute_validator_set_and_hash(self.to.shard(), utime, cc_seqno)
            .map_err(|err| error!(BlockError::InvalidData(format!(
                "can't compute validators of {} from config of {}: {}", self.to, self.from, err
            ))))?;
        log::debug!(
            target: "block_proof",
            "validators of {}: {} in subset, cc_seqno {}, hash {:08x}",
            self.to, subset.len(), cc_seqno, hash_short
        );
        if hash_short != info.gen_validator_list_hash_short() {
            fail!(BlockError::InvalidData(format!(
                "validator set hash of {} is {:08x} but {:08x} is computed from config of {}",
                self.to, info.gen_validator_list_hash_short(), hash_short, self.from
            )))
        }
        let declared = &signatures.validator_info;
        if declared.validator_list_hash_short != hash_short || declared.catchain_seqno != cc_seqno {
            fail!(BlockError::InvalidData(format!(
                "signatures of {} are made by validator set {:08x} in session {} \
                but {:08x} in session {} is expected",
                self.to, declared.validator_list_hash_short, declared.catchain_seqno, hash_short, cc_seqno
            )))
        }

        let total_weight = subset.iter().try_fold(0u64, |total, vd| total.checked_add(vd.weight))
            .ok_or_else(|| error!(BlockError::InvalidData("validators weight overflow".to_string())))?;
        let data = Block::build_data_for_sign(self.to.root_hash(), self.to.file_hash());
        let weight = signatures.pure_signatures.check_signatures(&subset, &data)
            .map_err(|err| error!(BlockError::InvalidData(format!(
                "error while checking signatures of {}: {}", self.to, err
            ))))?;
        if weight != signatures.pure_signatures.weight() {
            fail!(BlockError::InvalidData(format!(
                "declared signature weight of {} is {} but {} is computed",
                self.to, signatures.pure_signatures.weight(), weight
            )))
        }
        log::debug!(
            target: "block_proof",
            "signatures of {}: weight {} of {}", self.to, weight, total_weight
        );
        if !weight_is_enough(weight, total_weight) {
            fail!(BlockError::NotEnoughSignatureWeight(weight, total_weight))
        }
        Ok(utime)
    }

    // Validator sets of a forward hop are taken from the key block or the zerostate
    fn source_config(&self) -> Result<ConfigParams> {
        let proof = self.proof.as_ref().ok_or_else(|| error!(BlockError::InvalidData(
            format!("proof link {} -> {} has no proof of the source", self.from, self.to)
        )))?;
        if self.from.is_zerostate() {
            let state = proof.virtualize_state(self.from.root_hash())?;
            let extra = state.read_custom()
                .map_err(|err| pruned_access(&self.from, "masterchain state extra", err))?
                .ok_or_else(|| error!(BlockError::InvalidData(
                    format!("zerostate {} has no masterchain extra", self.from)
                )))?;
            return Ok(extra.config)
        }
        let (block, info) = check_header(proof, &self.from)?;
        if !info.key_block() {
            fail!(BlockError::InvalidData(format!(
                "forward proof link starts from {} which is not a key block", self.from
            )))
        }
        block.read_config().map_err(|err| pruned_access(&self.from, "config", err))
    }

    fn validate_backward(&self) -> Result<Option<u32>> {
        let proof = self.proof.as_ref().ok_or_else(|| error!(BlockError::InvalidData(
            format!("backward proof link {} -> {} has no proof of the source", self.from, self.to)
        )))?;
        let state_proof = self.state_proof.as_ref().ok_or_else(|| error!(BlockError::InvalidData(
            format!("backward proof link {} -> {} has no state proof", self.from, self.to)
        )))?;

        let (block, _) = check_header(proof, &self.from)?;
        let state_hash = block.read_state_update()
            .map_err(|err| pruned_access(&self.from, "state update", err))?
            .new_hash;
        let state = state_proof.virtualize_state(&state_hash)?;
        if state.shard() != self.from.shard() || state.seq_no() != self.from.seq_no() {
            fail!(BlockError::InvalidData(format!(
                "state proof is made for {}:{} but state of {} is expected",
                state.shard(), state.seq_no(), self.from
            )))
        }
        let extra = state.read_custom()
            .map_err(|err| pruned_access(&self.from, "masterchain state extra", err))?
            .ok_or_else(|| error!(BlockError::InvalidData(
                format!("state of {} has no masterchain extra", self.from)
            )))?;
        extra.prev_blocks.check_key_block(&self.to, Some(self.is_key))
            .map_err(|err| error!(BlockError::InvalidData(format!(
                "state of {} doesn't prove {}: {}", self.from, self.to, err
            ))))?;

        match self.dest_proof.as_ref() {
            Some(dest_proof) => {
                let (_, info) = check_header(dest_proof, &self.to)?;
                if info.key_block() != self.is_key {
                    fail!(BlockError::InvalidData(format!(
                        "proof link declares key flag {} but header of {} has {}",
                        self.is_key, self.to, info.key_block()
                    )))
                }
                Ok(Some(info.gen_utime().as_u32()))
            }
            None if self.is_key => fail!(BlockError::InvalidData(format!(
                "backward proof link to key block {} has no header of it", self.to
            ))),
            None => Ok(None)
        }
    }
}

/// Strictly more than two thirds of the total weight
pub fn weight_is_enough(weight: u64, total_weight: u64) -> bool {
    weight as u128 * 3 > total_weight as u128 * 2
}

fn pruned_access(id: &BlockIdExt, what: &str, err: failure::Error) -> failure::Error {
    error!(BlockError::WrongMerkleProof(format!("can't read {} from proof of {}: {}", what, id, err)))
}

// Header of a masterchain block as the proof shows it
fn check_header(proof: &MerkleProof, id: &BlockIdExt) -> Result<(Block, BlockInfo)> {
    let (block, info) = proof.virtualize_block(id)?;
    if info.version() != 0 {
        fail!(BlockError::WrongMerkleProof(format!(
            "header of {} has unknown version {}", id, info.version()
        )))
    }
    if info.seq_no() != id.seq_no() || info.shard() != id.shard() {
        fail!(BlockError::WrongMerkleProof(format!(
            "proof of {} contains header of {}:{}", id, info.shard(), info.seq_no()
        )))
    }
    if info.read_master_ref()?.is_some() {
        fail!(BlockError::WrongMerkleProof(format!(
            "header of masterchain block {} refers to masterchain", id
        )))
    }
    if info.after_merge() || info.before_split() || info.after_split() {
        fail!(BlockError::WrongMerkleProof(format!(
            "header of masterchain block {} declares split or merge", id
        )))
    }
    Ok((block, info))
}

/// Result of a successful chain check
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProofChainResult {
    /// The highest key block met on the way
    pub last_key_block: Option<BlockIdExt>,
    pub last_key_block_utime: u32,
    /// Generation time of the last proven header
    pub last_utime: u32,
}

///
/// Sequence of links leading from the trusted block `from` to `to`
///
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockProofChain {
    pub from: BlockIdExt,
    pub to: BlockIdExt,
    pub links: Vec<BlockProofLink>,
}

impl BlockProofChain {
    pub fn new(from: BlockIdExt, to: BlockIdExt) -> Self {
        Self { from, to, links: Vec::new() }
    }

    pub fn add_link(&mut self, link: BlockProofLink) {
        self.links.push(link)
    }

    pub fn links(&self) -> &[BlockProofLink] {
        &self.links
    }

    /// Checks every link; `cancel` is polled between links
    pub fn validate(&self, cancel: Option<&AtomicBool>) -> Result<ProofChainResult> {
        let mut result = ProofChainResult::default();
        let mut cur = &self.from;
        for (i, link) in self.links.iter().enumerate() {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                fail!(BlockError::InvalidOperation(format!(
                    "proof chain validation is cancelled at link {} of {}", i, self.links.len()
                )))
            }
            if &link.from != cur {
                fail!(BlockError::InvalidData(format!(
                    "link {} starts from {} but the chain is at {}", i, link.from, cur
                )))
            }
            let utime = link.validate()
                .map_err(|err| error!(BlockError::InvalidData(format!(
                    "link {} of proof chain {} -> {} is invalid: {}", i, self.from, self.to, err
                ))))?;
            if let Some(utime) = utime {
                result.last_utime = utime;
            }
            if link.is_key {
                let higher = result.last_key_block.as_ref()
                    .map_or(true, |key| key.seq_no() < link.to.seq_no());
                if higher {
                    result.last_key_block = Some(link.to.clone());
                    result.last_key_block_utime = utime.unwrap_or_default();
                }
            }
            cur = &link.to;
        }
        if cur != &self.to {
            fail!(BlockError::InvalidData(format!(
                "proof chain ends at {} but {} is expected", cur, self.to
            )))
        }
        log::debug!(
            target: "block_proof",
            "proof chain {} -> {} of {} links is valid, last key block {:?}",
            self.from, self.to, self.links.len(),
            result.last_key_block.as_ref().map(|id| id.seq_no())
        );
        Ok(result)
    }
}

#[cfg(test)]
#[path = "tests/test_block_proof.rs"]
mod tests;
