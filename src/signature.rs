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
    define_HashmapE,
    error::BlockError,
    validators::{ValidatorBaseInfo, ValidatorDescr},
    Serializable, Deserializable,
};
use ed25519::signature::{Signature, Verifier};
use std::{
    collections::{HashMap, HashSet},
    convert::TryFrom,
    fmt,
};
use ton_types::{
    error, fail, Result,
    UInt256,
    BuilderData, IBitstring, SliceData,
};

pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;
pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

fn to_array<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    if bytes.len() != N {
        fail!(BlockError::InvalidArg(format!("{} must be {} bytes long, not {}", what, N, bytes.len())))
    }
    let mut array = [0; N];
    array.copy_from_slice(bytes);
    Ok(array)
}

fn decode_hex(string: &str) -> Result<Vec<u8>> {
    hex::decode(string)
        .map_err(|err| error!(BlockError::InvalidData(format!("error parsing hex string {}: {}", string, err))))
}

/*
ed25519_signature#5 R:bits256 s:bits256 = CryptoSignature;
*/
/// Raw ed25519 signature, the curve point is checked only on verification
#[derive(Clone, Eq, PartialEq)]
pub struct CryptoSignature([u8; SIGNATURE_LENGTH]);

const CRYPTO_SIGNATURE_TAG: usize = 0x5;

impl CryptoSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(to_array(bytes, "signature")?))
    }

    pub fn from_r_s(r: &[u8], s: &[u8]) -> Result<Self> {
        let r: [u8; SIGNATURE_LENGTH / 2] = to_array(r, "`r` part of signature")?;
        let s: [u8; SIGNATURE_LENGTH / 2] = to_array(s, "`s` part of signature")?;
        let mut sign = [0; SIGNATURE_LENGTH];
        sign[..SIGNATURE_LENGTH / 2].copy_from_slice(&r);
        sign[SIGNATURE_LENGTH / 2..].copy_from_slice(&s);
        Ok(Self(sign))
    }

    pub fn from_hex(string: &str) -> Result<Self> {
        Self::from_bytes(&decode_hex(string)?)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn signature(&self) -> Result<ed25519::Signature> {
        Ok(ed25519::Signature::from_bytes(&self.0)?)
    }
}

impl Default for CryptoSignature {
    fn default() -> Self {
        Self([0; SIGNATURE_LENGTH])
    }
}

impl fmt::Debug for CryptoSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CryptoSignature({})", hex::encode(&self.0[..]))
    }
}

impl Serializable for CryptoSignature {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bits(CRYPTO_SIGNATURE_TAG, 4)?;
        cell.append_raw(&self.0, SIGNATURE_LENGTH * 8)?;
        Ok(())
    }
}

impl Deserializable for CryptoSignature {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_int(4)? as usize;
        if tag != CRYPTO_SIGNATURE_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "CryptoSignature".to_string() })
        }
        Self::from_bytes(&slice.get_next_bytes(SIGNATURE_LENGTH)?)
    }
}

/*
sig_pair$_ node_id_short:bits256 sign:CryptoSignature = CryptoSignaturePair;
*/
/// Signature of a validator identified by its short node id
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct CryptoSignaturePair {
    pub node_id_short: UInt256,
    pub sign: CryptoSignature,
}

impl CryptoSignaturePair {
    pub fn with_params(node_id_short: UInt256, sign: CryptoSignature) -> Self {
        Self { node_id_short, sign }
    }
}

impl Serializable for CryptoSignaturePair {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.node_id_short.write_to(cell)?;
        self.sign.write_to(cell)
    }
}

impl Deserializable for CryptoSignaturePair {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let node_id_short = UInt256::construct_from(slice)?;
        let sign = CryptoSignature::construct_from(slice)?;
        Ok(Self { node_id_short, sign })
    }
}

/*
ed25519_pubkey#8e81278a pubkey:bits256 = SigPubKey;
*/
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
pub struct SigPubKey([u8; PUBLIC_KEY_LENGTH]);

const SIG_PUB_KEY_TAG: u32 = 0x8e81278a;

impl SigPubKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(to_array(bytes, "public key")?))
    }

    pub fn from_hex(string: &str) -> Result<Self> {
        Self::from_bytes(&decode_hex(string)?)
    }

    pub fn key_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Malformed keys and signatures never verify
    pub fn verify_signature(&self, data: &[u8], signature: &CryptoSignature) -> bool {
        match (ed25519_dalek::PublicKey::from_bytes(&self.0), signature.signature()) {
            (Ok(key), Ok(signature)) => key.verify(data, &signature).is_ok(),
            _ => false
        }
    }
}

impl Serializable for SigPubKey {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(SIG_PUB_KEY_TAG)?;
        cell.append_raw(&self.0, PUBLIC_KEY_LENGTH * 8)?;
        Ok(())
    }
}

impl Deserializable for SigPubKey {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_u32()?;
        if tag != SIG_PUB_KEY_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag, s: "SigPubKey".to_string() })
        }
        Self::from_bytes(&slice.get_next_bytes(PUBLIC_KEY_LENGTH)?)
    }
}

define_HashmapE!{BlockSignaturesMap, 16, CryptoSignaturePair}

/*
block_signatures_pure#_
    sig_count:uint32
    sig_weight:uint64
    signatures:(HashmapE 16 CryptoSignaturePair)
= BlockSignaturesPure;
*/
/// Signatures of a block with their declared total weight
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockSignaturesPure {
    sig_count: u32,
    sig_weight: u64,
    signatures: BlockSignaturesMap,
}

impl BlockSignaturesPure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(sig_weight: u64) -> Self {
        Self { sig_weight, ..Self::default() }
    }

    pub fn count(&self) -> u32 {
        self.sig_count
    }

    /// Declared weight, it is not checked against the signatures
    pub fn weight(&self) -> u64 {
        self.sig_weight
    }

    pub fn set_weight(&mut self, weight: u64) {
        self.sig_weight = weight;
    }

    pub fn add_sigpair(&mut self, signature: CryptoSignaturePair) -> Result<()> {
        let index = u16::try_from(self.sig_count)
            .map_err(|_| error!(BlockError::InvalidOperation("too many signatures".to_string())))?;
        self.signatures.set(&index, &signature)?;
        self.sig_count += 1;
        Ok(())
    }

    pub fn signatures(&self) -> &BlockSignaturesMap {
        &self.signatures
    }

    /// Verifies every signature over `data` and returns the weight of the signers.
    /// Signers must belong to `validators_list` and sign only once.
    pub fn check_signatures(&self, validators_list: &[ValidatorDescr], data: &[u8]) -> Result<u64> {
        let validators: HashMap<UInt256, &ValidatorDescr> = validators_list.iter()
            .map(|descr| (descr.compute_node_id_short(), descr))
            .collect();
        let mut signers = HashSet::new();
        let mut weight = 0u64;
        let mut count = 0u32;
        self.signatures.iterate(|pair| {
            count += 1;
            let descr = match validators.get(&pair.node_id_short) {
                Some(descr) => descr,
                None => fail!(BlockError::InvalidData(
                    format!("signature of unknown node {:x}", pair.node_id_short)
                ))
            };
            if !signers.insert(pair.node_id_short.clone()) {
                fail!(BlockError::InvalidData(
                    format!("node {:x} signed the block twice", pair.node_id_short)
                ))
            }
            if !descr.public_key.verify_signature(data, &pair.sign) {
                fail!(BlockError::BadSignature)
            }
            weight = weight.checked_add(descr.weight)
                .ok_or_else(|| error!(BlockError::InvalidData("signature weight overflow".to_string())))?;
            Ok(true)
        })?;
        if count != self.sig_count {
            fail!(BlockError::InvalidData(
                format!("{} signatures are declared but {} are present", self.sig_count, count)
            ))
        }
        Ok(weight)
    }
}

impl Serializable for BlockSignaturesPure {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(self.sig_count)?;
        cell.append_u64(self.sig_weight)?;
        self.signatures.write_to(cell)
    }
}

impl Deserializable for BlockSignaturesPure {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            sig_count: slice.get_next_u32()?,
            sig_weight: slice.get_next_u64()?,
            signatures: BlockSignaturesMap::construct_from(slice)?,
        })
    }
}

/*
block_signatures#11
    validator_info:ValidatorBaseInfo
    pure_signatures:BlockSignaturesPure
= BlockSignatures;
*/
/// Signatures of a block made by the validator set identified by `validator_info`
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct BlockSignatures {
    pub validator_info: ValidatorBaseInfo,
    pub pure_signatures: BlockSignaturesPure
}

const BLOCK_SIGNATURES_TAG: u8 = 0x11;

impl BlockSignatures {
    pub fn with_params(validator_info: ValidatorBaseInfo, pure_signatures: BlockSignaturesPure) -> Self {
        Self { validator_info, pure_signatures }
    }
}

impl Serializable for BlockSignatures {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(BLOCK_SIGNATURES_TAG)?;
        self.validator_info.write_to(cell)?;
        self.pure_signatures.write_to(cell)
    }
}

impl Deserializable for BlockSignatures {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_byte()?;
        if tag != BLOCK_SIGNATURES_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "BlockSignatures".to_string() })
        }
        Ok(Self {
            validator_info: ValidatorBaseInfo::construct_from(slice)?,
            pure_signatures: BlockSignaturesPure::construct_from(slice)?,
        })
    }
}

#[cfg(test)]
#[path = "tests/test_signature.rs"]
mod tests;
