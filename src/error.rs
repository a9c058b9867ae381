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

#[derive(Debug, failure::Fail)]
pub enum BlockError {
    /// Fatal error.
    #[fail(display = "Fatal error: {}", _0)]
    FatalError(String),
    /// Invalid argument.
    #[fail(display = "Invalid argument: {}", _0)]
    InvalidArg(String),
    /// Invalid TL-B constructor tag.
    #[fail(display = "Invalid TL-B constructor tag `#{:x}` while parsing `{}` struct", t, s)]
    InvalidConstructorTag {
        t: u32,
        s: String,
    },
    /// Invalid data.
    #[fail(display = "Invalid data: {}", _0)]
    InvalidData(String),
    /// Invalid operation.
    #[fail(display = "Invalid operation: {}", _0)]
    InvalidOperation(String),
    /// Item is not found.
    #[fail(display = "{} is not found", _0)]
    NotFound(String),
    /// Attempting to read data from pruned branch cell.
    #[fail(display = "Attempting to read {} from pruned branch cell", _0)]
    PrunedCellAccess(String),
    /// Wrong hash.
    #[fail(display = "Wrong hash")]
    WrongHash,
    /// Wrong Merkle proof.
    #[fail(display = "Wrong merkle proof: {}", _0)]
    WrongMerkleProof(String),
    /// Wrong Merkle update.
    #[fail(display = "Wrong merkle update: {}", _0)]
    WrongMerkleUpdate(String),
    /// Bad signature.
    #[fail(display = "Bad signature")]
    BadSignature,
    /// Signatures do not carry enough weight.
    #[fail(display = "Insufficient total signature weight: {} of {}", _0, _1)]
    NotEnoughSignatureWeight(u64, u64),
}
