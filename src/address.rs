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
    error::BlockError,
    shard::AccountIdPrefixFull,
    Serializable, Deserializable,
};
use crc::{Crc, CRC_16_XMODEM};
use std::{fmt, str::FromStr};
use ton_types::{
    error, fail, Result,
    BuilderData, IBitstring, SliceData, UInt256,
};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const FLAG_TESTNET: u8 = 0x80;

pub const PACKED_ADDRESS_LEN: usize = 36;

/*
addr_std$10 anycast:(Maybe Anycast)
   workchain_id:int8 address:bits256  = MsgAddressInt;
*/
/// Standard account address with user-friendly flags
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct StdAddress {
    pub workchain_id: i32,
    pub address: UInt256,
    pub bounceable: bool,
    pub testnet: bool,
}

impl StdAddress {
    pub fn with_address(workchain_id: i32, address: UInt256) -> Self {
        Self {
            workchain_id,
            address,
            bounceable: true,
            testnet: false,
        }
    }

    pub fn prefix(&self) -> AccountIdPrefixFull {
        AccountIdPrefixFull::prefix(self.workchain_id, &self.address)
    }

    /// 36 bytes: flags, workchain, address, crc16
    pub fn to_packed(&self) -> Result<[u8; PACKED_ADDRESS_LEN]> {
        if self.workchain_id < i8::MIN as i32 || self.workchain_id > i8::MAX as i32 {
            fail!(BlockError::InvalidArg(
                format!("workchain {} can't be packed into 8 bits", self.workchain_id)
            ))
        }
        let mut data = [0; PACKED_ADDRESS_LEN];
        data[0] = if self.bounceable { TAG_BOUNCEABLE } else { TAG_NON_BOUNCEABLE };
        if self.testnet {
            data[0] |= FLAG_TESTNET;
        }
        data[1] = self.workchain_id as i8 as u8;
        data[2..34].copy_from_slice(self.address.as_slice());
        let crc = CRC16.checksum(&data[..34]);
        data[34..].copy_from_slice(&crc.to_be_bytes());
        Ok(data)
    }

    pub fn from_packed(data: &[u8]) -> Result<Self> {
        if data.len() != PACKED_ADDRESS_LEN {
            fail!(BlockError::InvalidArg(
                format!("packed address must be {} bytes long, not {}", PACKED_ADDRESS_LEN, data.len())
            ))
        }
        let crc = u16::from_be_bytes([data[34], data[35]]);
        if crc != CRC16.checksum(&data[..34]) {
            fail!(BlockError::InvalidData("packed address has wrong crc16".to_string()))
        }
        let bounceable = match data[0] & !FLAG_TESTNET {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            tag => fail!(BlockError::InvalidData(format!("packed address has wrong tag 0x{:x}", tag)))
        };
        Ok(Self {
            workchain_id: data[1] as i8 as i32,
            address: UInt256::from_slice(&data[2..34]),
            bounceable,
            testnet: data[0] & FLAG_TESTNET != 0,
        })
    }

    pub fn to_base64(&self, url_safe: bool) -> Result<String> {
        let config = if url_safe { base64::URL_SAFE } else { base64::STANDARD };
        Ok(base64::encode_config(&self.to_packed()?[..], config))
    }

    /// Decodes both base64 alphabets
    pub fn from_base64(string: &str) -> Result<Self> {
        let config = if string.contains('-') || string.contains('_') {
            base64::URL_SAFE
        } else {
            base64::STANDARD
        };
        let data = base64::decode_config(string, config)
            .map_err(|err| error!(BlockError::InvalidArg(format!("wrong base64 address {}: {}", string, err))))?;
        Self::from_packed(&data)
    }

    fn from_raw_str(string: &str) -> Result<Self> {
        let mut parts = string.splitn(2, ':');
        let (workchain, hex_address) = match (parts.next(), parts.next()) {
            (Some(workchain), Some(address)) => (workchain, address),
            _ => fail!(BlockError::InvalidArg(format!("wrong address format {}", string)))
        };
        let workchain_id = workchain.parse::<i32>()
            .map_err(|err| error!(BlockError::InvalidArg(format!("workchain_id is not correct number: {}", err))))?;
        if hex_address.len() != 64 {
            fail!(BlockError::InvalidArg(format!("address {} must contain 64 hex digits", hex_address)))
        }
        let bytes = hex::decode(hex_address)
            .map_err(|err| error!(BlockError::InvalidArg(format!("address {} is not hex: {}", hex_address, err))))?;
        Ok(Self::with_address(workchain_id, UInt256::from_slice(&bytes)))
    }
}

impl FromStr for StdAddress {
    type Err = failure::Error;

    fn from_str(string: &str) -> Result<Self> {
        if string.contains(':') {
            Self::from_raw_str(string)
        } else {
            Self::from_base64(string)
        }
    }
}

impl fmt::Display for StdAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:x}", self.workchain_id, self.address)
    }
}

impl Serializable for StdAddress {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        if self.workchain_id < i8::MIN as i32 || self.workchain_id > i8::MAX as i32 {
            fail!(BlockError::InvalidArg(format!("workchain {} doesn't fit addr_std", self.workchain_id)))
        }
        cell.append_bits(0b100, 3)?; // addr_std$10, no anycast
        cell.append_u8(self.workchain_id as i8 as u8)?;
        self.address.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for StdAddress {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_int(2)?;
        if tag != 0b10 {
            fail!(BlockError::InvalidConstructorTag {
                t: tag as u32,
                s: "StdAddress".to_string()
            })
        }
        if slice.get_next_bit()? {
            fail!(BlockError::InvalidData("anycast addresses are not supported".to_string()))
        }
        let workchain_id = slice.get_next_byte()? as i8 as i32;
        let address = UInt256::construct_from(slice)?;
        Ok(Self::with_address(workchain_id, address))
    }
}

#[cfg(test)]
#[path = "tests/test_address.rs"]
mod tests;
