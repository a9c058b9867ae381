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
use crate::write_read_and_assert;

fn test_address(workchain_id: i32, byte: u8, bounceable: bool, testnet: bool) -> StdAddress {
    let mut address = StdAddress::with_address(workchain_id, UInt256::from([byte; 32]));
    address.bounceable = bounceable;
    address.testnet = testnet;
    address
}

#[test]
fn test_packed_address_roundtrip() {
    for workchain_id in [-1, 0, 5, 127, -128].iter() {
        for bounceable in [false, true].iter() {
            for testnet in [false, true].iter() {
                let address = test_address(*workchain_id, 0x5a, *bounceable, *testnet);
                let base64 = address.to_base64(false).unwrap();
                assert_eq!(base64.len(), 48);
                assert_eq!(base64.parse::<StdAddress>().unwrap(), address);
                let base64url = address.to_base64(true).unwrap();
                assert_eq!(StdAddress::from_str(&base64url).unwrap(), address);
            }
        }
    }
}

#[test]
fn test_packed_address_known_value() {
    let address = StdAddress::with_address(-1, UInt256::from([0x33; 32]));
    let packed = address.to_packed().unwrap();
    assert_eq!(packed[0], 0x11);
    assert_eq!(packed[1], 0xff);
    let crc = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM).checksum(&packed[..34]);
    assert_eq!(&packed[34..], &crc.to_be_bytes());

    let non_bounceable_testnet = test_address(0, 0, false, true).to_packed().unwrap();
    assert_eq!(non_bounceable_testnet[0], 0xd1);
}

#[test]
fn test_packed_address_bit_flips() {
    let address = test_address(0, 0xc3, true, false);
    let packed = address.to_packed().unwrap();
    for byte in 0..PACKED_ADDRESS_LEN {
        for bit in 0..8 {
            let mut broken = packed;
            broken[byte] ^= 1 << bit;
            assert!(StdAddress::from_packed(&broken).is_err(), "byte {} bit {}", byte, bit);
        }
    }
}

#[test]
fn test_packed_address_wrong_tag() {
    let mut data = test_address(0, 1, true, false).to_packed().unwrap();
    data[0] = 0x12;
    let crc = CRC16.checksum(&data[..34]);
    data[34..].copy_from_slice(&crc.to_be_bytes());
    assert!(StdAddress::from_packed(&data).is_err());
    assert!(StdAddress::from_packed(&data[..35]).is_err());
    assert!(StdAddress::from_base64("not a base64 address").is_err());
    assert!(test_address(300, 1, true, false).to_packed().is_err());
}

#[test]
fn test_raw_address() {
    let string = "-1:3333333333333333333333333333333333333333333333333333333333333333";
    let address = StdAddress::from_str(string).unwrap();
    assert_eq!(address, StdAddress::with_address(-1, UInt256::from([0x33; 32])));
    assert!(address.bounceable);
    assert!(!address.testnet);
    assert_eq!(address.to_string(), string);
    assert_eq!(address.prefix().prefix, 0x3333_3333_3333_3333);

    assert!(StdAddress::from_str("0:1234").is_err());
    assert!(StdAddress::from_str("x:3333333333333333333333333333333333333333333333333333333333333333").is_err());
    assert!(StdAddress::from_str("0:zz33333333333333333333333333333333333333333333333333333333333333").is_err());
}

#[test]
fn test_std_address_serialization() {
    let address = write_read_and_assert(StdAddress::with_address(0, UInt256::from([7; 32])));
    assert_eq!(address.serialize().unwrap().bit_length(), 267);
}
