// Copyright 2021-2022 Farcaster Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

//! Roles used to distinguish participants during a swap. The initiator generates the secret and
//! funds the first contract, the participant funds the second contract bound to the same secret
//! hash.

use std::fmt::Debug;
use std::io;
use std::str::FromStr;

use crate::consensus::{self, Decodable, Encodable};

/// Possible roles during the swap execution phase.
#[derive(Display, Debug, Clone, Hash, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[display(Debug)]
pub enum SwapRole {
    /// The initiator knows the secret from the start, funds first with the longest lock time,
    /// and learns nothing new during the swap.
    Initiator,
    /// The participant only knows the secret hash, funds second with a shorter lock time, and
    /// learns the secret when the initiator redeems.
    Participant,
}

impl SwapRole {
    /// Return the other role possible in the swap phase.
    pub fn other(&self) -> Self {
        match self {
            Self::Initiator => Self::Participant,
            Self::Participant => Self::Initiator,
        }
    }

    /// Return `true` if this role holds the secret before any redeem happens.
    pub fn knows_secret(&self) -> bool {
        matches!(self, Self::Initiator)
    }
}

impl Encodable for SwapRole {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            SwapRole::Initiator => 0x01u8.consensus_encode(writer),
            SwapRole::Participant => 0x02u8.consensus_encode(writer),
        }
    }
}

impl Decodable for SwapRole {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(SwapRole::Initiator),
            0x02u8 => Ok(SwapRole::Participant),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(SwapRole);

impl FromStr for SwapRole {
    type Err = consensus::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initiator" | "initiator" => Ok(SwapRole::Initiator),
            "Participant" | "participant" => Ok(SwapRole::Participant),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}
