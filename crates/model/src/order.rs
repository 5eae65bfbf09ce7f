//! Types describing signed off-chain exchange orders as they are submitted
//! for ingestion, together with their canonical identity hash.

use {
    crate::u256_decimal::{self, DecimalU256},
    primitive_types::{H160, H256, U256},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    serde_with::serde_as,
    std::{
        fmt::{self, Display},
        str::FromStr,
    },
    strum::EnumString,
    web3::signing,
};

/// The flag denoting that an order is paid in the chain's native token. It is
/// used in place of an actual payment token address in sell side orders.
pub const NATIVE_TOKEN_ADDRESS: H160 = H160([0xee; 20]);

/// Which side of the market an order is on. Sell orders are listings offering
/// an asset, buy orders are bids for one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Side {
    Buy,
    Sell,
}

/// The asset standard of the contract an order trades on. Resolved from chain
/// state, not part of the signed payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Erc721,
    Erc1155,
}

impl AssetKind {
    /// Multi token assets carry a fungible quantity so their orders can be
    /// partially filled and are priced per unit.
    pub fn is_divisible(&self) -> bool {
        match self {
            Self::Erc721 => false,
            Self::Erc1155 => true,
        }
    }
}

/// The tokens an order is valid against.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum AssetReference {
    SingleToken {
        contract: H160,
        #[serde(with = "u256_decimal")]
        token_id: U256,
    },
    ContractWide {
        contract: H160,
    },
    TokenRange {
        contract: H160,
        #[serde(with = "u256_decimal")]
        start_token_id: U256,
        #[serde(with = "u256_decimal")]
        end_token_id: U256,
    },
}

impl AssetReference {
    pub fn contract(&self) -> H160 {
        match self {
            Self::SingleToken { contract, .. }
            | Self::ContractWide { contract }
            | Self::TokenRange { contract, .. } => *contract,
        }
    }

    fn digest(&self) -> [u8; 32] {
        let mut data = [0u8; 85];
        match self {
            Self::SingleToken { contract, token_id } => {
                data[0] = 0;
                data[1..21].copy_from_slice(contract.as_fixed_bytes());
                token_id.to_big_endian(&mut data[21..53]);
            }
            Self::ContractWide { contract } => {
                data[0] = 1;
                data[1..21].copy_from_slice(contract.as_fixed_bytes());
            }
            Self::TokenRange {
                contract,
                start_token_id,
                end_token_id,
            } => {
                data[0] = 2;
                data[1..21].copy_from_slice(contract.as_fixed_bytes());
                start_token_id.to_big_endian(&mut data[21..53]);
                end_token_id.to_big_endian(&mut data[53..85]);
            }
        }
        signing::keccak256(&data)
    }
}

/// A protocol declared fee paid out of the payment amount.
#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub recipient: H160,
    #[serde_as(as = "DecimalU256")]
    pub amount: U256,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningScheme {
    Eip712,
    EthSign,
}

/// The maker's ECDSA signature over the order hash. Verification is performed
/// by an external signature validator, this type only carries the data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub scheme: SigningScheme,
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            scheme: SigningScheme::Eip712,
            r: H256::zero(),
            s: H256::zero(),
            v: 0,
        }
    }
}

impl Signature {
    pub fn to_bytes(self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(self.r.as_bytes());
        bytes[32..64].copy_from_slice(self.s.as_bytes());
        bytes[64] = self.v;
        bytes
    }
}

/// A signed off-chain order as received from the exchange protocol.
#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub side: Side,
    pub maker: H160,
    /// The zero address unless the order is restricted to a single taker.
    pub taker: H160,
    /// Unix timestamp after which the order can no longer be filled.
    pub expiry: u64,
    #[serde_as(as = "DecimalU256")]
    pub nonce: U256,
    pub erc20_token: H160,
    #[serde_as(as = "DecimalU256")]
    pub erc20_token_amount: U256,
    #[serde(default)]
    pub fees: Vec<Fee>,
    pub asset: AssetReference,
    /// Number of units for multi token assets. Absent for single token
    /// standards where the quantity is always one.
    #[serde_as(as = "Option<DecimalU256>")]
    #[serde(default)]
    pub nft_amount: Option<U256>,
    pub signature: Signature,
}

impl Order {
    /// Returns the deterministic identity of this order, a keccak256 digest
    /// over a fixed width encoding of every canonical field. The signature is
    /// not part of the identity.
    pub fn hash(&self) -> OrderHash {
        let mut fee_data = Vec::with_capacity(self.fees.len() * 52);
        for fee in &self.fees {
            fee_data.extend_from_slice(fee.recipient.as_fixed_bytes());
            let mut amount = [0u8; 32];
            fee.amount.to_big_endian(&mut amount);
            fee_data.extend_from_slice(&amount);
        }

        let mut data = [0u8; 253];
        data[0] = match self.side {
            Side::Buy => 0,
            Side::Sell => 1,
        };
        data[1..21].copy_from_slice(self.maker.as_fixed_bytes());
        data[21..41].copy_from_slice(self.taker.as_fixed_bytes());
        U256::from(self.expiry).to_big_endian(&mut data[41..73]);
        self.nonce.to_big_endian(&mut data[73..105]);
        data[105..125].copy_from_slice(self.erc20_token.as_fixed_bytes());
        self.erc20_token_amount.to_big_endian(&mut data[125..157]);
        data[157..189].copy_from_slice(&signing::keccak256(&fee_data));
        data[189..221].copy_from_slice(&self.asset.digest());
        self.nft_amount
            .unwrap_or_default()
            .to_big_endian(&mut data[221..253]);
        OrderHash(signing::keccak256(&data))
    }

    /// The number of asset units this order is for.
    pub fn quantity(&self) -> U256 {
        self.nft_amount.unwrap_or_else(U256::one)
    }

    /// Protocol defined self consistency checks on the raw payload.
    pub fn check_structure(&self, kind: AssetKind) -> Result<(), StructureError> {
        if self.erc20_token_amount.is_zero() {
            return Err(StructureError::ZeroPaymentAmount);
        }
        match (kind, self.nft_amount) {
            (AssetKind::Erc721, Some(_)) => return Err(StructureError::UnexpectedQuantity),
            (AssetKind::Erc1155, None) => return Err(StructureError::MissingQuantity),
            (AssetKind::Erc1155, Some(amount)) if amount.is_zero() => {
                return Err(StructureError::MissingQuantity);
            }
            _ => (),
        }
        if let AssetReference::TokenRange {
            start_token_id,
            end_token_id,
            ..
        } = &self.asset
        {
            if start_token_id > end_token_id {
                return Err(StructureError::InvertedTokenRange);
            }
        }
        if self.fees.iter().any(|fee| fee.recipient.is_zero()) {
            return Err(StructureError::ZeroFeeRecipient);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum StructureError {
    #[error("payment amount is zero")]
    ZeroPaymentAmount,
    #[error("single token orders must not declare a quantity")]
    UnexpectedQuantity,
    #[error("multi token orders need a non zero quantity")]
    MissingQuantity,
    #[error("token range starts after it ends")]
    InvertedTokenRange,
    #[error("fee recipient is the zero address")]
    ZeroFeeRecipient,
}

/// Out of band data accompanying an order submission. Absent values are
/// derived during ingestion.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub schema_hash: Option<H256>,
    pub source: Option<SourceToken>,
}

/// Identifies the marketplace or frontend an order originates from, either by
/// its registered address or by a bare name.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceToken {
    Address(H160),
    Name(String),
}

/// The canonical identity of an order and the primary key of its persisted
/// record.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct OrderHash(pub [u8; 32]);

impl OrderHash {
    /// Intended for easier hash creation in tests.
    pub fn from_integer(i: u32) -> Self {
        let mut hash = OrderHash::default();
        hash.0[0..4].copy_from_slice(&i.to_le_bytes());
        hash
    }
}

impl FromStr for OrderHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<OrderHash, hex::FromHexError> {
        let mut value = [0u8; 32];
        let s_without_prefix = s.strip_prefix("0x").unwrap_or(s);
        hex::decode_to_slice(s_without_prefix, value.as_mut())?;
        Ok(OrderHash(value))
    }
}

impl Display for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 2 + 32 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Unwrap because the length is always correct.
        hex::encode_to_slice(self.0, &mut bytes[2..]).unwrap();
        // Unwrap because the string is always valid utf8.
        let str = std::str::from_utf8(&bytes).unwrap();
        f.write_str(str)
    }
}

impl fmt::Debug for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for OrderHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for OrderHash {
    fn deserialize<D>(deserializer: D) -> Result<OrderHash, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor {}
        impl de::Visitor<'_> for Visitor {
            type Value = OrderHash;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a hex encoded 32 byte order hash")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                OrderHash::from_str(s).map_err(|err| {
                    de::Error::custom(format!("failed to decode {s:?} as order hash: {err}"))
                })
            }
        }

        deserializer.deserialize_str(Visitor {})
    }
}
