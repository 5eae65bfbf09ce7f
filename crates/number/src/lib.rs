//! Conversions between the 256 bit integers used for token amounts and the
//! arbitrary precision types they are stored as in postgres `numeric`
//! columns.

use {
    anyhow::{Result, ensure},
    bigdecimal::{BigDecimal, num_bigint::ToBigInt},
    num::{BigInt, BigUint, bigint::Sign},
    primitive_types::U256,
};

pub fn u256_to_big_uint(input: &U256) -> BigUint {
    let mut bytes = [0; 32];
    input.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

pub fn u256_to_big_decimal(input: &U256) -> BigDecimal {
    BigDecimal::from(BigInt::from(u256_to_big_uint(input)))
}

pub fn big_uint_to_u256(input: &BigUint) -> Result<U256> {
    let bytes = input.to_bytes_be();
    ensure!(bytes.len() <= 32, "does not fit in u256");
    Ok(U256::from_big_endian(&bytes))
}

/// Returns `None` for negative or fractional values which can never
/// correspond to a token amount.
pub fn big_decimal_to_u256(input: &BigDecimal) -> Option<U256> {
    if !input.is_integer() {
        return None;
    }
    let big_int = input.to_bigint()?;
    if big_int.sign() == Sign::Minus {
        return None;
    }
    big_uint_to_u256(big_int.magnitude()).ok()
}
