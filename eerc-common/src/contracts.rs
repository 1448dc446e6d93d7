//! Contract calls keyed by address + function signature + arguments.
//!
//! Calldata is `keccak256(signature)[..4] ++ abi.encode(args)`, so a call
//! can be handed to any [`ChainClient`] or [`WalletConnector`] without an
//! ABI file.
//!
//! [`WalletConnector`]: crate::WalletConnector

use std::fmt;

use ethers_core::{
    abi::{self, ParamType, Token},
    types::{Address, Bytes, U256},
    utils::keccak256,
};

use crate::capabilities::ChainClient;
use crate::error::ExternalError;
use crate::types::AuditorKey;
use crate::MAX_DECIMALS;

/// A single contract function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub to: Address,
    /// Canonical signature, e.g. `approve(address,uint256)`.
    pub signature: &'static str,
    pub args: Vec<Token>,
}

impl ContractCall {
    pub fn new(to: Address, signature: &'static str, args: Vec<Token>) -> Self {
        Self { to, signature, args }
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature.as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub fn calldata(&self) -> Bytes {
        let mut data = self.selector().to_vec();
        data.extend_from_slice(&abi::encode(&self.args));
        Bytes::from(data)
    }

    /// Function name without the parameter list.
    pub fn function(&self) -> &'static str {
        self.signature
            .split_once('(')
            .map(|(name, _)| name)
            .unwrap_or(self.signature)
    }
}

impl fmt::Display for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{}", self.to, self.signature)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

/// ERC-20 surface used by the allowance negotiator.
pub mod erc20 {
    use super::*;

    pub fn decimals(token: Address) -> ContractCall {
        ContractCall::new(token, "decimals()", vec![])
    }

    pub fn allowance(token: Address, owner: Address, spender: Address) -> ContractCall {
        ContractCall::new(
            token,
            "allowance(address,address)",
            vec![Token::Address(owner), Token::Address(spender)],
        )
    }

    pub fn approve(token: Address, spender: Address, amount: U256) -> ContractCall {
        ContractCall::new(
            token,
            "approve(address,uint256)",
            vec![Token::Address(spender), Token::Uint(amount)],
        )
    }
}

/// eERC converter administration surface.
pub mod converter {
    use super::*;

    pub fn owner(converter: Address) -> ContractCall {
        ContractCall::new(converter, "owner()", vec![])
    }

    pub fn registrar(converter: Address) -> ContractCall {
        ContractCall::new(converter, "registrar()", vec![])
    }

    pub fn auditor(converter: Address) -> ContractCall {
        ContractCall::new(converter, "auditor()", vec![])
    }

    pub fn auditor_public_key(converter: Address) -> ContractCall {
        ContractCall::new(converter, "auditorPublicKey()", vec![])
    }

    pub fn is_auditor_key_set(converter: Address) -> ContractCall {
        ContractCall::new(converter, "isAuditorKeySet()", vec![])
    }

    pub fn set_auditor_public_key(converter: Address, user: Address) -> ContractCall {
        ContractCall::new(
            converter,
            "setAuditorPublicKey(address)",
            vec![Token::Address(user)],
        )
    }
}

/// Registrar membership queries.
pub mod registrar {
    use super::*;

    pub fn is_user_registered(registrar: Address, user: Address) -> ContractCall {
        ContractCall::new(
            registrar,
            "isUserRegistered(address)",
            vec![Token::Address(user)],
        )
    }

    pub fn get_user_public_key(registrar: Address, user: Address) -> ContractCall {
        ContractCall::new(
            registrar,
            "getUserPublicKey(address)",
            vec![Token::Address(user)],
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODING
// ═══════════════════════════════════════════════════════════════════════════════

fn decode(call: &ContractCall, types: &[ParamType], output: &[u8]) -> Result<Vec<Token>, ExternalError> {
    abi::decode(types, output).map_err(|e| {
        ExternalError::with_short(
            format!("Unexpected response from {}", call.function()),
            format!("{call}: {e}"),
        )
    })
}

fn malformed(call: &ContractCall) -> ExternalError {
    ExternalError::with_short(
        format!("Unexpected response from {}", call.function()),
        format!("{call}: output did not match the expected type"),
    )
}

async fn read_uint(chain: &dyn ChainClient, call: ContractCall) -> Result<U256, ExternalError> {
    let output = chain.call(&call).await?;
    decode(&call, &[ParamType::Uint(256)], &output)?
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| malformed(&call))
}

async fn read_address(chain: &dyn ChainClient, call: ContractCall) -> Result<Address, ExternalError> {
    let output = chain.call(&call).await?;
    decode(&call, &[ParamType::Address], &output)?
        .into_iter()
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| malformed(&call))
}

async fn read_bool(chain: &dyn ChainClient, call: ContractCall) -> Result<bool, ExternalError> {
    let output = chain.call(&call).await?;
    decode(&call, &[ParamType::Bool], &output)?
        .into_iter()
        .next()
        .and_then(Token::into_bool)
        .ok_or_else(|| malformed(&call))
}

async fn read_uint_pair(
    chain: &dyn ChainClient,
    call: ContractCall,
    types: &[ParamType],
) -> Result<(U256, U256), ExternalError> {
    let output = chain.call(&call).await?;
    let mut tokens = decode(&call, types, &output)?;
    // uint256[2] decodes to a single fixed array; (uint256,uint256) to two tokens.
    if tokens.len() == 1 {
        tokens = tokens
            .pop()
            .and_then(Token::into_fixed_array)
            .ok_or_else(|| malformed(&call))?;
    }
    let mut values = tokens.into_iter().map(Token::into_uint);
    match (values.next().flatten(), values.next().flatten()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(malformed(&call)),
    }
}

/// `decimals()` of an ERC-20 token. Counts above [`MAX_DECIMALS`] are
/// reported as an error instead of being passed on.
pub async fn read_decimals(chain: &dyn ChainClient, token: Address) -> Result<u32, ExternalError> {
    let call = erc20::decimals(token);
    let value = read_uint(chain, call.clone()).await?;
    if value > U256::from(MAX_DECIMALS) {
        return Err(ExternalError::with_short(
            format!("Token reports {value} decimals; at most {MAX_DECIMALS} are supported"),
            format!("{call} returned {value}"),
        ));
    }
    Ok(value.as_u32())
}

pub async fn read_allowance(
    chain: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, ExternalError> {
    read_uint(chain, erc20::allowance(token, owner, spender)).await
}

pub async fn read_owner(chain: &dyn ChainClient, converter: Address) -> Result<Address, ExternalError> {
    read_address(chain, converter::owner(converter)).await
}

pub async fn read_registrar(
    chain: &dyn ChainClient,
    converter: Address,
) -> Result<Address, ExternalError> {
    read_address(chain, converter::registrar(converter)).await
}

pub async fn read_auditor(chain: &dyn ChainClient, converter: Address) -> Result<Address, ExternalError> {
    read_address(chain, converter::auditor(converter)).await
}

pub async fn read_auditor_public_key(
    chain: &dyn ChainClient,
    converter: Address,
) -> Result<AuditorKey, ExternalError> {
    let (x, y) = read_uint_pair(
        chain,
        converter::auditor_public_key(converter),
        &[ParamType::Uint(256), ParamType::Uint(256)],
    )
    .await?;
    Ok(AuditorKey { x, y })
}

pub async fn read_is_auditor_key_set(
    chain: &dyn ChainClient,
    converter: Address,
) -> Result<bool, ExternalError> {
    read_bool(chain, converter::is_auditor_key_set(converter)).await
}

pub async fn read_is_user_registered(
    chain: &dyn ChainClient,
    registrar: Address,
    user: Address,
) -> Result<bool, ExternalError> {
    read_bool(chain, registrar::is_user_registered(registrar, user)).await
}

pub async fn read_user_public_key(
    chain: &dyn ChainClient,
    registrar: Address,
    user: Address,
) -> Result<(U256, U256), ExternalError> {
    read_uint_pair(
        chain,
        registrar::get_user_public_key(registrar, user),
        &[ParamType::FixedArray(Box::new(ParamType::Uint(256)), 2)],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_selector_matches_erc20() {
        let call = erc20::approve(Address::zero(), Address::zero(), U256::zero());
        assert_eq!(hex::encode(call.selector()), "095ea7b3");
        assert_eq!(call.function(), "approve");
    }

    #[test]
    fn allowance_calldata_layout() {
        let owner = Address::repeat_byte(0x11);
        let spender = Address::repeat_byte(0x22);
        let data = erc20::allowance(Address::zero(), owner, spender).calldata();
        assert_eq!(&data[..4], &[0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[16..36], owner.as_bytes());
        assert_eq!(&data[48..68], spender.as_bytes());
    }

    #[test]
    fn calls_compare_by_target_and_arguments() {
        let owner = Address::repeat_byte(0x11);
        let call = erc20::allowance(Address::zero(), owner, Address::zero());
        assert_eq!(call, call.clone());
        assert_ne!(call, erc20::allowance(Address::zero(), Address::zero(), owner));
    }

    #[test]
    fn decode_rejects_short_output() {
        let call = erc20::decimals(Address::zero());
        assert!(decode(&call, &[ParamType::Uint(256)], &[0u8; 4]).is_err());
    }
}
