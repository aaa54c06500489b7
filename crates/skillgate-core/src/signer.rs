//! EIP-712 structured-data signer for license mint authorizations.
//!
//! Domain: `name = "SkillChainLicense"`, `version = "1"`, parameterized by
//! chain id and verifying contract. Primary type:
//! `MintLicense(address user,uint256 toolId,uint256 expiresAt,uint256 nonce)`.
//!
//! The signer is stateless after construction and safe for concurrent use.

use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use thiserror::Error;

use crate::model::SignatureParts;

const DOMAIN_NAME: &str = "SkillChainLicense";
const DOMAIN_VERSION: &str = "1";

const EIP712_DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const MINT_LICENSE_TYPE: &[u8] =
    b"MintLicense(address user,uint256 toolId,uint256 expiresAt,uint256 nonce)";

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

pub struct Eip712Signer {
    signing_key: SigningKey,
    address: Address,
    domain_separator: B256,
}

impl Eip712Signer {
    /// Build a signer from a hex private key (optional `0x` prefix), the
    /// chain id and the verifying contract address.
    pub fn new(
        private_key_hex: &str,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Result<Self, SignerError> {
        let raw = private_key_hex.trim_start_matches("0x");
        let bytes = hex::decode(raw).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = address_of(signing_key.verifying_key());

        let domain_separator = keccak256(encode_words(&[
            keccak256(EIP712_DOMAIN_TYPE),
            keccak256(DOMAIN_NAME.as_bytes()),
            keccak256(DOMAIN_VERSION.as_bytes()),
            B256::from(U256::from(chain_id)),
            verifying_contract.into_word(),
        ]));

        Ok(Self {
            signing_key,
            address,
            domain_separator,
        })
    }

    /// Public address of the configured private key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a `MintLicense` message; `v` is normalized to 27 or 28.
    pub fn create_license_signature(
        &self,
        user: Address,
        tool_id: U256,
        expires_at: U256,
        nonce: U256,
    ) -> Result<SignatureParts, SignerError> {
        let digest = self.signing_hash(user, tool_id, expires_at, nonce);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| SignerError::Recovery(e.to_string()))?;

        let bytes = signature.to_bytes();
        Ok(SignatureParts {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..]),
            v: 27 + recovery_id.to_byte(),
        })
    }

    /// Recover the signer of a `MintLicense` message and compare against our
    /// own address. Malformed signature material is an error; a well-formed
    /// signature by someone else is `Ok(false)`.
    pub fn verify_signature(
        &self,
        user: Address,
        tool_id: U256,
        expires_at: U256,
        nonce: U256,
        parts: &SignatureParts,
    ) -> Result<bool, SignerError> {
        let digest = self.signing_hash(user, tool_id, expires_at, nonce);

        let mut raw = [0u8; 65];
        raw[..32].copy_from_slice(parts.r.as_slice());
        raw[32..64].copy_from_slice(parts.s.as_slice());
        raw[64] = parts.v;

        let recovered = recover_address(digest, &raw)?;
        Ok(recovered == self.address)
    }

    /// `keccak256(0x19 0x01 || domainSeparator || structHash(message))`.
    fn signing_hash(&self, user: Address, tool_id: U256, expires_at: U256, nonce: U256) -> B256 {
        let struct_hash = keccak256(encode_words(&[
            keccak256(MINT_LICENSE_TYPE),
            user.into_word(),
            B256::from(tool_id),
            B256::from(expires_at),
            B256::from(nonce),
        ]));

        let mut raw = Vec::with_capacity(2 + 32 + 32);
        raw.extend_from_slice(&[0x19, 0x01]);
        raw.extend_from_slice(self.domain_separator.as_slice());
        raw.extend_from_slice(struct_hash.as_slice());
        keccak256(raw)
    }
}

/// Recover the signing address from a 32-byte digest and a 65-byte
/// `r || s || v` signature. Accepts `v` in both 0/1 and 27/28 forms.
pub fn recover_address(digest: B256, signature: &[u8]) -> Result<Address, SignerError> {
    if signature.len() != 65 {
        return Err(SignerError::Recovery(format!(
            "expected 65-byte signature, got {}",
            signature.len()
        )));
    }

    let v = signature[64];
    let v = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| SignerError::Recovery(format!("invalid recovery id {v}")))?;

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| SignerError::Recovery(e.to_string()))?;

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|e| SignerError::Recovery(e.to_string()))?;

    Ok(address_of(&key))
}

/// Ethereum address of a secp256k1 public key:
/// last 20 bytes of `keccak256(uncompressed_pubkey[1..])`.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// 32-byte ABI words concatenated in order.
fn encode_words(words: &[B256]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 32);
    for w in words {
        out.extend_from_slice(w.as_slice());
    }
    out
}
