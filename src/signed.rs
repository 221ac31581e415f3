// src/signed.rs
//! Signed price quotes: the EIP-712 message the price signer signs and the
//! 149 byte `paymasterAndData` layout that carries it.
use std::ops::Range;

use ethers::abi::{self, Token};
use ethers::types::transaction::eip712::{EIP712Domain, Eip712, Eip712Error};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::codec::{read_address, read_word, ADDRESS_LEN, WORD_LEN};
use crate::error::PaymasterError;
use crate::types::SignedPriceQuote;

/// One field of the signed `PaymasterPrice` struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceField {
    pub name: &'static str,
    pub bits: usize,
}

impl PriceField {
    pub const fn width(&self) -> usize {
        self.bits / 8
    }

    pub fn max_value(&self) -> U256 {
        (U256::one() << self.bits) - 1
    }
}

pub const PRICE_FIELD: PriceField = PriceField { name: "price", bits: 160 };
pub const SIGNED_AT_FIELD: PriceField = PriceField { name: "signedAt", bits: 48 };
pub const VALID_UNTIL_FIELD: PriceField = PriceField { name: "validUntil", bits: 48 };

/// Field order of the signed struct, which is also their payload order.
pub const PAYMASTER_PRICE_FIELDS: [PriceField; 3] = [PRICE_FIELD, SIGNED_AT_FIELD, VALID_UNTIL_FIELD];

pub const SIGNATURE_LEN: usize = 65;

pub const PAYMASTER_RANGE: Range<usize> = 0..ADDRESS_LEN;
pub const MAX_COST_RANGE: Range<usize> = PAYMASTER_RANGE.end..PAYMASTER_RANGE.end + WORD_LEN;
pub const PRICE_RANGE: Range<usize> = MAX_COST_RANGE.end..MAX_COST_RANGE.end + PRICE_FIELD.width();
pub const SIGNED_AT_RANGE: Range<usize> = PRICE_RANGE.end..PRICE_RANGE.end + SIGNED_AT_FIELD.width();
pub const VALID_UNTIL_RANGE: Range<usize> =
    SIGNED_AT_RANGE.end..SIGNED_AT_RANGE.end + VALID_UNTIL_FIELD.width();
pub const SIGNATURE_RANGE: Range<usize> = VALID_UNTIL_RANGE.end..VALID_UNTIL_RANGE.end + SIGNATURE_LEN;

pub const SIGNED_PAYLOAD_LEN: usize = SIGNATURE_RANGE.end;

/// EIP-712 domain identity of a paymaster contract generation. The chain id
/// and verifying contract are filled in per quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceProtocol {
    pub name: &'static str,
    pub version: &'static str,
}

impl PriceProtocol {
    pub const PIMLICO: Self = Self {
        name: "PimlicoERC20Paymaster",
        version: "0.0.1",
    };

    pub const ERC20_PAYMASTER: Self = Self {
        name: "ERC20Paymaster",
        version: "0.0.1",
    };

    pub fn domain(&self, paymaster: Address, chain_id: u64) -> EIP712Domain {
        EIP712Domain {
            name: Some(self.name.to_string()),
            version: Some(self.version.to_string()),
            chain_id: Some(U256::from(chain_id)),
            verifying_contract: Some(paymaster),
            salt: None,
        }
    }
}

impl Default for PriceProtocol {
    fn default() -> Self {
        Self::PIMLICO
    }
}

/// `PaymasterPrice(uint160 price,uint48 signedAt,uint48 validUntil)`
pub fn paymaster_price_type() -> String {
    let fields = PAYMASTER_PRICE_FIELDS
        .iter()
        .map(|field| format!("uint{} {}", field.bits, field.name))
        .collect::<Vec<_>>();
    format!("PaymasterPrice({})", fields.join(","))
}

/// Rejects values that do not fit the signed field widths.
pub fn check_field_widths(price: U256, signed_at: u64, valid_until: u64) -> Result<(), PaymasterError> {
    let checks = [
        (PRICE_FIELD, price),
        (SIGNED_AT_FIELD, U256::from(signed_at)),
        (VALID_UNTIL_FIELD, U256::from(valid_until)),
    ];
    for (field, value) in checks {
        if value > field.max_value() {
            return Err(PaymasterError::malformed(format!(
                "{} {} does not fit in {} bits",
                field.name, value, field.bits
            )));
        }
    }
    Ok(())
}

/// A quote is only valid over a non-empty window: `validUntil > signedAt`.
pub fn check_validity_window(signed_at: u64, valid_until: u64) -> Result<(), PaymasterError> {
    if valid_until <= signed_at {
        return Err(PaymasterError::InvalidValidityWindow {
            signed_at,
            valid_until,
        });
    }
    Ok(())
}

/// The typed-data message signed by the price signer.
#[derive(Debug, Clone)]
pub struct PaymasterPrice {
    pub price: U256,
    pub signed_at: u64,
    pub valid_until: u64,
    domain: EIP712Domain,
}

impl PaymasterPrice {
    pub fn new(
        protocol: &PriceProtocol,
        paymaster: Address,
        chain_id: u64,
        price: U256,
        signed_at: u64,
        valid_until: u64,
    ) -> Self {
        Self {
            price,
            signed_at,
            valid_until,
            domain: protocol.domain(paymaster, chain_id),
        }
    }

    pub fn from_quote(protocol: &PriceProtocol, quote: &SignedPriceQuote) -> Self {
        Self::new(
            protocol,
            quote.paymaster_address,
            quote.chain_id,
            quote.price,
            quote.signed_at,
            quote.valid_until,
        )
    }
}

impl Eip712 for PaymasterPrice {
    type Error = Eip712Error;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(self.domain.clone())
    }

    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(keccak256(paymaster_price_type()))
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        let encoded = abi::encode(&[
            Token::FixedBytes(Self::type_hash()?.to_vec()),
            Token::Uint(self.price),
            Token::Uint(U256::from(self.signed_at)),
            Token::Uint(U256::from(self.valid_until)),
        ]);
        Ok(keccak256(encoded))
    }
}

impl SignedPriceQuote {
    /// EIP-712 digest the signature was produced over.
    pub fn signing_hash(&self, protocol: &PriceProtocol) -> Result<H256, PaymasterError> {
        check_field_widths(self.price, self.signed_at, self.valid_until)?;
        PaymasterPrice::from_quote(protocol, self)
            .encode_eip712()
            .map(H256::from)
            .map_err(|e| PaymasterError::InvalidSignature(e.to_string()))
    }

    pub fn recover_signer(&self, protocol: &PriceProtocol) -> Result<Address, PaymasterError> {
        let hash = self.signing_hash(protocol)?;
        let signature = Signature::try_from(&self.signature[..])
            .map_err(|e| PaymasterError::InvalidSignature(e.to_string()))?;
        signature
            .recover(hash)
            .map_err(|e| PaymasterError::InvalidSignature(e.to_string()))
    }
}

/// Consumer-side check of a decoded quote: the window must be well formed,
/// the signer must match and the quote must not be past `validUntil` at `now`.
pub fn verify_signed_quote(
    protocol: &PriceProtocol,
    quote: &SignedPriceQuote,
    expected_signer: Address,
    now: u64,
) -> Result<(), PaymasterError> {
    check_validity_window(quote.signed_at, quote.valid_until)?;
    let recovered = quote.recover_signer(protocol)?;
    if recovered != expected_signer {
        return Err(PaymasterError::SignerMismatch {
            expected: expected_signer,
            recovered,
        });
    }
    if now > quote.valid_until {
        return Err(PaymasterError::QuoteExpired {
            valid_until: quote.valid_until,
            now,
        });
    }
    Ok(())
}

/// Payload for a paymaster that takes a signed price from the operation.
/// The chain id is not carried; verifiers supply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPricePayload {
    pub paymaster: Address,
    /// Upper bound the sender accepts on the total token cost.
    pub max_cost: U256,
    pub price: U256,
    pub signed_at: u64,
    pub valid_until: u64,
    pub signature: Bytes,
}

impl SignedPricePayload {
    pub fn new(quote: &SignedPriceQuote, max_cost: U256) -> Self {
        Self {
            paymaster: quote.paymaster_address,
            max_cost,
            price: quote.price,
            signed_at: quote.signed_at,
            valid_until: quote.valid_until,
            signature: quote.signature.clone(),
        }
    }

    pub fn quote(&self, chain_id: u64) -> SignedPriceQuote {
        SignedPriceQuote {
            paymaster_address: self.paymaster,
            chain_id,
            price: self.price,
            signed_at: self.signed_at,
            valid_until: self.valid_until,
            signature: self.signature.clone(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, PaymasterError> {
        check_field_widths(self.price, self.signed_at, self.valid_until)?;
        check_validity_window(self.signed_at, self.valid_until)?;
        if self.signature.len() != SIGNATURE_LEN {
            return Err(PaymasterError::malformed(format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                self.signature.len()
            )));
        }

        let mut data = vec![0u8; SIGNED_PAYLOAD_LEN];
        data[PAYMASTER_RANGE].copy_from_slice(self.paymaster.as_bytes());
        self.max_cost.to_big_endian(&mut data[MAX_COST_RANGE]);

        let mut word = [0u8; WORD_LEN];
        self.price.to_big_endian(&mut word);
        data[PRICE_RANGE].copy_from_slice(&word[WORD_LEN - PRICE_FIELD.width()..]);

        data[SIGNED_AT_RANGE].copy_from_slice(&timestamp_bytes(self.signed_at));
        data[VALID_UNTIL_RANGE].copy_from_slice(&timestamp_bytes(self.valid_until));
        data[SIGNATURE_RANGE].copy_from_slice(&self.signature);

        Ok(Bytes::from(data))
    }

    /// Splits the payload into its fields. The signature is not checked.
    pub fn decode(data: &[u8]) -> Result<Self, PaymasterError> {
        if data.len() != SIGNED_PAYLOAD_LEN {
            return Err(PaymasterError::malformed(format!(
                "signed price payload must be {SIGNED_PAYLOAD_LEN} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            paymaster: read_address(data),
            max_cost: read_word(&data[MAX_COST_RANGE]),
            price: U256::from_big_endian(&data[PRICE_RANGE]),
            signed_at: read_timestamp(&data[SIGNED_AT_RANGE]),
            valid_until: read_timestamp(&data[VALID_UNTIL_RANGE]),
            signature: Bytes::from(data[SIGNATURE_RANGE].to_vec()),
        })
    }
}

pub fn encode_signed_payload(quote: &SignedPriceQuote, max_cost: U256) -> Result<Bytes, PaymasterError> {
    SignedPricePayload::new(quote, max_cost).encode()
}

fn timestamp_bytes(timestamp: u64) -> [u8; 6] {
    let mut out = [0u8; 6];
    out.copy_from_slice(&timestamp.to_be_bytes()[2..]);
    out
}

fn read_timestamp(data: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(data);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use ethers::signers::{LocalWallet, Signer};

    use super::*;

    const MAX_TIMESTAMP: u64 = 0xffff_ffff_ffff;

    fn paymaster() -> Address {
        "0x0123456789abcdef0123456789abcdef01234567".parse().unwrap()
    }

    fn wallet() -> LocalWallet {
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap()
    }

    fn quote(signature: Vec<u8>) -> SignedPriceQuote {
        SignedPriceQuote {
            paymaster_address: paymaster(),
            chain_id: 31337,
            price: U256::from(1_000_000_000_000u64),
            signed_at: 0,
            valid_until: MAX_TIMESTAMP,
            signature: Bytes::from(signature),
        }
    }

    async fn signed_quote(protocol: &PriceProtocol) -> SignedPriceQuote {
        let mut quote = quote(vec![]);
        let message = PaymasterPrice::from_quote(protocol, &quote);
        let signature = wallet().sign_typed_data(&message).await.unwrap();
        quote.signature = Bytes::from(signature.to_vec());
        quote
    }

    #[test]
    fn test_layout() {
        assert_eq!(SIGNED_PAYLOAD_LEN, 149);
        assert_eq!(MAX_COST_RANGE, 20..52);
        assert_eq!(PRICE_RANGE, 52..72);
        assert_eq!(SIGNED_AT_RANGE, 72..78);
        assert_eq!(VALID_UNTIL_RANGE, 78..84);
        assert_eq!(SIGNATURE_RANGE, 84..149);
        assert_eq!(
            paymaster_price_type(),
            "PaymasterPrice(uint160 price,uint48 signedAt,uint48 validUntil)"
        );
    }

    #[test]
    fn test_encode_decode() {
        let quote = quote((0u8..65).collect());
        let encoded = encode_signed_payload(&quote, U256::MAX).unwrap();
        assert_eq!(encoded.len(), 149);
        assert_eq!(&encoded[PAYMASTER_RANGE], paymaster().as_bytes());
        assert!(encoded[MAX_COST_RANGE].iter().all(|b| *b == 0xff));
        assert_eq!(
            hex::encode(&encoded[PRICE_RANGE]),
            "000000000000000000000000000000e8d4a51000"
        );
        assert_eq!(&encoded[SIGNED_AT_RANGE], &[0u8; 6]);
        assert_eq!(&encoded[VALID_UNTIL_RANGE], &[0xffu8; 6]);
        assert_eq!(&encoded[SIGNATURE_RANGE], &quote.signature[..]);

        let decoded = SignedPricePayload::decode(&encoded).unwrap();
        assert_eq!(decoded.max_cost, U256::MAX);
        assert_eq!(decoded.quote(31337), quote);
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        for len in [148, 150] {
            assert!(matches!(
                SignedPricePayload::decode(&vec![0u8; len]),
                Err(PaymasterError::MalformedPayload(_))
            ));
        }
    }

    #[test]
    fn test_rejects_oversized_fields() {
        let mut wide_price = quote(vec![0u8; 65]);
        wide_price.price = U256::one() << 160;
        assert!(matches!(
            encode_signed_payload(&wide_price, U256::zero()),
            Err(PaymasterError::MalformedPayload(msg)) if msg.contains("price")
        ));

        let mut late = quote(vec![0u8; 65]);
        late.valid_until = MAX_TIMESTAMP + 1;
        assert!(matches!(
            encode_signed_payload(&late, U256::zero()),
            Err(PaymasterError::MalformedPayload(msg)) if msg.contains("validUntil")
        ));

        let short_signature = quote(vec![0u8; 64]);
        assert!(matches!(
            encode_signed_payload(&short_signature, U256::zero()),
            Err(PaymasterError::MalformedPayload(_))
        ));

        let mut widest = quote(vec![0u8; 65]);
        widest.price = PRICE_FIELD.max_value();
        let decoded = SignedPricePayload::decode(&encode_signed_payload(&widest, U256::zero()).unwrap()).unwrap();
        assert_eq!(decoded.price, widest.price);
    }

    #[tokio::test]
    async fn test_signature_recovers_through_payload() {
        let protocol = PriceProtocol::PIMLICO;
        let quote = signed_quote(&protocol).await;
        let encoded = encode_signed_payload(&quote, U256::MAX).unwrap();
        let decoded = SignedPricePayload::decode(&encoded).unwrap().quote(31337);

        assert_eq!(decoded.recover_signer(&protocol).unwrap(), wallet().address());
        verify_signed_quote(&protocol, &decoded, wallet().address(), 1_700_000_000).unwrap();
    }

    #[tokio::test]
    async fn test_domain_binds_signature() {
        let protocol = PriceProtocol::PIMLICO;
        let quote = signed_quote(&protocol).await;

        let other_chain = SignedPriceQuote {
            chain_id: 1,
            ..quote.clone()
        };
        assert!(matches!(
            verify_signed_quote(&protocol, &other_chain, wallet().address(), 0),
            Err(PaymasterError::SignerMismatch { .. })
        ));

        let other_paymaster = SignedPriceQuote {
            paymaster_address: Address::repeat_byte(0x11),
            ..quote.clone()
        };
        assert!(verify_signed_quote(&protocol, &other_paymaster, wallet().address(), 0).is_err());

        assert!(matches!(
            verify_signed_quote(&PriceProtocol::ERC20_PAYMASTER, &quote, wallet().address(), 0),
            Err(PaymasterError::SignerMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_quote() {
        let protocol = PriceProtocol::PIMLICO;
        let mut quote = quote(vec![]);
        quote.valid_until = 1_000;
        let message = PaymasterPrice::from_quote(&protocol, &quote);
        quote.signature = Bytes::from(wallet().sign_typed_data(&message).await.unwrap().to_vec());

        verify_signed_quote(&protocol, &quote, wallet().address(), 1_000).unwrap();
        assert_eq!(
            verify_signed_quote(&protocol, &quote, wallet().address(), 1_001),
            Err(PaymasterError::QuoteExpired {
                valid_until: 1_000,
                now: 1_001
            })
        );
    }

    #[tokio::test]
    async fn test_rejects_inverted_validity_window() {
        let mut inverted = quote(vec![0u8; 65]);
        inverted.signed_at = 1_000;
        inverted.valid_until = 500;
        assert_eq!(
            encode_signed_payload(&inverted, U256::zero()),
            Err(PaymasterError::InvalidValidityWindow {
                signed_at: 1_000,
                valid_until: 500
            })
        );

        let mut empty = quote(vec![0u8; 65]);
        empty.signed_at = 1_000;
        empty.valid_until = 1_000;
        assert!(matches!(
            encode_signed_payload(&empty, U256::zero()),
            Err(PaymasterError::InvalidValidityWindow { .. })
        ));

        // A correctly signed quote is still refused when its window is inverted.
        let protocol = PriceProtocol::PIMLICO;
        let message = PaymasterPrice::from_quote(&protocol, &inverted);
        inverted.signature = Bytes::from(wallet().sign_typed_data(&message).await.unwrap().to_vec());
        assert_eq!(
            verify_signed_quote(&protocol, &inverted, wallet().address(), 0),
            Err(PaymasterError::InvalidValidityWindow {
                signed_at: 1_000,
                valid_until: 500
            })
        );
    }

    #[test]
    fn test_garbage_signature() {
        let quote = quote(vec![0u8; 10]);
        assert!(matches!(
            quote.recover_signer(&PriceProtocol::PIMLICO),
            Err(PaymasterError::InvalidSignature(_))
        ));
    }
}
