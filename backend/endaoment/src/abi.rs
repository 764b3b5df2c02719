//! Minimal Solidity ABI codec: the types the EnDAOment contracts use.
//!
//! | Solidity       | [`Token`]          | Head/tail |
//! |----------------|--------------------|-----------|
//! | `address`      | `Address`          | static    |
//! | `uint256`      | `Uint` (≤ u128)    | static    |
//! | `bool`         | `Bool`             | static    |
//! | `bytes32`      | `Bytes32`          | static    |
//! | `string`       | `String`           | dynamic   |
//! | `T[]`          | `Array`            | dynamic   |
//!
//! Amounts in this system never exceed `u128`; decoding a larger `uint256`
//! is reported as an error rather than truncated.

use serde_json::{json, Value};
use tiny_keccak::{Hasher, Keccak};

use crate::errors::{EndaomentError, Result};

pub use endaoment_sim::Address;

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    Bytes32([u8; 32]),
    String(String),
    Array(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    Bool,
    Bytes32,
    String,
    Array(Box<ParamType>),
}

impl ParamType {
    fn is_dynamic(&self) -> bool {
        matches!(self, ParamType::String | ParamType::Array(_))
    }
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_) | Token::Array(_))
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_uint(self) -> Option<u128> {
        match self {
            Token::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_bytes32(self) -> Option<[u8; 32]> {
        match self {
            Token::Bytes32(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Token>> {
        match self {
            Token::Array(items) => Some(items),
            _ => None,
        }
    }

    /// JSON rendering used for stored constructor arguments. Integers are
    /// strings so that values above 2^53 survive JavaScript consumers.
    pub fn to_json(&self) -> Value {
        match self {
            Token::Address(a) => json!(a.to_string()),
            Token::Uint(v) => json!(v.to_string()),
            Token::Bool(b) => json!(b),
            Token::Bytes32(b) => json!(format!("0x{}", hex::encode(b))),
            Token::String(s) => json!(s),
            Token::Array(items) => Value::Array(items.iter().map(Token::to_json).collect()),
        }
    }
}

pub fn tokens_to_json(tokens: &[Token]) -> Value {
    Value::Array(tokens.iter().map(Token::to_json).collect())
}

// ─────────────────────────────────────────────────────────
// Hashing
// ─────────────────────────────────────────────────────────

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// First four bytes of the keccak hash of a canonical signature such as
/// `transfer(address,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `deposit(uint256,address)` → `deposit`
pub fn function_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or(signature)
}

// ─────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_static(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Address(a) => {
            out.extend_from_slice(&[0u8; 12]);
            out.extend_from_slice(a.as_bytes());
        }
        Token::Uint(v) => out.extend_from_slice(&uint_word(*v)),
        Token::Bool(b) => out.extend_from_slice(&uint_word(u128::from(*b))),
        Token::Bytes32(b) => out.extend_from_slice(b),
        Token::String(_) | Token::Array(_) => {}
    }
}

fn encode_dynamic(token: &Token) -> Vec<u8> {
    match token {
        Token::String(s) => {
            let bytes = s.as_bytes();
            let mut out = uint_word(bytes.len() as u128).to_vec();
            out.extend_from_slice(bytes);
            let padding = (WORD - bytes.len() % WORD) % WORD;
            out.extend(std::iter::repeat(0u8).take(padding));
            out
        }
        Token::Array(items) => {
            let mut out = uint_word(items.len() as u128).to_vec();
            out.extend(encode(items));
            out
        }
        other => {
            let mut out = Vec::with_capacity(WORD);
            encode_static(other, &mut out);
            out
        }
    }
}

/// Encode a tuple of tokens with standard head/tail layout.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend(encode_dynamic(token));
        } else {
            encode_static(token, &mut head);
        }
    }

    head.extend(tail);
    head
}

pub fn encode_function_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

// ─────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────

/// `start + len`, as an ABI error when the sum overflows.
fn span_end(start: usize, len: usize) -> Result<usize> {
    start
        .checked_add(len)
        .ok_or_else(|| EndaomentError::Abi(format!("offset {start} + length {len} overflows")))
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    data.get(offset..span_end(offset, WORD)?)
        .ok_or_else(|| EndaomentError::Abi(format!("return data too short at offset {offset}")))
}

fn read_uint(data: &[u8], offset: usize) -> Result<u128> {
    let word = word_at(data, offset)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(EndaomentError::Abi("uint256 value overflows u128".to_string()));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(bytes))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize> {
    usize::try_from(read_uint(data, offset)?)
        .map_err(|_| EndaomentError::Abi("offset does not fit in usize".to_string()))
}

fn decode_static(kind: &ParamType, data: &[u8], offset: usize) -> Result<Token> {
    let word = word_at(data, offset)?;
    Ok(match kind {
        ParamType::Address => {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&word[12..]);
            Token::Address(Address(bytes))
        }
        ParamType::Uint => Token::Uint(read_uint(data, offset)?),
        ParamType::Bool => Token::Bool(word[31] != 0),
        ParamType::Bytes32 => {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(word);
            Token::Bytes32(bytes)
        }
        ParamType::String | ParamType::Array(_) => {
            return Err(EndaomentError::Abi("dynamic type in static position".to_string()))
        }
    })
}

fn decode_dynamic(kind: &ParamType, data: &[u8], offset: usize) -> Result<Token> {
    let len = read_usize(data, offset)?;
    let body = span_end(offset, WORD)?;
    match kind {
        ParamType::String => {
            let bytes = data
                .get(body..span_end(body, len)?)
                .ok_or_else(|| EndaomentError::Abi("string runs past end of data".to_string()))?;
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| EndaomentError::Abi(format!("string is not UTF-8: {e}")))?;
            Ok(Token::String(s))
        }
        ParamType::Array(inner) => {
            let rest = data
                .get(body..)
                .ok_or_else(|| EndaomentError::Abi("array runs past end of data".to_string()))?;
            // Every element takes at least one head word.
            if len > rest.len() / WORD {
                return Err(EndaomentError::Abi(format!(
                    "array length {len} exceeds the {} byte(s) left",
                    rest.len()
                )));
            }
            let kinds = vec![(**inner).clone(); len];
            Ok(Token::Array(decode(&kinds, rest)?))
        }
        other => decode_static(other, data, offset),
    }
}

/// Decode a tuple of the given types.
pub fn decode(kinds: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let head = i * WORD;
            if kind.is_dynamic() {
                let offset = read_usize(data, head)?;
                decode_dynamic(kind, data, offset)
            } else {
                decode_static(kind, data, head)
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
