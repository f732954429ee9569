//! Normalizes raw replies into printable values.
//!
//! Decoding never fails: byte strings that are not valid UTF-8 are rendered
//! as lowercase hex, which can always be turned back into the original bytes.

use std::fmt;

use crate::reply::Reply;

/// Printable form of a reply or scan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Nil,
    Int(i64),
    Text(String),
    List(Vec<Decoded>),
    /// Key/value pairs in the order the store sent them. The protocol gives
    /// no ordering guarantee, so callers must not depend on it.
    Map(Vec<(Decoded, Decoded)>),
}

pub trait Decode {
    fn decode(&self) -> Decoded;
}

/// UTF-8 text when possible, lowercase hex otherwise.
pub fn decode_bytes(bytes: &[u8]) -> Decoded {
    match std::str::from_utf8(bytes) {
        Ok(text) => Decoded::Text(text.to_string()),
        Err(_) => Decoded::Text(to_hex(bytes)),
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    use fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

impl Decode for [u8] {
    fn decode(&self) -> Decoded {
        decode_bytes(self)
    }
}

impl Decode for Vec<u8> {
    fn decode(&self) -> Decoded {
        decode_bytes(self)
    }
}

impl Decode for str {
    fn decode(&self) -> Decoded {
        Decoded::Text(self.to_string())
    }
}

impl Decode for Reply {
    fn decode(&self) -> Decoded {
        match self {
            Reply::Nil => Decoded::Nil,
            Reply::Int(n) => Decoded::Int(*n),
            Reply::Status(s) => Decoded::Text(s.clone()),
            Reply::Bytes(bytes) => decode_bytes(bytes),
            Reply::Array(items) => Decoded::List(items.iter().map(Decode::decode).collect()),
            Reply::Map(pairs) => {
                let pairs = pairs.iter().map(|(k, v)| (k.decode(), v.decode()));
                Decoded::Map(pairs.collect())
            }
        }
    }
}

impl Decode for Decoded {
    fn decode(&self) -> Decoded {
        self.clone()
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Nil => write!(f, "(nil)"),
            Decoded::Int(n) => write!(f, "{}", n),
            Decoded::Text(s) => write!(f, "{}", s),
            Decoded::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Decoded::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
