/// A reply as handed back by a [`Transport`](crate::transport::Transport).
///
/// Byte strings stay raw here; turning them into text is the decoder's job.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Int(i64),
    Bytes(Vec<u8>),
    Array(Vec<Reply>),
    Map(Vec<(Reply, Reply)>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Bytes(bytes.into())
    }

    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Reply>,
    {
        Reply::Array(items.into_iter().map(Into::into).collect())
    }

    /// Short name of the variant, used in protocol error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Status(_) => "status",
            Reply::Int(_) => "integer",
            Reply::Bytes(_) => "bulk string",
            Reply::Array(_) => "array",
            Reply::Map(_) => "map",
        }
    }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self {
        Reply::Int(n)
    }
}

impl From<bool> for Reply {
    fn from(b: bool) -> Self {
        Reply::Int(if b { 1 } else { 0 })
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Bytes(s.into_bytes())
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Bytes(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Reply {
    fn from(bytes: Vec<u8>) -> Self {
        Reply::Bytes(bytes)
    }
}

impl From<Option<Vec<u8>>> for Reply {
    fn from(opt: Option<Vec<u8>>) -> Self {
        match opt {
            Some(bytes) => Reply::Bytes(bytes),
            None => Reply::Nil,
        }
    }
}

impl From<redis::Value> for Reply {
    fn from(value: redis::Value) -> Self {
        match value {
            redis::Value::Nil => Reply::Nil,
            redis::Value::Int(n) => Reply::Int(n),
            redis::Value::Data(bytes) => Reply::Bytes(bytes),
            redis::Value::Bulk(items) => Reply::array(items),
            redis::Value::Status(s) => Reply::Status(s),
            redis::Value::Okay => Reply::ok(),
        }
    }
}
