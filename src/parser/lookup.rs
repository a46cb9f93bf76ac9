use serde_json::Value;

/// One step of a lookup path into an untyped payload.
#[derive(Debug, Clone, Copy)]
pub enum Seg<'a> {
    Key(&'a str),
    Index(usize),
}

/// Optional cursor over a JSON tree. Every step returns another cursor;
/// a missing key, a `null`, or a type mismatch turns it into `Lookup::absent()`.
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a>(Option<&'a Value>);

impl<'a> Lookup<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(Some(value).filter(|v| !v.is_null()))
    }

    pub fn key(self, key: &str) -> Self {
        Self(self.0.and_then(|v| v.get(key)).filter(|v| !v.is_null()))
    }

    pub fn index(self, idx: usize) -> Self {
        Self(self.0.and_then(|v| v.get(idx)).filter(|v| !v.is_null()))
    }

    pub fn path(self, segs: &[Seg<'_>]) -> Self {
        segs.iter().fold(self, |cur, seg| match seg {
            Seg::Key(k) => cur.key(k),
            Seg::Index(i) => cur.index(*i),
        })
    }

    pub fn value(self) -> Option<&'a Value> {
        self.0
    }

    /// Elements of an array, or nothing when this is not an array.
    pub fn items(self) -> impl Iterator<Item = Lookup<'a>> {
        self.0
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(Lookup::new)
    }

    pub fn as_bool(self) -> Option<bool> {
        self.0.and_then(Value::as_bool)
    }

    /// Non-empty trimmed string.
    pub fn as_text(self) -> Option<&'a str> {
        self.0
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn as_i64(self) -> Option<i64> {
        self.0.and_then(Value::as_i64)
    }

    /// Strings verbatim, integers in decimal. Used for identities, which
    /// upstream sends either way.
    pub fn as_ident(self) -> Option<String> {
        match self.0? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
            _ => None,
        }
    }
}
