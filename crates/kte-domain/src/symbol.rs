//! Korean equity symbol: a zero-padded 6-digit numeric code.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Normalizes to a zero-padded 6-digit code. Panics if `raw` is not
    /// all-numeric or longer than 6 digits — callers at the broker/config
    /// boundary should validate before constructing.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        assert!(
            !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()),
            "symbol must be all-numeric: {raw:?}"
        );
        assert!(raw.len() <= 6, "symbol too long: {raw:?}");
        Symbol(format!("{raw:0>6}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps a symbol to a human display name, for logging/events only — never
/// consulted by trading logic (§SPEC_FULL C.2).
#[derive(Clone, Debug, Default)]
pub struct SymbolDirectory {
    names: std::collections::BTreeMap<Symbol, String>,
}

impl SymbolDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol, display_name: impl Into<String>) {
        self.names.insert(symbol, display_name.into());
    }

    pub fn display_name(&self, symbol: &Symbol) -> &str {
        self.names
            .get(symbol)
            .map(|s| s.as_str())
            .unwrap_or(symbol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pads_short_codes() {
        assert_eq!(Symbol::new("5930").as_str(), "005930");
    }

    #[test]
    fn equality_is_zero_padded() {
        assert_eq!(Symbol::new("5930"), Symbol::new("005930"));
    }

    #[test]
    #[should_panic]
    fn rejects_non_numeric() {
        Symbol::new("AAPL1");
    }

    #[test]
    fn directory_falls_back_to_code() {
        let dir = SymbolDirectory::new();
        let sym = Symbol::new("005930");
        assert_eq!(dir.display_name(&sym), "005930");
    }
}
