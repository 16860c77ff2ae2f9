use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps a sensitive value (passport numbers, document ids) so it never
/// leaks through `Debug` or `Display`, e.g. in `tracing::info!("{:?}", passenger)`.
///
/// Serialization still emits the real value; API responses need it.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// Last characters kept visible in redacted output.
    const VISIBLE_TAIL: usize = 2;

    fn redacted(&self) -> String {
        let value = self.0.as_ref();
        let count = value.chars().count();
        if count <= Self::VISIBLE_TAIL * 2 {
            return "*".repeat(count.max(4));
        }
        let tail: String = value.chars().skip(count - Self::VISIBLE_TAIL).collect();
        format!("{}{}", "*".repeat(count - Self::VISIBLE_TAIL), tail)
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_ref().is_empty()
    }

    pub fn expose(&self) -> &str {
        self.0.as_ref()
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Masked({})", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Masked(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_value() {
        let passport = Masked::from("X1234567");
        let shown = format!("{:?}", passport);
        assert!(!shown.contains("X12345"));
        assert!(shown.ends_with("67)"));
    }

    #[test]
    fn test_short_values_fully_hidden() {
        assert_eq!(Masked::from("AB").to_string(), "****");
        assert_eq!(Masked::from("").to_string(), "****");
    }

    #[test]
    fn test_serialization_keeps_value() {
        let json = serde_json::to_string(&Masked::from("P998877")).unwrap();
        assert_eq!(json, "\"P998877\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose(), "P998877");
    }
}
