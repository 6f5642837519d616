//! Request field extraction from query strings and urlencoded bodies.

use std::collections::HashMap;

/// Submitted request fields. The first value seen for a name wins, so
/// merging the body before the query string gives body values precedence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormFields {
    values: HashMap<String, String>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single urlencoded document
    pub fn parse(input: &str) -> Self {
        let mut fields = Self::new();
        fields.merge(input);
        fields
    }

    /// Add fields from an urlencoded document without overriding existing ones
    pub fn merge(&mut self, input: &str) {
        match serde_urlencoded::from_str::<Vec<(String, String)>>(input) {
            Ok(pairs) => {
                for (name, value) in pairs {
                    self.values.entry(name).or_insert(value);
                }
            }
            Err(err) => tracing::debug!(error = %err, "Skipping undecodable form document"),
        }
    }

    /// Raw value, possibly empty
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value if present and non-empty
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FormFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (name, value) in iter {
            fields.values.entry(name.into()).or_insert_with(|| value.into());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decodes_values() {
        let fields = FormFields::parse("Action=User.Login&Username=alice%40example.com&Note=hi+there");
        assert_eq!(fields.get("Action"), Some("User.Login"));
        assert_eq!(fields.get("Username"), Some("alice@example.com"));
        assert_eq!(fields.get("Note"), Some("hi there"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_first_value_wins() {
        let mut fields = FormFields::parse("User=body&User=dup");
        fields.merge("User=query&Extra=1");
        assert_eq!(fields.get("User"), Some("body"));
        assert_eq!(fields.get("Extra"), Some("1"));
    }

    #[test]
    fn test_empty_and_flag_fields() {
        let fields = FormFields::parse("Reload&CaptchaId=&&Width=10");
        assert_eq!(fields.get("Reload"), Some(""));
        assert_eq!(fields.non_empty("Reload"), None);
        assert_eq!(fields.non_empty("CaptchaId"), None);
        assert_eq!(fields.non_empty("Width"), Some("10"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let fields = FormFields::parse("Bad=%FF&Good=ok");
        assert_eq!(fields.get("Bad"), Some("\u{FFFD}"));
        assert_eq!(fields.get("Good"), Some("ok"));
    }
}
