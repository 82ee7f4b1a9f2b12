use serde::{Deserialize, Serialize};

/// Rendering of fetched payload bytes inside JSON responses.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// UTF-8 text; invalid sequences become U+FFFD.
    #[default]
    Text,
    /// Standard base64 with padding.
    Base64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_snake_case_names() {
        let encoding: PayloadEncoding = serde_json::from_str(r#""base64""#).unwrap();
        assert_eq!(encoding, PayloadEncoding::Base64);
        assert_eq!(PayloadEncoding::default(), PayloadEncoding::Text);
    }
}
