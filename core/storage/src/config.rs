//! Decoding of opaque adapter configuration.

use serde::de::DeserializeOwned;
use serde_json::Value;

use omnistore_common::{Error, Result};

/// Decode an adapter's configuration from its JSON value.
///
/// A `null` value is treated as an empty object so that adapters with no
/// required fields can be resolved without configuration.
pub fn decode<T: DeserializeOwned>(adapter: &str, config: Value) -> Result<T> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config
    };
    serde_json::from_value(config)
        .map_err(|e| Error::Config(format!("{} adapter: {}", adapter, e)))
}

/// Fail with a configuration error if `value` is blank.
pub fn require(adapter: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!(
            "{} adapter requires '{}'",
            adapter, field
        )));
    }
    Ok(())
}

/// Trim trailing slashes and spaces from a configured domain.
pub fn trim_domain(domain: &str) -> String {
    domain.trim_end_matches(['/', ' ']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        access_key: String,
        #[serde(default)]
        expire: i64,
    }

    #[test]
    fn test_decode() {
        let cfg: Sample = decode("sample", serde_json::json!({"accessKey": "ak"})).unwrap();
        assert_eq!(cfg.access_key, "ak");
        assert_eq!(cfg.expire, 0);
    }

    #[test]
    fn test_decode_missing_field() {
        let err = decode::<Sample>("sample", Value::Null).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_require() {
        assert!(require("sample", "bucket", "b").is_ok());
        assert!(matches!(require("sample", "bucket", "  "), Err(Error::Config(_))));
    }

    #[test]
    fn test_trim_domain() {
        assert_eq!(trim_domain("https://cdn.example.org/ "), "https://cdn.example.org");
    }
}
