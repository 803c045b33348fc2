//! Engine payload JSON -> relay submission JSON. `spec.md` §4.H step 5: "JSON-rewrite the
//! payload from engine camelCase+hex-numeric format into relay snake_case+decimal-numeric
//! format."

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("field `{0}` is not a hex string")]
    NotHex(String),
}

/// Fields that carry a hex-quantity (`"0x..."`) in engine-API JSON and a decimal string in
/// relay-API JSON.
const NUMERIC_HEX_FIELDS: &[&str] = &["blockNumber", "gasLimit", "gasUsed", "timestamp", "baseFeePerGas", "blobGasUsed", "excessBlobGas"];

/// camelCase field name -> relay snake_case field name.
fn snake_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn hex_to_decimal(value: &str) -> Result<String, Error> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    let n = u128::from_str_radix(trimmed, 16).map_err(|_| Error::NotHex(value.to_string()))?;
    Ok(n.to_string())
}

/// Converts a single engine-API execution-payload JSON object into the relay-API shape:
/// snake_case keys, with the known numeric-quantity fields rewritten from hex to decimal.
/// `transactions` and `withdrawals` entries are left as-is (already byte arrays / objects
/// whose sub-fields get the same treatment recursively).
pub fn to_relay_payload(payload: &Value) -> Result<Value, Error> {
    let object = payload.as_object().ok_or(Error::NotAnObject)?;
    let mut out = Map::with_capacity(object.len());
    for (key, value) in object {
        let relay_key = snake_case(key);
        let relay_value = match value {
            Value::String(s) if NUMERIC_HEX_FIELDS.contains(&key.as_str()) => {
                Value::String(hex_to_decimal(s)?)
            }
            Value::Array(items) if key == "withdrawals" => {
                Value::Array(items.iter().map(to_relay_withdrawal).collect::<Result<_, _>>()?)
            }
            other => other.clone(),
        };
        out.insert(relay_key, relay_value);
    }
    Ok(Value::Object(out))
}

fn to_relay_withdrawal(withdrawal: &Value) -> Result<Value, Error> {
    let object = withdrawal.as_object().ok_or(Error::NotAnObject)?;
    let mut out = Map::with_capacity(object.len());
    for (key, value) in object {
        let relay_key = snake_case(key);
        let relay_value = match value {
            Value::String(s) => Value::String(hex_to_decimal(s)?),
            other => other.clone(),
        };
        out.insert(relay_key, relay_value);
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_camel_case_keys_to_snake_case() {
        let payload = serde_json::json!({"blockNumber": "0x64", "feeRecipient": "0xaa"});
        let converted = to_relay_payload(&payload).unwrap();
        assert!(converted.get("block_number").is_some());
        assert!(converted.get("fee_recipient").is_some());
    }

    #[test]
    fn converts_known_hex_quantities_to_decimal() {
        let payload = serde_json::json!({"gasLimit": "0x1c9c380"});
        let converted = to_relay_payload(&payload).unwrap();
        assert_eq!(converted["gas_limit"], "30000000");
    }

    #[test]
    fn leaves_non_numeric_hex_fields_untouched() {
        let payload = serde_json::json!({"blockHash": "0xdeadbeef"});
        let converted = to_relay_payload(&payload).unwrap();
        assert_eq!(converted["block_hash"], "0xdeadbeef");
    }
}
