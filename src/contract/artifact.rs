//! Contract ABI and bytecode, and string-argument encoding against them.
//!
//! Arguments arrive as strings (as typed by an operator or a dashboard) and
//! are coerced to the parameter types declared in the ABI.

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::hex;
use alloy::json_abi::{Function, JsonAbi, Param};
use alloy::primitives::Bytes;
use serde_json::Value;
use std::path::Path;

use crate::contract::ContractError;

#[derive(Debug, Clone)]
pub struct ContractArtifact {
    abi: JsonAbi,
    /// ABI exactly as loaded, for serving to clients.
    abi_json: Value,
    bytecode: Option<Bytes>,
}

impl ContractArtifact {
    /// Parse an ABI (a JSON array, or an object with an `abi` field and
    /// optionally a `bytecode` field) plus optional hex bytecode.
    pub fn from_json(abi_source: &str, bytecode_hex: Option<&str>) -> Result<Self, ContractError> {
        let parsed: Value = serde_json::from_str(abi_source)
            .map_err(|e| ContractError::Abi(format!("ABI is not valid JSON: {}", e)))?;

        let (abi_json, embedded_bytecode) = match parsed {
            Value::Object(mut obj) => {
                let abi = obj
                    .remove("abi")
                    .ok_or_else(|| ContractError::Abi("artifact object has no 'abi' field".into()))?;
                let bytecode = obj
                    .get("bytecode")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (abi, bytecode)
            }
            other => (other, None),
        };

        let abi: JsonAbi = serde_json::from_value(abi_json.clone())
            .map_err(|e| ContractError::Abi(format!("ABI does not parse: {}", e)))?;

        let bytecode = match bytecode_hex.map(str::to_string).or(embedded_bytecode) {
            Some(source) => Some(decode_bytecode(&source)?),
            None => None,
        };

        Ok(Self {
            abi,
            abi_json,
            bytecode,
        })
    }

    /// Read the ABI and optional bytecode from disk.
    pub fn load(abi_path: &Path, bytecode_path: Option<&Path>) -> Result<Self, ContractError> {
        let abi_source = std::fs::read_to_string(abi_path).map_err(|e| {
            ContractError::Abi(format!("cannot read {}: {}", abi_path.display(), e))
        })?;
        let bytecode_source = bytecode_path
            .map(|path| {
                std::fs::read_to_string(path)
                    .map_err(|e| ContractError::Abi(format!("cannot read {}: {}", path.display(), e)))
            })
            .transpose()?;

        let artifact = Self::from_json(&abi_source, bytecode_source.as_deref())?;
        tracing::info!(
            abi = %abi_path.display(),
            functions = artifact.abi.functions.len(),
            has_bytecode = artifact.bytecode.is_some(),
            "Contract artifact loaded"
        );
        Ok(artifact)
    }

    pub fn abi_json(&self) -> &Value {
        &self.abi_json
    }

    pub fn bytecode(&self) -> Option<&Bytes> {
        self.bytecode.as_ref()
    }

    /// ABI-encoded constructor arguments (no bytecode prefix).
    pub fn encode_constructor(&self, args: &[String]) -> Result<Bytes, ContractError> {
        let Some(constructor) = &self.abi.constructor else {
            if args.is_empty() {
                return Ok(Bytes::new());
            }
            return Err(ContractError::InvalidInput(format!(
                "contract has no constructor but {} arguments were given",
                args.len()
            )));
        };
        let values = coerce_args("constructor", &constructor.inputs, args)?;
        constructor
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| ContractError::Abi(format!("constructor encoding failed: {}", e)))
    }

    /// Resolve `name` to the overload taking `arity` arguments.
    pub fn function(&self, name: &str, arity: usize) -> Result<&Function, ContractError> {
        let overloads = self
            .abi
            .function(name)
            .ok_or_else(|| ContractError::InvalidInput(format!("unknown function '{}'", name)))?;
        overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .ok_or_else(|| {
                ContractError::InvalidInput(format!(
                    "function '{}' does not take {} arguments",
                    name, arity
                ))
            })
    }

    /// Selector followed by the encoded arguments.
    pub fn encode_call(&self, name: &str, args: &[String]) -> Result<Bytes, ContractError> {
        let function = self.function(name, args.len())?;
        let values = coerce_args(name, &function.inputs, args)?;
        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| ContractError::Abi(format!("encoding '{}' failed: {}", name, e)))
    }

    /// Decode return data to JSON. A single output is returned bare, several
    /// as an array.
    pub fn decode_output(&self, name: &str, arity: usize, data: &[u8]) -> Result<Value, ContractError> {
        let function = self.function(name, arity)?;
        let mut values = function
            .abi_decode_output(data)
            .map_err(|e| ContractError::Abi(format!("decoding '{}' output failed: {}", name, e)))?;

        Ok(match values.len() {
            0 => Value::Null,
            1 => value_to_json(&values.remove(0)),
            _ => Value::Array(values.iter().map(value_to_json).collect()),
        })
    }
}

fn decode_bytecode(source: &str) -> Result<Bytes, ContractError> {
    let trimmed = source.trim();
    if trimmed.is_empty() || trimmed == "0x" {
        return Err(ContractError::Abi("bytecode is empty".into()));
    }
    hex::decode(trimmed)
        .map(Bytes::from)
        .map_err(|e| ContractError::Abi(format!("bytecode is not valid hex: {}", e)))
}

fn coerce_args(
    context: &str,
    params: &[Param],
    args: &[String],
) -> Result<Vec<DynSolValue>, ContractError> {
    if params.len() != args.len() {
        return Err(ContractError::InvalidInput(format!(
            "{} expects {} arguments, got {}",
            context,
            params.len(),
            args.len()
        )));
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| ContractError::Abi(format!("unsupported type '{}': {}", param.ty, e)))?;
            ty.coerce_str(arg).map_err(|e| {
                ContractError::InvalidInput(format!(
                    "argument '{}' is not a valid {}: {}",
                    param.name, param.ty, e
                ))
            })
        })
        .collect()
}

fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Function(f) => Value::String(hex::encode_prefixed(f.as_slice())),
        DynSolValue::Bytes(b) => Value::String(hex::encode_prefixed(b)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};

    const ABI: &str = include_str!("../../contracts/Marketplace.abi.json");

    fn artifact() -> ContractArtifact {
        ContractArtifact::from_json(ABI, Some("0x6080604052")).unwrap()
    }

    #[test]
    fn test_bundled_abi_parses() {
        let artifact = artifact();
        assert!(artifact.abi_json().is_array());
        assert_eq!(artifact.bytecode().unwrap().as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_hardhat_style_artifact() {
        let source = format!(r#"{{"abi": {}, "bytecode": "0x6001"}}"#, ABI);
        let artifact = ContractArtifact::from_json(&source, None).unwrap();
        assert_eq!(artifact.bytecode().unwrap().as_ref(), &[0x60, 0x01]);
    }

    #[test]
    fn test_update_root_call_data() {
        let root = B256::repeat_byte(0xab);
        let data = artifact().encode_call("updateRoot", &[root.to_string()]).unwrap();
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &alloy::primitives::keccak256("updateRoot(bytes32)")[..4]);
        assert_eq!(&data[4..], root.as_slice());
    }

    #[test]
    fn test_constructor_encoding() {
        let args = vec![
            B256::repeat_byte(0x01).to_string(),
            "Gate".to_string(),
            "GATE".to_string(),
            "https://ipfs.io/ipfs/".to_string(),
        ];
        let encoded = artifact().encode_constructor(&args).unwrap();
        assert_eq!(&encoded[..32], B256::repeat_byte(0x01).as_slice());
        // head: 1 word + 3 offsets; each string: length word + one data word
        assert_eq!(encoded.len(), 32 * 4 + 3 * 64);
    }

    #[test]
    fn test_bad_arguments_are_input_errors() {
        let artifact = artifact();
        let err = artifact.encode_call("updateRoot", &["0xzz".into()]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Input);

        let err = artifact.encode_call("updateRoot", &[]).unwrap_err();
        assert!(err.to_string().contains("does not take 0 arguments"));

        let err = artifact.encode_call("burn", &[]).unwrap_err();
        assert!(err.to_string().contains("unknown function"));
    }

    #[test]
    fn test_decode_outputs() {
        let artifact = artifact();
        let owner = Address::repeat_byte(0x42);
        let value = artifact
            .decode_output("ownerOf", 1, owner.into_word().as_slice())
            .unwrap();
        assert_eq!(value, Value::String(owner.to_checksum(None)));

        let root = B256::repeat_byte(0x07);
        let value = artifact.decode_output("merkleRoot", 0, root.as_slice()).unwrap();
        assert_eq!(value, Value::String(root.to_string()));

        let encoded = DynSolValue::Tuple(vec![DynSolValue::String("ipfs://x".into())]).abi_encode_params();
        let value = artifact.decode_output("tokenURI", 1, &encoded).unwrap();
        assert_eq!(value, Value::String("ipfs://x".into()));
    }
}
