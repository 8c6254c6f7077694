//! ABI encoding of constructor and method arguments.
//!
//! Arguments arrive as strings (literals, environment values, rendered
//! addresses) and are coerced to the parameter types declared by the ABI.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::Bytes,
};
use anyhow::{Context, Result};

fn coerce_params(params: &[Param], args: &[String], what: &str) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!(
            "{} expects {} argument(s), got {}",
            what,
            params.len(),
            args.len()
        );
    }

    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (param, arg))| {
            let ty: DynSolType = param
                .resolve()
                .with_context(|| format!("Unsupported type `{}` for {what}", param.ty))?;
            ty.coerce_str(arg).with_context(|| {
                format!("Argument {i} of {what}: `{arg}` is not a valid `{}`", param.ty)
            })
        })
        .collect()
}

/// Number of constructor parameters declared by `abi`.
pub fn constructor_arity(abi: &JsonAbi) -> usize {
    abi.constructor
        .as_ref()
        .map(|constructor| constructor.inputs.len())
        .unwrap_or(0)
}

/// ABI-encoded constructor arguments, without the creation bytecode.
///
/// This is the form block explorers ask for when verifying a contract.
pub fn encode_constructor_args(abi: &JsonAbi, args: &[String]) -> Result<Bytes> {
    match &abi.constructor {
        Some(constructor) => {
            let values = coerce_params(&constructor.inputs, args, "constructor")?;
            let encoded = constructor
                .abi_encode_input(&values)
                .context("Failed to encode constructor arguments")?;
            Ok(encoded.into())
        }
        None if args.is_empty() => Ok(Bytes::new()),
        None => anyhow::bail!(
            "constructor takes no arguments, got {}",
            args.len()
        ),
    }
}

/// Creation transaction data: bytecode followed by the encoded constructor arguments.
pub fn encode_deployment(abi: &JsonAbi, bytecode: &Bytes, args: &[String]) -> Result<Bytes> {
    let encoded_args = encode_constructor_args(abi, args)?;
    let mut data = Vec::with_capacity(bytecode.len() + encoded_args.len());
    data.extend_from_slice(bytecode);
    data.extend_from_slice(&encoded_args);
    Ok(data.into())
}

/// A method parsed from a human-readable signature such as
/// `hasRole(bytes32,address) returns (bool)`.
#[derive(Debug, Clone)]
pub struct Method {
    function: Function,
}

impl Method {
    pub fn parse(signature: &str) -> Result<Self> {
        let function = Function::parse(signature)
            .with_context(|| format!("Invalid method signature `{signature}`"))?;
        Ok(Self { function })
    }

    pub fn signature(&self) -> String {
        self.function.signature()
    }

    /// Selector followed by the encoded arguments.
    pub fn encode_call(&self, args: &[String]) -> Result<Bytes> {
        let what = self.signature();
        let values = coerce_params(&self.function.inputs, args, &what)?;
        let encoded = self
            .function
            .abi_encode_input(&values)
            .with_context(|| format!("Failed to encode call to {what}"))?;
        Ok(encoded.into())
    }

    /// Decode the first return value of a call to this method.
    pub fn decode_first_output(&self, data: &[u8]) -> Result<DynSolValue> {
        let types = self
            .function
            .outputs
            .iter()
            .map(|param| param.resolve())
            .collect::<std::result::Result<Vec<DynSolType>, _>>()
            .with_context(|| format!("Unsupported return type in {}", self.signature()))?;

        if types.is_empty() {
            anyhow::bail!("{} declares no return value", self.signature());
        }

        let decoded = DynSolType::Tuple(types)
            .abi_decode_params(data)
            .with_context(|| format!("Failed to decode return data of {}", self.signature()))?;

        match decoded {
            DynSolValue::Tuple(mut values) if !values.is_empty() => Ok(values.swap_remove(0)),
            other => Ok(other),
        }
    }

    /// Coerce `expected` to the type of the first return value and compare.
    pub fn first_output_equals(&self, data: &[u8], expected: &str) -> Result<bool> {
        let actual = self.decode_first_output(data)?;
        let ty: DynSolType = self.function.outputs[0]
            .resolve()
            .context("Unsupported return type")?;
        let expected = ty
            .coerce_str(expected)
            .with_context(|| format!("`{expected}` is not a valid `{}`", self.function.outputs[0].ty))?;
        Ok(actual == expected)
    }
}
