//! Linking and calling libm functions from JIT-compiled code.
//!
//! Transcendental operations (`exp`, `ln`, `sqrt`, `sin`, `cos`, `pow`) are
//! not emitted inline; they are declared as imported symbols and resolved
//! against the Rust float intrinsics registered on the `JITBuilder`. All of
//! them operate on 64-bit floats.

use cranelift::prelude::{AbiParam, FunctionBuilder, InstBuilder};
use cranelift_codegen::ir::{types::F64, Value};
use cranelift_module::{FuncId, Linkage, Module};

use crate::errors::BuilderError;

/// Declares a unary `f64 -> f64` import (e.g. `"exp"`, `"sin"`).
///
/// The name must match a symbol registered on the JIT builder.
pub(crate) fn link_unary(module: &mut dyn Module, name: &str) -> Result<FuncId, BuilderError> {
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(F64));
    sig.returns.push(AbiParam::new(F64));

    module
        .declare_function(name, Linkage::Import, &sig)
        .map_err(|e| BuilderError::DeclarationError(e.to_string()))
}

/// Emits a call to a previously linked unary function.
pub(crate) fn call_unary(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    func_id: FuncId,
    arg: Value,
) -> Value {
    let func = module.declare_func_in_func(func_id, builder.func);
    let call = builder.ins().call(func, &[arg]);
    builder.inst_results(call)[0]
}

/// Declares the binary `pow(f64, f64) -> f64` import.
pub(crate) fn link_powf(module: &mut dyn Module) -> Result<FuncId, BuilderError> {
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(F64));
    sig.params.push(AbiParam::new(F64));
    sig.returns.push(AbiParam::new(F64));

    module
        .declare_function("pow", Linkage::Import, &sig)
        .map_err(|e| BuilderError::DeclarationError(e.to_string()))
}

/// Emits a call to the linked `pow` function.
pub(crate) fn call_powf(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    func_id: FuncId,
    base: Value,
    exponent: Value,
) -> Value {
    let func = module.declare_func_in_func(func_id, builder.func);
    let call = builder.ins().call(func, &[base, exponent]);
    builder.inst_results(call)[0]
}
