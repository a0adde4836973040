//! JIT compilation of expressions with Cranelift.
//!
//! Every symbolic model component is compiled to native machine code before
//! the first evaluation. Compiled functions read their inputs from a flat
//! `f64` buffer whose slot order is fixed per model by a [`SlotLayout`]:
//! the signature arguments first, then the interdependent outputs computed
//! in earlier stages.
//!
//! Two shapes of function are produced:
//! - [`build_scalar_function`]: `fn(*const f64) -> f64`, one per component
//! - [`build_combined_function`]: `fn(*const f64, *mut f64)`, evaluating
//!   several expressions in one body (the ODE right-hand side)
//!
//! Both are wrapped in safe `Arc` closures that are `Send + Sync`, so models
//! can be shared across threads and evaluated in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use cranelift::prelude::*;
use cranelift_codegen::{ir::immediates::Offset32, Context};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use isa::TargetIsa;

use crate::errors::BuilderError;
use crate::expr::Expr;
use crate::operators;
use crate::symbol::Symbol;

/// A compiled single-output function over the model's input buffer.
pub type ScalarFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// A compiled multi-output function writing into a results buffer.
pub type CombinedFn = Arc<dyn Fn(&[f64], &mut [f64]) + Send + Sync>;

struct ThreadSafeFunction(*const u8);
unsafe impl Send for ThreadSafeFunction {}
unsafe impl Sync for ThreadSafeFunction {}

/// The slot order of the flat input buffer compiled functions read from.
///
/// Index lookups happen at compile time only; at evaluation time the buffer
/// is filled positionally.
#[derive(Debug, Clone)]
pub struct SlotLayout {
    slots: Vec<Symbol>,
    index: HashMap<Symbol, usize>,
}

impl SlotLayout {
    pub fn new(slots: Vec<Symbol>) -> Self {
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, sym)| (sym.clone(), i))
            .collect();
        Self { slots, index }
    }

    pub fn index_of(&self, sym: &Symbol) -> Option<usize> {
        self.index.get(sym).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.slots
    }
}

/// Compiles an expression into a native function reading from a buffer laid
/// out according to `layout`.
pub fn build_scalar_function(expr: &Expr, layout: &SlotLayout) -> Result<ScalarFn, BuilderError> {
    let isa = create_isa()?;
    let (mut module, mut ctx) = create_module_and_context(isa);

    build_function_body(&mut ctx, expr, layout, &mut module)?;
    let raw_fn = compile_and_finalize(&mut module, &mut ctx)?;

    // The module owns the executable pages; it is leaked on drop, which keeps
    // the function pointer valid for the lifetime of the closure.
    Ok(Arc::new(move |input: &[f64]| raw_fn(input.as_ptr())))
}

/// Compiles several expressions into one function that writes each result to
/// its position in the output buffer. Used for the ODE right-hand side, where
/// all state derivatives are needed per integrator step.
pub fn build_combined_function(
    exprs: &[Expr],
    layout: &SlotLayout,
) -> Result<CombinedFn, BuilderError> {
    let isa = create_isa()?;
    let (mut module, _) = create_module_and_context(isa);

    let ptr_ty = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_ty)); // input_ptr
    sig.params.push(AbiParam::new(ptr_ty)); // output_ptr

    let func_id = module
        .declare_function("combined", Linkage::Export, &sig)
        .map_err(|e| BuilderError::DeclarationError(e.to_string()))?;

    let mut codegen_context = Context::new();
    codegen_context.func.signature = sig;
    let mut builder_context = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut codegen_context.func, &mut builder_context);

    let entry_block = builder.create_block();
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);
    builder.seal_block(entry_block);

    let input_ptr = builder.block_params(entry_block)[0];
    let output_ptr = builder.block_params(entry_block)[1];

    // One shared variable cache: expressions in the same body reuse loads
    let mut var_cache = HashMap::new();
    let results = exprs
        .iter()
        .map(|expr| emit_expr(&mut builder, &mut module, expr, layout, input_ptr, &mut var_cache))
        .collect::<Result<Vec<_>, _>>()?;

    for (i, result) in results.iter().enumerate() {
        let offset = (i * 8) as i32;
        builder
            .ins()
            .store(MemFlags::new(), *result, output_ptr, Offset32::new(offset));
    }

    builder.ins().return_(&[]);
    builder.finalize();

    module
        .define_function(func_id, &mut codegen_context)
        .map_err(|e| BuilderError::FunctionError(e.to_string()))?;
    module
        .finalize_definitions()
        .map_err(BuilderError::ModuleError)?;

    let results_len = exprs.len();
    let code = Arc::new(ThreadSafeFunction(module.get_finalized_function(func_id)));
    Ok(Arc::new(move |inputs: &[f64], results: &mut [f64]| {
        debug_assert_eq!(results.len(), results_len);
        unsafe {
            let f: extern "C" fn(*const f64, *mut f64) = std::mem::transmute(code.0);
            f(inputs.as_ptr(), results.as_mut_ptr());
        }
    }))
}

/// Creates the ISA target for the host machine.
fn create_isa() -> Result<Arc<dyn TargetIsa>, BuilderError> {
    let mut flag_builder = settings::builder();

    let target_triple = target_lexicon::Triple::host();
    let is_x86 = matches!(
        target_triple.architecture,
        target_lexicon::Architecture::X86_64
    );

    if is_x86 {
        flag_builder.set("use_colocated_libcalls", "true").unwrap();
        flag_builder.set("is_pic", "false").unwrap();
    } else {
        flag_builder.set("use_colocated_libcalls", "false").unwrap();
        flag_builder.set("is_pic", "false").unwrap();
    }

    let isa_builder = cranelift_native::builder()
        .map_err(|msg| BuilderError::HostMachineNotSupported(msg.to_string()))?;

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(BuilderError::CodegenError)
}

/// Creates a JIT module with the libm imports registered and a context with
/// the scalar signature `fn(*const f64) -> f64`.
fn create_module_and_context(isa: Arc<dyn TargetIsa>) -> (JITModule, Context) {
    let mut flags_builder = settings::builder();
    flags_builder.set("opt_level", "speed").unwrap();

    #[cfg(debug_assertions)]
    {
        flags_builder.set("enable_verifier", "true").unwrap();
        flags_builder.set("enable_alias_analysis", "true").unwrap();
    }
    #[cfg(not(debug_assertions))]
    {
        flags_builder.set("enable_verifier", "false").unwrap();
        flags_builder.set("enable_alias_analysis", "false").unwrap();
    }

    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());

    builder.symbol("exp", f64::exp as *const u8);
    builder.symbol("ln", f64::ln as *const u8);
    builder.symbol("sqrt", f64::sqrt as *const u8);
    builder.symbol("sin", f64::sin as *const u8);
    builder.symbol("cos", f64::cos as *const u8);
    builder.symbol("pow", f64::powf as *const u8);

    let module = JITModule::new(builder);
    let mut ctx = module.make_context();

    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(types::I64));
    sig.returns.push(AbiParam::new(types::F64));
    ctx.func.signature = sig;

    (module, ctx)
}

fn build_function_body(
    ctx: &mut Context,
    expr: &Expr,
    layout: &SlotLayout,
    module: &mut JITModule,
) -> Result<(), BuilderError> {
    let mut builder_ctx = FunctionBuilderContext::new();
    let mut func_builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);

    let entry_block = func_builder.create_block();
    func_builder.switch_to_block(entry_block);
    let input_ptr = func_builder.append_block_param(entry_block, types::I64);

    let mut var_cache = HashMap::new();
    let result = emit_expr(
        &mut func_builder,
        module,
        expr,
        layout,
        input_ptr,
        &mut var_cache,
    )?;
    func_builder.ins().return_(&[result]);

    func_builder.seal_block(entry_block);
    func_builder.finalize();

    Ok(())
}

fn compile_and_finalize(
    module: &mut JITModule,
    ctx: &mut Context,
) -> Result<fn(*const f64) -> f64, BuilderError> {
    let func_id = module
        .declare_function("component", Linkage::Local, &ctx.func.signature)
        .map_err(|e| BuilderError::DeclarationError(e.to_string()))?;

    module
        .define_function(func_id, ctx)
        .map_err(|e| BuilderError::FunctionError(e.to_string()))?;

    module.clear_context(ctx);
    module
        .finalize_definitions()
        .map_err(BuilderError::ModuleError)?;

    // SAFETY: compiled with signature fn(*const f64) -> f64; the executable
    // pages are never freed, so the pointer stays valid.
    let func = unsafe {
        std::mem::transmute::<*const u8, fn(*const f64) -> f64>(
            module.get_finalized_function(func_id),
        )
    };
    Ok(func)
}

/// Recursively lowers an expression to Cranelift IR.
///
/// Variable loads go through `var_cache` so each slot is read at most once
/// per function body.
fn emit_expr(
    builder: &mut FunctionBuilder,
    module: &mut JITModule,
    expr: &Expr,
    layout: &SlotLayout,
    input_ptr: Value,
    var_cache: &mut HashMap<usize, Value>,
) -> Result<Value, BuilderError> {
    match expr {
        Expr::Const(v) => Ok(builder.ins().f64const(*v)),

        Expr::Var(sym) => {
            let idx = layout
                .index_of(sym)
                .ok_or_else(|| BuilderError::UnknownSymbol(sym.name().to_string()))?;
            if let Some(val) = var_cache.get(&idx) {
                return Ok(*val);
            }
            let mem = MemFlags::new().with_aligned().with_readonly().with_notrap();
            let offset = (idx * 8) as i32;
            let val = builder
                .ins()
                .load(types::F64, mem, input_ptr, Offset32::new(offset));
            var_cache.insert(idx, val);
            Ok(val)
        }

        Expr::Add(l, r) => {
            let l = emit_expr(builder, module, l, layout, input_ptr, var_cache)?;
            let r = emit_expr(builder, module, r, layout, input_ptr, var_cache)?;
            Ok(builder.ins().fadd(l, r))
        }
        Expr::Sub(l, r) => {
            let l = emit_expr(builder, module, l, layout, input_ptr, var_cache)?;
            let r = emit_expr(builder, module, r, layout, input_ptr, var_cache)?;
            Ok(builder.ins().fsub(l, r))
        }
        Expr::Mul(l, r) => {
            let l = emit_expr(builder, module, l, layout, input_ptr, var_cache)?;
            let r = emit_expr(builder, module, r, layout, input_ptr, var_cache)?;
            Ok(builder.ins().fmul(l, r))
        }
        Expr::Div(l, r) => {
            let l = emit_expr(builder, module, l, layout, input_ptr, var_cache)?;
            let r = emit_expr(builder, module, r, layout, input_ptr, var_cache)?;
            Ok(builder.ins().fdiv(l, r))
        }
        Expr::Neg(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            Ok(builder.ins().fneg(v))
        }
        Expr::Abs(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            Ok(builder.ins().fabs(v))
        }

        Expr::Pow(base, exp) => {
            let base = emit_expr(builder, module, base, layout, input_ptr, var_cache)?;
            Ok(emit_powi(builder, base, *exp))
        }
        Expr::PowFloat(base, exp) => {
            let base = emit_expr(builder, module, base, layout, input_ptr, var_cache)?;
            let expv = builder.ins().f64const(*exp);
            let fid = operators::link_powf(module)?;
            Ok(operators::call_powf(builder, module, fid, base, expv))
        }
        Expr::PowExpr(base, exp) => {
            let base = emit_expr(builder, module, base, layout, input_ptr, var_cache)?;
            let expv = emit_expr(builder, module, exp, layout, input_ptr, var_cache)?;
            let fid = operators::link_powf(module)?;
            Ok(operators::call_powf(builder, module, fid, base, expv))
        }

        Expr::Exp(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            let fid = operators::link_unary(module, "exp")?;
            Ok(operators::call_unary(builder, module, fid, v))
        }
        Expr::Ln(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            let fid = operators::link_unary(module, "ln")?;
            Ok(operators::call_unary(builder, module, fid, v))
        }
        Expr::Sqrt(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            Ok(builder.ins().sqrt(v))
        }
        Expr::Sin(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            let fid = operators::link_unary(module, "sin")?;
            Ok(operators::call_unary(builder, module, fid, v))
        }
        Expr::Cos(e) => {
            let v = emit_expr(builder, module, e, layout, input_ptr, var_cache)?;
            let fid = operators::link_unary(module, "cos")?;
            Ok(operators::call_unary(builder, module, fid, v))
        }
    }
}

/// Inlines an integer power as multiplication chains, falling back to binary
/// exponentiation for large exponents.
fn emit_powi(builder: &mut FunctionBuilder, base: Value, exp: i64) -> Value {
    match exp {
        0 => builder.ins().f64const(1.0),
        1 => base,
        2 => builder.ins().fmul(base, base),
        3 => {
            let square = builder.ins().fmul(base, base);
            builder.ins().fmul(square, base)
        }
        4 => {
            let square = builder.ins().fmul(base, base);
            builder.ins().fmul(square, square)
        }
        5 => {
            let square = builder.ins().fmul(base, base);
            let fourth = builder.ins().fmul(square, square);
            builder.ins().fmul(fourth, base)
        }
        6 => {
            let square = builder.ins().fmul(base, base);
            let cube = builder.ins().fmul(square, base);
            builder.ins().fmul(cube, cube)
        }
        8 => {
            let square = builder.ins().fmul(base, base);
            let fourth = builder.ins().fmul(square, square);
            builder.ins().fmul(fourth, fourth)
        }
        -1 => {
            let one = builder.ins().f64const(1.0);
            builder.ins().fdiv(one, base)
        }
        -2 => {
            let square = builder.ins().fmul(base, base);
            let one = builder.ins().f64const(1.0);
            builder.ins().fdiv(one, square)
        }
        _ => {
            let mut remaining = exp.unsigned_abs();
            let mut result = builder.ins().f64const(1.0);
            let mut current = base;
            while remaining > 0 {
                if remaining & 1 == 1 {
                    result = builder.ins().fmul(result, current);
                }
                remaining >>= 1;
                if remaining > 0 {
                    current = builder.ins().fmul(current, current);
                }
            }
            if exp < 0 {
                let one = builder.ins().f64const(1.0);
                builder.ins().fdiv(one, result)
            } else {
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout(names: &[&str]) -> SlotLayout {
        SlotLayout::new(names.iter().copied().map(Symbol::independent).collect())
    }

    #[test]
    fn compiles_polynomial() -> Result<(), Box<dyn std::error::Error>> {
        let x = Expr::Var(Symbol::independent("x"));
        let a = Expr::Var(Symbol::independent("a"));
        // a*x^2 + 1
        let expr = a * x.pow(2) + Expr::Const(1.0);

        let f = build_scalar_function(&expr, &layout(&["x", "a"]))?;
        assert_relative_eq!(f(&[3.0, 2.0]), 19.0);
        assert_relative_eq!(f(&[0.0, 5.0]), 1.0);
        Ok(())
    }

    #[test]
    fn compiles_transcendentals() -> Result<(), Box<dyn std::error::Error>> {
        let x = || Expr::Var(Symbol::independent("x"));
        let lay = layout(&["x"]);

        let f = build_scalar_function(&x().exp(), &lay)?;
        assert_relative_eq!(f(&[1.0]), std::f64::consts::E, epsilon = 1e-12);

        let f = build_scalar_function(&x().ln(), &lay)?;
        assert_relative_eq!(f(&[std::f64::consts::E]), 1.0, epsilon = 1e-12);

        let f = build_scalar_function(&x().sin(), &lay)?;
        assert_relative_eq!(f(&[0.0]), 0.0);

        let f = build_scalar_function(&x().cos(), &lay)?;
        assert_relative_eq!(f(&[0.0]), 1.0);

        let f = build_scalar_function(&x().sqrt(), &lay)?;
        assert_relative_eq!(f(&[9.0]), 3.0);
        Ok(())
    }

    #[test]
    fn compiles_integer_powers() -> Result<(), Box<dyn std::error::Error>> {
        let lay = layout(&["x"]);
        for exp in [0i64, 1, 2, 3, 5, 7, 13, -1, -3] {
            let expr = Expr::Var(Symbol::independent("x")).pow(exp);
            let f = build_scalar_function(&expr, &lay)?;
            assert_relative_eq!(f(&[1.7]), 1.7f64.powi(exp as i32), epsilon = 1e-10);
        }
        Ok(())
    }

    #[test]
    fn compiles_float_power() -> Result<(), Box<dyn std::error::Error>> {
        let expr = Expr::Var(Symbol::independent("x")).powf(1.5);
        let f = build_scalar_function(&expr, &layout(&["x"]))?;
        assert_relative_eq!(f(&[4.0]), 8.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let expr = Expr::Var(Symbol::independent("y"));
        let err = build_scalar_function(&expr, &layout(&["x"])).err().unwrap();
        assert!(matches!(err, BuilderError::UnknownSymbol(_)));
    }

    #[test]
    fn combined_function_writes_all_outputs() -> Result<(), Box<dyn std::error::Error>> {
        let x = || Expr::Var(Symbol::independent("x"));
        let y = || Expr::Var(Symbol::independent("y"));
        let exprs = vec![x() + y(), x() * y(), x() - y()];

        let f = build_combined_function(&exprs, &layout(&["x", "y"]))?;
        let mut out = [0.0; 3];
        f(&[5.0, 2.0], &mut out);
        assert_relative_eq!(out[0], 7.0);
        assert_relative_eq!(out[1], 10.0);
        assert_relative_eq!(out[2], 3.0);
        Ok(())
    }
}
