// ABOUTME: printf declaration and getarg/getargf host-argument accessor synthesis

use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::AddressSpace;

use crate::error::{CompileError, CompileResult};

fn ir_err<E: std::fmt::Debug>(e: E) -> CompileError {
    CompileError::JitError {
        message: format!("{:?}", e),
    }
}

/// Declares the variadic external `printf(i8*, ...)` once per module.
pub fn declare_printf<'ctx>(context: &'ctx Context, module: &Module<'ctx>) {
    let i32_t = context.i32_type();
    let i8_ptr_t = context.i8_type().ptr_type(AddressSpace::default());
    let fn_type = i32_t.fn_type(&[i8_ptr_t.into()], true);
    module.add_function("printf", fn_type, Some(Linkage::External));
}

/// Synthesizes `int getarg(int)` or `float getargf(int)` as a defined
/// function backed by a module-level constant array of the parsed host
/// arguments, indexed by the function's own parameter.
pub fn synthesize_argv_accessor<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    name: &str,
    sysargs: &[String],
    is_float: bool,
) -> CompileResult<()> {
    let i32_t = context.i32_type();
    let builder = context.create_builder();

    if is_float {
        let f32_t = context.f32_type();
        let values: Vec<f32> = sysargs
            .iter()
            .map(|s| s.parse::<f32>().unwrap_or(0.0))
            .collect();
        let array_ty = f32_t.array_type(values.len() as u32);
        let fn_type = f32_t.fn_type(&[i32_t.into()], false);
        let function = module.add_function(name, fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        builder.position_at_end(entry);

        let index_param = function.get_nth_param(0).unwrap().into_int_value();
        let index_ptr = builder.build_alloca(i32_t, "idx_slot").map_err(ir_err)?;
        builder.build_store(index_ptr, index_param).map_err(ir_err)?;
        let index_val = builder
            .build_load(i32_t, index_ptr, "idx")
            .map_err(ir_err)?
            .into_int_value();

        let const_values: Vec<_> = values.iter().map(|v| f32_t.const_float(*v as f64)).collect();
        let const_array = f32_t.const_array(&const_values);
        let array_ptr = builder.build_alloca(array_ty, "argv_f").map_err(ir_err)?;
        builder.build_store(array_ptr, const_array).map_err(ir_err)?;

        let zero = i32_t.const_int(0, false);
        let elem_ptr = unsafe {
            builder
                .build_in_bounds_gep(array_ty, array_ptr, &[zero, index_val], "argv_f_elem")
                .map_err(ir_err)?
        };
        let loaded = builder
            .build_load(f32_t, elem_ptr, "argv_f_val")
            .map_err(ir_err)?;
        builder.build_return(Some(&loaded)).map_err(ir_err)?;
    } else {
        let values: Vec<i32> = sysargs
            .iter()
            .map(|s| s.parse::<i32>().unwrap_or(0))
            .collect();
        let array_ty = i32_t.array_type(values.len() as u32);
        let fn_type = i32_t.fn_type(&[i32_t.into()], false);
        let function = module.add_function(name, fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        builder.position_at_end(entry);

        let index_param = function.get_nth_param(0).unwrap().into_int_value();
        let index_ptr = builder.build_alloca(i32_t, "idx_slot").map_err(ir_err)?;
        builder.build_store(index_ptr, index_param).map_err(ir_err)?;
        let index_val = builder
            .build_load(i32_t, index_ptr, "idx")
            .map_err(ir_err)?
            .into_int_value();

        let const_values: Vec<_> = values
            .iter()
            .map(|v| i32_t.const_int(*v as i64 as u64, true))
            .collect();
        let const_array = i32_t.const_array(&const_values);
        let array_ptr = builder.build_alloca(array_ty, "argv_i").map_err(ir_err)?;
        builder.build_store(array_ptr, const_array).map_err(ir_err)?;

        let zero = i32_t.const_int(0, false);
        let elem_ptr = unsafe {
            builder
                .build_in_bounds_gep(array_ty, array_ptr, &[zero, index_val], "argv_i_elem")
                .map_err(ir_err)?
        };
        let loaded = builder
            .build_load(i32_t, elem_ptr, "argv_i_val")
            .map_err(ir_err)?;
        builder.build_return(Some(&loaded)).map_err(ir_err)?;
    }
    Ok(())
}
