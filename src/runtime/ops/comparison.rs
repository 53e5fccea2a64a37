//! Test and comparison operations.
//!
//! All comparisons produce an i32: 1 for true, 0 for false. The `_u`
//! variants reinterpret their operands as unsigned before comparing.

use super::*;

fn bool_i32(cond: bool) -> Value {
    Value::I32(if cond { 1 } else { 0 })
}

// i32 -----------------------------------------------------------------------

pub fn i32_eqz(stack: &mut Stack) -> Result<(), Trap> {
    let value = stack.pop_i32()?;
    stack.push(bool_i32(value == 0));
    Ok(())
}

pub fn i32_eq(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32(a == b));
    Ok(())
}

pub fn i32_ne(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32(a != b));
    Ok(())
}

pub fn i32_lt_s(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32(a < b));
    Ok(())
}

pub fn i32_lt_u(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32((a as u32) < (b as u32)));
    Ok(())
}

pub fn i32_gt_s(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32(a > b));
    Ok(())
}

pub fn i32_gt_u(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32((a as u32) > (b as u32)));
    Ok(())
}

pub fn i32_le_s(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32(a <= b));
    Ok(())
}

pub fn i32_le_u(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32((a as u32) <= (b as u32)));
    Ok(())
}

pub fn i32_ge_s(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32(a >= b));
    Ok(())
}

pub fn i32_ge_u(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i32()?;
    let a = stack.pop_i32()?;
    stack.push(bool_i32((a as u32) >= (b as u32)));
    Ok(())
}

// i64 -----------------------------------------------------------------------

pub fn i64_eqz(stack: &mut Stack) -> Result<(), Trap> {
    let value = stack.pop_i64()?;
    stack.push(bool_i32(value == 0));
    Ok(())
}

pub fn i64_eq(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i64()?;
    let a = stack.pop_i64()?;
    stack.push(bool_i32(a == b));
    Ok(())
}

pub fn i64_ne(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i64()?;
    let a = stack.pop_i64()?;
    stack.push(bool_i32(a != b));
    Ok(())
}

pub fn i64_lt_s(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_i64()?;
    let a = stack.pop_i64()?;
    stack.push(bool_i32(a < b));
    Ok(())
}

// f64 -----------------------------------------------------------------------

pub fn f64_eq(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_f64()?;
    let a = stack.pop_f64()?;
    stack.push(bool_i32(a == b));
    Ok(())
}

pub fn f64_ne(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_f64()?;
    let a = stack.pop_f64()?;
    stack.push(bool_i32(a != b));
    Ok(())
}

pub fn f64_lt(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_f64()?;
    let a = stack.pop_f64()?;
    stack.push(bool_i32(a < b));
    Ok(())
}

pub fn f64_gt(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_f64()?;
    let a = stack.pop_f64()?;
    stack.push(bool_i32(a > b));
    Ok(())
}

pub fn f64_le(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_f64()?;
    let a = stack.pop_f64()?;
    stack.push(bool_i32(a <= b));
    Ok(())
}

pub fn f64_ge(stack: &mut Stack) -> Result<(), Trap> {
    let b = stack.pop_f64()?;
    let a = stack.pop_f64()?;
    stack.push(bool_i32(a >= b));
    Ok(())
}
