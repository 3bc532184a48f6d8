use koopa::ir::builder_traits::*;
use koopa::ir::{Type, TypeKind, Value};
use crate::front::ast::*;
use crate::front::ir::context::Symbol;
use crate::front::ir::{GenerateIR, IrContext};
use crate::CompilerError;

/// 评估常量表达式, 返回编译期整数值
/// 语义按 32 位补码回绕, 与目标机保持一致
pub fn evaluate_const_expr(expr: &Expr, ctx: &IrContext) -> Result<i32, CompilerError> {
    match expr {
        Expr::IntLiteral(n, _) => Ok(*n),
        Expr::UnaryOp(op, sub_expr, _) => {
            let val = evaluate_const_expr(sub_expr, ctx)?;
            match op {
                UnaryOp::Plus => Ok(val),
                UnaryOp::Minus => Ok(val.wrapping_neg()),
                UnaryOp::Not => Ok(if val == 0 { 1 } else { 0 }),
            }
        }
        Expr::BinaryOp(op, lhs, rhs, span) => {
            let lval = evaluate_const_expr(lhs, ctx)?;
            let rval = evaluate_const_expr(rhs, ctx)?;
            match op {
                BinaryOp::Add => Ok(lval.wrapping_add(rval)),
                BinaryOp::Sub => Ok(lval.wrapping_sub(rval)),
                BinaryOp::Mul => Ok(lval.wrapping_mul(rval)),
                BinaryOp::Div => {
                    if rval == 0 {
                        return Err(ctx.error_at_span(
                            "Division by zero in constant expression".to_string(),
                            *span,
                        ));
                    }
                    Ok(lval.wrapping_div(rval))
                }
                BinaryOp::Mod => {
                    if rval == 0 {
                        return Err(ctx.error_at_span(
                            "Modulo by zero in constant expression".to_string(),
                            *span,
                        ));
                    }
                    Ok(lval.wrapping_rem(rval))
                }
            }
        }
        Expr::RelOp(op, lhs, rhs, _) => {
            let lval = evaluate_const_expr(lhs, ctx)?;
            let rval = evaluate_const_expr(rhs, ctx)?;
            let result = match op {
                RelOp::Lt => lval < rval,
                RelOp::Gt => lval > rval,
                RelOp::Le => lval <= rval,
                RelOp::Ge => lval >= rval,
            };
            Ok(result as i32)
        }
        Expr::EqOp(op, lhs, rhs, _) => {
            let lval = evaluate_const_expr(lhs, ctx)?;
            let rval = evaluate_const_expr(rhs, ctx)?;
            let result = match op {
                EqOp::Eq => lval == rval,
                EqOp::Ne => lval != rval,
            };
            Ok(result as i32)
        }
        Expr::LAndOp(_, lhs, rhs, _) => {
            let lval = evaluate_const_expr(lhs, ctx)?;
            if lval == 0 {
                Ok(0)
            } else {
                let rval = evaluate_const_expr(rhs, ctx)?;
                Ok((rval != 0) as i32)
            }
        }
        Expr::LOrOp(_, lhs, rhs, _) => {
            let lval = evaluate_const_expr(lhs, ctx)?;
            if lval != 0 {
                Ok(1)
            } else {
                let rval = evaluate_const_expr(rhs, ctx)?;
                Ok((rval != 0) as i32)
            }
        }
        Expr::LVal(lval) => {
            // 常量表达式里只能引用标量常量
            if !lval.indices.is_empty() {
                return Err(ctx.error_at_span(
                    "Array element access is not allowed in constant expressions".to_string(),
                    lval.span,
                ));
            }
            match ctx.lookup(&lval.name) {
                Some(Symbol::Const(val)) => Ok(val),
                Some(Symbol::Var { .. }) => Err(ctx.error_at_span(
                    format!("Variable `{}` is not a constant", lval.name),
                    lval.span,
                )),
                None => Err(ctx.error_at_span(
                    format!("Undefined variable `{}` in constant expression", lval.name),
                    lval.span,
                )),
            }
        }
        Expr::Call(name, _, span) => Err(ctx.error_at_span(
            format!("Function call `{}` is not a constant expression", name),
            *span,
        )),
    }
}

/// 沿下标链计算左值的元素地址
///
/// 指针形参（退化的数组实参）先 load 出运行期指针, 其第一个下标用 getptr,
/// 其余层级一律 getelemptr。返回最终指针以及是否为指针形参。
pub(crate) fn build_lval_ptr(
    lval: &LVal,
    stored: Value,
    ctx: &mut IrContext,
) -> Result<(Value, bool), CompilerError> {
    let base_ty = ctx.value_type(stored)?;
    let pointee = match base_ty.kind() {
        TypeKind::Pointer(base) => base.clone(),
        _ => {
            return Err(ctx.error_at_span(
                format!("Variable `{}` has no addressable storage", lval.name),
                lval.span,
            ))
        }
    };
    let is_ptr_param = matches!(pointee.kind(), TypeKind::Pointer(_));

    let mut ptr = stored;
    if is_ptr_param {
        let loaded = ctx.dfg_mut()?.new_value().load(ptr);
        ctx.push_inst(loaded)?;
        ptr = loaded;
    }

    for (i, index_expr) in lval.indices.iter().enumerate() {
        let index_val = index_expr.generate_ir(ctx)?;
        let next_ptr = if is_ptr_param && i == 0 {
            ctx.dfg_mut()?.new_value().get_ptr(ptr, index_val)
        } else {
            // getelemptr 只对指向数组的指针合法
            let cur_ty = ctx.value_type(ptr)?;
            let indexable = matches!(
                cur_ty.kind(),
                TypeKind::Pointer(base) if matches!(base.kind(), TypeKind::Array(..))
            );
            if !indexable {
                return Err(ctx.error_at_span(
                    format!("Too many indices for `{}`", lval.name),
                    lval.span,
                ));
            }
            ctx.dfg_mut()?.new_value().get_elem_ptr(ptr, index_val)
        };
        ctx.push_inst(next_ptr)?;
        ptr = next_ptr;
    }
    Ok((ptr, is_ptr_param))
}

pub fn generate_lval_ir(lval: &LVal, ctx: &mut IrContext) -> Result<Value, CompilerError> {
    let sym = ctx.lookup(&lval.name).ok_or_else(|| {
        ctx.error_at_span(format!("Undefined variable `{}`", lval.name), lval.span)
    })?;

    match sym {
        Symbol::Const(val) => {
            if !lval.indices.is_empty() {
                return Err(ctx.error_at_span(
                    format!("Indexed access on non-array `{}`", lval.name),
                    lval.span,
                ));
            }
            Ok(ctx.dfg_mut()?.new_value().integer(val))
        }
        Symbol::Var { value, .. } => {
            let (ptr, is_ptr_param) = build_lval_ptr(lval, value, ctx)?;

            // 裸指针形参不带下标: 透传已退化的指针
            if is_ptr_param && lval.indices.is_empty() {
                return Ok(ptr);
            }

            let ptr_ty = ctx.value_type(ptr)?;
            let pointee = match ptr_ty.kind() {
                TypeKind::Pointer(base) => base.clone(),
                _ => {
                    return Err(CompilerError::Internal(
                        "Element address is not a pointer".to_string(),
                    ))
                }
            };
            match pointee.kind() {
                // 数组作右值: 退化为首元素指针
                TypeKind::Array(..) => {
                    let zero = ctx.dfg_mut()?.new_value().integer(0);
                    let decay = ctx.dfg_mut()?.new_value().get_elem_ptr(ptr, zero);
                    ctx.push_inst(decay)?;
                    Ok(decay)
                }
                _ => {
                    let load = ctx.dfg_mut()?.new_value().load(ptr);
                    ctx.push_inst(load)?;
                    Ok(load)
                }
            }
        }
    }
}

pub fn generate_unary_op_ir(
    op: &UnaryOp,
    expr: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let operand = expr.generate_ir(ctx)?;
    match op {
        UnaryOp::Plus => Ok(operand),
        UnaryOp::Minus => {
            let zero = ctx.dfg_mut()?.new_value().integer(0);
            let neg = ctx
                .dfg_mut()?
                .new_value()
                .binary(koopa::ir::BinaryOp::Sub, zero, operand);
            ctx.push_inst(neg)?;
            Ok(neg)
        }
        UnaryOp::Not => {
            let zero = ctx.dfg_mut()?.new_value().integer(0);
            let not = ctx
                .dfg_mut()?
                .new_value()
                .binary(koopa::ir::BinaryOp::Eq, zero, operand);
            ctx.push_inst(not)?;
            Ok(not)
        }
    }
}

fn generate_binary_instruction(
    op: koopa::ir::BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let lval = lhs.generate_ir(ctx)?;
    let rval = rhs.generate_ir(ctx)?;
    let bin = ctx.dfg_mut()?.new_value().binary(op, lval, rval);
    ctx.push_inst(bin)?;
    Ok(bin)
}

pub fn generate_binary_op_ir(
    op: &BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let bop = match op {
        BinaryOp::Add => koopa::ir::BinaryOp::Add,
        BinaryOp::Sub => koopa::ir::BinaryOp::Sub,
        BinaryOp::Mul => koopa::ir::BinaryOp::Mul,
        BinaryOp::Div => koopa::ir::BinaryOp::Div,
        BinaryOp::Mod => koopa::ir::BinaryOp::Mod,
    };
    generate_binary_instruction(bop, lhs, rhs, ctx)
}

pub fn generate_rel_op_ir(
    op: &RelOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let bop = match op {
        RelOp::Lt => koopa::ir::BinaryOp::Lt,
        RelOp::Gt => koopa::ir::BinaryOp::Gt,
        RelOp::Le => koopa::ir::BinaryOp::Le,
        RelOp::Ge => koopa::ir::BinaryOp::Ge,
    };
    generate_binary_instruction(bop, lhs, rhs, ctx)
}

pub fn generate_eq_op_ir(
    op: &EqOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let bop = match op {
        EqOp::Eq => koopa::ir::BinaryOp::Eq,
        EqOp::Ne => koopa::ir::BinaryOp::NotEq,
    };
    generate_binary_instruction(bop, lhs, rhs, ctx)
}

/// 逻辑与的短路求值:
///   tmp = alloc; %b = ne lhs, 0; br %b, true, false
///   true:  rhs 只在这里求值, store (ne rhs, 0)
///   false: store 0
///   end:   load tmp
pub fn generate_land_op_ir(
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let tmp_name = ctx.new_var("and_res");
    let tmp = ctx.dfg_mut()?.new_value().alloc(Type::get_i32());
    ctx.dfg_mut()?.set_value_name(tmp, Some(tmp_name));
    ctx.push_inst(tmp)?;

    let lhs_val = lhs.generate_ir(ctx)?;
    let id = ctx.alloc_label_id();
    let true_bb = ctx.new_bb(format!("%and_true_{}", id))?;
    let false_bb = ctx.new_bb(format!("%and_false_{}", id))?;
    let end_bb = ctx.new_bb(format!("%and_end_{}", id))?;

    let zero = ctx.dfg_mut()?.new_value().integer(0);
    let lhs_bool = ctx
        .dfg_mut()?
        .new_value()
        .binary(koopa::ir::BinaryOp::NotEq, lhs_val, zero);
    ctx.push_inst(lhs_bool)?;
    let br = ctx.dfg_mut()?.new_value().branch(lhs_bool, true_bb, false_bb);
    ctx.push_inst(br)?;

    ctx.enter_bb(true_bb)?;
    let rhs_val = rhs.generate_ir(ctx)?;
    let zero = ctx.dfg_mut()?.new_value().integer(0);
    let rhs_bool = ctx
        .dfg_mut()?
        .new_value()
        .binary(koopa::ir::BinaryOp::NotEq, rhs_val, zero);
    ctx.push_inst(rhs_bool)?;
    let store_rhs = ctx.dfg_mut()?.new_value().store(rhs_bool, tmp);
    ctx.push_inst(store_rhs)?;
    let jump_true = ctx.dfg_mut()?.new_value().jump(end_bb);
    ctx.push_inst(jump_true)?;

    ctx.enter_bb(false_bb)?;
    let zero = ctx.dfg_mut()?.new_value().integer(0);
    let store_zero = ctx.dfg_mut()?.new_value().store(zero, tmp);
    ctx.push_inst(store_zero)?;
    let jump_false = ctx.dfg_mut()?.new_value().jump(end_bb);
    ctx.push_inst(jump_false)?;

    ctx.enter_bb(end_bb)?;
    let result = ctx.dfg_mut()?.new_value().load(tmp);
    ctx.push_inst(result)?;
    Ok(result)
}

/// 逻辑或与逻辑与对偶: 真分支写 1, 假分支求 rhs
pub fn generate_lor_op_ir(
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let tmp_name = ctx.new_var("or_res");
    let tmp = ctx.dfg_mut()?.new_value().alloc(Type::get_i32());
    ctx.dfg_mut()?.set_value_name(tmp, Some(tmp_name));
    ctx.push_inst(tmp)?;

    let lhs_val = lhs.generate_ir(ctx)?;
    let id = ctx.alloc_label_id();
    let true_bb = ctx.new_bb(format!("%or_true_{}", id))?;
    let false_bb = ctx.new_bb(format!("%or_false_{}", id))?;
    let end_bb = ctx.new_bb(format!("%or_end_{}", id))?;

    let zero = ctx.dfg_mut()?.new_value().integer(0);
    let lhs_bool = ctx
        .dfg_mut()?
        .new_value()
        .binary(koopa::ir::BinaryOp::NotEq, lhs_val, zero);
    ctx.push_inst(lhs_bool)?;
    let br = ctx.dfg_mut()?.new_value().branch(lhs_bool, true_bb, false_bb);
    ctx.push_inst(br)?;

    ctx.enter_bb(true_bb)?;
    let one = ctx.dfg_mut()?.new_value().integer(1);
    let store_one = ctx.dfg_mut()?.new_value().store(one, tmp);
    ctx.push_inst(store_one)?;
    let jump_true = ctx.dfg_mut()?.new_value().jump(end_bb);
    ctx.push_inst(jump_true)?;

    ctx.enter_bb(false_bb)?;
    let rhs_val = rhs.generate_ir(ctx)?;
    let zero = ctx.dfg_mut()?.new_value().integer(0);
    let rhs_bool = ctx
        .dfg_mut()?
        .new_value()
        .binary(koopa::ir::BinaryOp::NotEq, rhs_val, zero);
    ctx.push_inst(rhs_bool)?;
    let store_rhs = ctx.dfg_mut()?.new_value().store(rhs_bool, tmp);
    ctx.push_inst(store_rhs)?;
    let jump_false = ctx.dfg_mut()?.new_value().jump(end_bb);
    ctx.push_inst(jump_false)?;

    ctx.enter_bb(end_bb)?;
    let result = ctx.dfg_mut()?.new_value().load(tmp);
    ctx.push_inst(result)?;
    Ok(result)
}

pub fn generate_call_ir(
    func_name: &str,
    args: &[Expr],
    span: Span,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let func_handle = match ctx.func_table.get(func_name) {
        Some(&f) => f,
        None => {
            return Err(ctx.error_at_span(
                format!("Undefined function `{}`", func_name),
                span,
            ))
        }
    };

    // 实参从左到右求值, 数组退化在 LVal 求值中完成
    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
        arg_values.push(arg.generate_ir(ctx)?);
    }

    let call = ctx.dfg_mut()?.new_value().call(func_handle, arg_values);
    ctx.push_inst(call)?;
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: i32) -> Box<Expr> {
        Box::new(Expr::IntLiteral(n, Span::default()))
    }

    #[test]
    fn folds_arithmetic() {
        let ctx = IrContext::new(None);
        let inner = Box::new(Expr::BinaryOp(BinaryOp::Mul, lit(2), lit(3), Span::default()));
        let e = Expr::BinaryOp(BinaryOp::Add, lit(1), inner, Span::default());
        assert_eq!(evaluate_const_expr(&e, &ctx).unwrap(), 7);
    }

    #[test]
    fn folds_with_twos_complement_wrapping() {
        let ctx = IrContext::new(None);
        let e = Expr::BinaryOp(BinaryOp::Add, lit(i32::MAX), lit(1), Span::default());
        assert_eq!(evaluate_const_expr(&e, &ctx).unwrap(), i32::MIN);
    }

    #[test]
    fn rejects_division_by_zero() {
        let ctx = IrContext::new(None);
        let e = Expr::BinaryOp(BinaryOp::Div, lit(1), lit(0), Span::default());
        assert!(evaluate_const_expr(&e, &ctx).is_err());
    }

    #[test]
    fn not_collapses_to_boolean() {
        let ctx = IrContext::new(None);
        let e = Expr::UnaryOp(UnaryOp::Not, lit(5), Span::default());
        assert_eq!(evaluate_const_expr(&e, &ctx).unwrap(), 0);
    }

    #[test]
    fn const_lookup_reads_environment() {
        let mut ctx = IrContext::new(None);
        ctx.define_global("N".to_string(), Symbol::Const(4)).unwrap();
        let e = Expr::LVal(LVal {
            name: "N".to_string(),
            indices: Vec::new(),
            span: Span::default(),
        });
        assert_eq!(evaluate_const_expr(&e, &ctx).unwrap(), 4);
    }

    #[test]
    fn logical_ops_short_circuit_in_const_context() {
        let ctx = IrContext::new(None);
        let div = Box::new(Expr::BinaryOp(BinaryOp::Div, lit(1), lit(0), Span::default()));
        let and = Expr::LAndOp(LAndOp::And, lit(0), div.clone(), Span::default());
        assert_eq!(evaluate_const_expr(&and, &ctx).unwrap(), 0);
        let or = Expr::LOrOp(LOrOp::Or, lit(7), div, Span::default());
        assert_eq!(evaluate_const_expr(&or, &ctx).unwrap(), 1);
    }
}
