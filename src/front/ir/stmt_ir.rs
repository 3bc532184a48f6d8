use koopa::ir::builder_traits::*;
use koopa::ir::TypeKind;
use crate::front::ast::{Block, BlockItem, Expr, LVal, Span, Stmt};
use crate::front::ir::context::Symbol;
use crate::front::ir::expr_ir::build_lval_ptr;
use crate::front::ir::{GenerateIR, IrContext};
use crate::CompilerError;

pub fn generate_return_stmt_ir(
    expr: &Option<Expr>,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let ret_val = match expr {
        Some(e) => Some(e.generate_ir(ctx)?),
        None => None,
    };
    let ret = ctx.dfg_mut()?.new_value().ret(ret_val);
    ctx.push_inst(ret)?;
    Ok(())
}

pub fn generate_assign_stmt_ir(
    lval: &LVal,
    expr: &Expr,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let sym = ctx.lookup(&lval.name).ok_or_else(|| {
        ctx.error_at_span(format!("Undefined variable `{}`", lval.name), lval.span)
    })?;

    let value = match sym {
        Symbol::Const(_) | Symbol::Var { is_const: true, .. } => {
            return Err(ctx.error_at_span(
                format!("Cannot assign to constant `{}`", lval.name),
                lval.span,
            ))
        }
        Symbol::Var { value, .. } => value,
    };

    // 先沿下标链求出目标地址, 再求右值
    let (ptr, _) = build_lval_ptr(lval, value, ctx)?;
    let ptr_ty = ctx.value_type(ptr)?;
    let assignable = matches!(
        ptr_ty.kind(),
        TypeKind::Pointer(base) if matches!(base.kind(), TypeKind::Int32)
    );
    if !assignable {
        return Err(ctx.error_at_span(
            format!("Cannot assign to array `{}`", lval.name),
            lval.span,
        ));
    }

    let expr_val = expr.generate_ir(ctx)?;
    let store = ctx.dfg_mut()?.new_value().store(expr_val, ptr);
    ctx.push_inst(store)?;
    Ok(())
}

pub fn generate_block_stmt_ir(block: &Block, ctx: &mut IrContext) -> Result<(), CompilerError> {
    ctx.push_scope();
    for item in block {
        // 当前块已终结时, 其后的语句都是死代码, 直接跳过
        if ctx.is_block_closed()? {
            break;
        }
        match item {
            BlockItem::Decl(decl) => decl.generate_ir(ctx)?,
            BlockItem::Stmt(stmt) => stmt.generate_ir(ctx)?,
        }
    }
    ctx.pop_scope()?;
    Ok(())
}

pub fn generate_expr_stmt_ir(
    expr: &Option<Expr>,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    if let Some(e) = expr {
        e.generate_ir(ctx)?;
    }
    Ok(())
}

/// if 语句: 每条语句领取一个标号 id, 生成 %then_i / %else_i / %end_i
pub fn generate_if_stmt_ir(
    cond: &Expr,
    then_stmt: &Stmt,
    else_stmt: Option<&Stmt>,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let cond_val = cond.generate_ir(ctx)?;
    let id = ctx.alloc_label_id();

    let then_bb = ctx.new_bb(format!("%then_{}", id))?;
    let else_bb = match else_stmt {
        Some(_) => Some(ctx.new_bb(format!("%else_{}", id))?),
        None => None,
    };
    let end_bb = ctx.new_bb(format!("%end_{}", id))?;

    let false_target = else_bb.unwrap_or(end_bb);
    let br = ctx.dfg_mut()?.new_value().branch(cond_val, then_bb, false_target);
    ctx.push_inst(br)?;

    ctx.enter_bb(then_bb)?;
    then_stmt.generate_ir(ctx)?;
    if !ctx.is_block_closed()? {
        let jump = ctx.dfg_mut()?.new_value().jump(end_bb);
        ctx.push_inst(jump)?;
    }

    if let (Some(else_s), Some(else_bb)) = (else_stmt, else_bb) {
        ctx.enter_bb(else_bb)?;
        else_s.generate_ir(ctx)?;
        if !ctx.is_block_closed()? {
            let jump = ctx.dfg_mut()?.new_value().jump(end_bb);
            ctx.push_inst(jump)?;
        }
    }

    ctx.enter_bb(end_bb)?;
    Ok(())
}

/// while 语句: %while_entry_i 重算条件, %while_body_i 执行循环体,
/// %while_end_i 为出口; continue 跳 entry, break 跳 end
pub fn generate_while_stmt_ir(
    cond: &Expr,
    body: &Stmt,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    let id = ctx.alloc_label_id();
    let entry_bb = ctx.new_bb(format!("%while_entry_{}", id))?;
    let body_bb = ctx.new_bb(format!("%while_body_{}", id))?;
    let end_bb = ctx.new_bb(format!("%while_end_{}", id))?;

    ctx.loop_stack.push((entry_bb, end_bb));

    let jump_entry = ctx.dfg_mut()?.new_value().jump(entry_bb);
    ctx.push_inst(jump_entry)?;

    ctx.enter_bb(entry_bb)?;
    let cond_val = cond.generate_ir(ctx)?;
    let br = ctx.dfg_mut()?.new_value().branch(cond_val, body_bb, end_bb);
    ctx.push_inst(br)?;

    ctx.enter_bb(body_bb)?;
    body.generate_ir(ctx)?;
    if !ctx.is_block_closed()? {
        let jump_back = ctx.dfg_mut()?.new_value().jump(entry_bb);
        ctx.push_inst(jump_back)?;
    }

    ctx.enter_bb(end_bb)?;
    ctx.loop_stack.pop();
    Ok(())
}

pub fn generate_break_stmt_ir(span: &Span, ctx: &mut IrContext) -> Result<(), CompilerError> {
    let break_target = match ctx.loop_stack.last() {
        Some(&(_, break_target)) => break_target,
        None => {
            return Err(ctx.error_at_span("`break` used outside of loop".to_string(), *span))
        }
    };
    let jump = ctx.dfg_mut()?.new_value().jump(break_target);
    ctx.push_inst(jump)?;
    Ok(())
}

pub fn generate_continue_stmt_ir(span: &Span, ctx: &mut IrContext) -> Result<(), CompilerError> {
    let continue_target = match ctx.loop_stack.last() {
        Some(&(continue_target, _)) => continue_target,
        None => {
            return Err(ctx.error_at_span("`continue` used outside of loop".to_string(), *span))
        }
    };
    let jump = ctx.dfg_mut()?.new_value().jump(continue_target);
    ctx.push_inst(jump)?;
    Ok(())
}
