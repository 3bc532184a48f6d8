//! # 汇编代码生成模块
//!
//! 把内存形式的 Koopa IR 翻译为 RISC-V 汇编。
//!
//! 生成策略:
//! - 预扫描为所有产生值的指令分配栈槽, 统计 call 与最大实参数;
//! - 指令按基本块顺序逐条翻译, 操作数取到 t0/t1, 结果写回各自的栈槽;
//! - t2 保留给宽立即数展开与 getelemptr/getptr 的步长;
//! - 调用按整数调用约定: 前 8 个实参进 a0-a7, 其余压在栈帧最底部。

use koopa::ir::{FunctionData, Program, Type, TypeKind, Value, ValueKind};
use crate::back::context::Context;
use crate::back::insts::{Instruction, Reg, ARG_REGS};
use crate::back::utils::{emit_addi, emit_lw, emit_sw, type_size};
use crate::CompilerError;

pub trait GenerateAsm {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError>;
}

impl GenerateAsm for Program {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        // 全局变量: 每个 global alloc 生成一段 .data
        for &value in self.inst_layout() {
            let init = {
                let var_data = program.borrow_value(value);
                let init = match var_data.kind() {
                    ValueKind::GlobalAlloc(global_alloc) => global_alloc.init(),
                    _ => continue,
                };
                let name = var_data.name().as_ref().ok_or_else(|| {
                    CompilerError::Internal("Global variable has no name".to_string())
                })?;
                let name = name[1..].to_string();
                ctx.global_map.insert(value, name.clone());
                ctx.program.push(Instruction::Section(".data".to_string()));
                ctx.program.push(Instruction::Global(name.clone()));
                ctx.program.push(Instruction::Label(name));
                init
            };
            emit_global_init(init, program, ctx)?;
        }

        // 函数: 跳过没有基本块的库函数声明
        for &func in self.func_layout() {
            let func_data = self.func(func);
            if func_data.layout().entry_bb().is_none() {
                continue;
            }
            ctx.current_func = Some(func);
            func_data.generate(program, ctx)?;
        }
        Ok(())
    }
}

/// 递归输出全局初始化数据: 整数 -> .word, 零初始化 -> .zero, 聚合逐元素展开
fn emit_global_init(value: Value, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
    let value_data = program.borrow_value(value);
    match value_data.kind() {
        ValueKind::Integer(i) => {
            ctx.program.push(Instruction::Word(i.value()));
            Ok(())
        }
        ValueKind::ZeroInit(_) => {
            ctx.program.push(Instruction::Zero(type_size(value_data.ty())));
            Ok(())
        }
        ValueKind::Aggregate(agg) => {
            for &elem in agg.elems() {
                emit_global_init(elem, program, ctx)?;
            }
            Ok(())
        }
        _ => Err(CompilerError::Internal(format!(
            "Unsupported global initializer: {:?}",
            value_data.kind()
        ))),
    }
}

impl GenerateAsm for FunctionData {
    fn generate(&self, program: &Program, ctx: &mut Context) -> Result<(), CompilerError> {
        ctx.reset_for_function();
        let name = self.name()[1..].to_string();

        // 预扫描: 为每个产生值的指令分配栈槽, 统计 call 信息
        let mut local_size = 0i32;
        let mut ra_size = 0i32;
        let mut max_args = 0usize;
        for (_bb, node) in self.layout().bbs() {
            for &inst in node.insts().keys() {
                let value_data = self.dfg().value(inst);
                if let ValueKind::Call(call) = value_data.kind() {
                    ra_size = 4;
                    max_args = max_args.max(call.args().len());
                }
                if value_data.ty().is_unit() {
                    continue;
                }
                ctx.stack_map.insert(inst, local_size);
                // alloc 预留所指存储的全部空间, 其余指令结果各占 4 字节
                local_size += match value_data.kind() {
                    ValueKind::Alloc(_) => alloc_size(value_data.ty())?,
                    _ => 4,
                };
            }
        }
        let arg_area = (max_args as i32 - 8).max(0) * 4;
        let frame_size = (local_size + ra_size + arg_area + 15) / 16 * 16;
        ctx.frame_size = frame_size;
        ctx.ra_size = ra_size;
        ctx.arg_area = arg_area;

        // 序言
        ctx.program.push(Instruction::Blank);
        ctx.program.push(Instruction::Section(".text".to_string()));
        ctx.program.push(Instruction::Globl(name.clone()));
        ctx.program.push(Instruction::Label(name.clone()));
        if frame_size > 0 {
            emit_addi(ctx, Reg::Sp, Reg::Sp, -frame_size);
        }
        if ra_size > 0 {
            emit_sw(ctx, Reg::Ra, Reg::Sp, frame_size - 4);
        }

        // 局部槽位整体上移, 把栈帧最低处让给外传参数区
        for offset in ctx.stack_map.values_mut() {
            *offset += arg_area;
        }

        // 形参落位: 前 8 个从 a0-a7 写进本帧槽位, 其余直接映射到调用者帧
        for (i, &param) in self.params().iter().enumerate() {
            if i < 8 {
                let offset = (i as i32) * 4 + arg_area;
                ctx.stack_map.insert(param, offset);
                emit_sw(ctx, ARG_REGS[i], Reg::Sp, offset);
            } else {
                ctx.stack_map.insert(param, frame_size + ((i - 8) as i32) * 4);
            }
        }

        // 汇编标签带函数名前缀, 保证跨函数唯一
        for (&bb, _node) in self.layout().bbs() {
            let bb_data = self.dfg().bbs().get(&bb).ok_or_else(|| {
                CompilerError::Internal("Basic block not found in dfg".to_string())
            })?;
            let bb_name = bb_data.name().as_ref().ok_or_else(|| {
                CompilerError::Internal("Basic block has no name".to_string())
            })?;
            ctx.bb_label_map.insert(bb, format!("{}_{}", name, &bb_name[1..]));
        }

        for (&bb, node) in self.layout().bbs() {
            let label = ctx.bb_label_map.get(&bb).cloned().ok_or_else(|| {
                CompilerError::Internal("Basic block not found in label map".to_string())
            })?;
            ctx.program.push(Instruction::Label(label));
            for &inst in node.insts().keys() {
                generate_inst(inst, self, program, ctx)?;
            }
        }
        Ok(())
    }
}

fn generate_inst(
    inst: Value,
    func: &FunctionData,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    match func.dfg().value(inst).kind() {
        // 栈空间在预扫描时已经保留
        ValueKind::Alloc(_) => Ok(()),

        ValueKind::Load(load) => {
            load_to(load.src(), Reg::T0, func, program, ctx)?;
            ctx.program.push(Instruction::Lw(Reg::T0, 0, Reg::T0));
            save_result(inst, Reg::T0, ctx)
        }

        ValueKind::Store(store) => {
            load_to(store.value(), Reg::T0, func, program, ctx)?;
            load_to(store.dest(), Reg::T1, func, program, ctx)?;
            ctx.program.push(Instruction::Sw(Reg::T0, 0, Reg::T1));
            Ok(())
        }

        ValueKind::Binary(binary) => {
            let op = binary.op();
            load_to(binary.lhs(), Reg::T0, func, program, ctx)?;
            load_to(binary.rhs(), Reg::T1, func, program, ctx)?;
            emit_binary_op(op, ctx);
            save_result(inst, Reg::T0, ctx)
        }

        ValueKind::Branch(branch) => {
            load_to(branch.cond(), Reg::T0, func, program, ctx)?;
            let true_label = bb_label(branch.true_bb(), ctx)?;
            let false_label = bb_label(branch.false_bb(), ctx)?;
            ctx.program.push(Instruction::Bnez(Reg::T0, true_label));
            ctx.program.push(Instruction::J(false_label));
            Ok(())
        }

        ValueKind::Jump(jump) => {
            let target_label = bb_label(jump.target(), ctx)?;
            ctx.program.push(Instruction::J(target_label));
            Ok(())
        }

        ValueKind::Call(call) => {
            // 实参就位: 前 8 个进寄存器, 其余存进本帧最底部的外传参数区
            for (i, &arg) in call.args().iter().enumerate() {
                if i < 8 {
                    load_to(arg, ARG_REGS[i], func, program, ctx)?;
                } else {
                    load_to(arg, Reg::T0, func, program, ctx)?;
                    emit_sw(ctx, Reg::T0, Reg::Sp, ((i - 8) as i32) * 4);
                }
            }
            let callee_name = program.func(call.callee()).name()[1..].to_string();
            ctx.program.push(Instruction::Call(callee_name));
            // 返回值在 a0, 非 void 时写回本指令的栈槽
            if !func.dfg().value(inst).ty().is_unit() {
                save_result(inst, Reg::A0, ctx)?;
            }
            Ok(())
        }

        ValueKind::GetElemPtr(gep) => {
            let stride = elem_stride(gep.src(), func, program, ctx)?;
            load_to(gep.src(), Reg::T0, func, program, ctx)?;
            load_to(gep.index(), Reg::T1, func, program, ctx)?;
            ctx.program.push(Instruction::Li(Reg::T2, stride));
            ctx.program.push(Instruction::Mul(Reg::T1, Reg::T1, Reg::T2));
            ctx.program.push(Instruction::Add(Reg::T0, Reg::T0, Reg::T1));
            save_result(inst, Reg::T0, ctx)
        }

        ValueKind::GetPtr(gp) => {
            let stride = ptr_stride(gp.src(), func, program, ctx)?;
            load_to(gp.src(), Reg::T0, func, program, ctx)?;
            load_to(gp.index(), Reg::T1, func, program, ctx)?;
            ctx.program.push(Instruction::Li(Reg::T2, stride));
            ctx.program.push(Instruction::Mul(Reg::T1, Reg::T1, Reg::T2));
            ctx.program.push(Instruction::Add(Reg::T0, Reg::T0, Reg::T1));
            save_result(inst, Reg::T0, ctx)
        }

        ValueKind::Return(ret) => {
            if let Some(value) = ret.value() {
                load_to(value, Reg::A0, func, program, ctx)?;
            }
            // 尾声: 恢复 ra 与栈指针
            if ctx.ra_size > 0 {
                emit_lw(ctx, Reg::Ra, Reg::Sp, ctx.frame_size - 4);
            }
            if ctx.frame_size > 0 {
                emit_addi(ctx, Reg::Sp, Reg::Sp, ctx.frame_size);
            }
            ctx.program.push(Instruction::Ret);
            Ok(())
        }

        kind => Err(CompilerError::Internal(format!(
            "Unhandled value kind in code generation: {:?}",
            kind
        ))),
    }
}

/// 把一个 Koopa 值取到指定寄存器
///
/// 整数常量用 li, 全局变量取地址用 la, alloc 取其栈槽地址,
/// 其余（指令结果与形参）一律从各自的栈槽读出。
fn load_to(
    value: Value,
    reg: Reg,
    func: &FunctionData,
    program: &Program,
    ctx: &mut Context,
) -> Result<(), CompilerError> {
    // 全局值不在函数 dfg 里, 必须先行分流
    if let Some(name) = ctx.global_map.get(&value) {
        let name = name.clone();
        ctx.program.push(Instruction::La(reg, name));
        return Ok(());
    }
    match func.dfg().value(value).kind() {
        ValueKind::Integer(i) => {
            ctx.program.push(Instruction::Li(reg, i.value()));
            Ok(())
        }
        ValueKind::Alloc(_) => {
            let offset = stack_offset(value, ctx)?;
            emit_addi(ctx, reg, Reg::Sp, offset);
            Ok(())
        }
        _ => {
            let offset = stack_offset(value, ctx)?;
            emit_lw(ctx, reg, Reg::Sp, offset);
            Ok(())
        }
    }
}

fn emit_binary_op(op: koopa::ir::BinaryOp, ctx: &mut Context) {
    use koopa::ir::BinaryOp::*;
    let (t0, t1) = (Reg::T0, Reg::T1);
    match op {
        Add => ctx.program.push(Instruction::Add(t0, t0, t1)),
        Sub => ctx.program.push(Instruction::Sub(t0, t0, t1)),
        Mul => ctx.program.push(Instruction::Mul(t0, t0, t1)),
        Div => ctx.program.push(Instruction::Div(t0, t0, t1)),
        Mod => ctx.program.push(Instruction::Rem(t0, t0, t1)),
        And => ctx.program.push(Instruction::And(t0, t0, t1)),
        Or => ctx.program.push(Instruction::Or(t0, t0, t1)),
        Xor => ctx.program.push(Instruction::Xor(t0, t0, t1)),
        Shl => ctx.program.push(Instruction::Sll(t0, t0, t1)),
        Shr => ctx.program.push(Instruction::Srl(t0, t0, t1)),
        Sar => ctx.program.push(Instruction::Sra(t0, t0, t1)),
        Lt => ctx.program.push(Instruction::Slt(t0, t0, t1)),
        Gt => ctx.program.push(Instruction::Sgt(t0, t0, t1)),
        Le => {
            ctx.program.push(Instruction::Sgt(t0, t0, t1));
            ctx.program.push(Instruction::Seqz(t0, t0));
        }
        Ge => {
            ctx.program.push(Instruction::Slt(t0, t0, t1));
            ctx.program.push(Instruction::Seqz(t0, t0));
        }
        Eq => {
            ctx.program.push(Instruction::Xor(t0, t0, t1));
            ctx.program.push(Instruction::Seqz(t0, t0));
        }
        NotEq => {
            ctx.program.push(Instruction::Xor(t0, t0, t1));
            ctx.program.push(Instruction::Snez(t0, t0));
        }
    }
}

fn save_result(inst: Value, reg: Reg, ctx: &mut Context) -> Result<(), CompilerError> {
    let offset = stack_offset(inst, ctx)?;
    emit_sw(ctx, reg, Reg::Sp, offset);
    Ok(())
}

fn stack_offset(value: Value, ctx: &Context) -> Result<i32, CompilerError> {
    ctx.stack_map.get(&value).copied().ok_or_else(|| {
        CompilerError::Internal("Value not found in stack map".to_string())
    })
}

fn bb_label(bb: koopa::ir::BasicBlock, ctx: &Context) -> Result<String, CompilerError> {
    ctx.bb_label_map.get(&bb).cloned().ok_or_else(|| {
        CompilerError::Internal("Basic block not found in label map".to_string())
    })
}

/// alloc 指令的结果类型是指向存储的指针, 预留所指对象的空间
fn alloc_size(ty: &Type) -> Result<i32, CompilerError> {
    match ty.kind() {
        TypeKind::Pointer(base) => Ok(type_size(base)),
        _ => Err(CompilerError::Internal(format!(
            "Alloc result has non-pointer type: {:?}",
            ty
        ))),
    }
}

fn value_ty(
    value: Value,
    func: &FunctionData,
    program: &Program,
    ctx: &Context,
) -> Type {
    if ctx.global_map.contains_key(&value) {
        program.borrow_value(value).ty().clone()
    } else {
        func.dfg().value(value).ty().clone()
    }
}

/// getelemptr 的步长: 源指针指向数组, 步长为数组元素的大小
fn elem_stride(
    src: Value,
    func: &FunctionData,
    program: &Program,
    ctx: &Context,
) -> Result<i32, CompilerError> {
    let ty = value_ty(src, func, program, ctx);
    match ty.kind() {
        TypeKind::Pointer(base) => match base.kind() {
            TypeKind::Array(elem, _) => Ok(type_size(elem)),
            _ => Err(CompilerError::Internal(format!(
                "GetElemPtr source is not a pointer to array: {:?}",
                base
            ))),
        },
        _ => Err(CompilerError::Internal(format!(
            "GetElemPtr source is not a pointer: {:?}",
            ty
        ))),
    }
}

/// getptr 的步长: 按源指针所指对象的大小平移
fn ptr_stride(
    src: Value,
    func: &FunctionData,
    program: &Program,
    ctx: &Context,
) -> Result<i32, CompilerError> {
    let ty = value_ty(src, func, program, ctx);
    match ty.kind() {
        TypeKind::Pointer(base) => Ok(type_size(base)),
        _ => Err(CompilerError::Internal(format!(
            "GetPtr source is not a pointer: {:?}",
            ty
        ))),
    }
}
