use koopa::ir::{Type, TypeKind};
use crate::back::context::Context;
use crate::back::insts::{Instruction, Reg};

/// riscv32 目标上的类型大小: 整数与指针 4 字节, 数组按元素累乘
pub fn type_size(ty: &Type) -> i32 {
    match ty.kind() {
        TypeKind::Int32 => 4,
        TypeKind::Pointer(_) => 4,
        TypeKind::Array(base, len) => (*len as i32) * type_size(base),
        _ => 0,
    }
}

pub fn is_imm12(val: i32) -> bool {
    (-2048..=2047).contains(&val)
}

/// addi 的立即数超出 12 位范围时改用 li t2 / add
pub fn emit_addi(ctx: &mut Context, rd: Reg, rs: Reg, imm: i32) {
    if is_imm12(imm) {
        ctx.program.push(Instruction::Addi(rd, rs, imm));
    } else {
        ctx.program.push(Instruction::Li(Reg::T2, imm));
        ctx.program.push(Instruction::Add(rd, rs, Reg::T2));
    }
}

pub fn emit_lw(ctx: &mut Context, rd: Reg, base: Reg, offset: i32) {
    if is_imm12(offset) {
        ctx.program.push(Instruction::Lw(rd, offset, base));
    } else {
        ctx.program.push(Instruction::Li(Reg::T2, offset));
        ctx.program.push(Instruction::Add(Reg::T2, Reg::T2, base));
        ctx.program.push(Instruction::Lw(rd, 0, Reg::T2));
    }
}

pub fn emit_sw(ctx: &mut Context, src: Reg, base: Reg, offset: i32) {
    if is_imm12(offset) {
        ctx.program.push(Instruction::Sw(src, offset, base));
    } else {
        ctx.program.push(Instruction::Li(Reg::T2, offset));
        ctx.program.push(Instruction::Add(Reg::T2, Reg::T2, base));
        ctx.program.push(Instruction::Sw(src, 0, Reg::T2));
    }
}
