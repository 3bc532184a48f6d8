//! # 后端模块
//!
//! 把 Koopa IR 程序翻译为 RISC-V (RV32IM) 汇编。
//!
//! - `asm`: 指令选择, 为每种 IR 指令实现生成逻辑
//! - `insts`: RISC-V 指令定义与文本化
//! - `program`: 线性汇编缓冲
//! - `context`: 栈帧与标签等逐函数状态
//! - `utils`: 类型大小与 12 位立即数处理

pub mod asm;
pub mod context;
pub mod insts;
pub mod program;
pub mod utils;

use koopa::ir::Program;
use crate::back::asm::GenerateAsm;
use crate::back::context::Context;
use crate::CompilerError;

/// 从 Koopa IR 程序生成 RISC-V 汇编文本
pub fn generate_asm(program: &Program) -> Result<String, CompilerError> {
    let mut ctx = Context::new();
    program.generate(program, &mut ctx)?;
    Ok(ctx.program.dump())
}
