use koopa::back::KoopaGenerator;
use koopa::ir::Program;
use crate::front::ast::CompUnit;
use crate::front::ir::{GenerateIR, IrContext};
use crate::utils::SourceMap;
use crate::CompilerError;

pub mod ast;
pub mod ir;

pub fn generate_ir(ast: &CompUnit, source_map: Option<SourceMap>) -> Result<Program, CompilerError> {
    let mut ctx = IrContext::new(source_map);
    ast.generate_ir(&mut ctx)?;
    Ok(ctx.program)
}

/// 把内存形式的 Koopa IR 渲染为文本
pub fn emit_ir_text(program: &Program) -> Result<String, CompilerError> {
    let mut gen = KoopaGenerator::new(Vec::new());
    gen.generate_on(program).map_err(CompilerError::Io)?;
    let text = std::str::from_utf8(&gen.writer())
        .map_err(|e| CompilerError::Internal(format!("Emitted IR is not valid UTF-8: {}", e)))?
        .to_string();
    Ok(text)
}
