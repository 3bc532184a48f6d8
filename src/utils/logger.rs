use colored::Colorize;
use crate::CompilerError;

/// 打印诊断并终止进程; 退出码由错误类别决定, 用法错误附带使用说明
pub fn report_fatal(error: &CompilerError) -> ! {
    eprintln!("{} {}", "error:".red().bold(), error);
    if matches!(error, CompilerError::Args(_)) {
        eprintln!(
            "{} sysyc <input> [-koopa | -riscv | -perf] -o <output>",
            "usage:".yellow().bold()
        );
    }
    std::process::exit(error.exit_code())
}
