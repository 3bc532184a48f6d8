use lalrpop_util::lalrpop_mod;

pub mod front;
pub mod back;
pub mod utils;

pub use utils::CompilerError;

// 引用 lalrpop 生成的解析器
// 语法文件是 sysy.lalrpop, 所以模块名是 sysy
lalrpop_mod!(#[allow(clippy::all)] pub sysy);
