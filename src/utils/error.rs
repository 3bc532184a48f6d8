use std::fmt;

/// 编译器的统一错误通道, 所有错误都是致命的, 首个错误即终止
#[derive(Debug)]
pub enum CompilerError {
    /// 文件读写失败
    Io(std::io::Error),
    /// 语法分析失败
    Parse(String),
    /// 源程序的语义错误, 尽量带上出错位置
    Semantic {
        message: String,
        location: Option<String>,
    },
    /// 命令行参数错误
    Args(String),
    /// 编译器内部不变量被破坏
    Internal(String),
}

impl CompilerError {
    pub fn semantic(message: impl Into<String>) -> Self {
        CompilerError::Semantic {
            message: message.into(),
            location: None,
        }
    }

    pub fn semantic_at(message: impl Into<String>, location: String) -> Self {
        CompilerError::Semantic {
            message: message.into(),
            location: Some(location),
        }
    }

    /// 用法错误与编译失败用不同的退出码区分
    pub fn exit_code(&self) -> i32 {
        match self {
            CompilerError::Args(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::Io(e) => write!(f, "i/o error: {}", e),
            CompilerError::Parse(msg) => write!(f, "parse error: {}", msg),
            CompilerError::Semantic { message, location: Some(loc) } => {
                write!(f, "semantic error: {} ({})", message, loc)
            }
            CompilerError::Semantic { message, location: None } => {
                write!(f, "semantic error: {}", message)
            }
            CompilerError::Args(msg) => write!(f, "usage error: {}", msg),
            CompilerError::Internal(msg) => {
                write!(f, "internal error: {} (this is a compiler bug)", msg)
            }
        }
    }
}

impl std::error::Error for CompilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompilerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::Io(err)
    }
}
