use std::env::args;
use crate::CompilerError;

/// 命令行参数: `<input> -o <output>` 加且仅加一个输出模式
#[derive(Debug, Clone)]
pub struct Params {
    pub input: String,
    pub output: String,
    pub koopa: bool,
    pub riscv: bool,
    pub perf: bool,
}

impl Params {
    pub fn from_args() -> Result<Self, CompilerError> {
        Self::from_iter(args().skip(1))
    }

    pub fn from_iter(iter: impl IntoIterator<Item = String>) -> Result<Self, CompilerError> {
        let mut iter = iter.into_iter();
        let mut input = String::new();
        let mut output = String::new();
        let mut koopa = false;
        let mut riscv = false;
        let mut perf = false;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-o" => match iter.next() {
                    Some(o) => output = o,
                    None => {
                        return Err(CompilerError::Args(
                            "Output file not specified after -o".to_string(),
                        ))
                    }
                },
                "-koopa" => koopa = true,
                "-riscv" => riscv = true,
                "-perf" => perf = true,
                _ => {
                    if input.is_empty() {
                        input = arg;
                    } else {
                        return Err(CompilerError::Args(
                            "Multiple input files are not supported".to_string(),
                        ));
                    }
                }
            }
        }
        if input.is_empty() {
            return Err(CompilerError::Args("Input file not specified".to_string()));
        }
        if output.is_empty() {
            return Err(CompilerError::Args("Output file not specified".to_string()));
        }
        match (koopa as u8) + (riscv as u8) + (perf as u8) {
            0 => {
                return Err(CompilerError::Args(
                    "No output format specified (-koopa, -riscv, or -perf)".to_string(),
                ))
            }
            1 => {}
            _ => {
                return Err(CompilerError::Args(
                    "Multiple output formats specified; please choose only one".to_string(),
                ))
            }
        }
        Ok(Params { input, output, koopa, riscv, perf })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Params, CompilerError> {
        Params::from_iter(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn accepts_koopa_mode() {
        let params = parse(&["-koopa", "hello.c", "-o", "hello.koopa"]).unwrap();
        assert!(params.koopa);
        assert_eq!(params.input, "hello.c");
        assert_eq!(params.output, "hello.koopa");
    }

    #[test]
    fn rejects_missing_mode() {
        assert!(parse(&["hello.c", "-o", "out"]).is_err());
    }

    #[test]
    fn rejects_conflicting_modes() {
        assert!(parse(&["-koopa", "-riscv", "hello.c", "-o", "out"]).is_err());
    }

    #[test]
    fn rejects_missing_output() {
        assert!(parse(&["-riscv", "hello.c"]).is_err());
    }
}
