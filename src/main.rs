use std::fs::read_to_string;
use koopa::back::KoopaGenerator;
use koopa::ir::Type;
use lalrpop_util::lexer::Token;
use lalrpop_util::ParseError;
use sysyc::back::generate_asm;
use sysyc::front::generate_ir;
use sysyc::sysy;
use sysyc::utils::args::Params;
use sysyc::utils::logger::report_fatal;
use sysyc::utils::SourceMap;
use sysyc::CompilerError;

fn main() {
    if let Err(e) = run() {
        report_fatal(&e);
    }
}

fn format_expected(expected: Vec<String>) -> String {
    if expected.is_empty() {
        "no expected tokens".to_string()
    } else {
        expected.join(", ")
    }
}

fn format_parse_error(source_map: &SourceMap, err: ParseError<usize, Token<'_>, &str>) -> String {
    match err {
        ParseError::InvalidToken { location } => {
            format!("Invalid token at {}", source_map.format_location(location))
        }
        ParseError::UnrecognizedEof { location, expected } => {
            format!(
                "Unexpected end of file at {}. Expected: {}",
                source_map.format_location(location),
                format_expected(expected)
            )
        }
        ParseError::UnrecognizedToken { token, expected } => {
            let (start, tok, _end) = token;
            format!(
                "Unrecognized token {:?} at {}. Expected: {}",
                tok,
                source_map.format_location(start),
                format_expected(expected)
            )
        }
        ParseError::ExtraToken { token } => {
            let (start, tok, _end) = token;
            format!("Extra token {:?} at {}", tok, source_map.format_location(start))
        }
        ParseError::User { error } => {
            format!("Parse error: {}", error)
        }
    }
}

fn run() -> Result<(), CompilerError> {
    let params = Params::from_args()?;

    // 目标为 riscv32, 指针大小为 4 字节
    if params.riscv || params.perf {
        Type::set_ptr_size(4);
    }

    let input = read_to_string(&params.input)?;
    let source_map = SourceMap::new(&input);

    let ast = sysy::CompUnitParser::new()
        .parse(&input)
        .map_err(|e| CompilerError::Parse(format_parse_error(&source_map, e)))?;

    let program = generate_ir(&ast, Some(source_map))?;

    if params.koopa {
        KoopaGenerator::from_path(&params.output)
            .map_err(CompilerError::Io)?
            .generate_on(&program)
            .map_err(CompilerError::Io)?;
        return Ok(());
    }

    let asm = generate_asm(&program)?;
    std::fs::write(&params.output, asm)?;
    Ok(())
}
