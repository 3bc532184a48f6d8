/// 把字节偏移换算成行列号
///
/// 诊断最多在首个错误处查询一次, 不值得预建行号索引;
/// 直接持有源文本, 查询时扫描到目标偏移为止。
#[derive(Debug, Clone)]
pub struct SourceMap {
    text: String,
}

impl SourceMap {
    pub fn new(input: &str) -> Self {
        Self { text: input.to_string() }
    }

    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for byte in self.text.bytes().take(offset) {
            if byte == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    pub fn format_location(&self, offset: usize) -> String {
        let (line, col) = self.line_col(offset);
        format!("line {}, column {}", line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_offsets_across_lines() {
        let sm = SourceMap::new("int a;\nint b;\n");
        assert_eq!(sm.line_col(0), (1, 1));
        assert_eq!(sm.line_col(4), (1, 5));
        assert_eq!(sm.line_col(7), (2, 1));
        assert_eq!(sm.line_col(11), (2, 5));
    }

    #[test]
    fn formats_location() {
        let sm = SourceMap::new("x\ny\n");
        assert_eq!(sm.format_location(2), "line 2, column 1");
    }

    #[test]
    fn offset_past_end_saturates_to_last_position() {
        let sm = SourceMap::new("ab");
        assert_eq!(sm.line_col(100), (1, 3));
    }
}
