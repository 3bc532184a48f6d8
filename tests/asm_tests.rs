use sysyc::back::generate_asm;
use sysyc::front::generate_ir;
use sysyc::sysy::CompUnitParser;
use sysyc::utils::SourceMap;

fn compile_asm(source: &str) -> String {
    let ast = CompUnitParser::new()
        .parse(source)
        .expect("parse should succeed");
    let program = generate_ir(&ast, Some(SourceMap::new(source)))
        .expect("IR generation should succeed");
    generate_asm(&program).expect("code generation should succeed")
}

/// 取第一处 `addi sp, sp, -N` 的 N
fn first_frame_size(asm: &str) -> i32 {
    let pos = asm
        .find("addi sp, sp, -")
        .expect("prologue should adjust sp");
    let rest = &asm[pos + "addi sp, sp, -".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().expect("frame size should be a number")
}

#[test]
fn emits_text_section_and_label() {
    let asm = compile_asm("int main() { return 1 + 2 * 3; }");
    assert!(asm.contains("  .text"));
    assert!(asm.contains("  .globl main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("main_entry_main:"));
    assert!(asm.contains("  mul t0, t0, t1"));
    assert!(asm.contains("  add t0, t0, t1"));
    assert!(asm.contains("  ret"));
}

#[test]
fn frame_is_16_byte_aligned() {
    let asm = compile_asm("int main() { int a = 1; int b = 2; return a + b; }");
    let frame = first_frame_size(&asm);
    assert!(frame > 0);
    assert_eq!(frame % 16, 0);
}

#[test]
fn leaf_without_values_needs_no_frame() {
    let asm = compile_asm("void f() { } int main() { return 0; }");
    // f 没有任何产生值的指令也不调用别人, 栈帧为空
    let f_pos = asm.find("f:").expect("f label");
    let main_pos = asm.find("main:").expect("main label");
    let f_body = &asm[f_pos..main_pos];
    assert!(!f_body.contains("addi sp"));
    assert!(f_body.contains("  ret"));
}

#[test]
fn recursive_function_saves_ra() {
    let asm = compile_asm(
        "int f(int x) { if (x <= 0) return 0; return x + f(x - 1); } \
         int main() { return f(5); }",
    );
    assert!(asm.contains("  sw ra,"));
    assert!(asm.contains("  lw ra,"));
    assert!(asm.contains("  call f"));
    let frame = first_frame_size(&asm);
    assert!(frame > 0);
    assert_eq!(frame % 16, 0);
}

#[test]
fn globals_render_as_data_words() {
    let asm = compile_asm(
        "const int N = 4; int a[N] = {1, 2, 3}; int main() { return a[2]; }",
    );
    assert!(asm.contains("  .data"));
    assert!(asm.contains("  .global a"));
    assert!(asm.contains("a:"));
    assert!(asm.contains("  .word 1"));
    assert!(asm.contains("  .word 2"));
    assert!(asm.contains("  .word 3"));
    assert!(asm.contains("  .word 0"));
}

#[test]
fn uninitialized_global_renders_as_zero_block() {
    let asm = compile_asm("int g[8]; int main() { return g[0]; }");
    assert!(asm.contains("  .zero 32"));
}

#[test]
fn global_scalar_access_uses_la() {
    let asm = compile_asm("int g = 5; int main() { g = g + 1; return g; }");
    assert!(asm.contains("  la t0, g"));
    assert!(asm.contains("  lw t0, 0(t0)"));
}

#[test]
fn comparisons_use_pseudo_instructions() {
    let asm = compile_asm(
        "int main() { int a = 2; int b = 1; \
         if (a > b) return 1; if (a <= b) return 2; \
         if (a == b) return 3; if (a != b) return 4; return 0; }",
    );
    assert!(asm.contains("  sgt t0, t0, t1"));
    assert!(asm.contains("  seqz t0, t0"));
    assert!(asm.contains("  xor t0, t0, t1"));
    assert!(asm.contains("  snez t0, t0"));
}

#[test]
fn branch_lowers_to_bnez_and_j() {
    let asm = compile_asm("int main() { int x = 1; if (x) return 2; return 3; }");
    assert!(asm.contains("  bnez t0, main_then_0"));
    assert!(asm.contains("  j main_end_0"));
}

#[test]
fn while_loop_jumps_back_to_entry() {
    let asm = compile_asm(
        "int main() { int i = 0; while (i < 10) { i = i + 1; } return i; }",
    );
    assert!(asm.contains("main_while_entry_0:"));
    assert!(asm.contains("main_while_body_0:"));
    assert!(asm.contains("main_while_end_0:"));
    assert!(asm.contains("  j main_while_entry_0"));
}

#[test]
fn call_marshals_register_arguments() {
    let asm = compile_asm(
        "int add(int a, int b) { return a + b; } int main() { return add(3, 4); }",
    );
    assert!(asm.contains("  li a0, 3"));
    assert!(asm.contains("  li a1, 4"));
    assert!(asm.contains("  call add"));
    // 被调方把入参寄存器落到自己的栈槽
    assert!(asm.contains("  sw a0,"));
    assert!(asm.contains("  sw a1,"));
}

#[test]
fn ninth_argument_goes_through_the_stack() {
    let asm = compile_asm(
        "int f(int a, int b, int c, int d, int e, int g, int h, int i, int j) { return j; } \
         int main() { return f(1, 2, 3, 4, 5, 6, 7, 8, 9); }",
    );
    // 调用方把第 9 个实参放在自己栈帧的最底部
    assert!(asm.contains("  li a7, 8"));
    assert!(asm.contains("  sw t0, 0(sp)"));
    assert!(asm.contains("  call f"));
}

#[test]
fn wide_frame_uses_t2_expansion() {
    let asm = compile_asm("int main() { int a[1000]; a[0] = 1; return a[0]; }");
    let frame = first_frame_size_via_li(&asm);
    assert!(frame >= 4000);
    assert_eq!(frame % 16, 0);
    assert!(asm.contains("  add sp, sp, t2"));
}

/// 大栈帧经由 li t2 / add 展开, 从 li 里取帧大小
fn first_frame_size_via_li(asm: &str) -> i32 {
    let pos = asm.find("li t2, -").expect("wide prologue should use li t2");
    let rest = &asm[pos + "li t2, -".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().expect("frame size should be a number")
}

#[test]
fn array_indexing_multiplies_by_stride() {
    let asm = compile_asm(
        "int main() { int a[2][3] = {}; return a[1][2]; }",
    );
    // 第一维步长 12 字节, 第二维 4 字节
    assert!(asm.contains("  li t2, 12"));
    assert!(asm.contains("  li t2, 4"));
    assert!(asm.contains("  mul t1, t1, t2"));
    assert!(asm.contains("  add t0, t0, t1"));
}

#[test]
fn library_calls_use_plain_names() {
    let asm = compile_asm("int main() { putint(42); return 0; }");
    assert!(asm.contains("  li a0, 42"));
    assert!(asm.contains("  call putint"));
}

#[test]
fn library_declarations_emit_no_code() {
    let asm = compile_asm("int main() { return 0; }");
    assert!(!asm.contains("getint:"));
    assert!(!asm.contains("putch:"));
}
