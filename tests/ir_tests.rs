use sysyc::front::{emit_ir_text, generate_ir};
use sysyc::sysy::CompUnitParser;
use sysyc::utils::SourceMap;
use sysyc::CompilerError;

fn compile_ir(source: &str) -> String {
    let ast = CompUnitParser::new()
        .parse(source)
        .expect("parse should succeed");
    let program = generate_ir(&ast, Some(SourceMap::new(source)))
        .expect("IR generation should succeed");
    emit_ir_text(&program).expect("IR emission should succeed")
}

fn compile_ir_err(source: &str) -> CompilerError {
    let ast = CompUnitParser::new()
        .parse(source)
        .expect("parse should succeed");
    match generate_ir(&ast, Some(SourceMap::new(source))) {
        Ok(_) => panic!("expected a semantic error"),
        Err(e) => e,
    }
}

#[test]
fn emits_library_prelude() {
    let ir = compile_ir("int main() { return 0; }");
    assert!(ir.contains("decl @getint(): i32"));
    assert!(ir.contains("decl @getarray(*i32): i32"));
    assert!(ir.contains("decl @putarray(i32, *i32)"));
    assert!(ir.contains("decl @starttime()"));
    assert!(ir.contains("decl @stoptime()"));
}

#[test]
fn lowers_arithmetic_return() {
    let ir = compile_ir("int main() { return 1 + 2 * 3; }");
    assert!(ir.contains("fun @main(): i32"));
    assert!(ir.contains("%entry_main:"));
    assert!(ir.contains("mul 2, 3"));
    assert!(ir.contains("add 1,"));
    assert!(ir.contains("ret"));
}

#[test]
fn scalar_const_is_compile_time_only() {
    let ir = compile_ir("const int N = 4; int main() { return N; }");
    assert!(ir.contains("ret 4"));
    assert!(!ir.contains("global"));
}

#[test]
fn global_var_gets_zeroinit() {
    let ir = compile_ir("int g; int main() { return g; }");
    assert!(ir.contains("global @g = alloc i32, zeroinit"));
    assert!(ir.contains("load @g"));
}

#[test]
fn global_scalar_initializer_is_folded() {
    let ir = compile_ir("int g = 2 + 3 * 4; int main() { return g; }");
    assert!(ir.contains("global @g = alloc i32, 14"));
}

#[test]
fn global_const_array_is_zero_padded() {
    let ir = compile_ir("const int N = 4; const int a[N] = {1, 2, 3}; int main() { return a[2]; }");
    assert!(ir.contains("global @a = alloc [i32, 4], {1, 2, 3, 0}"));
    assert!(ir.contains("getelemptr @a, 2"));
}

#[test]
fn nested_initializer_aligns_to_rows() {
    let ir = compile_ir("int a[2][3] = {{1, 2}, 5}; int main() { return a[1][0]; }");
    // 第一行 {1, 2} 补零到 3 个, 标量 5 从第二行行首继续流动
    assert!(ir.contains("{{1, 2, 0}, {5, 0, 0}}"));
}

#[test]
fn while_loop_uses_three_labels() {
    let ir = compile_ir(
        "int main() { int i = 0; int s = 0; while (i < 10) { s = s + i; i = i + 1; } return s; }",
    );
    assert!(ir.contains("%while_entry_0:"));
    assert!(ir.contains("%while_body_0:"));
    assert!(ir.contains("%while_end_0:"));
    assert!(ir.contains("jump %while_entry_0"));
}

#[test]
fn if_without_else_branches_to_end() {
    let ir = compile_ir("int main() { int x = 1; if (x) return 2; return 3; }");
    assert!(ir.contains("%then_0:"));
    assert!(ir.contains("%end_0:"));
    assert!(!ir.contains("%else_0"));
    assert!(ir.contains("br"));
}

#[test]
fn if_else_gets_both_arms() {
    let ir = compile_ir("int main() { int x = 1; if (x) return 2; else return 3; }");
    assert!(ir.contains("%then_0:"));
    assert!(ir.contains("%else_0:"));
    assert!(ir.contains("%end_0:"));
}

#[test]
fn logical_and_short_circuits() {
    let ir = compile_ir("int main() { int x = 1; if (x == 1 && x / 0 == 0) return 2; return 3; }");
    assert!(ir.contains("@and_res"));
    assert!(ir.contains("%and_true_0:"));
    assert!(ir.contains("%and_false_0:"));
    assert!(ir.contains("%and_end_0:"));
    // 除法只出现在真分支里
    let true_pos = ir.find("%and_true_0:").unwrap();
    let div_pos = ir.find("div").unwrap();
    assert!(div_pos > true_pos);
}

#[test]
fn logical_or_short_circuits() {
    let ir = compile_ir("int main() { int x = 0; return x || 2; }");
    assert!(ir.contains("@or_res"));
    assert!(ir.contains("%or_true_0:"));
    assert!(ir.contains("%or_false_0:"));
    assert!(ir.contains("%or_end_0:"));
    assert!(ir.contains("ne"));
}

#[test]
fn array_argument_decays_to_first_element() {
    let ir = compile_ir(
        "int sum(int n, int a[]) { int s = 0; int i = 0; \
         while (i < n) { s = s + a[i]; i = i + 1; } return s; } \
         int main() { int x[3] = {10, 20, 30}; return sum(3, x); }",
    );
    assert!(ir.contains("fun @sum(@n: i32, @a: *i32): i32"));
    // 形参指针先 load 再 getptr 索引
    assert!(ir.contains("getptr"));
    // 调用点的数组实参退化成首元素指针
    assert!(ir.contains("getelemptr @x_0, 0"));
    assert!(ir.contains("call @sum("));
}

#[test]
fn multi_dim_param_keeps_trailing_shape() {
    let ir = compile_ir(
        "int f(int a[][3]) { return a[1][2]; } \
         int main() { int x[2][3] = {}; return f(x); }",
    );
    assert!(ir.contains("fun @f(@a: *[i32, 3]): i32"));
    assert!(ir.contains("alloc [[i32, 3], 2]"));
    assert!(ir.contains("getptr"));
    assert!(ir.contains("getelemptr"));
}

#[test]
fn void_function_gets_plain_ret() {
    let ir = compile_ir("void f() { } int main() { f(); return 0; }");
    assert!(ir.contains("fun @f()"));
    assert!(ir.contains("call @f()"));
}

#[test]
fn missing_return_synthesizes_zero() {
    let ir = compile_ir("int main() { int x = 1; }");
    assert!(ir.contains("ret 0"));
}

#[test]
fn statements_after_return_are_dropped() {
    let ir = compile_ir("int main() { return 1; return 2; }");
    assert!(ir.contains("ret 1"));
    assert!(!ir.contains("ret 2"));
}

#[test]
fn inner_scope_shadows_outer() {
    let ir = compile_ir("int main() { int x = 1; { int x = 2; x = 3; } return x; }");
    assert!(ir.contains("@x_0"));
    assert!(ir.contains("@x_1"));
    assert!(ir.contains("store 3, @x_1"));
}

#[test]
fn local_array_initializer_pads_with_zero() {
    let ir = compile_ir("int main() { int a[2] = {7}; return a[0]; }");
    assert!(ir.contains("store 7,"));
    assert!(ir.contains("store 0,"));
}

#[test]
fn uninitialized_local_array_stays_undefined() {
    let ir = compile_ir("int main() { int a[4]; return 0; }");
    assert!(ir.contains("alloc [i32, 4]"));
    assert!(!ir.contains("store"));
}

#[test]
fn hex_and_octal_literals_parse() {
    let ir = compile_ir("int main() { return 0x10 + 010; }");
    assert!(ir.contains("add 16, 8"));
}

#[test]
fn rejects_break_outside_loop() {
    let err = compile_ir_err("int main() { break; return 0; }");
    assert!(err.to_string().contains("break"));
}

#[test]
fn rejects_continue_outside_loop() {
    let err = compile_ir_err("int main() { continue; return 0; }");
    assert!(err.to_string().contains("continue"));
}

#[test]
fn rejects_undefined_variable() {
    let err = compile_ir_err("int main() { return y; }");
    assert!(err.to_string().contains("y"));
}

#[test]
fn rejects_assignment_to_const() {
    let err = compile_ir_err("int main() { const int x = 1; x = 2; return x; }");
    assert!(err.to_string().contains("constant"));
}

#[test]
fn rejects_redefinition_in_same_scope() {
    let err = compile_ir_err("int main() { int x = 1; int x = 2; return x; }");
    assert!(err.to_string().contains("Redefinition"));
}

#[test]
fn rejects_parameter_redefined_as_local() {
    // 形参与函数体顶层局部变量共用一层作用域
    let err = compile_ir_err("int f(int x) { int x = 1; return x; } int main() { return f(0); }");
    assert!(err.to_string().contains("Redefinition"));
}

#[test]
fn rejects_division_by_zero_in_const_expr() {
    let err = compile_ir_err("const int x = 1 / 0; int main() { return x; }");
    assert!(err.to_string().contains("zero"));
}

#[test]
fn rejects_non_const_in_const_expr() {
    let err = compile_ir_err("int main() { int n = 3; const int x = n; return x; }");
    assert!(err.to_string().contains("not a constant"));
}

#[test]
fn rejects_initializer_overflow() {
    let err = compile_ir_err("int main() { int a[2] = {1, 2, 3}; return 0; }");
    assert!(err.to_string().contains("Excess"));
}

#[test]
fn rejects_nested_initializer_overflow() {
    let err = compile_ir_err("int a[2][2] = {{1, 2, 3}, {4}}; int main() { return 0; }");
    assert!(err.to_string().contains("Excess"));
}

#[test]
fn rejects_undefined_function_call() {
    let err = compile_ir_err("int main() { return g(); }");
    assert!(err.to_string().contains("g"));
}

#[test]
fn rejects_forward_call() {
    // 函数符号在定义处登记, 不做前向提升
    let err = compile_ir_err("int main() { return f(); } int f() { return 1; }");
    assert!(err.to_string().contains("f"));
}

#[test]
fn rejects_call_in_const_expr() {
    let err = compile_ir_err("int f() { return 1; } const int x = f(); int main() { return x; }");
    assert!(err.to_string().contains("constant"));
}

#[test]
fn rejects_too_many_indices() {
    let err = compile_ir_err("int main() { int x = 1; return x[0]; }");
    assert!(err.to_string().contains("x"));
}

#[test]
fn rejects_duplicate_function_names() {
    let err = compile_ir_err("int f() { return 1; } int f() { return 2; } int main() { return 0; }");
    assert!(err.to_string().contains("Redefinition"));
}

#[test]
fn rejects_function_shadowing_global() {
    let err = compile_ir_err("int f = 1; int f() { return 2; } int main() { return 0; }");
    assert!(err.to_string().contains("Redefinition"));
}
