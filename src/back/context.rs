use koopa::ir::{BasicBlock, Function, Value};
use std::collections::HashMap;
use crate::back::program::AsmProgram;

/// 汇编代码生成上下文
///
/// 本后端采用最朴素的放置策略: 每个有结果的指令独占一个栈槽,
/// 计算时把操作数取到 t0/t1, 结果写回栈, t2 留给宽立即数和步长。
///
/// ## 栈帧布局（低地址 -> 高地址）
///
/// ```text
/// +-------------------+  <- sp + frame_size（调用者栈帧）
/// |   Saved RA        |  （函数内有 call 时占 4 字节）
/// +-------------------+
/// |   局部槽位         |  （alloc 与各指令结果）
/// +-------------------+
/// |   外传参数区       |  （某次调用实参超过 8 个时）
/// +-------------------+  <- sp
/// ```
///
/// frame_size = 局部槽位 + ra + 外传参数区, 向上对齐到 16 字节,
/// 保证任何 call 发生时 sp 都是 16 字节对齐的。
pub struct Context {
    /// 生成的汇编程序
    pub program: AsmProgram,
    /// 当前正在处理的函数
    pub current_func: Option<Function>,
    /// 指令结果 / alloc / 形参 -> 栈偏移（相对 sp）
    pub stack_map: HashMap<Value, i32>,
    /// 全局 alloc -> 汇编符号名
    pub global_map: HashMap<Value, String>,
    /// 基本块 -> 汇编标签
    pub bb_label_map: HashMap<BasicBlock, String>,
    /// 当前函数栈帧总大小
    pub frame_size: i32,
    /// ra 保存空间, 函数内有 call 时为 4
    pub ra_size: i32,
    /// 外传参数区大小 = max(0, 最多实参数 - 8) * 4
    pub arg_area: i32,
}

impl Context {
    pub fn new() -> Self {
        Self {
            program: AsmProgram::new(),
            current_func: None,
            stack_map: HashMap::new(),
            global_map: HashMap::new(),
            bb_label_map: HashMap::new(),
            frame_size: 0,
            ra_size: 0,
            arg_area: 0,
        }
    }

    /// 清空函数内的逐函数状态, 全局映射保留
    pub fn reset_for_function(&mut self) {
        self.stack_map.clear();
        self.bb_label_map.clear();
        self.frame_size = 0;
        self.ra_size = 0;
        self.arg_area = 0;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
