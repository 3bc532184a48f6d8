use koopa::ir::builder_traits::*;
use koopa::ir::dfg::DataFlowGraph;
use koopa::ir::layout::Layout;
use koopa::ir::{BasicBlock, Function, Program, Type, Value, ValueKind};
use std::collections::{HashMap, HashSet};
use crate::front::ast::Span;
use crate::utils::SourceMap;
use crate::CompilerError;

/// 符号表中的一个条目
#[derive(Debug, Clone, Copy)]
pub enum Symbol {
    /// 编译期整型常量, 不占存储
    Const(i32),
    /// 带存储的变量, 符号绑定到 alloc / global alloc 的地址;
    /// is_const 标记 const 数组的存储, 禁止对其赋值
    Var { value: Value, is_const: bool },
}

pub struct IrContext {
    pub program: Program,
    pub current_func: Option<Function>,
    pub current_bb: Option<BasicBlock>,
    pub entry_bb: Option<BasicBlock>,
    /// 块级作用域栈, 函数进入时压入第一层
    pub scopes: Vec<HashMap<String, Symbol>>,
    /// 全局作用域: 贯穿整个编译单元
    pub global_scope: HashMap<String, Symbol>,
    /// Program 级的 Value（全局变量）, 区别于函数内的值
    pub global_values: HashSet<Value>,
    /// 函数符号表：函数名 -> Function handle
    pub func_table: HashMap<String, Function>,
    /// 循环栈：每层循环的 (continue_target, break_target)
    pub loop_stack: Vec<(BasicBlock, BasicBlock)>,
    pub source_map: Option<SourceMap>,
    // 局部存储命名计数（@x_0, @and_res_1, ...）, 每个函数重新计数
    var_count: u32,
    // 基本块标号计数（%then_0, %while_entry_1, ...）, 每个函数重新计数
    label_count: u32,
}

impl IrContext {
    pub fn new(source_map: Option<SourceMap>) -> Self {
        Self {
            program: Program::new(),
            current_func: None,
            current_bb: None,
            entry_bb: None,
            scopes: Vec::new(),
            global_scope: HashMap::new(),
            global_values: HashSet::new(),
            func_table: HashMap::new(),
            loop_stack: Vec::new(),
            source_map,
            var_count: 0,
            label_count: 0,
        }
    }

    pub fn error_at_span(&self, message: impl Into<String>, span: Span) -> CompilerError {
        match &self.source_map {
            Some(sm) => CompilerError::semantic_at(message, sm.format_location(span.begin)),
            None => CompilerError::semantic(message),
        }
    }

    /// 进入新函数时重置命名计数, 名字只需要在函数内部唯一
    pub fn reset_for_function(&mut self) {
        self.var_count = 0;
        self.label_count = 0;
    }

    /// 生成局部存储名, 如 `@x_0`
    pub fn new_var(&mut self, ident: &str) -> String {
        let name = format!("@{}_{}", ident, self.var_count);
        self.var_count += 1;
        name
    }

    /// 领取一个标号 id, 同一语句的几个基本块共用
    pub fn alloc_label_id(&mut self) -> u32 {
        let id = self.label_count;
        self.label_count += 1;
        id
    }

    pub fn get_current_bb(&self) -> Result<BasicBlock, CompilerError> {
        self.current_bb
            .ok_or_else(|| CompilerError::Internal("No current basic block".to_string()))
    }

    pub fn dfg_mut(&mut self) -> Result<&mut DataFlowGraph, CompilerError> {
        let f = self
            .current_func
            .ok_or_else(|| CompilerError::Internal("No current function".to_string()))?;
        Ok(self.program.func_mut(f).dfg_mut())
    }

    pub fn layout(&mut self) -> Result<&mut Layout, CompilerError> {
        let f = self
            .current_func
            .ok_or_else(|| CompilerError::Internal("No current function".to_string()))?;
        Ok(self.program.func_mut(f).layout_mut())
    }

    /// 创建一个命名基本块, 暂不加入布局
    pub fn new_bb(&mut self, name: String) -> Result<BasicBlock, CompilerError> {
        Ok(self.dfg_mut()?.new_bb().basic_block(Some(name)))
    }

    /// 把基本块追加进布局并设为当前块; 调用前当前块必须已经终结
    pub fn enter_bb(&mut self, bb: BasicBlock) -> Result<(), CompilerError> {
        self.layout()?
            .bbs_mut()
            .push_key_back(bb)
            .map_err(|_| CompilerError::Internal("Failed to add basic block".to_string()))?;
        self.current_bb = Some(bb);
        Ok(())
    }

    pub fn push_inst(&mut self, inst: Value) -> Result<(), CompilerError> {
        let bb = self.get_current_bb()?;
        self.layout()?
            .bb_mut(bb)
            .insts_mut()
            .push_key_back(inst)
            .map_err(|_| CompilerError::Internal("Failed to insert instruction".to_string()))
    }

    /// 当前基本块是否已经以终结指令收尾 (ret / jump / br)
    pub fn is_block_closed(&mut self) -> Result<bool, CompilerError> {
        let bb = self.get_current_bb()?;
        let last_inst = self.layout()?.bb_mut(bb).insts().keys().last().copied();
        if let Some(inst) = last_inst {
            let value_data = self.dfg_mut()?.value(inst);
            Ok(matches!(
                value_data.kind(),
                ValueKind::Return(_) | ValueKind::Jump(_) | ValueKind::Branch(_)
            ))
        } else {
            Ok(false)
        }
    }

    /// Push a new scope onto the stack
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the current scope from the stack
    pub fn pop_scope(&mut self) -> Result<(), CompilerError> {
        self.scopes
            .pop()
            .ok_or_else(|| CompilerError::Internal("Cannot pop scope: no scope on stack".to_string()))?;
        Ok(())
    }

    /// Look up a symbol from the innermost scope outwards, then the globals
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(&sym) = scope.get(name) {
                return Some(sym);
            }
        }
        self.global_scope.get(name).copied()
    }

    /// 在当前（最内层）作用域定义符号, 同层重复定义报错
    pub fn define(&mut self, name: String, sym: Symbol) -> Result<(), CompilerError> {
        let current_scope = self.scopes.last_mut().ok_or_else(|| {
            CompilerError::Internal("Cannot define symbol: no scope on stack".to_string())
        })?;
        if current_scope.contains_key(&name) {
            return Err(CompilerError::semantic(format!(
                "Redefinition of `{}` in this scope",
                name
            )));
        }
        current_scope.insert(name, sym);
        Ok(())
    }

    /// 在全局作用域定义符号; 全局变量与函数共用一个命名空间
    pub fn define_global(&mut self, name: String, sym: Symbol) -> Result<(), CompilerError> {
        if self.global_scope.contains_key(&name) || self.func_table.contains_key(&name) {
            return Err(CompilerError::semantic(format!(
                "Redefinition of global `{}`",
                name
            )));
        }
        self.global_scope.insert(name, sym);
        Ok(())
    }

    /// 取某个 Value 的类型; 全局值从 Program 取, 局部值从当前函数的 dfg 取
    pub fn value_type(&self, value: Value) -> Result<Type, CompilerError> {
        if self.global_values.contains(&value) {
            return Ok(self.program.borrow_value(value).ty().clone());
        }
        let func = self
            .current_func
            .ok_or_else(|| CompilerError::Internal("No current function".to_string()))?;
        Ok(self.program.func(func).dfg().value(value).ty().clone())
    }
}
