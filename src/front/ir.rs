pub mod context;
pub mod expr_ir;
pub mod stmt_ir;

use koopa::ir::builder_traits::*;
use koopa::ir::{FunctionData, Type, TypeKind, Value};
use crate::front::ast::*;
use crate::front::ir::expr_ir::*;
use crate::front::ir::stmt_ir::*;
use crate::CompilerError;
pub use crate::front::ir::context::{IrContext, Symbol};

pub trait GenerateIR {
    type Output;
    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError>;
}

impl GenerateIR for CompUnit {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        // 预先声明 SysY 运行时库函数
        declare_library_functions(ctx)?;

        // 按源码顺序处理; 函数符号在其定义处登记, 不做前向提升
        for item in &self.items {
            match item {
                GlobalItem::Decl(decl) => decl.generate_ir(ctx)?,
                GlobalItem::FuncDef(func) => func.generate_ir(ctx)?,
            }
        }
        Ok(())
    }
}

/// 声明 SysY 库函数并登记符号, 生成时输出为 decl
fn declare_library_functions(ctx: &mut IrContext) -> Result<(), CompilerError> {
    let i32_ty = Type::get_i32;
    let unit_ty = Type::get_unit;
    let ptr_i32 = || Type::get_pointer(Type::get_i32());

    let decls: Vec<(&str, Vec<Type>, Type)> = vec![
        ("getint", vec![], i32_ty()),
        ("getch", vec![], i32_ty()),
        ("getarray", vec![ptr_i32()], i32_ty()),
        ("putint", vec![i32_ty()], unit_ty()),
        ("putch", vec![i32_ty()], unit_ty()),
        ("putarray", vec![i32_ty(), ptr_i32()], unit_ty()),
        ("starttime", vec![], unit_ty()),
        ("stoptime", vec![], unit_ty()),
    ];

    for (name, param_tys, ret_ty) in decls {
        // 不挂基本块, 使 entry_bb() 为 None, 即函数声明
        let func_data = FunctionData::new(format!("@{}", name), param_tys, ret_ty);
        let f = ctx.program.new_func(func_data);
        ctx.func_table.insert(name.to_string(), f);
    }
    Ok(())
}

/// 形参类型: 标量为 i32; 数组形参首维退化, 剩余维度自右向左折叠后套一层指针
fn build_param_type(param: &FuncFParam, ctx: &IrContext) -> Result<Type, CompilerError> {
    if !param.is_array {
        return Ok(Type::get_i32());
    }
    let dims = eval_array_dims(&param.dims, ctx)?;
    Ok(Type::get_pointer(build_array_type(&dims)))
}

fn eval_array_dims(dims: &[Expr], ctx: &IrContext) -> Result<Vec<usize>, CompilerError> {
    let mut result = Vec::with_capacity(dims.len());
    for dim in dims {
        let len = evaluate_const_expr(dim, ctx)?;
        if len < 0 {
            return Err(ctx.error_at_span(
                format!("Array dimension must be non-negative, got {}", len),
                dim.span(),
            ));
        }
        result.push(len as usize);
    }
    Ok(result)
}

fn build_array_type(dims: &[usize]) -> Type {
    let mut ty = Type::get_i32();
    for &dim in dims.iter().rev() {
        ty = Type::get_array(ty, dim);
    }
    ty
}

impl GenerateIR for FuncDef {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        // 查重要在向 Program 登记函数之前做
        if ctx.func_table.contains_key(&self.name) || ctx.global_scope.contains_key(&self.name) {
            return Err(ctx.error_at_span(
                format!("Redefinition of function `{}`", self.name),
                self.span,
            ));
        }
        ctx.reset_for_function();

        let mut param_tys = Vec::with_capacity(self.params.len());
        let mut named_params = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let ty = build_param_type(param, ctx)?;
            named_params.push((Some(format!("@{}", param.name)), ty.clone()));
            param_tys.push(ty);
        }
        let ret_ty = match self.ty {
            DataType::Int => Type::get_i32(),
            DataType::Void => Type::get_unit(),
        };

        let func_data = FunctionData::with_param_names(format!("@{}", self.name), named_params, ret_ty);
        let f = ctx.program.new_func(func_data);
        // 在进入函数体之前登记符号, 递归调用依赖这一点
        ctx.func_table.insert(self.name.clone(), f);
        ctx.current_func = Some(f);

        let entry_bb = ctx.new_bb(format!("%entry_{}", self.name))?;
        ctx.enter_bb(entry_bb)?;
        ctx.entry_bb = Some(entry_bb);

        // 形参与函数体顶层局部变量共用同一层作用域
        ctx.push_scope();

        let param_values: Vec<Value> = ctx.program.func(f).params().to_vec();
        for (idx, param) in self.params.iter().enumerate() {
            // 每个形参落栈: alloc 一个槽位并把传入值存进去
            let slot = ctx.dfg_mut()?.new_value().alloc(param_tys[idx].clone());
            let slot_name = ctx.new_var(&param.name);
            ctx.dfg_mut()?.set_value_name(slot, Some(slot_name));
            ctx.push_inst(slot)?;
            let store = ctx.dfg_mut()?.new_value().store(param_values[idx], slot);
            ctx.push_inst(store)?;
            ctx.define(param.name.clone(), Symbol::Var { value: slot, is_const: false })?;
        }

        for item in &self.body {
            if ctx.is_block_closed()? {
                break;
            }
            match item {
                BlockItem::Decl(decl) => decl.generate_ir(ctx)?,
                BlockItem::Stmt(stmt) => stmt.generate_ir(ctx)?,
            }
        }

        // 控制流落到函数末尾: 按返回类型补默认 ret
        if !ctx.is_block_closed()? {
            let ret = match self.ty {
                DataType::Int => {
                    let zero = ctx.dfg_mut()?.new_value().integer(0);
                    ctx.dfg_mut()?.new_value().ret(Some(zero))
                }
                DataType::Void => ctx.dfg_mut()?.new_value().ret(None),
            };
            ctx.push_inst(ret)?;
        }

        ctx.pop_scope()?;
        ctx.current_func = None;
        ctx.current_bb = None;
        ctx.entry_bb = None;
        Ok(())
    }
}

impl GenerateIR for Decl {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        match self {
            Decl::ConstDecl(decl) => decl.generate_ir(ctx),
            Decl::VarDecl(decl) => decl.generate_ir(ctx),
        }
    }
}

impl GenerateIR for ConstDecl {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        let is_global = ctx.current_func.is_none();
        for def in &self.defs {
            if !def.dims.is_empty() {
                let dims = eval_array_dims(&def.dims, ctx)?;
                let array_type = build_array_type(&dims);
                let elems = match &def.init {
                    ConstInitVal::List(elems) => elems,
                    ConstInitVal::Single(_) => {
                        return Err(ctx.error_at_span(
                            format!("Const array `{}` must be initialized with a list", def.name),
                            def.span,
                        ))
                    }
                };
                let vals = flatten_const_init(elems, &array_type, ctx)?;

                if is_global {
                    let mut pos = 0;
                    let init = build_global_aggregate(&vals, &array_type, &mut pos, ctx)?;
                    let alloc = ctx.program.new_value().global_alloc(init);
                    ctx.program.set_value_name(alloc, Some(format!("@{}", def.name)));
                    ctx.global_values.insert(alloc);
                    ctx.define_global(def.name.clone(), Symbol::Var { value: alloc, is_const: true })?;
                } else {
                    let alloc = create_local_array_alloc(&def.name, array_type.clone(), ctx)?;
                    let mut int_vals = Vec::with_capacity(vals.len());
                    for &v in &vals {
                        int_vals.push(ctx.dfg_mut()?.new_value().integer(v));
                    }
                    let mut pos = 0;
                    store_local_array(alloc, &array_type, &int_vals, &mut pos, ctx)?;
                    ctx.define(def.name.clone(), Symbol::Var { value: alloc, is_const: true })?;
                }
            } else {
                // 标量常量只进符号表, 不生成任何 IR
                let expr = match &def.init {
                    ConstInitVal::Single(expr) => expr,
                    ConstInitVal::List(_) => {
                        return Err(ctx.error_at_span(
                            format!("Scalar const `{}` cannot be initialized with a list", def.name),
                            def.span,
                        ))
                    }
                };
                let val = evaluate_const_expr(expr, ctx)?;
                if is_global {
                    ctx.define_global(def.name.clone(), Symbol::Const(val))?;
                } else {
                    ctx.define(def.name.clone(), Symbol::Const(val))?;
                }
            }
        }
        Ok(())
    }
}

impl GenerateIR for VarDecl {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        let is_global = ctx.current_func.is_none();
        for def in &self.defs {
            if !def.dims.is_empty() {
                let dims = eval_array_dims(&def.dims, ctx)?;
                let array_type = build_array_type(&dims);

                if is_global {
                    let init = match &def.init {
                        None => ctx.program.new_value().zero_init(array_type.clone()),
                        Some(InitVal::List(elems)) => {
                            // 全局初始化必须是常量表达式
                            let slots = flatten_init(elems, &array_type)?;
                            let mut vals = Vec::with_capacity(slots.len());
                            for slot in &slots {
                                vals.push(match slot {
                                    Some(expr) => evaluate_const_expr(expr, ctx)?,
                                    None => 0,
                                });
                            }
                            let mut pos = 0;
                            build_global_aggregate(&vals, &array_type, &mut pos, ctx)?
                        }
                        Some(InitVal::Single(_)) => {
                            return Err(ctx.error_at_span(
                                format!("Global array `{}` must be initialized with a list", def.name),
                                def.span,
                            ))
                        }
                    };
                    let alloc = ctx.program.new_value().global_alloc(init);
                    ctx.program.set_value_name(alloc, Some(format!("@{}", def.name)));
                    ctx.global_values.insert(alloc);
                    ctx.define_global(def.name.clone(), Symbol::Var { value: alloc, is_const: false })?;
                } else {
                    let alloc = create_local_array_alloc(&def.name, array_type.clone(), ctx)?;
                    match &def.init {
                        Some(InitVal::List(elems)) => {
                            let slots = flatten_init(elems, &array_type)?;
                            let mut vals = Vec::with_capacity(slots.len());
                            for slot in slots {
                                vals.push(match slot {
                                    Some(expr) => expr.generate_ir(ctx)?,
                                    None => ctx.dfg_mut()?.new_value().integer(0),
                                });
                            }
                            let mut pos = 0;
                            store_local_array(alloc, &array_type, &vals, &mut pos, ctx)?;
                        }
                        Some(InitVal::Single(_)) => {
                            return Err(ctx.error_at_span(
                                format!("Local array `{}` must be initialized with a list", def.name),
                                def.span,
                            ))
                        }
                        // 无初始化的局部数组内容未定义
                        None => {}
                    }
                    ctx.define(def.name.clone(), Symbol::Var { value: alloc, is_const: false })?;
                }
            } else if is_global {
                let init = match &def.init {
                    Some(InitVal::Single(expr)) => {
                        let val = evaluate_const_expr(expr, ctx)?;
                        ctx.program.new_value().integer(val)
                    }
                    Some(InitVal::List(_)) => {
                        return Err(ctx.error_at_span(
                            format!("Scalar `{}` cannot be initialized with a list", def.name),
                            def.span,
                        ))
                    }
                    // 未初始化的全局变量按零初始化
                    None => ctx.program.new_value().zero_init(Type::get_i32()),
                };
                let alloc = ctx.program.new_value().global_alloc(init);
                ctx.program.set_value_name(alloc, Some(format!("@{}", def.name)));
                ctx.global_values.insert(alloc);
                ctx.define_global(def.name.clone(), Symbol::Var { value: alloc, is_const: false })?;
            } else {
                let alloc = ctx.dfg_mut()?.new_value().alloc(Type::get_i32());
                let ir_name = ctx.new_var(&def.name);
                ctx.dfg_mut()?.set_value_name(alloc, Some(ir_name));
                ctx.push_inst(alloc)?;
                // 符号先于初始化表达式生效
                ctx.define(def.name.clone(), Symbol::Var { value: alloc, is_const: false })?;
                match &def.init {
                    Some(InitVal::Single(expr)) => {
                        let init_val = expr.generate_ir(ctx)?;
                        let store = ctx.dfg_mut()?.new_value().store(init_val, alloc);
                        ctx.push_inst(store)?;
                    }
                    Some(InitVal::List(_)) => {
                        return Err(ctx.error_at_span(
                            format!("Scalar `{}` cannot be initialized with a list", def.name),
                            def.span,
                        ))
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }
}

fn create_local_array_alloc(
    name: &str,
    array_type: Type,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    let alloc = ctx.dfg_mut()?.new_value().alloc(array_type);
    let ir_name = ctx.new_var(name);
    ctx.dfg_mut()?.set_value_name(alloc, Some(ir_name));
    ctx.push_inst(alloc)?;
    Ok(alloc)
}

/// 把 const 初始化列表按流动/对齐两种模式摊平为行优先的整数序列
///
/// 标量沿存储顺序流动填充; 花括号子列表对齐到紧邻的子数组起点, 只负责填满
/// 该子数组且不得超出。不足处补零, 顶层有剩余则报错。
fn flatten_const_init(
    list: &[ConstInitVal],
    ty: &Type,
    ctx: &IrContext,
) -> Result<Vec<i32>, CompilerError> {
    let mut idx = 0;
    let vals = fill_const_slots(ty, list, &mut idx, ctx)?;
    if idx < list.len() {
        return Err(CompilerError::semantic(
            "Excess elements in initializer list".to_string(),
        ));
    }
    Ok(vals)
}

fn fill_const_slots(
    ty: &Type,
    list: &[ConstInitVal],
    idx: &mut usize,
    ctx: &IrContext,
) -> Result<Vec<i32>, CompilerError> {
    match ty.kind() {
        TypeKind::Array(base, len) => {
            let mut result = Vec::new();
            for _ in 0..*len {
                if *idx >= list.len() {
                    // 列表耗尽, 剩余槽位整段补零
                    let mut dummy = 0;
                    result.extend(fill_const_slots(base, &[], &mut dummy, ctx)?);
                    continue;
                }
                match &list[*idx] {
                    ConstInitVal::Single(_) => {
                        result.extend(fill_const_slots(base, list, idx, ctx)?);
                    }
                    ConstInitVal::List(sub) => {
                        let mut sub_idx = 0;
                        let sub_vals = fill_const_slots(base, sub, &mut sub_idx, ctx)?;
                        if sub_idx < sub.len() {
                            return Err(CompilerError::semantic(
                                "Excess elements in array initializer".to_string(),
                            ));
                        }
                        *idx += 1;
                        result.extend(sub_vals);
                    }
                }
            }
            Ok(result)
        }
        _ => {
            if *idx >= list.len() {
                return Ok(vec![0]);
            }
            match &list[*idx] {
                ConstInitVal::Single(expr) => {
                    let val = evaluate_const_expr(expr, ctx)?;
                    *idx += 1;
                    Ok(vec![val])
                }
                ConstInitVal::List(_) => Err(CompilerError::semantic(
                    "Expected scalar initializer, found brace list".to_string(),
                )),
            }
        }
    }
}

/// 同 flatten_const_init, 但只做结构摊平, 元素表达式留给调用方处理
fn flatten_init(list: &[InitVal], ty: &Type) -> Result<Vec<Option<Expr>>, CompilerError> {
    let mut idx = 0;
    let slots = fill_init_slots(ty, list, &mut idx)?;
    if idx < list.len() {
        return Err(CompilerError::semantic(
            "Excess elements in initializer list".to_string(),
        ));
    }
    Ok(slots)
}

fn fill_init_slots(
    ty: &Type,
    list: &[InitVal],
    idx: &mut usize,
) -> Result<Vec<Option<Expr>>, CompilerError> {
    match ty.kind() {
        TypeKind::Array(base, len) => {
            let mut result = Vec::new();
            for _ in 0..*len {
                if *idx >= list.len() {
                    let mut dummy = 0;
                    result.extend(fill_init_slots(base, &[], &mut dummy)?);
                    continue;
                }
                match &list[*idx] {
                    InitVal::Single(_) => {
                        result.extend(fill_init_slots(base, list, idx)?);
                    }
                    InitVal::List(sub) => {
                        let mut sub_idx = 0;
                        let sub_slots = fill_init_slots(base, sub, &mut sub_idx)?;
                        if sub_idx < sub.len() {
                            return Err(CompilerError::semantic(
                                "Excess elements in array initializer".to_string(),
                            ));
                        }
                        *idx += 1;
                        result.extend(sub_slots);
                    }
                }
            }
            Ok(result)
        }
        _ => {
            if *idx >= list.len() {
                return Ok(vec![None]);
            }
            match &list[*idx] {
                InitVal::Single(expr) => {
                    let slot = Some(expr.clone());
                    *idx += 1;
                    Ok(vec![slot])
                }
                InitVal::List(_) => Err(CompilerError::semantic(
                    "Expected scalar initializer, found brace list".to_string(),
                )),
            }
        }
    }
}

/// 由摊平后的整数序列按数组形状重建嵌套 aggregate
fn build_global_aggregate(
    vals: &[i32],
    ty: &Type,
    pos: &mut usize,
    ctx: &mut IrContext,
) -> Result<Value, CompilerError> {
    match ty.kind() {
        TypeKind::Array(base, len) => {
            let base = base.clone();
            let len = *len;
            let mut elems = Vec::with_capacity(len);
            for _ in 0..len {
                elems.push(build_global_aggregate(vals, &base, pos, ctx)?);
            }
            Ok(ctx.program.new_value().aggregate(elems))
        }
        _ => {
            let val = vals.get(*pos).copied().ok_or_else(|| {
                CompilerError::Internal("Flattened initializer is too short".to_string())
            })?;
            *pos += 1;
            Ok(ctx.program.new_value().integer(val))
        }
    }
}

/// 沿数组形状递归下钻, 为每个标量槽位生成 getelemptr 链和 store
fn store_local_array(
    ptr: Value,
    ty: &Type,
    vals: &[Value],
    pos: &mut usize,
    ctx: &mut IrContext,
) -> Result<(), CompilerError> {
    match ty.kind() {
        TypeKind::Array(base, len) => {
            let base = base.clone();
            let len = *len;
            for i in 0..len {
                let index = ctx.dfg_mut()?.new_value().integer(i as i32);
                let next_ptr = ctx.dfg_mut()?.new_value().get_elem_ptr(ptr, index);
                ctx.push_inst(next_ptr)?;
                store_local_array(next_ptr, &base, vals, pos, ctx)?;
            }
            Ok(())
        }
        _ => {
            let val = vals.get(*pos).copied().ok_or_else(|| {
                CompilerError::Internal("Flattened initializer is too short".to_string())
            })?;
            *pos += 1;
            let store = ctx.dfg_mut()?.new_value().store(val, ptr);
            ctx.push_inst(store)?;
            Ok(())
        }
    }
}

impl GenerateIR for Stmt {
    type Output = ();

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        match self {
            Stmt::Return(expr) => generate_return_stmt_ir(expr, ctx),
            Stmt::Assign(lval, expr) => generate_assign_stmt_ir(lval, expr, ctx),
            Stmt::Block(block) => generate_block_stmt_ir(block, ctx),
            Stmt::Expr(expr) => generate_expr_stmt_ir(expr, ctx),
            Stmt::If { cond, then_stmt, else_stmt, .. } => {
                generate_if_stmt_ir(cond, then_stmt, else_stmt.as_deref(), ctx)
            }
            Stmt::While { cond, body, .. } => generate_while_stmt_ir(cond, body, ctx),
            Stmt::Break(span) => generate_break_stmt_ir(span, ctx),
            Stmt::Continue(span) => generate_continue_stmt_ir(span, ctx),
        }
    }
}

impl GenerateIR for Expr {
    type Output = Value;

    fn generate_ir(&self, ctx: &mut IrContext) -> Result<Self::Output, CompilerError> {
        match self {
            Expr::IntLiteral(n, _) => Ok(ctx.dfg_mut()?.new_value().integer(*n)),
            Expr::LVal(lval) => generate_lval_ir(lval, ctx),
            Expr::UnaryOp(op, expr, _) => generate_unary_op_ir(op, expr, ctx),
            Expr::BinaryOp(op, lhs, rhs, _) => generate_binary_op_ir(op, lhs, rhs, ctx),
            Expr::RelOp(op, lhs, rhs, _) => generate_rel_op_ir(op, lhs, rhs, ctx),
            Expr::EqOp(op, lhs, rhs, _) => generate_eq_op_ir(op, lhs, rhs, ctx),
            Expr::LAndOp(_, lhs, rhs, _) => generate_land_op_ir(lhs, rhs, ctx),
            Expr::LOrOp(_, lhs, rhs, _) => generate_lor_op_ir(lhs, rhs, ctx),
            Expr::Call(name, args, span) => generate_call_ir(name, args, *span, ctx),
        }
    }
}
