use super::{Block, DataType, Decl, Expr, Span};

// FuncFParam ::= "int" IDENT ["[" "]" {"[" ConstExp "]"}];
// is_array 为真时首维已退化为指针, dims 只含其余的固定维度
#[derive(Debug, Clone, PartialEq)]
pub struct FuncFParam {
    pub ty: DataType,
    pub name: String,
    pub is_array: bool,
    pub dims: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub ty: DataType,
    pub name: String,
    pub params: Vec<FuncFParam>,
    pub body: Block,
    pub span: Span,
}

// CompUnit ::= {Decl | FuncDef};
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalItem {
    Decl(Decl),
    FuncDef(FuncDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompUnit {
    pub items: Vec<GlobalItem>,
}
