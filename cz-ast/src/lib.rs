//! Abstract syntax tree for the CZ language.
//!
//! The tree is immutable once built: every node owns its children and there
//! are no back-edges. Later pipeline stages (declaration collection, type
//! checking) do not mutate nodes in place; they attach annotations in
//! side-tables keyed by `NodeId`, which is assigned to every node as it is
//! built by the parser.

use serde::{Deserialize, Serialize};

/// Stable identity for an AST node, used as the key into annotation
/// side-tables built by later pipeline stages (inferred types, function
/// signatures, generated C names).
pub type NodeId = u32;

/// 1-indexed source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// Root node: a single parsed CZ source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: NodeId,
    pub name: Option<String>,
    pub imports: Vec<Import>,
    pub items: Vec<Item>,
    pub pos: Position,
}

/// `import cz.<path>` — `path` is the dotted segments, e.g. `["cz", "fmt"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub id: NodeId,
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub pos: Position,
}

impl Import {
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub visibility: Visibility,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub default_value: Option<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Struct(StructDecl),
    Interface(InterfaceDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    TypeAlias(TypeAliasDecl),
    AllocatorMacro(AllocatorDecl),
}

impl Item {
    pub fn id(&self) -> NodeId {
        match self {
            Item::Struct(s) => s.id,
            Item::Interface(i) => i.id,
            Item::Enum(e) => e.id,
            Item::Function(f) => f.id,
            Item::TypeAlias(t) => t.id,
            Item::AllocatorMacro(a) => a.id,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Item::Struct(s) => s.pos,
            Item::Interface(i) => i.pos,
            Item::Enum(e) => e.pos,
            Item::Function(f) => f.pos,
            Item::TypeAlias(t) => t.pos,
            Item::AllocatorMacro(a) => a.pos,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Item::Struct(s) => &s.name,
            Item::Interface(i) => &i.name,
            Item::Enum(e) => &e.name,
            Item::Function(f) => &f.name,
            Item::TypeAlias(t) => &t.alias,
            Item::AllocatorMacro(_) => "#alloc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub id: NodeId,
    pub name: String,
    pub fields: Vec<Field>,
    pub implements: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub id: NodeId,
    pub name: String,
    pub fields: Vec<Field>,
    pub methods: Vec<MethodSig>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub id: NodeId,
    pub name: String,
    pub values: Vec<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub name: String,
    pub receiver: Option<Type>,
    pub params: Vec<Param>,
    pub generics: Vec<GenericParam>,
    pub return_type: Type,
    pub body: Block,
    pub inline: bool,
    /// `#unsafe`-only function: body is a single raw C blob, no CZ statements.
    pub unsafe_body: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: String,
    pub concrete_types: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    pub id: NodeId,
    pub alias: String,
    pub target: Type,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorDecl {
    pub id: NodeId,
    pub name: String,
    pub pos: Position,
}

/// The CZ type grammar. `Named` covers both primitives (`i32`, `f32`, ...)
/// and user structs/enums/interfaces/aliases — resolution happens later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Named(String),
    Nullable(Box<Type>),
    Pointer(Box<Type>),
    Array(Box<Type>, ArraySize),
    Slice(Box<Type>),
    Varargs(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Pair(Box<Type>, Box<Type>),
    String,
    Void,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArraySize {
    Literal(usize),
    /// `*` — inferred from the array-literal initializer at the declaration site.
    Inferred,
}

impl Type {
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Nullable(_))
    }

    pub fn inner(&self) -> Option<&Type> {
        match self {
            Type::Pointer(t) | Type::Nullable(t) | Type::Slice(t) | Type::Varargs(t) => Some(t),
            Type::Array(t, _) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: NodeId,
    pub statements: Vec<Stmt>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    VarDecl {
        id: NodeId,
        name: String,
        ty: Type,
        mutable: bool,
        init: Option<Expr>,
        pos: Position,
    },
    Assign {
        id: NodeId,
        target: Expr,
        value: Expr,
        pos: Position,
    },
    CompoundAssign {
        id: NodeId,
        target: Expr,
        op: CompoundOp,
        value: Expr,
        pos: Position,
    },
    If {
        id: NodeId,
        cond: Expr,
        then_block: Block,
        elseif_arms: Vec<(Expr, Block)>,
        else_block: Option<Block>,
        pos: Position,
    },
    While {
        id: NodeId,
        cond: Expr,
        body: Block,
        pos: Position,
    },
    ForIn {
        id: NodeId,
        index: Option<String>,
        item: String,
        mutable: bool,
        collection: Expr,
        body: Block,
        pos: Position,
    },
    RepeatN {
        id: NodeId,
        count: Expr,
        body: Block,
        pos: Position,
    },
    Break {
        id: NodeId,
        level: u32,
        pos: Position,
    },
    Continue {
        id: NodeId,
        level: u32,
        pos: Position,
    },
    Return {
        id: NodeId,
        value: Option<Expr>,
        pos: Position,
    },
    Free {
        id: NodeId,
        target: Expr,
        pos: Position,
    },
    Discard {
        id: NodeId,
        value: Expr,
        pos: Position,
    },
    Expr {
        id: NodeId,
        expr: Expr,
        pos: Position,
    },
    UnsafeBlock {
        id: NodeId,
        raw_c: String,
        pos: Position,
    },
    Assert {
        id: NodeId,
        cond: Expr,
        message: Option<Expr>,
        pos: Position,
    },
    Log {
        id: NodeId,
        args: Vec<Expr>,
        pos: Position,
    },
    Todo {
        id: NodeId,
        message: Option<String>,
        pos: Position,
    },
    Fixme {
        id: NodeId,
        message: Option<String>,
        pos: Position,
    },
    /// `#run { ... }` — executed synchronously at parse time, see module_resolver.
    Run {
        id: NodeId,
        commands: String,
        pos: Position,
    },
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::VarDecl { id, .. }
            | Stmt::Assign { id, .. }
            | Stmt::CompoundAssign { id, .. }
            | Stmt::If { id, .. }
            | Stmt::While { id, .. }
            | Stmt::ForIn { id, .. }
            | Stmt::RepeatN { id, .. }
            | Stmt::Break { id, .. }
            | Stmt::Continue { id, .. }
            | Stmt::Return { id, .. }
            | Stmt::Free { id, .. }
            | Stmt::Discard { id, .. }
            | Stmt::Expr { id, .. }
            | Stmt::UnsafeBlock { id, .. }
            | Stmt::Assert { id, .. }
            | Stmt::Log { id, .. }
            | Stmt::Todo { id, .. }
            | Stmt::Fixme { id, .. }
            | Stmt::Run { id, .. } => *id,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Stmt::VarDecl { pos, .. }
            | Stmt::Assign { pos, .. }
            | Stmt::CompoundAssign { pos, .. }
            | Stmt::If { pos, .. }
            | Stmt::While { pos, .. }
            | Stmt::ForIn { pos, .. }
            | Stmt::RepeatN { pos, .. }
            | Stmt::Break { pos, .. }
            | Stmt::Continue { pos, .. }
            | Stmt::Return { pos, .. }
            | Stmt::Free { pos, .. }
            | Stmt::Discard { pos, .. }
            | Stmt::Expr { pos, .. }
            | Stmt::UnsafeBlock { pos, .. }
            | Stmt::Assert { pos, .. }
            | Stmt::Log { pos, .. }
            | Stmt::Todo { pos, .. }
            | Stmt::Fixme { pos, .. }
            | Stmt::Run { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Ref,
    Deref,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Char(char),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    File,
    Line,
    Function,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal {
        id: NodeId,
        value: Literal,
        pos: Position,
    },
    Identifier {
        id: NodeId,
        name: String,
        pos: Position,
    },
    Field {
        id: NodeId,
        receiver: Box<Expr>,
        name: String,
        pos: Position,
    },
    Index {
        id: NodeId,
        receiver: Box<Expr>,
        index: Box<Expr>,
        pos: Position,
    },
    Slice {
        id: NodeId,
        receiver: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        pos: Position,
    },
    Unary {
        id: NodeId,
        op: UnaryOp,
        operand: Box<Expr>,
        pos: Position,
    },
    Binary {
        id: NodeId,
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: Position,
    },
    Call {
        id: NodeId,
        callee: Box<Expr>,
        args: Vec<Expr>,
        pos: Position,
    },
    /// `mut expr` used at a call site where the callee expects a mutable pointer.
    MutArg {
        id: NodeId,
        inner: Box<Expr>,
        pos: Position,
    },
    StaticMethodCall {
        id: NodeId,
        type_name: String,
        method: String,
        args: Vec<Expr>,
        pos: Position,
    },
    MethodCall {
        id: NodeId,
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        pos: Position,
    },
    StructLiteral {
        id: NodeId,
        type_name: String,
        fields: Vec<(String, Expr)>,
        pos: Position,
    },
    ArrayLiteral {
        id: NodeId,
        elements: Vec<Expr>,
        pos: Position,
    },
    MapLiteral {
        id: NodeId,
        entries: Vec<(Expr, Expr)>,
        pos: Position,
    },
    PairLiteral {
        id: NodeId,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: Position,
    },
    NewHeap {
        id: NodeId,
        type_name: String,
        fields: Vec<(String, Expr)>,
        pos: Position,
    },
    NewArray {
        id: NodeId,
        elements: Vec<Expr>,
        pos: Position,
    },
    NewMap {
        id: NodeId,
        key_type: Type,
        value_type: Type,
        entries: Vec<(Expr, Expr)>,
        pos: Position,
    },
    Cast {
        id: NodeId,
        target: Type,
        value: Box<Expr>,
        pos: Position,
    },
    SafeCast {
        id: NodeId,
        target: Type,
        value: Box<Expr>,
        fallback: Box<Expr>,
        pos: Position,
    },
    Clone {
        id: NodeId,
        type_hint: Option<Type>,
        value: Box<Expr>,
        pos: Position,
    },
    NullCheck {
        id: NodeId,
        value: Box<Expr>,
        pos: Position,
    },
    IsCheck {
        id: NodeId,
        value: Box<Expr>,
        ty: Type,
        pos: Position,
    },
    TypeOf {
        id: NodeId,
        value: Box<Expr>,
        pos: Position,
    },
    SizeOf {
        id: NodeId,
        ty: Type,
        pos: Position,
    },
    DirectiveExpr {
        id: NodeId,
        directive: Directive,
        pos: Position,
    },
    /// Rewritten in by the type checker when an implicit numeric widening applies.
    ImplicitCast {
        id: NodeId,
        target: Type,
        value: Box<Expr>,
        pos: Position,
    },
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Literal { id, .. }
            | Expr::Identifier { id, .. }
            | Expr::Field { id, .. }
            | Expr::Index { id, .. }
            | Expr::Slice { id, .. }
            | Expr::Unary { id, .. }
            | Expr::Binary { id, .. }
            | Expr::Call { id, .. }
            | Expr::MutArg { id, .. }
            | Expr::StaticMethodCall { id, .. }
            | Expr::MethodCall { id, .. }
            | Expr::StructLiteral { id, .. }
            | Expr::ArrayLiteral { id, .. }
            | Expr::MapLiteral { id, .. }
            | Expr::PairLiteral { id, .. }
            | Expr::NewHeap { id, .. }
            | Expr::NewArray { id, .. }
            | Expr::NewMap { id, .. }
            | Expr::Cast { id, .. }
            | Expr::SafeCast { id, .. }
            | Expr::Clone { id, .. }
            | Expr::NullCheck { id, .. }
            | Expr::IsCheck { id, .. }
            | Expr::TypeOf { id, .. }
            | Expr::SizeOf { id, .. }
            | Expr::DirectiveExpr { id, .. }
            | Expr::ImplicitCast { id, .. } => *id,
        }
    }

    pub fn pos(&self) -> Position {
        match self {
            Expr::Literal { pos, .. }
            | Expr::Identifier { pos, .. }
            | Expr::Field { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Slice { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::MutArg { pos, .. }
            | Expr::StaticMethodCall { pos, .. }
            | Expr::MethodCall { pos, .. }
            | Expr::StructLiteral { pos, .. }
            | Expr::ArrayLiteral { pos, .. }
            | Expr::MapLiteral { pos, .. }
            | Expr::PairLiteral { pos, .. }
            | Expr::NewHeap { pos, .. }
            | Expr::NewArray { pos, .. }
            | Expr::NewMap { pos, .. }
            | Expr::Cast { pos, .. }
            | Expr::SafeCast { pos, .. }
            | Expr::Clone { pos, .. }
            | Expr::NullCheck { pos, .. }
            | Expr::IsCheck { pos, .. }
            | Expr::TypeOf { pos, .. }
            | Expr::SizeOf { pos, .. }
            | Expr::DirectiveExpr { pos, .. }
            | Expr::ImplicitCast { pos, .. } => *pos,
        }
    }
}

/// Monotonic `NodeId` generator shared by the parser for a single parse.
#[derive(Debug, Default)]
pub struct NodeIdGen(NodeId);

impl NodeIdGen {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> NodeId {
        self.0 += 1;
        self.0
    }
}
