use serde::{Deserialize, Serialize};

// Helper function for serde to skip false values
fn is_false(b: &bool) -> bool {
    !b
}

/// Function argument - can be positional or named
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Positional(Expr),
    Named { name: String, value: Expr },
}

impl Argument {
    /// The argument's value expression, regardless of positional/named form
    pub fn value(&self) -> &Expr {
        match self {
            Argument::Positional(expr) => expr,
            Argument::Named { value, .. } => value,
        }
    }
}

// AST nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Variable(String),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        type_args: Vec<String>, // Type arguments like <int>, <float>
        args: Vec<Argument>,
    },
    /// Historical access: expr[offset], addressing `offset` bars back
    HistoryAccess {
        expr: Box<Expr>,
        offset: Box<Expr>,
    },
    MemberAccess {
        object: Box<Expr>,
        member: String,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Array(Vec<Expr>),
    /// Switch expression. A missing scrutinee makes it a condition ladder.
    Switch {
        scrutinee: Option<Box<Expr>>,
        cases: Vec<SwitchCase>,
        default: Option<Box<Expr>>,
    },
}

impl Expr {
    /// The dotted path of a call target (`ta.sma` -> "ta.sma"), if the
    /// expression is a plain identifier or a chain of member accesses on one.
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Variable(name) => Some(name.clone()),
            Expr::MemberAccess { object, member } => {
                object.dotted_name().map(|base| format!("{}.{}", base, member))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub pattern: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Na,               // PineScript's N/A value
    HexColor(String), // Hex color: #RRGGBB or #RRGGBBAA
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    And,
    Or,
}

impl BinOp {
    /// True for operators whose operands may be swapped without changing
    /// the result (used to place a series on the receiver side).
    pub fn is_commutative(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Mul | BinOp::Eq | BinOp::NotEq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// Declaration keyword used for a variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeclKind {
    /// Bare `name = expr`
    Bare,
    /// `var name = expr`
    Var,
    /// `varip name = expr`
    Varip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    VarDecl {
        name: String,
        type_annotation: Option<String>,
        initializer: Option<Expr>,
        kind: DeclKind,
    },
    /// Reassignment with `:=`. The target can be a variable or member access.
    Assignment {
        target: Expr,
        value: Expr,
    },
    TupleAssignment {
        names: Vec<String>,
        value: Expr,
    },
    Expression(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_if_branches: Vec<(Expr, Vec<Stmt>)>,
        else_branch: Option<Vec<Stmt>>,
    },
    For {
        var_name: String,
        from: Expr,
        to: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForIn {
        // For single item: for item in collection
        // For tuple: for [index, item] in collection
        index_var: Option<String>,
        item_var: String,
        collection: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    TypeDecl {
        name: String,
        fields: Vec<TypeField>,
        #[serde(default, skip_serializing_if = "is_false")]
        exported: bool,
    },
    MethodDecl {
        name: String,
        /// The type the method is bound to, taken from the `Type this`
        /// first parameter.
        bound_type: String,
        params: Vec<MethodParam>,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_false")]
        exported: bool,
    },
    FunctionDecl {
        name: String,
        params: Vec<FunctionParam>,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_false")]
        exported: bool,
    },
    Import(ImportInfo),
}

/// A `import Publisher/Name/Version [as alias]` directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub publisher: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ImportInfo {
    /// Cache key: `publisher/name/version`
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.publisher, self.name, self.version)
    }

    /// Emitted module name: `publisher_name_vversion`
    pub fn module_name(&self) -> String {
        format!("{}_{}_v{}", self.publisher, self.name, self.version)
    }

    /// Relative source path: `publisher/name-vversion.pine`
    pub fn file_name(&self) -> String {
        format!("{}/{}-v{}.pine", self.publisher, self.name, self.version)
    }

    /// The name the importing unit refers to the library by
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A parameter in a user function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Expr>,
}

/// A parameter in a method declaration (excluding the implicit `this`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodParam {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Expr>,
}

/// A field in a user-defined type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeField {
    pub name: String,
    pub type_annotation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Expr>,
}

/// A program is a collection of statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    /// All import directives, in source order
    pub fn imports(&self) -> Vec<&ImportInfo> {
        self.statements
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Import(info) => Some(info),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_name() {
        let expr = Expr::MemberAccess {
            object: Box::new(Expr::Variable("ta".to_string())),
            member: "sma".to_string(),
        };
        assert_eq!(expr.dotted_name(), Some("ta.sma".to_string()));

        let nested = Expr::MemberAccess {
            object: Box::new(expr),
            member: "x".to_string(),
        };
        assert_eq!(nested.dotted_name(), Some("ta.sma.x".to_string()));

        let call = Expr::Call {
            callee: Box::new(Expr::Variable("f".to_string())),
            type_args: vec![],
            args: vec![],
        };
        assert_eq!(call.dotted_name(), None);
    }

    #[test]
    fn test_import_info_naming() {
        let info = ImportInfo {
            publisher: "acme".to_string(),
            name: "MathLib".to_string(),
            version: "2".to_string(),
            alias: Some("m".to_string()),
        };
        assert_eq!(info.key(), "acme/MathLib/2");
        assert_eq!(info.module_name(), "acme_MathLib_v2");
        assert_eq!(info.file_name(), "acme/MathLib-v2.pine");
        assert_eq!(info.local_name(), "m");

        let no_alias = ImportInfo {
            alias: None,
            ..info
        };
        assert_eq!(no_alias.local_name(), "MathLib");
    }
}
