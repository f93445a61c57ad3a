//! Owned, mutable syntax tree for Python stub files.
//!
//! The tree models exactly the statement and expression subset the rewrite
//! passes inspect or synthesize. Anything outside that subset is carried as a
//! verbatim source slice and re-emitted untouched, so a stub containing
//! constructs we never rewrite still survives a parse/unparse cycle intact.

/// A parsed stub module: the ordered top-level statement list of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// A statement in a module, class or function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Class(ClassDef),
    Function(FunctionDef),
    /// `target = value` with a plain-name target.
    Assign { target: String, value: Expr },
    /// `target: annotation` or `target: annotation = value`.
    AnnAssign {
        target: String,
        annotation: Expr,
        value: Option<Expr>,
    },
    /// An expression statement; a `Str` here is a docstring position.
    Expr(Expr),
    Pass,
    /// An unlowered source slice, re-emitted as-is.
    Verbatim(Verbatim),
}

/// A raw source slice together with the column it started at, so it can be
/// re-indented when emitted at a different nesting depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Verbatim {
    pub text: String,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// PEP 695 type parameters, as written (`class Foo[Req, Resp]`).
    pub type_params: Vec<String>,
    pub bases: Vec<Expr>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    pub decorators: Vec<Expr>,
    pub params: Vec<Param>,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// The function's docstring, when its body opens with a string statement.
    pub fn docstring(&self) -> Option<&str> {
        match self.body.first() {
            Some(Stmt::Expr(Expr::Str(value))) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

impl Param {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Plain,
            annotation: None,
            default: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Plain,
    /// `*args`
    VarArg,
    /// `**kwargs`
    KwArg,
    /// The bare `*` keyword-only separator.
    StarSep,
    /// The bare `/` positional-only separator.
    SlashSep,
}

/// An expression, as found in annotations, bases, defaults and assignments.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, slice: Box<Expr> },
    Tuple(Vec<Expr>),
    /// A PEP 604 union: `left | right`.
    BinOr { left: Box<Expr>, right: Box<Expr> },
    Str(String),
    NoneLit,
    Ellipsis,
    /// An unlowered source slice (calls, literals, slices, ...).
    Verbatim(String),
}

impl Expr {
    pub fn name(id: impl Into<String>) -> Self {
        Self::Name(id.into())
    }

    /// Builds `value.attr`.
    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Self::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    /// Builds a plain or dotted name from `"A"` or `"A.B.C"`.
    pub fn dotted(path: &str) -> Self {
        let mut parts = path.split('.');
        let mut expr = Self::name(parts.next().unwrap_or_default());
        for part in parts {
            expr = Self::attribute(expr, part);
        }
        expr
    }

    /// The last name component: `Foo` for `Foo`, `Bar` for `mod.Bar`.
    pub fn trailing_name(&self) -> Option<&str> {
        match self {
            Self::Name(id) => Some(id),
            Self::Attribute { attr, .. } => Some(attr),
            _ => None,
        }
    }

    /// The full dotted name of a (possibly subscripted) name reference:
    /// `a.b.C` for `a.b.C[T]`. `None` for anything that is not a name chain.
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Self::Name(id) => Some(id.clone()),
            Self::Attribute { value, attr } => {
                value.dotted_name().map(|base| format!("{base}.{attr}"))
            }
            Self::Subscript { value, .. } => value.dotted_name(),
            _ => None,
        }
    }
}
