mod lexer;
mod lines;
mod statements;
mod types;

pub use lexer::{tokenize, LexError, Token};
pub use lines::{lines_of, LineStore};
pub use statements::{parse_line, MAX_EXPR_DEPTH, MAX_NESTING};
pub use types::{BinOp, CmpOp, Expr, FunctionDef, Stmt, Target, UnaryOp};
