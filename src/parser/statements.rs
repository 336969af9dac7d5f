use chumsky::prelude::*;

use super::lexer::{tokenize, Token};
use super::types::{BinOp, CmpOp, Expr, FunctionDef, Stmt, Target, UnaryOp};
use crate::fault::{ExecutionFault, FaultKind};

/// Deepest run of open `(` or `[` a line may hold.
pub const MAX_NESTING: usize = 100;

/// Deepest expression tree a line may parse to.
pub const MAX_EXPR_DEPTH: usize = 200;

/// Parse one source line into a statement.
///
/// Blank and comment-only lines parse to [`Stmt::Pass`]. A non-blank line
/// with leading whitespace is rejected: every line executes on its own, so
/// there is no enclosing block for it to belong to.
pub fn parse_line(source: &str) -> Result<Stmt, ExecutionFault> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Ok(Stmt::Pass);
    }
    if source.starts_with(char::is_whitespace) {
        return Err(ExecutionFault::new(
            FaultKind::IndentationError,
            "unexpected indent",
        ));
    }
    check_nesting(&tokens)?;
    if tokens.first() == Some(&Token::Def) && tokens.last() == Some(&Token::Colon) {
        return Err(ExecutionFault::syntax(
            "expected a statement after ':' on the same line",
        ));
    }

    let raw = line_parser()
        .parse(tokens.as_slice())
        .into_result()
        .map_err(|errors| {
            tracing::trace!(?errors, source, "parse failed");
            invalid_syntax()
        })?;
    let stmt = lower(raw, Context::Module)?;
    check_depth(&stmt)?;
    Ok(stmt)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Module,
    FunctionBody,
}

/// A statement as the grammar sees it, before targets and placement are checked.
#[derive(Debug, Clone)]
enum RawStmt {
    Pass,
    Delete(String),
    Assert {
        test: Expr,
        message: Option<Expr>,
    },
    Return(Option<Expr>),
    Def {
        name: String,
        params: Vec<String>,
        body: Box<RawStmt>,
    },
    NestedDef,
    Assign {
        target: Expr,
        op: Option<BinOp>,
        value: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum Postfix {
    Call(Vec<Expr>),
    Index(Expr),
}

fn invalid_syntax() -> ExecutionFault {
    ExecutionFault::syntax("invalid syntax")
}

fn check_nesting(tokens: &[Token]) -> Result<(), ExecutionFault> {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen | Token::LBracket => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(ExecutionFault::syntax("too many nested parentheses"));
                }
            }
            Token::RParen | Token::RBracket => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn line_parser<'src>(
) -> impl Parser<'src, &'src [Token], RawStmt, extra::Err<Rich<'src, Token>>> + Clone {
    let expr = expr_parser();
    let ident = select! { Token::Ident(name) => name };

    let assign_op = choice((
        just(Token::Assign).to(None),
        just(Token::PlusAssign).to(Some(BinOp::Add)),
        just(Token::MinusAssign).to(Some(BinOp::Sub)),
        just(Token::StarAssign).to(Some(BinOp::Mul)),
        just(Token::SlashAssign).to(Some(BinOp::Div)),
    ));
    let simple = expr
        .clone()
        .then(assign_op.then(expr.clone()).or_not())
        .map(|(lhs, assign)| match assign {
            Some((op, value)) => RawStmt::Assign {
                target: lhs,
                op,
                value,
            },
            None => RawStmt::Expr(lhs),
        });

    let statement = choice((
        just(Token::Pass).to(RawStmt::Pass),
        just(Token::Del)
            .ignore_then(ident.clone())
            .map(RawStmt::Delete),
        just(Token::Assert)
            .ignore_then(expr.clone())
            .then(just(Token::Comma).ignore_then(expr.clone()).or_not())
            .map(|(test, message)| RawStmt::Assert { test, message }),
        just(Token::Return)
            .ignore_then(expr.or_not())
            .map(RawStmt::Return),
        simple,
    ))
    .boxed();

    let body = choice((
        just(Token::Def)
            .ignore_then(any().repeated())
            .to(RawStmt::NestedDef),
        statement.clone(),
    ));
    let params = ident
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));
    let def = just(Token::Def)
        .ignore_then(ident)
        .then(params)
        .then_ignore(just(Token::Colon))
        .then(body)
        .map(|((name, params), body)| RawStmt::Def {
            name,
            params,
            body: Box::new(body),
        });

    choice((def, statement)).then_ignore(end())
}

/// Precedence, loosest first: conditional, `or`, `and`, `not`, comparison
/// chains, `+ -`, `* / // %`, unary `- +`, `**`, calls and indexing.
fn expr_parser<'src>(
) -> impl Parser<'src, &'src [Token], Expr, extra::Err<Rich<'src, Token>>> + Clone {
    recursive(|expr| {
        let literal = select! {
            Token::Int(n) => Expr::Int(n),
            Token::Float(f) => Expr::Float(f),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::None => Expr::None,
            Token::Ident(name) => Expr::Name(name),
        };
        // adjacent literals concatenate
        let string = select! { Token::Str(s) => s }
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|parts| Expr::Str(parts.concat()));

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();
        let list = items
            .clone()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::List);
        let parens = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));
        let atom = choice((literal, string, parens, list));

        let postfix = atom
            .foldl(
                choice((
                    items
                        .delimited_by(just(Token::LParen), just(Token::RParen))
                        .map(Postfix::Call),
                    expr.clone()
                        .delimited_by(just(Token::LBracket), just(Token::RBracket))
                        .map(Postfix::Index),
                ))
                .repeated(),
                |target, op| match op {
                    Postfix::Call(args) => Expr::Call {
                        callee: Box::new(target),
                        args,
                    },
                    Postfix::Index(index) => Expr::Index {
                        target: Box::new(target),
                        index: Box::new(index),
                    },
                },
            )
            .boxed();

        let sign = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Plus).to(UnaryOp::Pos),
        ));
        // `**` binds tighter than a unary minus on its left and is right
        // associative: -2 ** 2 == -4, 2 ** -1 == 0.5.
        let power = postfix
            .clone()
            .then(
                just(Token::DoubleStar)
                    .ignore_then(sign.clone().repeated().collect::<Vec<_>>().then(postfix))
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(base, rest)| fold_power(base, rest));
        let factor = sign.repeated().foldr(power, unary);

        let term_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::Slash).to(BinOp::Div),
            just(Token::DoubleSlash).to(BinOp::FloorDiv),
            just(Token::Percent).to(BinOp::Mod),
        ));
        let term = factor
            .clone()
            .foldl(term_op.then(factor).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            });

        let arith_op = choice((
            just(Token::Plus).to(BinOp::Add),
            just(Token::Minus).to(BinOp::Sub),
        ));
        let arith = term
            .clone()
            .foldl(arith_op.then(term).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            });

        let cmp_op = choice((
            just(Token::Not).then(just(Token::In)).to(CmpOp::NotIn),
            just(Token::In).to(CmpOp::In),
            just(Token::EqEq).to(CmpOp::Eq),
            just(Token::NotEq).to(CmpOp::NotEq),
            just(Token::Lt).to(CmpOp::Lt),
            just(Token::LtE).to(CmpOp::LtE),
            just(Token::Gt).to(CmpOp::Gt),
            just(Token::GtE).to(CmpOp::GtE),
        ));
        let comparison = arith
            .clone()
            .then(cmp_op.then(arith).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                if rest.is_empty() {
                    first
                } else {
                    Expr::Compare {
                        first: Box::new(first),
                        rest,
                    }
                }
            })
            .boxed();

        let negation = just(Token::Not)
            .repeated()
            .foldr(comparison, |_, operand| unary(UnaryOp::Not, operand));
        let and = negation
            .clone()
            .foldl(just(Token::And).ignore_then(negation).repeated(), |lhs, rhs| {
                Expr::And(Box::new(lhs), Box::new(rhs))
            });
        let or = and
            .clone()
            .foldl(just(Token::Or).ignore_then(and).repeated(), |lhs, rhs| {
                Expr::Or(Box::new(lhs), Box::new(rhs))
            });

        or.clone()
            .then(
                just(Token::If)
                    .ignore_then(or.clone())
                    .then_ignore(just(Token::Else))
                    .then(or)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_conditional(first, rest))
    })
}

fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        operand: Box::new(operand),
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// `base ** s1 p1 ** s2 p2` groups as `base ** (s1 (p1 ** (s2 p2)))`.
fn fold_power(base: Expr, rest: Vec<(Vec<UnaryOp>, Expr)>) -> Expr {
    let mut exponent: Option<Expr> = None;
    for (signs, operand) in rest.into_iter().rev() {
        let operand = match exponent.take() {
            Some(exp) => binary(BinOp::Pow, operand, exp),
            None => operand,
        };
        exponent = Some(signs.into_iter().rfold(operand, |acc, op| unary(op, acc)));
    }
    match exponent {
        Some(exp) => binary(BinOp::Pow, base, exp),
        None => base,
    }
}

/// `a if b else c if d else e` groups as `a if b else (c if d else e)`.
fn fold_conditional(first: Expr, rest: Vec<(Expr, Expr)>) -> Expr {
    let mut rest = rest.into_iter().rev();
    let Some((mut cond, mut otherwise)) = rest.next() else {
        return first;
    };
    for (earlier_cond, then) in rest {
        otherwise = conditional(then, cond, otherwise);
        cond = earlier_cond;
    }
    conditional(first, cond, otherwise)
}

fn conditional(then: Expr, cond: Expr, otherwise: Expr) -> Expr {
    Expr::Conditional {
        then: Box::new(then),
        cond: Box::new(cond),
        otherwise: Box::new(otherwise),
    }
}

fn lower(raw: RawStmt, ctx: Context) -> Result<Stmt, ExecutionFault> {
    let stmt = match raw {
        RawStmt::Pass => Stmt::Pass,
        RawStmt::Delete(name) => Stmt::Delete(name),
        RawStmt::Assert { test, message } => Stmt::Assert { test, message },
        RawStmt::Expr(expr) => Stmt::Expr(expr),
        RawStmt::Return(_) if ctx == Context::Module => {
            return Err(ExecutionFault::syntax("'return' outside function"))
        }
        RawStmt::Return(value) => Stmt::Return(value.unwrap_or(Expr::None)),
        RawStmt::NestedDef => {
            return Err(ExecutionFault::syntax(
                "nested function definitions are not supported",
            ))
        }
        RawStmt::Def { name, params, body } => {
            for (i, param) in params.iter().enumerate() {
                if params[..i].contains(param) {
                    return Err(ExecutionFault::syntax(format!(
                        "duplicate argument '{param}' in function definition"
                    )));
                }
            }
            Stmt::FunctionDef(FunctionDef {
                name,
                params,
                body: Box::new(lower(*body, Context::FunctionBody)?),
            })
        }
        RawStmt::Assign {
            target,
            op: None,
            value,
        } => Stmt::Assign {
            target: into_target(target)?,
            value,
        },
        RawStmt::Assign {
            target,
            op: Some(op),
            value,
        } => Stmt::AugAssign {
            target: into_target(target)?,
            op,
            value,
        },
    };
    Ok(stmt)
}

fn into_target(expr: Expr) -> Result<Target, ExecutionFault> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Index { target, index } => Ok(Target::Index {
            target: *target,
            index: *index,
        }),
        Expr::Call { .. } => Err(ExecutionFault::syntax("cannot assign to function call")),
        _ => Err(ExecutionFault::syntax("cannot assign to expression")),
    }
}

fn check_depth(stmt: &Stmt) -> Result<(), ExecutionFault> {
    let too_deep = match stmt {
        Stmt::Pass | Stmt::Delete(_) => false,
        Stmt::Assign { target, value } | Stmt::AugAssign { target, value, .. } => {
            target_too_deep(target) || exceeds(value, MAX_EXPR_DEPTH)
        }
        Stmt::Assert { test, message } => {
            exceeds(test, MAX_EXPR_DEPTH)
                || message.as_ref().is_some_and(|m| exceeds(m, MAX_EXPR_DEPTH))
        }
        Stmt::FunctionDef(def) => return check_depth(&def.body),
        Stmt::Return(expr) | Stmt::Expr(expr) => exceeds(expr, MAX_EXPR_DEPTH),
    };
    if too_deep {
        return Err(ExecutionFault::new(
            FaultKind::RecursionError,
            "maximum recursion depth exceeded during compilation",
        ));
    }
    Ok(())
}

fn target_too_deep(target: &Target) -> bool {
    match target {
        Target::Name(_) => false,
        Target::Index { target, index } => {
            exceeds(target, MAX_EXPR_DEPTH) || exceeds(index, MAX_EXPR_DEPTH)
        }
    }
}

/// True when `expr` nests deeper than `budget`. Never recurses past it.
fn exceeds(expr: &Expr, budget: usize) -> bool {
    let Some(budget) = budget.checked_sub(1) else {
        return true;
    };
    let nested = |e: &Expr| exceeds(e, budget);
    match expr {
        Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::None
        | Expr::Name(_) => false,
        Expr::List(items) => items.iter().any(nested),
        Expr::Index { target, index } => nested(target) || nested(index),
        Expr::Call { callee, args } => nested(callee) || args.iter().any(nested),
        Expr::Unary { operand, .. } => nested(operand),
        Expr::Binary { lhs, rhs, .. } | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            nested(lhs) || nested(rhs)
        }
        Expr::Compare { first, rest } => nested(first) || rest.iter().any(|(_, e)| nested(e)),
        Expr::Conditional {
            then,
            cond,
            otherwise,
        } => nested(then) || nested(cond) || nested(otherwise),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    #[test]
    fn blank_and_comment_lines_are_pass() {
        assert_eq!(parse_line("").unwrap(), Stmt::Pass);
        assert_eq!(parse_line("   ").unwrap(), Stmt::Pass);
        assert_eq!(parse_line("    # indented comment").unwrap(), Stmt::Pass);
        assert_eq!(parse_line("pass").unwrap(), Stmt::Pass);
    }

    #[test]
    fn assignment_with_arithmetic() {
        let stmt = parse_line("x = x + 1").unwrap();
        assert_eq!(
            stmt,
            Stmt::Assign {
                target: Target::Name("x".into()),
                value: binary(BinOp::Add, name("x"), Expr::Int(1)),
            }
        );
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let Stmt::Expr(expr) = parse_line("1 + 2 * 3").unwrap() else {
            panic!("expected expression statement");
        };
        assert_eq!(
            expr,
            binary(
                BinOp::Add,
                Expr::Int(1),
                binary(BinOp::Mul, Expr::Int(2), Expr::Int(3))
            )
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        let Stmt::Expr(expr) = parse_line("8 - 4 - 2").unwrap() else {
            panic!("expected expression statement");
        };
        assert_eq!(
            expr,
            binary(
                BinOp::Sub,
                binary(BinOp::Sub, Expr::Int(8), Expr::Int(4)),
                Expr::Int(2)
            )
        );
    }

    #[test]
    fn unary_minus_applies_after_power() {
        let Stmt::Expr(expr) = parse_line("-2 ** 2").unwrap() else {
            panic!("expected expression statement");
        };
        assert_eq!(
            expr,
            unary(UnaryOp::Neg, binary(BinOp::Pow, Expr::Int(2), Expr::Int(2)))
        );
    }

    #[test]
    fn power_is_right_associative_with_signed_exponents() {
        let Stmt::Expr(expr) = parse_line("2 ** -3 ** 2").unwrap() else {
            panic!("expected expression statement");
        };
        assert_eq!(
            expr,
            binary(
                BinOp::Pow,
                Expr::Int(2),
                unary(
                    UnaryOp::Neg,
                    binary(BinOp::Pow, Expr::Int(3), Expr::Int(2))
                )
            )
        );
    }

    #[test]
    fn one_line_function_definition() {
        let stmt = parse_line("def add(a, b): return a + b").unwrap();
        let Stmt::FunctionDef(def) = stmt else {
            panic!("expected function definition");
        };
        assert_eq!(def.name, "add");
        assert_eq!(def.params, vec!["a", "b"]);
        assert_eq!(
            *def.body,
            Stmt::Return(binary(BinOp::Add, name("a"), name("b")))
        );
    }

    #[test]
    fn bare_return_yields_none() {
        let Stmt::FunctionDef(def) = parse_line("def nothing(): return").unwrap() else {
            panic!("expected function definition");
        };
        assert_eq!(*def.body, Stmt::Return(Expr::None));
    }

    #[test]
    fn not_in_and_chained_comparison() {
        let Stmt::Expr(expr) = parse_line("1 < x <= 3 not in xs").unwrap() else {
            panic!("expected expression statement");
        };
        let Expr::Compare { rest, .. } = expr else {
            panic!("expected comparison");
        };
        let ops: Vec<_> = rest.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtE, CmpOp::NotIn]);
    }

    #[test]
    fn conditional_expression() {
        let stmt = parse_line("y = 1 if x else 2").unwrap();
        assert!(matches!(
            stmt,
            Stmt::Assign {
                value: Expr::Conditional { .. },
                ..
            }
        ));
    }

    #[test]
    fn chained_conditionals_nest_to_the_right() {
        let Stmt::Expr(expr) = parse_line("a if b else c if d else e").unwrap() else {
            panic!("expected expression statement");
        };
        assert_eq!(
            expr,
            conditional(
                name("a"),
                name("b"),
                conditional(name("c"), name("d"), name("e"))
            )
        );
    }

    #[test]
    fn calls_indexing_and_adjacent_strings() {
        let Stmt::Expr(expr) = parse_line("f(xs[0], 'a' 'b',)[1]").unwrap() else {
            panic!("expected expression statement");
        };
        assert_eq!(
            expr,
            Expr::Index {
                target: Box::new(Expr::Call {
                    callee: Box::new(name("f")),
                    args: vec![
                        Expr::Index {
                            target: Box::new(name("xs")),
                            index: Box::new(Expr::Int(0)),
                        },
                        Expr::Str("ab".into()),
                    ],
                }),
                index: Box::new(Expr::Int(1)),
            }
        );
    }

    #[test]
    fn index_assignment_and_augmented_assignment() {
        assert!(matches!(
            parse_line("xs[0] = 5").unwrap(),
            Stmt::Assign {
                target: Target::Index { .. },
                ..
            }
        ));
        assert!(matches!(
            parse_line("total += 2").unwrap(),
            Stmt::AugAssign { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn syntax_faults() {
        let cases = [
            ("x = ", "invalid syntax"),
            ("return 1", "'return' outside function"),
            ("f() = 1", "cannot assign to function call"),
            ("1 = x", "cannot assign to expression"),
            ("x = 1 2", "invalid syntax"),
            ("x = (1", "invalid syntax"),
            ("def f(a, a): return a", "duplicate argument 'a' in function definition"),
            ("def f(): def g(): pass", "nested function definitions are not supported"),
            ("def f():", "expected a statement after ':' on the same line"),
        ];
        for (source, message) in cases {
            let fault = parse_line(source).unwrap_err();
            assert_eq!(fault.kind, FaultKind::SyntaxError, "{source}");
            assert_eq!(fault.message, message, "{source}");
        }
    }

    #[test]
    fn indented_statement_is_an_indentation_fault() {
        let fault = parse_line("  x = 1").unwrap_err();
        assert_eq!(fault.kind, FaultKind::IndentationError);
        assert_eq!(fault.to_string(), "IndentationError: unexpected indent");
    }

    #[test]
    fn moderate_nesting_parses() {
        let source = format!("x = {}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(
            parse_line(&source).unwrap(),
            Stmt::Assign {
                target: Target::Name("x".into()),
                value: Expr::Int(1),
            }
        );
        assert!(parse_line(&format!("{}{}", "[".repeat(20), "]".repeat(20))).is_ok());
    }

    #[test]
    fn deep_parentheses_are_rejected_before_parsing() {
        let source = format!("x = {}1{}", "(".repeat(1000), ")".repeat(1000));
        let fault = parse_line(&source).unwrap_err();
        assert_eq!(fault.kind, FaultKind::SyntaxError);
        assert_eq!(fault.message, "too many nested parentheses");

        let fault = parse_line(&"[".repeat(MAX_NESTING + 1)).unwrap_err();
        assert_eq!(fault.message, "too many nested parentheses");
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let fault = parse_line(&format!("x = {}1", "-".repeat(1000))).unwrap_err();
        assert_eq!(fault.kind, FaultKind::RecursionError);

        let fault = parse_line(&format!("x = {}True", "not ".repeat(1000))).unwrap_err();
        assert_eq!(fault.kind, FaultKind::RecursionError);

        let chain = vec!["1"; 1000].join(" + ");
        let fault = parse_line(&format!("total = {chain}")).unwrap_err();
        assert_eq!(fault.kind, FaultKind::RecursionError);

        assert!(parse_line(&format!("x = {}1", "-".repeat(50))).is_ok());
    }
}
