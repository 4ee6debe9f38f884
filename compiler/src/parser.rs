// Parser for lfc chain definition files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Grammar:
//   program   := chain_def*
//   chain_def := 'pub'? 'chain' IDENT ('(' param (',' param)* ')')? '=' expr
//   param     := IDENT ':' type
//   type      := IDENT ('<' type (',' type)* '>')?
//   expr      := lambda | or
//   lambda    := (IDENT | '(' IDENT (',' IDENT)* ')') '=>' expr
//   or        := and ('||' and)*          and := eq ('&&' eq)*
//   eq        := cmp (('=='|'!=') cmp)*   cmp := add (('<'|'<='|'>'|'>=') add)*
//   add       := mul (('+'|'-') mul)*     mul := unary (('*'|'/'|'%') unary)*
//   unary     := ('-'|'!')* postfix
//   postfix   := atom ('.' call)*
//   atom      := literal | '[' exprs ']' | call | IDENT | '(' expr ')'
//   call      := IDENT ('<' type (',' type)* '>')? '(' exprs ')'
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse an lfc source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

fn join(a: Span, b: Span) -> Span {
    (a.start..b.end).into()
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = join(lhs.span, rhs.span);
    Expr {
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
        span,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Types ──

    let type_expr = recursive(|ty| {
        ident
            .clone()
            .then(
                ty.separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::Lt), just(Token::Gt))
                    .or_not(),
            )
            .map_with(|(name, args), e| TypeExpr {
                name,
                args: args.unwrap_or_default(),
                span: e.span(),
            })
    });

    let type_args = type_expr
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Lt), just(Token::Gt));

    // ── Expressions ──

    let expr = recursive(|expr| {
        let literal = select! {
            Token::Int(n) => ExprKind::Int(n),
            Token::Long(n) => ExprKind::Long(n),
            Token::Double(n) => ExprKind::Double(n),
            Token::StringLit(s) => ExprKind::Str(s),
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
        }
        .map_with(|kind, e| Expr {
            kind,
            span: e.span(),
        });

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        // `Name<T>(args)`; the type-argument list is optional, and a failed
        // attempt backtracks so `a < b` still parses as a comparison.
        let call = ident
            .clone()
            .then(type_args.clone().or_not())
            .then(args)
            .map_with(|((name, type_args), args), e| {
                (
                    Call {
                        name,
                        type_args: type_args.unwrap_or_default(),
                        args,
                    },
                    e.span(),
                )
            });

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|items, e| Expr {
                kind: ExprKind::List(items),
                span: e.span(),
            });

        let parens = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((
            literal,
            list,
            call.clone().map(|(call, span)| Expr {
                kind: ExprKind::Call(call),
                span,
            }),
            ident.clone().map(|id| Expr {
                span: id.span,
                kind: ExprKind::Name(id),
            }),
            parens,
        ));

        let postfix = atom.foldl(
            just(Token::Dot).ignore_then(call).repeated(),
            |receiver, (call, span)| Expr {
                span: join(receiver.span, span),
                kind: ExprKind::Method(Box::new(receiver), call),
            },
        );

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Bang).to(UnaryOp::Not),
        ))
        .map_with(|op, e| (op, e.span()))
        .repeated()
        .foldr(postfix, |(op, span), operand| Expr {
            span: join(span, operand.span),
            kind: ExprKind::Unary(op, Box::new(operand)),
        })
        .boxed();

        let mul_op = choice((
            just(Token::Star).to(BinaryOp::Mul),
            just(Token::Slash).to(BinaryOp::Div),
            just(Token::Percent).to(BinaryOp::Rem),
        ));
        let mul = unary
            .clone()
            .foldl(mul_op.then(unary).repeated(), |l, (op, r)| binary(op, l, r)).boxed();

        let add_op = choice((
            just(Token::Plus).to(BinaryOp::Add),
            just(Token::Minus).to(BinaryOp::Sub),
        ));
        let add = mul
            .clone()
            .foldl(add_op.then(mul).repeated(), |l, (op, r)| binary(op, l, r)).boxed();

        let cmp_op = choice((
            just(Token::LtEq).to(BinaryOp::Le),
            just(Token::Lt).to(BinaryOp::Lt),
            just(Token::GtEq).to(BinaryOp::Ge),
            just(Token::Gt).to(BinaryOp::Gt),
        ));
        let cmp = add
            .clone()
            .foldl(cmp_op.then(add).repeated(), |l, (op, r)| binary(op, l, r)).boxed();

        let eq_op = choice((
            just(Token::EqEq).to(BinaryOp::Eq),
            just(Token::NotEq).to(BinaryOp::Ne),
        ));
        let eq = cmp
            .clone()
            .foldl(eq_op.then(cmp).repeated(), |l, (op, r)| binary(op, l, r)).boxed();

        let and = eq.clone().foldl(
            just(Token::AndAnd).to(BinaryOp::And).then(eq).repeated(),
            |l, (op, r)| binary(op, l, r),
        ).boxed();

        let or = and.clone().foldl(
            just(Token::OrOr).to(BinaryOp::Or).then(and).repeated(),
            |l, (op, r)| binary(op, l, r),
        ).boxed();

        let lambda_params = ident.clone().map(|id| vec![id]).or(ident
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen)));

        let lambda = lambda_params
            .then_ignore(just(Token::FatArrow))
            .then(expr)
            .map_with(|(params, body), e| Expr {
                kind: ExprKind::Lambda(params, Box::new(body)),
                span: e.span(),
            });

        lambda.or(or)
    });

    // ── Chain definitions ──

    let param = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(type_expr)
        .map(|(name, ty)| Param { name, ty });

    let params = param
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .or_not()
        .map(Option::unwrap_or_default);

    let chain_def = just(Token::Pub)
        .or_not()
        .then_ignore(just(Token::Chain))
        .then(ident)
        .then(params)
        .then_ignore(just(Token::Equals))
        .then(expr)
        .map_with(|(((public, name), params), body), e| ChainDef {
            public: public.is_some(),
            name,
            params,
            body,
            span: e.span(),
        });

    chain_def
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map_with(|chains, e| Program {
            chains,
            span: e.span(),
        })
}

// ── Tests ──
