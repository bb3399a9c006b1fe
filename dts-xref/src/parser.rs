use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{anychar, char, line_ending, multispace1},
    combinator::{all_consuming, cut, eof, map, recognize, verify},
    error::{ErrorKind, ParseError as NomParseError},
    multi::{many0, many0_count, many_till},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish,
};
use nom_locate::LocatedSpan;

use crate::ast::*;
use crate::error::ParseError;
use crate::tree::Tree;

pub(crate) type Input<'a> = LocatedSpan<&'a str>;

type IResult<'a, T, E> = nom::IResult<Input<'a>, T, E>;

/// Knobs for [`parse`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Link subnodes whose `status` is `"disabled"` instead of dropping them.
    pub keep_disabled: bool,
}

/// Parse a decompiled Device Tree, dropping disabled subnodes.
pub fn from_str(s: &str) -> Result<Tree, ParseError> {
    parse(s, ParseOptions::default())
}

/// Parse a decompiled Device Tree.
pub fn parse(s: &str, options: ParseOptions) -> Result<Tree, ParseError> {
    let root = match all_consuming(terminated(dts_file, ws))(Input::new(s)).finish() {
        Ok((_, root)) => root,
        Err(e) => return Err(structural_error(s, e)),
    };

    if root.name != "/" {
        return Err(ParseError::NoRoot);
    }

    Ok(Tree::from_ast(&root, options.keep_disabled))
}

fn structural_error(source: &str, e: nom::error::Error<Input>) -> ParseError {
    if !source.contains('{') {
        return ParseError::NoRoot;
    }

    // A block is still open and nothing left could close it.
    let rest = *e.input.fragment();
    if e.code != ErrorKind::Eof && !rest.contains(|c: char| c == '}' || c == ';') {
        return ParseError::Truncated {
            line: e.input.location_line() + rest.matches('\n').count() as u32,
        };
    }

    ParseError::Syntax {
        line: e.input.location_line(),
        column: e.input.get_utf8_column(),
        near: e
            .input
            .fragment()
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(40)
            .collect(),
    }
}

/// Parse a source file: optional top-level statements followed by the root node.
fn dts_file<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Node<'a>, E> {
    preceded(preamble, node)(input)
}

/// Skip top-level statements such as `/dts-v1/;` that precede the root node.
fn preamble<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, usize, E> {
    many0_count(terminated(lexeme(statement), terminator))(input)
}

/// Parse a node, either the root or an inner one.
fn node<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Node<'a>, E> {
    map(
        tuple((node_name, node_body, cut(terminator))),
        |(name, contents, _)| Node { name, contents },
    )(input)
}

/// Parse a node name, i.e. everything since the last `;`, `{` or `}`.
fn node_name<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, &'a str, E> {
    map(lexeme(statement), |s: Input<'a>| (*s.fragment()).trim())(input)
}

/// Parse the body of a node.
fn node_body<'a, E: NomParseError<Input<'a>>>(
    input: Input<'a>,
) -> IResult<'a, NodeContents<'a>, E> {
    preceded(left_brace, cut(terminated(node_contents, right_brace)))(input)
}

/// Parse the contents of a node.
fn node_contents<'a, E: NomParseError<Input<'a>>>(
    input: Input<'a>,
) -> IResult<'a, NodeContents<'a>, E> {
    enum NodeContent<'s> {
        Node(Node<'s>),
        Prop(Property<'s>),
        Empty,
    }

    map(
        many0(alt((
            map(node, NodeContent::Node),
            map(property, NodeContent::Prop),
            map(terminator, |_| NodeContent::Empty),
        ))),
        |contents| {
            contents
                .into_iter()
                .fold(NodeContents::default(), |mut contents, elem| {
                    match elem {
                        NodeContent::Prop(p) => contents.props.push(p),
                        NodeContent::Node(c) => contents.children.push(c),
                        NodeContent::Empty => {}
                    };
                    contents
                })
        },
    )(input)
}

/// Parse a node property, with or without a value.
fn property<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Property<'a>, E> {
    map(terminated(lexeme(statement), terminator), |s: Input<'a>| {
        Property::from_statement(*s.fragment())
    })(input)
}

/// Recognize the non-blank raw text of a statement, up to (not including) the next
/// `;`, `{` or `}` outside of a string literal.
fn statement<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Input<'a>, E> {
    verify(
        recognize(many0_count(alt((string_literal, is_not("\"{};"))))),
        |s: &Input<'a>| !s.fragment().trim().is_empty(),
    )(input)
}

/// Recognize a string literal, quotes included.
fn string_literal<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Input<'a>, E> {
    recognize(preceded(
        char('"'),
        cut(terminated(
            many0_count(alt((is_not("\\\""), recognize(pair(char('\\'), anychar))))),
            char('"'),
        )),
    ))(input)
}

/* === Low-level syntax parsers === */

/// Recognize a statement terminator.
fn terminator<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, char, E> {
    lexeme(char(';'))(input)
}

/// Recognize an opening brace.
fn left_brace<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, char, E> {
    lexeme(char('{'))(input)
}

/// Recognize a closing brace.
fn right_brace<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, char, E> {
    lexeme(char('}'))(input)
}

/* === Utility functions === */

/// Parse a lexeme using the combinator passed as its argument,
/// also consuming any whitespaces or comments before or after.
fn lexeme<'a, O, F, E: NomParseError<Input<'a>>>(f: F) -> impl FnMut(Input<'a>) -> IResult<'a, O, E>
where
    F: FnMut(Input<'a>) -> IResult<'a, O, E>,
{
    delimited(ws, f, ws)
}

/// Consume zero or more whitespace characters or comments.
fn ws<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Input<'a>, E> {
    recognize(many0_count(alt((multispace1, line_comment, block_comment))))(input)
}

/// Parse block comments.
fn block_comment<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Input<'a>, E> {
    recognize(preceded(tag("/*"), many_till(anychar, tag("*/"))))(input)
}

/// Parse a single line comment, newline included if there is one.
fn line_comment<'a, E: NomParseError<Input<'a>>>(input: Input<'a>) -> IResult<'a, Input<'a>, E> {
    recognize(preceded(tag("//"), many_till(anychar, alt((line_ending, eof)))))(input)
}

/* === Unit Tests === */
