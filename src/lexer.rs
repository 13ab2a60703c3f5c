//! PDF lexer (tokenizer).
//!
//! Splits a byte slice into tokens: numbers, literal and hex strings, names,
//! delimiters and keywords. Whitespace (space, \t, \r, \n, \0, \f) and
//! comments (`%` to end of line) between tokens are skipped.
//!
//! Literal and hex string contents are returned raw; the parser decodes
//! them. Name `#xx` escapes are decoded here.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Raw content of a literal string; escapes are not decoded
    LiteralString(&'a [u8]),

    /// Raw content of a hex string, whitespace included
    HexString(&'a [u8]),

    /// Name with `#xx` escapes decoded
    Name(String),

    /// `true`
    True,

    /// `false`
    False,

    /// `null`
    Null,

    /// `[`
    ArrayStart,

    /// `]`
    ArrayEnd,

    /// `<<`
    DictStart,

    /// `>>`
    DictEnd,

    /// `obj`
    ObjStart,

    /// `endobj`
    ObjEnd,

    /// `stream`
    StreamStart,

    /// `endstream`
    StreamEnd,

    /// `R` (as in "10 0 R")
    R,

    /// Any other run of regular characters (`xref`, `trailer`, `startxref`, ...)
    Keyword(&'a [u8]),
}

/// PDF whitespace characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        let (rest, _) = take_while(is_whitespace)(remaining)?;
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) => return Ok((remaining, ())),
        }
    }
}

/// Integer or real: `42`, `-123`, `+17`, `3.14`, `.5`, `5.`, `-.002`.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)?;
    let fail = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));
    let text = std::str::from_utf8(text).map_err(|_| fail())?;
    if text.contains('.') {
        let normalized = text.strip_prefix('+').unwrap_or(text);
        let num: f64 = normalized.parse().map_err(|_| fail())?;
        return Ok((rest, Token::Real(num)));
    }
    let num: i64 = text.parse().map_err(|_| fail())?;
    Ok((rest, Token::Integer(num)))
}

/// Literal string in parentheses, with balanced nesting and backslash escapes.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 || pos > remaining.len() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    Ok((&remaining[pos..], Token::LiteralString(&remaining[..pos - 1])))
}

/// Hex string in angle brackets. Must not be a dictionary start.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#xx` escapes in raw name bytes.
///
/// Invalid sequences are kept as written. The decoded bytes are read as
/// UTF-8, lossily.
///
/// ```
/// # use pdf_graft::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    match String::from_utf8(bytes) {
        Ok(name) => name,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Name starting with `/`. An empty name (`/` followed by a delimiter) is accepted.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |raw: &[u8]| Token::Name(decode_name_escapes(raw))),
    )(input)
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// A run of regular characters that is not a number.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    map(take_while1(is_regular), |word: &[u8]| match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        other => Token::Keyword(other),
    })(input)
}

/// Parse a single token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_delimiter,
        parse_name,
        parse_literal_string,
        parse_hex_string,
        parse_number_word,
        parse_keyword,
    ))(input)
}

/// A number only when the whole regular-character run is numeric, so
/// `1st` or `3D` lex as keywords.
fn parse_number_word(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, tok) = parse_number(input)?;
    if rest.first().is_some_and(|&c| is_regular(c)) {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }
    Ok((rest, tok))
}

/// Parse tokens until the input is exhausted or an error occurs.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}
