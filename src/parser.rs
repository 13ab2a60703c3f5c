//! PDF object parser.
//!
//! Recursive descent over lexer tokens. Builds [`Object`] values: arrays,
//! dictionaries (key order preserved), streams and references. Reference
//! slots are left as [`Object::Reference`]; the object table resolves them
//! lazily.

use nom::IResult;

use crate::error::{Error, Result};
use crate::lexer::{Token, is_whitespace, token};
use crate::object::{Object, ObjectRef, PdfArray, PdfDictionary, PdfStream, PdfString, Resolve};
use crate::parser_config::ReaderOptions;

/// Decode escape sequences in the raw bytes of a literal string.
///
/// Handles `\n \r \t \b \f \( \) \\`, one to three digit octal escapes and
/// line continuations. An unescaped CR or CRLF reads as LF. A backslash
/// before any other character is dropped.
///
/// ```
/// # use pdf_graft::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 1"), b"Section \xa7 1");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'\\' if i + 1 < raw.len() => {
                i += 1;
                match raw[i] {
                    b'n' => result.push(b'\n'),
                    b'r' => result.push(b'\r'),
                    b't' => result.push(b'\t'),
                    b'b' => result.push(0x08),
                    b'f' => result.push(0x0C),
                    b'\n' => {},
                    b'\r' => {
                        if raw.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    },
                    b'0'..=b'7' => {
                        let mut value = 0u32;
                        let mut len = 0;
                        while len < 3 && i + len < raw.len() && (b'0'..=b'7').contains(&raw[i + len])
                        {
                            value = value * 8 + u32::from(raw[i + len] - b'0');
                            len += 1;
                        }
                        result.push((value & 0xFF) as u8);
                        i += len;
                        continue;
                    },
                    other => result.push(other),
                }
                i += 1;
            },
            b'\r' => {
                result.push(b'\n');
                i += 1;
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            byte => {
                result.push(byte);
                i += 1;
            },
        }
    }

    result
}

/// Decode the content of a hex string. Whitespace is ignored and an odd
/// final digit is padded with 0. Returns None on a non-hex byte.
///
/// ```
/// # use pdf_graft::parser::decode_hex;
/// assert_eq!(decode_hex(b"48656C6C6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Option<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|&c| !is_whitespace(c))
        .map(|c| (c as char).to_digit(16).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()?;
    Some(
        digits
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
            .collect(),
    )
}

/// Parse a PDF object with default (lenient) options.
///
/// ```
/// use pdf_graft::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Count 3 >>").unwrap();
/// assert_eq!(obj.as_dict().unwrap().get_integer("Count"), Some(3));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let options = ReaderOptions::default();
    Parser::new(&options).object(input)
}

/// Object parser bound to reader options and, optionally, to a resolver
/// used for indirect stream lengths.
pub struct Parser<'r> {
    options: &'r ReaderOptions,
    lengths: Option<&'r dyn Resolve>,
}

impl<'r> Parser<'r> {
    /// Parser without a length resolver. Streams with an indirect `Length`
    /// fall back to scanning for `endstream`.
    pub fn new(options: &'r ReaderOptions) -> Self {
        Self {
            options,
            lengths: None,
        }
    }

    /// Resolve indirect stream lengths through `resolver`.
    pub fn with_lengths(mut self, resolver: &'r dyn Resolve) -> Self {
        self.lengths = Some(resolver);
        self
    }

    /// Parse one object.
    pub fn object<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Object> {
        self.object_at_depth(input, 0)
    }

    /// Parse an indirect object record: `N G obj <object> endobj`.
    pub fn indirect_object<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], (ObjectRef, Object)> {
        let (rest, number) = token(input)?;
        let (rest, generation) = token(rest)?;
        let (rest, keyword) = token(rest)?;
        let reference = match (number, generation, keyword) {
            (Token::Integer(n), Token::Integer(g), Token::ObjStart) if n >= 0 && g >= 0 => {
                ObjectRef::new(n as u32, g as u16)
            },
            _ => return Err(error(input, nom::error::ErrorKind::Tag)),
        };
        let (rest, object) = self.object(rest)?;
        match token(rest) {
            Ok((after, Token::ObjEnd)) => Ok((after, (reference, object))),
            _ if !self.options.strict => {
                log::warn!("Object {} has no endobj", reference);
                Ok((rest, (reference, object)))
            },
            _ => Err(error(rest, nom::error::ErrorKind::Tag)),
        }
    }

    fn object_at_depth<'a>(&self, input: &'a [u8], depth: u32) -> IResult<&'a [u8], Object> {
        let (input, tok) = token(input)?;

        match tok {
            Token::Null => Ok((input, Object::Null)),
            Token::True => Ok((input, Object::Boolean(true))),
            Token::False => Ok((input, Object::Boolean(false))),
            Token::Integer(i) => {
                // `N G R` is a reference; otherwise a plain integer.
                if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                    if let Ok((after_r, Token::R)) = token(after_gen) {
                        if i >= 0 && (0..=i64::from(u16::MAX)).contains(&gen) {
                            let reference = ObjectRef::new(i as u32, gen as u16);
                            return Ok((after_r, Object::Reference(reference)));
                        }
                    }
                }
                Ok((input, Object::Integer(i)))
            },
            Token::Real(r) => Ok((input, Object::Real(r))),
            Token::LiteralString(raw) => Ok((
                input,
                Object::String(PdfString::literal(decode_literal_string_escapes(raw))),
            )),
            Token::HexString(raw) => match decode_hex(raw) {
                Some(bytes) => Ok((input, Object::String(PdfString::hex(bytes)))),
                None => Err(failure(input, nom::error::ErrorKind::HexDigit)),
            },
            Token::Name(name) => Ok((input, Object::Name(name))),
            Token::ArrayStart => {
                self.check_depth(input, depth)?;
                self.array(input, depth + 1)
            },
            Token::DictStart => {
                self.check_depth(input, depth)?;
                let (rest, dict) = self.dictionary(input, depth + 1)?;
                match token(rest) {
                    Ok((after, Token::StreamStart)) => {
                        let (rest, data) = self.stream_data(after, &dict)?;
                        Ok((rest, Object::Stream(PdfStream::new(dict, data))))
                    },
                    _ => Ok((rest, Object::Dictionary(dict))),
                }
            },
            _ => Err(error(input, nom::error::ErrorKind::Tag)),
        }
    }

    fn check_depth<'a>(&self, input: &'a [u8], depth: u32) -> IResult<&'a [u8], ()> {
        if depth >= self.options.max_nesting {
            return Err(failure(input, nom::error::ErrorKind::TooLarge));
        }
        Ok((input, ()))
    }

    fn array<'a>(&self, input: &'a [u8], depth: u32) -> IResult<&'a [u8], Object> {
        let mut items = Vec::new();
        let mut remaining = input;
        loop {
            match token(remaining) {
                Ok((rest, Token::ArrayEnd)) => {
                    return Ok((rest, Object::Array(PdfArray::from_vec(items))));
                },
                Ok(_) => {
                    let (rest, item) = self.object_at_depth(remaining, depth)?;
                    items.push(item);
                    remaining = rest;
                },
                Err(_) if self.is_eof(remaining) => {
                    log::warn!("Unclosed array at end of input");
                    return Ok((remaining, Object::Array(PdfArray::from_vec(items))));
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn dictionary<'a>(&self, input: &'a [u8], depth: u32) -> IResult<&'a [u8], PdfDictionary> {
        let dict = PdfDictionary::new();
        let mut remaining = input;
        loop {
            match token(remaining) {
                Ok((rest, Token::DictEnd)) => return Ok((rest, dict)),
                Ok((rest, Token::Name(key))) => {
                    let (rest, value) = self.object_at_depth(rest, depth)?;
                    dict.insert(key, value);
                    remaining = rest;
                },
                Ok(_) => return Err(error(remaining, nom::error::ErrorKind::Tag)),
                Err(_) if self.is_eof(remaining) => {
                    log::warn!("Unclosed dictionary at end of input");
                    return Ok((remaining, dict));
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn is_eof(&self, input: &[u8]) -> bool {
        !self.options.strict && input.iter().all(|&c| is_whitespace(c))
    }

    /// Stream bytes after the `stream` keyword.
    ///
    /// `Length` (direct, or indirect through the resolver) is trusted when it
    /// lands on `endstream`; otherwise the data runs up to the next
    /// `endstream`, minus the EOL before it.
    fn stream_data<'a>(
        &self,
        input: &'a [u8],
        dict: &PdfDictionary,
    ) -> IResult<&'a [u8], Vec<u8>> {
        let input = if let Some(rest) = input.strip_prefix(b"\r\n") {
            rest
        } else if let Some(rest) = input.strip_prefix(b"\n") {
            rest
        } else if self.options.strict {
            return Err(failure(input, nom::error::ErrorKind::CrLf));
        } else {
            log::warn!("Stream keyword not followed by CRLF or LF");
            input.strip_prefix(b"\r").unwrap_or(input)
        };

        if let Some(length) = self.declared_length(dict) {
            if length <= input.len() {
                if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                    return Ok((rest, input[..length].to_vec()));
                }
            }
            if self.options.strict {
                return Err(failure(input, nom::error::ErrorKind::Eof));
            }
            log::warn!("Stream Length {} does not end at endstream; scanning", length);
        } else if self.options.strict {
            return Err(failure(input, nom::error::ErrorKind::Eof));
        }

        let Some(pos) = find_endstream(input) else {
            return Err(failure(input, nom::error::ErrorKind::Eof));
        };
        let mut data = &input[..pos];
        if let Some(trimmed) = data.strip_suffix(b"\r\n") {
            data = trimmed;
        } else if let Some(trimmed) = data.strip_suffix(b"\n").or(data.strip_suffix(b"\r")) {
            data = trimmed;
        }
        Ok((&input[pos + b"endstream".len()..], data.to_vec()))
    }

    fn declared_length(&self, dict: &PdfDictionary) -> Option<usize> {
        let length = match dict.get_raw("Length")? {
            Object::Integer(n) => n,
            Object::Reference(r) => self.lengths?.resolve(r).as_integer()?,
            _ => return None,
        };
        usize::try_from(length).ok()
    }
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input
        .windows(keyword.len())
        .position(|window| window == keyword)
}

fn error(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

fn failure(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// Parse the indirect object starting at `offset` in `data`.
pub fn parse_indirect_at(
    data: &[u8],
    offset: usize,
    parser: &Parser<'_>,
) -> Result<(ObjectRef, Object)> {
    let input = data.get(offset..).ok_or(Error::UnexpectedEof)?;
    match parser.indirect_object(input) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            if e.code == nom::error::ErrorKind::TooLarge {
                return Err(Error::RecursionLimitExceeded(parser.options.max_nesting));
            }
            Err(Error::ParseError {
                offset: data.len() - e.input.len(),
                reason: format!("{:?}", e.code),
            })
        },
        Err(nom::Err::Incomplete(_)) => Err(Error::UnexpectedEof),
    }
}
