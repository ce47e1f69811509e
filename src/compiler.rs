//! The shunting-yard compiler.
//!
//! Turns expression text into a postfix token queue. The driver is a
//! byte-level loop with two states (expecting an operand, expecting an
//! operator); self-contained literal grammars (numbers, strings) are
//! parsed with nom sub-parsers. Identifiers admit validated multi-byte
//! UTF-8 sequences.
//!
//! Bracket handling goes through lowering: a call `f(x)` compiles as the
//! synthetic `"()"` operator applied to `f` and the argument tuple, an
//! index `x[y]` as `"[]"`, member access `x.y` as `"."` with the member
//! name as a string literal, and the literal constructors `[...]` / `{...}`
//! as calls to the global `list` / `map` functions.
//!
//! Reserved-word and reserved-character hooks registered in the
//! [`Config`] are consulted before default handling and drive the
//! compilation through the public [`RpnBuilder`] surface.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::{opt, recognize},
};

use crate::Error;
use crate::config::Config;
use crate::containers::Map;
use crate::value::Value;

/// Characters that may begin or continue a multi-character operator.
const OP_CHARS: &[u8] = b"+-*/%=<>!&|~^$?,:";

/// A single postfix queue item.
#[derive(Debug, Clone)]
pub enum Token {
    /// A literal value.
    Literal(Value),
    /// A variable lookup. `snapshot` is the value the name resolved to in
    /// the compilation scope, used as a fallback when the evaluation scope
    /// does not bind the name.
    Var {
        name: String,
        snapshot: Option<Value>,
    },
    /// An operator. Left and right unary operators carry their `L`/`R`
    /// prefix.
    Op(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Literal(value) => write!(f, "{value}"),
            Token::Var { name, .. } => write!(f, "{name}"),
            Token::Op(op) => write!(f, "{op}"),
        }
    }
}

fn is_var_start(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphabetic() || c >= 0x80
}

fn is_opener(op: &str) -> bool {
    matches!(op, "(" | "[" | "{")
}

/// Builder handle exposed to reserved-word and reserved-character hooks.
///
/// Hooks emit literals through [`RpnBuilder::handle_token`], operators
/// through [`RpnBuilder::handle_op`], and may open or close bracket groups;
/// consuming input without emitting anything (comments) is done by just
/// returning an advanced read position.
pub struct RpnBuilder<'c> {
    rpn: Vec<Token>,
    op_stack: Vec<String>,
    last_token_was_op: bool,
    bracket_level: u32,
    scope: Map,
    config: &'c Config,
}

impl<'c> RpnBuilder<'c> {
    fn new(scope: Map, config: &'c Config) -> RpnBuilder<'c> {
        RpnBuilder {
            rpn: Vec::new(),
            op_stack: Vec::new(),
            last_token_was_op: true,
            bracket_level: 0,
            scope,
            config,
        }
    }

    /// The compilation scope (used for variable snapshots).
    pub fn scope(&self) -> &Map {
        &self.scope
    }

    /// Whether the compiler is in operand position (true initially, after
    /// an operator, or after an opening bracket).
    pub fn expecting_operand(&self) -> bool {
        self.last_token_was_op
    }

    /// Emit a literal value.
    pub fn handle_token(&mut self, value: Value) -> Result<(), Error> {
        if !self.last_token_was_op {
            return Err(Error::syntax("expected an operator before operand"));
        }
        self.rpn.push(Token::Literal(value));
        self.last_token_was_op = false;
        Ok(())
    }

    /// Emit a variable token, capturing its compile-scope snapshot.
    pub fn handle_var(&mut self, name: &str) -> Result<(), Error> {
        if !self.last_token_was_op {
            return Err(Error::syntax("expected an operator before operand"));
        }
        self.rpn.push(Token::Var {
            name: name.to_owned(),
            snapshot: self.scope.find(name),
        });
        self.last_token_was_op = false;
        Ok(())
    }

    /// Emit an operator, applying precedence and unary-position rules.
    pub fn handle_op(&mut self, op: &str) -> Result<(), Error> {
        if !self.config.precedence.exists(op) {
            return Err(Error::Syntax(format!("undefined operator '{op}'")));
        }
        if self.last_token_was_op {
            // Operand position: only a prefix reading is possible.
            let unary = format!("L{op}");
            if self.config.precedence.exists(&unary) {
                // Prefix operators wait on the stack for their operand.
                self.op_stack.push(unary);
                Ok(())
            } else {
                Err(Error::Syntax(format!("unexpected operator '{op}'")))
            }
        } else {
            let right_unary = format!("R{op}");
            if self.config.precedence.exists(&right_unary) {
                // Postfix operators apply to the operand already emitted.
                self.pop_while_tighter(&right_unary)?;
                self.rpn.push(Token::Op(right_unary));
                Ok(())
            } else {
                self.pop_while_tighter(op)?;
                self.op_stack.push(op.to_owned());
                self.last_token_was_op = true;
                Ok(())
            }
        }
    }

    fn pop_while_tighter(&mut self, op: &str) -> Result<(), Error> {
        let p_new = self
            .config
            .precedence
            .prec(op)
            .ok_or_else(|| Error::Syntax(format!("undefined operator '{op}'")))?;
        let right_assoc = self.config.precedence.right_to_left(op);
        while let Some(top) = self.op_stack.last() {
            if is_opener(top) {
                break;
            }
            let p_top = self.config.precedence.prec(top).unwrap_or(i32::MAX);
            if p_top < p_new || (p_top == p_new && !right_assoc) {
                let emitted = self.op_stack.pop().unwrap_or_default();
                self.rpn.push(Token::Op(emitted));
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Push an opening bracket and suspend delimiter termination.
    pub fn open_bracket(&mut self, bracket: &str) {
        self.op_stack.push(bracket.to_owned());
        self.bracket_level += 1;
        self.last_token_was_op = true;
    }

    /// Pop operators back to the matching opening bracket.
    pub fn close_bracket(&mut self, opener: &str) -> Result<(), Error> {
        loop {
            match self.op_stack.pop() {
                None => return Err(Error::syntax("mismatched closing bracket")),
                Some(top) if top == opener => break,
                Some(top) if is_opener(&top) => {
                    return Err(Error::syntax("mismatched brackets"));
                }
                Some(top) => self.rpn.push(Token::Op(top)),
            }
        }
        self.bracket_level -= 1;
        self.last_token_was_op = false;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Token>, Error> {
        if self.last_token_was_op {
            if self.rpn.is_empty() {
                return Err(Error::syntax("empty expression"));
            }
            return Err(Error::syntax("expression ends with an operator"));
        }
        while let Some(op) = self.op_stack.pop() {
            if is_opener(&op) {
                return Err(Error::syntax("unclosed bracket"));
            }
            self.rpn.push(Token::Op(op));
        }
        if self.rpn.is_empty() {
            return Err(Error::syntax("empty expression"));
        }
        Ok(self.rpn)
    }
}

/// Close a bracket group from the driver, materializing the empty argument
/// tuple for `f()` / `[]` / `{}` forms.
fn close_group(builder: &mut RpnBuilder, opener: &str) -> Result<(), Error> {
    if builder.last_token_was_op {
        let stack = &builder.op_stack;
        let is_empty_call = stack.len() >= 2
            && stack[stack.len() - 1] == opener
            && stack[stack.len() - 2] == "()";
        if is_empty_call {
            builder.handle_token(Value::Tuple(Vec::new()))?;
        } else {
            return Err(Error::syntax("expected an operand before closing bracket"));
        }
    }
    builder.close_bracket(opener)
}

/// Compile `text` into a postfix queue.
///
/// Stops at end of input, at a NUL byte, at an unmatched closing bracket
/// at bracket level zero, or at a byte from `delimiters` at bracket level
/// zero. Returns the queue together with the offset of the stopping byte
/// (equal to `text.len()` when everything was consumed).
pub(crate) fn to_rpn(
    text: &[u8],
    scope: &Map,
    delimiters: Option<&[u8]>,
    config: &Config,
) -> Result<(Vec<Token>, usize), Error> {
    let mut builder = RpnBuilder::new(scope.clone(), config);
    let len = text.len();
    let mut pos = 0;

    while pos < len {
        let c = text[pos];
        if c == 0 {
            break;
        }
        if builder.bracket_level == 0 && delimiters.is_some_and(|d| d.contains(&c)) {
            break;
        }
        // Reserved characters short-circuit default handling; operator
        // characters are deferred to the operator reader so that
        // registered multi-character operators keep working.
        if !OP_CHARS.contains(&c)
            && let Some(hook) = config.parser.char_hook(c)
        {
            pos = hook(&mut builder, text, pos + 1)?;
            continue;
        }
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'0'..=b'9' => {
                let (value, used) = parse_number(&text[pos..])?;
                builder.handle_token(value)?;
                pos += used;
            }
            b'\'' | b'"' => {
                let (value, used) = parse_string_literal(&text[pos..])?;
                builder.handle_token(value)?;
                pos += used;
            }
            b'/' if text.get(pos + 1) == Some(&b'*') => {
                pos = skip_block_comment(text, pos)?;
            }
            b'(' => {
                if !builder.last_token_was_op {
                    // A call: lower to the "()" operator.
                    builder.handle_op("()")?;
                }
                builder.open_bracket("(");
                pos += 1;
            }
            b')' => {
                if builder.bracket_level == 0 {
                    break;
                }
                close_group(&mut builder, "(")?;
                pos += 1;
            }
            b'[' => {
                if builder.last_token_was_op {
                    // A list literal: lower to a `list` constructor call.
                    builder.handle_var("list")?;
                    builder.handle_op("()")?;
                } else {
                    builder.handle_op("[]")?;
                }
                builder.open_bracket("[");
                pos += 1;
            }
            b']' => {
                if builder.bracket_level == 0 {
                    break;
                }
                close_group(&mut builder, "[")?;
                pos += 1;
            }
            b'{' => {
                if !builder.last_token_was_op {
                    return Err(Error::syntax("unexpected '{'"));
                }
                // A map literal: lower to a `map` constructor call.
                builder.handle_var("map")?;
                builder.handle_op("()")?;
                builder.open_bracket("{");
                pos += 1;
            }
            b'}' => {
                if builder.bracket_level == 0 {
                    break;
                }
                close_group(&mut builder, "{")?;
                pos += 1;
            }
            b'.' => {
                // Member access when an identifier follows; otherwise `.`
                // is an ordinary (possibly host-registered) operator.
                let mut look = pos + 1;
                while look < len && (text[look] == b' ' || text[look] == b'\t') {
                    look += 1;
                }
                builder.handle_op(".")?;
                if look < len && is_var_start(text[look]) {
                    let (name, used) = parse_var(&text[look..])?;
                    builder.handle_token(Value::Str(name))?;
                    pos = look + used;
                } else {
                    pos += 1;
                }
            }
            c if OP_CHARS.contains(&c) => {
                pos = read_operator(&mut builder, text, pos, config)?;
            }
            c if is_var_start(c) => {
                let (name, used) = parse_var(&text[pos..])?;
                if let Some(hook) = config.parser.word(&name) {
                    pos = hook(&mut builder, text, pos + used)?;
                } else {
                    builder.handle_var(&name)?;
                    pos += used;
                }
            }
            other => {
                return Err(Error::Syntax(format!(
                    "unexpected character '{}'",
                    other as char
                )));
            }
        }
    }

    let tokens = builder.finish()?;
    Ok((tokens, pos))
}

/// Read one operator starting at `pos`: the longest run of operator
/// characters, resolved against (in order) the reserved-word table, the
/// precedence table, the reserved-character table for the first byte, and
/// finally shorter prefixes of the run.
fn read_operator(
    builder: &mut RpnBuilder,
    text: &[u8],
    pos: usize,
    config: &Config,
) -> Result<usize, Error> {
    let start = pos;
    let mut end = pos;
    while end < text.len() && OP_CHARS.contains(&text[end]) {
        end += 1;
    }
    let full = String::from_utf8_lossy(&text[start..end]).into_owned();
    if let Some(hook) = config.parser.word(&full) {
        return hook(builder, text, end);
    }
    if config.precedence.exists(&full) {
        builder.handle_op(&full)?;
        return Ok(end);
    }
    if let Some(hook) = config.parser.char_hook(text[start]) {
        return hook(builder, text, start + 1);
    }
    for cut in (start + 1..end).rev() {
        let prefix = String::from_utf8_lossy(&text[start..cut]).into_owned();
        if let Some(hook) = config.parser.word(&prefix) {
            return hook(builder, text, cut);
        }
        if config.precedence.exists(&prefix) {
            builder.handle_op(&prefix)?;
            return Ok(cut);
        }
    }
    Err(Error::Syntax(format!("undefined operator '{full}'")))
}

fn skip_block_comment(text: &[u8], pos: usize) -> Result<usize, Error> {
    let mut i = pos + 2;
    while i + 1 < text.len() {
        if text[i] == 0 {
            break;
        }
        if text[i] == b'*' && text[i + 1] == b'/' {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err(Error::syntax("unterminated block comment"))
}

/// Byte length of the UTF-8 sequence led by `bytes[0]`, validating the
/// structural form: the lead byte's count of leading one bits declares the
/// sequence length, and each continuation byte must match `10xxxxxx`.
fn utf8_sequence_len(bytes: &[u8]) -> Result<usize, Error> {
    let lead = bytes[0];
    let ones = lead.leading_ones() as usize;
    match ones {
        1 => Err(Error::MalformedUtf8(format!(
            "unexpected continuation byte 0x{lead:02x}"
        ))),
        2..=4 => {
            for i in 1..ones {
                match bytes.get(i) {
                    Some(b) if b & 0xC0 == 0x80 => {}
                    Some(_) => {
                        return Err(Error::MalformedUtf8(
                            "subsequent bytes of a multi-byte character must be of the form 10xxxxxx"
                                .into(),
                        ));
                    }
                    None => {
                        return Err(Error::MalformedUtf8(
                            "truncated multi-byte character".into(),
                        ));
                    }
                }
            }
            Ok(ones)
        }
        _ => Err(Error::MalformedUtf8(format!(
            "invalid lead byte 0x{lead:02x}"
        ))),
    }
}

/// Parse an identifier: an ASCII letter, `_`, or a validated multi-byte
/// UTF-8 sequence first, with ASCII digits additionally allowed after the
/// first character. Returns the name and the number of bytes consumed.
pub(crate) fn parse_var(bytes: &[u8]) -> Result<(String, usize), Error> {
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        let size = if c == b'_' || c.is_ascii_alphabetic() {
            1
        } else if c.is_ascii_digit() && pos > 0 {
            1
        } else if c >= 0x80 {
            utf8_sequence_len(&bytes[pos..])?
        } else {
            break;
        };
        pos += size;
    }
    if pos == 0 {
        return Err(Error::syntax("expected an identifier"));
    }
    // Structural validation above admits sequences that are not scalar
    // values (surrogates, overlongs); the strict decode rejects them.
    match std::str::from_utf8(&bytes[..pos]) {
        Ok(name) => Ok((name.to_owned(), pos)),
        Err(_) => Err(Error::MalformedUtf8(
            "identifier is not a valid UTF-8 sequence".into(),
        )),
    }
}

fn nom_hex(input: &[u8]) -> IResult<&[u8], Value> {
    let (input, _) = alt((tag(&b"0x"[..]), tag(&b"0X"[..]))).parse(input)?;
    let (input, digits) = take_while1(|c: u8| c.is_ascii_hexdigit()).parse(input)?;
    let text = String::from_utf8_lossy(digits);
    match i64::from_str_radix(&text, 16) {
        Ok(n) => Ok((input, Value::Int(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::HexDigit,
        ))),
    }
}

fn nom_decimal(input: &[u8]) -> IResult<&[u8], Value> {
    let digits = |c: u8| c.is_ascii_digit();
    let (rest, literal) = recognize((
        take_while1(digits),
        opt(recognize((tag(&b"."[..]), take_while1(digits)))),
        opt(recognize((
            alt((tag(&b"e"[..]), tag(&b"E"[..]))),
            opt(alt((tag(&b"+"[..]), tag(&b"-"[..])))),
            take_while1(digits),
        ))),
    ))
    .parse(input)?;
    let text = String::from_utf8_lossy(literal);
    let value = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().map(Value::Real).ok()
    } else {
        // Decimal literals too large for the integer type degrade to real.
        text.parse::<i64>()
            .map(Value::Int)
            .ok()
            .or_else(|| text.parse::<f64>().map(Value::Real).ok())
    };
    match value {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

/// Parse a numeric literal (decimal integer, real with optional fraction
/// and exponent, or `0x` hexadecimal). Returns the value and consumed
/// byte count.
fn parse_number(input: &[u8]) -> Result<(Value, usize), Error> {
    match alt((nom_hex, nom_decimal)).parse(input) {
        Ok((rest, value)) => Ok((value, input.len() - rest.len())),
        Err(_) => Err(Error::syntax("malformed numeric literal")),
    }
}

/// Parse a quoted string literal starting at the opening quote. Handles
/// the `\\ \' \" \n \t` escapes and backslash line continuation; unknown
/// escapes pass through with their backslash preserved. An unescaped line
/// break fails.
fn parse_string_literal(bytes: &[u8]) -> Result<(Value, usize), Error> {
    let quote = bytes[0];
    let mut pos = 1;
    let mut content: Vec<u8> = Vec::new();
    loop {
        match bytes.get(pos) {
            None | Some(0) => return Err(Error::syntax("unterminated string literal")),
            Some(&c) if c == quote => {
                pos += 1;
                break;
            }
            Some(&b'\n') => {
                return Err(Error::syntax("unescaped line break inside string literal"));
            }
            Some(&b'\\') => {
                match bytes.get(pos + 1) {
                    None | Some(0) => {
                        return Err(Error::syntax("unterminated string literal"));
                    }
                    Some(&escaped) => {
                        match escaped {
                            b'\\' => content.push(b'\\'),
                            b'\'' => content.push(b'\''),
                            b'"' => content.push(b'"'),
                            b'n' => content.push(b'\n'),
                            b't' => content.push(b'\t'),
                            // Line continuation keeps the break.
                            b'\n' => content.push(b'\n'),
                            other => {
                                content.push(b'\\');
                                content.push(other);
                            }
                        }
                        pos += 2;
                    }
                }
            }
            Some(&c) => {
                content.push(c);
                pos += 1;
            }
        }
    }
    match String::from_utf8(content) {
        Ok(s) => Ok((Value::Str(s), pos)),
        Err(_) => Err(Error::MalformedUtf8(
            "string literal is not valid UTF-8".into(),
        )),
    }
}
