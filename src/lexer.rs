//! # Lexer
//!
//! `spec.md` §3.2, §4.C. Single-pass, UTF-8-aware tokenizer. Never backtracks
//! across a token boundary: every branch below either consumes forward or
//! reports a lexical [`crate::diagnostics::Diagnostic`] and skips the
//! offending character so the caller keeps receiving tokens (the parser is
//! responsible for turning a run of lexical errors into a coherent parse
//! failure, not the lexer).
//!
//! Grounded on the teacher's char-dispatch `Lexer` (`examples/jlgrimes-gen`'s
//! `lexer.rs`) — same `Peekable<Chars>` + line/column bookkeeping shape —
//! generalized from the teacher's fixed rhythm-letter alphabet to MFS's
//! keyword/identifier/literal surface.

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::rational::Rat;
use crate::source::{FileId, Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarBeat {
    pub bar: i64,
    pub beat: i64,
    pub sub: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchLit {
    /// MIDI note number, *not* range-clamped — `C10` lexes fine and is
    /// rejected later as `PitchOutOfRange` (§8 boundary behavior), because
    /// range validity is a domain concern, not a lexical one.
    pub midi: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    Import,
    From,
    As,
    Const,
    Let,
    Fn,
    Enum,
    Export,
    Return,
    If,
    Else,
    For,
    In,
    Match,
    True,
    False,
    Null,
    Score,
    Clip,
    Tempo,
    Meter,
    Sound,
    Track,
    Place,
    Note,
    Chord,
    Rest,
    Hit,
    Cc,
    Automation,
    Marker,
    Kind,
    Role,
    Label,
}

impl Keyword {
    fn lookup(ident: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match ident {
            "import" => Import,
            "from" => From,
            "as" => As,
            "const" => Const,
            "let" => Let,
            "fn" => Fn,
            "enum" => Enum,
            "export" => Export,
            "return" => Return,
            "if" => If,
            "else" => Else,
            "for" => For,
            "in" => In,
            "match" => Match,
            "true" => True,
            "false" => False,
            "null" => Null,
            "score" => Score,
            "clip" => Clip,
            "tempo" => Tempo,
            "meter" => Meter,
            "sound" => Sound,
            "track" => Track,
            "place" => Place,
            "note" => Note,
            "chord" => Chord,
            "rest" => Rest,
            "hit" => Hit,
            "cc" => Cc,
            "automation" => Automation,
            "marker" => Marker,
            "kind" => Kind,
            "role" => Role,
            "label" => Label,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    Str(String),
    Pitch(PitchLit),
    Duration(Rat),
    BarBeat(BarBeat),
    Ident(String),
    Keyword(Keyword),

    // Template literal segments: a template with N interpolations lexes as
    // TemplateHead, then N-1 TemplateMiddle, then TemplateTail (or just
    // TemplateFull when there are no interpolations at all).
    TemplateFull(String),
    TemplateHead(String),
    TemplateMiddle(String),
    TemplateTail(String),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    DotDot,
    DotDotEq,
    Arrow,    // ->
    FatArrow, // =>

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,

    Question,
    QuestionDot,
    QuestionQuestion,
    QuestionLBracket,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

/// One entry in the template-literal nesting stack: tracks the brace depth
/// of the `${ ... }` we're currently inside, so a closing `}` that matches
/// depth zero resumes string-segment scanning instead of ending a block.
struct TemplateFrame {
    brace_depth: u32,
}

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: u32,
    column: u32,
    file: FileId,
    template_stack: Vec<TemplateFrame>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file: FileId) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            column: 1,
            file,
            template_stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn pos(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            byte_offset: self.position as u32,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char_at(&self, skip_chars: usize) -> Option<char> {
        self.rest().chars().nth(skip_chars)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            if pred(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn is_ident_start(c: char) -> bool {
        c.is_alphabetic() || c == '_'
    }

    fn is_ident_continue(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' || c == '\n' => {
                    self.bump();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek_char() {
                            None => break,
                            Some('*') if self.peek_char_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Tokenize the whole input. Always returns a token stream ending in
    /// `TokenKind::Eof` (§8 invariant: tokenization is total).
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos();
            let Some(c) = self.peek_char() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: Span::point(start, self.file),
                });
                break;
            };

            let kind = if c == '`' {
                self.lex_template_start()
            } else if c == '}' && self.template_stack.last().is_some_and(|f| f.brace_depth == 0) {
                self.template_stack.pop();
                self.lex_template_continuation()
            } else if c == '"' {
                self.lex_string(start)
            } else if c.is_ascii_digit() {
                self.lex_number_or_position(start)
            } else if "ABCDEFG".contains(c) {
                self.try_pitch(c).or_else(|| self.lex_ident())
            } else if "whqestx".contains(c) {
                self.try_duration_letter(c).or_else(|| self.lex_ident())
            } else if Self::is_ident_start(c) {
                self.lex_ident()
            } else {
                self.lex_punct(start)
            };

            if let Some(kind) = kind {
                let lexeme = self.input[start.byte_offset as usize..self.position].to_string();
                let span = Span::new(start, self.pos(), self.file);
                if matches!(kind, TokenKind::LBrace) {
                    if let Some(frame) = self.template_stack.last_mut() {
                        frame.brace_depth += 1;
                    }
                }
                if matches!(kind, TokenKind::RBrace) {
                    if let Some(frame) = self.template_stack.last_mut() {
                        if frame.brace_depth > 0 {
                            frame.brace_depth -= 1;
                        }
                    }
                }
                tokens.push(Token { kind, lexeme, span });
            }
        }
        (tokens, self.diagnostics)
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    // ---- literals -----------------------------------------------------

    fn lex_ident(&mut self) -> Option<TokenKind> {
        let s = self.eat_while(Self::is_ident_continue);
        if let Some(kw) = Keyword::lookup(&s) {
            Some(TokenKind::Keyword(kw))
        } else {
            Some(TokenKind::Ident(s))
        }
    }

    /// Pitch literals (`[A-G](#|b)?-?[0-9]+`). Context-sensitive: only
    /// consumed when the character right after the match is not an
    /// identifier-continuation character, so `Cmaj` still lexes as a single
    /// identifier (§3.2, §4.C).
    fn try_pitch(&mut self, letter: char) -> Option<TokenKind> {
        let chars: Vec<char> = self.rest().chars().collect();
        let mut idx = 1usize;
        let mut accidental = 0i32;
        if let Some(&next) = chars.get(idx) {
            if next == '#' {
                accidental = 1;
                idx += 1;
            } else if next == 'b' {
                accidental = -1;
                idx += 1;
            }
        }
        let mut neg = false;
        if chars.get(idx) == Some(&'-') {
            neg = true;
            idx += 1;
        }
        let digit_begin = idx;
        while chars.get(idx).is_some_and(|c| c.is_ascii_digit()) {
            idx += 1;
        }
        if idx == digit_begin {
            return None;
        }
        if chars.get(idx).is_some_and(|&c| Self::is_ident_continue(c)) {
            return None;
        }
        let digits: String = chars[digit_begin..idx].iter().collect();
        let octave: i32 = digits.parse().ok()?;
        let octave = if neg { -octave } else { octave };
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => unreachable!(),
        };
        // C4 == MIDI 60: octave n places C at (n + 1) * 12.
        let midi = (octave + 1) * 12 + base + accidental;
        for _ in 0..idx {
            self.bump();
        }
        Some(TokenKind::Pitch(PitchLit { midi }))
    }

    fn try_duration_letter(&mut self, letter: char) -> Option<TokenKind> {
        let chars: Vec<char> = self.rest().chars().collect();
        let mut idx = 1usize;
        let mut dots = 0u32;
        while chars.get(idx) == Some(&'.') {
            dots += 1;
            idx += 1;
        }
        if chars.get(idx).is_some_and(|&c| Self::is_ident_continue(c)) {
            return None;
        }
        let base = match letter {
            'w' => Rat::make(1, 1).unwrap(),
            'h' => Rat::make(1, 2).unwrap(),
            'q' => Rat::make(1, 4).unwrap(),
            'e' => Rat::make(1, 8).unwrap(),
            's' => Rat::make(1, 16).unwrap(),
            't' => Rat::make(1, 32).unwrap(),
            'x' => Rat::make(1, 64).unwrap(),
            _ => return None,
        };
        let value = apply_dots(base, dots);
        for _ in 0..idx {
            self.bump();
        }
        Some(TokenKind::Duration(value))
    }

    fn lex_number_or_position(&mut self, start: Position) -> Option<TokenKind> {
        let int_part = self.eat_while(|c| c.is_ascii_digit() || c == '_');

        // bar:beat[:sub]
        if self.peek_char() == Some(':') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            return self.lex_bar_beat(&int_part, start);
        }

        // {n}/{d} duration, only when what follows the slash is itself digits
        // (distinguishes `1/4` the duration from `1` followed by a division).
        if self.peek_char() == Some('/') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump(); // '/'
            let denom_digits = self.eat_while(|c| c.is_ascii_digit() || c == '_');
            let n: i64 = int_part.replace('_', "").parse().ok()?;
            let d: i64 = denom_digits.replace('_', "").parse().ok()?;
            return match Rat::make(n, d) {
                Ok(r) => Some(TokenKind::Duration(r)),
                Err(_) => {
                    let span = Span::new(start, self.pos(), self.file);
                    self.error(DiagnosticCode::InvalidNumber, "duration with zero denominator", span);
                    None
                }
            };
        }

        // {n}t ticks shorthand (e.g. `480t`), distinct from the bare `t`
        // duration letter, which has no leading digits.
        if self.peek_char() == Some('t') && !self.peek_char_at(1).is_some_and(Self::is_ident_continue) {
            self.bump();
            let ticks: i64 = int_part.replace('_', "").parse().ok()?;
            const PPQ: i64 = 480;
            return Rat::make(ticks, PPQ * 4).ok().map(TokenKind::Duration);
        }

        let mut is_float = false;
        let mut frac_part = String::new();
        if self.peek_char() == Some('.') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            frac_part = self.eat_while(|c| c.is_ascii_digit() || c == '_');
        }
        let mut exp_part = String::new();
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let save = (self.position, self.line, self.column);
            let mut tmp = String::new();
            tmp.push(self.bump().unwrap());
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                tmp.push(self.bump().unwrap());
            }
            let digits = self.eat_while(|c| c.is_ascii_digit());
            if digits.is_empty() {
                self.position = save.0;
                self.line = save.1;
                self.column = save.2;
            } else {
                is_float = true;
                tmp.push_str(&digits);
                exp_part = tmp;
            }
        }

        if int_part.is_empty() {
            let span = Span::new(start, self.pos(), self.file);
            self.error(DiagnosticCode::InvalidNumber, "expected a digit", span);
            return None;
        }

        if is_float {
            let text = format!("{}.{}{}", int_part.replace('_', ""), frac_part.replace('_', ""), exp_part);
            match text.parse::<f64>() {
                Ok(v) => Some(TokenKind::Float(v)),
                Err(_) => {
                    let span = Span::new(start, self.pos(), self.file);
                    self.error(DiagnosticCode::InvalidNumber, format!("invalid float literal '{text}'"), span);
                    None
                }
            }
        } else {
            match int_part.replace('_', "").parse::<i64>() {
                Ok(v) => Some(TokenKind::Integer(v)),
                Err(_) => {
                    let span = Span::new(start, self.pos(), self.file);
                    self.error(DiagnosticCode::InvalidNumber, format!("invalid integer literal '{int_part}'"), span);
                    None
                }
            }
        }
    }

    fn lex_bar_beat(&mut self, bar_digits: &str, start: Position) -> Option<TokenKind> {
        self.bump(); // ':'
        let beat_digits = self.eat_while(|c| c.is_ascii_digit());
        if beat_digits.is_empty() {
            let span = Span::new(start, self.pos(), self.file);
            self.error(DiagnosticCode::InvalidNumber, "expected beat digits after ':'", span);
            return None;
        }
        let mut sub = None;
        if self.peek_char() == Some(':') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            let sub_digits = self.eat_while(|c| c.is_ascii_digit());
            sub = sub_digits.parse().ok();
        }
        let bar: i64 = bar_digits.parse().ok()?;
        let beat: i64 = beat_digits.parse().ok()?;
        Some(TokenKind::BarBeat(BarBeat { bar, beat, sub }))
    }

    fn lex_string(&mut self, start: Position) -> Option<TokenKind> {
        self.bump(); // opening quote
        match self.lex_string_body('"') {
            Ok(s) => Some(TokenKind::Str(s)),
            Err(()) => {
                let span = Span::new(start, self.pos(), self.file);
                self.error(DiagnosticCode::UnterminatedString, "unterminated string literal", span);
                None
            }
        }
    }

    /// Consumes characters until `terminator`, resolving escapes, and leaves
    /// the closing terminator consumed. Returns `Err(())` on EOF before the
    /// terminator.
    fn lex_string_body(&mut self, terminator: char) -> Result<String, ()> {
        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(()),
                Some(c) if c == terminator => {
                    self.bump();
                    return Ok(s);
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some('\\') => s.push('\\'),
                        Some('"') => s.push('"'),
                        Some('`') => s.push('`'),
                        Some('$') => s.push('$'),
                        Some('0') => s.push('\0'),
                        Some(other) => {
                            let span = Span::point(self.pos(), self.file);
                            self.error(
                                DiagnosticCode::InvalidEscape,
                                format!("invalid escape sequence '\\{other}'"),
                                span,
                            );
                        }
                        None => return Err(()),
                    }
                }
                Some(c) => {
                    self.bump();
                    s.push(c);
                }
            }
        }
    }

    /// Begin a template literal at the opening backtick.
    fn lex_template_start(&mut self) -> Option<TokenKind> {
        self.bump(); // '`'
        self.lex_template_segment(true)
    }

    /// Resume a template literal after a `${...}` interpolation's closing `}`
    /// (already consumed by the caller).
    fn lex_template_continuation(&mut self) -> Option<TokenKind> {
        self.lex_template_segment(false)
    }

    fn lex_template_segment(&mut self, is_head: bool) -> Option<TokenKind> {
        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => {
                    let span = Span::point(self.pos(), self.file);
                    self.error(DiagnosticCode::UnterminatedString, "unterminated template literal", span);
                    return None;
                }
                Some('`') => {
                    self.bump();
                    return Some(if is_head {
                        TokenKind::TemplateFull(s)
                    } else {
                        TokenKind::TemplateTail(s)
                    });
                }
                Some('$') if self.peek_char_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    self.template_stack.push(TemplateFrame { brace_depth: 0 });
                    return Some(if is_head {
                        TokenKind::TemplateHead(s)
                    } else {
                        TokenKind::TemplateMiddle(s)
                    });
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('`') => s.push('`'),
                        Some('$') => s.push('$'),
                        Some('\\') => s.push('\\'),
                        Some(other) => s.push(other),
                        None => {}
                    }
                }
                Some(c) => {
                    self.bump();
                    s.push(c);
                }
            }
        }
    }

    // ---- punctuation ----------------------------------------------------

    fn lex_punct(&mut self, start: Position) -> Option<TokenKind> {
        let c = self.bump().unwrap();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => {
                if self.peek_char() == Some('.') {
                    self.bump();
                    if self.peek_char() == Some('=') {
                        self.bump();
                        TokenKind::DotDotEq
                    } else {
                        TokenKind::DotDot
                    }
                } else {
                    TokenKind::Dot
                }
            }
            '+' => TokenKind::Plus,
            '-' => {
                if self.peek_char() == Some('>') {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else if self.peek_char() == Some('>') {
                    self.bump();
                    TokenKind::FatArrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' if self.peek_char() == Some('&') => {
                self.bump();
                TokenKind::AndAnd
            }
            '|' if self.peek_char() == Some('|') => {
                self.bump();
                TokenKind::OrOr
            }
            '?' => {
                if self.peek_char() == Some('.') {
                    self.bump();
                    TokenKind::QuestionDot
                } else if self.peek_char() == Some('?') {
                    self.bump();
                    TokenKind::QuestionQuestion
                } else if self.peek_char() == Some('[') {
                    self.bump();
                    TokenKind::QuestionLBracket
                } else {
                    TokenKind::Question
                }
            }
            other => {
                let span = Span::new(start, self.pos(), self.file);
                self.error(DiagnosticCode::UnexpectedChar, format!("unexpected character '{other}'"), span);
                return None;
            }
        };
        Some(kind)
    }
}

fn apply_dots(base: Rat, dots: u32) -> Rat {
    let mut total = base;
    let mut addend = base;
    for _ in 0..dots {
        addend = addend.div(Rat::from_int(2)).unwrap();
        total = total.add(addend);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let lexer = Lexer::new(src, FileId(0));
        let (tokens, diags) = lexer.tokenize();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_keywords_and_identifiers() {
        let k = kinds("const x = foo;");
        assert_eq!(
            k,
            vec![
                TokenKind::Keyword(Keyword::Const),
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Ident("foo".into()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn pitch_literal_c4_is_midi_60() {
        let k = kinds("C4");
        assert_eq!(k, vec![TokenKind::Pitch(PitchLit { midi: 60 }), TokenKind::Eof]);
    }

    #[test]
    fn pitch_boundaries() {
        let k = kinds("C-1");
        assert_eq!(k, vec![TokenKind::Pitch(PitchLit { midi: 0 }), TokenKind::Eof]);
        let k = kinds("G9");
        assert_eq!(k, vec![TokenKind::Pitch(PitchLit { midi: 127 }), TokenKind::Eof]);
    }

    #[test]
    fn identifier_starting_with_note_letter_but_longer_is_ident() {
        let k = kinds("Cmaj");
        assert_eq!(k, vec![TokenKind::Ident("Cmaj".into()), TokenKind::Eof]);
    }

    #[test]
    fn duration_fraction_literal() {
        let k = kinds("1/4");
        assert_eq!(k, vec![TokenKind::Duration(Rat::make(1, 4).unwrap()), TokenKind::Eof]);
    }

    #[test]
    fn duration_letter_with_dot() {
        let k = kinds("q.");
        assert_eq!(k, vec![TokenKind::Duration(Rat::make(3, 8).unwrap()), TokenKind::Eof]);
    }

    #[test]
    fn bar_beat_literal_with_sub() {
        let k = kinds("2:3:240");
        assert_eq!(
            k,
            vec![
                TokenKind::BarBeat(BarBeat { bar: 2, beat: 3, sub: Some(240) }),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn division_is_not_confused_with_fraction_duration() {
        let k = kinds("a / b");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Slash,
                TokenKind::Ident("b".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn string_escape_sequences() {
        let k = kinds(r#""a\nb""#);
        assert_eq!(k, vec![TokenKind::Str("a\nb".into()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_reports_diagnostic() {
        let lexer = Lexer::new("\"abc", FileId(0));
        let (_tokens, diags) = lexer.tokenize();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnterminatedString);
    }

    #[test]
    fn template_literal_with_one_interpolation() {
        let k = kinds("`hi ${name}!`");
        assert_eq!(
            k,
            vec![
                TokenKind::TemplateHead("hi ".into()),
                TokenKind::Ident("name".into()),
                TokenKind::TemplateTail("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn template_literal_with_nested_braces_in_interpolation() {
        let k = kinds("`x=${ {a:1}.a }`");
        assert!(matches!(k.first(), Some(TokenKind::TemplateHead(_))));
        assert!(matches!(k.last(), Some(TokenKind::Eof)));
        assert!(k.iter().any(|t| matches!(t, TokenKind::TemplateTail(_))));
    }

    #[test]
    fn comments_are_discarded() {
        let k = kinds("1 // comment\n2 /* block */ 3");
        assert_eq!(
            k,
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Integer(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn barbeat_time_literal() {
        let k = kinds("1:1");
        assert_eq!(k, vec![TokenKind::BarBeat(BarBeat { bar: 1, beat: 1, sub: None }), TokenKind::Eof]);
    }
}
