use crate::error::{ErrorKind, LispError, Result};
use crate::eval::Machine;
use crate::heap::Heap;
use crate::io::InFrame;
use crate::symbol::{sym, SymbolTable};
use crate::value::Value;

fn bad_input(detail: &str) -> LispError {
    LispError::with_msg(
        ErrorKind::Read,
        None,
        None,
        format!("{} ({})", ErrorKind::Read.message(), detail),
    )
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'[' | b']' | b'"' | b'\'')
}

/// Parses source text from an input frame into cells and symbols.
pub struct Reader<'a> {
    input: &'a mut InFrame,
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    depth: usize,
    max_depth: usize,
}

impl<'a> Reader<'a> {
    /// `max_depth` bounds the nesting of lists and quotes.
    pub fn new(
        input: &'a mut InFrame,
        heap: &'a mut Heap,
        symbols: &'a mut SymbolTable,
        max_depth: usize,
    ) -> Self {
        Reader {
            input,
            heap,
            symbols,
            depth: 0,
            max_depth,
        }
    }

    /// Read one expression. Returns None at end of input.
    pub fn read(&mut self) -> Result<Option<Value>> {
        self.skip_whitespace_and_comments()?;
        if self.peek()?.is_none() {
            return Ok(None);
        }
        self.read_expr().map(Some)
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        self.input.peek()
    }

    fn advance(&mut self) -> Result<Option<u8>> {
        self.input.next_byte()
    }

    fn expect_byte(&mut self, what: &str) -> Result<u8> {
        self.advance()?.ok_or_else(|| bad_input(what))
    }

    /// Skip whitespace, `# line` comments and `#{ block }#` comments.
    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            match self.peek()? {
                Some(b) if b.is_ascii_whitespace() => {
                    self.advance()?;
                }
                Some(b'#') => {
                    self.advance()?;
                    if self.peek()? == Some(b'{') {
                        self.skip_block_comment()?;
                    } else {
                        while let Some(b) = self.advance()? {
                            if b == b'\n' {
                                break;
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        self.advance()?; // '{'
        let mut prev = 0;
        loop {
            let b = self.expect_byte("unterminated comment")?;
            if prev == b'}' && b == b'#' {
                return Ok(());
            }
            prev = b;
        }
    }

    fn read_expr(&mut self) -> Result<Value> {
        self.skip_whitespace_and_comments()?;
        let b = self
            .peek()?
            .ok_or_else(|| bad_input("unexpected end of input"))?;
        match b {
            b'(' => self.nested(|r| r.read_list(b')')),
            b'[' => self.nested(|r| r.read_list(b']')),
            b')' | b']' => {
                self.advance()?;
                Err(bad_input("unexpected closing bracket"))
            }
            b'\'' => self.nested(Self::read_quote),
            b'"' => self.read_string(),
            _ => self.read_word(Vec::new()),
        }
    }

    fn nested(&mut self, read: impl FnOnce(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth >= self.max_depth {
            return Err(bad_input("nested too deeply"));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    /// Read a list: `(a b c)`, `(a . b)`, or the circular `(a b .)`.
    fn read_list(&mut self, close: u8) -> Result<Value> {
        self.advance()?;
        let mut elements = Vec::new();
        let mut tail = Value::NIL;
        let mut circular = false;

        loop {
            self.skip_whitespace_and_comments()?;
            match self.peek()? {
                None => return Err(bad_input("unterminated list")),
                Some(b) if b == close => {
                    self.advance()?;
                    break;
                }
                Some(b')') | Some(b']') => {
                    self.advance()?;
                    return Err(bad_input("mismatched closing bracket"));
                }
                Some(b'.') => {
                    self.advance()?;
                    let next = self.peek()?;
                    if next.map_or(false, |b| !is_delimiter(b)) {
                        elements.push(self.read_word(vec![b'.'])?);
                        continue;
                    }
                    if elements.is_empty() {
                        return Err(bad_input("dot without a head"));
                    }
                    self.skip_whitespace_and_comments()?;
                    if self.peek()? == Some(close) {
                        circular = true;
                    } else {
                        tail = self.read_expr()?;
                        self.skip_whitespace_and_comments()?;
                        if self.peek()? != Some(close) {
                            return Err(bad_input("expected end of list after dotted tail"));
                        }
                    }
                    self.advance()?;
                    break;
                }
                Some(_) => elements.push(self.read_expr()?),
            }
        }

        let mut result = tail;
        let mut last = None;
        for &val in elements.iter().rev() {
            result = self.heap.cons(val, result)?;
            if last.is_none() {
                last = result.as_cell();
            }
        }
        if let (true, Some(last)) = (circular, last) {
            self.heap.set_cdr(last, result);
        }
        Ok(result)
    }

    /// `'x` reads as `(quote . x)`.
    fn read_quote(&mut self) -> Result<Value> {
        self.advance()?;
        let expr = self.read_expr()?;
        self.heap.cons(Value::symbol(sym::QUOTE), expr)
    }

    /// Read a string. `\` takes the next character literally (`\n`, `\t` and
    /// `\r` name control characters), `^X` is the control character of X.
    fn read_string(&mut self) -> Result<Value> {
        self.advance()?;
        let mut bytes = Vec::new();
        loop {
            match self.expect_byte("unterminated string")? {
                b'"' => break,
                b'\\' => bytes.push(match self.expect_byte("unterminated string")? {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    other => other,
                }),
                b'^' => {
                    let c = self.expect_byte("unterminated string")?;
                    bytes.push(if c == b'?' { 0x7f } else { c & 0x1f });
                }
                b => bytes.push(b),
            }
        }
        let s = String::from_utf8(bytes).map_err(|_| bad_input("invalid UTF-8 in string"))?;
        Ok(self.symbols.string(&s))
    }

    /// Read a number or symbol name. A backslash escapes the next byte.
    fn read_word(&mut self, mut bytes: Vec<u8>) -> Result<Value> {
        let mut escaped = false;
        while let Some(b) = self.peek()? {
            if b == b'\\' {
                self.advance()?;
                bytes.push(self.expect_byte("escape at end of input")?);
                escaped = true;
                continue;
            }
            if is_delimiter(b) {
                break;
            }
            bytes.push(b);
            self.advance()?;
        }
        let word = String::from_utf8(bytes).map_err(|_| bad_input("invalid UTF-8 in symbol"))?;
        if !escaped {
            if let Some(n) = self.parse_number(&word)? {
                return Ok(n);
            }
        }
        Ok(Value::symbol(self.symbols.intern(&word)))
    }

    /// An optionally signed run of decimal digits.
    fn parse_number(&mut self, word: &str) -> Result<Option<Value>> {
        let digits = word.strip_prefix(|c| c == '-' || c == '+').unwrap_or(word);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }
        match word.parse::<i64>().ok().and_then(Value::try_boxed) {
            Some(n) => Ok(Some(n)),
            None => {
                let culprit = self.symbols.string(word);
                Err(LispError::new(ErrorKind::Overflow, None, Some(culprit)))
            }
        }
    }
}

impl Machine {
    /// Read one expression from the current input; `None` at its end.
    pub fn read(&mut self) -> Result<Option<Value>> {
        let max_depth = self.config.max_depth;
        let input = match self.ins.last_mut() {
            Some(frame) => frame,
            None => &mut self.stdin,
        };
        Reader::new(input, &mut self.heap, &mut self.symbols, max_depth).read()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::Config;

    fn read_one(src: &str) -> (Machine, Result<Option<Value>>) {
        let mut m = Machine::new(Config::default()).unwrap();
        m.push_input(InFrame::from_text(src));
        let v = m.read();
        (m, v)
    }

    #[rstest]
    #[case("(a b c)", "(a b c)")]
    #[case("[a (b)]", "(a (b))")]
    #[case("(a . b)", "(a . b)")]
    #[case("(1 2 . (3))", "(1 2 3)")]
    #[case("'x", "'x")]
    #[case("(quote . x)", "'x")]
    #[case("  # note\n  (a #{ block\n comment }# b)", "(a b)")]
    #[case("-42", "-42")]
    #[case("+7", "7")]
    #[case("-", "-")]
    #[case("1a", "1a")]
    #[case("(.5 .)", "(.5 .)")]
    #[case("\"a^Jb\"", "\"a^Jb\"")]
    #[case("\"say \\\"hi\\\"\"", "\"say \\\"hi\\\"\"")]
    #[case("\"\"", "NIL")]
    #[case("a\\ b", "a\\ b")]
    #[case("()", "NIL")]
    fn reads_and_prints_back(#[case] src: &str, #[case] expected: &str) {
        let (m, v) = read_one(src);
        let v = v.unwrap().unwrap();
        assert_eq!(m.print_string(v), expected);
    }

    #[test]
    fn circular_list_closes_on_its_head() {
        let (m, v) = read_one("(a b .)");
        let v = v.unwrap().unwrap();
        let cell = v.as_cell().unwrap();
        let second = m.heap.cdr(cell).as_cell().unwrap();
        assert_eq!(m.heap.cdr(second), v);
    }

    #[test]
    fn numbers_are_immediates_and_symbols_are_interned() {
        let (mut m, v) = read_one("12");
        assert_eq!(v.unwrap(), Some(Value::boxed(12)));
        m.push_input(InFrame::from_text("foo foo"));
        let a = m.read().unwrap().unwrap();
        let b = m.read().unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(m.read().unwrap(), None);
    }

    #[rstest]
    #[case("(a b", ErrorKind::Read)]
    #[case("\"open", ErrorKind::Read)]
    #[case(")", ErrorKind::Read)]
    #[case("(a . b c)", ErrorKind::Read)]
    #[case("#{ never closed", ErrorKind::Read)]
    #[case("99999999999999999999", ErrorKind::Overflow)]
    fn malformed_input_is_rejected(#[case] src: &str, #[case] kind: ErrorKind) {
        let (_, v) = read_one(src);
        assert_eq!(v.unwrap_err().kind(), Some(kind));
    }

    #[rstest]
    #[case("(")]
    #[case("'(")]
    #[case("[")]
    fn deep_nesting_is_a_read_error(#[case] open: &str) {
        let src = format!("{}{}", open.repeat(100_000), ")".repeat(100_000));
        let (mut m, v) = read_one(&src);
        let err = v.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Read));
        assert!(m.describe(&err).contains("nested too deeply"));
        m.pop_input();
        assert_eq!(m.eval_str("(+ 1 2)").unwrap(), Value::boxed(3));
    }

    #[test]
    fn nesting_up_to_the_limit_reads() {
        let mut m = Machine::new(Config {
            max_depth: 40,
            ..Config::default()
        })
        .unwrap();
        m.push_input(InFrame::from_text(&format!("{}{}", "(".repeat(40), ")".repeat(40))));
        assert!(m.read().is_ok());
        m.push_input(InFrame::from_text(&format!("{}{}", "(".repeat(41), ")".repeat(41))));
        assert_eq!(m.read().unwrap_err().kind(), Some(ErrorKind::Read));
    }
}
