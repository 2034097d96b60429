use std::fmt;

/// A directive or structural marker found in a template.
///
/// A token borrows the template it was found in and remembers the byte
/// range it covers.  Tokens are used to drive code generation and to point
/// errors at the offending piece of source.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Token<'s> {
    template: &'s str,
    start: usize,
    end: usize,
}

impl<'s> Token<'s> {
    /// Creates a token covering `template[start..end]`.
    pub fn new(template: &'s str, start: usize, end: usize) -> Token<'s> {
        debug_assert!(start <= end && end <= template.len());
        Token {
            template,
            start,
            end,
        }
    }

    /// The template this token was found in.
    pub fn template(&self) -> &'s str {
        self.template
    }

    /// Byte offset of the first character of the token.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte offset after the last character of the token.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The source text of the token, delimiters included.
    pub fn content(&self) -> &'s str {
        &self.template[self.start..self.end]
    }

    /// The line the token starts on (1-based).
    pub fn line(&self) -> usize {
        self.template[..self.start].matches('\n').count() + 1
    }

    /// The column the token starts at (0-based, in characters).
    pub fn col(&self) -> usize {
        let before = &self.template[..self.start];
        before[before.rfind('\n').map_or(0, |x| x + 1)..]
            .chars()
            .count()
    }

    /// Is this a `{% ... %}` statement tag?
    pub fn is_statement(&self) -> bool {
        self.content().starts_with("{% ")
    }

    /// Is this a `{{ ... }}` expression tag?
    pub fn is_expression(&self) -> bool {
        self.content().starts_with("{{ ")
    }

    /// The text between the delimiters of a tag.
    ///
    /// For `{{ name }}` this is `name`.
    pub fn inner(&self) -> &'s str {
        let content = self.content();
        content.get(3..content.len().saturating_sub(3)).unwrap_or("")
    }
}

impl<'s> fmt::Debug for Token<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token({:?} @ {}:{})",
            self.content(),
            self.line(),
            self.col()
        )
    }
}

/// Represents a token of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprToken<'a> {
    /// An identifier (also used for keywords).
    Ident(&'a str),
    /// A string literal with escapes resolved.
    Str(String),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A plus (`+`) operator.
    Plus,
    /// A minus (`-`) operator.
    Minus,
    /// A mul (`*`) operator.
    Mul,
    /// A div (`/`) operator.
    Div,
    /// A floor division (`//`) operator.
    FloorDiv,
    /// Power operator (`**`).
    Pow,
    /// A mod (`%`) operator.
    Mod,
    /// A dot operator (`.`)
    Dot,
    /// The comma operator (`,`)
    Comma,
    /// The colon operator (`:`)
    Colon,
    /// The statement separator (`;`)
    Semicolon,
    /// The assignment operator (`=`)
    Assign,
    /// An augmented assignment (`+=`, `-=` ...) with the operator token.
    AugAssign(&'a str),
    /// `==` operator
    Eq,
    /// `!=` operator
    Ne,
    /// `>` operator
    Gt,
    /// `>=` operator
    Gte,
    /// `<` operator
    Lt,
    /// `<=` operator
    Lte,
    /// Open Bracket
    BracketOpen,
    /// Close Bracket
    BracketClose,
    /// Open Parenthesis
    ParenOpen,
    /// Close Parenthesis
    ParenClose,
    /// Open Brace
    BraceOpen,
    /// Close Brace
    BraceClose,
}

impl<'a> fmt::Display for ExprToken<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprToken::Ident(_) => f.write_str("identifier"),
            ExprToken::Str(_) => f.write_str("string"),
            ExprToken::Int(_) => f.write_str("integer"),
            ExprToken::Float(_) => f.write_str("float"),
            ExprToken::Plus => f.write_str("`+`"),
            ExprToken::Minus => f.write_str("`-`"),
            ExprToken::Mul => f.write_str("`*`"),
            ExprToken::Div => f.write_str("`/`"),
            ExprToken::FloorDiv => f.write_str("`//`"),
            ExprToken::Pow => f.write_str("`**`"),
            ExprToken::Mod => f.write_str("`%`"),
            ExprToken::Dot => f.write_str("`.`"),
            ExprToken::Comma => f.write_str("`,`"),
            ExprToken::Colon => f.write_str("`:`"),
            ExprToken::Semicolon => f.write_str("`;`"),
            ExprToken::Assign => f.write_str("`=`"),
            ExprToken::AugAssign(op) => write!(f, "`{op}=`"),
            ExprToken::Eq => f.write_str("`==`"),
            ExprToken::Ne => f.write_str("`!=`"),
            ExprToken::Gt => f.write_str("`>`"),
            ExprToken::Gte => f.write_str("`>=`"),
            ExprToken::Lt => f.write_str("`<`"),
            ExprToken::Lte => f.write_str("`<=`"),
            ExprToken::BracketOpen => f.write_str("`[`"),
            ExprToken::BracketClose => f.write_str("`]`"),
            ExprToken::ParenOpen => f.write_str("`(`"),
            ExprToken::ParenClose => f.write_str("`)`"),
            ExprToken::BraceOpen => f.write_str("`{`"),
            ExprToken::BraceClose => f.write_str("`}`"),
        }
    }
}
