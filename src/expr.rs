//! Condition and assignment rewriting.
//!
//! Expressions arrive in the host's C-like syntax (`IN[3] && x != 2`). Each
//! dialect owns a [`RewriteTable`]; the tokenizer and the re-joining are shared.

/// A lexical token of a host expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Number(String),
    Str(String),
    Symbol(String),
    Space,
}

const MULTI_CHAR_SYMBOLS: [&str; 7] = ["==", "!=", "<>", "<=", ">=", "&&", "||"];

/// Splits `src` into tokens. Unknown characters become single-char symbols.
pub fn tokenize(src: &str) -> Vec<Token> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token::Space);
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent part, e.g. 1e-3.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            tokens.push(Token::Str(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            match MULTI_CHAR_SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
                Some(sym) => {
                    i += 2;
                    tokens.push(Token::Symbol(sym.to_string()));
                }
                None => {
                    i += 1;
                    tokens.push(Token::Symbol(c.to_string()));
                }
            }
        }
    }
    tokens
}

/// A single substitution applied to the token stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    /// Replace an identifier that matches `from` exactly.
    Word { from: String, to: String },
    /// Replace an operator. Alphabetic replacements are padded with spaces.
    Symbol { from: String, to: String },
    /// Rewrite `name[n]` as `prefix` + `n`, e.g. `IN[3]` -> `di3`.
    Indexed { name: String, prefix: String },
}

/// An ordered set of rewrite rules for one dialect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteTable {
    rules: Vec<Rule>,
}

impl RewriteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn word(mut self, from: &str, to: &str) -> Self {
        self.rules.push(Rule::Word {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn symbol(mut self, from: &str, to: &str) -> Self {
        self.rules.push(Rule::Symbol {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn indexed(mut self, name: &str, prefix: &str) -> Self {
        self.rules.push(Rule::Indexed {
            name: name.to_string(),
            prefix: prefix.to_string(),
        });
        self
    }

    /// Expression syntax of KUKA KRL.
    pub fn krl() -> Self {
        Self::new()
            .word("True", "TRUE")
            .word("true", "TRUE")
            .word("False", "FALSE")
            .word("false", "FALSE")
            .word("IN", "$IN")
            .word("OUT", "$OUT")
            .symbol("!=", "<>")
            .symbol("&&", "AND")
            .symbol("||", "OR")
            .symbol("!", "NOT")
    }

    /// Expression syntax of ABB RAPID.
    pub fn rapid() -> Self {
        Self::new()
            .word("True", "TRUE")
            .word("true", "TRUE")
            .word("False", "FALSE")
            .word("false", "FALSE")
            .indexed("IN", "di")
            .indexed("OUT", "do")
            .symbol("==", "=")
            .symbol("!=", "<>")
            .symbol("&&", "AND")
            .symbol("||", "OR")
            .symbol("!", "NOT")
    }

    /// Expression syntax of URScript (Python-like).
    pub fn urscript() -> Self {
        Self::new()
            .word("TRUE", "True")
            .word("true", "True")
            .word("FALSE", "False")
            .word("false", "False")
            .word("AND", "and")
            .word("OR", "or")
            .word("NOT", "not")
            .symbol("<>", "!=")
            .symbol("&&", "and")
            .symbol("||", "or")
            .symbol("!", "not")
    }

    /// Tokenizes `src`, applies every rule, and joins the result.
    pub fn rewrite(&self, src: &str) -> String {
        let mut tokens = tokenize(src);
        for rule in &self.rules {
            tokens = apply(rule, tokens);
        }
        join(&tokens)
    }
}

fn apply(rule: &Rule, tokens: Vec<Token>) -> Vec<Token> {
    match rule {
        Rule::Word { from, to } => tokens
            .into_iter()
            .map(|t| match t {
                Token::Word(w) if w == *from => Token::Word(to.clone()),
                other => other,
            })
            .collect(),
        Rule::Symbol { from, to } => tokens
            .into_iter()
            .flat_map(|t| match t {
                Token::Symbol(s) if s == *from => {
                    if to.chars().all(|c| c.is_alphabetic()) {
                        vec![Token::Space, Token::Word(to.clone()), Token::Space]
                    } else {
                        vec![Token::Symbol(to.clone())]
                    }
                }
                other => vec![other],
            })
            .collect(),
        Rule::Indexed { name, prefix } => {
            let mut out = Vec::with_capacity(tokens.len());
            let mut i = 0;
            while i < tokens.len() {
                if let [
                    Token::Word(w),
                    Token::Symbol(open),
                    Token::Number(n),
                    Token::Symbol(close),
                    ..,
                ] = &tokens[i..]
                    && w == name
                    && open == "["
                    && close == "]"
                {
                    out.push(Token::Word(format!("{prefix}{n}")));
                    i += 4;
                } else {
                    out.push(tokens[i].clone());
                    i += 1;
                }
            }
            out
        }
    }
}

/// Re-joins tokens, collapsing whitespace runs to one space and trimming the ends.
fn join(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut pending_space = false;
    for token in tokens {
        let text = match token {
            Token::Space => {
                pending_space = true;
                continue;
            }
            Token::Word(s) | Token::Number(s) | Token::Str(s) | Token::Symbol(s) => s,
        };
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push_str(text);
    }
    out
}
