//! Gerber RS-274X tokenizer.
//!
//! Splits the raw stream into extended command blocks (`%...%`, possibly
//! holding several `*`-terminated statements) and plain word commands
//! (`X100Y200D01*`). Each token keeps the line it started on so later stages
//! can report `file:line` diagnostics. `G04` comments are dropped here.

/// Payload of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Statement inside a `%...%` block, e.g. `FSLAX36Y36`, `ADD10C,0.25`, `LPD`.
    Extended(String),
    /// `*`-terminated word command, e.g. `D10`, `X100Y200D01`, `M02`.
    Word(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

fn is_comment(s: &str) -> bool {
    s.starts_with("G04") || s.starts_with("G4 ")
}

/// Tokenize a Gerber file. Newlines are insignificant except for line
/// accounting; statements may span lines (multi-line `%AM` macros do).
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut chars = input.chars().peekable();

    let push = |tokens: &mut Vec<Token>, kind: TokenKind, start_line: usize| {
        let text = match &kind {
            TokenKind::Extended(s) | TokenKind::Word(s) => s,
        };
        if !text.is_empty() && !is_comment(text) {
            tokens.push(Token {
                kind,
                line: start_line,
            });
        }
    };

    while let Some(&ch) = chars.peek() {
        match ch {
            '%' => {
                chars.next();
                let mut stmt = String::new();
                let mut stmt_line = line;
                loop {
                    match chars.next() {
                        Some('%') | None => {
                            let text = stmt.trim().to_string();
                            push(&mut tokens, TokenKind::Extended(text), stmt_line);
                            break;
                        }
                        Some('*') => {
                            let text = stmt.trim().to_string();
                            push(&mut tokens, TokenKind::Extended(text), stmt_line);
                            stmt = String::new();
                            stmt_line = line;
                        }
                        Some('\n') => line += 1,
                        Some('\r') => {}
                        Some(c) => {
                            if stmt.is_empty() {
                                stmt_line = line;
                            }
                            stmt.push(c);
                        }
                    }
                }
            }
            '\n' => {
                line += 1;
                chars.next();
            }
            '\r' | ' ' | '\t' => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                let word_line = line;
                while let Some(&c) = chars.peek() {
                    match c {
                        '*' => {
                            chars.next();
                            break;
                        }
                        '%' => break,
                        '\n' => {
                            line += 1;
                            chars.next();
                        }
                        '\r' => {
                            chars.next();
                        }
                        _ => {
                            word.push(c);
                            chars.next();
                        }
                    }
                }
                push(&mut tokens, TokenKind::Word(word.trim().to_string()), word_line);
            }
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_word_commands() {
        assert_eq!(
            kinds("G01*\nD10*\nX100Y200D01*\nM02*\n"),
            vec![
                TokenKind::Word("G01".into()),
                TokenKind::Word("D10".into()),
                TokenKind::Word("X100Y200D01".into()),
                TokenKind::Word("M02".into()),
            ]
        );
    }

    #[test]
    fn test_extended_commands() {
        assert_eq!(
            kinds("%FSLAX36Y36*%\n%MOMM*%\n%ADD10C,0.25*%\n"),
            vec![
                TokenKind::Extended("FSLAX36Y36".into()),
                TokenKind::Extended("MOMM".into()),
                TokenKind::Extended("ADD10C,0.25".into()),
            ]
        );
    }

    #[test]
    fn test_multiple_statements_per_block() {
        assert_eq!(
            kinds("%FSLAX24Y24*MOMM*%\n"),
            vec![
                TokenKind::Extended("FSLAX24Y24".into()),
                TokenKind::Extended("MOMM".into()),
            ]
        );
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(
            kinds("G04 tool info*\nD10*\n%G04 block comment*%\n"),
            vec![TokenKind::Word("D10".into())]
        );
    }

    #[test]
    fn test_multiline_macro_block() {
        // %AM blocks span lines; each *-terminated statement is one token.
        let input = "%AMRECT21*\n21,1,$1,$2,0,0,$3*\n%\n";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Extended("AMRECT21".into()),
                TokenKind::Extended("21,1,$1,$2,0,0,$3".into()),
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("G01*\nD10*\n%MOMM*%\nX0Y0D02*\n");
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \r\n\t ").is_empty());
    }
}
