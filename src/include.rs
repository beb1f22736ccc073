//! `#include "path"` expansion.
//!
//! Layered above [`crate::lexer::Lexer`]: this type owns a stack of lexer
//! frames and forwards `next_token` calls to the top frame, transparently
//! splicing in an included file's tokens when it sees `include "name"` and
//! popping back to the parent when a frame is exhausted.

use crate::error::LexError;
use crate::lexer::Lexer;
use crate::token::{Keyword, Spanned, Token};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One open source file on the include stack. `Lexer` owns its source text
/// (see its doc comment), so no self-referential borrow is needed here.
struct Frame {
    lexer: Lexer,
    path: Option<PathBuf>,
}

pub struct Includer {
    stack: Vec<Frame>,
    open_paths: HashSet<PathBuf>,
}

impl Includer {
    pub fn new(source: &str) -> Self {
        Includer {
            stack: vec![Frame {
                lexer: Lexer::new(source),
                path: None,
            }],
            open_paths: HashSet::new(),
        }
    }

    pub fn line(&self) -> u32 {
        self.stack.last().map(|f| f.lexer.line()).unwrap_or(0)
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(Spanned {
                    token: Token::Eof,
                    line: 0,
                });
            };

            match frame.lexer.next_token()? {
                Some(Spanned {
                    token: Token::Keyword(Keyword::Include),
                    line,
                }) => {
                    let path_tok = frame.lexer.next_token()?;
                    let path_str = match path_tok {
                        Some(Spanned {
                            token: Token::Str(s),
                            ..
                        }) => s,
                        _ => {
                            return Err(LexError::IncludeIo {
                                line,
                                path: String::new(),
                                reason: "expected a string path after 'include'".to_string(),
                            })
                        }
                    };
                    self.push_include(&path_str, line)?;
                }
                Some(spanned) => return Ok(spanned),
                None => {
                    let finished = self.stack.pop().unwrap();
                    if let Some(path) = finished.path {
                        self.open_paths.remove(&path);
                    }
                    if self.stack.is_empty() {
                        return Ok(Spanned {
                            token: Token::Eof,
                            line: 0,
                        });
                    }
                }
            }
        }
    }

    fn push_include(&mut self, path_str: &str, line: u32) -> Result<(), LexError> {
        let path = Path::new(path_str)
            .canonicalize()
            .map_err(|e| LexError::IncludeIo {
                line,
                path: path_str.to_string(),
                reason: e.to_string(),
            })?;

        if self.open_paths.contains(&path) {
            return Err(LexError::IncludeCycle {
                line,
                path: path_str.to_string(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|e| LexError::IncludeIo {
            line,
            path: path_str.to_string(),
            reason: e.to_string(),
        })?;

        self.open_paths.insert(path.clone());
        self.stack.push(Frame {
            lexer: Lexer::new(contents),
            path: Some(path),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expands_a_single_include() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"print 1\n").unwrap();
        let main_src = format!("include \"{}\"\nprint 2\n", tmp.path().display());
        let mut includer = Includer::new(&main_src);

        let mut seen = Vec::new();
        loop {
            let tok = includer.next_token().unwrap();
            if tok.token == Token::Eof {
                break;
            }
            seen.push(tok.token);
        }

        assert_eq!(
            seen,
            vec![
                Token::Keyword(Keyword::Print),
                Token::Int(1),
                Token::Newline,
                Token::Keyword(Keyword::Print),
                Token::Int(2),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn detects_include_cycles() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let a_path = a.path().display().to_string();
        a.write_all(format!("include \"{a_path}\"\n").as_bytes())
            .unwrap();

        let mut includer = Includer::new(&format!("include \"{a_path}\"\n"));
        let err = loop {
            match includer.next_token() {
                Ok(spanned) if spanned.token == Token::Eof => panic!("expected cycle error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, LexError::IncludeCycle { .. }));
    }
}
