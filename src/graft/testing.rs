//! Test tokenizer and token vocabulary.
//!
//! The engine proper never parses text; it consumes a tree from an
//! external tokenizer. This module is that collaborator for the test
//! suites: a logos lexer over a deliberately small surface syntax of
//! single-letter words, parenthesized groups and braced blocks,
//! producing `Top(File(Group …))` trees.
//!
//! Shapes:
//!
//! - file contents always sit in one `Group` under `File`; an opening
//!   paren at the very start of the file makes that group explicit
//!   rather than nesting a second one;
//! - `( … )` elsewhere creates a `Group` child;
//! - `{ … }` creates a `Block`, which owns a scope; its contents attach
//!   directly, so `{A B}` is `Block(A B)`.

use std::collections::HashMap;

use logos::Logos;
use once_cell::sync::Lazy;

use crate::graft::location::{Location, Source, SourceRef};
use crate::graft::node::Node;
use crate::graft::token::{Token, TokenDef, TokenFlags, TOP};

// Structural vocabulary.
static FILE_DEF: TokenDef = TokenDef::new("File");
static GROUP_DEF: TokenDef = TokenDef::new("Group");
static BLOCK_DEF: TokenDef = TokenDef::with_flags("Block", TokenFlags::SYMTAB);

pub static FILE: Token = Token::new(&FILE_DEF);
pub static GROUP: Token = Token::new(&GROUP_DEF);
pub static BLOCK: Token = Token::new(&BLOCK_DEF);

// Single-letter terminals.
static A_DEF: TokenDef = TokenDef::new("A");
static B_DEF: TokenDef = TokenDef::new("B");
static C_DEF: TokenDef = TokenDef::new("C");
static D_DEF: TokenDef = TokenDef::new("D");
static E_DEF: TokenDef = TokenDef::new("E");
static F_DEF: TokenDef = TokenDef::new("F");
static G_DEF: TokenDef = TokenDef::new("G");
static H_DEF: TokenDef = TokenDef::new("H");

pub static A: Token = Token::new(&A_DEF);
pub static B: Token = Token::new(&B_DEF);
pub static C: Token = Token::new(&C_DEF);
pub static D: Token = Token::new(&D_DEF);
pub static E: Token = Token::new(&E_DEF);
pub static F: Token = Token::new(&F_DEF);
pub static G: Token = Token::new(&G_DEF);
pub static H: Token = Token::new(&H_DEF);

// Name-resolution vocabulary, used by the scope suites.
static BODY_DEF: TokenDef = TokenDef::with_flags(
    "Body",
    TokenFlags::SYMTAB.union(TokenFlags::DEF_BEFORE_USE),
);
static LET_DEF: TokenDef = TokenDef::with_flags(
    "Let",
    TokenFlags::PRINT
        .union(TokenFlags::LOOKUP)
        .union(TokenFlags::SHADOWING),
);
static DEF_DEF: TokenDef = TokenDef::with_flags(
    "Def",
    TokenFlags::PRINT.union(TokenFlags::LOOKUP),
);
static USE_DEF: TokenDef = TokenDef::with_flags("Use", TokenFlags::PRINT);
static FIELD_DEF: TokenDef = TokenDef::with_flags(
    "Field",
    TokenFlags::PRINT.union(TokenFlags::LOOKDOWN),
);

pub static BODY: Token = Token::new(&BODY_DEF);
pub static LET: Token = Token::new(&LET_DEF);
pub static DEF: Token = Token::new(&DEF_DEF);
pub static USE: Token = Token::new(&USE_DEF);
pub static FIELD: Token = Token::new(&FIELD_DEF);

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
enum Lexeme {
    #[token("(")]
    OpenGroup,
    #[token(")")]
    CloseGroup,
    #[token("{")]
    OpenBlock,
    #[token("}")]
    CloseBlock,
    #[regex("[A-Za-z][A-Za-z0-9_]*")]
    Word,
}

static TERMINALS: Lazy<HashMap<&'static str, Token>> = Lazy::new(|| {
    [A, B, C, D, E, F, G, H]
        .into_iter()
        .map(|tag| (tag.name(), tag))
        .collect()
});

fn terminal(text: &str) -> Option<Token> {
    TERMINALS.get(text).copied()
}

/// Parse a source buffer into a `Top(File(Group …))` tree.
pub fn parse(source: &SourceRef) -> Result<Node, String> {
    let top = Node::new(TOP);
    let file = Node::new(FILE);
    let file_group = Node::new(GROUP);
    top.push_back(file.clone());
    file.push_back(file_group.clone());

    let mut stack = vec![file_group.clone()];
    let mut merged = false;
    let mut lexer = Lexeme::lexer(source.contents());
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let loc = Location::new(source, span.clone());
        let current = match stack.last() {
            Some(node) => node.clone(),
            None => return Err("unbalanced input".to_string()),
        };
        match result {
            Ok(Lexeme::OpenGroup) => {
                if !merged && stack.len() == 1 && current.is_empty() {
                    // Make the implicit file group explicit.
                    merged = true;
                    file_group.extend_location(&loc);
                    stack.push(file_group.clone());
                } else {
                    let group = Node::with_location(GROUP, loc);
                    current.push_back(group.clone());
                    stack.push(group);
                }
            }
            Ok(Lexeme::CloseGroup) => {
                if stack.len() == 1 || current.tag() != GROUP {
                    return Err(format!("unmatched ')' at byte {}", span.start));
                }
                stack.pop();
            }
            Ok(Lexeme::OpenBlock) => {
                let block = Node::with_location(BLOCK, loc);
                current.push_back(block.clone());
                stack.push(block);
            }
            Ok(Lexeme::CloseBlock) => {
                if current.tag() != BLOCK {
                    return Err(format!("unmatched '}}' at byte {}", span.start));
                }
                stack.pop();
            }
            Ok(Lexeme::Word) => {
                let text = &source.contents()[span.clone()];
                let tag = terminal(text)
                    .ok_or_else(|| format!("unknown word '{}' at byte {}", text, span.start))?;
                current.push_back(Node::with_location(tag, loc));
            }
            Err(()) => {
                return Err(format!("unexpected character at byte {}", span.start));
            }
        }
    }
    if stack.len() > 1 {
        return Err("unclosed group or block".to_string());
    }
    Ok(top)
}

/// Parse a synthetic buffer; convenience entry point for tests.
pub fn parse_str(text: &str) -> Result<Node, String> {
    parse(&Source::synthetic(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_land_in_the_file_group() {
        let root = parse_str("A B").unwrap();
        // Top owns the (empty) root symbol table, printed on its line.
        assert_eq!(
            format!("{root}"),
            "(Top\n  {}\n  (File\n    (Group\n      (A)\n      (B))))"
        );
    }

    #[test]
    fn leading_paren_is_the_file_group() {
        let plain = parse_str("A").unwrap();
        let parenthesized = parse_str("(A)").unwrap();
        assert!(plain.equals(&parenthesized));
    }

    #[test]
    fn nested_parens_nest_groups() {
        let root = parse_str("((A))").unwrap();
        let file_group = root.child(0).unwrap().child(0).unwrap();
        assert_eq!(file_group.tag(), GROUP);
        assert_eq!(file_group.len(), 1);
        let inner = file_group.child(0).unwrap();
        assert_eq!(inner.tag(), GROUP);
        assert_eq!(inner.child(0).unwrap().tag(), A);
    }

    #[test]
    fn blocks_hold_their_contents_directly() {
        let root = parse_str("{A B}").unwrap();
        let block = root.child(0).unwrap().child(0).unwrap().child(0).unwrap();
        assert_eq!(block.tag(), BLOCK);
        assert_eq!(block.len(), 2);
        let grouped = parse_str("{(A A)}").unwrap();
        let block = grouped.child(0).unwrap().child(0).unwrap().child(0).unwrap();
        assert_eq!(block.len(), 1);
        assert_eq!(block.child(0).unwrap().tag(), GROUP);
    }

    #[test]
    fn rejects_unbalanced_and_unknown_input() {
        assert!(parse_str("(A").is_err());
        assert!(parse_str("A)").is_err());
        assert!(parse_str("{A)").is_err());
        assert!(parse_str("Q").is_err());
        assert!(parse_str("A ; B").is_err());
    }

    #[test]
    fn locations_reference_the_buffer() {
        let source = Source::new("test", "A (B)");
        let root = parse(&source).unwrap();
        let file_group = root.child(0).unwrap().child(0).unwrap();
        let a = file_group.child(0).unwrap();
        assert_eq!(a.location().view(), "A");
        let inner = file_group.child(1).unwrap();
        assert_eq!(inner.tag(), GROUP);
        assert_eq!(inner.location().view(), "(");
        assert_eq!(inner.child(0).unwrap().location().view(), "B");
    }
}
