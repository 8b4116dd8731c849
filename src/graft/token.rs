//! Token registry: node-kind identifiers with capability flags.
//!
//! A `TokenDef` is declared once as a `static` and never mutated; the
//! `Token` handle that wraps it compares and hashes by the address of
//! that definition, so two tokens are equal exactly when they refer to
//! the same declaration. Flags describe what nodes of this kind are
//! allowed to do: whether their source text participates in structural
//! equality, whether they own a scope, and how they behave during name
//! resolution.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Capability flags carried by a token definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenFlags(u8);

impl TokenFlags {
    pub const NONE: TokenFlags = TokenFlags(0);
    /// The node's location text is significant when comparing for equality.
    pub const PRINT: TokenFlags = TokenFlags(1 << 0);
    /// Nodes of this kind own a symbol table.
    pub const SYMTAB: TokenFlags = TokenFlags(1 << 1);
    /// The scope requires a definition to textually precede a use.
    pub const DEF_BEFORE_USE: TokenFlags = TokenFlags(1 << 2);
    /// A binding of this kind hides outer bindings for the same name.
    pub const SHADOWING: TokenFlags = TokenFlags(1 << 3);
    /// The node can be returned by upward name resolution.
    pub const LOOKUP: TokenFlags = TokenFlags(1 << 4);
    /// The node can be returned by scoped-name resolution.
    pub const LOOKDOWN: TokenFlags = TokenFlags(1 << 5);

    /// Combine two flag sets.
    pub const fn union(self, other: TokenFlags) -> TokenFlags {
        TokenFlags(self.0 | other.0)
    }

    /// True if every flag in `other` is present in `self`.
    pub const fn contains(self, other: TokenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A token definition. Declared as a `static`, one per node kind.
pub struct TokenDef {
    name: &'static str,
    flags: TokenFlags,
}

impl TokenDef {
    pub const fn new(name: &'static str) -> TokenDef {
        TokenDef {
            name,
            flags: TokenFlags::NONE,
        }
    }

    pub const fn with_flags(name: &'static str, flags: TokenFlags) -> TokenDef {
        TokenDef { name, flags }
    }
}

/// A handle to a token definition.
///
/// `Token` is `Copy` and compares by identity: two handles are equal iff
/// they point at the same `TokenDef`. This makes token comparison a
/// pointer test and keeps the vocabulary a closed set of process-wide
/// constants.
#[derive(Clone, Copy)]
pub struct Token {
    def: &'static TokenDef,
}

impl Token {
    pub const fn new(def: &'static TokenDef) -> Token {
        Token { def }
    }

    pub fn name(self) -> &'static str {
        self.def.name
    }

    pub fn has(self, flags: TokenFlags) -> bool {
        self.def.flags.contains(flags)
    }

    /// Membership test against a token set.
    pub fn in_set(self, set: &[Token]) -> bool {
        set.iter().any(|t| *t == self)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Token) -> bool {
        std::ptr::eq(self.def, other.def)
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.def as *const TokenDef as usize).hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.def.name)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.def.name)
    }
}

// Built-in tokens. `Top` roots every tree handed to a pass and owns the
// symbol table that backs fresh-name generation. `Error` and `Lift` are
// the propagated markers the executor treats specially; `ErrorMsg` and
// `ErrorAst` are the payload shape of an `Error` subtree.

static TOP_DEF: TokenDef = TokenDef::with_flags("Top", TokenFlags::SYMTAB);
static ERROR_DEF: TokenDef = TokenDef::new("Error");
static ERROR_MSG_DEF: TokenDef = TokenDef::with_flags("ErrorMsg", TokenFlags::PRINT);
static ERROR_AST_DEF: TokenDef = TokenDef::new("ErrorAst");
static LIFT_DEF: TokenDef = TokenDef::new("Lift");

pub static TOP: Token = Token::new(&TOP_DEF);
pub static ERROR: Token = Token::new(&ERROR_DEF);
pub static ERROR_MSG: Token = Token::new(&ERROR_MSG_DEF);
pub static ERROR_AST: Token = Token::new(&ERROR_AST_DEF);
pub static LIFT: Token = Token::new(&LIFT_DEF);

#[cfg(test)]
mod tests {
    use super::*;

    static A_DEF: TokenDef = TokenDef::new("A");
    static A_AGAIN: Token = Token::new(&A_DEF);
    static B_DEF: TokenDef = TokenDef::with_flags(
        "A",
        TokenFlags::PRINT.union(TokenFlags::LOOKUP),
    );
    static B: Token = Token::new(&B_DEF);

    #[test]
    fn tokens_compare_by_identity_not_name() {
        let a = Token::new(&A_DEF);
        assert_eq!(a, A_AGAIN);
        // Same display name, different definition.
        assert_ne!(a, B);
        assert_eq!(a.name(), B.name());
    }

    #[test]
    fn flag_queries_are_bit_tests() {
        assert!(B.has(TokenFlags::PRINT));
        assert!(B.has(TokenFlags::LOOKUP));
        assert!(B.has(TokenFlags::PRINT.union(TokenFlags::LOOKUP)));
        assert!(!B.has(TokenFlags::SYMTAB));
        assert!(!A_AGAIN.has(TokenFlags::PRINT));
    }

    #[test]
    fn set_membership() {
        let a = Token::new(&A_DEF);
        assert!(a.in_set(&[B, a]));
        assert!(!a.in_set(&[B]));
        assert!(!a.in_set(&[]));
    }

    #[test]
    fn builtins_have_expected_capabilities() {
        assert!(TOP.has(TokenFlags::SYMTAB));
        assert!(ERROR_MSG.has(TokenFlags::PRINT));
        assert!(!ERROR.has(TokenFlags::PRINT));
        assert_ne!(ERROR, LIFT);
    }
}
