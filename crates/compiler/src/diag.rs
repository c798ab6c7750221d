//! Diagnostics as values, never exceptions.
//!
//! Every pass (lexer, parser, resolver, type checker, capability
//! analyzer) accumulates [`Diagnostic`]s into a shared [`DiagnosticBag`]
//! and keeps going; nothing in this crate ever panics or propagates a
//! user-facing error across a pass boundary (spec.md §7, §9 design note
//! "Diagnostics are values").
//!
//! The code taxonomy is grounded in
//! `original_source/frontend/include/parus/diag/DiagCode.hpp`, which pairs
//! a stable `Code` with a `Severity`; this module keeps that split and
//! adds the positional-argument payload spec.md §8 scenario S4 requires
//! (`IntLiteralDoesNotFit` carrying `("u8", "300")`).

use parus_core::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Stable diagnostic codes, grouped the way spec.md §7 groups them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagCode {
    // Lex/parse
    InvalidUtf8,
    UnexpectedToken,
    ExpectedToken,
    UnexpectedEof,
    NestedTernaryNotAllowed,
    AmbiguousAmpPrefixChain,
    ArraySizeExpectedIntLiteral,

    // Declarations
    FnNameExpected,
    FnParamDefaultNotAllowedOutsideNamedGroup,
    FnOnlyOneNamedGroupAllowed,
    OperatorKeyExpected,
    OperatorSelfFirstParamRequired,
    ClassLifecycleSelfNotAllowed,
    AbiCOverloadNotAllowed,
    AbiCNamedGroupNotAllowed,
    AbiCTypeNotFfiSafe,
    AbiCGlobalMustBeStatic,

    // Name resolve
    UndefinedName,
    DuplicateDecl,
    Shadowing,
    ShadowingNotAllowed,

    // Type check
    TypeMismatch,
    TypeLetInitMismatch,
    TypeArgCountMismatch,
    TypeCondMustBeBool,
    TypeIndexMustBeUSize,
    TypeReturnOutsideFn,
    OverloadAmbiguousCall,
    OverloadNoMatchingCall,
    TyckCastNullToNonOptional,
    TyckCastNotAllowed,
    IntLiteralDoesNotFit,
    IntLiteralNeedsTypeContext,

    // Capability
    BorrowOperandMustBePlace,
    BorrowMutRequiresMutablePlace,
    BorrowMutConflict,
    BorrowMutConflictWithShared,
    BorrowSharedConflictWithMut,
    BorrowMutDirectAccessConflict,
    BorrowSharedWriteConflict,
    BorrowEscapeToStorage,
    BorrowEscapeFromReturn,
    EscapeOperandMustBePlace,
    EscapeOperandMustNotBeBorrow,
    EscapeWhileMutBorrowActive,
    EscapeWhileBorrowActive,
    UseAfterEscapeMove,
    SirEscapeBoundaryViolation,
    TypeEscapeNotAllowedInPureComptime,
}

impl DiagCode {
    /// Default severity for this code absent a `strict`-mode promotion.
    /// All currently-defined codes denote hard errors; warnings are
    /// reserved for shadowing-policy `Warn` (spec.md §4.3), which is
    /// raised directly as `Severity::Warning` rather than through this
    /// table.
    pub fn default_severity(self) -> Severity {
        Severity::Error
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single diagnostic: a stable code, a span, and positional arguments
/// used to render the message (spec.md §8 S4: `IntLiteralDoesNotFit`
/// carries `("u8", "300")`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub severity: Severity,
    pub span: Span,
    pub args: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: DiagCode, span: Span) -> Self {
        Diagnostic {
            severity: code.default_severity(),
            code,
            span,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render a plain English sentence. Not a localization/IDE rendering
    /// layer (that's out of scope) — just the `Display` a hand-rolled
    /// binary-format error would also provide (see `parlib::ArchiveError`).
    pub fn render(&self) -> String {
        let base = match self.code {
            DiagCode::InvalidUtf8 => "source is not valid UTF-8".to_string(),
            DiagCode::UnexpectedToken => format!("unexpected token '{}'", self.arg(0)),
            DiagCode::ExpectedToken => format!("expected '{}'", self.arg(0)),
            DiagCode::UnexpectedEof => "unexpected end of file".to_string(),
            DiagCode::NestedTernaryNotAllowed => "ternary expressions cannot be nested".to_string(),
            DiagCode::AmbiguousAmpPrefixChain => {
                "ambiguous '&' prefix chain; add parentheses to disambiguate".to_string()
            }
            DiagCode::ArraySizeExpectedIntLiteral => {
                "array size must be an integer literal".to_string()
            }
            DiagCode::FnNameExpected => "expected a function name".to_string(),
            DiagCode::FnParamDefaultNotAllowedOutsideNamedGroup => {
                "default values are only allowed on named-group parameters".to_string()
            }
            DiagCode::FnOnlyOneNamedGroupAllowed => {
                "at most one named-group section is allowed per function".to_string()
            }
            DiagCode::OperatorKeyExpected => "expected an operator key".to_string(),
            DiagCode::OperatorSelfFirstParamRequired => {
                "operator overloads must take 'self' as their first parameter".to_string()
            }
            DiagCode::ClassLifecycleSelfNotAllowed => {
                "lifecycle members may not redeclare 'self'".to_string()
            }
            DiagCode::AbiCOverloadNotAllowed => {
                "extern \"C\" functions cannot be overloaded".to_string()
            }
            DiagCode::AbiCNamedGroupNotAllowed => {
                "extern \"C\" functions cannot take named-group parameters".to_string()
            }
            DiagCode::AbiCTypeNotFfiSafe => format!("type '{}' is not FFI-safe", self.arg(0)),
            DiagCode::AbiCGlobalMustBeStatic => {
                "extern \"C\" globals must use 'static' storage".to_string()
            }
            DiagCode::UndefinedName => format!("undefined name '{}'", self.arg(0)),
            DiagCode::DuplicateDecl => format!("'{}' is already declared in this scope", self.arg(0)),
            DiagCode::Shadowing => format!("'{}' shadows an outer declaration", self.arg(0)),
            DiagCode::ShadowingNotAllowed => {
                format!("'{}' is not allowed to shadow an outer declaration", self.arg(0))
            }
            DiagCode::TypeMismatch => format!("expected type '{}', found '{}'", self.arg(0), self.arg(1)),
            DiagCode::TypeLetInitMismatch => {
                format!("initializer type '{}' does not match declared type '{}'", self.arg(1), self.arg(0))
            }
            DiagCode::TypeArgCountMismatch => {
                format!("expected {} argument(s), found {}", self.arg(0), self.arg(1))
            }
            DiagCode::TypeCondMustBeBool => "condition must have type 'bool'".to_string(),
            DiagCode::TypeIndexMustBeUSize => "index must have type 'usize'".to_string(),
            DiagCode::TypeReturnOutsideFn => "'return' outside of a function body".to_string(),
            DiagCode::OverloadAmbiguousCall => "call is ambiguous between multiple overloads".to_string(),
            DiagCode::OverloadNoMatchingCall => "no overload matches this call".to_string(),
            DiagCode::TyckCastNullToNonOptional => "cannot cast 'null' to a non-optional type".to_string(),
            DiagCode::TyckCastNotAllowed => {
                format!("cannot cast '{}' to '{}'", self.arg(0), self.arg(1))
            }
            DiagCode::IntLiteralDoesNotFit => {
                format!("integer literal '{}' does not fit in '{}'", self.arg(1), self.arg(0))
            }
            DiagCode::IntLiteralNeedsTypeContext => {
                "integer literal needs a type context to resolve".to_string()
            }
            DiagCode::BorrowOperandMustBePlace => "borrow operand must be a place expression".to_string(),
            DiagCode::BorrowMutRequiresMutablePlace => {
                "'&mut' requires a mutable place".to_string()
            }
            DiagCode::BorrowMutConflict => "conflicting mutable borrow already active".to_string(),
            DiagCode::BorrowMutConflictWithShared => {
                "cannot take '&mut' while a shared borrow is active".to_string()
            }
            DiagCode::BorrowSharedConflictWithMut => {
                "cannot take '&' while a mutable borrow is active".to_string()
            }
            DiagCode::BorrowMutDirectAccessConflict => {
                "direct access conflicts with an active mutable borrow".to_string()
            }
            DiagCode::BorrowSharedWriteConflict => {
                "write conflicts with an active shared borrow".to_string()
            }
            DiagCode::BorrowEscapeToStorage => {
                "a borrow cannot be stored into long-lived storage".to_string()
            }
            DiagCode::BorrowEscapeFromReturn => "a borrow cannot escape via return".to_string(),
            DiagCode::EscapeOperandMustBePlace => "escape ('&&') operand must be a place".to_string(),
            DiagCode::EscapeOperandMustNotBeBorrow => {
                "escape ('&&') operand must not itself be a borrow".to_string()
            }
            DiagCode::EscapeWhileMutBorrowActive => {
                "cannot escape while a mutable borrow is active".to_string()
            }
            DiagCode::EscapeWhileBorrowActive => "cannot escape while a borrow is active".to_string(),
            DiagCode::UseAfterEscapeMove => format!("use of '{}' after it was moved by an escape", self.arg(0)),
            DiagCode::SirEscapeBoundaryViolation => {
                "escape ('&&') is only legal at a return, call argument, or static boundary".to_string()
            }
            DiagCode::TypeEscapeNotAllowedInPureComptime => {
                "escape ('&&') is not allowed inside a pure or comptime function".to_string()
            }
        };
        format!("{:?}: {base}", self.code)
    }

    fn arg(&self, i: usize) -> &str {
        self.args.get(i).map(|s| s.as_str()).unwrap_or("?")
    }
}

/// Accumulates diagnostics across a pass; never aborts the pass itself.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    /// "strict" mode promotes warnings to errors (spec.md §7).
    pub strict: bool,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, mut diag: Diagnostic) {
        if self.strict && diag.severity == Severity::Warning {
            diag.severity = Severity::Error;
        }
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, code: DiagCode, span: Span, args: Vec<String>) {
        self.push(Diagnostic::new(code, span).with_args(args));
    }

    pub fn warning(&mut self, code: DiagCode, span: Span, args: Vec<String>) {
        self.push(Diagnostic::new(code, span).with_args(args).with_severity(Severity::Warning));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_promotes_warnings() {
        let mut bag = DiagnosticBag::new();
        bag.strict = true;
        bag.warning(DiagCode::Shadowing, Span::DUMMY, vec!["x".to_string()]);
        assert!(bag.has_errors());
    }

    #[test]
    fn non_strict_warnings_do_not_count_as_errors() {
        let mut bag = DiagnosticBag::new();
        bag.warning(DiagCode::Shadowing, Span::DUMMY, vec!["x".to_string()]);
        assert!(!bag.has_errors());
    }

    #[test]
    fn int_literal_does_not_fit_renders_positional_args() {
        let d = Diagnostic::new(DiagCode::IntLiteralDoesNotFit, Span::DUMMY)
            .with_args(vec!["u8".to_string(), "300".to_string()]);
        let rendered = d.render();
        assert!(rendered.contains("u8"));
        assert!(rendered.contains("300"));
    }
}
