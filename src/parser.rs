//! Source validation and compilation.
//!
//! Parsing is a single left-to-right pass: every character is classified
//! as an operator or a comment, loop and function nesting is validated,
//! and the jump table pairing each `[`/`]` and `(`/`)` is recorded along
//! the way so execution resolves every branch in O(1). The first offending
//! character aborts the pass with a structured [`SyntaxError`].

use std::fmt;

use crate::opcode::Operator;

/// The reason a script failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A `]` with no open `[` in its scope.
    MismatchedSquareBracket,
    /// A `[` still open where its scope ends.
    IncompleteLoop,
    /// A `)` with no open function definition.
    MismatchedParenthesis,
    /// A function definition closed while a loop inside its body is still open.
    InvalidFunctionDeclaration,
    /// A `(` inside another function definition.
    NestedFunctionDeclaration,
    /// A function definition whose body contains no operators.
    EmptyFunctionDeclaration,
    /// A function definition still open at the end of the source.
    IncompleteFunctionDeclaration,
    /// The source contains no operators at all.
    MissingOperators,
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SyntaxErrorKind::MismatchedSquareBracket => "unbalanced ']'",
            SyntaxErrorKind::IncompleteLoop => "unclosed '['",
            SyntaxErrorKind::MismatchedParenthesis => "')' without an open function definition",
            SyntaxErrorKind::InvalidFunctionDeclaration => {
                "function definition closed with a loop still open"
            }
            SyntaxErrorKind::NestedFunctionDeclaration => {
                "function definition inside another function definition"
            }
            SyntaxErrorKind::EmptyFunctionDeclaration => "function definition with an empty body",
            SyntaxErrorKind::IncompleteFunctionDeclaration => "unclosed '('",
            SyntaxErrorKind::MissingOperators => "source contains no operators",
        };
        write!(f, "{text}")
    }
}

/// A structured syntax error: the error kind and the character offset of
/// the first offending token in the raw (uncompiled) source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at offset {offset}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub offset: usize,
}

/// A validated script: the compiled operator sequence plus the jump table
/// pairing every loop and function boundary in both directions.
///
/// The pairing is a perfect matching — the parser verifies nesting, so
/// execution never re-checks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    ops: Vec<Operator>,
    jumps: Vec<Option<usize>>,
}

impl CompiledProgram {
    /// Number of compiled operators.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// A compiled program always holds at least one operator
    /// ([`SyntaxErrorKind::MissingOperators`] rejects the rest).
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The compiled operator sequence.
    pub fn ops(&self) -> &[Operator] {
        &self.ops
    }

    pub(crate) fn op(&self, index: usize) -> Operator {
        self.ops[index]
    }

    /// The matching boundary index for the loop or function operator at
    /// `index`, or `None` for non-boundary operators.
    pub fn matching(&self, index: usize) -> Option<usize> {
        self.jumps.get(index).copied().flatten()
    }

    /// Jump target for a boundary operator. The parser guarantees every
    /// boundary has one; a miss here is an implementation bug.
    pub(crate) fn jump(&self, index: usize) -> usize {
        self.jumps[index].expect("jump table entry for validated boundary")
    }

    /// Re-extracts the source text of the program, comments stripped.
    pub fn source(&self) -> String {
        self.ops.iter().map(|op| op.as_char()).collect()
    }

    /// Renders the operators in `start..=end` as source text.
    pub(crate) fn fragment(&self, start: usize, end: usize) -> String {
        self.ops[start..=end].iter().map(|op| op.as_char()).collect()
    }
}

/// An open `(` definition being scanned.
struct PendingFunction {
    op_index: usize,
    offset: usize,
    /// Pending `[` openers inside the body, innermost last.
    loops: Vec<(usize, usize)>,
    body_ops: usize,
}

/// Compiles `source` into a [`CompiledProgram`], or reports the first
/// syntax error. Single pass, O(n) in source length.
pub fn compile(source: &str) -> Result<CompiledProgram, SyntaxError> {
    let mut ops: Vec<Operator> = Vec::new();
    let mut jumps: Vec<Option<usize>> = Vec::new();

    // Pending root-level `[` openers, innermost last.
    let mut root_loops: Vec<(usize, usize)> = Vec::new();
    // At most one function definition can be open at a time.
    let mut function: Option<PendingFunction> = None;

    for (offset, c) in source.chars().enumerate() {
        let Some(op) = Operator::from_char(c) else {
            continue;
        };
        let index = ops.len();
        ops.push(op);
        jumps.push(None);

        match op {
            Operator::Increment
            | Operator::Decrement
            | Operator::Forward
            | Operator::Backward
            | Operator::PrintChar
            | Operator::ReadChar
            | Operator::FunctionCall => {
                if let Some(scope) = function.as_mut() {
                    scope.body_ops += 1;
                }
            }
            Operator::LoopStart => match function.as_mut() {
                Some(scope) => {
                    scope.loops.push((index, offset));
                    scope.body_ops += 1;
                }
                None => root_loops.push((index, offset)),
            },
            Operator::LoopEnd => {
                let opener = match function.as_mut() {
                    Some(scope) => {
                        scope.body_ops += 1;
                        scope.loops.pop()
                    }
                    None => root_loops.pop(),
                };
                let Some((open_index, _)) = opener else {
                    return Err(SyntaxError {
                        kind: SyntaxErrorKind::MismatchedSquareBracket,
                        offset,
                    });
                };
                jumps[open_index] = Some(index);
                jumps[index] = Some(open_index);
            }
            Operator::FunctionStart => {
                if function.is_some() {
                    return Err(SyntaxError {
                        kind: SyntaxErrorKind::NestedFunctionDeclaration,
                        offset,
                    });
                }
                function = Some(PendingFunction {
                    op_index: index,
                    offset,
                    loops: Vec::new(),
                    body_ops: 0,
                });
            }
            Operator::FunctionEnd => {
                let Some(scope) = function.take() else {
                    return Err(SyntaxError {
                        kind: SyntaxErrorKind::MismatchedParenthesis,
                        offset,
                    });
                };
                if !scope.loops.is_empty() {
                    return Err(SyntaxError {
                        kind: SyntaxErrorKind::InvalidFunctionDeclaration,
                        offset,
                    });
                }
                if scope.body_ops == 0 {
                    return Err(SyntaxError {
                        kind: SyntaxErrorKind::EmptyFunctionDeclaration,
                        offset,
                    });
                }
                jumps[scope.op_index] = Some(index);
                jumps[index] = Some(scope.op_index);
            }
        }
    }

    // End of input: report the innermost construct left open.
    if let Some(scope) = function {
        return Err(SyntaxError {
            kind: SyntaxErrorKind::IncompleteFunctionDeclaration,
            offset: scope.offset,
        });
    }
    if let Some(&(_, offset)) = root_loops.last() {
        return Err(SyntaxError {
            kind: SyntaxErrorKind::IncompleteLoop,
            offset,
        });
    }
    if ops.is_empty() {
        return Err(SyntaxError {
            kind: SyntaxErrorKind::MissingOperators,
            offset: 0,
        });
    }

    Ok(CompiledProgram { ops, jumps })
}

/// Checks the syntax of `source` without keeping the compiled program.
///
/// Validation is a pure function of the text: validating the same source
/// twice yields identical results.
pub fn validate(source: &str) -> Result<(), SyntaxError> {
    compile(source).map(|_| ())
}
