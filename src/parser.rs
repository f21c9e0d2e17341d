//! The recursive-descent parser (§4.1 "Parser contract"): builds a
//! [`Program`] from a token stream in one pass, reconstructing the CFG
//! from each block's terminator afterward.
//!
//! Newline tokens are scanned (per the scanner contract) but carry no
//! parsing weight here: every opcode has a statically fixed, or
//! self-terminating comma-delimited, operand arity, so statement
//! boundaries never depend on them. This is what lets the worked examples
//! in the testable-properties section break a block's first instruction
//! onto the header line (`{0} jmp {1}`) or its last onto the closing
//! brace's line (`ret %1 }`) — both parse the same as the fully
//! line-broken form. See DESIGN.md.

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::function::{Argument, Function};
use crate::instruction::{Block, BlockNum, BoolOp, Instruction, PhiOperand};
use crate::lexer::{Lexer, Position, SpannedToken, Token};
use crate::program::Program;
use crate::types::{BinaryOp, Composite, CompareOp, Field, IntKind, Method, ShiftOp, Type, TypeTable, UnaryOp};
use crate::value::{Constant, Value, ValueNum};

pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut program = Program::new();
    parser.skip_newlines();
    while !matches!(parser.peek(), Token::Eof) {
        let func = parser.parse_func(&mut program.types)?;
        program.add_func(func);
        parser.skip_newlines();
    }
    Ok(program)
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn resolve_int_bits(negative: bool, magnitude: u128, kind: IntKind) -> u64 {
    let signed: i128 = if negative { -(magnitude as i128) } else { magnitude as i128 };
    (signed as i64 as u64) & mask(kind.bits())
}

/// An operand that may still need its type resolved against a sibling in
/// the same instruction (only phi operands need this; see the module doc
/// and §4.1).
enum PhiVal {
    Bool(bool),
    Pointer(u64),
    Func(u64),
    Str(String),
    Int { negative: bool, magnitude: u128, kind: Option<IntKind> },
    Computed { num: ValueNum, ty: Option<Type> },
}

impl PhiVal {
    /// Table-aware: a string operand resolves to the interned `string`
    /// composite rather than falling back to `Type::Ptr`, so it compares
    /// equal to a `:string`-declared phi result. Read-only lookup suffices
    /// since `parse_phi_val` already interned `Composite::String` for any
    /// string literal it parsed.
    fn resolved_ty(&self, types: &TypeTable) -> Option<Type> {
        match self {
            PhiVal::Bool(_) => Some(Type::Bool),
            PhiVal::Pointer(_) => Some(Type::Ptr),
            PhiVal::Func(_) => Some(Type::Func),
            PhiVal::Str(_) => Some(types.find(&Composite::String).map(Type::Composite).unwrap_or(Type::Ptr)),
            PhiVal::Int { kind: Some(k), .. } => Some(Type::Int(*k)),
            PhiVal::Int { kind: None, .. } => None,
            PhiVal::Computed { ty: Some(t), .. } => Some(t.clone()),
            PhiVal::Computed { ty: None, .. } => None,
        }
    }

    fn resolve(self, fallback: &Type) -> Value {
        match self {
            PhiVal::Bool(b) => Value::Constant(Constant::Bool(b)),
            PhiVal::Pointer(a) => Value::Constant(Constant::Pointer(a)),
            PhiVal::Func(n) => Value::Constant(Constant::Func(n)),
            PhiVal::Str(s) => Value::Constant(Constant::String(s)),
            PhiVal::Int { negative, magnitude, kind } => {
                let k = kind.unwrap_or(match fallback {
                    Type::Int(k) => *k,
                    _ => IntKind::I64,
                });
                Value::Constant(Constant::Int { kind: k, bits: resolve_int_bits(negative, magnitude, k) })
            }
            PhiVal::Computed { num, ty } => Value::Computed { num, ty: ty.unwrap_or_else(|| fallback.clone()) },
        }
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn raw(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.tokens.get(self.pos).map(|t| &t.token), Some(Token::Newline)) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> &Token {
        self.skip_newlines();
        &self.tokens[self.pos].token
    }

    fn peek_pos(&mut self) -> Position {
        self.skip_newlines();
        self.tokens[self.pos].pos
    }

    fn bump(&mut self) -> SpannedToken {
        self.skip_newlines();
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        tok
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        let pos = self.peek_pos();
        let tok = self.bump();
        match tok.token {
            Token::Symbol(s) if s == c => Ok(()),
            other => Err(ParseError::UnexpectedToken { position: pos, expected: format!("'{c}'"), found: other.to_string() }),
        }
    }

    fn eat_symbol(&mut self, c: char) -> bool {
        if matches!(self.peek(), Token::Symbol(s) if *s == c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_fat_arrow(&mut self) -> Result<(), ParseError> {
        let pos = self.peek_pos();
        let tok = self.bump();
        match tok.token {
            Token::FatArrow => Ok(()),
            other => Err(ParseError::UnexpectedToken { position: pos, expected: "'=>'".into(), found: other.to_string() }),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        let pos = self.peek_pos();
        let tok = self.bump();
        match tok.token {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError::UnexpectedToken { position: pos, expected: "identifier".into(), found: other.to_string() }),
        }
    }

    fn expect_number(&mut self) -> Result<(String, bool, bool), ParseError> {
        let pos = self.peek_pos();
        let tok = self.bump();
        match tok.token {
            Token::Number { text, negative, hex } => Ok((text, negative, hex)),
            other => Err(ParseError::UnexpectedToken { position: pos, expected: "number".into(), found: other.to_string() }),
        }
    }

    fn parse_plain_i64(&mut self) -> Result<i64, ParseError> {
        let pos = self.peek_pos();
        let (text, negative, _hex) = self.expect_number()?;
        let magnitude: i64 = text.trim_start_matches('-').parse().map_err(|_| ParseError::InvalidNumber { position: pos, text: text.clone() })?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn parse_plain_u64(&mut self) -> Result<u64, ParseError> {
        let pos = self.peek_pos();
        let (text, _negative, _hex) = self.expect_number()?;
        text.parse().map_err(|_| ParseError::InvalidNumber { position: pos, text })
    }

    fn parse_block_value(&mut self) -> Result<BlockNum, ParseError> {
        self.expect_symbol('{')?;
        let n = self.parse_plain_i64()?;
        self.expect_symbol('}')?;
        Ok(n)
    }

    /// `Type ::= 'b' | 'i8' | ... | CompositeType`.
    fn parse_type(&mut self, types: &mut TypeTable) -> Result<Type, ParseError> {
        let pos = self.peek_pos();
        let name = self.expect_ident()?;
        match name.as_str() {
            "b" => Ok(Type::Bool),
            "i8" => Ok(Type::Int(IntKind::I8)),
            "i16" => Ok(Type::Int(IntKind::I16)),
            "i32" => Ok(Type::Int(IntKind::I32)),
            "i64" => Ok(Type::Int(IntKind::I64)),
            "u8" => Ok(Type::Int(IntKind::U8)),
            "u16" => Ok(Type::Int(IntKind::U16)),
            "u32" => Ok(Type::Int(IntKind::U32)),
            "u64" => Ok(Type::Int(IntKind::U64)),
            "ptr" => Ok(Type::Ptr),
            "func" => Ok(Type::Func),
            "string" => Ok(Type::Composite(types.intern(Composite::String))),
            "shared_ptr" => {
                self.expect_symbol('<')?;
                let element = self.parse_type(types)?;
                self.expect_symbol(',')?;
                let kind_name = self.expect_ident()?;
                let kind = match kind_name.as_str() {
                    "s" => crate::types::SharedKind::Strong,
                    "w" => crate::types::SharedKind::Weak,
                    _ => return Err(ParseError::UnknownType { position: pos, text: kind_name }),
                };
                self.expect_symbol('>')?;
                Ok(Type::Composite(types.intern(Composite::SharedPointer { element: Box::new(element), kind })))
            }
            "unique_ptr" => {
                self.expect_symbol('<')?;
                let element = self.parse_type(types)?;
                self.expect_symbol('>')?;
                Ok(Type::Composite(types.intern(Composite::UniquePointer { element: Box::new(element) })))
            }
            "array" => {
                self.expect_symbol('<')?;
                let element = self.parse_type(types)?;
                self.expect_symbol(',')?;
                let count = self.parse_plain_u64()?;
                self.expect_symbol('>')?;
                Ok(Type::Composite(types.intern(Composite::Array { element: Box::new(element), count })))
            }
            "struct" => {
                let mut fields = Vec::new();
                if self.eat_symbol('<') {
                    loop {
                        let name = self.expect_ident()?;
                        self.expect_symbol(':')?;
                        let ty = self.parse_type(types)?;
                        fields.push(Field { name, ty });
                        if self.eat_symbol(',') {
                            continue;
                        }
                        break;
                    }
                    self.expect_symbol('>')?;
                }
                Ok(Type::Composite(types.intern(Composite::Struct { fields })))
            }
            "interface" => {
                let mut methods = Vec::new();
                if self.eat_symbol('<') {
                    loop {
                        let name = self.expect_ident()?;
                        self.expect_symbol(':')?;
                        self.expect_symbol('(')?;
                        let mut parameters = Vec::new();
                        if !matches!(self.peek(), Token::Symbol(')')) {
                            loop {
                                parameters.push(self.parse_type(types)?);
                                if self.eat_symbol(',') {
                                    continue;
                                }
                                break;
                            }
                        }
                        self.expect_symbol(')')?;
                        self.expect_fat_arrow()?;
                        self.expect_symbol('(')?;
                        let mut results = Vec::new();
                        if !matches!(self.peek(), Token::Symbol(')')) {
                            loop {
                                results.push(self.parse_type(types)?);
                                if self.eat_symbol(',') {
                                    continue;
                                }
                                break;
                            }
                        }
                        self.expect_symbol(')')?;
                        methods.push(Method { name, parameters, results });
                        if self.eat_symbol(',') {
                            continue;
                        }
                        break;
                    }
                    self.expect_symbol('>')?;
                }
                Ok(Type::Composite(types.intern(Composite::Interface { methods })))
            }
            other => Err(ParseError::UnknownType { position: pos, text: other.to_string() }),
        }
    }

    /// Parses a `Value` usable as an ordinary (non-phi) operand: a
    /// `Constant` or a `Computed` reference. An omitted type annotation is
    /// resolved first against `value_types` (the value's own declaration
    /// site, parsed earlier in program order), then against `hint` (the
    /// statically-known expected type for this operand slot).
    fn parse_operand(
        &mut self,
        types: &mut TypeTable,
        value_types: &BTreeMap<ValueNum, Type>,
        hint: Option<&Type>,
    ) -> Result<Value, ParseError> {
        let pos = self.peek_pos();
        match self.peek().clone() {
            Token::Symbol('@') => {
                self.bump();
                let n = self.parse_plain_u64()?;
                Ok(Value::Constant(Constant::Func(n)))
            }
            Token::Symbol('#') => {
                self.bump();
                if let Token::Ident(s) = self.peek().clone() {
                    if s == "t" {
                        self.bump();
                        return Ok(Value::Constant(Constant::Bool(true)));
                    }
                    if s == "f" {
                        self.bump();
                        return Ok(Value::Constant(Constant::Bool(false)));
                    }
                }
                let (text, negative, _hex) = self.expect_number()?;
                let magnitude: u128 = text.trim_start_matches('-').parse().map_err(|_| ParseError::InvalidNumber { position: pos, text: text.clone() })?;
                let kind = if self.eat_symbol(':') {
                    match self.parse_type(types)? {
                        Type::Int(k) => k,
                        other => return Err(ParseError::UnexpectedToken { position: pos, expected: "int type".into(), found: other.to_string() }),
                    }
                } else if let Some(Type::Int(k)) = hint {
                    *k
                } else {
                    return Err(ParseError::UnexpectedToken { position: pos, expected: "':' int type".into(), found: "untyped integer constant".into() });
                };
                Ok(Value::Constant(Constant::Int { kind, bits: resolve_int_bits(negative, magnitude, kind) }))
            }
            Token::Number { hex: true, text, .. } => {
                self.bump();
                let digits = text.trim_start_matches("0x");
                let addr = u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidNumber { position: pos, text: text.clone() })?;
                Ok(Value::Constant(Constant::Pointer(addr)))
            }
            Token::Str(s) => {
                self.bump();
                types.intern(Composite::String);
                Ok(Value::Constant(Constant::String(s)))
            }
            Token::Symbol('%') => {
                self.bump();
                let num = self.parse_plain_i64()?;
                let ty = if self.eat_symbol(':') {
                    self.parse_type(types)?
                } else if let Some(t) = value_types.get(&num) {
                    t.clone()
                } else if let Some(t) = hint {
                    t.clone()
                } else {
                    return Err(ParseError::UnexpectedToken { position: pos, expected: "':' type".into(), found: format!("untyped %{num}") });
                };
                Ok(Value::Computed { num, ty })
            }
            other => Err(ParseError::UnexpectedToken { position: pos, expected: "value".into(), found: other.to_string() }),
        }
    }

    fn parse_phi_val(&mut self, types: &mut TypeTable) -> Result<PhiVal, ParseError> {
        let pos = self.peek_pos();
        match self.peek().clone() {
            Token::Symbol('@') => {
                self.bump();
                Ok(PhiVal::Func(self.parse_plain_u64()?))
            }
            Token::Symbol('#') => {
                self.bump();
                if let Token::Ident(s) = self.peek().clone() {
                    if s == "t" {
                        self.bump();
                        return Ok(PhiVal::Bool(true));
                    }
                    if s == "f" {
                        self.bump();
                        return Ok(PhiVal::Bool(false));
                    }
                }
                let (text, negative, _hex) = self.expect_number()?;
                let magnitude: u128 = text.trim_start_matches('-').parse().map_err(|_| ParseError::InvalidNumber { position: pos, text: text.clone() })?;
                let kind = if self.eat_symbol(':') {
                    match self.parse_type(types)? {
                        Type::Int(k) => Some(k),
                        other => return Err(ParseError::UnexpectedToken { position: pos, expected: "int type".into(), found: other.to_string() }),
                    }
                } else {
                    None
                };
                Ok(PhiVal::Int { negative, magnitude, kind })
            }
            Token::Number { hex: true, text, .. } => {
                self.bump();
                let digits = text.trim_start_matches("0x");
                let addr = u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidNumber { position: pos, text: text.clone() })?;
                Ok(PhiVal::Pointer(addr))
            }
            Token::Str(s) => {
                self.bump();
                types.intern(Composite::String);
                Ok(PhiVal::Str(s))
            }
            Token::Symbol('%') => {
                self.bump();
                let num = self.parse_plain_i64()?;
                let ty = if self.eat_symbol(':') { Some(self.parse_type(types)?) } else { None };
                Ok(PhiVal::Computed { num, ty })
            }
            other => Err(ParseError::UnexpectedToken { position: pos, expected: "value".into(), found: other.to_string() }),
        }
    }

    fn parse_phi(&mut self, types: &mut TypeTable, result: ValueNum, result_ty: Option<Type>) -> Result<Instruction, ParseError> {
        let pos = self.peek_pos();
        let mut raw = Vec::new();
        loop {
            let val = self.parse_phi_val(types)?;
            let parent = self.parse_block_value()?;
            raw.push((val, parent));
            if self.eat_symbol(',') {
                continue;
            }
            break;
        }
        let ty = result_ty.or_else(|| raw.iter().find_map(|(v, _)| v.resolved_ty(types))).ok_or_else(|| ParseError::UnexpectedEof {
            position: pos,
            expected: "a typed phi operand or result".into(),
        })?;
        let operands = raw.into_iter().map(|(v, parent)| PhiOperand { value: v.resolve(&ty), parent }).collect();
        Ok(Instruction::Phi { result, ty, operands })
    }

    fn one_result(&self, pos: Position, results: Vec<(ValueNum, Option<Type>)>) -> Result<(ValueNum, Option<Type>), ParseError> {
        if results.len() != 1 {
            return Err(ParseError::UnexpectedToken { position: pos, expected: "exactly one result".into(), found: format!("{} results", results.len()) });
        }
        Ok(results.into_iter().next().unwrap())
    }

    fn require_ty(&self, pos: Position, ty: Option<Type>) -> Result<Type, ParseError> {
        ty.ok_or(ParseError::UnexpectedEof { position: pos, expected: "':' type on result".into() })
    }

    fn parse_result_list(&mut self, types: &mut TypeTable) -> Result<Vec<(ValueNum, Option<Type>)>, ParseError> {
        if !matches!(self.peek(), Token::Symbol('%')) {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        loop {
            self.expect_symbol('%')?;
            let num = self.parse_plain_i64()?;
            let ty = if self.eat_symbol(':') { Some(self.parse_type(types)?) } else { None };
            results.push((num, ty));
            if self.eat_symbol(',') {
                continue;
            }
            break;
        }
        self.expect_symbol('=')?;
        Ok(results)
    }

    fn parse_instr(
        &mut self,
        types: &mut TypeTable,
        value_types: &mut BTreeMap<ValueNum, Type>,
        result_types: &[Type],
    ) -> Result<Instruction, ParseError> {
        let pos = self.peek_pos();
        let results = self.parse_result_list(types)?;
        let mnemonic = self.expect_ident()?;

        macro_rules! operand {
            ($hint:expr) => {
                self.parse_operand(types, value_types, $hint)?
            };
        }

        let instr = match mnemonic.as_str() {
            "mov" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let origin = operand!(Some(&ty));
                Instruction::Mov { result, ty, origin }
            }
            "phi" => {
                let (result, rty) = self.one_result(pos, results)?;
                self.parse_phi(types, result, rty)?
            }
            "conv" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let operand = operand!(None);
                Instruction::Conversion { result, ty, operand }
            }
            "bnot" => {
                let (result, _) = self.one_result(pos, results)?;
                let operand = operand!(Some(&Type::Bool));
                Instruction::BoolNot { result, operand }
            }
            "band" | "bor" => {
                let (result, _) = self.one_result(pos, results)?;
                let a = operand!(Some(&Type::Bool));
                self.expect_symbol(',')?;
                let b = operand!(Some(&Type::Bool));
                let op = if mnemonic == "band" { BoolOp::And } else { BoolOp::Or };
                Instruction::BoolBinary { result, op, a, b }
            }
            "ineg" | "inot" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let operand = operand!(Some(&ty));
                let op = if mnemonic == "ineg" { UnaryOp::Neg } else { UnaryOp::Not };
                Instruction::IntUnary { result, ty, op, operand }
            }
            "ieq" | "ineq" | "ilss" | "ileq" | "igtr" | "igeq" => {
                let (result, _) = self.one_result(pos, results)?;
                let a = operand!(None);
                self.expect_symbol(',')?;
                let b = operand!(Some(&a.ty()));
                let op = match mnemonic.as_str() {
                    "ieq" => CompareOp::Eq,
                    "ineq" => CompareOp::Neq,
                    "ilss" => CompareOp::Lss,
                    "ileq" => CompareOp::Leq,
                    "igtr" => CompareOp::Gtr,
                    _ => CompareOp::Geq,
                };
                Instruction::IntCompare { result, op, a, b }
            }
            "iadd" | "isub" | "imul" | "iquo" | "irem" | "iand" | "ior" | "ixor" | "iandnot" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let a = operand!(Some(&ty));
                self.expect_symbol(',')?;
                let b = operand!(Some(&ty));
                let op = match mnemonic.as_str() {
                    "iadd" => BinaryOp::Add,
                    "isub" => BinaryOp::Sub,
                    "imul" => BinaryOp::Mul,
                    "iquo" => BinaryOp::Quo,
                    "irem" => BinaryOp::Rem,
                    "iand" => BinaryOp::And,
                    "ior" => BinaryOp::Or,
                    "ixor" => BinaryOp::Xor,
                    _ => BinaryOp::Andnot,
                };
                Instruction::IntBinary { result, ty, op, a, b }
            }
            "shl" | "shr" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let shifted = operand!(Some(&ty));
                self.expect_symbol(',')?;
                let offset = operand!(Some(&Type::Int(IntKind::I64)));
                let op = if mnemonic == "shl" { ShiftOp::Shl } else { ShiftOp::Shr };
                Instruction::IntShift { result, ty, op, shifted, offset }
            }
            "poff" => {
                let (result, _) = self.one_result(pos, results)?;
                let pointer = operand!(Some(&Type::Ptr));
                self.expect_symbol(',')?;
                let offset = operand!(Some(&Type::Int(IntKind::I64)));
                Instruction::PointerOffset { result, pointer, offset }
            }
            "niltest" => {
                let (result, _) = self.one_result(pos, results)?;
                let tested = operand!(Some(&Type::Ptr));
                Instruction::NilTest { result, tested }
            }
            "malloc" => {
                let (result, _) = self.one_result(pos, results)?;
                let size = operand!(Some(&Type::Int(IntKind::I64)));
                Instruction::Malloc { result, size }
            }
            "load" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let address = operand!(Some(&Type::Ptr));
                Instruction::Load { result, ty, address }
            }
            "store" => {
                let address = operand!(Some(&Type::Ptr));
                self.expect_symbol(',')?;
                let value = operand!(None);
                Instruction::Store { address, value }
            }
            "free" => Instruction::Free { address: operand!(Some(&Type::Ptr)) },
            "jmp" => Instruction::Jump { destination: self.parse_block_value()? },
            "jcc" => {
                let cond = operand!(Some(&Type::Bool));
                self.expect_symbol(',')?;
                let true_dest = self.parse_block_value()?;
                self.expect_symbol(',')?;
                let false_dest = self.parse_block_value()?;
                Instruction::JumpCond { cond, true_dest, false_dest }
            }
            "syscall" => {
                let (result, _) = self.one_result(pos, results)?;
                let syscall_number = operand!(Some(&Type::Int(IntKind::I64)));
                let mut args = Vec::new();
                while self.eat_symbol(',') {
                    args.push(operand!(Some(&Type::Int(IntKind::I64))));
                }
                Instruction::Syscall { result, syscall_number, args }
            }
            "call" => {
                let result_types: Vec<Type> = results.iter().map(|(_, ty)| ty.clone()).collect::<Option<Vec<_>>>().ok_or(ParseError::UnexpectedEof {
                    position: pos,
                    expected: "':' type on every call result".into(),
                })?;
                let results_nums: Vec<ValueNum> = results.into_iter().map(|(n, _)| n).collect();
                let callee = operand!(Some(&Type::Func));
                let mut args = Vec::new();
                while self.eat_symbol(',') {
                    args.push(operand!(None));
                }
                Instruction::Call { results: results_nums, result_types, callee, args }
            }
            "ret" => {
                let mut args = Vec::new();
                if matches!(self.peek(), Token::Symbol('%') | Token::Symbol('#') | Token::Symbol('@') | Token::Str(_) | Token::Number { .. }) {
                    loop {
                        let hint = result_types.get(args.len());
                        args.push(operand!(hint));
                        if self.eat_symbol(',') {
                            continue;
                        }
                        break;
                    }
                }
                Instruction::Return { args }
            }
            "make_shared" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let size = operand!(Some(&Type::Int(IntKind::I64)));
                Instruction::MakeShared { result, ty, size }
            }
            "copy_shared" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let copied = operand!(Some(&ty));
                self.expect_symbol(',')?;
                let offset = operand!(Some(&Type::Int(IntKind::I64)));
                Instruction::CopyShared { result, ty, copied, offset }
            }
            "delete_shared" => Instruction::DeleteShared { address: operand!(None) },
            "make_unique" => {
                let (result, rty) = self.one_result(pos, results)?;
                let ty = self.require_ty(pos, rty)?;
                let size = operand!(Some(&Type::Int(IntKind::I64)));
                Instruction::MakeUnique { result, ty, size }
            }
            "delete_unique" => Instruction::DeleteUnique { address: operand!(None) },
            "str_index" => {
                let (result, _) = self.one_result(pos, results)?;
                let string = operand!(Some(&Type::Ptr));
                self.expect_symbol(',')?;
                let index = operand!(Some(&Type::Int(IntKind::I64)));
                Instruction::StringIndex { result, string, index }
            }
            "str_concat" => {
                let (result, _) = self.one_result(pos, results)?;
                let mut operands = Vec::new();
                loop {
                    operands.push(operand!(Some(&Type::Ptr)));
                    if self.eat_symbol(',') {
                        continue;
                    }
                    break;
                }
                Instruction::StringConcat { result, operands }
            }
            "panic" => Instruction::Panic { reason: operand!(Some(&Type::Ptr)) },
            other => return Err(ParseError::UnexpectedToken { position: pos, expected: "instruction opcode".into(), found: format!("identifier {other:?}") }),
        };

        for (num, ty) in instr.defined_values() {
            value_types.insert(num, ty);
        }
        Ok(instr)
    }

    fn parse_block(&mut self, types: &mut TypeTable, value_types: &mut BTreeMap<ValueNum, Type>, result_types: &[Type]) -> Result<Block, ParseError> {
        let num = self.parse_block_value()?;
        let name = if matches!(self.raw(0), Token::Ident(_)) && matches!(self.raw(1), Token::Newline) {
            let Token::Ident(s) = self.bump().token else { unreachable!() };
            Some(s)
        } else {
            None
        };
        let mut block = if let Some(name) = name { Block::with_name(num, name) } else { Block::new(num) };
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Symbol('{') | Token::Symbol('}')) {
                break;
            }
            block.instructions.push(self.parse_instr(types, value_types, result_types)?);
        }
        Ok(block)
    }

    fn parse_func(&mut self, types: &mut TypeTable) -> Result<Function, ParseError> {
        self.expect_symbol('@')?;
        let num = self.parse_plain_i64()?;
        let name = if let Token::Ident(_) = self.peek() {
            let Token::Ident(s) = self.bump().token else { unreachable!() };
            Some(s)
        } else {
            None
        };
        self.expect_symbol('(')?;
        let mut args = Vec::new();
        let mut value_types = BTreeMap::new();
        if !matches!(self.peek(), Token::Symbol(')')) {
            loop {
                self.expect_symbol('%')?;
                let arg_num = self.parse_plain_i64()?;
                self.expect_symbol(':')?;
                let ty = self.parse_type(types)?;
                value_types.insert(arg_num, ty.clone());
                args.push(Argument { num: arg_num, ty });
                if self.eat_symbol(',') {
                    continue;
                }
                break;
            }
        }
        self.expect_symbol(')')?;
        self.expect_fat_arrow()?;
        self.expect_symbol('(')?;
        let mut result_types = Vec::new();
        if !matches!(self.peek(), Token::Symbol(')')) {
            loop {
                result_types.push(self.parse_type(types)?);
                if self.eat_symbol(',') {
                    continue;
                }
                break;
            }
        }
        self.expect_symbol(')')?;

        self.expect_symbol('{')?;
        let mut blocks = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_symbol('}') {
                break;
            }
            blocks.push(self.parse_block(types, &mut value_types, &result_types)?);
        }

        let entry_num = blocks.first().map(|b| b.num).unwrap_or(0);
        let mut func = if let Some(name) = name { Function::with_name(num, entry_num, name) } else { Function::new(num, entry_num) };
        func.args = args;
        func.result_types = result_types;
        func.blocks.clear();
        for (num, _) in &value_types {
            func.observe_value_num(*num);
        }
        for block in &blocks {
            func.observe_block_num(block.num);
        }

        let mut parents: BTreeMap<BlockNum, Vec<BlockNum>> = BTreeMap::new();
        for block in &blocks {
            for succ in block.terminator_successors() {
                parents.entry(succ).or_default().push(block.num);
            }
        }
        for mut block in blocks {
            block.children = block.terminator_successors().into_iter().collect();
            block.parents = parents.get(&block.num).cloned().unwrap_or_default().into_iter().collect();
            func.blocks.insert(block.num, block);
        }
        func.entry = entry_num;
        Ok(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_function() {
        let program = parse_program("@0 f() => () { {0} ret }").unwrap();
        let f = program.get_func(0).unwrap();
        assert_eq!(f.entry, 0);
        assert_eq!(f.entry_block().instructions.len(), 1);
    }

    #[test]
    fn parses_loop_sum_scenario() {
        let src = "@0 () => (i64) { {0} jmp {1}\n\
{1} %0 = phi #0:i64{0}, %3{2}\n\
     %1 = phi #0:i64{0}, %4{2}\n\
     %2:b = ilss %0, #10:i64\n\
     jcc %2, {2}, {3}\n\
{2} %3:i64 = iadd %0, #1:i64\n\
     %4:i64 = iadd %1, %3\n\
     jmp {1}\n\
{3} ret %1 }";
        let program = parse_program(src).unwrap();
        let f = program.get_func(0).unwrap();
        assert_eq!(f.blocks.len(), 4);
        let b1 = f.get_block(1).unwrap();
        assert_eq!(b1.parents, [0, 2].into_iter().collect());
        let phi0 = &b1.instructions[0];
        match phi0 {
            Instruction::Phi { result, ty, operands } => {
                assert_eq!(*result, 0);
                assert_eq!(*ty, Type::Int(IntKind::I64));
                assert_eq!(operands[1].value, Value::Computed { num: 3, ty: Type::Int(IntKind::I64) });
            }
            other => panic!("expected phi, got {other:?}"),
        }
    }

    #[test]
    fn parses_register_allocation_scenario() {
        let src = "@0 (%0:u8, %1:u8) => (u8) { {0} %2:u8 = iadd %0, %1  ret %2 }";
        let program = parse_program(src).unwrap();
        let f = program.get_func(0).unwrap();
        assert_eq!(f.args.len(), 2);
        assert_eq!(f.result_types, vec![Type::Int(IntKind::U8)]);
        let b0 = f.get_block(0).unwrap();
        assert_eq!(b0.instructions.len(), 2);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let err = parse_program("@0 () => () { {0} bogus }").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn parses_composite_type_in_signature() {
        let src = "@0 (%0:unique_ptr<i64>) => () { {0} ret }";
        let program = parse_program(src).unwrap();
        let f = program.get_func(0).unwrap();
        match &f.args[0].ty {
            Type::Composite(id) => {
                assert_eq!(program.types.get(*id).unwrap().to_string(), "unique_ptr<i64>");
            }
            other => panic!("expected composite type, got {other:?}"),
        }
    }
}
