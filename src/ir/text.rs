//! A small s-expression-adjacent text format for building `Program`s without
//! a bitcode front-end. This is deliberately minimal — the only contract the
//! core requires of an IR loader is that it produce the enumerations in
//! `ir::program`; a real front-end (e.g. lowering from LLVM bitcode) is an
//! external collaborator and out of scope here.
//!
//! Grammar sketch (one function/global per top-level item):
//! ```text
//! global g zeroed 8
//! fn main() entry {
//! block 0:
//!   %0 = alloc 8 global
//!   %1 = thread worker(%0)
//!   %2 = threadjoin %1
//!   ret
//! }
//! fn worker(a0) {
//! block 0:
//!   store %0, 1:32
//!   ret
//! }
//! ```

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of},
    combinator::{cut, map, map_res, opt, recognize, value},
    error::{context, ContextError, ParseError as NomParseError, VerboseError},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::ir::instruction::{BlockId, CmpPredicate, GlobalId, Instruction, InstrKind, Operand};
use crate::ir::program::{BasicBlock, Function, Global, Program};
use crate::ir::types::{FloatWidth, InstrId, Ty};
use crate::ir::value::{BinOp, Value};

#[derive(thiserror::Error, Debug)]
pub enum TextLoadError {
    #[error("malformed IR source: {0}")]
    Parse(String),
    #[error("no entry function marked with `entry`")]
    NoEntry,
}

pub fn parse(source: &str) -> Result<Program, TextLoadError> {
    let (remaining, items) =
        all_items::<VerboseError<&str>>(source).map_err(|e| TextLoadError::Parse(format!("{e:?}")))?;
    if !remaining.trim().is_empty() {
        return Err(TextLoadError::Parse(format!("trailing input: {remaining:?}")));
    }

    let mut globals = Vec::new();
    let mut global_ids: HashMap<String, GlobalId> = HashMap::new();
    let mut func_defs = Vec::new();
    let mut entry_name = None;

    for item in items {
        match item {
            Item::Global { name, zeroed, size_bytes, init } => {
                let id = GlobalId(globals.len() as u32);
                global_ids.insert(name.clone(), id);
                globals.push(Global { name, zeroed, init, size_bytes });
            }
            Item::Func { name, params, entry, blocks } => {
                if entry {
                    entry_name = Some(name.clone());
                }
                func_defs.push((name, params, blocks));
            }
        }
    }

    let entry_name = entry_name.ok_or(TextLoadError::NoEntry)?;
    let functions = func_defs
        .into_iter()
        .map(|(name, params, raw_blocks)| {
            let blocks = raw_blocks
                .into_iter()
                .map(|raw| BasicBlock {
                    instructions: raw
                        .into_iter()
                        .map(|raw_instr| lower_instr(raw_instr, &global_ids))
                        .collect(),
                })
                .collect();
            Function { name, arity: params, blocks }
        })
        .collect();

    Ok(Program::build(functions, globals, &entry_name))
}

enum Item {
    Global { name: String, zeroed: bool, size_bytes: u32, init: Vec<Value> },
    Func { name: String, params: u32, entry: bool, blocks: Vec<Vec<RawInstr>> },
}

struct RawInstr {
    dest: Option<u32>,
    op: RawOp,
}

enum RawOp {
    Alloc { size: u32, is_global: bool, zeroed: bool },
    Load { ptr: RawOperand, width: u32 },
    Store { ptr: RawOperand, value: RawOperand },
    BinOp { op: BinOp, width: u32, lhs: RawOperand, rhs: RawOperand },
    Cmp { pred: CmpPredicate, unsigned: bool, lhs: RawOperand, rhs: RawOperand },
    Branch { cond: Option<RawOperand>, then_blk: u32, else_blk: Option<u32> },
    Call { callee: String, args: Vec<RawOperand> },
    Ret { value: Option<RawOperand> },
    Thread { function: String, args: Vec<RawOperand> },
    ThreadJoin { tid: RawOperand },
    ThreadExit { value: Option<RawOperand> },
    Assert { cond: RawOperand },
    Assume { conds: Vec<RawOperand> },
}

enum RawOperand {
    ConstBool(bool),
    ConstBv(u128, u32),
    Instr(u32),
    Arg(u32),
    Global(String),
}

fn lower_operand(raw: RawOperand, global_ids: &HashMap<String, GlobalId>) -> Operand {
    match raw {
        RawOperand::ConstBool(b) => Operand::Const(Value::bool(b)),
        RawOperand::ConstBv(v, w) => Operand::Const(Value::bv(v, w)),
        RawOperand::Instr(i) => Operand::Instr(InstrId(i)),
        RawOperand::Arg(a) => Operand::Arg(a),
        RawOperand::Global(name) => Operand::Global(*global_ids.get(&name).unwrap_or_else(|| panic!("unknown global `{name}`"))),
    }
}

fn lower_instr(raw: RawInstr, global_ids: &HashMap<String, GlobalId>) -> Instruction {
    let id = InstrId(raw.dest.unwrap_or(u32::MAX));
    let lo = |o: RawOperand| lower_operand(o, global_ids);
    let kind = match raw.op {
        RawOp::Alloc { size, is_global, zeroed } => {
            InstrKind::Alloc { size: Operand::Const(Value::bv(size as u128, 64)), is_global, zeroed }
        }
        RawOp::Load { ptr, width } => InstrKind::Load { ptr: lo(ptr), ty: Ty::BitVec(width) },
        RawOp::Store { ptr, value } => InstrKind::Store { ptr: lo(ptr), value: lo(value) },
        RawOp::BinOp { op, width, lhs, rhs } => InstrKind::BinaryOp { op, width, lhs: lo(lhs), rhs: lo(rhs) },
        RawOp::Cmp { pred, unsigned, lhs, rhs } => {
            InstrKind::Cmp { predicate: pred, unsigned_or_unordered: unsigned, lhs: lo(lhs), rhs: lo(rhs) }
        }
        RawOp::Branch { cond, then_blk, else_blk } => InstrKind::Branch {
            cond: cond.map(lo),
            then_block: BlockId(then_blk),
            else_block: else_blk.map(BlockId),
        },
        RawOp::Call { callee, args } => InstrKind::Call { callee, args: args.into_iter().map(lo).collect() },
        RawOp::Ret { value } => InstrKind::Return { value: value.map(lo) },
        RawOp::Thread { function, args } => InstrKind::Thread { function, args: args.into_iter().map(lo).collect() },
        RawOp::ThreadJoin { tid } => InstrKind::ThreadJoin { tid: lo(tid) },
        RawOp::ThreadExit { value } => InstrKind::ThreadExit { value: value.map(lo) },
        RawOp::Assert { cond } => InstrKind::Assert { cond: lo(cond) },
        RawOp::Assume { conds } => InstrKind::Assume { conds: conds.into_iter().map(lo).collect() },
    };
    Instruction { id, kind }
}

fn all_items<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, Vec<Item>, E> {
    let (input, _) = multispace0(input)?;
    let (input, items) = many0(terminated(alt((global_item, func_item)), multispace0))(input)?;
    Ok((input, items))
}

fn ident<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn number<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, u128, E> {
    map_res(digit1, |s: &str| s.parse::<u128>())(input)
}

fn global_item<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, Item, E> {
    let (input, _) = tag("global")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, name) = ident(input)?;
    let (input, _) = multispace1(input)?;
    let (input, zeroed) = opt(tag("zeroed"))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, size_bytes) = map(number, |n| n as u32)(input)?;
    Ok((
        input,
        Item::Global { name: name.to_string(), zeroed: zeroed.is_some(), size_bytes, init: Vec::new() },
    ))
}

fn func_item<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, Item, E> {
    let (input, _) = tag("fn")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, name) = ident(input)?;
    let (input, params) = delimited(char('('), separated_list0(tuple((multispace0, char(','), multispace0)), ident), char(')'))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, entry) = opt(tag("entry"))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, blocks) = delimited(
        char('{'),
        many0(preceded(multispace0, block)),
        preceded(multispace0, char('}')),
    )(input)?;
    Ok((input, Item::Func { name: name.to_string(), params: params.len() as u32, entry: entry.is_some(), blocks }))
}

fn block<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, Vec<RawInstr>, E> {
    let (input, _) = tag("block")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _idx) = number(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = multispace0(input)?;
    many0(terminated(instr_line, multispace0))(input)
}

fn instr_line<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawInstr, E> {
    let (input, dest) = opt(terminated(dest_ref, tuple((multispace0, char('='), multispace0))))(input)?;
    // Once a `%N =` destination has been consumed the line is committed to
    // being an instruction, so a bad opcode there is a hard failure. A bare
    // line with no destination might just be the `}`/`block` that ends the
    // enclosing `many0` loop in `block`, so it must stay a recoverable error.
    let (input, op) = if dest.is_some() {
        context("instruction", cut(raw_op))(input)?
    } else {
        context("instruction", raw_op)(input)?
    };
    Ok((input, RawInstr { dest, op }))
}

fn dest_ref<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, u32, E> {
    preceded(char('%'), map(number, |n| n as u32))(input)
}

fn operand<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOperand, E> {
    alt((
        value(RawOperand::ConstBool(true), tag("true")),
        value(RawOperand::ConstBool(false), tag("false")),
        map(dest_ref, RawOperand::Instr),
        preceded(tag("arg"), map(number, |n| RawOperand::Arg(n as u32))),
        preceded(char('@'), map(ident, |s| RawOperand::Global(s.to_string()))),
        map(pair(number, opt(preceded(char(':'), number))), |(v, w)| {
            RawOperand::ConstBv(v, w.map(|w| w as u32).unwrap_or(64))
        }),
    ))(input)
}

fn operand_list<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, Vec<RawOperand>, E> {
    separated_list0(tuple((multispace0, char(','), multispace0)), operand)(input)
}

fn raw_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    alt((
        alloc_op,
        load_op,
        store_op,
        binop_op,
        cmp_op,
        branch_op,
        call_op,
        ret_op,
        thread_op,
        threadjoin_op,
        threadexit_op,
        assert_op,
        assume_op,
    ))(input)
}

fn alloc_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("alloc")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, size) = number(input)?;
    let (input, is_global) = opt(preceded(multispace1, tag("global")))(input)?;
    let (input, zeroed) = opt(preceded(multispace1, tag("zeroed")))(input)?;
    Ok((input, RawOp::Alloc { size: size as u32, is_global: is_global.is_some(), zeroed: zeroed.is_some() }))
}

fn load_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("load")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, width) = number(input)?;
    let (input, _) = multispace1(input)?;
    let (input, ptr) = operand(input)?;
    Ok((input, RawOp::Load { ptr, width: width as u32 }))
}

fn store_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("store")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (ptr, value)) = separated_pair(operand, tuple((multispace0, char(','), multispace0)), operand)(input)?;
    Ok((input, RawOp::Store { ptr, value }))
}

fn binop_kind<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, BinOp, E> {
    alt((
        value(BinOp::Add, tag("add")),
        value(BinOp::Sub, tag("sub")),
        value(BinOp::Mul, tag("mul")),
        value(BinOp::UDiv, tag("udiv")),
        value(BinOp::SDiv, tag("sdiv")),
        value(BinOp::URem, tag("urem")),
        value(BinOp::SRem, tag("srem")),
        value(BinOp::And, tag("and")),
        value(BinOp::Or, tag("or")),
        value(BinOp::Xor, tag("xor")),
        value(BinOp::Shl, tag("shl")),
        value(BinOp::LShr, tag("lshr")),
        value(BinOp::AShr, tag("ashr")),
    ))(input)
}

fn binop_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("binop")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, op) = binop_kind(input)?;
    let (input, _) = multispace1(input)?;
    let (input, width) = number(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (lhs, rhs)) = separated_pair(operand, tuple((multispace0, char(','), multispace0)), operand)(input)?;
    Ok((input, RawOp::BinOp { op, width: width as u32, lhs, rhs }))
}

fn cmp_pred<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, CmpPredicate, E> {
    alt((
        value(CmpPredicate::Le, tag("le")),
        value(CmpPredicate::Lt, tag("lt")),
        value(CmpPredicate::Ge, tag("ge")),
        value(CmpPredicate::Gt, tag("gt")),
        value(CmpPredicate::Eq, tag("eq")),
        value(CmpPredicate::Ne, tag("ne")),
    ))(input)
}

fn cmp_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("cmp")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, pred) = cmp_pred(input)?;
    let (input, unsigned) = map(opt(char('u')), |o| o.is_some())(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (lhs, rhs)) = separated_pair(operand, tuple((multispace0, char(','), multispace0)), operand)(input)?;
    Ok((input, RawOp::Cmp { pred, unsigned, lhs, rhs }))
}

fn branch_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("br")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, cond) = opt(terminated(operand, multispace1))(input)?;
    let (input, _) = tag("then")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, then_blk) = number(input)?;
    let (input, else_blk) = opt(preceded(tuple((multispace1, tag("else"), multispace1)), number))(input)?;
    Ok((
        input,
        RawOp::Branch { cond, then_blk: then_blk as u32, else_blk: else_blk.map(|n| n as u32) },
    ))
}

fn callee_and_args<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, (String, Vec<RawOperand>), E> {
    let (input, callee) = ident(input)?;
    let (input, args) = delimited(char('('), operand_list, char(')'))(input)?;
    Ok((input, (callee.to_string(), args)))
}

fn call_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("call")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (callee, args)) = callee_and_args(input)?;
    Ok((input, RawOp::Call { callee, args }))
}

fn ret_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("ret")(input)?;
    let (input, value) = opt(preceded(multispace1, operand))(input)?;
    Ok((input, RawOp::Ret { value }))
}

fn thread_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("thread")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (function, args)) = callee_and_args(input)?;
    Ok((input, RawOp::Thread { function, args }))
}

fn threadjoin_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("threadjoin")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, tid) = operand(input)?;
    Ok((input, RawOp::ThreadJoin { tid }))
}

fn threadexit_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("threadexit")(input)?;
    let (input, value) = opt(preceded(multispace1, operand))(input)?;
    Ok((input, RawOp::ThreadExit { value }))
}

fn assert_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("assert")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, cond) = operand(input)?;
    Ok((input, RawOp::Assert { cond }))
}

fn assume_op<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(input: &'a str) -> IResult<&'a str, RawOp, E> {
    let (input, _) = tag("assume")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, conds) = operand_list(input)?;
    Ok((input, RawOp::Assume { conds }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_thread_write_write_race_program() {
        let src = r#"
            global g zeroed 8
            fn main() entry {
            block 0:
              %0 = thread worker(1:32)
              %1 = thread worker(2:32)
              %2 = threadjoin %0
              %3 = threadjoin %1
              ret
            }
            fn worker(a0) {
            block 0:
              store @g, arg0
              ret
            }
        "#;
        let program = parse(src).expect("program should parse");
        assert_eq!(program.functions.len(), 2);
        assert_eq!(program.globals.len(), 1);
        assert_eq!(program.func_by_name("main"), Some(crate::ir::instruction::FuncId(0)));
    }

    #[test]
    fn rejects_source_with_no_entry_function() {
        let src = "fn main() { block 0: ret }";
        assert!(matches!(parse(src), Err(TextLoadError::NoEntry)));
    }
}
