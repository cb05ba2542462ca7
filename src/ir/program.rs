//! The read-only program the interpreter walks: an ordered sequence of
//! functions, each an ordered sequence of basic blocks, each an ordered
//! sequence of instructions. Shared by reference among every state cloned
//! during exploration — nothing here is ever mutated after `Program::build`
//! returns.

use std::collections::HashMap;

use crate::ir::instruction::{BlockId, FuncId, GlobalId, Instruction};
use crate::ir::value::Value;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub arity: u32,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub zeroed: bool,
    pub init: Vec<Value>,
    pub size_bytes: u32,
}

/// A program counter: the position of the next instruction to execute for
/// some thread. `next()` only advances within the current block; crossing a
/// block boundary is always done explicitly by the interpreter following a
/// `Branch`/`Switch`/`Call`/`Return`, never implicitly by `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pc {
    pub function: FuncId,
    pub block: BlockId,
    pub index: u32,
}

impl Pc {
    pub fn next(self) -> Pc {
        Pc { index: self.index + 1, ..self }
    }

    pub fn at_block(function: FuncId, block: BlockId) -> Pc {
        Pc { function, block, index: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    names_to_func: HashMap<String, FuncId>,
    entry: FuncId,
}

impl Program {
    pub fn build(functions: Vec<Function>, globals: Vec<Global>, entry_name: &str) -> Program {
        let names_to_func = functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), FuncId(i as u32)))
            .collect::<HashMap<_, _>>();
        let entry = *names_to_func
            .get(entry_name)
            .unwrap_or_else(|| panic!("entry function `{entry_name}` not found"));
        Program { functions, globals, names_to_func, entry }
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn func_by_name(&self, name: &str) -> Option<FuncId> {
        self.names_to_func.get(name).copied()
    }

    pub fn entry(&self) -> FuncId {
        self.entry
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn instruction_at(&self, pc: Pc) -> Option<&Instruction> {
        self.func(pc.function).blocks.get(pc.block.0 as usize)?.instructions.get(pc.index as usize)
    }
}
