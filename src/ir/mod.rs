//! The finite, closed instruction set explored by the interpreter, and the
//! text-format loader that builds a `Program` from it.

pub mod instruction;
pub mod program;
pub mod text;
pub mod types;
pub mod value;

pub use instruction::{BlockId, CmpPredicate, FuncId, GlobalId, Instruction, InstrKind, Operand};
pub use program::{BasicBlock, Function, Global, Pc, Program};
pub use types::{FloatWidth, InstrId, ObjectId, Tid, Ty};
pub use value::{BinOp, Concrete, Expr, UnaryFloatOp, Value};
