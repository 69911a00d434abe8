//! # Program modules
//!
//! A [`Module`] is the immutable, executable form of the program under test.
//! It is produced from source text in a small textual assembly dialect:
//!
//! ```text
//! target datalayout = "e"
//! global x = 0
//!
//! fn worker {
//!     store @x, 1
//!     ret
//! }
//!
//! fn main {
//!     spawn %t, worker
//!     load %v, @x
//!     join %t
//!     ret
//! }
//! ```
//!
//! Every global is a shared memory cell. The address of the `k`-th global is `k + 1`;
//! address `0` is the null pointer. Registers (`%name`) are thread-local and start at zero.

use std::path::Path;

use crate::error::{Error, Result};

/// Byte order tag of the module's data layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    /// The minimal data layout string describing this byte order.
    pub const fn layout(self) -> &'static str {
        match self {
            Endianness::Little => "e",
            Endianness::Big => "E",
        }
    }
}

/// Register index, local to a function.
pub type Reg = usize;

/// Instruction operand producing a value.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Value {
    Reg(Reg),
    Imm(i64),
}

/// Memory operand.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Location {
    /// A global, by index.
    Global(usize),
    /// The address held in a register.
    Indirect(Reg),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
}

impl BinOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Eq => (lhs == rhs) as i64,
            BinOp::Ne => (lhs != rhs) as i64,
            BinOp::Lt => (lhs < rhs) as i64,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Instr {
    Mov { dst: Reg, src: Value },
    Bin { op: BinOp, dst: Reg, lhs: Value, rhs: Value },
    Load { dst: Reg, loc: Location },
    Store { loc: Location, value: Value },
    Addr { dst: Reg, global: usize },
    Fence,
    Spawn { dst: Reg, function: usize },
    Join { thread: Value },
    Lock { loc: Location },
    Unlock { loc: Location },
    Assert { value: Value },
    Jump { target: usize },
    Branch { cond: Value, if_zero: bool, target: usize },
    Call { name: String, args: Vec<Value> },
    Ret,
}

impl Instr {
    /// Whether the instruction touches state shared with other threads.
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            Instr::Load { .. }
                | Instr::Store { .. }
                | Instr::Fence
                | Instr::Spawn { .. }
                | Instr::Join { .. }
                | Instr::Lock { .. }
                | Instr::Unlock { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub init: i64,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub body: Vec<Instr>,
    /// Register names, by index.
    pub registers: Vec<String>,
}

impl Function {
    pub fn num_registers(&self) -> usize {
        self.registers.len()
    }
}

/// Executable program representation.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) data_layout: String,
    pub(crate) globals: Vec<Global>,
    pub(crate) functions: Vec<Function>,
}

impl Module {
    /// Parse a module from assembly text.
    ///
    /// A module without a `target datalayout` header gets the host's byte order.
    pub fn parse(text: &str) -> Result<Self> {
        crate::parser::parse(text)
    }

    /// Read and parse a module from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = read_file(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn data_layout(&self) -> &str {
        &self.data_layout
    }

    pub fn endianness(&self) -> Endianness {
        if self.data_layout.starts_with('E') {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<(usize, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }
}

/// Read the whole file into a string.
pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binop() {
        assert_eq!(BinOp::Add.apply(2, 3), 5);
        assert_eq!(BinOp::Sub.apply(2, 3), -1);
        assert_eq!(BinOp::Mul.apply(i64::MAX, 2), -2);
        assert_eq!(BinOp::Eq.apply(4, 4), 1);
        assert_eq!(BinOp::Ne.apply(4, 4), 0);
        assert_eq!(BinOp::Lt.apply(3, 4), 1);
    }

    #[test]
    fn test_native_layout() {
        let module = Module::parse("fn main {\n ret\n}\n").unwrap();
        assert_eq!(module.endianness(), Endianness::native());
        assert_eq!(module.data_layout(), Endianness::native().layout());
    }

    #[test]
    fn test_explicit_layout() {
        let module = Module::parse("target datalayout = \"E-m:e\"\nfn main {\n ret\n}\n").unwrap();
        assert_eq!(module.endianness(), Endianness::Big);
        assert_eq!(module.data_layout(), "E-m:e");
    }

    #[test]
    fn test_lookup() {
        let module = Module::parse("global x = 0\nglobal y = 7\nfn f {\n ret\n}\nfn main {\n ret\n}\n").unwrap();
        let names: Vec<&str> = module.globals().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
        assert_eq!(module.globals()[1].init, 7);
        let (index, main) = module.function("main").unwrap();
        assert_eq!(index, 1);
        assert_eq!(main.body, vec![Instr::Ret]);
        assert!(module.function("start").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Module::load("/nonexistent/dir/prog.s").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
