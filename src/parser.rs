//! Parser for the textual assembly dialect described in [`module`][crate::module].

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::module::{BinOp, Endianness, Function, Global, Instr, Location, Module, Reg, Value};

/// Strip the comment and surrounding whitespace from a line.
fn strip(line: &str) -> &str {
    match line.find(';') {
        Some(i) => line[..i].trim(),
        None => line.trim(),
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Names of globals and functions, collected before bodies are parsed
/// so that bodies may refer to definitions further down.
struct Symbols {
    globals: HashMap<String, usize>,
    functions: HashMap<String, usize>,
}

fn collect_symbols(lines: &[(usize, &str)]) -> Result<Symbols> {
    let mut globals = HashMap::new();
    let mut functions = HashMap::new();
    for &(lineno, line) in lines {
        if let Some(rest) = line.strip_prefix("global ") {
            let name = rest.split('=').next().unwrap_or("").trim();
            if !is_ident(name) {
                return Err(Error::parse(lineno, format!("bad global name `{}`", name)));
            }
            let index = globals.len();
            if globals.insert(name.to_string(), index).is_some() {
                return Err(Error::parse(lineno, format!("duplicate global `{}`", name)));
            }
        } else if let Some(rest) = line.strip_prefix("fn ") {
            let name = rest.trim_end_matches('{').trim();
            if !is_ident(name) {
                return Err(Error::parse(lineno, format!("bad function name `{}`", name)));
            }
            let index = functions.len();
            if functions.insert(name.to_string(), index).is_some() {
                return Err(Error::parse(lineno, format!("duplicate function `{}`", name)));
            }
        }
    }
    Ok(Symbols { globals, functions })
}

/// State of the function body being parsed.
struct FunctionBuilder {
    name: String,
    body: Vec<Instr>,
    registers: Vec<String>,
    register_index: HashMap<String, Reg>,
    labels: HashMap<String, usize>,
    /// Unresolved jump targets: (instruction index, label, line).
    fixups: Vec<(usize, String, usize)>,
}

impl FunctionBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            body: Vec::new(),
            registers: Vec::new(),
            register_index: HashMap::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Reg {
        if let Some(&r) = self.register_index.get(name) {
            return r;
        }
        let r = self.registers.len();
        self.registers.push(name.to_string());
        self.register_index.insert(name.to_string(), r);
        r
    }

    fn finish(mut self) -> Result<Function> {
        for (index, label, lineno) in std::mem::take(&mut self.fixups) {
            let target = *self
                .labels
                .get(&label)
                .ok_or_else(|| Error::parse(lineno, format!("undefined label `{}`", label)))?;
            match &mut self.body[index] {
                Instr::Jump { target: t } | Instr::Branch { target: t, .. } => *t = target,
                _ => unreachable!("fixup on a non-jump instruction"),
            }
        }
        Ok(Function {
            name: self.name,
            body: self.body,
            registers: self.registers,
        })
    }
}

struct Parser<'a> {
    symbols: &'a Symbols,
    lineno: usize,
}

impl Parser<'_> {
    fn err(&self, message: impl Into<String>) -> Error {
        Error::parse(self.lineno, message)
    }

    fn int(&self, s: &str) -> Result<i64> {
        s.parse::<i64>()
            .map_err(|_| self.err(format!("bad integer `{}`", s)))
    }

    fn dst(&self, f: &mut FunctionBuilder, s: &str) -> Result<Reg> {
        match s.strip_prefix('%') {
            Some(name) if is_ident(name) => Ok(f.register(name)),
            _ => Err(self.err(format!("expected register, got `{}`", s))),
        }
    }

    fn value(&self, f: &mut FunctionBuilder, s: &str) -> Result<Value> {
        if s.starts_with('%') {
            Ok(Value::Reg(self.dst(f, s)?))
        } else {
            Ok(Value::Imm(self.int(s)?))
        }
    }

    fn global(&self, s: &str) -> Result<usize> {
        let name = s
            .strip_prefix('@')
            .ok_or_else(|| self.err(format!("expected global, got `{}`", s)))?;
        self.symbols
            .globals
            .get(name)
            .copied()
            .ok_or_else(|| self.err(format!("undefined global `{}`", name)))
    }

    fn location(&self, f: &mut FunctionBuilder, s: &str) -> Result<Location> {
        if let Some(inner) = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Ok(Location::Indirect(self.dst(f, inner.trim())?))
        } else {
            Ok(Location::Global(self.global(s)?))
        }
    }

    fn function(&self, s: &str) -> Result<usize> {
        self.symbols
            .functions
            .get(s)
            .copied()
            .ok_or_else(|| self.err(format!("undefined function `{}`", s)))
    }

    fn label(&self, f: &mut FunctionBuilder, s: &str) -> Result<usize> {
        if !is_ident(s) {
            return Err(self.err(format!("bad label `{}`", s)));
        }
        f.fixups.push((f.body.len(), s.to_string(), self.lineno));
        Ok(0)
    }

    fn args<'s>(&self, rest: &'s str, n: usize, op: &str) -> Result<Vec<&'s str>> {
        let args: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };
        if args.len() != n {
            return Err(self.err(format!(
                "`{}` expects {} operand(s), got {}",
                op,
                n,
                args.len()
            )));
        }
        Ok(args)
    }

    fn call(&self, f: &mut FunctionBuilder, rest: &str) -> Result<Instr> {
        let rest = rest
            .strip_prefix('@')
            .ok_or_else(|| self.err("expected `@name(...)` after `call`"))?;
        let open = rest
            .find('(')
            .ok_or_else(|| self.err("expected `(` in call"))?;
        let name = rest[..open].trim();
        let inner = rest[open + 1..]
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| self.err("expected `)` at the end of call"))?
            .trim();
        if !is_ident(name) {
            return Err(self.err(format!("bad callee `{}`", name)));
        }
        let mut args = Vec::new();
        if !inner.is_empty() {
            for a in inner.split(',') {
                args.push(self.value(f, a.trim())?);
            }
        }
        Ok(Instr::Call {
            name: name.to_string(),
            args,
        })
    }

    fn instruction(&self, f: &mut FunctionBuilder, line: &str) -> Result<Instr> {
        let (op, rest) = match line.find(char::is_whitespace) {
            Some(i) => (&line[..i], line[i..].trim()),
            None => (line, ""),
        };
        let binop = match op {
            "add" => Some(BinOp::Add),
            "sub" => Some(BinOp::Sub),
            "mul" => Some(BinOp::Mul),
            "eq" => Some(BinOp::Eq),
            "ne" => Some(BinOp::Ne),
            "lt" => Some(BinOp::Lt),
            _ => None,
        };
        if let Some(op) = binop {
            let a = self.args(rest, 3, op.mnemonic())?;
            return Ok(Instr::Bin {
                op,
                dst: self.dst(f, a[0])?,
                lhs: self.value(f, a[1])?,
                rhs: self.value(f, a[2])?,
            });
        }
        let instr = match op {
            "mov" => {
                let a = self.args(rest, 2, op)?;
                Instr::Mov {
                    dst: self.dst(f, a[0])?,
                    src: self.value(f, a[1])?,
                }
            }
            "load" => {
                let a = self.args(rest, 2, op)?;
                Instr::Load {
                    dst: self.dst(f, a[0])?,
                    loc: self.location(f, a[1])?,
                }
            }
            "store" => {
                let a = self.args(rest, 2, op)?;
                Instr::Store {
                    loc: self.location(f, a[0])?,
                    value: self.value(f, a[1])?,
                }
            }
            "addr" => {
                let a = self.args(rest, 2, op)?;
                Instr::Addr {
                    dst: self.dst(f, a[0])?,
                    global: self.global(a[1])?,
                }
            }
            "fence" => {
                self.args(rest, 0, op)?;
                Instr::Fence
            }
            "spawn" => {
                let a = self.args(rest, 2, op)?;
                Instr::Spawn {
                    dst: self.dst(f, a[0])?,
                    function: self.function(a[1])?,
                }
            }
            "join" => {
                let a = self.args(rest, 1, op)?;
                Instr::Join {
                    thread: self.value(f, a[0])?,
                }
            }
            "lock" => {
                let a = self.args(rest, 1, op)?;
                Instr::Lock {
                    loc: self.location(f, a[0])?,
                }
            }
            "unlock" => {
                let a = self.args(rest, 1, op)?;
                Instr::Unlock {
                    loc: self.location(f, a[0])?,
                }
            }
            "assert" => {
                let a = self.args(rest, 1, op)?;
                Instr::Assert {
                    value: self.value(f, a[0])?,
                }
            }
            "jmp" => {
                let a = self.args(rest, 1, op)?;
                Instr::Jump {
                    target: self.label(f, a[0])?,
                }
            }
            "brz" | "brnz" => {
                let a = self.args(rest, 2, op)?;
                Instr::Branch {
                    cond: self.value(f, a[0])?,
                    if_zero: op == "brz",
                    target: self.label(f, a[1])?,
                }
            }
            "call" => self.call(f, rest)?,
            "ret" => {
                self.args(rest, 0, op)?;
                Instr::Ret
            }
            _ => return Err(self.err(format!("unknown instruction `{}`", op))),
        };
        Ok(instr)
    }
}

fn data_layout(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("target")?.trim_start();
    let rest = rest.strip_prefix("datalayout")?.trim_start();
    let rest = rest.strip_prefix('=')?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

pub(crate) fn parse(text: &str) -> Result<Module> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, strip(l)))
        .filter(|(_, l)| !l.is_empty())
        .collect();

    let symbols = collect_symbols(&lines)?;
    let mut parser = Parser {
        symbols: &symbols,
        lineno: 0,
    };

    let mut layout: Option<String> = None;
    let mut globals = Vec::new();
    let mut functions = Vec::new();
    let mut current: Option<FunctionBuilder> = None;

    for &(lineno, line) in &lines {
        parser.lineno = lineno;
        if let Some(f) = current.as_mut() {
            if line == "}" {
                if let Some(f) = current.take() {
                    functions.push(f.finish()?);
                }
            } else if let Some(label) = line.strip_suffix(':') {
                let label = label.trim();
                if !is_ident(label) {
                    return Err(parser.err(format!("bad label `{}`", label)));
                }
                if f.labels.insert(label.to_string(), f.body.len()).is_some() {
                    return Err(parser.err(format!("duplicate label `{}`", label)));
                }
            } else {
                let instr = parser.instruction(f, line)?;
                f.body.push(instr);
            }
        } else if line.starts_with("target") {
            let l = data_layout(line).ok_or_else(|| parser.err("malformed `target datalayout`"))?;
            layout = Some(l.to_string());
        } else if let Some(rest) = line.strip_prefix("global ") {
            let (name, init) = match rest.split_once('=') {
                Some((name, init)) => (name.trim(), parser.int(init.trim())?),
                None => (rest.trim(), 0),
            };
            globals.push(Global {
                name: name.to_string(),
                init,
            });
        } else if let Some(rest) = line.strip_prefix("fn ") {
            let name = rest
                .strip_suffix('{')
                .ok_or_else(|| parser.err("expected `{` after function name"))?
                .trim();
            current = Some(FunctionBuilder::new(name));
        } else {
            return Err(parser.err(format!("unexpected `{}` outside of a function", line)));
        }
    }

    if let Some(f) = current {
        return Err(Error::parse(
            text.lines().count(),
            format!("unterminated function `{}`", f.name),
        ));
    }

    let data_layout = match layout {
        Some(l) if !l.is_empty() => l,
        _ => Endianness::native().layout().to_string(),
    };

    Ok(Module {
        data_layout,
        globals,
        functions,
    })
}
