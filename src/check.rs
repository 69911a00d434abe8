//! Validation of a parsed module against the extern table.

use crate::error::{Error, Result};
use crate::module::{Instr, Module};
use crate::symbols;

/// Check that every extern call in the module targets a registered extern
/// with a matching number of arguments.
pub fn check_module(module: &Module) -> Result<()> {
    for function in module.functions() {
        for (pc, instr) in function.body.iter().enumerate() {
            if let Instr::Call { name, args } = instr {
                let ext = symbols::lookup(name)?.ok_or_else(|| {
                    Error::check(format!(
                        "call to unknown function `{}` in `{}` at instruction {}",
                        name, function.name, pc
                    ))
                })?;
                if let Some(arity) = ext.arity {
                    if arity != args.len() {
                        return Err(Error::check(format!(
                            "`{}` expects {} argument(s), got {} in `{}` at instruction {}",
                            name,
                            arity,
                            args.len(),
                            function.name,
                            pc
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
