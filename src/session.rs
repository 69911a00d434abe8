//! Exclusive ownership of the module under check and its periodic rebuild.

use std::path::{Path, PathBuf};

use log::debug;

use crate::check::check_module;
use crate::error::{Error, Result};
use crate::module::{read_file, Module};
use crate::symbols;

/// The source text of a program together with the module currently built from it.
#[derive(Debug)]
pub struct Session {
    source: String,
    path: Option<PathBuf>,
    module: Module,
    generation: usize,
}

impl Session {
    /// Build a session from in-memory assembly text.
    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        let source = text.into();
        let module = build(&source)?;
        Ok(Self {
            source,
            path: None,
            module,
            generation: 0,
        })
    }

    /// Build a session from an assembly file. The file is read once.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut session = Self::from_text(read_file(path)?)?;
        session.path = Some(path.to_path_buf());
        Ok(session)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of times the module has been rebuilt.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Rebuild the module from the source text and swap it in.
    ///
    /// The current module is only dropped once the new one is built and checked,
    /// so on error the session is left unchanged.
    pub fn replace(&mut self) -> Result<()> {
        let module = build(&self.source)?;
        self.module = module;
        self.generation += 1;
        debug!("rebuilt module, generation {}", self.generation);
        Ok(())
    }
}

fn build(source: &str) -> Result<Module> {
    if !symbols::is_initialized() {
        return Err(Error::NotInitialized);
    }
    let module = Module::parse(source)?;
    check_module(&module)?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "global x = 3\nfn main {\n load %v, @x\n call @print(%v)\n ret\n}\n";

    #[test]
    fn test_replace() {
        crate::init();
        let mut session = Session::from_text(PROGRAM).unwrap();
        assert_eq!(session.generation(), 0);
        assert!(session.path().is_none());
        session.replace().unwrap();
        session.replace().unwrap();
        assert_eq!(session.generation(), 2);
        let globals = session.module().globals();
        assert_eq!((globals[0].name.as_str(), globals[0].init), ("x", 3));
        assert!(session.module().function("main").is_some());
        assert_eq!(session.source(), PROGRAM);
    }

    #[test]
    fn test_load_errors() {
        crate::init();
        let err = Session::from_text("fn main {\n frobnicate\n}\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
        let err = Session::from_text("fn main {\n call @launch()\n ret\n}\n").unwrap_err();
        assert!(matches!(err, Error::Check { .. }));
        let err = Session::from_file("/nonexistent/program.s").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_from_file() {
        crate::init();
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/programs/counter.s");
        let mut session = Session::from_file(&path).unwrap();
        assert_eq!(session.path(), Some(path.as_path()));
        session.replace().unwrap();
        assert_eq!(session.path(), Some(path.as_path()));
        assert!(session.module().function("main").is_some());
    }
}
